//! Data models

pub mod customer;
pub mod scoring;
pub mod explanation;

pub use customer::*;
pub use scoring::*;
pub use explanation::*;
