//! Customer table model
//!
//! The table is loaded once from a pandas `orient="split"` export and never
//! mutated afterwards. Rows keep the file order, which is also the order used
//! by `/customers`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize, Serializer};
use serde::ser::SerializeMap;
use serde_json::Value;

use crate::error::ArtifactError;

/// A single cell of the customer table
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Number(f64),
    Bool(bool),
    Text(String),
    Missing,
}

impl FeatureValue {
    fn from_json(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(FeatureValue::Missing),
            Value::Bool(b) => Ok(FeatureValue::Bool(b)),
            Value::Number(n) => n
                .as_f64()
                .map(FeatureValue::Number)
                .ok_or_else(|| format!("unrepresentable number {}", n)),
            Value::String(s) if s.is_empty() => Ok(FeatureValue::Missing),
            Value::String(s) => Ok(FeatureValue::Text(s)),
            other => Err(format!("unsupported cell value {}", other)),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Model input value, flags count as 0/1
    pub fn as_model_input(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(n) => Some(*n),
            FeatureValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

/// Missing values go out as `""`, the placeholder existing clients expect
impl Serialize for FeatureValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FeatureValue::Number(n) => serializer.serialize_f64(*n),
            FeatureValue::Bool(b) => serializer.serialize_bool(*b),
            FeatureValue::Text(s) => serializer.serialize_str(s),
            FeatureValue::Missing => serializer.serialize_str(""),
        }
    }
}

/// pandas `DataFrame.to_json(orient="split")` layout, `index` is ignored
#[derive(Debug, Deserialize)]
pub struct SplitFrame {
    pub columns: Vec<String>,
    pub data: Vec<Vec<Value>>,
}

/// count / mean / std of one numeric feature, like `DataFrame.describe()`
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureStats {
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
}

impl FeatureStats {
    fn compute(values: impl Iterator<Item = f64> + Clone) -> Self {
        let count = values.clone().count();
        if count == 0 {
            return Self { count, mean: None, std: None };
        }

        let mean = values.clone().sum::<f64>() / count as f64;
        // Sample standard deviation (ddof = 1)
        let std = (count > 1).then(|| {
            let variance = values.map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
            variance.sqrt()
        });

        Self { count, mean: Some(mean), std }
    }
}

/// Population statistics of the numeric features, in column order
///
/// Serialized measure first, `{"count": {feature: n}, "mean": {..}, "std": {..}}`,
/// the layout of a transposed `describe()` frame.
#[derive(Debug, Clone, Default)]
pub struct PopulationStats(Vec<(String, FeatureStats)>);

impl PopulationStats {
    /// Number of numeric features
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// One measure across every feature
struct MeasureRow<'a, F>(&'a [(String, FeatureStats)], F);

impl<F, T> Serialize for MeasureRow<'_, F>
where
    F: Fn(&FeatureStats) -> T,
    T: Serialize,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, stats) in self.0 {
            map.serialize_entry(name, &(self.1)(stats))?;
        }
        map.end()
    }
}

impl Serialize for PopulationStats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("count", &MeasureRow(&self.0, |s: &FeatureStats| s.count))?;
        map.serialize_entry("mean", &MeasureRow(&self.0, |s: &FeatureStats| s.mean))?;
        map.serialize_entry("std", &MeasureRow(&self.0, |s: &FeatureStats| s.std))?;
        map.end()
    }
}

/// In-memory customer table keyed by customer id
#[derive(Debug, Clone)]
pub struct CustomerTable {
    columns: Vec<String>,
    column_index: HashMap<String, usize>,
    ids: Vec<i64>,
    positions: HashMap<i64, usize>,
    rows: Vec<Vec<FeatureValue>>,
    stats: PopulationStats,
}

impl CustomerTable {
    /// Build the table from a split frame, keying rows by `id_column` and
    /// removing `drop_columns` (missing ones are ignored).
    pub fn from_split(
        frame: SplitFrame,
        id_column: &str,
        drop_columns: &[String],
    ) -> Result<Self, ArtifactError> {
        let id_pos = frame.columns.iter()
            .position(|c| c == id_column)
            .ok_or_else(|| ArtifactError::Table(format!("id column '{}' not found", id_column)))?;

        let keep: Vec<usize> = (0..frame.columns.len())
            .filter(|&i| i != id_pos && !drop_columns.contains(&frame.columns[i]))
            .collect();
        let columns: Vec<String> = keep.iter().map(|&i| frame.columns[i].clone()).collect();

        let mut column_index = HashMap::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            if column_index.insert(name.clone(), i).is_some() {
                return Err(ArtifactError::Table(format!("duplicate column '{}'", name)));
            }
        }

        let mut ids = Vec::with_capacity(frame.data.len());
        let mut positions = HashMap::with_capacity(frame.data.len());
        let mut rows = Vec::with_capacity(frame.data.len());

        for (row_num, mut raw) in frame.data.into_iter().enumerate() {
            if raw.len() != frame.columns.len() {
                return Err(ArtifactError::Table(format!(
                    "row {} has {} cells, expected {}",
                    row_num, raw.len(), frame.columns.len()
                )));
            }

            let id = parse_id(&raw[id_pos])
                .ok_or_else(|| ArtifactError::Table(format!("row {} has invalid id {}", row_num, raw[id_pos])))?;
            if positions.insert(id, rows.len()).is_some() {
                return Err(ArtifactError::Table(format!("duplicate customer id {}", id)));
            }

            let mut row = Vec::with_capacity(keep.len());
            for &i in &keep {
                let value = FeatureValue::from_json(raw[i].take())
                    .map_err(|e| ArtifactError::Table(format!("row {}, column '{}': {}", row_num, frame.columns[i], e)))?;
                row.push(value);
            }

            ids.push(id);
            rows.push(row);
        }

        let mut table = Self {
            columns,
            column_index,
            ids,
            positions,
            rows,
            stats: PopulationStats::default(),
        };
        table.stats = table.compute_stats();
        Ok(table)
    }

    /// Feature columns, key column excluded
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.column_index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// First `limit` ids in table order
    pub fn head(&self, limit: usize) -> &[i64] {
        &self.ids[..limit.min(self.ids.len())]
    }

    pub fn contains(&self, id: i64) -> bool {
        self.positions.contains_key(&id)
    }

    /// Look up a single customer by id
    pub fn get(&self, id: i64) -> Option<CustomerRecord<'_>> {
        self.positions.get(&id).map(|&row| CustomerRecord {
            table: self,
            id,
            row,
        })
    }

    pub fn records(&self) -> impl Iterator<Item = CustomerRecord<'_>> {
        self.ids.iter().enumerate().map(move |(row, &id)| CustomerRecord { table: self, id, row })
    }

    /// Numeric-feature statistics, computed once at load
    pub fn stats(&self) -> &PopulationStats {
        &self.stats
    }

    fn compute_stats(&self) -> PopulationStats {
        let mut stats = Vec::new();

        // Numeric = only numbers or missing cells, with at least one number.
        // Text and bool columns are left out, as `describe()` does.
        for (col, name) in self.columns.iter().enumerate() {
            let mut has_number = false;
            let numeric = self.rows.iter().all(|row| match row[col] {
                FeatureValue::Number(_) => {
                    has_number = true;
                    true
                }
                FeatureValue::Missing => true,
                FeatureValue::Bool(_) | FeatureValue::Text(_) => false,
            });
            if !numeric || !has_number {
                continue;
            }

            let values = self.rows.iter().filter_map(move |row| row[col].as_f64());
            stats.push((name.clone(), FeatureStats::compute(values)));
        }

        PopulationStats(stats)
    }
}

/// Integer ids may come through as floats (`100006.0`) from pandas
fn parse_id(value: &Value) -> Option<i64> {
    if let Some(id) = value.as_i64() {
        return Some(id);
    }
    value.as_f64()
        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
        .map(|f| f as i64)
}

/// Borrowed view of one customer row
#[derive(Debug, Clone, Copy)]
pub struct CustomerRecord<'a> {
    table: &'a CustomerTable,
    id: i64,
    row: usize,
}

impl<'a> CustomerRecord<'a> {
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Value of a feature by column name
    pub fn get(&self, feature: &str) -> Option<&'a FeatureValue> {
        self.table.column_position(feature).map(|i| &self.table.rows[self.row][i])
    }

    pub fn values(&self) -> &'a [FeatureValue] {
        &self.table.rows[self.row]
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a FeatureValue)> {
        self.table.columns.iter().map(String::as_str).zip(self.values().iter())
    }
}

impl Serialize for CustomerRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.table.columns.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
