//! Per-entity key/value state written by rule-sets.
//!
//! Tables keep insertion order. Iteration snapshots the key sequence when it
//! starts and ends with an explicit `None`, so a table that changes between
//! steps can never keep a traversal alive.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Bool(bool),
    Int(i64),
    Number(f64),
    Text(String),
}

impl DataValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Number(value) if value.fract() == 0.0 => Some(*value as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{}", value),
            Self::Int(value) => write!(f, "{}", value),
            Self::Number(value) => write!(f, "{}", value),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<bool> for DataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for DataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
    entries: Vec<(String, DataValue)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&DataValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    pub fn int(&self, key: &str) -> i64 {
        self.get(key).and_then(DataValue::as_int).unwrap_or(0)
    }

    pub fn flag(&self, key: &str) -> bool {
        self.get(key).and_then(DataValue::as_bool).unwrap_or(false)
    }

    /// Overwrites in place, so an existing key keeps its position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<DataValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| *name == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<DataValue> {
        let index = self.entries.iter().position(|(name, _)| name == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn cursor(&self) -> TableCursor {
        TableCursor::new(self)
    }

    pub fn iter(&self) -> TableIter<'_> {
        TableIter {
            table: self,
            cursor: self.cursor(),
        }
    }
}

impl<'a> IntoIterator for &'a Metadata {
    type Item = (String, DataValue);
    type IntoIter = TableIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Detached iteration state over a [`Metadata`] table.
///
/// The cursor owns the key snapshot and borrows the table only for the duration
/// of each step, so the caller may mutate the table between steps.
#[derive(Debug, Clone)]
pub struct TableCursor {
    keys: std::vec::IntoIter<String>,
}

impl TableCursor {
    pub fn new(table: &Metadata) -> Self {
        let keys: Vec<String> = table.keys().map(str::to_string).collect();
        Self {
            keys: keys.into_iter(),
        }
    }

    /// Keys removed since the snapshot are skipped; keys added are never seen.
    pub fn next_entry(&mut self, table: &Metadata) -> Option<(String, DataValue)> {
        for key in self.keys.by_ref() {
            if let Some(value) = table.get(&key) {
                let value = value.clone();
                return Some((key, value));
            }
        }
        None
    }

    pub fn remaining(&self) -> usize {
        self.keys.len()
    }
}

pub struct TableIter<'a> {
    table: &'a Metadata,
    cursor: TableCursor,
}

impl Iterator for TableIter<'_> {
    type Item = (String, DataValue);

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next_entry(self.table)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.cursor.remaining()))
    }
}
