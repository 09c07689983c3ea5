//! Tabular output: typed cells and ordered rows.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// A typed table cell. `Missing` is a first-class value, distinct from the empty string.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Integer(i64),
    Double(f64),
    String(String),
    Boolean(bool),
    Missing,
}

impl Cell {
    pub fn is_missing(&self) -> bool { matches!(self, Cell::Missing) }

    /// Scalar JSON -> cell. Containers are not scalars and yield `None`.
    pub fn from_scalar(v: &serde_json::Value) -> Option<Cell> {
        use serde_json::Value;
        match v {
            Value::Null => Some(Cell::Missing),
            Value::Bool(b) => Some(Cell::Boolean(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() { Some(Cell::Integer(i)) } else { n.as_f64().map(Cell::Double) }
            }
            Value::String(s) => Some(Cell::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Integer(i) => write!(f, "{}", i),
            Cell::Double(d) => write!(f, "{}", d),
            Cell::String(s) => f.write_str(s),
            Cell::Boolean(b) => write!(f, "{}", b),
            Cell::Missing => f.write_str("-"),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self { Cell::String(s.to_string()) }
}

impl From<i64> for Cell {
    fn from(i: i64) -> Self { Cell::Integer(i) }
}

impl From<bool> for Cell {
    fn from(b: bool) -> Self { Cell::Boolean(b) }
}

/// Column name -> cell, in column insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, Cell)>,
}

impl Row {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.cells.len() }
    pub fn is_empty(&self) -> bool { self.cells.is_empty() }

    /// Insert or replace a column, keeping the position of an existing one.
    pub fn insert(&mut self, name: impl Into<String>, cell: Cell) {
        let name = name.into();
        match self.cells.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = cell,
            None => self.cells.push((name, cell)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Cell> {
        self.cells.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn contains(&self, name: &str) -> bool { self.get(name).is_some() }

    pub fn remove(&mut self, name: &str) -> Option<Cell> {
        let idx = self.cells.iter().position(|(n, _)| n == name)?;
        Some(self.cells.remove(idx).1)
    }

    /// Rename a column in place. A column already named `to` is replaced.
    pub fn rename(&mut self, from: &str, to: &str) {
        if from == to { return; }
        let Some(idx) = self.cells.iter().position(|(n, _)| n == from) else { return };
        if let Some(dup) = self.cells.iter().position(|(n, _)| n == to) {
            let cell = self.cells.remove(idx).1;
            let dup = if dup > idx { dup - 1 } else { dup };
            self.cells[dup].1 = cell;
        } else {
            self.cells[idx].0 = to.to_string();
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.cells.iter().map(|(n, c)| (n.as_str(), c))
    }

    /// Reorder to `columns`, filling absent ones with `Missing`. Unknown columns are dropped.
    pub fn conform(&mut self, columns: &[String]) {
        let mut next = Vec::with_capacity(columns.len());
        for col in columns {
            let cell = self.remove(col).unwrap_or(Cell::Missing);
            next.push((col.clone(), cell));
        }
        self.cells = next;
    }
}

impl<S: Into<String>> FromIterator<(S, Cell)> for Row {
    fn from_iter<I: IntoIterator<Item = (S, Cell)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter { row.insert(k, v); }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(self.cells.len()))?;
        for (k, v) in self.cells.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
