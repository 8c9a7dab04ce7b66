//! Tuple (C4): an ordered sequence of `(optional_key, Value)` pairs.
//!
//! The sole carrier for records (all entries keyed), arrays (all entries
//! positional), and anything in between. Positional access is O(1) by
//! index; keyed access goes through a secondary `HashMap` from key to
//! index, kept in sync on every structural mutation.

use crate::value::{Data, Value};
use std::collections::HashMap;
use teascript_core::{ErrorKind, SourceLocation, TeaError};

#[derive(Debug, Clone)]
struct Entry {
    key: Option<String>,
    value: Value,
}

/// Maximum nesting depth `print` descends before printing `<Tuple>` (§4.4).
const PRINT_MAX_DEPTH: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct Tuple {
    entries: Vec<Entry>,
    key_index: HashMap<String, usize>,
}

impl Tuple {
    pub fn new() -> Self {
        Tuple::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a positional (unkeyed) entry. The returned index is its
    /// insertion order, which (invariant e) equals its positional index.
    pub fn append(&mut self, value: Value) -> usize {
        self.entries.push(Entry { key: None, value });
        self.entries.len() - 1
    }

    /// Append a keyed entry. Fails if `key` is already present.
    pub fn append_keyed(&mut self, key: String, value: Value, loc: SourceLocation) -> Result<usize, TeaError> {
        if self.key_index.contains_key(&key) {
            return Err(TeaError::new(ErrorKind::RedefinitionOfVariable, loc, format!("duplicate tuple key '{key}'")));
        }
        let idx = self.entries.len();
        self.key_index.insert(key.clone(), idx);
        self.entries.push(Entry { key: Some(key), value });
        Ok(idx)
    }

    pub fn insert_at(&mut self, index: usize, key: Option<String>, value: Value, loc: SourceLocation) -> Result<(), TeaError> {
        if index > self.entries.len() {
            return Err(TeaError::new(ErrorKind::OutOfRange, loc, format!("tuple index {index} out of range")));
        }
        if let Some(k) = &key {
            if self.key_index.contains_key(k) {
                return Err(TeaError::new(ErrorKind::RedefinitionOfVariable, loc, format!("duplicate tuple key '{k}'")));
            }
        }
        self.entries.insert(index, Entry { key, value });
        self.reindex();
        Ok(())
    }

    pub fn remove_at(&mut self, index: usize, loc: SourceLocation) -> Result<Value, TeaError> {
        if index >= self.entries.len() {
            return Err(TeaError::new(ErrorKind::OutOfRange, loc, format!("tuple index {index} out of range")));
        }
        let entry = self.entries.remove(index);
        self.reindex();
        Ok(entry.value)
    }

    pub fn remove_key(&mut self, key: &str, loc: SourceLocation) -> Result<Value, TeaError> {
        let idx = self
            .key_index
            .get(key)
            .copied()
            .ok_or_else(|| TeaError::new(ErrorKind::UnknownIdentifier, loc, format!("no such tuple key '{key}'")))?;
        self.remove_at(idx, loc)
    }

    pub fn swap(&mut self, a: usize, b: usize, loc: SourceLocation) -> Result<(), TeaError> {
        if a >= self.entries.len() || b >= self.entries.len() {
            return Err(TeaError::new(ErrorKind::OutOfRange, loc, "tuple swap index out of range"));
        }
        self.entries.swap(a, b);
        self.reindex();
        Ok(())
    }

    /// Replace the value at `index` in place, keeping its key (if any).
    /// Backs the core library's `_tuple_set` (S4: shared mutation through
    /// an aliased tuple is observed at its original index).
    pub fn set_index(&mut self, index: usize, value: Value, loc: SourceLocation) -> Result<(), TeaError> {
        let entry = self
            .entries
            .get_mut(index)
            .ok_or_else(|| TeaError::new(ErrorKind::OutOfRange, loc, format!("tuple index {index} out of range")))?;
        entry.value = value;
        Ok(())
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.entries.get(index).map(|e| &e.value)
    }

    pub fn get_key(&self, key: &str) -> Option<&Value> {
        self.key_index.get(key).and_then(|&i| self.entries.get(i)).map(|e| &e.value)
    }

    pub fn key_at(&self, index: usize) -> Option<&str> {
        self.entries.get(index).and_then(|e| e.key.as_deref())
    }

    pub fn index_of_key(&self, key: &str) -> Option<usize> {
        self.key_index.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Option<&str>, &Value)> {
        self.entries.iter().map(|e| (e.key.as_deref(), &e.value))
    }

    /// Deep structural equality of *types only* — leaf values are ignored.
    /// Used by host code to validate record shapes.
    pub fn same_shape(&self, other: &Tuple) -> bool {
        if self.entries.len() != other.entries.len() {
            return false;
        }
        self.entries.iter().zip(other.entries.iter()).all(|(a, b)| {
            if a.key != b.key {
                return false;
            }
            match (&*a.value.borrow(), &*b.value.borrow()) {
                (Data::Tuple(ta), Data::Tuple(tb)) => ta.same_shape(tb),
                (da, db) => da.type_name() == db.type_name(),
            }
        })
    }

    /// True if every entry is unkeyed — the "array" convention (§4.4).
    pub fn is_array(&self) -> bool {
        self.entries.iter().all(|e| e.key.is_none())
    }

    fn reindex(&mut self) {
        self.key_index.clear();
        for (i, e) in self.entries.iter().enumerate() {
            if let Some(k) = &e.key {
                self.key_index.insert(k.clone(), i);
            }
        }
    }

    pub fn print(&self, depth: usize) -> String {
        if depth >= PRINT_MAX_DEPTH {
            return "<Tuple>".to_string();
        }
        let mut parts = Vec::with_capacity(self.entries.len());
        for e in &self.entries {
            let rendered = match &*e.value.borrow() {
                Data::Tuple(t) => t.print(depth + 1),
                _ => e.value.print_value(),
            };
            match &e.key {
                Some(k) => parts.push(format!("{k}: {rendered}")),
                None => parts.push(rendered),
            }
        }
        format!("({})", parts.join(", "))
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|(a, b)| a.key == b.key && *a.value.borrow() == *b.value.borrow())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Data;

    #[test]
    fn positional_index_equals_insertion_order() {
        let mut t = Tuple::new();
        t.append(Value::new(Data::I64(1)));
        t.append_keyed("k".into(), Value::new(Data::I64(2)), SourceLocation::synthetic()).unwrap();
        t.append(Value::new(Data::I64(3)));
        assert_eq!(t.index_of_key("k"), Some(1));
        assert_eq!(t.get_index(1).unwrap().get_as_integer(SourceLocation::synthetic()).unwrap(), 2);
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let mut t = Tuple::new();
        t.append_keyed("k".into(), Value::new(Data::I64(1)), SourceLocation::synthetic()).unwrap();
        assert!(t.append_keyed("k".into(), Value::new(Data::I64(2)), SourceLocation::synthetic()).is_err());
    }

    #[test]
    fn same_shape_ignores_leaf_values() {
        let mut a = Tuple::new();
        a.append(Value::new(Data::I64(1)));
        a.append_keyed("x".into(), Value::new(Data::String("a".into())), SourceLocation::synthetic()).unwrap();
        let mut b = Tuple::new();
        b.append(Value::new(Data::I64(999)));
        b.append_keyed("x".into(), Value::new(Data::String("different".into())), SourceLocation::synthetic()).unwrap();
        assert!(a.same_shape(&b));
    }

    #[test]
    fn remove_by_index_reindexes_keys() {
        let mut t = Tuple::new();
        t.append_keyed("a".into(), Value::new(Data::I64(1)), SourceLocation::synthetic()).unwrap();
        t.append_keyed("b".into(), Value::new(Data::I64(2)), SourceLocation::synthetic()).unwrap();
        t.remove_at(0, SourceLocation::synthetic()).unwrap();
        assert_eq!(t.index_of_key("b"), Some(0));
    }
}
