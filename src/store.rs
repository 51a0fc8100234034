//! Path-addressed data store.
//!
//! The store holds a single immutable root `Value`. Every write rebuilds the
//! spine from the root to the written slot and reuses every untouched
//! sibling, so readers holding an old root see a consistent snapshot and
//! observers can cheaply detect what changed. The initial model is kept as
//! its own snapshot for `reset`.

use crate::error::StoreError;
use crate::path::{Path, Pattern, PatternSegment, Segment};
use crate::value::Value;
use indexmap::IndexMap;

/// What one mutation did: the written path with the values before and after.
/// `Null` stands in for "was absent".
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeRecord {
    pub path: Path,
    pub prev: Value,
    pub next: Value,
}

/// Resolve a path against a value tree. `None` when any segment misses.
pub fn read_path<'a>(root: &'a Value, path: &Path) -> Option<&'a Value> {
    let mut current = root;
    for seg in path.segments() {
        current = match seg {
            Segment::Key(k) => current.get(k)?,
            Segment::Index(i) => current.get_index(*i)?,
        };
    }
    Some(current)
}

/// The model container. All cascade entry points write through here.
#[derive(Clone, Debug)]
pub struct DataStore {
    root: Value,
    initial: Value,
}

impl DataStore {
    pub fn new(initial: Value) -> Self {
        DataStore {
            root: initial.clone(),
            initial,
        }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn initial(&self) -> &Value {
        &self.initial
    }

    /// Remember `value` as the model that plain `reset` restores.
    pub fn adopt_initial(&mut self, value: Value) {
        self.initial = value;
    }

    pub fn get(&self, path: &Path) -> Option<&Value> {
        read_path(&self.root, path)
    }

    /// Write one value. Intermediate containers are created as needed; the
    /// container kind is inferred from the next segment (index → list, key →
    /// object). List writes past the end pad with `Null`.
    pub fn set(&mut self, path: &Path, value: Value) -> Result<ChangeRecord, StoreError> {
        if path.is_root() {
            return Err(StoreError::EmptyPath);
        }
        let (new_root, prev) = write_at(&self.root, path.segments(), value.clone());
        self.root = new_root;
        Ok(ChangeRecord {
            path: path.clone(),
            prev,
            next: value,
        })
    }

    /// Delete a slot. Object keys are removed; list slots become `Null` so
    /// sibling indices never shift. Deleting a missing path is a no-op
    /// record with `prev = Null`.
    pub fn delete(&mut self, path: &Path) -> Result<ChangeRecord, StoreError> {
        if path.is_root() {
            return Err(StoreError::EmptyPath);
        }
        let (new_root, prev) = delete_at(&self.root, path.segments());
        self.root = new_root;
        Ok(ChangeRecord {
            path: path.clone(),
            prev,
            next: Value::Null,
        })
    }

    pub fn batch_set(
        &mut self,
        entries: impl IntoIterator<Item = (Path, Value)>,
    ) -> Result<Vec<ChangeRecord>, StoreError> {
        let mut records = Vec::new();
        for (path, value) in entries {
            records.push(self.set(&path, value)?);
        }
        Ok(records)
    }

    /// Apply a nested partial: flattened to its leaves first, then written
    /// entry by entry, so merging `{a: {b: 1}}` leaves `a`'s other keys
    /// alone.
    pub fn merge(&mut self, partial: &Value) -> Result<Vec<ChangeRecord>, StoreError> {
        self.batch_set(flatten(partial))
    }

    /// Replace the root with `target` (or the initial snapshot) and report
    /// the difference between the old and new flattened representations.
    pub fn reset(&mut self, target: Option<Value>) -> Vec<ChangeRecord> {
        let new_root = target.unwrap_or_else(|| self.initial.clone());
        let old_flat: IndexMap<Path, Value> = flatten(&self.root).into_iter().collect();
        let new_flat: IndexMap<Path, Value> = flatten(&new_root).into_iter().collect();

        let mut records = Vec::new();
        for (path, prev) in &old_flat {
            let next = new_flat.get(path).cloned().unwrap_or(Value::Null);
            if *prev != next {
                records.push(ChangeRecord {
                    path: path.clone(),
                    prev: prev.clone(),
                    next,
                });
            }
        }
        for (path, next) in &new_flat {
            if !old_flat.contains_key(path) {
                records.push(ChangeRecord {
                    path: path.clone(),
                    prev: Value::Null,
                    next: next.clone(),
                });
            }
        }

        self.root = new_root;
        records
    }

    /// Enumerate the concrete paths a wildcard pattern currently addresses.
    /// A `*` position must hold a list (anything else prunes that branch);
    /// concrete segments after the last `*` are appended without existence
    /// checks so new leaves can be created through a pattern write.
    pub fn expand_wildcard(&self, pattern: &Pattern) -> Vec<Path> {
        let mut out = Vec::new();
        expand(Some(&self.root), pattern.segments(), Path::root(), &mut out);
        out
    }
}

fn write_at(current: &Value, segs: &[Segment], value: Value) -> (Value, Value) {
    match segs {
        [] => (value, current.clone()),
        [seg, rest @ ..] => match seg {
            Segment::Key(k) => {
                let child = current.get(k).cloned().unwrap_or(Value::Null);
                let (new_child, prev) = write_at(&child, rest, value);
                (current.with_field(k, new_child), prev)
            }
            Segment::Index(i) => {
                let child = current.get_index(*i).cloned().unwrap_or(Value::Null);
                let (new_child, prev) = write_at(&child, rest, value);
                (current.with_index(*i, new_child), prev)
            }
        },
    }
}

fn delete_at(current: &Value, segs: &[Segment]) -> (Value, Value) {
    match segs {
        [] => (current.clone(), current.clone()),
        [last] => match (last, current) {
            (Segment::Key(k), Value::Object(fields)) => match fields.get(k.as_ref()) {
                Some(prev) => (current.without_field(k), prev.clone()),
                None => (current.clone(), Value::Null),
            },
            (Segment::Index(i), Value::List(items)) => match items.get(*i) {
                Some(prev) => (current.with_index(*i, Value::Null), prev.clone()),
                None => (current.clone(), Value::Null),
            },
            _ => (current.clone(), Value::Null),
        },
        [seg, rest @ ..] => {
            let child = match seg {
                Segment::Key(k) => current.get(k),
                Segment::Index(i) => current.get_index(*i),
            };
            match child {
                Some(child) => {
                    let (new_child, prev) = delete_at(child, rest);
                    let new_current = match seg {
                        Segment::Key(k) => current.with_field(k, new_child),
                        Segment::Index(i) => current.with_index(*i, new_child),
                    };
                    (new_current, prev)
                }
                None => (current.clone(), Value::Null),
            }
        }
    }
}

/// Flatten a value to its leaf entries. Scalars and *empty* containers are
/// leaves; non-empty containers recurse.
pub fn flatten(value: &Value) -> Vec<(Path, Value)> {
    let mut out = Vec::new();
    flatten_into(value, Path::root(), &mut out);
    out
}

fn flatten_into(value: &Value, at: Path, out: &mut Vec<(Path, Value)>) {
    match value {
        Value::Object(fields) if !fields.is_empty() => {
            for (k, v) in fields.iter() {
                flatten_into(v, at.key(k.as_str()), out);
            }
        }
        Value::List(items) if !items.is_empty() => {
            for (i, v) in items.iter().enumerate() {
                flatten_into(v, at.index(i), out);
            }
        }
        _ => {
            if !at.is_root() {
                out.push((at, value.clone()));
            }
        }
    }
}

fn expand(value: Option<&Value>, segs: &[PatternSegment], acc: Path, out: &mut Vec<Path>) {
    let Some((head, rest)) = segs.split_first() else {
        out.push(acc);
        return;
    };
    let star_remains = rest.iter().any(|s| matches!(s, PatternSegment::Star));
    match head {
        PatternSegment::Star => {
            let Some(items) = value.and_then(Value::as_list) else {
                return;
            };
            for (i, item) in items.iter().enumerate() {
                expand(Some(item), rest, acc.index(i), out);
            }
        }
        PatternSegment::Key(k) => {
            let child = value.and_then(|v| v.get(k));
            if child.is_none() && star_remains {
                return;
            }
            expand(child, rest, acc.key(k.clone()), out);
        }
        PatternSegment::Index(i) => {
            let child = value.and_then(|v| v.get_index(*i));
            if child.is_none() && star_remains {
                return;
            }
            expand(child, rest, acc.index(*i), out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DataStore {
        DataStore::new(Value::object([
            ("user", Value::object([("name", Value::text("ann"))])),
            (
                "rows",
                Value::list([Value::int(1), Value::int(2), Value::int(3)]),
            ),
        ]))
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut store = store();
        store.set(&Path::parse("user.name"), Value::text("bob")).unwrap();
        assert_eq!(
            store.get(&Path::parse("user.name")),
            Some(&Value::text("bob"))
        );
    }

    #[test]
    fn untouched_siblings_keep_identity() {
        let mut store = store();
        let rows_before = store.get(&Path::parse("rows")).unwrap().clone();
        store.set(&Path::parse("user.name"), Value::text("bob")).unwrap();
        let rows_after = store.get(&Path::parse("rows")).unwrap();
        assert!(rows_after.same_identity(&rows_before));
    }

    #[test]
    fn set_creates_intermediate_containers() {
        let mut store = DataStore::new(Value::Null);
        store.set(&Path::parse("a.0.b"), Value::int(7)).unwrap();
        assert_eq!(store.get(&Path::parse("a.0.b")), Some(&Value::int(7)));
        assert!(store.get(&Path::parse("a")).unwrap().as_list().is_some());
    }

    #[test]
    fn empty_path_mutation_fails() {
        let mut store = store();
        assert!(matches!(
            store.set(&Path::root(), Value::int(1)),
            Err(StoreError::EmptyPath)
        ));
    }

    #[test]
    fn delete_keeps_list_length() {
        let mut store = store();
        let record = store.delete(&Path::parse("rows.1")).unwrap();
        assert_eq!(record.prev, Value::int(2));
        let rows = store.get(&Path::parse("rows")).unwrap().as_list().unwrap().clone();
        assert_eq!(rows, vec![Value::int(1), Value::Null, Value::int(3)]);
    }

    #[test]
    fn merge_flattens_before_applying() {
        let mut store = store();
        store
            .merge(&Value::object([(
                "user",
                Value::object([("age", Value::int(30))]),
            )]))
            .unwrap();
        assert_eq!(store.get(&Path::parse("user.age")), Some(&Value::int(30)));
        // Sibling key survives because the partial was flattened first.
        assert_eq!(
            store.get(&Path::parse("user.name")),
            Some(&Value::text("ann"))
        );
    }

    #[test]
    fn reset_restores_initial_and_reports_diff() {
        let mut store = store();
        store.set(&Path::parse("user.name"), Value::text("bob")).unwrap();
        let records = store.reset(None);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, Path::parse("user.name"));
        assert_eq!(records[0].next, Value::text("ann"));
        assert_eq!(store.root(), store.initial());
    }

    #[test]
    fn expand_wildcard_requires_lists() {
        let store = store();
        let paths = store.expand_wildcard(&Pattern::parse("rows.*"));
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[0], Path::parse("rows.0"));
        // `user` is an object, not a list: no expansions.
        assert!(store.expand_wildcard(&Pattern::parse("user.*")).is_empty());
    }

    #[test]
    fn expand_wildcard_appends_trailing_segments() {
        let mut store = DataStore::new(Value::object([(
            "rows",
            Value::list([Value::empty_object(), Value::empty_object()]),
        )]));
        let paths = store.expand_wildcard(&Pattern::parse("rows.*.flag"));
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[1], Path::parse("rows.1.flag"));
        // Pattern writes may create the leaf afterwards.
        store.set(&paths[0], Value::bool(true)).unwrap();
        assert_eq!(
            store.get(&Path::parse("rows.0.flag")),
            Some(&Value::bool(true))
        );
    }
}
