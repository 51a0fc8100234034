//! Structural list edits.
//!
//! A stateless façade over the store: read the current array (missing or
//! non-list reads as empty), apply an immutable transform, write the new
//! array back, and describe what happened as a `StructureEvent`. The
//! `reindexed` set enumerates every new-array index whose row identity or
//! position changed — dependents re-read exactly those rows.

use crate::error::{EngineError, ListOpError};
use crate::path::Path;
use crate::store::DataStore;
use crate::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StructureReason {
    Add,
    Remove,
    Move,
    Replace,
}

/// A normalized structural change on one list.
#[derive(Clone, Debug, PartialEq)]
pub struct StructureEvent {
    pub reason: StructureReason,
    pub added: Vec<usize>,
    pub removed: Vec<usize>,
    pub moves: Vec<(usize, usize)>,
    pub reindexed: Vec<usize>,
}

impl StructureEvent {
    fn new(reason: StructureReason) -> Self {
        StructureEvent {
            reason,
            added: Vec::new(),
            removed: Vec::new(),
            moves: Vec::new(),
            reindexed: Vec::new(),
        }
    }
}

fn current(store: &DataStore, list: &Path) -> Vec<Value> {
    store
        .get(list)
        .and_then(Value::as_list)
        .cloned()
        .unwrap_or_default()
}

fn check_index(list: &Path, index: usize, len: usize) -> Result<(), ListOpError> {
    if index >= len {
        return Err(ListOpError::IndexOutOfRange {
            list: list.clone(),
            index,
            len,
        });
    }
    Ok(())
}

fn write_back(
    store: &mut DataStore,
    list: &Path,
    items: Vec<Value>,
) -> Result<(), EngineError> {
    store.set(list, Value::List(std::sync::Arc::new(items)))?;
    Ok(())
}

pub fn append(
    store: &mut DataStore,
    list: &Path,
    item: Value,
) -> Result<StructureEvent, EngineError> {
    let mut items = current(store, list);
    let index = items.len();
    items.push(item);
    write_back(store, list, items)?;
    let mut event = StructureEvent::new(StructureReason::Add);
    event.added.push(index);
    event.reindexed.push(index);
    Ok(event)
}

/// Insert never fails on index: past-the-end clamps to an append.
pub fn insert(
    store: &mut DataStore,
    list: &Path,
    index: usize,
    item: Value,
) -> Result<StructureEvent, EngineError> {
    let mut items = current(store, list);
    let index = index.min(items.len());
    items.insert(index, item);
    let new_len = items.len();
    write_back(store, list, items)?;
    let mut event = StructureEvent::new(StructureReason::Add);
    event.added.push(index);
    event.reindexed = (index..new_len).collect();
    Ok(event)
}

pub fn remove(
    store: &mut DataStore,
    list: &Path,
    index: usize,
) -> Result<StructureEvent, EngineError> {
    let mut items = current(store, list);
    check_index(list, index, items.len())?;
    items.remove(index);
    let new_len = items.len();
    write_back(store, list, items)?;
    let mut event = StructureEvent::new(StructureReason::Remove);
    event.removed.push(index);
    // Everything after the removed slot shifted; the removed slot itself is
    // gone and never re-indexed.
    event.reindexed = (index..new_len).collect();
    Ok(event)
}

pub fn move_row(
    store: &mut DataStore,
    list: &Path,
    from: usize,
    to: usize,
) -> Result<StructureEvent, EngineError> {
    let mut items = current(store, list);
    check_index(list, from, items.len())?;
    check_index(list, to, items.len())?;
    let item = items.remove(from);
    items.insert(to, item);
    write_back(store, list, items)?;
    let mut event = StructureEvent::new(StructureReason::Move);
    event.moves.push((from, to));
    event.reindexed = (from.min(to)..=from.max(to)).collect();
    Ok(event)
}

pub fn swap(
    store: &mut DataStore,
    list: &Path,
    a: usize,
    b: usize,
) -> Result<StructureEvent, EngineError> {
    let mut items = current(store, list);
    check_index(list, a, items.len())?;
    check_index(list, b, items.len())?;
    items.swap(a, b);
    write_back(store, list, items)?;
    let mut event = StructureEvent::new(StructureReason::Move);
    event.moves.push((a, b));
    event.moves.push((b, a));
    event.reindexed = (a.min(b)..=a.max(b)).collect();
    Ok(event)
}

pub fn replace(
    store: &mut DataStore,
    list: &Path,
    index: usize,
    item: Value,
) -> Result<StructureEvent, EngineError> {
    let mut items = current(store, list);
    check_index(list, index, items.len())?;
    items[index] = item;
    write_back(store, list, items)?;
    let mut event = StructureEvent::new(StructureReason::Replace);
    event.reindexed.push(index);
    Ok(event)
}

pub fn clear(store: &mut DataStore, list: &Path) -> Result<StructureEvent, EngineError> {
    let items = current(store, list);
    let len = items.len();
    write_back(store, list, Vec::new())?;
    let mut event = StructureEvent::new(StructureReason::Remove);
    event.removed = (0..len).collect();
    Ok(event)
}

/// Positional diff between two arrays. Classifies each index without
/// assuming any row identity: same index + different value → changed.
pub fn diff_array(old: &[Value], new: &[Value]) -> StructureEvent {
    let mut event = StructureEvent::new(StructureReason::Replace);
    let longest = old.len().max(new.len());
    for i in 0..longest {
        match (old.get(i), new.get(i)) {
            (Some(prev), Some(next)) => {
                if prev != next {
                    event.reindexed.push(i);
                }
            }
            (None, Some(_)) => {
                event.added.push(i);
                event.reindexed.push(i);
            }
            (Some(_), None) => {
                event.removed.push(i);
            }
            (None, None) => unreachable!(),
        }
    }
    event
}
