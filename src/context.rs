//! Read-only evaluation scope.
//!
//! Control closures, subscription handlers and validators all read the
//! engine through this one struct: a root snapshot, the parsed schema, and
//! the position the callback runs at. It is constructed per call and passed
//! by value — there is no ambient shared context to capture.

use crate::path::Path;
use crate::schema::{ParsedSchema, SchemaNode};
use crate::store::read_path;
use crate::value::Value;
use std::sync::Arc;

#[derive(Clone)]
pub struct ReadScope {
    root: Value,
    schema: Arc<ParsedSchema>,
    at: Path,
}

impl ReadScope {
    pub(crate) fn new(root: Value, schema: Arc<ParsedSchema>, at: Path) -> Self {
        ReadScope { root, schema, at }
    }

    /// The render path this scope is anchored at.
    pub fn path(&self) -> &Path {
        &self.at
    }

    /// Value at the scope's own path.
    pub fn own_value(&self) -> Value {
        self.value_at(&self.at)
    }

    /// Value at an absolute dot path; `Null` when absent.
    pub fn get_value(&self, path: &str) -> Value {
        self.value_at(&Path::parse(path))
    }

    pub fn value_at(&self, path: &Path) -> Value {
        read_path(&self.root, path).cloned().unwrap_or(Value::Null)
    }

    /// Schema node for an absolute path (render or schema spelling).
    pub fn get_schema(&self, path: &str) -> Option<Arc<SchemaNode>> {
        self.schema
            .node_at_render(&Path::parse(path))
            .cloned()
    }

    pub fn own_schema(&self) -> Option<Arc<SchemaNode>> {
        self.schema.node_at_render(&self.at).cloned()
    }

    /// The nearest enclosing list row's value, walking the scope's path
    /// backward to the last numeric segment. `Null` outside any list.
    pub fn cur_row_value(&self) -> Value {
        match self.at.split_at_row() {
            Some((row_path, _, _)) => self.value_at(&row_path),
            None => Value::Null,
        }
    }

    /// The nearest enclosing list row's index, if any.
    pub fn cur_row_index(&self) -> Option<usize> {
        self.at.split_at_row().map(|(_, row, _)| row)
    }
}
