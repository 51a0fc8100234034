//! Render tree: the per-instance projection of schema + data.
//!
//! Nodes are `Arc`-shared and immutable; structural edits replace only the
//! spine from the root to the rebuilt subtree. The builder never evaluates
//! control attributes — `computed` stays absent until the control engine
//! runs over the tree.

use crate::control::Computed;
use crate::path::Path;
use crate::schema::{NodeKind, SchemaNode};
use crate::store::DataStore;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// One row of a list's children.
pub type RenderRow = Vec<Arc<RenderNode>>;

/// A schema node instantiated at a concrete data position. The schema node
/// is carried whole, so raw attributes, validators and passthrough props are
/// available verbatim.
pub struct RenderNode {
    pub schema: Arc<SchemaNode>,
    /// Concrete path: list rows spelled as numeric indices. For a `layout`
    /// node this mirrors its schema path; its children address the parent's
    /// path.
    pub render_path: Path,
    /// `form`/`layout` children, in schema order.
    pub children: Vec<Arc<RenderNode>>,
    /// `list` rows: one set of template children per array element.
    pub rows: Vec<RenderRow>,
    /// Present and consistent with the store once a cascade completes;
    /// never read mid-cascade.
    pub computed: Option<Computed>,
}

impl RenderNode {
    pub fn kind(&self) -> NodeKind {
        self.schema.kind
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }
}

impl fmt::Debug for RenderNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderNode")
            .field("kind", &self.kind())
            .field("render_path", &self.render_path.to_string())
            .field("children", &self.children.len())
            .field("rows", &self.rows.len())
            .field("computed", &self.computed)
            .finish()
    }
}

/// Build the full render tree for a schema root against the current store.
pub fn build_tree(schema_root: &Arc<SchemaNode>, store: &DataStore) -> Arc<RenderNode> {
    build_node(schema_root, store, &Path::root())
}

/// Instantiate one schema node with `base` as the enclosing data path.
pub fn build_node(schema: &Arc<SchemaNode>, store: &DataStore, base: &Path) -> Arc<RenderNode> {
    let render_path = if schema.name.is_empty() {
        base.clone()
    } else {
        base.key(schema.name.clone())
    };

    let mut children = Vec::new();
    let mut rows = Vec::new();
    match schema.kind {
        NodeKind::Form | NodeKind::Layout => {
            // Layout children stay on the parent's path.
            let child_base = if schema.kind == NodeKind::Layout {
                base
            } else {
                &render_path
            };
            children = schema
                .children
                .values()
                .map(|child| build_node(child, store, child_base))
                .collect();
        }
        NodeKind::List => {
            // Missing or non-list values read as a zero-length array.
            let len = store
                .get(&render_path)
                .and_then(Value::as_list)
                .map(Vec::len)
                .unwrap_or(0);
            rows = (0..len)
                .map(|i| {
                    let row_base = render_path.index(i);
                    schema
                        .children
                        .values()
                        .map(|child| build_node(child, store, &row_base))
                        .collect()
                })
                .collect();
        }
        NodeKind::Field => {}
    }

    Arc::new(RenderNode {
        schema: schema.clone(),
        render_path,
        children,
        rows,
        computed: None,
    })
}

/// Replace the subtree at `target` with a fresh build from its schema,
/// copy-on-write along the spine. Untouched siblings keep their identity.
/// Returns the (possibly unchanged) root.
pub fn rebuild_at(root: &Arc<RenderNode>, target: &Path, store: &DataStore) -> Arc<RenderNode> {
    rebuild_rec(root, target, store).unwrap_or_else(|| root.clone())
}

fn rebuild_rec(
    node: &Arc<RenderNode>,
    target: &Path,
    store: &DataStore,
) -> Option<Arc<RenderNode>> {
    if node.render_path == *target {
        let base = if node.schema.name.is_empty() {
            target.clone()
        } else {
            target.parent()
        };
        return Some(build_node(&node.schema, store, &base));
    }

    match node.kind() {
        NodeKind::Form | NodeKind::Layout => {
            let mut changed = false;
            let children: Vec<Arc<RenderNode>> = node
                .children
                .iter()
                .map(|child| {
                    // Layout children live on the parent's path, so a prefix
                    // test on the layout itself would skip them.
                    let reachable = target.starts_with(&child.render_path)
                        || child.kind() == NodeKind::Layout;
                    if reachable {
                        if let Some(rebuilt) = rebuild_rec(child, target, store) {
                            changed = true;
                            return rebuilt;
                        }
                    }
                    child.clone()
                })
                .collect();
            changed.then(|| {
                Arc::new(RenderNode {
                    schema: node.schema.clone(),
                    render_path: node.render_path.clone(),
                    children,
                    rows: node.rows.clone(),
                    computed: node.computed.clone(),
                })
            })
        }
        NodeKind::List => {
            if !target.starts_with(&node.render_path) {
                return None;
            }
            let mut changed = false;
            let rows: Vec<RenderRow> = node
                .rows
                .iter()
                .enumerate()
                .map(|(i, row)| {
                    let row_base = node.render_path.index(i);
                    if !target.starts_with(&row_base) {
                        return row.clone();
                    }
                    row.iter()
                        .map(|child| {
                            let reachable = target.starts_with(&child.render_path)
                                || child.kind() == NodeKind::Layout;
                            if reachable {
                                if let Some(rebuilt) = rebuild_rec(child, target, store) {
                                    changed = true;
                                    return rebuilt;
                                }
                            }
                            child.clone()
                        })
                        .collect()
                })
                .collect();
            changed.then(|| {
                Arc::new(RenderNode {
                    schema: node.schema.clone(),
                    render_path: node.render_path.clone(),
                    children: node.children.clone(),
                    rows,
                    computed: node.computed.clone(),
                })
            })
        }
        NodeKind::Field => None,
    }
}

/// Depth-first collection of every `field` node.
pub fn collect_fields(node: &Arc<RenderNode>, out: &mut Vec<Arc<RenderNode>>) {
    if node.kind() == NodeKind::Field {
        out.push(node.clone());
    }
    for child in &node.children {
        collect_fields(child, out);
    }
    for row in &node.rows {
        for child in row {
            collect_fields(child, out);
        }
    }
}

/// Find the node at a render path (exhaustive walk; layouts make prefix
/// pruning unsound).
pub fn find_node(node: &Arc<RenderNode>, render_path: &Path) -> Option<Arc<RenderNode>> {
    if node.render_path == *render_path {
        return Some(node.clone());
    }
    for child in &node.children {
        if let Some(found) = find_node(child, render_path) {
            return Some(found);
        }
    }
    for row in &node.rows {
        for child in row {
            if let Some(found) = find_node(child, render_path) {
                return Some(found);
            }
        }
    }
    None
}
