//! Raw schema → typed tree.
//!
//! Validates the structural rules (root is `form`; only `form`/`layout`
//! carry child mappings; only `list` carries an item template; `field`
//! carries neither), builds the path and name indices, and extracts every
//! subscription declaration in one traversal. Any defect aborts the whole
//! parse with the offending path; there is no partial tree.

use super::{
    NodeKind, ParsedSchema, RawNode, SchemaNode, SubscribeDecl, SubscribeSpec, Subscribes,
};
use crate::error::SchemaError;
use crate::path::{split_targets, Path, Target, ITEMS};
use rustc_hash::FxHashMap;
use std::sync::Arc;

pub fn parse_schema(raw: &RawNode) -> Result<ParsedSchema, SchemaError> {
    if raw.kind != NodeKind::Form {
        return Err(SchemaError::new(Path::root(), "root node must be a form"));
    }

    let mut builder = Builder::default();
    let root = builder.build(raw, Arc::from(""), Path::root(), Path::root())?;
    Ok(ParsedSchema {
        root,
        by_path: builder.by_path,
        by_name: builder.by_name,
        subscriptions: builder.subscriptions,
    })
}

#[derive(Default)]
struct Builder {
    by_path: FxHashMap<Path, Arc<SchemaNode>>,
    by_name: FxHashMap<String, Vec<Arc<SchemaNode>>>,
    subscriptions: Vec<Arc<SubscribeDecl>>,
}

impl Builder {
    /// `own_path` indexes the node itself; `child_base` is what its children
    /// extend (for `layout` the parent's path, unchanged).
    fn build(
        &mut self,
        raw: &RawNode,
        name: Arc<str>,
        own_path: Path,
        child_base: Path,
    ) -> Result<Arc<SchemaNode>, SchemaError> {
        self.check_shape(raw, &own_path)?;

        let mut children = indexmap::IndexMap::new();
        match raw.kind {
            NodeKind::Form | NodeKind::Layout => {
                for (child_name, child_raw) in &raw.children {
                    let child_path = child_base.key(child_name.as_str());
                    let grand_base = match child_raw.kind {
                        // A layout child's own children stay on this base.
                        NodeKind::Layout => child_base.clone(),
                        _ => child_path.clone(),
                    };
                    let child =
                        self.build(child_raw, Arc::from(child_name.as_str()), child_path, grand_base)?;
                    children.insert(child_name.clone(), child);
                }
            }
            NodeKind::List => {
                let row_base = own_path.key(ITEMS);
                for (child_name, child_raw) in &raw.items {
                    let child_path = row_base.key(child_name.as_str());
                    let grand_base = match child_raw.kind {
                        NodeKind::Layout => row_base.clone(),
                        _ => child_path.clone(),
                    };
                    let child =
                        self.build(child_raw, Arc::from(child_name.as_str()), child_path, grand_base)?;
                    children.insert(child_name.clone(), child);
                }
            }
            NodeKind::Field => {}
        }

        let node = Arc::new(SchemaNode {
            kind: raw.kind,
            name,
            schema_path: own_path.clone(),
            children,
            required: raw.required.clone(),
            disabled: raw.disabled.clone(),
            readonly: raw.readonly.clone(),
            if_show: raw.if_show.clone(),
            show: raw.show.clone(),
            default_value: raw.default_value.clone(),
            validators: raw.validators.clone(),
            component: raw.component.clone(),
            component_props: raw.component_props.clone(),
            form_item_props: raw.form_item_props.clone(),
            extra: raw.extra.clone(),
        });

        if self.by_path.insert(own_path.clone(), node.clone()).is_some() {
            return Err(SchemaError::new(own_path, "duplicate schema path"));
        }
        if !node.name.is_empty() {
            self.by_name
                .entry(node.name.to_string())
                .or_default()
                .push(node.clone());
        }

        self.extract_subscriptions(raw, &own_path);
        Ok(node)
    }

    fn check_shape(&self, raw: &RawNode, path: &Path) -> Result<(), SchemaError> {
        match raw.kind {
            NodeKind::Form | NodeKind::Layout => {
                if !raw.items.is_empty() {
                    return Err(SchemaError::new(
                        path.clone(),
                        "only a list node may declare an item template",
                    ));
                }
            }
            NodeKind::List => {
                if !raw.children.is_empty() {
                    return Err(SchemaError::new(
                        path.clone(),
                        "a list node declares its row shape under `items`, not `children`",
                    ));
                }
                if raw.items.is_empty() {
                    return Err(SchemaError::new(
                        path.clone(),
                        "a list node must declare an item template",
                    ));
                }
            }
            NodeKind::Field => {
                if !raw.children.is_empty() || !raw.items.is_empty() {
                    return Err(SchemaError::new(
                        path.clone(),
                        "a field node must not declare children or an item template",
                    ));
                }
            }
        }
        Ok(())
    }

    fn extract_subscriptions(&mut self, raw: &RawNode, subscriber_path: &Path) {
        let entries: Vec<(String, super::SubscribeHandler, bool)> = match &raw.subscribes {
            Subscribes::None => Vec::new(),
            Subscribes::Map(pairs) => pairs
                .iter()
                .map(|(target, spec)| match spec {
                    SubscribeSpec::Handler(handler) => (target.clone(), handler.clone(), false),
                    SubscribeSpec::WithOptions {
                        handler,
                        once_per_batch,
                    } => (target.clone(), handler.clone(), *once_per_batch),
                })
                .collect(),
            Subscribes::List(list) => list
                .iter()
                .map(|entry| (entry.target.clone(), entry.handler.clone(), entry.once_per_batch))
                .collect(),
        };

        for (raw_target, handler, once_per_batch) in entries {
            for piece in split_targets(&raw_target) {
                self.subscriptions.push(Arc::new(SubscribeDecl {
                    subscriber_path: subscriber_path.clone(),
                    raw_target: Arc::from(piece),
                    target: Target::parse(piece),
                    handler: handler.clone(),
                    once_per_batch,
                }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscribe::handler_fn;

    fn noop() -> super::super::SubscribeHandler {
        handler_fn(|_ctx| Ok(()))
    }

    #[test]
    fn root_must_be_form() {
        let err = parse_schema(&RawNode::field()).unwrap_err();
        assert!(err.detail.contains("form"));
    }

    #[test]
    fn field_must_be_a_leaf() {
        let mut bad = RawNode::field();
        bad.children.insert("x".into(), RawNode::field());
        let schema = RawNode::form([("bad", bad)]);
        let err = parse_schema(&schema).unwrap_err();
        assert_eq!(err.path, Path::parse("bad"));
    }

    #[test]
    fn list_requires_item_template() {
        let bad = RawNode {
            kind: NodeKind::List,
            ..RawNode::default()
        };
        let err = parse_schema(&RawNode::form([("rows", bad)])).unwrap_err();
        assert!(err.detail.contains("item template"));
    }

    #[test]
    fn layout_children_share_the_parent_base() {
        let schema = RawNode::form([(
            "group",
            RawNode::layout([("name", RawNode::field())]),
        )]);
        let parsed = parse_schema(&schema).unwrap();
        // The layout is indexed under its own name, its child under the root.
        assert!(parsed.node_at(&Path::parse("group")).is_some());
        let name = parsed.node_at(&Path::parse("name")).unwrap();
        assert_eq!(name.kind, NodeKind::Field);
    }

    #[test]
    fn list_rows_are_indexed_under_items() {
        let schema = RawNode::form([(
            "rows",
            RawNode::list([("price", RawNode::field())]),
        )]);
        let parsed = parse_schema(&schema).unwrap();
        assert!(parsed.node_at(&Path::parse("rows.items.price")).is_some());
        assert_eq!(
            parsed.kind_at_render(&Path::parse("rows.3.price")),
            Some(NodeKind::Field)
        );
    }

    #[test]
    fn comma_targets_expand_into_separate_declarations() {
        let mut field = RawNode::field();
        field.subscribes = Subscribes::Map(vec![(
            ".price, .count".to_string(),
            SubscribeSpec::Handler(noop()),
        )]);
        let schema = RawNode::form([(
            "rows",
            RawNode::list([("subtotal", field), ("price", RawNode::field())]),
        )]);
        let parsed = parse_schema(&schema).unwrap();
        assert_eq!(parsed.subscriptions.len(), 2);
        assert_eq!(parsed.subscriptions[0].raw_target.as_ref(), ".price");
        assert_eq!(parsed.subscriptions[1].raw_target.as_ref(), ".count");
        assert_eq!(
            parsed.subscriptions[0].subscriber_path,
            Path::parse("rows.items.subtotal")
        );
    }

    #[test]
    fn same_name_in_two_containers_is_indexed_twice() {
        fn group() -> RawNode {
            RawNode {
                kind: NodeKind::Form,
                children: [("name".to_string(), RawNode::field())].into_iter().collect(),
                ..RawNode::default()
            }
        }
        let schema = RawNode::form([("a", group()), ("b", group())]);
        let parsed = parse_schema(&schema).unwrap();
        assert_eq!(parsed.by_name.get("name").map(Vec::len), Some(2));
    }
}
