//! Computed-attribute engine.
//!
//! One full-tree pass evaluates every node's control attributes against a
//! read scope and folds the inheritable flags top-down with an explicit
//! accumulator: `disabled`/`readonly` OR with the parent, `if_show` ANDs,
//! `required`/`show` never inherit. The pass is idempotent — unchanged
//! sources produce value-equal records and keep node identity.

use crate::context::ReadScope;
use crate::render::{RenderNode, RenderRow};
use crate::schema::{ControlAttr, ControlExpr, ParsedSchema, PropsAttr};
use crate::value::Value;
use indexmap::IndexMap;
use std::sync::Arc;

/// The per-node computed record. Present on every node once a cascade
/// completes.
#[derive(Clone, Debug, PartialEq)]
pub struct Computed {
    pub required: bool,
    pub disabled: bool,
    pub readonly: bool,
    pub if_show: bool,
    pub show: bool,
    pub component_props: Option<Arc<IndexMap<String, Value>>>,
    pub form_item_props: Option<Arc<IndexMap<String, Value>>>,
}

/// Flags a parent pushes down. `required` and `show` are absent on purpose.
#[derive(Clone, Copy)]
struct Inherited {
    disabled: bool,
    readonly: bool,
    if_show: bool,
}

/// Evaluate one control attribute. A closure failure is logged and replaced
/// by the attribute's default; `deps` on the object form is never consulted.
pub(crate) fn eval_attr(attr: &ControlAttr, scope: &ReadScope, default: bool) -> bool {
    let expr = match attr {
        ControlAttr::Unset => return default,
        ControlAttr::Expr(expr) => expr,
        ControlAttr::When { when, .. } => when,
    };
    match expr {
        ControlExpr::Literal(value) => *value,
        ControlExpr::Func(f) => match f(scope) {
            Ok(value) => value,
            Err(err) => {
                log::warn!(
                    "control attribute at `{}` failed: {err}; using default {default}",
                    scope.path()
                );
                default
            }
        },
    }
}

fn eval_props(attr: &PropsAttr, scope: &ReadScope) -> Option<Arc<IndexMap<String, Value>>> {
    match attr {
        PropsAttr::Unset => None,
        PropsAttr::Static(props) => Some(props.clone()),
        PropsAttr::Func(f) => match f(scope) {
            Ok(props) => Some(Arc::new(props)),
            Err(err) => {
                log::warn!("props at `{}` failed: {err}; omitting", scope.path());
                None
            }
        },
    }
}

/// Recompute the whole tree. Returns the same root Arc when nothing changed.
pub fn recompute_tree(
    root: &Arc<RenderNode>,
    store_root: &Value,
    schema: &Arc<ParsedSchema>,
) -> Arc<RenderNode> {
    recompute_node(
        root,
        store_root,
        schema,
        Inherited {
            disabled: false,
            readonly: false,
            if_show: true,
        },
    )
}

fn recompute_node(
    node: &Arc<RenderNode>,
    store_root: &Value,
    schema: &Arc<ParsedSchema>,
    inherited: Inherited,
) -> Arc<RenderNode> {
    let scope = ReadScope::new(
        store_root.clone(),
        schema.clone(),
        node.render_path.clone(),
    );
    let attrs = &node.schema;

    let computed = Computed {
        required: eval_attr(&attrs.required, &scope, false),
        disabled: eval_attr(&attrs.disabled, &scope, false) || inherited.disabled,
        readonly: eval_attr(&attrs.readonly, &scope, false) || inherited.readonly,
        if_show: eval_attr(&attrs.if_show, &scope, true) && inherited.if_show,
        show: eval_attr(&attrs.show, &scope, true),
        component_props: eval_props(&attrs.component_props, &scope),
        form_item_props: eval_props(&attrs.form_item_props, &scope),
    };

    let push_down = Inherited {
        disabled: computed.disabled,
        readonly: computed.readonly,
        if_show: computed.if_show,
    };

    let mut children_changed = false;
    let children: Vec<Arc<RenderNode>> = node
        .children
        .iter()
        .map(|child| {
            let recomputed = recompute_node(child, store_root, schema, push_down);
            if !Arc::ptr_eq(&recomputed, child) {
                children_changed = true;
            }
            recomputed
        })
        .collect();
    let rows: Vec<RenderRow> = node
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|child| {
                    let recomputed = recompute_node(child, store_root, schema, push_down);
                    if !Arc::ptr_eq(&recomputed, child) {
                        children_changed = true;
                    }
                    recomputed
                })
                .collect()
        })
        .collect();

    if !children_changed && node.computed.as_ref() == Some(&computed) {
        return node.clone();
    }
    Arc::new(RenderNode {
        schema: node.schema.clone(),
        render_path: node.render_path.clone(),
        children,
        rows,
        computed: Some(computed),
    })
}
