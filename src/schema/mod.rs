//! Schema tree: the declarative description a form engine instance is built
//! from.
//!
//! `RawNode` mirrors the wire shape (`type`, child mappings, control
//! attributes, subscriptions, validators, passthrough props). Parsing turns
//! it into an `Arc`-shared `SchemaNode` tree plus the indices the rest of
//! the engine works against. Authoring helpers beyond the plain struct
//! literals are intentionally absent.

mod parse;

pub use parse::parse_schema;

use crate::context::ReadScope;
use crate::error::EvalError;
use crate::path::{Path, Target};
use crate::subscribe::SubscribeHandler;
use crate::validate::FieldValidator;
use crate::value::Value;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// The four schema node kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Form,
    Layout,
    List,
    Field,
}

impl Default for NodeKind {
    fn default() -> Self {
        NodeKind::Field
    }
}

/// A pure control closure over the read scope. An `Err` is logged and the
/// attribute's default is used instead.
pub type ControlFn = Arc<dyn Fn(&ReadScope) -> Result<bool, EvalError>>;

/// A props closure; `Err` degrades to "no props".
pub type PropsFn = Arc<dyn Fn(&ReadScope) -> Result<IndexMap<String, Value>, EvalError>>;

/// The value side of a control attribute: a literal or a closure.
#[derive(Clone)]
pub enum ControlExpr {
    Literal(bool),
    Func(ControlFn),
}

/// One of `required`/`disabled`/`readonly`/`if_show`/`show`.
///
/// `When` is the `{when, deps}` object form; `deps` is carried for
/// documentation but never consulted to drive re-evaluation.
#[derive(Clone, Default)]
pub enum ControlAttr {
    #[default]
    Unset,
    Expr(ControlExpr),
    When { when: ControlExpr, deps: Vec<String> },
}

impl ControlAttr {
    pub fn literal(value: bool) -> Self {
        ControlAttr::Expr(ControlExpr::Literal(value))
    }

    pub fn func(f: impl Fn(&ReadScope) -> Result<bool, EvalError> + 'static) -> Self {
        ControlAttr::Expr(ControlExpr::Func(Arc::new(f)))
    }

    pub fn when(
        f: impl Fn(&ReadScope) -> Result<bool, EvalError> + 'static,
        deps: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        ControlAttr::When {
            when: ControlExpr::Func(Arc::new(f)),
            deps: deps.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, ControlAttr::Unset)
    }
}

impl fmt::Debug for ControlAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlAttr::Unset => write!(f, "Unset"),
            ControlAttr::Expr(ControlExpr::Literal(b)) => write!(f, "Literal({b})"),
            ControlAttr::Expr(ControlExpr::Func(_)) => write!(f, "Func(..)"),
            ControlAttr::When { deps, .. } => write!(f, "When {{ deps: {deps:?} }}"),
        }
    }
}

/// `component_props` / `form_item_props`: a static map or a closure.
#[derive(Clone, Default)]
pub enum PropsAttr {
    #[default]
    Unset,
    Static(Arc<IndexMap<String, Value>>),
    Func(PropsFn),
}

impl PropsAttr {
    pub fn fixed(props: impl IntoIterator<Item = (impl Into<String>, Value)>) -> Self {
        PropsAttr::Static(Arc::new(
            props.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn func(
        f: impl Fn(&ReadScope) -> Result<IndexMap<String, Value>, EvalError> + 'static,
    ) -> Self {
        PropsAttr::Func(Arc::new(f))
    }
}

impl fmt::Debug for PropsAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropsAttr::Unset => write!(f, "Unset"),
            PropsAttr::Static(map) => write!(f, "Static({} props)", map.len()),
            PropsAttr::Func(_) => write!(f, "Func(..)"),
        }
    }
}

/// Raw subscription declarations on a node. Both syntaxes normalize into the
/// same flattened `SubscribeDecl` shape at parse time.
#[derive(Clone, Default)]
pub enum Subscribes {
    #[default]
    None,
    /// Mapping style: target string → handler (or handler with options).
    Map(Vec<(String, SubscribeSpec)>),
    /// Array style: explicit entries.
    List(Vec<SubscribeEntry>),
}

#[derive(Clone)]
pub enum SubscribeSpec {
    Handler(SubscribeHandler),
    WithOptions {
        handler: SubscribeHandler,
        once_per_batch: bool,
    },
}

#[derive(Clone)]
pub struct SubscribeEntry {
    pub target: String,
    pub handler: SubscribeHandler,
    pub once_per_batch: bool,
}

/// Wire-shaped schema node. `children` is the `form`/`layout` child mapping;
/// `items` is the `list` row template keyed by field name; a `field` carries
/// neither. Everything else is control attributes, subscriptions, validators
/// and passthrough UI props.
#[derive(Clone, Default)]
pub struct RawNode {
    pub kind: NodeKind,
    pub children: IndexMap<String, RawNode>,
    pub items: IndexMap<String, RawNode>,
    pub required: ControlAttr,
    pub disabled: ControlAttr,
    pub readonly: ControlAttr,
    pub if_show: ControlAttr,
    pub show: ControlAttr,
    pub default_value: Option<Value>,
    pub subscribes: Subscribes,
    pub validators: Vec<FieldValidator>,
    pub component: Option<Arc<str>>,
    pub component_props: PropsAttr,
    pub form_item_props: PropsAttr,
    pub extra: IndexMap<String, Value>,
}

impl RawNode {
    pub fn form(children: impl IntoIterator<Item = (impl Into<String>, RawNode)>) -> Self {
        RawNode {
            kind: NodeKind::Form,
            children: children.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            ..RawNode::default()
        }
    }

    pub fn layout(children: impl IntoIterator<Item = (impl Into<String>, RawNode)>) -> Self {
        RawNode {
            kind: NodeKind::Layout,
            children: children.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            ..RawNode::default()
        }
    }

    pub fn list(items: impl IntoIterator<Item = (impl Into<String>, RawNode)>) -> Self {
        RawNode {
            kind: NodeKind::List,
            items: items.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            ..RawNode::default()
        }
    }

    pub fn field() -> Self {
        RawNode::default()
    }
}

/// Parsed, immutable schema node.
#[derive(Clone)]
pub struct SchemaNode {
    pub kind: NodeKind,
    pub name: Arc<str>,
    /// Schema path: list rows spelled as the literal `items` segment. For a
    /// `layout` node this is `parent_path + name` (index key only); its
    /// children address data against the parent's path.
    pub schema_path: Path,
    /// `form`/`layout` children, or the `list` row template fields.
    pub children: IndexMap<String, Arc<SchemaNode>>,
    pub required: ControlAttr,
    pub disabled: ControlAttr,
    pub readonly: ControlAttr,
    pub if_show: ControlAttr,
    pub show: ControlAttr,
    pub default_value: Option<Value>,
    pub validators: Vec<FieldValidator>,
    pub component: Option<Arc<str>>,
    pub component_props: PropsAttr,
    pub form_item_props: PropsAttr,
    pub extra: IndexMap<String, Value>,
}

impl fmt::Debug for SchemaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaNode")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("schema_path", &self.schema_path.to_string())
            .field("children", &self.children.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// One normalized subscription declaration, extracted at parse time.
#[derive(Clone)]
pub struct SubscribeDecl {
    /// Schema path of the declaring node.
    pub subscriber_path: Path,
    /// The declared target string (after comma expansion).
    pub raw_target: Arc<str>,
    /// Classification, computed once.
    pub target: Target,
    pub handler: SubscribeHandler,
    pub once_per_batch: bool,
}

impl fmt::Debug for SubscribeDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SubscribeDecl {{ subscriber: {}, target: {} }}",
            self.subscriber_path, self.raw_target
        )
    }
}

/// The parse output: the typed tree plus its indices and the flattened
/// subscription declarations.
pub struct ParsedSchema {
    pub root: Arc<SchemaNode>,
    /// Unique schema-path index.
    pub by_path: FxHashMap<Path, Arc<SchemaNode>>,
    /// Non-unique name index: the same field name may appear in several
    /// containers.
    pub by_name: FxHashMap<String, Vec<Arc<SchemaNode>>>,
    pub subscriptions: Vec<Arc<SubscribeDecl>>,
}

impl ParsedSchema {
    pub fn node_at(&self, schema_path: &Path) -> Option<&Arc<SchemaNode>> {
        self.by_path.get(schema_path)
    }

    /// Resolve a render path (numeric rows) through the schema-path index.
    pub fn node_at_render(&self, render_path: &Path) -> Option<&Arc<SchemaNode>> {
        self.by_path.get(&render_path.to_schema_path())
    }

    pub fn kind_at_render(&self, render_path: &Path) -> Option<NodeKind> {
        self.node_at_render(render_path).map(|node| node.kind)
    }
}

impl fmt::Debug for ParsedSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedSchema")
            .field("paths", &self.by_path.len())
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}
