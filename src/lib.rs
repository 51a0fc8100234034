//! Schema-driven reactive form data engine.
//!
//! Given a declarative schema tree and a data model, the engine derives a
//! render tree, keeps per-node computed flags current, propagates value and
//! structural changes through a network of user-declared subscriptions, and
//! validates fields — with single-flight batched updates and a bounded
//! fixed-point cascade.
//!
//! # Shape
//!
//! ```text
//! RawNode (schema) ──parse──▶ ParsedSchema ──┐
//!                                            ├──build──▶ render tree + computed
//! Value (model) ──▶ DataStore (COW root) ────┘
//!
//! update_value / list_* ──▶ Scheduler pending maps
//!        flush: write → dispatch subscriptions → recompute → notify, to
//!        quiescence (hard depth cap)
//! ```
//!
//! The engine performs no layout, styling or rendering and knows no
//! concrete UI component; the render tree and notifications are its whole
//! outward surface.

pub mod context;
pub mod control;
pub mod engine;
pub mod error;
pub mod list_op;
pub mod path;
pub mod render;
pub mod scheduler;
pub mod schema;
pub mod store;
pub mod subscribe;
pub mod validate;
pub mod value;

pub use context::ReadScope;
pub use control::Computed;
pub use engine::{
    ChangeNotification, EngineOptions, FormEngine, ListenerId, ResetTarget, ValueChangeFilter,
};
pub use error::{
    EngineError, EvalError, HandlerError, LifecycleError, ListOpError, SchedulerError,
    SchemaError, StoreError,
};
pub use list_op::{StructureEvent, StructureReason};
pub use path::{Path, Pattern, Segment, Target};
pub use render::RenderNode;
pub use scheduler::BatchId;
pub use schema::{
    ControlAttr, ControlExpr, NodeKind, ParsedSchema, PropsAttr, RawNode, SchemaNode,
    SubscribeEntry, SubscribeSpec, Subscribes,
};
pub use store::{ChangeRecord, DataStore};
pub use subscribe::{
    handler_async, handler_fn, ChangeEvent, EventKind, SubscribeCtx, SubscribeHandler, ValueEvent,
};
pub use validate::{
    validator_async, validator_fn, FieldError, FieldErrorKind, FieldValidator, ValidateOutcome,
    ValidationReport, ValidatorCtx, ValidatorVerdict,
};
pub use value::Value;
