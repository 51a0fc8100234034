//! Error taxonomy.
//!
//! Parse-time schema defects, empty-path store mutations, out-of-range list
//! indices, the max-depth cascade abort and destroyed-engine misuse all
//! surface as errors. Handler, validator and control-closure failures do NOT
//! land here: they are caught at the invocation site, logged, and degrade to
//! the documented default.

use crate::path::Path;
use thiserror::Error;

/// Structural schema defect, raised at parse time with the offending path.
/// Parsing aborts entirely; there is no partial tree.
#[derive(Debug, Clone, Error)]
#[error("schema error at `{path}`: {detail}")]
pub struct SchemaError {
    pub path: Path,
    pub detail: String,
}

impl SchemaError {
    pub fn new(path: Path, detail: impl Into<String>) -> Self {
        SchemaError {
            path,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// `set("", ..)` and friends: the root is replaced via `reset`, never
    /// through a path write.
    #[error("cannot mutate the store through an empty path")]
    EmptyPath,
}

#[derive(Debug, Clone, Error)]
pub enum ListOpError {
    /// Bounded operations (`remove`/`move`/`swap`/`replace`) reject indices
    /// outside `[0, len)`. `insert` clamps instead.
    #[error("index {index} out of range for list `{list}` of length {len}")]
    IndexOutOfRange {
        list: Path,
        index: usize,
        len: usize,
    },
}

#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    /// The cascade failed to reach a fixed point: handlers kept scheduling
    /// work past the configured depth. The in-flight flush is aborted and
    /// all pending work discarded.
    #[error("update cascade exceeded the maximum depth of {max_depth}")]
    MaxDepthExceeded { max_depth: u32 },
}

/// Operating on an engine after `destroy()`.
#[derive(Debug, Clone, Error)]
#[error("engine has been destroyed")]
pub struct LifecycleError;

/// Any error the public surface can produce.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    ListOp(#[from] ListOpError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Failure returned by a subscription handler or a custom validator.
/// Handlers: caught and logged, siblings still run. Validators: reported as
/// a distinct error kind on the field.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(msg: impl Into<String>) -> Self {
        HandlerError(msg.into())
    }
}

/// Failure returned by a control-attribute or props closure; caught, logged,
/// and replaced by the attribute's default.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct EvalError(pub String);

impl EvalError {
    pub fn new(msg: impl Into<String>) -> Self {
        EvalError(msg.into())
    }
}
