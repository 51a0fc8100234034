//! Subscription declarations, events and dispatch.
//!
//! Handlers are async closures invoked sequentially per dispatch. They never
//! mutate the engine directly: `update_value` and friends push requests into
//! an unbounded channel the scheduler drains between cascade iterations, so
//! a handler can only ever *queue* more work.

mod index;

pub use index::{ResolvedMatch, SubscriptionIndex};

use crate::context::ReadScope;
use crate::error::HandlerError;
use crate::list_op::StructureEvent;
use crate::path::Path;
use crate::scheduler::BatchId;
use crate::schema::{ParsedSchema, SchemaNode, SubscribeDecl};
use crate::value::Value;
use futures_channel::mpsc::UnboundedSender;
use futures_util::future::LocalBoxFuture;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// A scalar/object write: what was there before and what is there now.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueEvent {
    pub prev: Value,
    pub next: Value,
}

/// The two change shapes flowing through the cascade and to observers.
#[derive(Clone, Debug, PartialEq)]
pub enum ChangeEvent {
    Value(ValueEvent),
    Structure(StructureEvent),
}

impl ChangeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChangeEvent::Value(_) => EventKind::Value,
            ChangeEvent::Structure(_) => EventKind::Structure,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Value,
    Structure,
}

/// A subscription handler. Returns a future so handlers may await; failures
/// are caught and logged, never aborting the cascade.
pub type SubscribeHandler =
    Arc<dyn Fn(SubscribeCtx) -> LocalBoxFuture<'static, Result<(), HandlerError>>>;

/// Wrap a synchronous closure as a handler.
pub fn handler_fn(
    f: impl Fn(&mut SubscribeCtx) -> Result<(), HandlerError> + 'static,
) -> SubscribeHandler {
    Arc::new(move |mut ctx| -> LocalBoxFuture<'static, Result<(), HandlerError>> {
        let result = f(&mut ctx);
        Box::pin(futures_util::future::ready(result))
    })
}

/// Wrap an async closure as a handler.
pub fn handler_async<F, Fut>(f: F) -> SubscribeHandler
where
    F: Fn(SubscribeCtx) -> Fut + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + 'static,
{
    Arc::new(move |ctx| -> LocalBoxFuture<'static, Result<(), HandlerError>> {
        Box::pin(f(ctx))
    })
}

/// An update queued by a handler; the target may be a wildcard pattern,
/// expanded when the scheduler drains the queue.
#[derive(Clone, Debug)]
pub struct UpdateRequest {
    pub target: String,
    pub value: Value,
}

pub type UpdateSink = UnboundedSender<UpdateRequest>;

/// Everything a handler invocation sees. Reads go through a scope anchored
/// at the *subscriber's* resolved position; writes are queued.
pub struct SubscribeCtx {
    /// The path the change happened at.
    pub path: Path,
    /// The declared target string this match came from.
    pub target: Arc<str>,
    /// The subscriber's resolved render path.
    pub subscriber_path: Path,
    pub event: ChangeEvent,
    /// Captured wildcard indices, in pattern order.
    pub stars: SmallVec<[usize; 4]>,
    pub batch_id: BatchId,
    scope: ReadScope,
    updates: UpdateSink,
}

impl SubscribeCtx {
    pub fn get_value(&self, path: &str) -> Value {
        self.scope.get_value(path)
    }

    /// Value at the subscriber's own path.
    pub fn own_value(&self) -> Value {
        self.scope.own_value()
    }

    pub fn get_schema(&self, path: &str) -> Option<Arc<SchemaNode>> {
        self.scope.get_schema(path)
    }

    pub fn cur_row_value(&self) -> Value {
        self.scope.cur_row_value()
    }

    pub fn cur_row_index(&self) -> Option<usize> {
        self.scope.cur_row_index()
    }

    pub fn scope(&self) -> &ReadScope {
        &self.scope
    }

    /// Queue a write; applied by the scheduler on the next cascade
    /// iteration, never immediately.
    pub fn update_value(&mut self, target: impl Into<String>, value: Value) {
        let _ = self.updates.unbounded_send(UpdateRequest {
            target: target.into(),
            value,
        });
    }

    pub fn update_values(
        &mut self,
        entries: impl IntoIterator<Item = (impl Into<String>, Value)>,
    ) {
        for (target, value) in entries {
            self.update_value(target, value);
        }
    }

    /// Queue a write to the subscriber's own path.
    pub fn update_self(&mut self, value: Value) {
        let target = self.subscriber_path.to_string();
        self.update_value(target, value);
    }
}

impl fmt::Debug for SubscribeCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SubscribeCtx {{ path: {}, subscriber: {}, target: {} }}",
            self.path, self.subscriber_path, self.target
        )
    }
}

/// Run every matched handler sequentially. A failing handler is logged and
/// does not stop its siblings. Handlers declared once-per-batch run at most
/// once per `(subscriber_path, target)` within one batch.
pub(crate) async fn dispatch_matches(
    matches: Vec<ResolvedMatch>,
    trigger: &Path,
    event: &ChangeEvent,
    batch_id: BatchId,
    root: &Value,
    schema: &Arc<ParsedSchema>,
    sink: &UpdateSink,
    batch_seen: &mut FxHashSet<(Path, Arc<str>)>,
) {
    for matched in matches {
        let decl: &Arc<SubscribeDecl> = &matched.decl;
        if decl.once_per_batch {
            let key = (matched.subscriber_path.clone(), decl.raw_target.clone());
            if !batch_seen.insert(key) {
                continue;
            }
        }
        let ctx = SubscribeCtx {
            path: trigger.clone(),
            target: decl.raw_target.clone(),
            subscriber_path: matched.subscriber_path.clone(),
            event: event.clone(),
            stars: matched.stars.clone(),
            batch_id,
            scope: ReadScope::new(root.clone(), schema.clone(), matched.subscriber_path.clone()),
            updates: sink.clone(),
        };
        if let Err(err) = (decl.handler)(ctx).await {
            log::warn!(
                "subscription `{}` of `{}` failed on `{trigger}`: {err}",
                decl.raw_target,
                matched.subscriber_path,
            );
        }
    }
}
