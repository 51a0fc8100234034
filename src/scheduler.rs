//! Update scheduler: batching, the fixed-point cascade loop, and cycle
//! detection.
//!
//! State machine: idle → scheduled → flushing → idle. Mutations merge into
//! the pending maps and *request* a flush; a request arriving while a flush
//! is running only queues — the running loop picks it up on its next
//! iteration instead of a second flush starting. The loop drains to
//! quiescence with a hard depth cap: exceeding it clears every piece of
//! pending work and fails the whole flush, which is how reciprocal handler
//! cycles surface.

use crate::control;
use crate::engine::{ChangeNotification, EngineCore};
use crate::error::{EngineError, SchedulerError};
use crate::list_op::{self, StructureEvent};
use crate::path::{Path, Pattern};
use crate::render;
use crate::schema::{NodeKind, SchemaNode};
use crate::store::DataStore;
use crate::subscribe::{dispatch_matches, ChangeEvent, UpdateRequest, ValueEvent};
use crate::value::Value;
use futures_channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::Arc;
use ulid::Ulid;

/// Opaque identifier scoping one flush; keys the once-per-batch handler
/// dedupe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BatchId(Ulid);

impl BatchId {
    pub(crate) fn new() -> Self {
        BatchId(Ulid::new())
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub(crate) struct Scheduler {
    /// Last writer per path wins; insertion order is write order.
    pending_values: IndexMap<Path, Value>,
    /// Structural events queued per list path, in arrival order.
    pending_lists: IndexMap<Path, Vec<StructureEvent>>,
    scheduled: bool,
    flushing: bool,
    max_depth: u32,
    update_tx: UnboundedSender<UpdateRequest>,
    update_rx: UnboundedReceiver<UpdateRequest>,
    /// `(subscriber_path, target)` pairs already run this batch.
    batch_seen: FxHashSet<(Path, Arc<str>)>,
}

impl Scheduler {
    pub(crate) fn new(max_depth: u32) -> Self {
        let (update_tx, update_rx) = mpsc::unbounded();
        Scheduler {
            pending_values: IndexMap::new(),
            pending_lists: IndexMap::new(),
            scheduled: false,
            flushing: false,
            max_depth,
            update_tx,
            update_rx,
            batch_seen: FxHashSet::default(),
        }
    }

    pub(crate) fn schedule_value(&mut self, path: Path, value: Value) {
        self.pending_values.insert(path, value);
        self.request_flush();
    }

    pub(crate) fn schedule_list(&mut self, path: Path, event: StructureEvent) {
        self.pending_lists.entry(path).or_default().push(event);
        self.request_flush();
    }

    fn request_flush(&mut self) {
        // While flushing, the running loop will see the new pending work.
        if !self.scheduled && !self.flushing {
            self.scheduled = true;
        }
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending_values.is_empty() || !self.pending_lists.is_empty()
    }

    pub(crate) fn is_idle(&self) -> bool {
        !self.scheduled && !self.flushing && !self.has_pending()
    }

    pub(crate) fn clear_pending(&mut self) {
        self.pending_values.clear();
        self.pending_lists.clear();
        while let Ok(Some(_)) = self.update_rx.try_next() {}
        self.scheduled = false;
    }

    /// Drive every pending update to quiescence. One batch id covers the
    /// whole flush; flags and dedupe bookkeeping are reset on every exit
    /// path.
    pub(crate) async fn flush(&mut self, core: &mut EngineCore) -> Result<(), EngineError> {
        if self.flushing {
            return Ok(());
        }
        self.flushing = true;
        self.scheduled = false;
        let batch_id = BatchId::new();
        log::debug!("flush {batch_id}: start");

        let result = self.drain(core, batch_id).await;

        self.batch_seen.clear();
        self.flushing = false;
        self.scheduled = false;
        match &result {
            Ok(()) => log::debug!("flush {batch_id}: drained"),
            Err(err) => log::warn!("flush {batch_id}: aborted: {err}"),
        }
        result
    }

    async fn drain(&mut self, core: &mut EngineCore, batch_id: BatchId) -> Result<(), EngineError> {
        let mut depth: u32 = 0;
        while self.has_pending() {
            depth += 1;
            if depth > self.max_depth {
                // Runaway handler cycle: discard everything in flight.
                self.clear_pending();
                return Err(SchedulerError::MaxDepthExceeded {
                    max_depth: self.max_depth,
                }
                .into());
            }

            let lists: Vec<(Path, Vec<StructureEvent>)> = self.pending_lists.drain(..).collect();
            let values: Vec<(Path, Value)> = self.pending_values.drain(..).collect();
            let mut notifications: Vec<ChangeNotification> = Vec::new();

            // Structural work first: the store already holds the new arrays,
            // the render subtrees and dependents catch up here.
            for (list_path, events) in lists {
                core.render_root = render::rebuild_at(&core.render_root, &list_path, &core.store);
                for event in events {
                    let change = ChangeEvent::Structure(event);
                    self.dispatch(core, &list_path, &change, batch_id).await;
                    notifications.push(ChangeNotification {
                        path: list_path.clone(),
                        event: change,
                        batch_id,
                    });
                }
            }

            for (path, value) in values {
                if core.schema.kind_at_render(&path) == Some(NodeKind::List) {
                    // Whole-array replacement: route through the positional
                    // diff so dependents learn which rows changed.
                    let old = core
                        .store
                        .get(&path)
                        .and_then(Value::as_list)
                        .cloned()
                        .unwrap_or_default();
                    let new_items = value.as_list().cloned().unwrap_or_default();
                    let event = list_op::diff_array(&old, &new_items);
                    core.store
                        .set(&path, Value::List(Arc::new(new_items)))?;
                    core.render_root =
                        render::rebuild_at(&core.render_root, &path, &core.store);
                    let change = ChangeEvent::Structure(event);
                    self.dispatch(core, &path, &change, batch_id).await;
                    notifications.push(ChangeNotification {
                        path,
                        event: change,
                        batch_id,
                    });
                } else {
                    let record = core.store.set(&path, value)?;
                    let change = ChangeEvent::Value(ValueEvent {
                        prev: record.prev,
                        next: record.next,
                    });
                    self.dispatch(core, &path, &change, batch_id).await;
                    notifications.push(ChangeNotification {
                        path,
                        event: change,
                        batch_id,
                    });
                }
            }

            // Handlers only queued work; fold it into the pending maps so
            // the next iteration sees it.
            self.absorb_handler_updates(&core.store);

            // Computed attributes catch up before anyone outside hears
            // about this iteration's writes.
            core.render_root =
                control::recompute_tree(&core.render_root, core.store.root(), &core.schema);
            for notification in &notifications {
                core.notify(notification);
            }
        }
        Ok(())
    }

    async fn dispatch(
        &mut self,
        core: &EngineCore,
        trigger: &Path,
        event: &ChangeEvent,
        batch_id: BatchId,
    ) {
        let triggers = match event {
            ChangeEvent::Value(_) => vec![trigger.clone()],
            // A structural event also fires the dependents of every
            // re-indexed row, via synthesized per-field trigger paths —
            // that is what lets a freshly added row's relative
            // subscriptions run at all.
            ChangeEvent::Structure(ev) => structural_triggers(core, trigger, ev),
        };
        for t in &triggers {
            let matches = core.index.resolve(t, &core.store);
            if matches.is_empty() {
                continue;
            }
            dispatch_matches(
                matches,
                t,
                event,
                batch_id,
                core.store.root(),
                &core.schema,
                &self.update_tx,
                &mut self.batch_seen,
            )
            .await;
        }
    }

    /// Move queued handler updates into the pending maps, expanding wildcard
    /// targets against the now-current store.
    fn absorb_handler_updates(&mut self, store: &DataStore) {
        while let Ok(Some(request)) = self.update_rx.try_next() {
            let pattern = Pattern::parse(&request.target);
            if pattern.has_star() {
                for path in store.expand_wildcard(&pattern) {
                    self.pending_values.insert(path, request.value.clone());
                }
            } else {
                let path = Path::parse(&request.target);
                if path.is_root() {
                    log::warn!("handler update to empty path ignored");
                    continue;
                }
                self.pending_values.insert(path, request.value);
            }
        }
    }
}

/// The trigger paths a structural event fans out to: the list itself plus
/// every descendant field of every re-indexed row (template walk; nested
/// list lengths read from the store).
fn structural_triggers(
    core: &EngineCore,
    list_path: &Path,
    event: &StructureEvent,
) -> Vec<Path> {
    let mut out = vec![list_path.clone()];
    let Some(list_schema) = core.schema.node_at_render(list_path) else {
        return out;
    };
    if list_schema.kind != NodeKind::List {
        return out;
    }
    for &row in &event.reindexed {
        let row_base = list_path.index(row);
        for child in list_schema.children.values() {
            collect_field_triggers(child, &row_base, &core.store, &mut out);
        }
    }
    out
}

fn collect_field_triggers(
    schema: &Arc<SchemaNode>,
    base: &Path,
    store: &DataStore,
    out: &mut Vec<Path>,
) {
    match schema.kind {
        NodeKind::Field => out.push(base.key(schema.name.clone())),
        NodeKind::Form => {
            let own = base.key(schema.name.clone());
            for child in schema.children.values() {
                collect_field_triggers(child, &own, store, out);
            }
        }
        NodeKind::Layout => {
            for child in schema.children.values() {
                collect_field_triggers(child, base, store, out);
            }
        }
        NodeKind::List => {
            let own = base.key(schema.name.clone());
            out.push(own.clone());
            let len = store
                .get(&own)
                .and_then(Value::as_list)
                .map(Vec::len)
                .unwrap_or(0);
            for row in 0..len {
                let row_base = own.index(row);
                for child in schema.children.values() {
                    collect_field_triggers(child, &row_base, store, out);
                }
            }
        }
    }
}
