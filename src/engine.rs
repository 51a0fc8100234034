//! The engine facade.
//!
//! Owns the parsed schema, the store, the render tree, the subscription
//! index and the scheduler, and funnels every mutation entry point through
//! the scheduler's pending maps. Construction parses the schema, seeds
//! declared defaults the model left absent, and runs one control pass so
//! `computed` is present before the first flush.

use crate::control;
use crate::error::{EngineError, LifecycleError, SchemaError, StoreError};
use crate::list_op;
use crate::path::{Path, Pattern, Segment};
use crate::render::{self, RenderNode};
use crate::scheduler::{BatchId, Scheduler};
use crate::schema::{parse_schema, NodeKind, ParsedSchema, RawNode, SchemaNode};
use crate::store::DataStore;
use crate::subscribe::{ChangeEvent, EventKind, SubscriptionIndex, ValueEvent};
use crate::validate::{run_validation, ValidateOutcome};
use crate::value::Value;
use std::sync::Arc;

#[derive(Clone, Copy, Debug)]
pub struct EngineOptions {
    /// Hard cap on cascade iterations per flush; exceeding it aborts the
    /// flush with a scheduler error.
    pub max_update_depth: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            max_update_depth: 10,
        }
    }
}

/// What external observers receive, after the iteration's control
/// recomputation — never a value change without its computed update.
#[derive(Clone, Debug)]
pub struct ChangeNotification {
    pub path: Path,
    pub event: ChangeEvent,
    pub batch_id: BatchId,
}

pub type ChangeListener = Arc<dyn Fn(&ChangeNotification)>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenerId(u64);

/// Filter for `on_value_change`: an optional path pattern (exact or
/// wildcard) and an optional event-kind set.
#[derive(Clone, Debug, Default)]
pub struct ValueChangeFilter {
    pub pattern: Option<String>,
    pub kinds: Option<Vec<EventKind>>,
}

enum ListenerPattern {
    Exact(Path),
    Wildcard(Pattern),
}

struct ListenerEntry {
    id: ListenerId,
    pattern: Option<ListenerPattern>,
    kinds: Option<Vec<EventKind>>,
    handler: ChangeListener,
}

/// Everything the scheduler needs a mutable view of during a flush.
pub(crate) struct EngineCore {
    pub(crate) schema: Arc<ParsedSchema>,
    pub(crate) store: DataStore,
    pub(crate) render_root: Arc<RenderNode>,
    pub(crate) index: SubscriptionIndex,
    pub(crate) listeners: Vec<ListenerEntry>,
}

impl EngineCore {
    pub(crate) fn notify(&self, notification: &ChangeNotification) {
        for entry in &self.listeners {
            if let Some(kinds) = &entry.kinds {
                if !kinds.contains(&notification.event.kind()) {
                    continue;
                }
            }
            if let Some(pattern) = &entry.pattern {
                let hit = match pattern {
                    ListenerPattern::Exact(path) => *path == notification.path,
                    ListenerPattern::Wildcard(pattern) => {
                        pattern.matches(&notification.path).is_some()
                    }
                };
                if !hit {
                    continue;
                }
            }
            (entry.handler)(notification);
        }
    }
}

pub struct FormEngine {
    core: EngineCore,
    scheduler: Scheduler,
    next_listener: u64,
    destroyed: bool,
}

impl FormEngine {
    pub fn new(schema: RawNode, model: Option<Value>) -> Result<Self, EngineError> {
        Self::new_with_options(schema, model, EngineOptions::default())
    }

    pub fn new_with_options(
        schema: RawNode,
        model: Option<Value>,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        let schema = Arc::new(parse_schema(&schema)?);
        let mut store = DataStore::new(model.unwrap_or_else(Value::empty_object));
        seed_defaults(&schema.root, &mut store, true)?;
        let seeded = store.root().clone();
        store.adopt_initial(seeded);

        let render_root = control::recompute_tree(
            &render::build_tree(&schema.root, &store),
            store.root(),
            &schema,
        );
        let index = SubscriptionIndex::build(&schema.subscriptions);

        Ok(FormEngine {
            core: EngineCore {
                schema,
                store,
                render_root,
                index,
                listeners: Vec::new(),
            },
            scheduler: Scheduler::new(options.max_update_depth),
            next_listener: 1,
            destroyed: false,
        })
    }

    fn ensure_alive(&self) -> Result<(), EngineError> {
        if self.destroyed {
            return Err(LifecycleError.into());
        }
        Ok(())
    }

    /// Current value at a path ("" reads the whole model); `Null` when
    /// absent.
    pub fn get_value(&self, path: &str) -> Result<Value, EngineError> {
        self.ensure_alive()?;
        let path = Path::parse(path);
        Ok(self
            .core
            .store
            .get(&path)
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Schema node at a path ("" resolves the root form). Accepts render or
    /// schema spelling.
    pub fn get_schema(&self, path: &str) -> Result<Option<Arc<SchemaNode>>, EngineError> {
        self.ensure_alive()?;
        let path = Path::parse(path);
        if path.is_root() {
            return Ok(Some(self.core.schema.root.clone()));
        }
        Ok(self.core.schema.node_at_render(&path).cloned())
    }

    /// The current render tree root.
    pub fn render_root(&self) -> Result<Arc<RenderNode>, EngineError> {
        self.ensure_alive()?;
        Ok(self.core.render_root.clone())
    }

    /// Queue one write. A wildcard pattern expands against the current
    /// store before scheduling.
    pub fn update_value(&mut self, path: &str, value: Value) -> Result<(), EngineError> {
        self.ensure_alive()?;
        let pattern = Pattern::parse(path);
        if pattern.has_star() {
            for concrete in self.core.store.expand_wildcard(&pattern) {
                self.scheduler.schedule_value(concrete, value.clone());
            }
            return Ok(());
        }
        let path = Path::parse(path);
        if path.is_root() {
            return Err(StoreError::EmptyPath.into());
        }
        self.scheduler.schedule_value(path, value);
        Ok(())
    }

    /// Queue several writes at once.
    pub fn update_values(
        &mut self,
        entries: impl IntoIterator<Item = (impl AsRef<str>, Value)>,
    ) -> Result<(), EngineError> {
        for (path, value) in entries {
            self.update_value(path.as_ref(), value)?;
        }
        Ok(())
    }

    // ----- List operations -----
    // Each writes the new array through the store immediately and queues the
    // structural event for the next flush.

    pub fn list_append(&mut self, list: &str, item: Value) -> Result<(), EngineError> {
        let path = self.list_path(list)?;
        let event = list_op::append(&mut self.core.store, &path, item)?;
        self.scheduler.schedule_list(path, event);
        Ok(())
    }

    pub fn list_insert(&mut self, list: &str, index: usize, item: Value) -> Result<(), EngineError> {
        let path = self.list_path(list)?;
        let event = list_op::insert(&mut self.core.store, &path, index, item)?;
        self.scheduler.schedule_list(path, event);
        Ok(())
    }

    pub fn list_remove(&mut self, list: &str, index: usize) -> Result<(), EngineError> {
        let path = self.list_path(list)?;
        let event = list_op::remove(&mut self.core.store, &path, index)?;
        self.scheduler.schedule_list(path, event);
        Ok(())
    }

    pub fn list_move(&mut self, list: &str, from: usize, to: usize) -> Result<(), EngineError> {
        let path = self.list_path(list)?;
        let event = list_op::move_row(&mut self.core.store, &path, from, to)?;
        self.scheduler.schedule_list(path, event);
        Ok(())
    }

    pub fn list_swap(&mut self, list: &str, a: usize, b: usize) -> Result<(), EngineError> {
        let path = self.list_path(list)?;
        let event = list_op::swap(&mut self.core.store, &path, a, b)?;
        self.scheduler.schedule_list(path, event);
        Ok(())
    }

    pub fn list_replace(
        &mut self,
        list: &str,
        index: usize,
        item: Value,
    ) -> Result<(), EngineError> {
        let path = self.list_path(list)?;
        let event = list_op::replace(&mut self.core.store, &path, index, item)?;
        self.scheduler.schedule_list(path, event);
        Ok(())
    }

    pub fn list_clear(&mut self, list: &str) -> Result<(), EngineError> {
        let path = self.list_path(list)?;
        let event = list_op::clear(&mut self.core.store, &path)?;
        self.scheduler.schedule_list(path, event);
        Ok(())
    }

    fn list_path(&self, list: &str) -> Result<Path, EngineError> {
        self.ensure_alive()?;
        let path = Path::parse(list);
        if path.is_root() {
            return Err(StoreError::EmptyPath.into());
        }
        Ok(path)
    }

    /// Resolve once every pending update (and everything handlers queue on
    /// top) has been applied. Rejects if the cascade exceeds the depth cap.
    pub async fn wait_flush(&mut self) -> Result<(), EngineError> {
        self.ensure_alive()?;
        if self.scheduler.is_idle() {
            return Ok(());
        }
        self.scheduler.flush(&mut self.core).await
    }

    /// Validate the given paths (every field when `None`). Always flushes
    /// first so validation never observes a stale tree. Validation findings
    /// are data; only programmer misuse surfaces as `Err`.
    pub async fn validate(
        &mut self,
        targets: Option<&[&str]>,
    ) -> Result<ValidateOutcome, EngineError> {
        self.ensure_alive()?;
        self.wait_flush().await?;
        let target_paths: Option<Vec<Path>> =
            targets.map(|targets| targets.iter().map(|t| Path::parse(t)).collect());
        Ok(run_validation(
            &self.core.render_root,
            self.core.store.root(),
            &self.core.schema,
            target_paths.as_deref(),
        )
        .await)
    }

    /// Replace the model: with the construction snapshot, with the
    /// schema-declared defaults, or with an explicit value (adopted and
    /// remembered as the new initial model). Emits the flatten-diff change
    /// list to external listeners; subscriptions do not cascade on reset.
    pub fn reset(&mut self, target: ResetTarget) -> Result<(), EngineError> {
        self.ensure_alive()?;
        let records = match target {
            ResetTarget::Initial => self.core.store.reset(None),
            ResetTarget::Defaults => {
                let mut defaults = DataStore::new(Value::empty_object());
                seed_defaults(&self.core.schema.root, &mut defaults, false)?;
                let defaults = defaults.root().clone();
                self.core.store.reset(Some(defaults))
            }
            ResetTarget::Value(value) => {
                self.core.store.adopt_initial(value.clone());
                self.core.store.reset(Some(value))
            }
        };

        self.rebuild_render_tree();
        let batch_id = BatchId::new();
        for record in records {
            self.core.notify(&ChangeNotification {
                path: record.path,
                event: ChangeEvent::Value(ValueEvent {
                    prev: record.prev,
                    next: record.next,
                }),
                batch_id,
            });
        }
        Ok(())
    }

    /// Swap in a new schema: reparse, rebuild the render tree and the
    /// subscription index, keep the current data (new defaults fill absent
    /// paths only).
    pub fn set_form_schema(&mut self, raw: RawNode) -> Result<(), EngineError> {
        self.ensure_alive()?;
        let schema = Arc::new(parse_schema(&raw)?);
        self.core.index = SubscriptionIndex::build(&schema.subscriptions);
        self.core.schema = schema;
        seed_defaults(&self.core.schema.root.clone(), &mut self.core.store, true)?;
        self.rebuild_render_tree();
        Ok(())
    }

    /// Register an external observer. Fired after each cascade iteration's
    /// control recomputation, in write order.
    pub fn on_value_change(
        &mut self,
        handler: impl Fn(&ChangeNotification) + 'static,
        filter: ValueChangeFilter,
    ) -> Result<ListenerId, EngineError> {
        self.ensure_alive()?;
        let pattern = match &filter.pattern {
            None => None,
            Some(raw) => {
                if raw.starts_with('.') {
                    return Err(SchemaError::new(
                        Path::root(),
                        "relative patterns are not supported for change listeners",
                    )
                    .into());
                }
                let pattern = Pattern::parse(raw);
                Some(if pattern.has_star() {
                    ListenerPattern::Wildcard(pattern)
                } else {
                    ListenerPattern::Exact(Path::parse(raw))
                })
            }
        };
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.core.listeners.push(ListenerEntry {
            id,
            pattern,
            kinds: filter.kinds,
            handler: Arc::new(handler),
        });
        Ok(id)
    }

    /// Drop a listener; unknown ids are a no-op.
    pub fn off_value_change(&mut self, id: ListenerId) -> Result<(), EngineError> {
        self.ensure_alive()?;
        self.core.listeners.retain(|entry| entry.id != id);
        Ok(())
    }

    /// Tear the engine down. Idempotent; every other entry point fails fast
    /// afterwards.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.scheduler.clear_pending();
        self.core.listeners.clear();
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn rebuild_render_tree(&mut self) {
        self.core.render_root = control::recompute_tree(
            &render::build_tree(&self.core.schema.root, &self.core.store),
            self.core.store.root(),
            &self.core.schema,
        );
    }
}

/// Which model `reset` adopts.
#[derive(Clone, Debug)]
pub enum ResetTarget {
    /// The snapshot captured at construction (or at the last explicit
    /// `Value` reset).
    Initial,
    /// Schema-declared `default_value`s.
    Defaults,
    /// An explicit model, remembered as the new initial snapshot.
    Value(Value),
}

/// Walk the schema and write `default_value`s. Row-template defaults (paths
/// containing `items`) apply when rows come into existence, not here; layout
/// nodes carry no data path. With `only_missing`, present model values win.
fn seed_defaults(
    node: &Arc<SchemaNode>,
    store: &mut DataStore,
    only_missing: bool,
) -> Result<(), EngineError> {
    if node.kind != NodeKind::Layout {
        if let Some(default) = &node.default_value {
            let path = &node.schema_path;
            let in_template = path.segments().iter().any(Segment::is_items);
            if !path.is_root() && !in_template && (!only_missing || store.get(path).is_none()) {
                store.set(path, default.clone())?;
            }
        }
    }
    if node.kind != NodeKind::List {
        for child in node.children.values() {
            seed_defaults(child, store, only_missing)?;
        }
    }
    Ok(())
}
