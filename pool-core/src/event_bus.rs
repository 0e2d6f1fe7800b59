//! Element Event Bus (spec §4.5, component C6).
//!
//! In-process only. Listeners are registered per source element; firing an
//! event builds an *event stack* (spec: "a listener receives a list of
//! events where the head is the originating event") that group listeners
//! append a derived event to before re-publishing to their own listeners.
//! Delivery order follows registration order; a listener snapshot is taken
//! before delivery starts, so removing a listener mid-delivery only takes
//! effect on the next `fire_pool_elem_change` (spec: "removing during
//! delivery is deferred to the next event").

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::ids::ElementId;

/// The closed set of event kinds (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    StateChange,
    PositionChange,
    PositionArrayChange,
    CtValueChange,
    ZeroDValueChange,
    OneDValueChange,
    TwoDValueChange,
    PseudoCounterValueChange,
    MotionEnded,
    ElementStructureChange,
    ElementListChange,
    NameChange,
}

/// The tagged union of values an event carries (spec §4.5: "a tagged union
/// of `old` and `current` values").
#[derive(Debug, Clone)]
pub enum EventValue {
    State(crate::elements::AxisState),
    Position(f64),
    PositionArray(Vec<f64>),
    Scalar(f64),
    Array1D(Vec<f64>),
    Array2D(Vec<Vec<f64>>),
    Name(String),
    None,
}

/// A single event in a propagation stack.
#[derive(Debug, Clone)]
pub struct PoolEvent {
    pub kind: EventKind,
    pub source: ElementId,
    /// Array dimension, for the `*ArrayChange` kinds; `None` otherwise.
    pub dim: Option<usize>,
    pub priority: bool,
    pub old: EventValue,
    pub current: EventValue,
}

impl PoolEvent {
    pub fn new(kind: EventKind, source: ElementId, old: EventValue, current: EventValue) -> Self {
        PoolEvent {
            kind,
            source,
            dim: None,
            priority: false,
            old,
            current,
        }
    }
}

/// A propagation stack: `stack[0]` is the originating event, later entries
/// are derived events appended by intermediate group listeners.
pub type EventStack = Vec<PoolEvent>;

/// A subscriber to one element's events.
pub trait EventListener: Send + Sync {
    fn pool_elem_changed(&self, stack: &EventStack);
}

/// Constructs the derived event a group republishes when one of its
/// members changes (spec §6 "Group adapter").
pub trait GroupAdapter: Send + Sync {
    fn pool_elem_changed(&self, stack: &EventStack) -> PoolEvent;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Subscription {
    id: ListenerId,
    listener: Arc<dyn EventListener>,
}

/// The process-wide element event bus.
pub struct EventBus {
    listeners: RwLock<HashMap<ElementId, Vec<Subscription>>>,
    init_in_progress: AtomicBool,
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            listeners: RwLock::new(HashMap::new()),
            init_in_progress: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self, element: ElementId, listener: Arc<dyn EventListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(element)
            .or_default()
            .push(Subscription { id, listener });
        log::debug!("event bus: listener {id:?} registered on {element}");
        id
    }

    pub fn unsubscribe(&self, element: ElementId, id: ListenerId) {
        if let Some(subs) = self.listeners.write().get_mut(&element) {
            subs.retain(|s| s.id != id);
        }
    }

    /// Enter bulk-initialization mode: `StateChange`-family events are
    /// suppressed until `end_bulk_init` (spec §4.5).
    pub fn begin_bulk_init(&self) {
        self.init_in_progress.store(true, Ordering::SeqCst);
    }

    /// Leave bulk-initialization mode and fire the single catch-up
    /// `ElementStructureChange` the spec requires.
    pub fn end_bulk_init(&self, structure_source: ElementId) {
        self.init_in_progress.store(false, Ordering::SeqCst);
        self.fire_pool_elem_change(
            PoolEvent::new(
                EventKind::ElementStructureChange,
                structure_source,
                EventValue::None,
                EventValue::None,
            ),
            None,
            true,
        );
    }

    /// Push `evt` onto a fresh stack and deliver to every listener of
    /// `evt.source` except `exclude` (spec §4.5).
    pub fn fire_pool_elem_change(
        &self,
        evt: PoolEvent,
        exclude: Option<ListenerId>,
        handle_exceptions: bool,
    ) {
        if self.init_in_progress.load(Ordering::SeqCst)
            && evt.kind != EventKind::ElementStructureChange
        {
            return;
        }
        let source = evt.source;
        let mut stack = vec![evt];
        self.deliver(source, &mut stack, exclude, handle_exceptions);
    }

    /// Deliver the current top of `stack` to `element`'s listeners. Exposed
    /// so a `GroupEventRelay` can re-enter delivery on the group's own
    /// element id after appending its derived event.
    pub fn deliver(
        &self,
        element: ElementId,
        stack: &mut EventStack,
        exclude: Option<ListenerId>,
        handle_exceptions: bool,
    ) {
        let subs: Vec<Subscription> = {
            let guard = self.listeners.read();
            guard
                .get(&element)
                .map(|v| {
                    v.iter()
                        .map(|s| Subscription {
                            id: s.id,
                            listener: s.listener.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default()
        };
        for sub in &subs {
            if Some(sub.id) == exclude {
                continue;
            }
            let listener = sub.listener.clone();
            let stack_ref: &EventStack = stack;
            if handle_exceptions {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    listener.pool_elem_changed(stack_ref)
                }));
                if outcome.is_err() {
                    log::warn!(
                        "event bus: listener {:?} on {element} panicked, event swallowed",
                        sub.id
                    );
                }
            } else {
                listener.pool_elem_changed(stack_ref);
            }
        }
    }
}

/// A listener installed on every member of a group; on delivery it
/// constructs the derived event via the group's `GroupAdapter`, appends it
/// to the stack, and re-enters delivery against the group's own element id
/// (spec §4.5 "group listener").
pub struct GroupEventRelay {
    bus: Arc<EventBus>,
    group_id: ElementId,
    adapter: Arc<dyn GroupAdapter>,
}

impl GroupEventRelay {
    pub fn new(bus: Arc<EventBus>, group_id: ElementId, adapter: Arc<dyn GroupAdapter>) -> Self {
        GroupEventRelay {
            bus,
            group_id,
            adapter,
        }
    }
}

impl EventListener for GroupEventRelay {
    fn pool_elem_changed(&self, stack: &EventStack) {
        let derived = self.adapter.pool_elem_changed(stack);
        let mut extended = stack.clone();
        extended.push(derived);
        self.bus.deliver(self.group_id, &mut extended, None, true);
        extended.pop();
    }
}
