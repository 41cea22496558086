//! Synchronous, re-entrant publish/subscribe.
//!
//! Listeners are registered per [`EventKind`] and run in registration order.
//! [`EventBus::publish`] snapshots the listener list before running it, so a
//! listener subscribed during a dispatch only sees later publishes. A
//! listener may publish further events; nested dispatches run to completion
//! before the outer one continues.
//!
//! A listener that returns an error or panics is a subscriber fault: it is
//! logged, counted, and the remaining listeners still run.

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use ark_ecs::entity::EntityId;

use crate::context::ActionContext;
use crate::{panic_message, EngineError};

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A typed event payload.
///
/// Events are immutable values; they are delivered once and never stored.
pub trait Event: 'static {
    /// Optional priority carried on the envelope. Informational only:
    /// delivery order is fixed by subscription order.
    fn priority(&self) -> Option<i32> {
        None
    }
}

/// Identity of an event type.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKind(TypeId);

impl EventKind {
    /// The kind of event type `E`.
    pub fn of<E: Event>() -> Self {
        Self(TypeId::of::<E>())
    }
}

impl fmt::Debug for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventKind({:?})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Built-in events
// ---------------------------------------------------------------------------

/// Ask the orchestrator to stop ticking until resumed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PauseLoop;

/// Ask a paused orchestrator to tick again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResumeLoop;

/// Ask the orchestrator to stop for good.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerminateLoop;

/// The host screen changed size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenResize {
    pub width: f64,
    pub height: f64,
}

/// Two physics bodies started touching.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collision {
    pub entity_a: EntityId,
    pub entity_b: EntityId,
}

impl Event for PauseLoop {}
impl Event for ResumeLoop {}
impl Event for TerminateLoop {}
impl Event for ScreenResize {}
impl Event for Collision {}

// ---------------------------------------------------------------------------
// EventRegistry
// ---------------------------------------------------------------------------

/// Maps event names to kinds so rules can name their trigger.
#[derive(Debug, Default)]
pub struct EventRegistry {
    by_name: HashMap<String, EventKind>,
    names: HashMap<EventKind, String>,
}

impl EventRegistry {
    /// A registry with the built-in events already named.
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        registry.register::<PauseLoop>("pause_loop");
        registry.register::<ResumeLoop>("resume_loop");
        registry.register::<TerminateLoop>("terminate_loop");
        registry.register::<ScreenResize>("screen_resize");
        registry.register::<Collision>("collision");
        registry
    }

    /// Name event type `E`. Re-registering a type keeps its first name.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already taken by a different event type.
    pub fn register<E: Event>(&mut self, name: &str) -> EventKind {
        let kind = EventKind::of::<E>();
        if let Some(&existing) = self.by_name.get(name) {
            assert!(
                existing == kind,
                "event name '{name}' is already registered for a different type"
            );
            return kind;
        }
        if !self.names.contains_key(&kind) {
            self.names.insert(kind, name.to_owned());
            self.by_name.insert(name.to_owned(), kind);
        }
        kind
    }

    /// Look up a kind by name.
    pub fn lookup(&self, name: &str) -> Option<EventKind> {
        self.by_name.get(name).copied()
    }

    /// The registered name of a kind, if any.
    pub fn name_of(&self, kind: EventKind) -> Option<&str> {
        self.names.get(&kind).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// EventEnvelope
// ---------------------------------------------------------------------------

/// An event as delivered to listeners.
pub struct EventEnvelope<'e> {
    kind: EventKind,
    name: &'e str,
    payload: &'e dyn Any,
    timestamp: f64,
    priority: Option<i32>,
}

impl<'e> EventEnvelope<'e> {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Registered name, or the Rust type name for unregistered events.
    pub fn name(&self) -> &'e str {
        self.name
    }

    /// Simulation time in seconds when the event was published.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn priority(&self) -> Option<i32> {
        self.priority
    }

    /// Borrow the payload as a concrete event type.
    pub fn downcast<E: Event>(&self) -> Option<&'e E> {
        self.payload.downcast_ref::<E>()
    }
}

impl fmt::Debug for EventEnvelope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEnvelope")
            .field("name", &self.name)
            .field("timestamp", &self.timestamp)
            .field("priority", &self.priority)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// A listener callback. Shared so a dispatch can run from a snapshot of the
/// list while new subscriptions are added.
pub type Listener = Rc<dyn Fn(&EventEnvelope<'_>, &mut ActionContext<'_>) -> anyhow::Result<()>>;

/// Synchronous event bus.
///
/// All methods take `&self`; the bus is shared by reference with every
/// [`ActionContext`] so listeners can subscribe and publish re-entrantly.
pub struct EventBus {
    registry: RefCell<EventRegistry>,
    listeners: RefCell<HashMap<EventKind, Vec<Listener>>>,
    faults: Cell<u64>,
    depth: Cell<u32>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners: usize = self.listeners.borrow().values().map(Vec::len).sum();
        f.debug_struct("EventBus")
            .field("listeners", &listeners)
            .field("faults", &self.faults.get())
            .finish()
    }
}

impl EventBus {
    /// Create a bus with the built-in events registered and no listeners.
    pub fn new() -> Self {
        Self {
            registry: RefCell::new(EventRegistry::with_builtins()),
            listeners: RefCell::new(HashMap::new()),
            faults: Cell::new(0),
            depth: Cell::new(0),
        }
    }

    /// Give event type `E` a name that rules can refer to.
    pub fn register_event<E: Event>(&self, name: &str) -> EventKind {
        self.registry.borrow_mut().register::<E>(name)
    }

    /// Look up an event kind by name.
    pub fn lookup_event(&self, name: &str) -> Option<EventKind> {
        self.registry.borrow().lookup(name)
    }

    /// The registered name for a kind, or `"<unnamed>"`.
    pub fn event_name(&self, kind: EventKind) -> String {
        self.registry
            .borrow()
            .name_of(kind)
            .unwrap_or("<unnamed>")
            .to_owned()
    }

    /// Register a raw listener for `kind`. Duplicate subscriptions all fire.
    pub fn subscribe_kind(&self, kind: EventKind, listener: Listener) {
        self.listeners
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push(listener);
    }

    /// Register a typed listener for `E`.
    pub fn subscribe<E, F>(&self, listener: F)
    where
        E: Event,
        F: Fn(&E, &mut ActionContext<'_>) -> anyhow::Result<()> + 'static,
    {
        self.subscribe_kind(
            EventKind::of::<E>(),
            Rc::new(
                move |envelope: &EventEnvelope<'_>, ctx: &mut ActionContext<'_>| {
                    match envelope.downcast::<E>() {
                        Some(event) => listener(event, ctx),
                        None => Ok(()),
                    }
                },
            ),
        );
    }

    /// Number of listeners currently registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.borrow().get(&kind).map_or(0, Vec::len)
    }

    /// Total subscriber faults since the bus was created.
    pub fn fault_count(&self) -> u64 {
        self.faults.get()
    }

    /// Current nesting depth of dispatches (0 outside any dispatch).
    pub fn depth(&self) -> u32 {
        self.depth.get()
    }

    /// Deliver `event` to every listener of its kind, in order.
    ///
    /// Usually reached through [`ActionContext::emit`].
    pub fn publish<E: Event>(&self, event: &E, ctx: &mut ActionContext<'_>) {
        let kind = EventKind::of::<E>();
        let listeners: Vec<Listener> = match self.listeners.borrow().get(&kind) {
            Some(list) => list.clone(),
            None => return,
        };

        let name = self
            .registry
            .borrow()
            .name_of(kind)
            .map_or_else(|| std::any::type_name::<E>().to_owned(), str::to_owned);
        let envelope = EventEnvelope {
            kind,
            name: &name,
            payload: event,
            timestamp: ctx.time(),
            priority: event.priority(),
        };

        let depth = self.depth.get() + 1;
        self.depth.set(depth);
        tracing::trace!(event = %name, depth, listeners = listeners.len(), "dispatching event");

        for listener in &listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener(&envelope, ctx)));
            let details = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => format!("{err:#}"),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };
            self.faults.set(self.faults.get() + 1);
            let fault = EngineError::SubscriberFault {
                event: name.clone(),
                details,
            };
            tracing::warn!(event = %name, error = %fault, "subscriber fault isolated");
        }

        self.depth.set(depth - 1);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
