//! Declarative rules and their one-time compilation.
//!
//! A [`Rule`] pairs a [`Trigger`] with zero or more conditions over the world,
//! an action, and a priority. [`compile_rules`] turns a rule list into
//! runtime wiring exactly once:
//!
//! - Event rules become [`EventBus`] subscriptions. Within one event kind
//!   they are subscribed in ascending priority; equal priorities keep
//!   declaration order.
//! - Tick rules become non-unique systems appended to
//!   [`ScheduleSlot::Update`] in declaration order.
//!
//! The rule values are consumed by compilation and never consulted again.
//! A rule whose trigger does not fit its action is skipped and reported;
//! the other rules still compile.

use std::rc::Rc;

use ark_ecs::world::World;

use crate::context::ActionContext;
use crate::event::{Event, EventBus, EventEnvelope, EventKind, Listener};
use crate::system::{ScheduleSlot, System, SystemRegistry};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Rule types
// ---------------------------------------------------------------------------

/// A boolean predicate over the current world state.
pub type Condition = Rc<dyn Fn(&World) -> bool>;

/// Action run when an event rule fires.
pub type EventAction = Rc<dyn Fn(&EventEnvelope<'_>, &mut ActionContext<'_>) -> anyhow::Result<()>>;

/// Action run when a tick rule fires. Receives the tick delta.
pub type TickAction = Rc<dyn Fn(f64, &mut ActionContext<'_>) -> anyhow::Result<()>>;

/// What makes a rule fire.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// An event of this kind is published.
    Event(EventKind),
    /// An event registered under this name is published. Resolved during
    /// compilation.
    EventNamed(String),
    /// Once per tick, in the update slot.
    EveryTick,
}

/// The body of a rule. Must match the trigger's category.
#[derive(Clone)]
pub enum RuleAction {
    OnEvent(EventAction),
    OnTick(TickAction),
}

impl std::fmt::Debug for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleAction::OnEvent(_) => f.write_str("OnEvent(..)"),
            RuleAction::OnTick(_) => f.write_str("OnTick(..)"),
        }
    }
}

/// A declarative `(trigger, conditions, action, priority)` rule.
#[derive(Clone)]
pub struct Rule {
    pub name: String,
    pub trigger: Trigger,
    pub conditions: Vec<Condition>,
    pub action: RuleAction,
    /// Lower runs first among rules for the same event kind.
    pub priority: i32,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("trigger", &self.trigger)
            .field("conditions", &self.conditions.len())
            .field("action", &self.action)
            .field("priority", &self.priority)
            .finish()
    }
}

impl Rule {
    /// A rule from raw parts, with no conditions and priority 0.
    pub fn new(name: &str, trigger: Trigger, action: RuleAction) -> Self {
        Self {
            name: name.to_owned(),
            trigger,
            conditions: Vec::new(),
            action,
            priority: 0,
        }
    }

    /// A rule fired by events of type `E`.
    pub fn on<E, F>(name: &str, action: F) -> Self
    where
        E: Event,
        F: Fn(&E, &mut ActionContext<'_>) -> anyhow::Result<()> + 'static,
    {
        let action: EventAction = Rc::new(
            move |envelope: &EventEnvelope<'_>, ctx: &mut ActionContext<'_>| {
                match envelope.downcast::<E>() {
                    Some(event) => action(event, ctx),
                    None => Ok(()),
                }
            },
        );
        Self::new(name, Trigger::Event(EventKind::of::<E>()), RuleAction::OnEvent(action))
    }

    /// A rule fired by the event registered as `event_name`.
    pub fn on_named<F>(name: &str, event_name: &str, action: F) -> Self
    where
        F: Fn(&EventEnvelope<'_>, &mut ActionContext<'_>) -> anyhow::Result<()> + 'static,
    {
        Self::new(
            name,
            Trigger::EventNamed(event_name.to_owned()),
            RuleAction::OnEvent(Rc::new(action)),
        )
    }

    /// A rule fired every tick.
    pub fn every_tick<F>(name: &str, action: F) -> Self
    where
        F: Fn(f64, &mut ActionContext<'_>) -> anyhow::Result<()> + 'static,
    {
        Self::new(name, Trigger::EveryTick, RuleAction::OnTick(Rc::new(action)))
    }

    /// Add a condition. All conditions must hold for the action to run.
    pub fn when<C>(mut self, condition: C) -> Self
    where
        C: Fn(&World) -> bool + 'static,
    {
        self.conditions.push(Rc::new(condition));
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

fn conditions_hold(conditions: &[Condition], world: &World) -> bool {
    conditions.iter().all(|c| c(world))
}

// ---------------------------------------------------------------------------
// Tick rules as systems
// ---------------------------------------------------------------------------

/// A compiled tick rule.
struct TickRuleSystem {
    name: String,
    conditions: Vec<Condition>,
    action: TickAction,
}

impl System for TickRuleSystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, dt: f64, ctx: &mut ActionContext<'_>) -> anyhow::Result<()> {
        if conditions_hold(&self.conditions, ctx.world()) {
            (self.action)(dt, ctx)
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// Outcome of [`compile_rules`].
#[derive(Debug, Default)]
pub struct RuleCompilation {
    /// Event subscriptions installed.
    pub subscriptions: usize,
    /// Tick systems installed.
    pub tick_systems: usize,
    /// One [`EngineError::MalformedRuleTrigger`] per skipped rule.
    pub errors: Vec<EngineError>,
}

impl RuleCompilation {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

enum Compiled {
    Event {
        kind: EventKind,
        priority: i32,
        name: String,
        conditions: Vec<Condition>,
        action: EventAction,
    },
    Tick(TickRuleSystem),
}

fn resolve(rule: Rule, bus: &EventBus) -> Result<Compiled, EngineError> {
    let Rule {
        name,
        trigger,
        conditions,
        action,
        priority,
    } = rule;

    let kind = match trigger {
        Trigger::Event(kind) => Some(kind),
        Trigger::EventNamed(event_name) => match bus.lookup_event(&event_name) {
            Some(kind) => Some(kind),
            None => {
                return Err(EngineError::MalformedRuleTrigger {
                    rule: name,
                    details: format!("no event is registered under the name '{event_name}'"),
                })
            }
        },
        Trigger::EveryTick => None,
    };

    match (kind, action) {
        (Some(kind), RuleAction::OnEvent(action)) => Ok(Compiled::Event {
            kind,
            priority,
            name,
            conditions,
            action,
        }),
        (None, RuleAction::OnTick(action)) => Ok(Compiled::Tick(TickRuleSystem {
            name,
            conditions,
            action,
        })),
        (Some(_), RuleAction::OnTick(_)) => Err(EngineError::MalformedRuleTrigger {
            rule: name,
            details: "event trigger paired with a tick action".to_owned(),
        }),
        (None, RuleAction::OnEvent(_)) => Err(EngineError::MalformedRuleTrigger {
            rule: name,
            details: "tick trigger paired with an event action".to_owned(),
        }),
    }
}

/// Compile `rules` into bus subscriptions and update-slot systems.
pub fn compile_rules(
    rules: Vec<Rule>,
    bus: &EventBus,
    systems: &mut SystemRegistry,
) -> RuleCompilation {
    let mut report = RuleCompilation::default();
    let mut event_rules = Vec::new();
    let mut tick_rules = Vec::new();

    for rule in rules {
        match resolve(rule, bus) {
            Ok(compiled @ Compiled::Event { .. }) => event_rules.push(compiled),
            Ok(Compiled::Tick(system)) => tick_rules.push(system),
            Err(err) => {
                tracing::warn!(error = %err, "skipping malformed rule");
                report.errors.push(err);
            }
        }
    }

    // Stable: equal priorities keep declaration order.
    event_rules.sort_by_key(|compiled| match compiled {
        Compiled::Event { priority, .. } => *priority,
        Compiled::Tick(_) => 0,
    });

    for compiled in event_rules {
        let Compiled::Event {
            kind,
            priority,
            name,
            conditions,
            action,
        } = compiled
        else {
            continue;
        };
        tracing::debug!(rule = %name, event = %bus.event_name(kind), priority, "subscribing event rule");
        let listener: Listener = Rc::new(
            move |envelope: &EventEnvelope<'_>, ctx: &mut ActionContext<'_>| {
                if conditions_hold(&conditions, ctx.world()) {
                    action(envelope, ctx)
                } else {
                    Ok(())
                }
            },
        );
        bus.subscribe_kind(kind, listener);
        report.subscriptions += 1;
    }

    for system in tick_rules {
        tracing::debug!(rule = %system.name, "scheduling tick rule");
        systems.add(system, ScheduleSlot::Update, false);
        report.tick_systems += 1;
    }

    report
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
