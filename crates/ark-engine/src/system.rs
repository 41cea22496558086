//! Systems and the slot-ordered system registry.
//!
//! A [`System`] is per-tick behaviour. It holds no simulation state of its
//! own; anything that must survive a tick lives in components. Systems are
//! registered into a [`ScheduleSlot`] and each tick runs slot by slot, in
//! registration order within a slot.

use std::any::TypeId;
use std::collections::BTreeMap;

use crate::context::ActionContext;

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

/// Per-tick behaviour over the world.
pub trait System: 'static {
    /// Human-readable name for logs and tick reports.
    fn name(&self) -> &str;

    /// Run once for this tick with the clamped delta in seconds.
    ///
    /// An error (or a panic) is a system fault: it is logged and counted,
    /// and the tick continues with the next system.
    fn run(&self, dt: f64, ctx: &mut ActionContext<'_>) -> anyhow::Result<()>;
}

/// A system built from a closure.
pub struct FnSystem<F> {
    name: String,
    func: F,
}

impl<F> FnSystem<F>
where
    F: Fn(f64, &mut ActionContext<'_>) -> anyhow::Result<()> + 'static,
{
    pub fn new(name: &str, func: F) -> Self {
        Self {
            name: name.to_owned(),
            func,
        }
    }
}

impl<F> System for FnSystem<F>
where
    F: Fn(f64, &mut ActionContext<'_>) -> anyhow::Result<()> + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, dt: f64, ctx: &mut ActionContext<'_>) -> anyhow::Result<()> {
        (self.func)(dt, ctx)
    }
}

// ---------------------------------------------------------------------------
// ScheduleSlot
// ---------------------------------------------------------------------------

/// A phase of the per-tick pipeline. Slots run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ScheduleSlot {
    /// Time keeping (stopwatches).
    Time,
    /// Physics stepping and write-back.
    Physics,
    /// Gameplay systems and tick-triggered rules.
    #[default]
    Update,
    /// Derived state for presentation: camera, animation, canvas.
    RenderPrep,
}

impl ScheduleSlot {
    /// Every slot in execution order.
    pub const ALL: [ScheduleSlot; 4] = [
        ScheduleSlot::Time,
        ScheduleSlot::Physics,
        ScheduleSlot::Update,
        ScheduleSlot::RenderPrep,
    ];
}

// ---------------------------------------------------------------------------
// SystemRegistry
// ---------------------------------------------------------------------------

/// A registered system and the identity used for uniqueness checks.
pub struct RegisteredSystem {
    type_id: TypeId,
    system: Box<dyn System>,
}

impl RegisteredSystem {
    pub fn name(&self) -> &str {
        self.system.name()
    }

    pub fn system(&self) -> &dyn System {
        self.system.as_ref()
    }
}

/// Systems grouped by slot, each group in registration order.
#[derive(Default)]
pub struct SystemRegistry {
    slots: BTreeMap<ScheduleSlot, Vec<RegisteredSystem>>,
}

impl std::fmt::Debug for SystemRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (slot, systems) in &self.slots {
            let names: Vec<&str> = systems.iter().map(RegisteredSystem::name).collect();
            map.entry(slot, &names);
        }
        map.finish()
    }
}

impl SystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `system` in `slot`.
    ///
    /// With `unique` set, the call is a no-op if a system of the same Rust
    /// type is already in that slot. Returns whether the system was added.
    pub fn add<S: System>(&mut self, system: S, slot: ScheduleSlot, unique: bool) -> bool {
        let type_id = TypeId::of::<S>();
        let systems = self.slots.entry(slot).or_default();
        if unique && systems.iter().any(|s| s.type_id == type_id) {
            tracing::debug!(system = system.name(), ?slot, "unique system already registered, skipping");
            return false;
        }
        tracing::debug!(system = system.name(), ?slot, unique, "registered system");
        systems.push(RegisteredSystem {
            type_id,
            system: Box::new(system),
        });
        true
    }

    /// Systems in one slot, in registration order.
    pub fn slot(&self, slot: ScheduleSlot) -> &[RegisteredSystem] {
        self.slots.get(&slot).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every system in execution order, with its slot.
    pub fn iter(&self) -> impl Iterator<Item = (ScheduleSlot, &RegisteredSystem)> + '_ {
        self.slots
            .iter()
            .flat_map(|(slot, systems)| systems.iter().map(move |s| (*slot, s)))
    }

    /// Names of all systems in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.iter().map(|(_, s)| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
