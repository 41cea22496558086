//! Declarative game setup.
//!
//! A [`Blueprint`] collects everything an [`Orchestrator`] needs before the
//! first tick: frame config, component kinds, setup functions, systems,
//! rules, sounds, and the external adapters. Nothing runs until
//! [`Orchestrator::from_blueprint`] consumes it.
//!
//! [`Orchestrator`]: crate::frame::Orchestrator
//! [`Orchestrator::from_blueprint`]: crate::frame::Orchestrator::from_blueprint

use ark_ecs::component::{Component, ComponentKind};
use ark_ecs::world::World;

use crate::canvas::Renderer;
use crate::config::FrameConfig;
use crate::context::{AudioContext, DisplayContext, SoundMapping};
use crate::physics::PhysicsAdapter;
use crate::rule::Rule;
use crate::sync::SyncRole;
use crate::system::{ScheduleSlot, System, SystemRegistry};

pub(crate) type SetupFn = Box<dyn FnOnce(&mut World, &DisplayContext) -> anyhow::Result<()>>;

/// A component kind to register, and whether it is drawn.
pub(crate) struct KindRegistration {
    pub(crate) register: Box<dyn FnOnce(&mut World) -> ComponentKind>,
    pub(crate) renderable: bool,
}

/// A system waiting to be added to the registry.
pub(crate) type SystemInstall = Box<dyn FnOnce(&mut SystemRegistry) -> bool>;

/// Builder for a game.
#[derive(Default)]
pub struct Blueprint {
    pub(crate) frame: FrameConfig,
    pub(crate) role: SyncRole,
    pub(crate) kinds: Vec<KindRegistration>,
    pub(crate) setups: Vec<SetupFn>,
    pub(crate) systems: Vec<SystemInstall>,
    pub(crate) rules: Vec<Rule>,
    pub(crate) sounds: SoundMapping,
    pub(crate) physics: Option<Box<dyn PhysicsAdapter>>,
    pub(crate) renderer: Option<Box<dyn Renderer>>,
    pub(crate) audio: Option<Box<dyn AudioContext>>,
}

impl std::fmt::Debug for Blueprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blueprint")
            .field("frame", &self.frame)
            .field("role", &self.role)
            .field("kinds", &self.kinds.len())
            .field("setups", &self.setups.len())
            .field("systems", &self.systems.len())
            .field("rules", &self.rules.len())
            .field("sounds", &self.sounds.len())
            .field("physics", &self.physics.is_some())
            .field("renderer", &self.renderer.is_some())
            .finish()
    }
}

impl Blueprint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }

    pub fn role(mut self, role: SyncRole) -> Self {
        self.role = role;
        self
    }

    /// Register component kind `T` under `name`. Runs for every role, so a
    /// participant can decode synced state.
    pub fn component<T: Component>(mut self, name: &str) -> Self {
        let name = name.to_owned();
        self.kinds.push(KindRegistration {
            register: Box::new(move |world: &mut World| world.register_component::<T>(&name)),
            renderable: false,
        });
        self
    }

    /// Like [`component`](Self::component), and include `T` in the canvas
    /// handed to the renderer.
    pub fn renderable<T: Component>(mut self, name: &str) -> Self {
        self = self.component::<T>(name);
        if let Some(last) = self.kinds.last_mut() {
            last.renderable = true;
        }
        self
    }

    /// Run `setup` once while the orchestrator is built. Skipped for
    /// participants.
    pub fn setup<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut World, &DisplayContext) -> anyhow::Result<()> + 'static,
    {
        self.setups.push(Box::new(setup));
        self
    }

    /// Add a system to `slot`. See [`SystemRegistry::add`] for `unique`.
    pub fn system<S: System>(mut self, slot: ScheduleSlot, system: S, unique: bool) -> Self {
        self.systems
            .push(Box::new(move |registry: &mut SystemRegistry| {
                registry.add(system, slot, unique)
            }));
        self
    }

    /// Add a unique system to [`ScheduleSlot::Update`].
    pub fn update_system<S: System>(self, system: S) -> Self {
        self.system(ScheduleSlot::Update, system, true)
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Sound ids to load into the audio context. Later ids replace earlier
    /// ones.
    pub fn sounds(mut self, mapping: SoundMapping) -> Self {
        self.sounds.extend(mapping);
        self
    }

    pub fn physics<P: PhysicsAdapter + 'static>(mut self, adapter: P) -> Self {
        self.physics = Some(Box::new(adapter));
        self
    }

    pub fn renderer<R: Renderer + 'static>(mut self, renderer: R) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    /// Replace the default [`SilentAudio`](crate::context::SilentAudio).
    pub fn audio<A: AudioContext + 'static>(mut self, audio: A) -> Self {
        self.audio = Some(Box::new(audio));
        self
    }
}
