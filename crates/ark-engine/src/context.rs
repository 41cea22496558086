//! The action context handed to systems, listeners and rule actions.
//!
//! [`ActionContext`] bundles mutable ECS access, the event bus, the display
//! and audio facades, the optional physics adapter, and the current
//! simulation time. It also carries an outbox of [`LoopSignal`]s: the only
//! way code running inside a tick can ask the orchestrator to pause, resume
//! or stop.

use std::collections::{BTreeMap, BTreeSet};

use ark_ecs::world::World;

use crate::event::{Event, EventBus};
use crate::physics::PhysicsAdapter;

// ---------------------------------------------------------------------------
// LoopSignal
// ---------------------------------------------------------------------------

/// A request to change the orchestrator's loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopSignal {
    Pause,
    Resume,
    Terminate,
}

// ---------------------------------------------------------------------------
// DisplayContext
// ---------------------------------------------------------------------------

/// Canvas and screen geometry.
///
/// The canvas is the fixed logical drawing area; the screen is whatever the
/// host window currently is.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayContext {
    canvas_size: (f64, f64),
    screen_size: (f64, f64),
}

impl DisplayContext {
    pub fn new(canvas_size: (f64, f64), screen_size: (f64, f64)) -> Self {
        Self {
            canvas_size,
            screen_size,
        }
    }

    pub fn canvas_size(&self) -> (f64, f64) {
        self.canvas_size
    }

    pub fn screen_size(&self) -> (f64, f64) {
        self.screen_size
    }

    /// Record a new screen size. Non-positive sizes are ignored.
    pub fn update_screen_size(&mut self, width: f64, height: f64) {
        if width > 0.0 && height > 0.0 {
            self.screen_size = (width, height);
        } else {
            tracing::warn!(width, height, "ignoring non-positive screen size");
        }
    }

    /// Uniform factor that fits the canvas inside the screen.
    pub fn canvas_scale(&self) -> f64 {
        let (cw, ch) = self.canvas_size;
        let (sw, sh) = self.screen_size;
        (sw / cw).min(sh / ch)
    }
}

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

/// Sound id -> resource locator, loaded once at setup.
pub type SoundMapping = BTreeMap<String, String>;

/// Playback facade over an external audio backend.
pub trait AudioContext {
    /// Load a sound mapping. Later mappings add to or replace earlier ids.
    fn load(&mut self, mapping: &SoundMapping);
    /// Start playing a loaded sound.
    fn play(&mut self, sound: &str, looping: bool);
    /// Stop a sound if it is playing.
    fn stop(&mut self, sound: &str);
}

/// An [`AudioContext`] with no output. Tracks what would be playing.
#[derive(Debug, Default, Clone)]
pub struct SilentAudio {
    loaded: SoundMapping,
    playing: BTreeSet<String>,
    looping: BTreeSet<String>,
}

impl SilentAudio {
    pub fn is_loaded(&self, sound: &str) -> bool {
        self.loaded.contains_key(sound)
    }

    pub fn is_playing(&self, sound: &str) -> bool {
        self.playing.contains(sound)
    }

    pub fn is_looping(&self, sound: &str) -> bool {
        self.looping.contains(sound)
    }
}

impl AudioContext for SilentAudio {
    fn load(&mut self, mapping: &SoundMapping) {
        self.loaded
            .extend(mapping.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    fn play(&mut self, sound: &str, looping: bool) {
        if !self.loaded.contains_key(sound) {
            tracing::warn!(sound, "play requested for a sound that was never loaded");
            return;
        }
        self.playing.insert(sound.to_owned());
        if looping {
            self.looping.insert(sound.to_owned());
        }
    }

    fn stop(&mut self, sound: &str) {
        self.playing.remove(sound);
        self.looping.remove(sound);
    }
}

// ---------------------------------------------------------------------------
// ActionContext
// ---------------------------------------------------------------------------

/// Everything a system, listener or rule action may touch.
pub struct ActionContext<'a> {
    world: &'a mut World,
    bus: &'a EventBus,
    display: &'a mut DisplayContext,
    audio: &'a mut (dyn AudioContext + 'static),
    physics: Option<&'a mut (dyn PhysicsAdapter + 'static)>,
    time: f64,
    signals: Vec<LoopSignal>,
}

impl<'a> ActionContext<'a> {
    pub fn new(
        world: &'a mut World,
        bus: &'a EventBus,
        display: &'a mut DisplayContext,
        audio: &'a mut (dyn AudioContext + 'static),
        physics: Option<&'a mut (dyn PhysicsAdapter + 'static)>,
        time: f64,
    ) -> Self {
        Self {
            world,
            bus,
            display,
            audio,
            physics,
            time,
            signals: Vec::new(),
        }
    }

    pub fn world(&self) -> &World {
        self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        self.world
    }

    pub fn bus(&self) -> &'a EventBus {
        self.bus
    }

    /// Publish an event synchronously. Returns after every listener,
    /// including nested publishes, has run.
    pub fn emit<E: Event>(&mut self, event: E) {
        let bus = self.bus;
        bus.publish(&event, self);
    }

    /// Subscribe a typed listener. It sees publishes made after this call.
    pub fn subscribe<E, F>(&self, listener: F)
    where
        E: Event,
        F: Fn(&E, &mut ActionContext<'_>) -> anyhow::Result<()> + 'static,
    {
        self.bus.subscribe::<E, F>(listener);
    }

    pub fn display(&self) -> &DisplayContext {
        self.display
    }

    pub fn display_mut(&mut self) -> &mut DisplayContext {
        self.display
    }

    pub fn audio(&mut self) -> &mut (dyn AudioContext + 'static) {
        self.audio
    }

    /// The physics adapter, when one is attached.
    pub fn physics(&mut self) -> Option<&mut (dyn PhysicsAdapter + 'static)> {
        self.physics.as_deref_mut()
    }

    /// Simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Queue a loop-state change. Applied by the orchestrator at the next
    /// tick boundary, or right after a host-side publish returns.
    pub fn request(&mut self, signal: LoopSignal) {
        self.signals.push(signal);
    }

    /// Drain queued loop signals in request order.
    pub fn take_signals(&mut self) -> Vec<LoopSignal> {
        std::mem::take(&mut self.signals)
    }
}

impl std::fmt::Debug for ActionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("time", &self.time)
            .field("entities", &self.world.entity_count())
            .field("has_physics", &self.physics.is_some())
            .field("signals", &self.signals)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
