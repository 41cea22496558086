//! The frame orchestrator.
//!
//! [`Orchestrator`] owns the world, the event bus, the system registry and
//! the external adapters, and drives them one tick at a time. It does not
//! keep wall-clock time: a host tick source calls [`Orchestrator::advance`]
//! with its own timestamps, or [`Orchestrator::tick`] with an explicit delta.
//!
//! Each tick:
//!
//! 1. The host delta is clamped to `[0, max_delta]` and simulation time
//!    advances.
//! 2. Systems run slot by slot (time, physics, update, render-prep), in
//!    registration order within a slot. A failing or panicking system is
//!    logged and counted; the rest still run.
//! 3. Loop signals raised during the tick (pause, resume, terminate) are
//!    applied at the tick boundary.
//! 4. Renderable components are captured into a [`Canvas`] and handed to
//!    the attached [`Renderer`].
//!
//! # States
//!
//! `Uninitialized --start--> Running <--pause/resume--> Paused`, and any
//! state `--terminate--> Terminated`. Only `Running` ticks.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use ark_ecs::component::ComponentKind;
use ark_ecs::world::World;

use crate::animation::{Animation, AnimationSystem, ANIMATION_COMPONENT};
use crate::blueprint::Blueprint;
use crate::camera::{align_camera, Camera, CameraSystem, CameraTarget};
use crate::camera::{CAMERA_COMPONENT, CAMERA_TARGET_COMPONENT};
use crate::canvas::{Canvas, Renderer};
use crate::config::FrameConfig;
use crate::context::{ActionContext, AudioContext, DisplayContext, LoopSignal, SilentAudio};
use crate::event::{Event, EventBus, PauseLoop, ResumeLoop, ScreenResize, TerminateLoop};
use crate::physics::{PhysicsAdapter, PhysicsBody, PhysicsSystem, Position, Velocity};
use crate::physics::{PHYSICS_BODY_COMPONENT, POSITION_COMPONENT, VELOCITY_COMPONENT};
use crate::rule::{compile_rules, RuleCompilation};
use crate::sync::SyncRole;
use crate::system::{ScheduleSlot, SystemRegistry};
use crate::time::{StopWatch, TimeSystem, STOP_WATCH_COMPONENT, WORLD_TIME};
use crate::{panic_message, EngineError};

// ---------------------------------------------------------------------------
// LoopState
// ---------------------------------------------------------------------------

/// Lifecycle of an [`Orchestrator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Uninitialized,
    Running,
    Paused,
    Terminated,
}

// ---------------------------------------------------------------------------
// TickReport
// ---------------------------------------------------------------------------

/// What happened during one tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// 1-based tick number.
    pub tick: u64,
    /// Clamped delta handed to systems, in seconds.
    pub delta: f64,
    /// Wall-clock time per system, in execution order.
    pub system_times: Vec<(String, Duration)>,
    /// Systems that returned an error or panicked.
    pub system_faults: usize,
    /// Listeners that returned an error or panicked.
    pub subscriber_faults: u64,
    /// Wall-clock time for the whole tick, rendering included.
    pub total_time: Duration,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives a game built from a [`Blueprint`].
pub struct Orchestrator {
    world: World,
    bus: EventBus,
    systems: SystemRegistry,
    display: DisplayContext,
    audio: Box<dyn AudioContext>,
    physics: Option<Box<dyn PhysicsAdapter>>,
    renderer: Option<Box<dyn Renderer>>,
    config: FrameConfig,
    role: SyncRole,
    renderable: Vec<ComponentKind>,
    rule_compilation: RuleCompilation,
    state: LoopState,
    tick_count: u64,
    sim_time: f64,
    last_advance: Option<f64>,
    last_report: Option<TickReport>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.state)
            .field("role", &self.role)
            .field("tick_count", &self.tick_count)
            .field("sim_time", &self.sim_time)
            .field("world", &self.world)
            .field("systems", &self.systems)
            .finish()
    }
}

impl Orchestrator {
    /// Build an orchestrator from a blueprint and a (usually empty) world.
    ///
    /// Setup runs in this order: component kinds, default entities, default
    /// listeners, default systems, blueprint setup functions, blueprint
    /// systems, rules, sound mapping, camera alignment. Participants skip
    /// the entity, setup-function, system and rule steps.
    ///
    /// Malformed rules do not fail the build; see
    /// [`rule_compilation`](Self::rule_compilation).
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidConfig`] if the frame config is out of range.
    /// - [`EngineError::SetupFailed`] if a setup function returns an error.
    /// - [`EngineError::Ecs`] if creating a default entity fails.
    ///
    /// # Panics
    ///
    /// Panics if a built-in component name (`"position"`, `"camera"`, ...)
    /// is already registered in `world` for a different type.
    pub fn from_blueprint(blueprint: Blueprint, mut world: World) -> Result<Self, EngineError> {
        let Blueprint {
            frame,
            role,
            kinds,
            setups,
            systems: blueprint_systems,
            rules,
            sounds,
            physics,
            renderer,
            audio,
        } = blueprint;

        frame.validate()?;
        let display = DisplayContext::new(frame.canvas_size(), frame.screen_size());
        let simulates = role.simulates();

        register_builtin_kinds(&mut world);
        let mut renderable = Vec::new();
        for registration in kinds {
            let kind = (registration.register)(&mut world);
            if registration.renderable && !renderable.contains(&kind) {
                renderable.push(kind);
            }
        }

        if simulates {
            let clock = world.spawn_with(StopWatch::new(WORLD_TIME))?;
            tracing::debug!(entity = %clock, "created world clock");
        }

        let bus = EventBus::new();
        install_default_listeners(&bus);

        let mut systems = SystemRegistry::new();
        let mut rule_compilation = RuleCompilation::default();
        if simulates {
            systems.add(TimeSystem, ScheduleSlot::Time, true);
            systems.add(PhysicsSystem, ScheduleSlot::Physics, true);
            systems.add(AnimationSystem, ScheduleSlot::RenderPrep, true);
            systems.add(CameraSystem, ScheduleSlot::RenderPrep, true);

            for setup in setups {
                setup(&mut world, &display).map_err(EngineError::SetupFailed)?;
            }
            for install in blueprint_systems {
                install(&mut systems);
            }
            rule_compilation = compile_rules(rules, &bus, &mut systems);
        } else {
            tracing::debug!(
                skipped_setups = setups.len(),
                skipped_systems = blueprint_systems.len(),
                skipped_rules = rules.len(),
                "participant: state arrives from the host"
            );
        }

        let mut audio = audio.unwrap_or_else(|| Box::new(SilentAudio::default()));
        audio.load(&sounds);

        if simulates {
            align_camera(&mut world, &display)?;
        }

        tracing::debug!(
            ?role,
            entities = world.entity_count(),
            systems = systems.len(),
            rule_subscriptions = rule_compilation.subscriptions,
            rule_errors = rule_compilation.errors.len(),
            "orchestrator ready"
        );

        Ok(Self {
            world,
            bus,
            systems,
            display,
            audio,
            physics,
            renderer,
            config: frame,
            role,
            renderable,
            rule_compilation,
            state: LoopState::Uninitialized,
            tick_count: 0,
            sim_time: 0.0,
            last_advance: None,
            last_report: None,
        })
    }

    // -- lifecycle ----------------------------------------------------------

    /// `Uninitialized -> Running`. Returns whether the transition happened.
    pub fn start(&mut self) -> bool {
        if self.state != LoopState::Uninitialized {
            tracing::warn!(state = ?self.state, "start ignored: already started");
            return false;
        }
        self.set_state(LoopState::Running);
        true
    }

    /// Host tick-source entry point.
    ///
    /// `now` is the host's timestamp in seconds. The delta is measured from
    /// the previous call; the first call uses `default_delta`. Returns
    /// `None` without ticking unless the loop is `Running`. Calls made while
    /// paused do not move the reference timestamp, so the first delta after
    /// a resume spans the pause and is clamped to `max_delta`.
    pub fn advance(&mut self, now: f64) -> Option<TickReport> {
        if self.state != LoopState::Running {
            return None;
        }
        let raw = match self.last_advance {
            Some(previous) => now - previous,
            None => self.config.default_delta,
        };
        self.last_advance = Some(now);
        Some(self.run_tick(raw))
    }

    /// Run one tick with an explicit delta (clamped like
    /// [`advance`](Self::advance)). Returns `None` unless `Running`.
    pub fn tick(&mut self, dt: f64) -> Option<TickReport> {
        if self.state != LoopState::Running {
            return None;
        }
        Some(self.run_tick(dt))
    }

    /// Publish an event from the host, between ticks.
    ///
    /// Loop signals raised by listeners apply immediately. Ignored once
    /// terminated.
    pub fn emit<E: Event>(&mut self, event: E) {
        if self.state == LoopState::Terminated {
            tracing::debug!(event = std::any::type_name::<E>(), "emit ignored: terminated");
            return;
        }
        let signals = {
            let mut ctx = ActionContext::new(
                &mut self.world,
                &self.bus,
                &mut self.display,
                self.audio.as_mut(),
                self.physics.as_deref_mut(),
                self.sim_time,
            );
            ctx.emit(event);
            ctx.take_signals()
        };
        for signal in signals {
            self.apply_signal(signal);
        }
    }

    fn run_tick(&mut self, raw_dt: f64) -> TickReport {
        let tick_start = Instant::now();
        let dt = self.config.clamp_delta(raw_dt);
        if dt != raw_dt {
            tracing::trace!(raw_dt, dt, "clamped host delta");
        }
        self.tick_count += 1;
        self.sim_time += dt;
        let faults_before = self.bus.fault_count();

        let mut system_times = Vec::with_capacity(self.systems.len());
        let mut system_faults = 0;
        let signals = {
            let mut ctx = ActionContext::new(
                &mut self.world,
                &self.bus,
                &mut self.display,
                self.audio.as_mut(),
                self.physics.as_deref_mut(),
                self.sim_time,
            );
            for (_slot, entry) in self.systems.iter() {
                let sys_start = Instant::now();
                let outcome = catch_unwind(AssertUnwindSafe(|| entry.system().run(dt, &mut ctx)));
                let details = match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(err)) => Some(format!("{err:#}")),
                    Err(payload) => Some(format!("panicked: {}", panic_message(payload.as_ref()))),
                };
                if let Some(details) = details {
                    system_faults += 1;
                    let fault = EngineError::SystemFault {
                        system: entry.name().to_owned(),
                        details,
                    };
                    tracing::warn!(tick = self.tick_count, error = %fault, "system fault isolated");
                }
                system_times.push((entry.name().to_owned(), sys_start.elapsed()));
            }
            ctx.take_signals()
        };

        for signal in signals {
            self.apply_signal(signal);
        }
        self.render();

        let report = TickReport {
            tick: self.tick_count,
            delta: dt,
            system_times,
            system_faults,
            subscriber_faults: self.bus.fault_count() - faults_before,
            total_time: tick_start.elapsed(),
        };
        tracing::trace!(
            tick = report.tick,
            delta = report.delta,
            system_faults = report.system_faults,
            subscriber_faults = report.subscriber_faults,
            "tick complete"
        );
        self.last_report = Some(report.clone());
        report
    }

    fn render(&mut self) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        match Canvas::capture(&self.world, &self.renderable) {
            Ok(canvas) => renderer.render(&canvas, &self.display),
            Err(err) => tracing::warn!(error = %err, "skipping render: canvas capture failed"),
        }
    }

    /// Apply a loop signal now. Transitions that do not fit the current
    /// state are ignored, including every signal before [`start`](Self::start).
    pub fn apply_signal(&mut self, signal: LoopSignal) {
        let next = match (signal, self.state) {
            (_, LoopState::Terminated | LoopState::Uninitialized) => None,
            (LoopSignal::Terminate, _) => Some(LoopState::Terminated),
            (LoopSignal::Pause, LoopState::Running) => Some(LoopState::Paused),
            (LoopSignal::Resume, LoopState::Paused) => Some(LoopState::Running),
            _ => None,
        };
        match next {
            Some(state) => self.set_state(state),
            None => tracing::debug!(?signal, state = ?self.state, "loop signal ignored"),
        }
    }

    fn set_state(&mut self, state: LoopState) {
        tracing::debug!(from = ?self.state, to = ?state, "loop state transition");
        self.state = state;
        if state == LoopState::Terminated {
            self.renderer = None;
            self.physics = None;
        }
    }

    // -- accessors ----------------------------------------------------------

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Ticks run so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Sum of clamped deltas, in seconds.
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable world access between ticks.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn systems(&self) -> &SystemRegistry {
        &self.systems
    }

    pub fn display(&self) -> &DisplayContext {
        &self.display
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn role(&self) -> SyncRole {
        self.role
    }

    /// Outcome of compiling the blueprint's rules.
    pub fn rule_compilation(&self) -> &RuleCompilation {
        &self.rule_compilation
    }

    pub fn last_report(&self) -> Option<&TickReport> {
        self.last_report.as_ref()
    }

    pub fn has_physics(&self) -> bool {
        self.physics.is_some()
    }

    pub fn has_renderer(&self) -> bool {
        self.renderer.is_some()
    }
}

fn register_builtin_kinds(world: &mut World) {
    world.register_component::<StopWatch>(STOP_WATCH_COMPONENT);
    world.register_component::<Camera>(CAMERA_COMPONENT);
    world.register_component::<CameraTarget>(CAMERA_TARGET_COMPONENT);
    world.register_component::<Position>(POSITION_COMPONENT);
    world.register_component::<Velocity>(VELOCITY_COMPONENT);
    world.register_component::<PhysicsBody>(PHYSICS_BODY_COMPONENT);
    world.register_component::<Animation>(ANIMATION_COMPONENT);
}

fn install_default_listeners(bus: &EventBus) {
    bus.subscribe::<ScreenResize, _>(|resize: &ScreenResize, ctx: &mut ActionContext<'_>| {
        ctx.display_mut()
            .update_screen_size(resize.width, resize.height);
        Ok(())
    });
    bus.subscribe::<PauseLoop, _>(|_: &PauseLoop, ctx: &mut ActionContext<'_>| {
        ctx.request(LoopSignal::Pause);
        Ok(())
    });
    bus.subscribe::<ResumeLoop, _>(|_: &ResumeLoop, ctx: &mut ActionContext<'_>| {
        ctx.request(LoopSignal::Resume);
        Ok(())
    });
    bus.subscribe::<TerminateLoop, _>(|_: &TerminateLoop, ctx: &mut ActionContext<'_>| {
        ctx.request(LoopSignal::Terminate);
        Ok(())
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::FnSystem;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn running(blueprint: Blueprint) -> Orchestrator {
        let mut ark = Orchestrator::from_blueprint(blueprint, World::new()).unwrap();
        assert!(ark.start());
        ark
    }

    fn world_time(ark: &Orchestrator) -> f64 {
        ark.world()
            .query::<(&StopWatch,)>()
            .find(|(_, (w,))| w.name == WORLD_TIME)
            .map(|(_, (w,))| w.elapsed)
            .unwrap()
    }

    struct CountingRenderer(Rc<Cell<usize>>);

    impl Renderer for CountingRenderer {
        fn render(&mut self, _canvas: &Canvas, _display: &DisplayContext) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn ticks_only_when_running() {
        let mut ark = Orchestrator::from_blueprint(Blueprint::new(), World::new()).unwrap();
        assert_eq!(ark.state(), LoopState::Uninitialized);
        assert!(ark.tick(0.1).is_none());
        assert!(ark.start());
        assert!(!ark.start());
        assert!(ark.tick(0.1).is_some());
        assert_eq!(ark.tick_count(), 1);
    }

    #[test]
    fn default_setup_creates_clock_and_camera() {
        let ark = running(Blueprint::new());
        assert_eq!(ark.world().entity_count(), 2);
        assert_eq!(ark.world().entities_with::<(&Camera,)>().len(), 1);
        assert_eq!(ark.systems().names(), vec!["time", "physics", "animation", "camera"]);
        assert_eq!(world_time(&ark), 0.0);
    }

    #[test]
    fn first_advance_uses_default_delta() {
        let mut ark = running(Blueprint::new());
        let report = ark.advance(100.0).unwrap();
        assert_eq!(report.tick, 1);
        assert!((report.delta - 1.0 / 60.0).abs() < 1e-12);
        let report = ark.advance(100.1).unwrap();
        assert!((report.delta - 0.1).abs() < 1e-9);
    }

    #[test]
    fn large_and_negative_deltas_are_clamped() {
        let mut ark = running(Blueprint::new());
        assert_eq!(ark.tick(30.0).unwrap().delta, 0.25);
        assert_eq!(ark.tick(-1.0).unwrap().delta, 0.0);
        assert_eq!(world_time(&ark), 0.25);
        assert_eq!(ark.sim_time(), 0.25);
    }

    #[test]
    fn pause_blocks_ticks_and_resume_clamps_gap() {
        let mut ark = running(Blueprint::new());
        ark.advance(0.0).unwrap();
        ark.emit(PauseLoop);
        assert_eq!(ark.state(), LoopState::Paused);
        assert!(ark.advance(5.0).is_none());
        assert!(ark.tick(0.1).is_none());
        ark.emit(ResumeLoop);
        assert_eq!(ark.state(), LoopState::Running);
        let report = ark.advance(60.0).unwrap();
        assert_eq!(report.delta, 0.25);
    }

    #[test]
    fn pause_requested_during_tick_applies_at_boundary() {
        let after_pause = Rc::new(Cell::new(0));
        let counter = Rc::clone(&after_pause);
        let blueprint = Blueprint::new()
            .system(
                ScheduleSlot::Update,
                FnSystem::new("pauser", |_, ctx| {
                    ctx.emit(PauseLoop);
                    Ok(())
                }),
                true,
            )
            .system(
                ScheduleSlot::RenderPrep,
                FnSystem::new("late", move |_, _| {
                    counter.set(counter.get() + 1);
                    Ok(())
                }),
                true,
            );
        let mut ark = running(blueprint);
        assert!(ark.tick(0.1).is_some());
        assert_eq!(after_pause.get(), 1);
        assert_eq!(ark.state(), LoopState::Paused);
        assert!(ark.tick(0.1).is_none());
    }

    #[test]
    fn terminate_drops_adapters_and_stops_for_good() {
        let renders = Rc::new(Cell::new(0));
        let blueprint = Blueprint::new()
            .physics(crate::physics::RapierPhysics::default())
            .renderer(CountingRenderer(Rc::clone(&renders)));
        let mut ark = running(blueprint);
        ark.tick(0.1);
        assert_eq!(renders.get(), 1);
        assert!(ark.has_physics() && ark.has_renderer());

        ark.emit(TerminateLoop);
        assert_eq!(ark.state(), LoopState::Terminated);
        assert!(!ark.has_physics());
        assert!(!ark.has_renderer());
        assert!(ark.tick(0.1).is_none());
        ark.emit(ResumeLoop);
        assert_eq!(ark.state(), LoopState::Terminated);
        assert_eq!(renders.get(), 1);
    }

    #[test]
    fn signals_before_start_are_ignored() {
        let mut ark = Orchestrator::from_blueprint(Blueprint::new(), World::new()).unwrap();
        ark.emit(TerminateLoop);
        ark.emit(PauseLoop);
        assert_eq!(ark.state(), LoopState::Uninitialized);
        assert!(ark.start());
        assert!(ark.tick(0.1).is_some());
    }

    #[test]
    fn default_animation_system_plays_clips() {
        let blueprint = Blueprint::new().setup(|world, _| {
            world.spawn_with(Animation::new(["idle", "blink"], 0.1).looping())?;
            Ok(())
        });
        let mut ark = running(blueprint);
        ark.tick(0.1).unwrap();
        let (_, (anim,)) = ark.world().query::<(&Animation,)>().next().unwrap();
        assert_eq!(anim.current_frame(), Some("blink"));
    }

    #[test]
    fn faulting_system_is_isolated() {
        let reached = Rc::new(Cell::new(false));
        let flag = Rc::clone(&reached);
        let blueprint = Blueprint::new()
            .system(
                ScheduleSlot::Update,
                FnSystem::new("fails", |_, _| Err(anyhow::anyhow!("boom"))),
                false,
            )
            .system(
                ScheduleSlot::Update,
                FnSystem::new("panics", |_, _| panic!("kaboom")),
                false,
            )
            .system(
                ScheduleSlot::Update,
                FnSystem::new("survivor", move |_, _| {
                    flag.set(true);
                    Ok(())
                }),
                false,
            );
        let mut ark = running(blueprint);
        let report = ark.tick(0.1).unwrap();
        assert_eq!(report.system_faults, 2);
        assert!(reached.get());
        assert_eq!(ark.state(), LoopState::Running);
    }

    #[test]
    fn systems_run_in_slot_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let push = |tag: &'static str| {
            let log = Rc::clone(&log);
            FnSystem::new(tag, move |_, _| {
                log.borrow_mut().push(tag);
                Ok(())
            })
        };
        let blueprint = Blueprint::new()
            .system(ScheduleSlot::RenderPrep, push("draw"), false)
            .system(ScheduleSlot::Update, push("move"), false)
            .system(ScheduleSlot::Time, push("clock"), false);
        let mut ark = running(blueprint);
        let report = ark.tick(0.1).unwrap();
        assert_eq!(*log.borrow(), vec!["clock", "move", "draw"]);
        let names: Vec<&str> = report.system_times.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["time", "clock", "physics", "move", "animation", "camera", "draw"]);
    }

    #[test]
    fn screen_resize_updates_display() {
        let mut ark = running(Blueprint::new());
        ark.emit(ScreenResize {
            width: 640.0,
            height: 360.0,
        });
        assert_eq!(ark.display().screen_size(), (640.0, 360.0));
    }

    #[test]
    fn setup_error_fails_build() {
        let blueprint = Blueprint::new().setup(|_, _| Err(anyhow::anyhow!("missing level")));
        let err = Orchestrator::from_blueprint(blueprint, World::new()).unwrap_err();
        assert!(matches!(err, EngineError::SetupFailed(_)));
        assert!(err.to_string().contains("missing level"));
    }

    #[test]
    fn invalid_frame_config_fails_build() {
        let blueprint = Blueprint::new().frame(FrameConfig {
            canvas_width: -5.0,
            ..Default::default()
        });
        assert!(matches!(
            Orchestrator::from_blueprint(blueprint, World::new()),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn participant_skips_simulation_setup() {
        let setup_ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&setup_ran);
        let blueprint = Blueprint::new()
            .role(SyncRole::Participant)
            .setup(move |_, _| {
                flag.set(true);
                Ok(())
            })
            .rule(crate::rule::Rule::every_tick("never", |_, _| Ok(())));
        let mut ark = running(blueprint);
        assert!(!setup_ran.get());
        assert_eq!(ark.world().entity_count(), 0);
        assert!(ark.systems().is_empty());
        assert!(ark.tick(0.1).is_some());

        ark.emit(PauseLoop);
        assert_eq!(ark.state(), LoopState::Paused);
    }
}
