//! Orchestrator scenarios: tick-driven rules, loop control, event rules.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ark_engine::prelude::*;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Shield(u32);

#[derive(Debug, Clone, Copy, PartialEq)]
struct Hit;
impl Event for Hit {}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn running(blueprint: Blueprint) -> Orchestrator {
    init_tracing();
    let mut ark = Orchestrator::from_blueprint(blueprint, World::new()).unwrap();
    assert!(ark.start());
    ark
}

#[test]
fn tick_rule_moves_position_three_times() {
    let blueprint = Blueprint::new()
        .setup(|world, _| {
            world.spawn_with(Position { x: 0.0, y: 0.0 })?;
            Ok(())
        })
        .rule(Rule::every_tick("drift_right", |_dt, ctx| {
            for (_, position) in ctx.world_mut().iter_mut::<Position>() {
                position.x += 1.0;
            }
            Ok(())
        }));
    let mut ark = running(blueprint);

    for _ in 0..3 {
        ark.tick(1.0 / 60.0).unwrap();
    }

    let xs: Vec<f64> = ark
        .world()
        .query::<(&Position,)>()
        .map(|(_, (p,))| p.x)
        .collect();
    assert_eq!(xs, vec![3.0]);
}

#[test]
fn pause_then_terminate_halts_the_loop() {
    let ticks_seen = Rc::new(Cell::new(0u32));
    let counter = Rc::clone(&ticks_seen);
    let blueprint = Blueprint::new().rule(Rule::every_tick("count", move |_, _| {
        counter.set(counter.get() + 1);
        Ok(())
    }));
    let mut ark = running(blueprint);

    let mut now = 0.0;
    for _ in 0..5 {
        ark.advance(now);
        now += 1.0 / 60.0;
    }
    assert_eq!(ticks_seen.get(), 5);

    ark.emit(PauseLoop);
    for _ in 0..5 {
        assert!(ark.advance(now).is_none());
        now += 1.0 / 60.0;
    }
    assert_eq!(ticks_seen.get(), 5);

    ark.emit(TerminateLoop);
    assert_eq!(ark.state(), LoopState::Terminated);
    assert!(ark.advance(now).is_none());
    assert!(ark.tick(0.1).is_none());
    assert_eq!(ticks_seen.get(), 5);
    assert_eq!(ark.tick_count(), 5);
}

#[test]
fn rule_can_pause_the_loop_from_inside_a_tick() {
    let blueprint = Blueprint::new().rule(
        Rule::every_tick("stop_after_two", |_, ctx| {
            ctx.emit(PauseLoop);
            Ok(())
        })
        .when(|world: &World| {
            world
                .query::<(&StopWatch,)>()
                .any(|(_, (w,))| w.name == WORLD_TIME && w.elapsed >= 0.2)
        }),
    );
    let mut ark = running(blueprint);
    assert!(ark.tick(0.1).is_some());
    assert_eq!(ark.state(), LoopState::Running);
    assert!(ark.tick(0.1).is_some());
    assert_eq!(ark.state(), LoopState::Paused);
    assert!(ark.tick(0.1).is_none());
}

#[test]
fn event_rules_fire_in_priority_order() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let rule = |name: &'static str, priority: i32| {
        let log = Rc::clone(&log);
        Rule::on::<Hit, _>(name, move |_, _| {
            log.borrow_mut().push(name);
            Ok(())
        })
        .priority(priority)
    };
    let blueprint = Blueprint::new().rules([rule("r1", 5), rule("r2", 1)]);
    let mut ark = running(blueprint);

    ark.emit(Hit);
    assert_eq!(*log.borrow(), vec!["r2", "r1"]);
}

#[test]
fn condition_on_absent_component_never_fires() {
    let fired = Rc::new(Cell::new(0u32));
    let counter = Rc::clone(&fired);
    let blueprint = Blueprint::new()
        .component::<Shield>("shield")
        .rule(
            Rule::on::<Hit, _>("shielded_hit", move |_, _| {
                counter.set(counter.get() + 1);
                Ok(())
            })
            .when(|world: &World| !world.entities_with::<(&Shield,)>().is_empty()),
        );
    let mut ark = running(blueprint);

    for _ in 0..20 {
        ark.emit(Hit);
        ark.tick(0.01);
    }
    assert_eq!(fired.get(), 0);
}

#[test]
fn malformed_rules_are_reported_not_fatal() {
    let blueprint = Blueprint::new()
        .rule(Rule::on_named("ghost", "never_registered", |_, _| Ok(())))
        .rule(Rule::every_tick("fine", |_, _| Ok(())));
    let ark = running(blueprint);

    let report = ark.rule_compilation();
    assert_eq!(report.tick_systems, 1);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].to_string().contains("ghost"));
    assert!(ark.systems().names().contains(&"fine"));
}

#[test]
fn faulting_listener_is_counted_in_tick_report() {
    let blueprint = Blueprint::new()
        .rule(Rule::on::<Hit, _>("broken", |_, _| Err(anyhow::anyhow!("nope"))))
        .system(
            ScheduleSlot::Update,
            FnSystem::new("hitter", |_, ctx| {
                ctx.emit(Hit);
                Ok(())
            }),
            true,
        );
    let mut ark = running(blueprint);
    let report = ark.tick(0.1).unwrap();
    assert_eq!(report.subscriber_faults, 1);
    assert_eq!(report.system_faults, 0);
    assert_eq!(ark.bus().fault_count(), 1);
}

#[test]
fn sounds_are_loaded_into_the_audio_context() {
    #[derive(Default)]
    struct Recording(Rc<RefCell<Vec<String>>>);

    impl AudioContext for Recording {
        fn load(&mut self, mapping: &SoundMapping) {
            self.0.borrow_mut().extend(mapping.keys().cloned());
        }
        fn play(&mut self, sound: &str, _looping: bool) {
            self.0.borrow_mut().push(format!("play:{sound}"));
        }
        fn stop(&mut self, _sound: &str) {}
    }

    let log = Rc::new(RefCell::new(Vec::new()));
    let blueprint = Blueprint::new()
        .audio(Recording(Rc::clone(&log)))
        .sounds(
            [("jump".to_owned(), "sfx/jump.wav".to_owned())]
                .into_iter()
                .collect(),
        )
        .rule(Rule::on::<Hit, _>("jump_sound", |_, ctx| {
            ctx.audio().play("jump", false);
            Ok(())
        }));
    let mut ark = running(blueprint);
    ark.emit(Hit);
    assert_eq!(*log.borrow(), vec!["jump".to_owned(), "play:jump".to_owned()]);
}

#[test]
fn renderer_sees_only_renderable_kinds() {
    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Sprite(String);

    struct Capture(Rc<RefCell<Option<Canvas>>>);
    impl Renderer for Capture {
        fn render(&mut self, canvas: &Canvas, _display: &DisplayContext) {
            *self.0.borrow_mut() = Some(canvas.clone());
        }
    }

    let last = Rc::new(RefCell::new(None));
    let blueprint = Blueprint::new()
        .renderable::<Sprite>("sprite")
        .renderer(Capture(Rc::clone(&last)))
        .setup(|world, _| {
            world.spawn_bundle(
                ComponentBundle::new()
                    .with(Sprite("hero".into()))
                    .with(Position { x: 1.0, y: 2.0 }),
            )?;
            Ok(())
        });
    let mut ark = running(blueprint);
    ark.tick(0.1).unwrap();

    let canvas = last.borrow().clone().unwrap();
    assert_eq!(canvas.len(), 1);
    let (_, drawn) = canvas.entities.iter().next().unwrap();
    assert_eq!(drawn.keys().collect::<Vec<_>>(), vec!["sprite"]);
}

#[test]
fn physics_bodies_move_and_collide_through_the_orchestrator() {
    let hits = Rc::new(Cell::new(0u32));
    let counter = Rc::clone(&hits);
    let blueprint = Blueprint::new()
        .physics(RapierPhysics::default())
        .setup(|world, _| {
            world.spawn_bundle(
                ComponentBundle::new()
                    .with(PhysicsBody {
                        body_type: PhysicsBodyType::Dynamic,
                        collider: ColliderShape::Circle { radius: 0.5 },
                        restitution: 1.0,
                        is_sensor: false,
                    })
                    .with(Position { x: 0.0, y: 0.0 })
                    .with(Velocity { dx: 100.0, dy: 0.0 }),
            )?;
            world.spawn_bundle(
                ComponentBundle::new()
                    .with(PhysicsBody {
                        body_type: PhysicsBodyType::Static,
                        collider: ColliderShape::Box {
                            half_width: 0.5,
                            half_height: 10.0,
                        },
                        restitution: 1.0,
                        is_sensor: false,
                    })
                    .with(Position { x: 2.0, y: 0.0 }),
            )?;
            Ok(())
        })
        .rule(Rule::on::<Collision, _>("count_hits", move |_, _| {
            counter.set(counter.get() + 1);
            Ok(())
        }));
    let mut ark = running(blueprint);
    for _ in 0..120 {
        ark.tick(1.0 / 60.0);
    }
    assert!(hits.get() > 0);
}
