//! Frame-list animation.
//!
//! An [`Animation`] component names the frames of a clip (sprite ids the
//! external renderer understands) and how long each is shown. Playback state
//! lives in the component, so an animation resumes exactly where a snapshot
//! left it. [`AnimationSystem`] advances every clip by the tick delta.

use serde::{Deserialize, Serialize};

use crate::context::ActionContext;
use crate::system::System;

/// Registered component name for [`Animation`].
pub const ANIMATION_COMPONENT: &str = "animation";

/// A clip being played on an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Animation {
    /// Frame ids in playback order.
    pub frames: Vec<String>,
    /// Seconds each frame is shown. Non-positive durations freeze the clip.
    pub frame_duration: f64,
    /// Time accumulated within the current frame.
    pub elapsed: f64,
    /// Index into `frames`.
    pub current: usize,
    /// Wrap to the first frame after the last one.
    pub looping: bool,
    /// Set when a non-looping clip runs past its last frame.
    pub finished: bool,
}

impl Animation {
    pub fn new<I, S>(frames: I, frame_duration: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            frames: frames.into_iter().map(Into::into).collect(),
            frame_duration,
            elapsed: 0.0,
            current: 0,
            looping: false,
            finished: false,
        }
    }

    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    /// The frame currently shown, if the clip has any.
    pub fn current_frame(&self) -> Option<&str> {
        self.frames.get(self.current).map(String::as_str)
    }

    /// Advance playback by `dt` seconds.
    pub fn advance(&mut self, dt: f64) {
        let len = self.frames.len();
        if self.finished || len == 0 || !(self.frame_duration > 0.0) {
            return;
        }

        self.elapsed += dt;
        let steps = (self.elapsed / self.frame_duration).floor();
        if steps < 1.0 {
            return;
        }
        self.elapsed -= steps * self.frame_duration;
        // Float-to-int `as` saturates.
        let steps = steps as usize;

        if self.looping {
            self.current = (self.current + steps % len) % len;
            return;
        }
        let target = self.current.saturating_add(steps);
        if target >= len {
            self.current = len - 1;
            self.elapsed = 0.0;
            self.finished = true;
        } else {
            self.current = target;
        }
    }
}

/// Advances every [`Animation`] by the tick delta.
#[derive(Debug, Default)]
pub struct AnimationSystem;

impl System for AnimationSystem {
    fn name(&self) -> &str {
        "animation"
    }

    fn run(&self, dt: f64, ctx: &mut ActionContext<'_>) -> anyhow::Result<()> {
        for (_, animation) in ctx.world_mut().iter_mut::<Animation>() {
            animation.advance(dt);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{DisplayContext, SilentAudio};
    use crate::event::EventBus;
    use ark_ecs::world::World;

    fn walk() -> Animation {
        Animation::new(["walk_0", "walk_1", "walk_2"], 0.25)
    }

    #[test]
    fn frames_advance_by_duration() {
        let mut anim = walk();
        anim.advance(0.125);
        assert_eq!(anim.current_frame(), Some("walk_0"));
        anim.advance(0.125);
        assert_eq!(anim.current_frame(), Some("walk_1"));
        anim.advance(0.25);
        assert_eq!(anim.current_frame(), Some("walk_2"));
        assert!(!anim.finished);
    }

    #[test]
    fn looping_clip_wraps() {
        let mut anim = walk().looping();
        anim.advance(0.75);
        assert_eq!(anim.current, 0);
        anim.advance(1.0);
        assert_eq!(anim.current, 1);
        assert!(!anim.finished);
    }

    #[test]
    fn one_shot_clip_stops_on_last_frame() {
        let mut anim = walk();
        anim.advance(0.75);
        assert_eq!(anim.current_frame(), Some("walk_2"));
        assert!(anim.finished);
        anim.advance(10.0);
        assert_eq!(anim.current_frame(), Some("walk_2"));
    }

    #[test]
    fn degenerate_clips_do_not_move() {
        let mut empty = Animation::new(Vec::<String>::new(), 0.1);
        empty.advance(1.0);
        assert_eq!(empty.current_frame(), None);

        let mut frozen = Animation::new(["a", "b"], 0.0);
        frozen.advance(1.0);
        assert_eq!(frozen.current, 0);
        assert_eq!(frozen.elapsed, 0.0);
    }

    #[test]
    fn tiny_duration_with_large_delta_is_bounded() {
        let mut anim = Animation::new(["a", "b", "c"], 1e-12).looping();
        anim.advance(0.25);
        assert!(anim.current < 3);
    }

    #[test]
    fn system_advances_every_animation() {
        let mut world = World::new();
        world.register_component::<Animation>(ANIMATION_COMPONENT);
        let a = world.spawn_with(walk()).unwrap();
        let b = world.spawn_with(walk().looping()).unwrap();

        let bus = EventBus::new();
        let mut display = DisplayContext::new((1.0, 1.0), (1.0, 1.0));
        let mut audio = SilentAudio::default();
        let mut ctx = ActionContext::new(&mut world, &bus, &mut display, &mut audio, None, 0.0);
        AnimationSystem.run(0.25, &mut ctx).unwrap();

        assert_eq!(world.get_component::<Animation>(a).unwrap().current, 1);
        assert_eq!(world.get_component::<Animation>(b).unwrap().current, 1);
    }
}
