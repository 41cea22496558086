//! Simulation time kept in components.
//!
//! Elapsed time lives in [`StopWatch`] components rather than in a system,
//! so it is captured by snapshots and replaced by multiplayer sync like any
//! other state.

use serde::{Deserialize, Serialize};

use crate::context::ActionContext;
use crate::system::System;

/// Name of the stopwatch on the default world-clock entity.
pub const WORLD_TIME: &str = "world_time";

/// Registered component name for [`StopWatch`].
pub const STOP_WATCH_COMPONENT: &str = "stop_watch";

/// Accumulated simulation seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopWatch {
    pub name: String,
    pub elapsed: f64,
}

impl StopWatch {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            elapsed: 0.0,
        }
    }
}

/// Adds each tick's delta to every [`StopWatch`].
#[derive(Debug, Default)]
pub struct TimeSystem;

impl System for TimeSystem {
    fn name(&self) -> &str {
        "time"
    }

    fn run(&self, dt: f64, ctx: &mut ActionContext<'_>) -> anyhow::Result<()> {
        for (_, watch) in ctx.world_mut().iter_mut::<StopWatch>() {
            watch.elapsed += dt;
        }
        Ok(())
    }
}
