//! The default camera.
//!
//! A [`Camera`] is an ordinary component, so it is snapshotted and synced
//! with the rest of the world. [`CameraSystem`] keeps one in existence and
//! moves it onto the entity tagged [`CameraTarget`], if any.

use ark_ecs::entity::EntityId;
use ark_ecs::world::World;
use ark_ecs::EcsError;
use serde::{Deserialize, Serialize};

use crate::context::{ActionContext, DisplayContext};
use crate::physics::Position;
use crate::system::System;

/// Registered component name for [`Camera`].
pub const CAMERA_COMPONENT: &str = "camera";
/// Registered component name for [`CameraTarget`].
pub const CAMERA_TARGET_COMPONENT: &str = "camera_target";

/// Where the view is centred, in canvas units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub center_x: f64,
    pub center_y: f64,
    pub zoom: f64,
}

impl Camera {
    /// A camera centred on the canvas at zoom 1.
    pub fn centered(display: &DisplayContext) -> Self {
        let (width, height) = display.canvas_size();
        Self {
            center_x: width / 2.0,
            center_y: height / 2.0,
            zoom: 1.0,
        }
    }
}

/// Marks the entity the camera follows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraTarget;

/// Make sure a camera exists, spawning a centred one if none does.
///
/// Returns the camera entity (the lowest id if there are several).
pub fn align_camera(world: &mut World, display: &DisplayContext) -> Result<EntityId, EcsError> {
    if let Some(existing) = world.entities_with::<(&Camera,)>().first() {
        return Ok(*existing);
    }
    let camera = world.spawn_with(Camera::centered(display))?;
    tracing::debug!(entity = %camera, "spawned default camera");
    Ok(camera)
}

/// Keeps a camera alive and centred on the [`CameraTarget`].
#[derive(Debug, Default)]
pub struct CameraSystem;

impl System for CameraSystem {
    fn name(&self) -> &str {
        "camera"
    }

    fn run(&self, _dt: f64, ctx: &mut ActionContext<'_>) -> anyhow::Result<()> {
        let display = ctx.display().clone();
        let world = ctx.world_mut();
        let camera = align_camera(world, &display)?;

        let target = world
            .query::<(&CameraTarget, &Position)>()
            .map(|(_, (_, position))| *position)
            .next();
        if let (Some(target), Some(cam)) = (target, world.get_component_mut::<Camera>(camera)) {
            cam.center_x = target.x;
            cam.center_y = target.y;
        }
        Ok(())
    }
}
