//! Full-state multiplayer sync hooks.
//!
//! A host captures a [`SyncSnapshot`] between ticks and hands it to an
//! external transport; a participant applies it with
//! [`Orchestrator::apply_sync`]. The snapshot carries a BLAKE3 digest of its
//! canonical JSON encoding so corruption in transit is caught before the
//! participant's world is touched. Wire framing is the transport's business.
//!
//! # Usage
//!
//! ```
//! use ark_engine::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Score(u32);
//!
//! let host_blueprint = Blueprint::new()
//!     .role(SyncRole::Host)
//!     .component::<Score>("score")
//!     .setup(|world, _| {
//!         world.spawn_with(Score(7))?;
//!         Ok(())
//!     });
//! let mut host = Orchestrator::from_blueprint(host_blueprint, World::new()).unwrap();
//! host.start();
//! host.tick(1.0 / 60.0);
//! let snapshot = host.capture_sync().unwrap();
//!
//! let participant_blueprint = Blueprint::new()
//!     .role(SyncRole::Participant)
//!     .component::<Score>("score");
//! let mut participant =
//!     Orchestrator::from_blueprint(participant_blueprint, World::new()).unwrap();
//! participant.apply_sync(&snapshot).unwrap();
//!
//! let scores: Vec<u32> = participant
//!     .world()
//!     .query::<(&Score,)>()
//!     .map(|(_, (s,))| s.0)
//!     .collect();
//! assert_eq!(scores, vec![7]);
//! assert_eq!(participant.world().entities(), host.world().entities());
//! ```

use ark_ecs::snapshot::WorldSnapshot;
use serde::{Deserialize, Serialize};

use crate::frame::Orchestrator;
use crate::EngineError;

/// Which side of a multiplayer session this orchestrator plays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncRole {
    /// Single player. Runs everything.
    #[default]
    Local,
    /// Authoritative. Runs everything and publishes snapshots.
    Host,
    /// Receives snapshots. Skips default entities, blueprint setup,
    /// systems and rules.
    Participant,
}

impl SyncRole {
    /// Whether this side simulates the game itself.
    pub fn simulates(self) -> bool {
        !matches!(self, SyncRole::Participant)
    }
}

/// An authoritative world state stamped with a content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    /// Host tick count at capture.
    pub tick: u64,
    pub world: WorldSnapshot,
    /// BLAKE3 hex digest (64 lowercase hex chars) of `tick` and `world`.
    pub hash: String,
}

fn compute_hash(tick: u64, world: &WorldSnapshot) -> Result<String, EngineError> {
    #[derive(Serialize)]
    struct HashableState<'a> {
        tick: u64,
        world: &'a WorldSnapshot,
    }

    let bytes = serde_json::to_vec(&HashableState { tick, world })?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

impl SyncSnapshot {
    /// Stamp a world snapshot with its hash.
    pub fn new(tick: u64, world: WorldSnapshot) -> Result<Self, EngineError> {
        let hash = compute_hash(tick, &world)?;
        Ok(Self { tick, world, hash })
    }

    /// Recompute the hash and compare it with the recorded one.
    ///
    /// # Errors
    ///
    /// [`EngineError::SnapshotHashMismatch`] if the contents were altered.
    pub fn verify(&self) -> Result<(), EngineError> {
        let recomputed = compute_hash(self.tick, &self.world)?;
        if recomputed != self.hash {
            return Err(EngineError::SnapshotHashMismatch {
                recorded: self.hash.clone(),
                recomputed,
            });
        }
        Ok(())
    }
}

impl Orchestrator {
    /// Capture the current world for participants.
    pub fn capture_sync(&self) -> Result<SyncSnapshot, EngineError> {
        SyncSnapshot::new(self.tick_count(), self.world().capture_snapshot())
    }

    /// Replace the whole world with an authoritative snapshot.
    ///
    /// Takes `&mut self`, so it can only run between ticks. The hash is
    /// checked and every component decoded before anything changes; on
    /// error the world is left as it was.
    pub fn apply_sync(&mut self, snapshot: &SyncSnapshot) -> Result<(), EngineError> {
        snapshot.verify()?;
        self.world_mut().replace_with(&snapshot.world)?;
        tracing::debug!(
            tick = snapshot.tick,
            entities = snapshot.world.entities.len(),
            "applied sync snapshot"
        );
        Ok(())
    }
}
