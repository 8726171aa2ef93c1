//! The policy collaborator interface ("the brain").
//!
//! The engine calls the policy synchronously once per fish per tick. Senses
//! are a read-only snapshot taken after integration and field updates;
//! actions written here are applied immediately afterwards.

use crate::store::FishId;

/// Sensor vector length (`I`).
pub const SENSOR_COUNT: usize = 7;
/// Action vector length (`O`): turn, thrust, eat command.
pub const ACTION_COUNT: usize = 3;

/// Sensor layout indices.
pub mod sensor {
    pub const TARGET_X: usize = 0;
    pub const TARGET_Y: usize = 1;
    pub const OXYGEN: usize = 2;
    /// Normalised target distance; 1.0 means none detected.
    pub const TARGET_DIST: usize = 3;
    pub const THREAT_X: usize = 4;
    pub const THREAT_Y: usize = 5;
    /// `other.danger_level - self.danger_level`, zero if no detection.
    pub const THREAT_DANGER: usize = 6;
}

/// `(turn, thrust, eat_cmd)`; turn in `[-1, 1]`, thrust in `[0, 1]`,
/// `eat_cmd > 0.5` switches the fish into eating mode for the tick.
pub type FishActions = [f32; ACTION_COUNT];

/// Read-only per-fish view handed to the policy.
#[derive(Debug, Clone, Copy)]
pub struct FishSenses<'a> {
    pub id: FishId,
    pub fish_type: usize,
    pub sensors: &'a [f32; SENSOR_COUNT],
    /// Reward accumulated since the previous policy call.
    pub last_reward: f32,
    /// Actions applied on the previous tick.
    pub last_actions: FishActions,
    pub age: u32,
}

/// External control policy evaluated once per fish per tick.
pub trait FishPolicy {
    fn act(&mut self, view: FishSenses<'_>) -> FishActions;
}

/// Policy that never moves; useful as a baseline and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdlePolicy;

impl FishPolicy for IdlePolicy {
    fn act(&mut self, _view: FishSenses<'_>) -> FishActions {
        [0.0; ACTION_COUNT]
    }
}

/// Replays whatever the host last wrote with
/// [`crate::World::set_fish_actions`]; lets an external loop drive fish
/// imperatively instead of through a closure.
#[derive(Debug, Clone, Copy, Default)]
pub struct HoldActions;

impl FishPolicy for HoldActions {
    fn act(&mut self, view: FishSenses<'_>) -> FishActions {
        view.last_actions
    }
}

impl<F> FishPolicy for F
where
    F: FnMut(FishSenses<'_>) -> FishActions,
{
    fn act(&mut self, view: FishSenses<'_>) -> FishActions {
        self(view)
    }
}
