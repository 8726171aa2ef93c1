//! Counters and per-tick summaries for telemetry collaborators.

use serde::{Deserialize, Serialize};

use crate::world::Tick;

/// Monotone ecosystem counters since world creation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EcosystemTotals {
    pub nutrition_added: f64,
    pub nutrition_depleted: f64,
    /// Nutrition moved into fish stomachs (plants and corpses).
    pub fish_consumed: f64,
    /// Nutrition returned to the field by defecation.
    pub fish_defecated: f64,
    pub kills: u64,
    pub deaths_from_age: u64,
    pub corpses_created: u64,
    pub corpses_eaten: u64,
    /// Fish born through reproduction.
    pub births: u64,
    pub growth_events: u64,
    pub bleach_events: u64,
}

impl EcosystemTotals {
    /// Net nutrition flux through the fleet; negative while fish hoard.
    #[must_use]
    pub fn environmental_balance(&self) -> f64 {
        self.fish_defecated - self.fish_consumed
    }
}

/// What happened during one `World::step` call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TickEvents {
    pub tick: Tick,
    pub grid_rebuilt: bool,
    pub growth_events: u32,
    pub births: u32,
    pub deaths: u32,
    pub kills: u32,
    pub defecations: u32,
    pub corpses_decayed: u32,
    pub bleach_events: u32,
}

/// Census snapshot pushed to the history ring every tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TickSummary {
    pub tick: Tick,
    pub plant_nodes: usize,
    pub fish_count: usize,
    pub predator_count: usize,
    pub corpse_count: usize,
    pub chain_count: usize,
    pub births: u32,
    pub deaths: u32,
    pub mean_reward: f32,
}
