//! World configuration and the plant/fish species catalogues.

use rand::{rngs::SmallRng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::world::WorldError;

/// Tunables for one [`crate::World`]. Field units are world units and ticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReefConfig {
    /// World rectangle width, centred on the origin.
    pub world_width: f32,
    /// World rectangle height, centred on the origin.
    pub world_height: f32,
    /// Spatial hash cell edge (`G`), independent of the field cell edge.
    pub hash_cell_size: f32,
    /// Per-cell occupancy cap in the spatial hash.
    pub hash_max_per_cell: usize,
    /// Ticks between spatial hash rebuilds, clamped to `1..=10`.
    pub hash_rebuild_interval: u64,
    /// Scalar field cell edge (`g`).
    pub field_cell_size: f32,
    /// Rest length of repulsion and chain springs.
    pub optimal_distance: f32,
    /// Pairwise repulsion gain.
    pub repulsion_strength: f32,
    /// Chain spring gain.
    pub chain_strength: f32,
    /// Per-tick velocity multiplier, in `(0, 1]`.
    pub water_drag: f32,
    /// Upper bound on nutrition cells.
    pub nutrition_cap: f32,
    /// Per-tick regeneration added to depleted nutrition cells.
    pub nutrition_regen: f32,
    /// Per-tick multiplicative oxygen decay, slightly below 1.
    pub oxygen_decay: f32,
    /// Initial open-water oxygen level.
    pub oxygen_ambient: f32,
    /// Global scale on per-plant oxygen deposits.
    pub oxygen_production_rate: f32,
    /// Global water temperature, clamped to `[0, 3]`.
    pub temperature: f32,
    /// Ticks a defecation-seeded plant stays invisible and inedible.
    pub seed_immunity_ticks: u32,
    /// Ticks before a corpse node vanishes.
    pub corpse_decay_ticks: u32,
    /// Cadence of per-fish age-death rolls, offset by birth tick.
    pub death_check_interval: u64,
    /// Stomach level required before defecation may trigger.
    pub defecation_threshold: f32,
    /// Per-tick defecation probability once over the threshold.
    pub defecation_probability: f32,
    /// Probability a defecation also drops a seed-immune plant.
    pub seeding_probability: f32,
    /// Defecations (herbivores) or kills (predators) needed to reproduce.
    pub reproduction_trigger: u32,
    /// Distance offspring spawn from the parent.
    pub reproduction_distance: f32,
    pub herbivore_reproduction_reward: f32,
    pub predator_reproduction_reward: f32,
    /// Reward granted to a predator per successful kill.
    pub kill_reward: f32,
    pub max_nodes: usize,
    pub max_chains: usize,
    pub max_fish: usize,
    /// Ring capacity of the per-tick summary history.
    pub history_capacity: usize,
    /// Seed for the single world RNG; `None` draws from the OS.
    pub rng_seed: Option<u64>,
}

impl Default for ReefConfig {
    fn default() -> Self {
        Self {
            world_width: 15_000.0,
            world_height: 15_000.0,
            hash_cell_size: 40.0,
            hash_max_per_cell: 200,
            hash_rebuild_interval: 5,
            field_cell_size: 30.0,
            optimal_distance: 50.0,
            repulsion_strength: 0.05,
            chain_strength: 0.05,
            water_drag: 0.95,
            nutrition_cap: 3.0,
            nutrition_regen: 0.0002,
            oxygen_decay: 0.9992,
            oxygen_ambient: 0.3,
            oxygen_production_rate: 0.01,
            temperature: 0.0,
            seed_immunity_ticks: 60,
            corpse_decay_ticks: 600,
            death_check_interval: 30,
            defecation_threshold: 0.7,
            defecation_probability: 0.01,
            seeding_probability: 0.25,
            reproduction_trigger: 3,
            reproduction_distance: 120.0,
            herbivore_reproduction_reward: 150.0,
            predator_reproduction_reward: 200.0,
            kill_reward: 40.0,
            max_nodes: 100_000,
            max_chains: 100_000,
            max_fish: 2_000,
            history_capacity: 256,
            rng_seed: None,
        }
    }
}

impl ReefConfig {
    /// World rectangle as `(xmin, ymin, xmax, ymax)`.
    #[must_use]
    pub fn world_bounds(&self) -> (f32, f32, f32, f32) {
        let hw = self.world_width * 0.5;
        let hh = self.world_height * 0.5;
        (-hw, -hh, hw, hh)
    }

    /// Check hard requirements and clamp soft ones, warning on each clamp.
    pub fn validated(mut self) -> Result<Self, WorldError> {
        if !(self.world_width > 0.0 && self.world_height > 0.0) {
            return Err(WorldError::InvalidConfig("world dimensions must be positive"));
        }
        if !(self.hash_cell_size > 0.0) {
            return Err(WorldError::InvalidConfig("hash_cell_size must be positive"));
        }
        if !(self.field_cell_size > 0.0) {
            return Err(WorldError::InvalidConfig("field_cell_size must be positive"));
        }
        if self.hash_max_per_cell == 0 {
            return Err(WorldError::InvalidConfig("hash_max_per_cell must be at least 1"));
        }
        if self.max_nodes == 0 || self.max_fish == 0 || self.max_chains == 0 {
            return Err(WorldError::InvalidConfig("entity capacities must be at least 1"));
        }
        if !(self.water_drag > 0.0 && self.water_drag <= 1.0) {
            return Err(WorldError::InvalidConfig("water_drag must lie in (0, 1]"));
        }
        if !(self.hash_rebuild_interval >= 1 && self.hash_rebuild_interval <= 10) {
            warn!(
                value = self.hash_rebuild_interval,
                "hash_rebuild_interval clamped into 1..=10"
            );
            self.hash_rebuild_interval = self.hash_rebuild_interval.clamp(1, 10);
        }
        if self.death_check_interval == 0 {
            warn!("death_check_interval raised to 1");
            self.death_check_interval = 1;
        }
        self.temperature = clamp_warn(self.temperature, 0.0, 3.0, "temperature");
        self.defecation_probability =
            clamp_warn(self.defecation_probability, 0.0, 1.0, "defecation_probability");
        self.seeding_probability =
            clamp_warn(self.seeding_probability, 0.0, 1.0, "seeding_probability");
        if !(self.nutrition_cap > 0.0) {
            warn!(value = self.nutrition_cap, "nutrition_cap raised to 1.0");
            self.nutrition_cap = 1.0;
        }
        Ok(self)
    }

    pub(crate) fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        }
    }
}

/// Immutable descriptor of one plant species.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantType {
    pub name: String,
    /// Base per-event branching probability before nutrition modulation.
    pub growth_probability: f32,
    /// Base number of placement attempts per accepted growth event.
    pub growth_attempts: u32,
    pub max_branches: u32,
    /// Distance between parent and child node.
    pub branch_distance: f32,
    /// Impulse multiplier for nodes of this type; low values anchor plants.
    pub mobility_factor: f32,
    /// Age in ticks beyond which a node stops branching.
    pub age_mature: u32,
    pub depletion_strength: f32,
    pub depletion_radius: f32,
    pub oxygen_production_factor: f32,
    pub oxygen_production_radius: f32,
    /// Eligible for temperature bleaching.
    pub is_coral: bool,
    pub node_color: [u8; 3],
    pub chain_color: [u8; 3],
}

impl Default for PlantType {
    fn default() -> Self {
        Self {
            name: "kelp".to_owned(),
            growth_probability: 0.02,
            growth_attempts: 5,
            max_branches: 3,
            branch_distance: 50.0,
            mobility_factor: 1.0,
            age_mature: 1800,
            depletion_strength: 0.08,
            depletion_radius: 120.0,
            oxygen_production_factor: 0.2,
            oxygen_production_radius: 80.0,
            is_coral: false,
            node_color: [40, 160, 60],
            chain_color: [30, 120, 45],
        }
    }
}

impl PlantType {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    pub(crate) fn sanitize(&mut self) {
        self.growth_probability = clamp_warn(self.growth_probability, 0.0, 1.0, "growth_probability");
        self.mobility_factor = clamp_warn(self.mobility_factor, 0.1, 3.0, "mobility_factor");
        self.oxygen_production_factor =
            clamp_warn(self.oxygen_production_factor, 0.1, 3.0, "oxygen_production_factor");
        if self.growth_attempts == 0 {
            warn!(plant = %self.name, "growth_attempts raised to 1");
            self.growth_attempts = 1;
        }
        if !(self.branch_distance > 0.0) {
            warn!(plant = %self.name, "branch_distance raised to 1.0");
            self.branch_distance = 1.0;
        }
        if self.depletion_strength < 0.0 {
            warn!(plant = %self.name, "negative depletion_strength clamped to 0");
            self.depletion_strength = 0.0;
        }
    }
}

/// Immutable descriptor of one fish species.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FishType {
    pub name: String,
    pub is_predator: bool,
    /// Relative threat scalar in `[0, 1]`; predation requires a gap.
    pub danger_level: f32,
    pub max_speed: f32,
    pub max_force: f32,
    /// Maximum heading change per tick, degrees.
    pub max_turn_deg: f32,
    pub eating_range: f32,
    /// Ticks between predator kills.
    pub eat_cooldown: u32,
    /// Reward added on a failed eat attempt (negative).
    pub eat_punishment: f32,
    /// Radius of the nutrition deposit on defecation.
    pub defecation_radius: f32,
    pub fov_angle_deg: f32,
    /// Target search range for herbivores.
    pub fov_range: f32,
    /// Target search range for predators.
    pub detection_range: f32,
    pub oxygen_consumption_rate: f32,
    pub oxygen_refill_rate: f32,
    pub flow_sensitivity: f32,
    pub max_age: u32,
    /// Stomach value a predator gains from this species' corpse.
    pub corpse_nutrition: f32,
    pub node_color: [u8; 3],
}

impl Default for FishType {
    fn default() -> Self {
        Self {
            name: "grazer".to_owned(),
            is_predator: false,
            danger_level: 0.1,
            max_speed: 8.0,
            max_force: 1.0,
            max_turn_deg: 30.0,
            eating_range: 80.0,
            eat_cooldown: 30,
            eat_punishment: -0.005,
            defecation_radius: 60.0,
            fov_angle_deg: 180.0,
            fov_range: 1200.0,
            detection_range: 800.0,
            oxygen_consumption_rate: 0.0004,
            oxygen_refill_rate: 0.003,
            flow_sensitivity: 0.3,
            max_age: 36_000,
            corpse_nutrition: 0.5,
            node_color: [200, 180, 60],
        }
    }
}

impl FishType {
    pub fn herbivore(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    pub fn predator(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            is_predator: true,
            danger_level: 0.7,
            eating_range: 60.0,
            corpse_nutrition: 0.8,
            node_color: [220, 70, 50],
            ..Self::default()
        }
    }

    pub(crate) fn sanitize(&mut self) {
        if self.max_speed < 0.0 {
            warn!(fish = %self.name, "negative max_speed clamped to 0");
            self.max_speed = 0.0;
        }
        if self.max_force < 0.0 {
            warn!(fish = %self.name, "negative max_force clamped to 0");
            self.max_force = 0.0;
        }
        if !(self.fov_angle_deg > 0.0 && self.fov_angle_deg <= 360.0) {
            warn!(fish = %self.name, value = self.fov_angle_deg, "fov_angle clamped into (0, 360]");
            self.fov_angle_deg = self.fov_angle_deg.clamp(f32::EPSILON, 360.0);
        }
        if self.max_age == 0 {
            warn!(fish = %self.name, "max_age raised to 1");
            self.max_age = 1;
        }
        self.danger_level = clamp_warn(self.danger_level, 0.0, 1.0, "danger_level");
        self.flow_sensitivity = clamp_warn(self.flow_sensitivity, 0.1, 3.0, "flow_sensitivity");
    }

    pub(crate) fn fov_half_angle(&self) -> f32 {
        (self.fov_angle_deg * 0.5).to_radians()
    }
}

fn clamp_warn(value: f32, min: f32, max: f32, what: &'static str) -> f32 {
    if value < min || value > max || value.is_nan() {
        let clamped = if value.is_nan() { min } else { value.clamp(min, max) };
        warn!(field = what, value, clamped, "configuration value clamped");
        clamped
    } else {
        value
    }
}
