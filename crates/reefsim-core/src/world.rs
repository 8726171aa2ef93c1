//! World state and the tick orchestrator.
//!
//! `World` owns the arenas, fields, hash, counters, and configuration; one
//! `step` call runs the fixed stage order and returns what happened. All
//! randomness flows through the single seeded RNG so equal seeds replay
//! tick for tick.

use std::collections::VecDeque;

use rand::{rngs::SmallRng, Rng};
use reefsim_index::{GridConfig, HashGrid, IndexError, NeighborhoodIndex};
use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{FishType, PlantType, ReefConfig};
use crate::fields::{
    bleaching_probability, FieldGeometry, FlowField, NutritionField, OxygenField,
};
use crate::fish::{
    self, CorpseBlip, FishBlip, PlantBlip, SenseSubject, SenseWorld,
};
use crate::physics;
use crate::plants::{growth_pass, GrowthArgs};
use crate::policy::{FishActions, FishPolicy, FishSenses, SENSOR_COUNT};
use crate::store::{
    Chain, ChainId, Fish, FishId, Node, NodeId, NodeKind,
};
use crate::store::{ChainArena, FishArena, NodeArena};
use crate::telemetry::{EcosystemTotals, TickEvents, TickSummary};

/// Monotone frame counter; the indivisible unit of simulated time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Tick(pub u64);

impl Tick {
    #[must_use]
    pub fn zero() -> Self {
        Self(0)
    }

    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Errors surfaced at world construction; nothing is fatal mid-tick.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// The whole simulation: entity arenas, scalar fields, spatial hash,
/// counters, RNG, and species catalogues.
pub struct World {
    config: ReefConfig,
    plant_types: Vec<PlantType>,
    fish_types: Vec<FishType>,
    tick: Tick,
    rng: SmallRng,
    nodes: NodeArena,
    chains: ChainArena,
    fish: FishArena,
    fish_by_node: SecondaryMap<NodeId, FishId>,
    grid: HashGrid<NodeId>,
    nutrition: NutritionField,
    oxygen: OxygenField,
    flow: FlowField,
    temperature: f32,
    ticks_since_rebuild: u64,
    totals: EcosystemTotals,
    history: VecDeque<TickSummary>,
    reproduction_pending: bool,
    parent_for_inheritance: Option<FishId>,
}

impl World {
    /// Build a world with procedurally generated nutrition and flow.
    pub fn new(
        config: ReefConfig,
        plant_types: Vec<PlantType>,
        fish_types: Vec<FishType>,
    ) -> Result<Self, WorldError> {
        let config = config.validated()?;
        let mut rng = config.seeded_rng();
        let geom = FieldGeometry::covering(config.world_bounds(), config.field_cell_size);
        let nutrition_seed: u64 = rng.random();
        let flow_seed: u64 = rng.random();
        let nutrition = NutritionField::generate(
            geom,
            config.nutrition_cap,
            config.nutrition_regen,
            nutrition_seed,
            &mut rng,
        );
        let flow = FlowField::generate(geom, flow_seed, &mut rng);
        Self::assemble(config, plant_types, fish_types, rng, nutrition, flow)
    }

    /// Build a world with a flat nutrition field and still water. Scenario
    /// and test harnesses use this for exact expectations.
    pub fn with_uniform_fields(
        config: ReefConfig,
        plant_types: Vec<PlantType>,
        fish_types: Vec<FishType>,
        nutrition_level: f32,
    ) -> Result<Self, WorldError> {
        let config = config.validated()?;
        let rng = config.seeded_rng();
        let geom = FieldGeometry::covering(config.world_bounds(), config.field_cell_size);
        let nutrition = NutritionField::uniform(
            geom,
            nutrition_level,
            config.nutrition_cap,
            config.nutrition_regen,
        );
        let flow = FlowField::still(geom);
        Self::assemble(config, plant_types, fish_types, rng, nutrition, flow)
    }

    fn assemble(
        config: ReefConfig,
        mut plant_types: Vec<PlantType>,
        mut fish_types: Vec<FishType>,
        rng: SmallRng,
        nutrition: NutritionField,
        flow: FlowField,
    ) -> Result<Self, WorldError> {
        for pt in &mut plant_types {
            pt.sanitize();
        }
        for ft in &mut fish_types {
            ft.sanitize();
        }
        let bounds = config.world_bounds();
        let geom = FieldGeometry::covering(bounds, config.field_cell_size);
        let grid = HashGrid::new(GridConfig {
            cell_size: config.hash_cell_size,
            min: (bounds.0, bounds.1),
            max: (bounds.2, bounds.3),
            max_per_cell: config.hash_max_per_cell,
        })?;
        let oxygen = OxygenField::new(geom, config.oxygen_ambient, config.oxygen_decay);
        let ticks_since_rebuild = config.hash_rebuild_interval;
        let temperature = config.temperature;
        Ok(Self {
            nodes: NodeArena::new(config.max_nodes),
            chains: ChainArena::new(config.max_chains),
            fish: FishArena::new(config.max_fish),
            fish_by_node: SecondaryMap::new(),
            grid,
            nutrition,
            oxygen,
            flow,
            temperature,
            ticks_since_rebuild,
            tick: Tick::zero(),
            rng,
            totals: EcosystemTotals::default(),
            history: VecDeque::with_capacity(config.history_capacity),
            reproduction_pending: false,
            parent_for_inheritance: None,
            plant_types,
            fish_types,
            config,
        })
    }

    // ----- spawning -------------------------------------------------------

    /// Place a growable plant, paying the standard depletion into the
    /// nutrition field. Returns `None` at capacity or for an unknown type.
    pub fn spawn_plant(&mut self, x: f32, y: f32, plant_type: usize) -> Option<NodeId> {
        let pt = match self.plant_types.get(plant_type) {
            Some(pt) => pt,
            None => {
                warn!(plant_type, "spawn_plant: unknown plant type");
                return None;
            }
        };
        let stored = pt.depletion_strength * (pt.max_branches as f32 / 3.0)
            * (pt.branch_distance / self.config.optimal_distance);
        let radius = pt.depletion_radius;
        let (x, y) = self.clamp_position(x, y);
        let id = self
            .nodes
            .alloc(Node::plant(x, y, plant_type, stored, true))?;
        self.grid.insert(id, x, y);
        self.nutrition.deplete(x, y, stored, radius);
        Some(id)
    }

    /// Place a plant with explicit stored nutrition, without touching the
    /// field. Editor and test hook.
    pub fn insert_plant_node(
        &mut self,
        x: f32,
        y: f32,
        plant_type: usize,
        stored_nutrition: f32,
    ) -> Option<NodeId> {
        if plant_type >= self.plant_types.len() {
            warn!(plant_type, "insert_plant_node: unknown plant type");
            return None;
        }
        let (x, y) = self.clamp_position(x, y);
        let id = self
            .nodes
            .alloc(Node::plant(x, y, plant_type, stored_nutrition, true))?;
        self.grid.insert(id, x, y);
        Some(id)
    }

    /// Place a fish with a random heading. Returns `None` at capacity or
    /// for an unknown type.
    pub fn spawn_fish(&mut self, x: f32, y: f32, fish_type: usize) -> Option<FishId> {
        if fish_type >= self.fish_types.len() {
            warn!(fish_type, "spawn_fish: unknown fish type");
            return None;
        }
        self.spawn_fish_internal(x, y, fish_type)
    }

    fn spawn_fish_internal(&mut self, x: f32, y: f32, fish_type: usize) -> Option<FishId> {
        let (x, y) = self.clamp_position(x, y);
        let node = self.nodes.alloc(Node::fish_marker(x, y))?;
        let heading = self.rng.random_range(0.0..std::f32::consts::TAU);
        let Some(id) = self
            .fish
            .alloc(Fish::spawn(node, fish_type, heading, self.tick.0))
        else {
            self.nodes.free(node);
            return None;
        };
        self.fish_by_node.insert(node, id);
        self.grid.insert(node, x, y);
        Some(id)
    }

    /// Link two plant nodes with a chain. Rejects self-links, missing or
    /// non-plant endpoints; the chain inherits the first endpoint's type.
    pub fn connect_chain(&mut self, a: NodeId, b: NodeId) -> Option<ChainId> {
        if a == b {
            return None;
        }
        let plant_type = self.nodes.get(a).and_then(Node::plant_type)?;
        self.nodes.get(b).and_then(Node::plant_type)?;
        self.chains.alloc(Chain {
            a,
            b,
            plant_type,
            age: 0,
            curve_strength: (self.rng.random::<f32>() - 0.5) * 0.6,
            curve_offset: (self.rng.random::<f32>() - 0.5) * 20.0,
        })
    }

    fn clamp_position(&self, x: f32, y: f32) -> (f32, f32) {
        let (min_x, min_y, max_x, max_y) = self.config.world_bounds();
        (x.clamp(min_x, max_x), y.clamp(min_y, max_y))
    }

    // ----- tick orchestrator ---------------------------------------------

    /// Advance one tick under the given policy.
    pub fn step(&mut self, policy: &mut dyn FishPolicy) -> TickEvents {
        self.tick = self.tick.next();
        let mut events = TickEvents {
            tick: self.tick,
            ..TickEvents::default()
        };
        self.stage_immunity();
        events.bleach_events = self.stage_bleaching();
        events.grid_rebuilt = self.stage_index();
        self.stage_physics();
        self.stage_fields();
        events.growth_events = self.stage_growth();
        self.stage_fish(policy, &mut events);
        events.corpses_decayed = self.stage_corpses();
        self.stage_summary(&events);
        events
    }

    fn stage_immunity(&mut self) {
        for (_, node) in self.nodes.iter_mut() {
            if node.seed_immunity > 0 {
                node.seed_immunity -= 1;
            }
        }
    }

    /// At most one bleach event fires per tick; it may spread along chains
    /// to a few connected neighbours of the same coral type.
    fn stage_bleaching(&mut self) -> u32 {
        let base = bleaching_probability(self.temperature);
        if base <= 0.0 {
            return 0;
        }
        let corals: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, n)| {
                !n.bleached
                    && n.plant_type()
                        .and_then(|pt| self.plant_types.get(pt))
                        .is_some_and(|t| t.is_coral)
            })
            .map(|(id, _)| id)
            .collect();
        if corals.is_empty() {
            return 0;
        }
        let draws = (corals.len() / 20).clamp(1, 50);
        for _ in 0..draws {
            let id = corals[self.rng.random_range(0..corals.len())];
            let Some(node) = self.nodes.get(id) else { continue };
            let Some(pt_idx) = node.plant_type() else { continue };
            let mature = node.age > self.plant_types[pt_idx].age_mature;
            let probability = if mature { base * 1.5 } else { base };
            if self.rng.random::<f32>() >= probability {
                continue;
            }
            let mut affected = vec![id];
            for (_, chain) in self.chains.iter() {
                if affected.len() > 3 {
                    break;
                }
                let neighbour = if chain.a == id {
                    chain.b
                } else if chain.b == id {
                    chain.a
                } else {
                    continue;
                };
                if self
                    .nodes
                    .get(neighbour)
                    .is_some_and(|n| !n.bleached && n.plant_type() == Some(pt_idx))
                {
                    affected.push(neighbour);
                }
            }
            let count = affected.len() as u32;
            for node_id in affected {
                if let Some(n) = self.nodes.get_mut(node_id) {
                    n.bleached = true;
                }
            }
            debug!(tick = self.tick.0, count, "coral bleaching event");
            self.totals.bleach_events += u64::from(count);
            return count;
        }
        0
    }

    fn stage_index(&mut self) -> bool {
        self.ticks_since_rebuild += 1;
        if self.ticks_since_rebuild < self.config.hash_rebuild_interval {
            return false;
        }
        self.grid.clear();
        for (id, node) in self.nodes.iter() {
            self.grid.insert(id, node.x, node.y);
        }
        self.ticks_since_rebuild = 0;
        true
    }

    fn stage_physics(&mut self) {
        physics::accumulate_repulsion(
            &mut self.nodes,
            &self.grid,
            &self.plant_types,
            self.config.optimal_distance,
            self.config.repulsion_strength,
        );
        let mut retired = Vec::new();
        physics::apply_chain_springs(
            &mut self.nodes,
            &self.chains,
            &self.plant_types,
            self.config.optimal_distance,
            self.config.chain_strength,
            &mut retired,
        );
        for id in retired {
            self.chains.free(id);
        }
        for (_, fish) in self.fish.iter() {
            if fish.eating_mode {
                continue;
            }
            let sensitivity = self.fish_types[fish.fish_type].flow_sensitivity;
            if let Some(node) = self.nodes.get_mut(fish.node) {
                let (fx, fy) = self.flow.sample(node.x, node.y);
                node.vx += fx * sensitivity * 0.03;
                node.vy += fy * sensitivity * 0.03;
            }
        }
        let wall_hits = physics::integrate(
            &mut self.nodes,
            self.config.water_drag,
            self.config.world_bounds(),
        );
        for node_id in wall_hits {
            if let Some(&fish_id) = self.fish_by_node.get(node_id) {
                if let Some(f) = self.fish.get_mut(fish_id) {
                    f.heading = fish::wrap_angle(f.heading + std::f32::consts::PI);
                    f.pending_reward -= 0.01;
                }
            }
        }
        for (_, fish) in self.fish.iter() {
            let max_speed = self.fish_types[fish.fish_type].max_speed;
            if let Some(node) = self.nodes.get_mut(fish.node) {
                let speed_sq = node.vx * node.vx + node.vy * node.vy;
                if speed_sq > max_speed * max_speed {
                    let scale = max_speed / speed_sq.sqrt();
                    node.vx *= scale;
                    node.vy *= scale;
                }
            }
        }
        physics::age_entities(&mut self.nodes, &mut self.chains);
    }

    fn stage_fields(&mut self) {
        self.nutrition.regenerate();
        self.oxygen.step();
        let scale = self.config.oxygen_production_rate;
        for (_, node) in self.nodes.iter() {
            if let Some(pt_idx) = node.plant_type() {
                if let Some(pt) = self.plant_types.get(pt_idx) {
                    self.oxygen.deposit(
                        node.x,
                        node.y,
                        pt.oxygen_production_factor * scale,
                        pt.oxygen_production_radius,
                    );
                }
            }
        }
    }

    fn stage_growth(&mut self) -> u32 {
        let grown = growth_pass(GrowthArgs {
            nodes: &mut self.nodes,
            chains: &mut self.chains,
            grid: &mut self.grid,
            nutrition: &mut self.nutrition,
            plant_types: &self.plant_types,
            bounds: self.config.world_bounds(),
            optimal_distance: self.config.optimal_distance,
            rng: &mut self.rng,
        });
        self.totals.growth_events += u64::from(grown);
        grown
    }

    fn stage_fish(&mut self, policy: &mut dyn FishPolicy, events: &mut TickEvents) {
        // Immutable snapshot: senses must not observe this tick's actions.
        let mut plants = Vec::new();
        let mut corpses = Vec::new();
        for (_, node) in self.nodes.iter() {
            match node.kind {
                NodeKind::Plant { .. } if node.seed_immunity == 0 => {
                    plants.push(PlantBlip { x: node.x, y: node.y });
                }
                NodeKind::Corpse { .. } => {
                    corpses.push(CorpseBlip { x: node.x, y: node.y });
                }
                _ => {}
            }
        }
        let mut subjects = Vec::with_capacity(self.fish.len());
        let mut blips = Vec::with_capacity(self.fish.len());
        for (id, f) in self.fish.iter() {
            let Some(node) = self.nodes.get(f.node) else {
                continue;
            };
            let danger = self.fish_types[f.fish_type].danger_level;
            subjects.push(SenseSubject {
                id,
                x: node.x,
                y: node.y,
                heading: f.heading,
                fish_type: f.fish_type,
                danger,
            });
            blips.push(FishBlip {
                id,
                x: node.x,
                y: node.y,
                fish_type: f.fish_type,
                danger,
            });
        }
        let view = SenseWorld {
            plants: &plants,
            fish: &blips,
            corpses: &corpses,
        };
        let senses = fish::compute_senses(&subjects, &self.fish_types, &view, &self.oxygen);
        for (subject, sensors) in subjects.iter().zip(&senses) {
            if let Some(f) = self.fish.get_mut(subject.id) {
                f.sensors = *sensors;
            }
        }

        let order: Vec<FishId> = subjects.iter().map(|s| s.id).collect();
        let mut spawn_orders: Vec<(usize, f32, f32)> = Vec::new();
        for id in order {
            if !self.fish.contains(id) {
                continue; // killed earlier in this pass
            }
            let (ambient, vx, vy) = {
                let f = match self.fish.get(id) {
                    Some(f) => f,
                    None => continue,
                };
                match self.nodes.get(f.node) {
                    Some(n) => (self.oxygen.sample(n.x, n.y), n.vx, n.vy),
                    None => continue,
                }
            };
            let mut reward;
            let actions = {
                let Some(f) = self.fish.get_mut(id) else { continue };
                let ft = &self.fish_types[f.fish_type];
                fish::update_physiology(f, ambient, ft);
                reward = f.pending_reward
                    + fish::environment_reward(f.oxygen_level, f.hunger)
                    + fish::motion_reward(
                        &f.sensors,
                        f.actions[0],
                        vx,
                        vy,
                        ft.max_speed,
                        f.hunger,
                    );
                f.pending_reward = 0.0;
                let sensors = f.sensors;
                policy.act(FishSenses {
                    id,
                    fish_type: f.fish_type,
                    sensors: &sensors,
                    last_reward: f.last_reward,
                    last_actions: f.actions,
                    age: f.age,
                })
            };
            {
                let Some(f) = self.fish.get_mut(id) else { continue };
                let ft = &self.fish_types[f.fish_type];
                if let Some(node) = self.nodes.get_mut(f.node) {
                    fish::apply_actions(f, node, ft, actions);
                }
            }
            if self.fish.get(id).is_some_and(|f| f.eating_mode) {
                reward += self.attempt_eat(id, events);
            }
            reward += self.attempt_defecate(id, events);
            reward += self.attempt_reproduce(id, &mut spawn_orders);
            let died = self.attempt_age_death(id, events);
            if !died {
                if let Some(f) = self.fish.get_mut(id) {
                    f.last_reward = reward;
                    f.total_reward += reward;
                    f.age += 1;
                }
            }
        }
        for (fish_type, x, y) in spawn_orders {
            if self.spawn_fish_internal(x, y, fish_type).is_some() {
                events.births += 1;
                self.totals.births += 1;
            } else {
                debug!("reproduction skipped: fish capacity reached");
            }
        }
    }

    /// One eat attempt; returns the reward delta.
    fn attempt_eat(&mut self, id: FishId, events: &mut TickEvents) -> f32 {
        let Some(f) = self.fish.get(id) else { return 0.0 };
        let fish_type = f.fish_type;
        let hunger = f.hunger;
        let heading = f.heading;
        let cooldown_until = f.eat_cooldown_until;
        let Some(node) = self.nodes.get(f.node) else { return 0.0 };
        let (fx, fy) = (node.x, node.y);
        let ft = &self.fish_types[fish_type];
        let range = ft.eating_range;
        let range_sq = range * range;

        if ft.is_predator {
            if self.tick.0 < cooldown_until {
                return fish::eat_failure_penalty(ft, hunger);
            }
            let self_danger = ft.danger_level;
            let mut prey = None;
            for (other_id, other) in self.fish.iter() {
                if other_id == id || other.fish_type == fish_type {
                    continue;
                }
                if self.fish_types[other.fish_type].danger_level >= self_danger {
                    continue;
                }
                let Some(onode) = self.nodes.get(other.node) else {
                    continue;
                };
                let dx = onode.x - fx;
                let dy = onode.y - fy;
                if dx * dx + dy * dy <= range_sq {
                    prey = Some(other_id);
                    break; // slot order: lowest active slot wins
                }
            }
            if let Some(prey_id) = prey {
                if let Some(prey) = self.fish.free(prey_id) {
                    self.fish_by_node.remove(prey.node);
                    self.nodes.free(prey.node);
                }
                let cooldown = self.tick.0 + u64::from(ft.eat_cooldown);
                if let Some(f) = self.fish.get_mut(id) {
                    f.kill_count += 1;
                    f.eat_cooldown_until = cooldown;
                    f.hunger = (f.hunger - 0.4).max(0.0);
                }
                events.kills += 1;
                self.totals.kills += 1;
                return self.config.kill_reward;
            }
            // No living prey in range; fall back to scavenging.
            let nodes = &self.nodes;
            let mut best: Option<(NodeId, f32)> = None;
            self.grid.for_each_within(fx, fy, range_sq, &mut |nid, _| {
                let Some(n) = nodes.get(nid) else { return };
                if !n.is_corpse() {
                    return;
                }
                let dx = n.x - fx;
                let dy = n.y - fy;
                let d_sq = dx * dx + dy * dy;
                if d_sq <= range_sq && best.is_none_or(|(_, b)| d_sq < b) {
                    best = Some((nid, d_sq));
                }
            });
            if let Some((corpse_id, _)) = best {
                let Some(corpse) = self.nodes.free(corpse_id) else {
                    return fish::eat_failure_penalty(ft, hunger);
                };
                let gain = match corpse.kind {
                    NodeKind::Corpse { fish_type: ct, .. } => self
                        .fish_types
                        .get(ct)
                        .map_or(0.5, |t| t.corpse_nutrition),
                    _ => 0.0,
                };
                let cooldown = self.tick.0 + u64::from(ft.eat_cooldown);
                if let Some(f) = self.fish.get_mut(id) {
                    f.stomach += gain;
                    f.hunger = (f.hunger - 0.8 * gain).max(0.0);
                    f.eat_cooldown_until = cooldown;
                }
                self.totals.fish_consumed += f64::from(gain);
                self.totals.corpses_eaten += 1;
                return fish::plant_eat_reward(gain, hunger);
            }
            return fish::eat_failure_penalty(ft, hunger);
        }

        // Herbivore: nearest visible plant in the forward cone.
        let nodes = &self.nodes;
        let mut best: Option<(NodeId, f32)> = None;
        self.grid.for_each_within(fx, fy, range_sq, &mut |nid, _| {
            let Some(n) = nodes.get(nid) else { return };
            if !n.is_plant() || n.seed_immunity > 0 {
                return;
            }
            let dx = n.x - fx;
            let dy = n.y - fy;
            let d_sq = dx * dx + dy * dy;
            if d_sq > range_sq || !fish::in_forward_cone(heading, dx, dy) {
                return;
            }
            if best.is_none_or(|(_, b)| d_sq < b) {
                best = Some((nid, d_sq));
            }
        });
        if let Some((plant_id, _)) = best {
            let Some(plant) = self.nodes.free(plant_id) else {
                return fish::eat_failure_penalty(ft, hunger);
            };
            let stored = match plant.kind {
                NodeKind::Plant {
                    stored_nutrition, ..
                } => stored_nutrition,
                _ => 0.0,
            };
            if let Some(f) = self.fish.get_mut(id) {
                f.stomach += stored;
                f.hunger = (f.hunger - 0.8 * stored).max(0.0);
            }
            self.totals.fish_consumed += f64::from(stored);
            fish::plant_eat_reward(stored, hunger)
        } else {
            fish::eat_failure_penalty(ft, hunger)
        }
    }

    /// Possible defecation plus seed drop; returns the reward delta.
    fn attempt_defecate(&mut self, id: FishId, events: &mut TickEvents) -> f32 {
        let Some(f) = self.fish.get(id) else { return 0.0 };
        let ft = &self.fish_types[f.fish_type];
        if ft.is_predator || f.stomach < self.config.defecation_threshold {
            return 0.0;
        }
        if self.rng.random::<f32>() >= self.config.defecation_probability {
            return 0.0;
        }
        let Some(node) = self.nodes.get(f.node) else { return 0.0 };
        let (x, y) = (node.x, node.y);
        let heading = f.heading;
        let amount = f.stomach;
        let radius = ft.defecation_radius;
        self.nutrition.deposit(x, y, amount, radius);
        if let Some(f) = self.fish.get_mut(id) {
            f.stomach = 0.0;
            f.defecation_count += 1;
        }
        events.defecations += 1;
        self.totals.fish_defecated += f64::from(amount);
        if self.rng.random::<f32>() < self.config.seeding_probability
            && !self.plant_types.is_empty()
        {
            let back = heading + std::f32::consts::PI;
            let sx = x + back.cos() * 12.0 + self.rng.random_range(-5.0..5.0);
            let sy = y + back.sin() * 12.0 + self.rng.random_range(-5.0..5.0);
            let (sx, sy) = self.clamp_position(sx, sy);
            let plant_type = self.rng.random_range(0..self.plant_types.len());
            let pt = &self.plant_types[plant_type];
            let stored = pt.depletion_strength * (pt.max_branches as f32 / 3.0)
                * (pt.branch_distance / self.config.optimal_distance);
            if let Some(seed) = self
                .nodes
                .alloc(Node::plant(sx, sy, plant_type, stored, true))
            {
                if let Some(n) = self.nodes.get_mut(seed) {
                    n.seed_immunity = self.config.seed_immunity_ticks;
                }
                self.grid.insert(seed, sx, sy);
            }
        }
        amount * 0.5
    }

    /// Reproduction once the trigger count is reached; offspring are
    /// committed after the fish pass so they never act on their birth tick.
    fn attempt_reproduce(&mut self, id: FishId, spawn_orders: &mut Vec<(usize, f32, f32)>) -> f32 {
        let Some(f) = self.fish.get(id) else { return 0.0 };
        let ft = &self.fish_types[f.fish_type];
        let (count, reward) = if ft.is_predator {
            (f.kill_count, self.config.predator_reproduction_reward)
        } else {
            (f.defecation_count, self.config.herbivore_reproduction_reward)
        };
        if count < self.config.reproduction_trigger {
            return 0.0;
        }
        let Some(node) = self.nodes.get(f.node) else { return 0.0 };
        let (x, y) = (node.x, node.y);
        let fish_type = f.fish_type;
        if let Some(f) = self.fish.get_mut(id) {
            if ft.is_predator {
                f.kill_count = 0;
            } else {
                f.defecation_count = 0;
            }
        }
        let angle = self.rng.random_range(0.0..std::f32::consts::TAU);
        let cx = x + angle.cos() * self.config.reproduction_distance;
        let cy = y + angle.sin() * self.config.reproduction_distance;
        let (cx, cy) = self.clamp_position(cx, cy);
        spawn_orders.push((fish_type, cx, cy));
        self.reproduction_pending = true;
        self.parent_for_inheritance = Some(id);
        reward
    }

    /// Rolls age-death on the fish's personal cadence. Returns true if the
    /// fish died (and a corpse now stands at its last position).
    fn attempt_age_death(&mut self, id: FishId, events: &mut TickEvents) -> bool {
        let Some(f) = self.fish.get(id) else { return false };
        if (self.tick.0.saturating_sub(f.birth_tick)) % self.config.death_check_interval != 0 {
            return false;
        }
        let ft = &self.fish_types[f.fish_type];
        let probability = fish::death_probability(f.age, ft.max_age);
        if probability <= 0.0 || self.rng.random::<f32>() >= probability {
            return false;
        }
        let Some(f) = self.fish.free(id) else { return false };
        self.fish_by_node.remove(f.node);
        let Some(marker) = self.nodes.free(f.node) else {
            return true;
        };
        let corpse = Node::corpse(
            marker.x,
            marker.y,
            f.fish_type,
            self.config.corpse_decay_ticks,
            f.heading,
        );
        if let Some(corpse_id) = self.nodes.alloc(corpse) {
            self.grid.insert(corpse_id, marker.x, marker.y);
            self.totals.corpses_created += 1;
        } else {
            debug!("corpse skipped: node capacity reached");
        }
        events.deaths += 1;
        self.totals.deaths_from_age += 1;
        true
    }

    fn stage_corpses(&mut self) -> u32 {
        let mut expired = Vec::new();
        for (id, node) in self.nodes.iter_mut() {
            if let NodeKind::Corpse { decay_left, .. } = &mut node.kind {
                if *decay_left > 0 {
                    *decay_left -= 1;
                }
                if *decay_left == 0 {
                    expired.push(id);
                }
            }
        }
        for id in &expired {
            self.nodes.free(*id);
        }
        expired.len() as u32
    }

    fn stage_summary(&mut self, events: &TickEvents) {
        let mut plant_nodes = 0;
        let mut corpse_count = 0;
        for (_, node) in self.nodes.iter() {
            match node.kind {
                NodeKind::Plant { .. } => plant_nodes += 1,
                NodeKind::Corpse { .. } => corpse_count += 1,
                NodeKind::FishMarker => {}
            }
        }
        let predator_count = self
            .fish
            .iter()
            .filter(|(_, f)| self.fish_types[f.fish_type].is_predator)
            .count();
        let mean_reward = if self.fish.is_empty() {
            0.0
        } else {
            self.fish.iter().map(|(_, f)| f.last_reward).sum::<f32>() / self.fish.len() as f32
        };
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(TickSummary {
            tick: self.tick,
            plant_nodes,
            fish_count: self.fish.len(),
            predator_count,
            corpse_count,
            chain_count: self.chains.len(),
            births: events.births,
            deaths: events.deaths,
            mean_reward,
        });
    }

    // ----- policy collaborator API ---------------------------------------

    #[must_use]
    pub fn fish_count(&self) -> usize {
        self.fish.len()
    }

    pub fn fish_ids(&self) -> impl Iterator<Item = FishId> + '_ {
        self.fish.keys()
    }

    /// Sensor vector for a fish; all zeros for an invalid id.
    #[must_use]
    pub fn fish_sensors(&self, id: FishId) -> [f32; SENSOR_COUNT] {
        self.fish.get(id).map_or([0.0; SENSOR_COUNT], |f| f.sensors)
    }

    /// Store an action vector to be applied on the next tick (with the
    /// [`crate::policy::HoldActions`] policy). False for an invalid id.
    pub fn set_fish_actions(&mut self, id: FishId, actions: FishActions) -> bool {
        match self.fish.get_mut(id) {
            Some(f) => {
                f.actions = actions;
                true
            }
            None => false,
        }
    }

    /// Last-tick reward; zero for an invalid id.
    #[must_use]
    pub fn fish_last_reward(&self, id: FishId) -> f32 {
        self.fish.get(id).map_or(0.0, |f| f.last_reward)
    }

    /// `(name, is_predator, danger_level, defecation_count, max_age)`.
    #[must_use]
    pub fn fish_type_info(&self, id: FishId) -> Option<(&str, bool, f32, u32, u32)> {
        let f = self.fish.get(id)?;
        let ft = &self.fish_types[f.fish_type];
        Some((
            ft.name.as_str(),
            ft.is_predator,
            ft.danger_level,
            f.defecation_count,
            ft.max_age,
        ))
    }

    /// `(age, max_age, age_ratio, birth_tick)`.
    #[must_use]
    pub fn fish_age_info(&self, id: FishId) -> Option<(u32, u32, f32, u64)> {
        let f = self.fish.get(id)?;
        let max_age = self.fish_types[f.fish_type].max_age;
        Some((
            f.age,
            max_age,
            f.age as f32 / max_age.max(1) as f32,
            f.birth_tick,
        ))
    }

    #[must_use]
    pub fn parent_for_inheritance(&self) -> Option<FishId> {
        self.parent_for_inheritance
    }

    /// Reads and clears the reproduction flag.
    pub fn take_reproduction_pending(&mut self) -> bool {
        std::mem::take(&mut self.reproduction_pending)
    }

    // ----- world query API -----------------------------------------------

    #[must_use]
    pub fn tick(&self) -> Tick {
        self.tick
    }

    #[must_use]
    pub fn config(&self) -> &ReefConfig {
        &self.config
    }

    #[must_use]
    pub fn plant_types(&self) -> &[PlantType] {
        &self.plant_types
    }

    #[must_use]
    pub fn fish_types(&self) -> &[FishType] {
        &self.fish_types
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    pub fn chains(&self) -> impl Iterator<Item = (ChainId, &Chain)> {
        self.chains.iter()
    }

    pub fn fishes(&self) -> impl Iterator<Item = (FishId, &Fish)> {
        self.fish.iter()
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn chain(&self, id: ChainId) -> Option<&Chain> {
        self.chains.get(id)
    }

    #[must_use]
    pub fn fish(&self, id: FishId) -> Option<&Fish> {
        self.fish.get(id)
    }

    /// Mutable fish access for hosts (editors, scenario harnesses).
    pub fn fish_mut(&mut self, id: FishId) -> Option<&mut Fish> {
        self.fish.get_mut(id)
    }

    /// Mutable node access for hosts (editors, scenario harnesses).
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    #[must_use]
    pub fn sample_nutrition(&self, x: f32, y: f32) -> f32 {
        self.nutrition.sample(x, y)
    }

    #[must_use]
    pub fn sample_oxygen(&self, x: f32, y: f32) -> f32 {
        self.oxygen.sample(x, y)
    }

    #[must_use]
    pub fn sample_flow(&self, x: f32, y: f32) -> (f32, f32) {
        self.flow.sample(x, y)
    }

    /// Monotone counters, including the nutrition field's own ledger.
    #[must_use]
    pub fn totals(&self) -> EcosystemTotals {
        let mut totals = self.totals;
        totals.nutrition_added = self.nutrition.added_total();
        totals.nutrition_depleted = self.nutrition.depleted_total();
        totals
    }

    #[must_use]
    pub fn world_bounds(&self) -> (f32, f32, f32, f32) {
        self.config.world_bounds()
    }

    #[must_use]
    pub fn history(&self) -> &VecDeque<TickSummary> {
        &self.history
    }

    #[must_use]
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn set_temperature(&mut self, temperature: f32) {
        self.temperature = temperature.clamp(0.0, 3.0);
    }
}
