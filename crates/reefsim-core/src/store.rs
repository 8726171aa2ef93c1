//! Entity arenas for nodes, chains, and fish.
//!
//! Slot-keyed arenas give the stable-index/free-slot-reuse discipline the
//! rest of the engine relies on: iteration is slot order (lowest slot first),
//! which is also the deterministic tie-break used by sensing and growth.

use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, Key, SlotMap};

use crate::policy::{FishActions, ACTION_COUNT, SENSOR_COUNT};

new_key_type! {
    /// Handle to a node slot.
    pub struct NodeId;
    /// Handle to a chain slot.
    pub struct ChainId;
    /// Handle to a fish slot.
    pub struct FishId;
}

/// What a node is; the kind never mutates in place. Fish death allocates a
/// fresh corpse node rather than rewriting the marker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Plant {
        plant_type: usize,
        /// Nutrition removed from the field at birth; returned to the eater.
        stored_nutrition: f32,
    },
    FishMarker,
    Corpse {
        fish_type: usize,
        decay_left: u32,
        frozen_heading: f32,
    },
}

/// A point entity: plant node, fish marker, or decaying corpse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub age: u32,
    /// Eligible to branch. Set on placed and seeded plants, never on
    /// branch-created children.
    pub can_grow: bool,
    pub branch_count: u32,
    /// Ticks left during which herbivores cannot see or eat this plant.
    pub seed_immunity: u32,
    /// Visual flag raised by sustained high temperature on corals.
    pub bleached: bool,
    pub kind: NodeKind,
}

impl Node {
    pub fn plant(x: f32, y: f32, plant_type: usize, stored_nutrition: f32, can_grow: bool) -> Self {
        Self {
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            age: 0,
            can_grow,
            branch_count: 0,
            seed_immunity: 0,
            bleached: false,
            kind: NodeKind::Plant {
                plant_type,
                stored_nutrition,
            },
        }
    }

    pub fn fish_marker(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            age: 0,
            can_grow: false,
            branch_count: 0,
            seed_immunity: 0,
            bleached: false,
            kind: NodeKind::FishMarker,
        }
    }

    pub fn corpse(x: f32, y: f32, fish_type: usize, decay_ticks: u32, frozen_heading: f32) -> Self {
        Self {
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            age: 0,
            can_grow: false,
            branch_count: 0,
            seed_immunity: 0,
            bleached: false,
            kind: NodeKind::Corpse {
                fish_type,
                decay_left: decay_ticks,
                frozen_heading,
            },
        }
    }

    #[must_use]
    pub fn plant_type(&self) -> Option<usize> {
        match self.kind {
            NodeKind::Plant { plant_type, .. } => Some(plant_type),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_plant(&self) -> bool {
        matches!(self.kind, NodeKind::Plant { .. })
    }

    #[must_use]
    pub fn is_corpse(&self) -> bool {
        matches!(self.kind, NodeKind::Corpse { .. })
    }
}

/// Elastic link between two plant nodes. Curvature fields are rendering
/// hints only; physics treats the chain as a straight spring.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Chain {
    pub a: NodeId,
    pub b: NodeId,
    pub plant_type: usize,
    pub age: u32,
    pub curve_strength: f32,
    pub curve_offset: f32,
}

/// A policy-driven agent owning one fish-marker node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fish {
    pub node: NodeId,
    pub fish_type: usize,
    /// Radians in `[0, 2π)`.
    pub heading: f32,
    pub stomach: f32,
    pub oxygen_level: f32,
    pub hunger: f32,
    pub defecation_count: u32,
    pub kill_count: u32,
    /// Tick after which a predator may kill again.
    pub eat_cooldown_until: u64,
    pub birth_tick: u64,
    pub age: u32,
    pub eating_mode: bool,
    pub sensors: [f32; SENSOR_COUNT],
    pub actions: FishActions,
    pub last_reward: f32,
    pub total_reward: f32,
    /// Reward earned outside the per-fish pass (wall hits), folded into
    /// `last_reward` at the next sense/act step.
    pub pending_reward: f32,
}

impl Fish {
    pub fn spawn(node: NodeId, fish_type: usize, heading: f32, birth_tick: u64) -> Self {
        Self {
            node,
            fish_type,
            heading,
            stomach: 0.0,
            oxygen_level: 1.0,
            hunger: 0.0,
            defecation_count: 0,
            kill_count: 0,
            eat_cooldown_until: 0,
            birth_tick,
            age: 0,
            eating_mode: false,
            sensors: [0.0; SENSOR_COUNT],
            actions: [0.0; ACTION_COUNT],
            last_reward: 0.0,
            total_reward: 0.0,
            pending_reward: 0.0,
        }
    }
}

/// Capacity-capped slot arena. `alloc` returns `None` at capacity; it never
/// overwrites a live entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arena<K: Key, V> {
    slots: SlotMap<K, V>,
    capacity: usize,
}

impl<K: Key, V> Arena<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: SlotMap::with_key(),
            capacity,
        }
    }

    pub fn alloc(&mut self, value: V) -> Option<K> {
        if self.slots.len() >= self.capacity {
            return None;
        }
        Some(self.slots.insert(value))
    }

    pub fn free(&mut self, key: K) -> Option<V> {
        self.slots.remove(key)
    }

    #[must_use]
    pub fn get(&self, key: K) -> Option<&V> {
        self.slots.get(key)
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut V> {
        self.slots.get_mut(key)
    }

    #[must_use]
    pub fn contains(&self, key: K) -> bool {
        self.slots.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slot-order iteration, lowest slot first.
    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut V)> {
        self.slots.iter_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.slots.keys()
    }
}

pub(crate) type NodeArena = Arena<NodeId, Node>;
pub(crate) type ChainArena = Arena<ChainId, Chain>;
pub(crate) type FishArena = Arena<FishId, Fish>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_returns_none_at_capacity() {
        let mut arena: Arena<NodeId, Node> = Arena::new(2);
        assert!(arena.alloc(Node::fish_marker(0.0, 0.0)).is_some());
        assert!(arena.alloc(Node::fish_marker(1.0, 0.0)).is_some());
        assert!(arena.alloc(Node::fish_marker(2.0, 0.0)).is_none());
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut arena: Arena<NodeId, Node> = Arena::new(2);
        let a = arena.alloc(Node::fish_marker(0.0, 0.0)).unwrap();
        let _b = arena.alloc(Node::fish_marker(1.0, 0.0)).unwrap();
        assert!(arena.free(a).is_some());
        let c = arena.alloc(Node::fish_marker(2.0, 0.0)).unwrap();
        assert!(arena.contains(c));
        assert_eq!(arena.len(), 2);
        // Stale handle to the freed slot stays dead.
        assert!(!arena.contains(a));
    }

    #[test]
    fn iteration_is_slot_order() {
        let mut arena: Arena<NodeId, Node> = Arena::new(8);
        let ids: Vec<_> = (0..4)
            .map(|i| arena.alloc(Node::fish_marker(i as f32, 0.0)).unwrap())
            .collect();
        arena.free(ids[1]);
        let xs: Vec<f32> = arena.iter().map(|(_, n)| n.x).collect();
        assert_eq!(xs, vec![0.0, 2.0, 3.0]);
    }

    #[test]
    fn node_kind_queries() {
        let plant = Node::plant(0.0, 0.0, 2, 0.4, true);
        assert!(plant.is_plant());
        assert_eq!(plant.plant_type(), Some(2));
        let corpse = Node::corpse(0.0, 0.0, 1, 600, 0.5);
        assert!(corpse.is_corpse());
        assert_eq!(corpse.plant_type(), None);
    }
}
