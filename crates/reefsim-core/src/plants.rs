//! Nutrition-modulated plant branching.
//!
//! Growth walks plant nodes in slot order, budgeted per tick, and places
//! children on a ring around the parent. Only placed and defecation-seeded
//! nodes carry `can_grow`; branch children never branch further, so a
//! single root saturates into a star of at most `max_branches` children.

use rand::{rngs::SmallRng, Rng};
use reefsim_index::{HashGrid, NeighborhoodIndex};

use crate::config::PlantType;
use crate::fields::NutritionField;
use crate::store::{Chain, ChainArena, Node, NodeArena, NodeId};

/// Per-tick cap on growth events across the whole world.
pub(crate) fn growth_budget(node_count: usize) -> u32 {
    ((node_count / 100) + 3).min(50) as u32
}

/// Growth multiplier from the nutrition sample under a node: 0.05x in
/// barren soil up to 3.5x in saturated soil.
#[must_use]
pub fn nutrition_growth_modifier(n: f32) -> f32 {
    if n < 0.2 {
        0.05
    } else if n < 0.3 {
        0.05 + (n - 0.2) / 0.1 * 0.05
    } else if n < 0.4 {
        0.1 + (n - 0.3) / 0.1 * 0.15
    } else if n < 0.5 {
        0.25 + (n - 0.4) / 0.1 * 0.25
    } else if n < 0.6 {
        0.5 + (n - 0.5) / 0.1 * 0.5
    } else if n < 0.7 {
        1.0 + (n - 0.6) / 0.1 * 0.8
    } else if n < 0.8 {
        1.8 + (n - 0.7) / 0.1 * 0.7
    } else {
        2.5 + (n - 0.8) / 0.2 * 1.0
    }
}

/// Depletion scale for a freshly grown node of this type.
fn size_factor(pt: &PlantType, optimal_distance: f32) -> f32 {
    (pt.max_branches as f32 / 3.0) * (pt.branch_distance / optimal_distance)
}

pub(crate) struct GrowthArgs<'a> {
    pub nodes: &'a mut NodeArena,
    pub chains: &'a mut ChainArena,
    pub grid: &'a mut HashGrid<NodeId>,
    pub nutrition: &'a mut NutritionField,
    pub plant_types: &'a [PlantType],
    pub bounds: (f32, f32, f32, f32),
    pub optimal_distance: f32,
    pub rng: &'a mut SmallRng,
}

/// One growth pass; returns the number of nodes grown.
pub(crate) fn growth_pass(args: GrowthArgs<'_>) -> u32 {
    let GrowthArgs {
        nodes,
        chains,
        grid,
        nutrition,
        plant_types,
        bounds,
        optimal_distance,
        rng,
    } = args;
    let limit = growth_budget(nodes.len());
    let mut grown = 0u32;
    let candidates: Vec<NodeId> = nodes.keys().collect();
    'candidates: for id in candidates {
        if grown >= limit {
            break;
        }
        let Some(node) = nodes.get(id) else { continue };
        if !node.can_grow {
            continue;
        }
        let Some(pt_idx) = node.plant_type() else {
            continue;
        };
        let Some(pt) = plant_types.get(pt_idx) else {
            continue;
        };
        if node.branch_count >= pt.max_branches || node.age > pt.age_mature {
            continue;
        }
        let (px, py) = (node.x, node.y);
        let sample = nutrition.sample(px, py);
        let modifier = nutrition_growth_modifier(sample);
        if rng.random::<f32>() >= pt.growth_probability * modifier {
            continue;
        }
        let mut attempt_modifier = modifier;
        if sample < 0.3 {
            attempt_modifier *= 0.3;
        } else if sample > 0.7 {
            attempt_modifier *= 1.8;
        }
        let attempts =
            ((pt.growth_attempts as f32 * attempt_modifier) as u32).clamp(1, pt.growth_attempts * 3);
        for _ in 0..attempts {
            let angle = rng.random_range(0.0..std::f32::consts::TAU);
            let (nx, ny) = (
                px + angle.cos() * pt.branch_distance,
                py + angle.sin() * pt.branch_distance,
            );
            let (min_x, min_y, max_x, max_y) = bounds;
            if nx < min_x || nx > max_x || ny < min_y || ny > max_y {
                continue;
            }
            if !position_free(grid, nodes, nx, ny, pt.branch_distance * 0.8) {
                continue;
            }
            let depletion = pt.depletion_strength * size_factor(pt, optimal_distance);
            let Some(child) = nodes.alloc(Node::plant(nx, ny, pt_idx, depletion, false)) else {
                // Node capacity reached; later candidates cannot fare better.
                break 'candidates;
            };
            grid.insert(child, nx, ny);
            let _ = chains.alloc(Chain {
                a: id,
                b: child,
                plant_type: pt_idx,
                age: 0,
                curve_strength: (rng.random::<f32>() - 0.5) * 0.6,
                curve_offset: (rng.random::<f32>() - 0.5) * 20.0,
            });
            if let Some(parent) = nodes.get_mut(id) {
                parent.branch_count += 1;
            }
            nutrition.deplete(nx, ny, depletion, pt.depletion_radius);
            grown += 1;
            break;
        }
    }
    grown
}

/// No live node within `min_dist` of the candidate position. Bounded search
/// through the (possibly stale) hash; hits are re-checked against the arena.
fn position_free(
    grid: &HashGrid<NodeId>,
    nodes: &NodeArena,
    x: f32,
    y: f32,
    min_dist: f32,
) -> bool {
    let min_sq = min_dist * min_dist;
    let mut blocked = false;
    grid.for_each_within(x, y, min_sq, &mut |id, _| {
        if blocked {
            return;
        }
        if let Some(node) = nodes.get(id) {
            let dx = node.x - x;
            let dy = node.y - y;
            if dx * dx + dy * dy < min_sq {
                blocked = true;
            }
        }
    });
    !blocked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldGeometry;
    use crate::store::Arena;
    use rand::SeedableRng;
    use reefsim_index::GridConfig;

    const BOUNDS: (f32, f32, f32, f32) = (-400.0, -300.0, 400.0, 300.0);

    fn grid() -> HashGrid<NodeId> {
        HashGrid::new(GridConfig {
            cell_size: 40.0,
            min: (BOUNDS.0, BOUNDS.1),
            max: (BOUNDS.2, BOUNDS.3),
            max_per_cell: 200,
        })
        .unwrap()
    }

    fn rich_type() -> PlantType {
        PlantType {
            growth_probability: 1.0,
            growth_attempts: 8,
            max_branches: 4,
            branch_distance: 50.0,
            age_mature: 10_000,
            depletion_strength: 0.1,
            depletion_radius: 60.0,
            ..PlantType::default()
        }
    }

    #[test]
    fn modifier_matches_piecewise_curve() {
        assert_eq!(nutrition_growth_modifier(0.1), 0.05);
        assert!((nutrition_growth_modifier(0.25) - 0.075).abs() < 1e-6);
        assert!((nutrition_growth_modifier(0.65) - 1.4).abs() < 1e-6);
        assert!((nutrition_growth_modifier(0.9) - 3.0).abs() < 1e-6);
        assert!((nutrition_growth_modifier(1.0) - 3.5).abs() < 1e-6);
    }

    #[test]
    fn root_saturates_into_a_star() {
        let geom = FieldGeometry::covering(BOUNDS, 30.0);
        let mut nutrition = NutritionField::uniform(geom, 0.9, 3.0, 0.0002);
        let mut nodes: NodeArena = Arena::new(256);
        let mut chains: ChainArena = Arena::new(256);
        let mut grid = grid();
        let types = vec![rich_type()];
        let root = nodes.alloc(Node::plant(0.0, 0.0, 0, 0.0, true)).unwrap();
        grid.insert(root, 0.0, 0.0);
        let mut rng = SmallRng::seed_from_u64(4242);
        for _ in 0..100 {
            growth_pass(GrowthArgs {
                nodes: &mut nodes,
                chains: &mut chains,
                grid: &mut grid,
                nutrition: &mut nutrition,
                plant_types: &types,
                bounds: BOUNDS,
                optimal_distance: 50.0,
                rng: &mut rng,
            });
        }
        assert_eq!(nodes.get(root).unwrap().branch_count, 4);
        assert_eq!(nodes.len(), 5);
        assert_eq!(chains.len(), 4);
        for (id, node) in nodes.iter() {
            if id != root {
                assert!(!node.can_grow);
                assert!(node.is_plant());
            }
        }
        // Growth paid for itself in depleted soil near the children.
        assert!(nutrition.depleted_total() > 0.5);
    }

    #[test]
    fn crowded_ring_blocks_placement() {
        let geom = FieldGeometry::covering(BOUNDS, 30.0);
        let mut nutrition = NutritionField::uniform(geom, 0.9, 3.0, 0.0002);
        let mut nodes: NodeArena = Arena::new(256);
        let mut chains: ChainArena = Arena::new(256);
        let mut grid = grid();
        let types = vec![rich_type()];
        let root = nodes.alloc(Node::plant(0.0, 0.0, 0, 0.0, true)).unwrap();
        grid.insert(root, 0.0, 0.0);
        // Pre-seed the ring densely enough that every candidate lands within
        // 0.8 * branch_distance of a blocker.
        for i in 0..16 {
            let angle = i as f32 / 16.0 * std::f32::consts::TAU;
            let (x, y) = (angle.cos() * 50.0, angle.sin() * 50.0);
            let blocker = nodes.alloc(Node::plant(x, y, 0, 0.0, false)).unwrap();
            grid.insert(blocker, x, y);
        }
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..50 {
            growth_pass(GrowthArgs {
                nodes: &mut nodes,
                chains: &mut chains,
                grid: &mut grid,
                nutrition: &mut nutrition,
                plant_types: &types,
                bounds: BOUNDS,
                optimal_distance: 50.0,
                rng: &mut rng,
            });
        }
        assert_eq!(nodes.get(root).unwrap().branch_count, 0);
        assert_eq!(chains.len(), 0);
    }

    #[test]
    fn growth_stops_at_node_capacity() {
        let geom = FieldGeometry::covering(BOUNDS, 30.0);
        let mut nutrition = NutritionField::uniform(geom, 0.9, 3.0, 0.0002);
        let mut nodes: NodeArena = Arena::new(2);
        let mut chains: ChainArena = Arena::new(8);
        let mut grid = grid();
        let types = vec![rich_type()];
        let root = nodes.alloc(Node::plant(0.0, 0.0, 0, 0.0, true)).unwrap();
        grid.insert(root, 0.0, 0.0);
        let mut rng = SmallRng::seed_from_u64(5);
        for _ in 0..20 {
            growth_pass(GrowthArgs {
                nodes: &mut nodes,
                chains: &mut chains,
                grid: &mut grid,
                nutrition: &mut nutrition,
                plant_types: &types,
                bounds: BOUNDS,
                optimal_distance: 50.0,
                rng: &mut rng,
            });
        }
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn budget_caps_at_fifty() {
        assert_eq!(growth_budget(0), 3);
        assert_eq!(growth_budget(1000), 13);
        assert_eq!(growth_budget(1_000_000), 50);
    }
}
