//! Force accumulation and integration for the node soup.
//!
//! Pair iteration walks each hash cell against itself and its
//! right/bottom-right/bottom/bottom-left neighbours so every unordered pair
//! is visited exactly once per tick. The grid may be a few ticks stale;
//! forces always use live arena positions and skip missing entries.

use reefsim_index::HashGrid;

use crate::config::PlantType;
use crate::store::{ChainArena, ChainId, Node, NodeArena, NodeId};

const FORWARD_NEIGHBOURS: [(i64, i64); 4] = [(1, 0), (1, 1), (0, 1), (-1, 1)];
const MIN_DIST_SQ: f32 = 1e-6;

pub(crate) fn mobility(node: &Node, plant_types: &[PlantType]) -> f32 {
    match node.plant_type() {
        Some(pt) => plant_types.get(pt).map_or(1.0, |t| t.mobility_factor),
        None => 1.0,
    }
}

/// Short-range pair repulsion between all nearby nodes.
pub(crate) fn accumulate_repulsion(
    nodes: &mut NodeArena,
    grid: &HashGrid<NodeId>,
    plant_types: &[PlantType],
    optimal: f32,
    strength: f32,
) {
    let optimal_sq = optimal * optimal;
    let (cols, rows) = grid.dims();
    for cy in 0..rows {
        for cx in 0..cols {
            let cell = grid.entries(cx, cy);
            for i in 0..cell.len() {
                for j in (i + 1)..cell.len() {
                    repel_pair(nodes, plant_types, cell[i].0, cell[j].0, optimal, optimal_sq, strength);
                }
            }
            for (dx, dy) in FORWARD_NEIGHBOURS {
                let nx = cx as i64 + dx;
                let ny = cy as i64 + dy;
                if nx < 0 || ny < 0 || nx >= cols as i64 || ny >= rows as i64 {
                    continue;
                }
                let other = grid.entries(nx as usize, ny as usize);
                for &(a, _, _) in cell {
                    for &(b, _, _) in other {
                        repel_pair(nodes, plant_types, a, b, optimal, optimal_sq, strength);
                    }
                }
            }
        }
    }
}

fn repel_pair(
    nodes: &mut NodeArena,
    plant_types: &[PlantType],
    a: NodeId,
    b: NodeId,
    optimal: f32,
    optimal_sq: f32,
    strength: f32,
) {
    let (Some(na), Some(nb)) = (nodes.get(a), nodes.get(b)) else {
        return;
    };
    let dx = na.x - nb.x;
    let dy = na.y - nb.y;
    let dist_sq = dx * dx + dy * dy;
    if dist_sq >= optimal_sq || dist_sq < MIN_DIST_SQ {
        return;
    }
    let dist = dist_sq.sqrt();
    let force = strength * (optimal - dist) / dist;
    let mob_a = mobility(na, plant_types);
    let mob_b = mobility(nb, plant_types);
    let ix = dx * force;
    let iy = dy * force;
    if let Some(na) = nodes.get_mut(a) {
        na.vx += ix * mob_a;
        na.vy += iy * mob_a;
    }
    if let Some(nb) = nodes.get_mut(b) {
        nb.vx -= ix * mob_b;
        nb.vy -= iy * mob_b;
    }
}

/// Chain springs between plant nodes. Chains whose endpoints are gone or no
/// longer plants are reported in `retired` for removal by the caller.
pub(crate) fn apply_chain_springs(
    nodes: &mut NodeArena,
    chains: &ChainArena,
    plant_types: &[PlantType],
    optimal: f32,
    strength: f32,
    retired: &mut Vec<ChainId>,
) {
    for (id, chain) in chains.iter() {
        let (Some(na), Some(nb)) = (nodes.get(chain.a), nodes.get(chain.b)) else {
            retired.push(id);
            continue;
        };
        if !na.is_plant() || !nb.is_plant() {
            retired.push(id);
            continue;
        }
        let dx = nb.x - na.x;
        let dy = nb.y - na.y;
        let dist_sq = dx * dx + dy * dy;
        if dist_sq < MIN_DIST_SQ {
            continue;
        }
        let dist = dist_sq.sqrt();
        let force = strength * (dist - optimal) / dist;
        let mob_a = mobility(na, plant_types);
        let mob_b = mobility(nb, plant_types);
        let ix = dx * force;
        let iy = dy * force;
        if let Some(na) = nodes.get_mut(chain.a) {
            na.vx += ix * mob_a;
            na.vy += iy * mob_a;
        }
        if let Some(nb) = nodes.get_mut(chain.b) {
            nb.vx -= ix * mob_b;
            nb.vy -= iy * mob_b;
        }
    }
}

/// Apply drag, advance positions, clamp to the world rectangle. Returns the
/// nodes that hit a wall this tick (perpendicular velocity already zeroed).
pub(crate) fn integrate(
    nodes: &mut NodeArena,
    drag: f32,
    bounds: (f32, f32, f32, f32),
) -> Vec<NodeId> {
    let (min_x, min_y, max_x, max_y) = bounds;
    let mut wall_hits = Vec::new();
    for (id, node) in nodes.iter_mut() {
        node.vx *= drag;
        node.vy *= drag;
        node.x += node.vx;
        node.y += node.vy;
        let mut hit = false;
        if node.x < min_x {
            node.x = min_x;
            node.vx = 0.0;
            hit = true;
        } else if node.x > max_x {
            node.x = max_x;
            node.vx = 0.0;
            hit = true;
        }
        if node.y < min_y {
            node.y = min_y;
            node.vy = 0.0;
            hit = true;
        } else if node.y > max_y {
            node.y = max_y;
            node.vy = 0.0;
            hit = true;
        }
        if hit {
            wall_hits.push(id);
        }
    }
    wall_hits
}

pub(crate) fn age_entities(nodes: &mut NodeArena, chains: &mut ChainArena) {
    for (_, node) in nodes.iter_mut() {
        node.age = node.age.saturating_add(1);
    }
    for (_, chain) in chains.iter_mut() {
        chain.age = chain.age.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Arena, Chain, Node};
    use reefsim_index::{GridConfig, NeighborhoodIndex};

    fn grid() -> HashGrid<NodeId> {
        HashGrid::new(GridConfig {
            cell_size: 40.0,
            min: (-400.0, -400.0),
            max: (400.0, 400.0),
            max_per_cell: 64,
        })
        .unwrap()
    }

    fn plant_types() -> Vec<PlantType> {
        vec![PlantType::default()]
    }

    #[test]
    fn close_pair_is_pushed_apart() {
        let mut nodes: NodeArena = Arena::new(8);
        let a = nodes.alloc(Node::plant(0.0, 0.0, 0, 0.1, true)).unwrap();
        let b = nodes.alloc(Node::plant(10.0, 0.0, 0, 0.1, true)).unwrap();
        let mut grid = grid();
        grid.insert(a, 0.0, 0.0);
        grid.insert(b, 10.0, 0.0);
        accumulate_repulsion(&mut nodes, &grid, &plant_types(), 50.0, 0.05);
        assert!(nodes.get(a).unwrap().vx < 0.0);
        assert!(nodes.get(b).unwrap().vx > 0.0);
        assert_eq!(nodes.get(a).unwrap().vy, 0.0);
    }

    #[test]
    fn coincident_pair_is_skipped() {
        let mut nodes: NodeArena = Arena::new(8);
        let a = nodes.alloc(Node::plant(5.0, 5.0, 0, 0.1, true)).unwrap();
        let b = nodes.alloc(Node::plant(5.0, 5.0, 0, 0.1, true)).unwrap();
        let mut grid = grid();
        grid.insert(a, 5.0, 5.0);
        grid.insert(b, 5.0, 5.0);
        accumulate_repulsion(&mut nodes, &grid, &plant_types(), 50.0, 0.05);
        assert_eq!(nodes.get(a).unwrap().vx, 0.0);
        assert_eq!(nodes.get(b).unwrap().vx, 0.0);
    }

    #[test]
    fn mobility_scales_received_impulse() {
        let mut heavy = PlantType::default();
        heavy.mobility_factor = 0.1;
        let types = vec![heavy, PlantType::default()];
        let mut nodes: NodeArena = Arena::new(8);
        let anchor = nodes.alloc(Node::plant(0.0, 0.0, 0, 0.1, true)).unwrap();
        let light = nodes.alloc(Node::plant(10.0, 0.0, 1, 0.1, true)).unwrap();
        let mut grid = grid();
        grid.insert(anchor, 0.0, 0.0);
        grid.insert(light, 10.0, 0.0);
        accumulate_repulsion(&mut nodes, &grid, &types, 50.0, 0.05);
        let heavy_speed = nodes.get(anchor).unwrap().vx.abs();
        let light_speed = nodes.get(light).unwrap().vx.abs();
        assert!((light_speed / heavy_speed - 10.0).abs() < 1e-3);
    }

    #[test]
    fn stretched_chain_pulls_endpoints_together() {
        let mut nodes: NodeArena = Arena::new(8);
        let mut chains: ChainArena = Arena::new(8);
        let a = nodes.alloc(Node::plant(0.0, 0.0, 0, 0.1, true)).unwrap();
        let b = nodes.alloc(Node::plant(100.0, 0.0, 0, 0.1, true)).unwrap();
        chains
            .alloc(Chain {
                a,
                b,
                plant_type: 0,
                age: 0,
                curve_strength: 0.0,
                curve_offset: 0.0,
            })
            .unwrap();
        let mut retired = Vec::new();
        apply_chain_springs(&mut nodes, &chains, &plant_types(), 50.0, 0.05, &mut retired);
        assert!(retired.is_empty());
        assert!(nodes.get(a).unwrap().vx > 0.0);
        assert!(nodes.get(b).unwrap().vx < 0.0);
    }

    #[test]
    fn chain_with_missing_endpoint_is_retired() {
        let mut nodes: NodeArena = Arena::new(8);
        let mut chains: ChainArena = Arena::new(8);
        let a = nodes.alloc(Node::plant(0.0, 0.0, 0, 0.1, true)).unwrap();
        let b = nodes.alloc(Node::plant(60.0, 0.0, 0, 0.1, true)).unwrap();
        let id = chains
            .alloc(Chain {
                a,
                b,
                plant_type: 0,
                age: 0,
                curve_strength: 0.0,
                curve_offset: 0.0,
            })
            .unwrap();
        nodes.free(b);
        let mut retired = Vec::new();
        apply_chain_springs(&mut nodes, &chains, &plant_types(), 50.0, 0.05, &mut retired);
        assert_eq!(retired, vec![id]);
    }

    #[test]
    fn integration_clamps_to_bounds_and_zeroes_normal_velocity() {
        let mut nodes: NodeArena = Arena::new(8);
        let mut runaway = Node::fish_marker(395.0, 0.0);
        runaway.vx = 50.0;
        runaway.vy = 2.0;
        let id = nodes.alloc(runaway).unwrap();
        let hits = integrate(&mut nodes, 1.0, (-400.0, -400.0, 400.0, 400.0));
        assert_eq!(hits, vec![id]);
        let node = nodes.get(id).unwrap();
        assert_eq!(node.x, 400.0);
        assert_eq!(node.vx, 0.0);
        assert!(node.vy > 0.0);
    }

    #[test]
    fn drag_slows_free_motion() {
        let mut nodes: NodeArena = Arena::new(8);
        let mut swimmer = Node::fish_marker(0.0, 0.0);
        swimmer.vx = 10.0;
        let id = nodes.alloc(swimmer).unwrap();
        let hits = integrate(&mut nodes, 0.95, (-400.0, -400.0, 400.0, 400.0));
        assert!(hits.is_empty());
        let node = nodes.get(id).unwrap();
        assert!((node.vx - 9.5).abs() < 1e-5);
        assert!((node.x - 9.5).abs() < 1e-5);
    }
}
