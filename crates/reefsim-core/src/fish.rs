//! Fish sensing, actuation, physiology, and reward shaping.
//!
//! Sensing is pure over an immutable snapshot so the world can fan it out
//! across threads; everything that mutates state stays in the tick loop.

use rayon::prelude::*;

use crate::config::FishType;
use crate::fields::OxygenField;
use crate::policy::{sensor, FishActions, SENSOR_COUNT};
use crate::store::{Fish, FishId, Node};

pub(crate) fn wrap_angle(a: f32) -> f32 {
    a.rem_euclid(std::f32::consts::TAU)
}

/// Wrap to `[-pi, pi]`.
pub(crate) fn wrap_signed(a: f32) -> f32 {
    let mut a = a.rem_euclid(std::f32::consts::TAU);
    if a > std::f32::consts::PI {
        a -= std::f32::consts::TAU;
    }
    a
}

/// Visible plant node (active, non-immune), in slot order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PlantBlip {
    pub x: f32,
    pub y: f32,
}

/// Living fish, in slot order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FishBlip {
    pub id: FishId,
    pub x: f32,
    pub y: f32,
    pub fish_type: usize,
    pub danger: f32,
}

/// Corpse node, in slot order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CorpseBlip {
    pub x: f32,
    pub y: f32,
}

/// Immutable world snapshot shared by all sensing calls in one tick.
pub(crate) struct SenseWorld<'a> {
    pub plants: &'a [PlantBlip],
    pub fish: &'a [FishBlip],
    pub corpses: &'a [CorpseBlip],
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SenseSubject {
    pub id: FishId,
    pub x: f32,
    pub y: f32,
    pub heading: f32,
    pub fish_type: usize,
    pub danger: f32,
}

fn in_fov(heading: f32, half_angle: f32, dx: f32, dy: f32) -> bool {
    wrap_signed(dy.atan2(dx) - heading).abs() <= half_angle
}

/// 90-degree forward cone used by herbivore eating.
pub(crate) fn in_forward_cone(heading: f32, dx: f32, dy: f32) -> bool {
    wrap_signed(dy.atan2(dx) - heading).abs() <= std::f32::consts::FRAC_PI_4
}

/// Sensor vector for one fish. Pure; ties on distance resolve to the first
/// (lowest-slot) candidate because comparisons are strict.
pub(crate) fn sense_one(
    subject: &SenseSubject,
    ft: &FishType,
    world: &SenseWorld<'_>,
    oxygen: f32,
) -> [f32; SENSOR_COUNT] {
    let mut sensors = [0.0f32; SENSOR_COUNT];
    sensors[sensor::OXYGEN] = oxygen;
    sensors[sensor::TARGET_DIST] = 1.0;

    let half = ft.fov_half_angle();
    let range = if ft.is_predator {
        ft.detection_range
    } else {
        ft.fov_range
    };
    let range_sq = range * range;

    let mut best_sq = f32::INFINITY;
    let mut best: Option<(f32, f32)> = None;
    if ft.is_predator {
        for blip in world.fish {
            if blip.id == subject.id || blip.fish_type == subject.fish_type {
                continue;
            }
            if blip.danger >= subject.danger {
                continue;
            }
            let dx = blip.x - subject.x;
            let dy = blip.y - subject.y;
            let d_sq = dx * dx + dy * dy;
            if d_sq <= range_sq && d_sq < best_sq && in_fov(subject.heading, half, dx, dy) {
                best_sq = d_sq;
                best = Some((dx, dy));
            }
        }
        for blip in world.corpses {
            let dx = blip.x - subject.x;
            let dy = blip.y - subject.y;
            let d_sq = dx * dx + dy * dy;
            if d_sq <= range_sq && d_sq < best_sq && in_fov(subject.heading, half, dx, dy) {
                best_sq = d_sq;
                best = Some((dx, dy));
            }
        }
    } else {
        for blip in world.plants {
            let dx = blip.x - subject.x;
            let dy = blip.y - subject.y;
            let d_sq = dx * dx + dy * dy;
            if d_sq > range_sq || d_sq >= best_sq {
                continue;
            }
            if !in_fov(subject.heading, half, dx, dy) {
                continue;
            }
            best_sq = d_sq;
            best = Some((dx, dy));
        }
    }
    if let Some((dx, dy)) = best {
        let dist = best_sq.sqrt();
        if dist > 0.1 {
            sensors[sensor::TARGET_X] = dx / dist;
            sensors[sensor::TARGET_Y] = dy / dist;
        }
        sensors[sensor::TARGET_DIST] = (dist / range).min(1.0);
    }

    let threat_range_sq = ft.detection_range * ft.detection_range;
    let mut threat_sq = f32::INFINITY;
    for blip in world.fish {
        if blip.id == subject.id || blip.fish_type == subject.fish_type {
            continue;
        }
        let relative_danger = blip.danger - subject.danger;
        if relative_danger.abs() < 0.01 {
            continue;
        }
        let dx = blip.x - subject.x;
        let dy = blip.y - subject.y;
        let d_sq = dx * dx + dy * dy;
        if d_sq > threat_range_sq || d_sq >= threat_sq {
            continue;
        }
        if !in_fov(subject.heading, half, dx, dy) {
            continue;
        }
        threat_sq = d_sq;
        let dist = d_sq.sqrt();
        if dist > 0.1 {
            sensors[sensor::THREAT_X] = dx / dist;
            sensors[sensor::THREAT_Y] = dy / dist;
        } else {
            sensors[sensor::THREAT_X] = 0.0;
            sensors[sensor::THREAT_Y] = 0.0;
        }
        sensors[sensor::THREAT_DANGER] = relative_danger.clamp(-1.0, 1.0);
    }

    sensors
}

/// Sense every fish in parallel against one shared snapshot.
pub(crate) fn compute_senses(
    subjects: &[SenseSubject],
    fish_types: &[FishType],
    world: &SenseWorld<'_>,
    oxygen: &OxygenField,
) -> Vec<[f32; SENSOR_COUNT]> {
    subjects
        .par_iter()
        .map(|subject| {
            let ft = &fish_types[subject.fish_type];
            let ambient = oxygen.sample(subject.x, subject.y);
            sense_one(subject, ft, world, ambient)
        })
        .collect()
}

/// Apply one action vector: either enter eating mode (damping motion) or
/// turn and thrust. The speed clamp runs here so one tick never exceeds
/// `max_speed` regardless of accumulated forces.
pub(crate) fn apply_actions(fish: &mut Fish, node: &mut Node, ft: &FishType, actions: FishActions) {
    fish.actions = actions;
    fish.eating_mode = actions[2] > 0.5;
    if fish.eating_mode {
        node.vx *= 0.2;
        node.vy *= 0.2;
        return;
    }
    let turn = actions[0].clamp(-1.0, 1.0);
    fish.heading = wrap_angle(fish.heading + turn * ft.max_turn_deg.to_radians());
    let thrust = actions[1].clamp(0.0, 1.0) * ft.max_force;
    node.vx += fish.heading.cos() * thrust;
    node.vy += fish.heading.sin() * thrust;
    let speed_sq = node.vx * node.vx + node.vy * node.vy;
    let max_sq = ft.max_speed * ft.max_speed;
    if speed_sq > max_sq && speed_sq > 0.0 {
        let scale = ft.max_speed / speed_sq.sqrt();
        node.vx *= scale;
        node.vy *= scale;
    }
}

/// Per-tick oxygen exchange and slow hunger accumulation.
pub(crate) fn update_physiology(fish: &mut Fish, ambient_oxygen: f32, ft: &FishType) {
    fish.oxygen_level -= ft.oxygen_consumption_rate * 0.5;
    if ambient_oxygen > 0.1 {
        fish.oxygen_level += ft.oxygen_refill_rate * 2.0 * (ambient_oxygen + 0.2);
    }
    fish.oxygen_level = fish.oxygen_level.clamp(0.0, 1.0);
    fish.hunger = (fish.hunger + 0.0003).clamp(0.0, 1.0);
}

/// Comfort/stress reward from internal state.
pub(crate) fn environment_reward(oxygen_level: f32, hunger: f32) -> f32 {
    let mut reward = 0.0;
    if oxygen_level < 0.6 {
        reward -= (0.6 - oxygen_level).powi(2) * 0.05;
    }
    reward -= hunger * 0.02;
    if oxygen_level > 0.8 && hunger < 0.3 {
        reward += 0.005;
    }
    reward
}

/// Movement shaping: approach the target, flee stronger threats, avoid
/// camping and flat-out spinning.
pub(crate) fn motion_reward(
    sensors: &[f32; SENSOR_COUNT],
    last_turn: f32,
    vx: f32,
    vy: f32,
    max_speed: f32,
    hunger: f32,
) -> f32 {
    let mut reward = 0.0;
    let speed = (vx * vx + vy * vy).sqrt();
    if speed > 1e-3 {
        let (ux, uy) = (vx / speed, vy / speed);
        if sensors[sensor::TARGET_DIST] < 1.0 {
            reward += (sensors[sensor::TARGET_X] * ux + sensors[sensor::TARGET_Y] * uy) * 0.01;
        }
        if sensors[sensor::THREAT_DANGER] > 0.0 {
            reward -= (sensors[sensor::THREAT_X] * ux + sensors[sensor::THREAT_Y] * uy)
                * sensors[sensor::THREAT_DANGER]
                * 0.01;
        }
    } else if max_speed > 0.0 && hunger > 0.5 {
        reward -= 0.002;
    }
    if last_turn.abs() > 0.9 {
        reward -= 0.001;
    }
    reward
}

/// Reward for a successful plant meal, richer for substantial plants.
pub(crate) fn plant_eat_reward(nutrition: f32, hunger: f32) -> f32 {
    let mut reward = nutrition * 15.0;
    if nutrition > 0.4 {
        reward += (nutrition - 0.4) * 20.0;
    } else if nutrition < 0.2 {
        reward -= 0.1;
    }
    reward + hunger * 0.1
}

/// Failed eat attempts sting more on an empty stomach.
pub(crate) fn eat_failure_penalty(ft: &FishType, hunger: f32) -> f32 {
    if hunger > 0.7 {
        ft.eat_punishment * 3.0
    } else {
        ft.eat_punishment
    }
}

/// Age-death probability: zero for the first half of life, quadratic to 0.5
/// at `max_age`, capped at 0.95 beyond.
pub(crate) fn death_probability(age: u32, max_age: u32) -> f32 {
    let ratio = age as f32 / max_age.max(1) as f32;
    if ratio <= 0.5 {
        0.0
    } else {
        (0.5 * ((ratio - 0.5) * 2.0).powi(2)).min(0.95)
    }
}
