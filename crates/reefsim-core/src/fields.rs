//! Scalar fields over the world rectangle: nutrition, oxygen, and flow.
//!
//! All fields share the same dense-grid layout with nearest-cell sampling
//! and quadratic-falloff disc stamps. Cell edge `g` is independent of the
//! spatial-hash edge `G`.

use libnoise::{Generator, Source};
use rand::{rngs::SmallRng, Rng};
use serde::{Deserialize, Serialize};

/// Grid placement shared by every field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FieldGeometry {
    pub min_x: f32,
    pub min_y: f32,
    pub cell: f32,
    pub cols: usize,
    pub rows: usize,
}

impl FieldGeometry {
    pub fn covering(bounds: (f32, f32, f32, f32), cell: f32) -> Self {
        let (min_x, min_y, max_x, max_y) = bounds;
        let cols = (((max_x - min_x) / cell).ceil() as usize).max(1);
        let rows = (((max_y - min_y) / cell).ceil() as usize).max(1);
        Self {
            min_x,
            min_y,
            cell,
            cols,
            rows,
        }
    }

    fn cell_index(&self, x: f32, y: f32) -> Option<usize> {
        let cx = ((x - self.min_x) / self.cell).floor();
        let cy = ((y - self.min_y) / self.cell).floor();
        if cx < 0.0 || cy < 0.0 {
            return None;
        }
        let (cx, cy) = (cx as usize, cy as usize);
        if cx >= self.cols || cy >= self.rows {
            return None;
        }
        Some(cy * self.cols + cx)
    }

    fn center(&self, cx: usize, cy: usize) -> (f32, f32) {
        (
            self.min_x + (cx as f32 + 0.5) * self.cell,
            self.min_y + (cy as f32 + 0.5) * self.cell,
        )
    }

    fn len(&self) -> usize {
        self.cols * self.rows
    }
}

/// Dense f32 grid with disc stamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalarField {
    geom: FieldGeometry,
    cells: Vec<f32>,
}

impl ScalarField {
    pub fn filled(geom: FieldGeometry, value: f32) -> Self {
        Self {
            cells: vec![value; geom.len()],
            geom,
        }
    }

    #[must_use]
    pub fn geometry(&self) -> FieldGeometry {
        self.geom
    }

    #[must_use]
    pub fn sample(&self, x: f32, y: f32) -> Option<f32> {
        self.geom.cell_index(x, y).map(|i| self.cells[i])
    }

    /// Add `amount * (1 - d/radius)^2` to each cell centre within the disc,
    /// clamping cells to `[0, max]`.
    pub fn stamp(&mut self, x: f32, y: f32, amount: f32, radius: f32, max: f32) {
        self.apply_disc(x, y, radius, |cell, falloff| {
            (cell + amount * falloff).clamp(0.0, max)
        });
    }

    /// Subtract with the same kernel, flooring cells at zero.
    pub fn drain(&mut self, x: f32, y: f32, amount: f32, radius: f32) {
        self.apply_disc(x, y, radius, |cell, falloff| {
            (cell - amount * falloff).max(0.0)
        });
    }

    fn apply_disc(&mut self, x: f32, y: f32, radius: f32, op: impl Fn(f32, f32) -> f32) {
        if !(radius > 0.0) {
            return;
        }
        let cx = ((x - self.geom.min_x) / self.geom.cell).floor() as i64;
        let cy = ((y - self.geom.min_y) / self.geom.cell).floor() as i64;
        let reach = (radius / self.geom.cell).ceil() as i64;
        for dy in -reach..=reach {
            for dx in -reach..=reach {
                let gx = cx + dx;
                let gy = cy + dy;
                if gx < 0 || gy < 0 || gx >= self.geom.cols as i64 || gy >= self.geom.rows as i64 {
                    continue;
                }
                let dist = ((dx * dx + dy * dy) as f32).sqrt() * self.geom.cell;
                if dist > radius {
                    continue;
                }
                let falloff = {
                    let lin = 1.0 - dist / radius;
                    lin * lin
                };
                let idx = gy as usize * self.geom.cols + gx as usize;
                self.cells[idx] = op(self.cells[idx], falloff);
            }
        }
    }

    fn map_cells(&mut self, f: impl Fn(f32) -> f32) {
        for cell in &mut self.cells {
            *cell = f(*cell);
        }
    }
}

/// Depletable nutrition terrain regenerating toward its procedural baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NutritionField {
    field: ScalarField,
    baseline: Vec<f32>,
    cap: f32,
    regen_rate: f32,
    added_total: f64,
    depleted_total: f64,
}

impl NutritionField {
    /// Multi-octave Perlin terrain: jitter, contrast stretch, min-max
    /// normalisation, then a light 5x5 Gaussian blur.
    pub fn generate(
        geom: FieldGeometry,
        cap: f32,
        regen_rate: f32,
        seed: u64,
        rng: &mut SmallRng,
    ) -> Self {
        const OCTAVES: [(f64, f32); 4] = [(0.005, 1.0), (0.02, 0.4), (0.08, 0.3), (0.2, 0.2)];
        let weight_sum: f32 = OCTAVES.iter().map(|&(_, w)| w).sum();
        let noise = Source::improved_perlin(seed);
        let mut cells = Vec::with_capacity(geom.len());
        for cy in 0..geom.rows {
            for cx in 0..geom.cols {
                let (wx, wy) = geom.center(cx, cy);
                let mut v = 0.0f32;
                for (scale, weight) in OCTAVES {
                    v += weight * noise.sample([wx as f64 * scale, wy as f64 * scale]) as f32;
                }
                let mut v = (v / weight_sum) * 0.5 + 0.5;
                v += rng.random_range(-0.15..=0.15);
                // Spread mass toward the extremes before normalisation.
                v = (v - 0.5) * 2.0 + 0.5;
                cells.push(v);
            }
        }
        let lo = cells.iter().copied().fold(f32::INFINITY, f32::min);
        let hi = cells.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let span = (hi - lo).max(1e-6);
        for v in &mut cells {
            *v = (*v - lo) / span;
        }
        let cells = gaussian_blur_5x5(&cells, geom.cols, geom.rows);
        let baseline = cells.clone();
        Self {
            field: ScalarField {
                geom,
                cells,
            },
            baseline,
            cap,
            regen_rate,
            added_total: 0.0,
            depleted_total: 0.0,
        }
    }

    /// Flat terrain at `value`; scenarios and tests use this.
    pub fn uniform(geom: FieldGeometry, value: f32, cap: f32, regen_rate: f32) -> Self {
        let field = ScalarField::filled(geom, value);
        Self {
            baseline: field.cells.clone(),
            field,
            cap,
            regen_rate,
            added_total: 0.0,
            depleted_total: 0.0,
        }
    }

    /// Nearest-cell lookup; 0.5 outside the rectangle.
    #[must_use]
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        self.field.sample(x, y).unwrap_or(0.5)
    }

    pub fn deposit(&mut self, x: f32, y: f32, amount: f32, radius: f32) {
        self.field.stamp(x, y, amount, radius, self.cap);
        self.added_total += f64::from(amount);
    }

    pub fn deplete(&mut self, x: f32, y: f32, amount: f32, radius: f32) {
        self.field.drain(x, y, amount, radius);
        self.depleted_total += f64::from(amount);
    }

    /// Nudge cells depleted below 80% of their baseline back toward it.
    pub fn regenerate(&mut self) {
        for (cell, &original) in self.field.cells.iter_mut().zip(&self.baseline) {
            if *cell < original * 0.8 {
                *cell = (*cell + self.regen_rate).min(original);
            }
        }
    }

    #[must_use]
    pub fn added_total(&self) -> f64 {
        self.added_total
    }

    #[must_use]
    pub fn depleted_total(&self) -> f64 {
        self.depleted_total
    }
}

/// Dissolved oxygen: plant deposits against a uniform multiplicative decay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OxygenField {
    field: ScalarField,
    decay: f32,
}

impl OxygenField {
    pub fn new(geom: FieldGeometry, ambient: f32, decay: f32) -> Self {
        Self {
            field: ScalarField::filled(geom, ambient.clamp(0.0, 1.0)),
            decay,
        }
    }

    /// Nearest-cell lookup; zero outside the rectangle.
    #[must_use]
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        self.field.sample(x, y).unwrap_or(0.0)
    }

    pub fn deposit(&mut self, x: f32, y: f32, amount: f32, radius: f32) {
        self.field.stamp(x, y, amount, radius, 1.0);
    }

    pub fn step(&mut self) {
        let decay = self.decay;
        self.field.map_cells(|v| (v * decay).clamp(0.0, 1.0));
    }
}

/// Static current field layered from Perlin circulation, eddies, a weak
/// basin-wide spiral, and a few seeded vortices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowField {
    geom: FieldGeometry,
    cells: Vec<(f32, f32)>,
}

impl FlowField {
    pub fn generate(geom: FieldGeometry, seed: u64, rng: &mut SmallRng) -> Self {
        const MAX_MAGNITUDE: f32 = 3.0;
        const FADE_CELLS: f32 = 20.0;
        let circulation = Source::improved_perlin(seed);
        let turbulence = Source::improved_perlin(seed.wrapping_add(1));
        let eddies = Source::improved_perlin(seed.wrapping_add(2));
        let half_w = geom.cols as f32 * geom.cell * 0.5;
        let vortices: Vec<(f32, f32, f32)> = (0..3)
            .map(|_| {
                (
                    rng.random_range(geom.min_x..geom.min_x + geom.cols as f32 * geom.cell),
                    rng.random_range(geom.min_y..geom.min_y + geom.rows as f32 * geom.cell),
                    if rng.random::<f32>() < 0.5 { 1.0 } else { -1.0 },
                )
            })
            .collect();
        let mut cells = Vec::with_capacity(geom.len());
        for cy in 0..geom.rows {
            for cx in 0..geom.cols {
                let (wx, wy) = geom.center(cx, cy);
                let angle_n = fbm(&circulation, wx, wy, 0.008, 3, 0.6);
                let angle = (angle_n * 0.5 + 0.5) * std::f32::consts::TAU;
                let strength_n = fbm(&turbulence, wx, wy, 0.02, 4, 0.5) * 0.5 + 0.5;
                let strength = 0.4 + strength_n * 0.3;
                let mut vx = angle.cos() * strength;
                let mut vy = angle.sin() * strength;

                let swirl = fbm(&eddies, wx, wy, 0.05, 2, 0.5) * 0.2;
                let (sx, sy) = swirl_offsets(vx, vy, swirl);
                vx += sx;
                vy += sy;

                let r = (wx * wx + wy * wy).sqrt();
                if r > 1.0 {
                    let spiral = 0.15 * (-r / (half_w * 0.5)).exp();
                    vx += -wy / r * spiral;
                    vy += wx / r * spiral;
                }

                for &(vx0, vy0, spin) in &vortices {
                    let dx = wx - vx0;
                    let dy = wy - vy0;
                    let d_sq = dx * dx + dy * dy;
                    let falloff = 0.5 * (-d_sq / (2.0 * 800.0 * 800.0)).exp();
                    if d_sq > 1.0 {
                        let d = d_sq.sqrt();
                        vx += -dy / d * falloff * spin;
                        vy += dx / d * falloff * spin;
                    }
                }

                let edge = (cx.min(geom.cols - 1 - cx).min(cy).min(geom.rows - 1 - cy)) as f32;
                let fade = (edge / FADE_CELLS).min(1.0);
                vx *= fade;
                vy *= fade;

                let mag = (vx * vx + vy * vy).sqrt();
                if mag > MAX_MAGNITUDE {
                    vx *= MAX_MAGNITUDE / mag;
                    vy *= MAX_MAGNITUDE / mag;
                }
                cells.push((vx, vy));
            }
        }
        Self { geom, cells }
    }

    /// Still water everywhere; scenarios and tests use this.
    pub fn still(geom: FieldGeometry) -> Self {
        Self {
            cells: vec![(0.0, 0.0); geom.len()],
            geom,
        }
    }

    /// Nearest-cell lookup; `(0, 0)` outside the rectangle.
    #[must_use]
    pub fn sample(&self, x: f32, y: f32) -> (f32, f32) {
        self.geom
            .cell_index(x, y)
            .map_or((0.0, 0.0), |i| self.cells[i])
    }
}

fn fbm(noise: &impl Generator<2>, x: f32, y: f32, scale: f64, octaves: u32, persistence: f32) -> f32 {
    let mut total = 0.0f32;
    let mut amplitude = 1.0f32;
    let mut frequency = scale;
    let mut norm = 0.0f32;
    for _ in 0..octaves {
        total += amplitude * noise.sample([x as f64 * frequency, y as f64 * frequency]) as f32;
        norm += amplitude;
        amplitude *= persistence;
        frequency *= 2.0;
    }
    total / norm
}

/// Perpendicular nudge for the eddy layer, computed from the unmodified
/// vector so both components see the same input.
fn swirl_offsets(vx: f32, vy: f32, swirl: f32) -> (f32, f32) {
    (-vy * swirl, vx * swirl)
}

fn gaussian_blur_5x5(cells: &[f32], cols: usize, rows: usize) -> Vec<f32> {
    const SIGMA_SQ: f32 = 1.5 * 1.5;
    let mut out = Vec::with_capacity(cells.len());
    for cy in 0..rows as i64 {
        for cx in 0..cols as i64 {
            let mut sum = 0.0f32;
            let mut wsum = 0.0f32;
            for dy in -2i64..=2 {
                for dx in -2i64..=2 {
                    let gx = (cx + dx).clamp(0, cols as i64 - 1) as usize;
                    let gy = (cy + dy).clamp(0, rows as i64 - 1) as usize;
                    let w = (-((dx * dx + dy * dy) as f32) / (2.0 * SIGMA_SQ)).exp();
                    sum += w * cells[gy * cols + gx];
                    wsum += w;
                }
            }
            out.push(sum / wsum);
        }
    }
    out
}

/// Per-tick coral bleaching probability as a function of water temperature.
/// Banded curve: negligible below 0.5 degrees of warming, steep above 2.
#[must_use]
pub fn bleaching_probability(temperature: f32) -> f32 {
    let t = temperature;
    if t <= 0.0 {
        0.0
    } else if t < 0.5 {
        t * 1.0e-6
    } else if t < 1.0 {
        (1.0e-4 + (t - 0.5) / 0.5 * 9.0e-3) / 100.0
    } else if t < 2.0 {
        (0.01 + (t - 1.0) * 0.04) / 100.0
    } else {
        (0.05 + (t - 2.0).min(1.0) * 0.1) / 100.0
    }
}
