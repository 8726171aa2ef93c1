//! Spatial indexing for reef neighborhood queries.
//!
//! The simulation rebuilds the grid every few ticks, so lookups may be a few
//! ticks stale; callers re-validate hits against the live arenas.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors emitted by spatial index implementations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Indicates configuration values that cannot be used (e.g., non-positive cell size).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Geometry and occupancy limits for a [`HashGrid`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GridConfig {
    /// Edge length of each square cell, in world units.
    pub cell_size: f32,
    /// Lower-left corner of the covered rectangle.
    pub min: (f32, f32),
    /// Upper-right corner of the covered rectangle.
    pub max: (f32, f32),
    /// Hard cap on entries per cell; inserts beyond it are dropped.
    pub max_per_cell: usize,
}

impl GridConfig {
    fn validate(&self) -> Result<(), IndexError> {
        if !(self.cell_size > 0.0) {
            return Err(IndexError::InvalidConfig("cell_size must be positive"));
        }
        if self.min.0 >= self.max.0 || self.min.1 >= self.max.1 {
            return Err(IndexError::InvalidConfig("grid bounds must be non-empty"));
        }
        if self.max_per_cell == 0 {
            return Err(IndexError::InvalidConfig("max_per_cell must be at least 1"));
        }
        Ok(())
    }
}

/// Common behaviour exposed by neighborhood indices.
pub trait NeighborhoodIndex<K: Copy> {
    /// Drop all entries, keeping allocated cell storage.
    fn clear(&mut self);

    /// Bucket one keyed point. Out-of-bounds points snap to the edge cell;
    /// full cells drop the insert silently.
    fn insert(&mut self, key: K, x: f32, y: f32);

    /// Visit entries bucketed within the 3x3 neighborhood of `(x, y)` whose
    /// recorded position lies within the squared radius. Distances are the
    /// positions recorded at insert time.
    fn for_each_within(
        &self,
        x: f32,
        y: f32,
        radius_sq: f32,
        visitor: &mut dyn FnMut(K, OrderedFloat<f32>),
    );
}

/// Uniform grid with bounded cells over a fixed world rectangle.
#[derive(Debug, Clone)]
pub struct HashGrid<K: Copy> {
    config: GridConfig,
    cols: usize,
    rows: usize,
    cells: Vec<Vec<(K, f32, f32)>>,
    dropped: u64,
}

impl<K: Copy> HashGrid<K> {
    /// Build an empty grid covering the configured rectangle.
    pub fn new(config: GridConfig) -> Result<Self, IndexError> {
        config.validate()?;
        let cols = ((config.max.0 - config.min.0) / config.cell_size).ceil() as usize;
        let rows = ((config.max.1 - config.min.1) / config.cell_size).ceil() as usize;
        let cols = cols.max(1);
        let rows = rows.max(1);
        Ok(Self {
            config,
            cols,
            rows,
            cells: vec![Vec::new(); cols * rows],
            dropped: 0,
        })
    }

    /// Grid dimensions as `(columns, rows)`.
    #[must_use]
    pub fn dims(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    /// Cell coordinates covering a world position (edge-clamped).
    #[must_use]
    pub fn cell_of(&self, x: f32, y: f32) -> (usize, usize) {
        let cx = ((x - self.config.min.0) / self.config.cell_size).floor();
        let cy = ((y - self.config.min.1) / self.config.cell_size).floor();
        let cx = (cx.max(0.0) as usize).min(self.cols - 1);
        let cy = (cy.max(0.0) as usize).min(self.rows - 1);
        (cx, cy)
    }

    /// Entries bucketed in one cell.
    #[must_use]
    pub fn entries(&self, cx: usize, cy: usize) -> &[(K, f32, f32)] {
        &self.cells[cy * self.cols + cx]
    }

    /// Inserts dropped because their target cell was full.
    #[must_use]
    pub fn dropped_inserts(&self) -> u64 {
        self.dropped
    }

    /// Visit the up-to-nine cells around a world position.
    pub fn neighborhood(&self, x: f32, y: f32, visit: &mut dyn FnMut(&[(K, f32, f32)])) {
        let (cx, cy) = self.cell_of(x, y);
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                let nx = cx as i64 + dx;
                let ny = cy as i64 + dy;
                if nx < 0 || ny < 0 || nx >= self.cols as i64 || ny >= self.rows as i64 {
                    continue;
                }
                visit(self.entries(nx as usize, ny as usize));
            }
        }
    }
}

impl<K: Copy> NeighborhoodIndex<K> for HashGrid<K> {
    fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
        self.dropped = 0;
    }

    fn insert(&mut self, key: K, x: f32, y: f32) {
        let (cx, cy) = self.cell_of(x, y);
        let cell = &mut self.cells[cy * self.cols + cx];
        if cell.len() >= self.config.max_per_cell {
            self.dropped += 1;
            return;
        }
        cell.push((key, x, y));
    }

    fn for_each_within(
        &self,
        x: f32,
        y: f32,
        radius_sq: f32,
        visitor: &mut dyn FnMut(K, OrderedFloat<f32>),
    ) {
        self.neighborhood(x, y, &mut |entries| {
            for &(key, ex, ey) in entries {
                let dx = ex - x;
                let dy = ey - y;
                let dist_sq = dx * dx + dy * dy;
                if dist_sq <= radius_sq {
                    visitor(key, OrderedFloat(dist_sq));
                }
            }
        });
    }
}
