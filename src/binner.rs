use crate::triangle::{ProjectedTriangle, ThreadInput};

pub const DEFAULT_TILE_SIZE_LOG2: u32 = 5;

/// Partition of a W x H raster into power-of-two sized tiles.
#[derive(Clone, Copy, Debug)]
pub struct TileGrid {
    pub width: i32,
    pub height: i32,
    pub tile_size_log2: u32,
    pub grid_width: i32,
    pub grid_height: i32,
}

impl TileGrid {
    pub fn new(width: i32, height: i32, tile_size_log2: u32) -> Self {
        let tile_size = 1 << tile_size_log2;
        let grid_width = (width + tile_size - 1) >> tile_size_log2;
        let grid_height = (height + tile_size - 1) >> tile_size_log2;
        Self {
            width,
            height,
            tile_size_log2,
            grid_width,
            grid_height,
        }
    }

    pub fn tile_size(&self) -> i32 {
        1 << self.tile_size_log2
    }

    pub fn tile_count(&self) -> usize {
        (self.grid_width * self.grid_height) as usize
    }

    /// Pixel rectangle (x0, y0, w, h) of a tile, clipped to the raster.
    pub fn tile_rect(&self, tile_id: usize) -> (i32, i32, i32, i32) {
        let tile_x = tile_id as i32 % self.grid_width;
        let tile_y = tile_id as i32 / self.grid_width;
        let x0 = tile_x << self.tile_size_log2;
        let y0 = tile_y << self.tile_size_log2;
        let w = self.tile_size().min(self.width - x0);
        let h = self.tile_size().min(self.height - y0);
        (x0, y0, w, h)
    }
}

/// A triangle queued for one tile, with its origin preserved so the tile
/// processor can resolve attributes from the right worker's streams.
#[derive(Clone, Copy)]
pub struct TiledTriangle {
    pub triangle: ProjectedTriangle,
    pub thread_id: u32,
    pub tri_index: u32,
}

/// One worker's bin arena: a flat bump buffer of (tile, record) pairs in
/// arrival order plus a per-tile count index used to size the merge. The
/// arena keeps its capacity across frames; `reset` never frees.
pub struct LocalBins {
    entries: Vec<(u32, TiledTriangle)>,
    counts: Vec<u32>,
}

impl LocalBins {
    pub fn new(tile_count: usize) -> Self {
        Self {
            entries: Vec::new(),
            counts: vec![0; tile_count],
        }
    }

    pub fn resize(&mut self, tile_count: usize) {
        self.entries.clear();
        self.counts.clear();
        self.counts.resize(tile_count, 0);
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.counts.fill(0);
    }

    pub fn count(&self, tile_id: usize) -> u32 {
        self.counts[tile_id]
    }

    /// Bin every triangle of one worker's buffer: clamp the pixel bounding
    /// box to the raster, convert to tile coordinates, and append a record
    /// for every touched tile. Fully off-screen triangles are dropped here.
    pub fn bin_thread(&mut self, thread_id: u32, input: &ThreadInput, grid: &TileGrid) {
        for (tri_index, tri) in input.triangles.iter().enumerate() {
            let (min_x, min_y, max_x, max_y) = tri.pixel_bounds();

            let min_x = min_x.max(0);
            let max_x = max_x.min(grid.width - 1);
            let min_y = min_y.max(0);
            let max_y = max_y.min(grid.height - 1);
            if min_x > max_x || min_y > max_y {
                continue;
            }

            let tile_min_x = min_x >> grid.tile_size_log2;
            let tile_max_x = max_x >> grid.tile_size_log2;
            let tile_min_y = min_y >> grid.tile_size_log2;
            let tile_max_y = max_y >> grid.tile_size_log2;

            let record = TiledTriangle {
                triangle: *tri,
                thread_id,
                tri_index: tri_index as u32,
            };
            for tile_y in tile_min_y..=tile_max_y {
                for tile_x in tile_min_x..=tile_max_x {
                    let tile_id = (tile_y * grid.grid_width + tile_x) as u32;
                    debug_assert!((tile_id as usize) < self.counts.len());
                    self.entries.push((tile_id, record));
                    self.counts[tile_id as usize] += 1;
                }
            }
        }
    }

    pub fn entries(&self) -> &[(u32, TiledTriangle)] {
        &self.entries
    }
}

/// Global per-tile queues. Written only by the serial merge; read-only
/// during the parallel tile passes.
#[derive(Default)]
pub struct TileBins {
    queues: Vec<Vec<TiledTriangle>>,
}

impl TileBins {
    pub fn new(tile_count: usize) -> Self {
        let mut queues = Vec::with_capacity(tile_count);
        queues.resize_with(tile_count, Vec::new);
        Self { queues }
    }

    pub fn resize(&mut self, tile_count: usize) {
        self.queues.clear();
        self.queues.resize_with(tile_count, Vec::new);
    }

    pub fn clear(&mut self) {
        for queue in &mut self.queues {
            queue.clear();
        }
    }

    pub fn queue(&self, tile_id: usize) -> &[TiledTriangle] {
        &self.queues[tile_id]
    }

    /// Concatenate local bins into the per-tile queues, outer loop over
    /// thread id ascending, inner loop in each thread's arrival order. This
    /// order is deterministic across runs and is the tie-break for depth
    /// equality.
    pub fn merge(&mut self, locals: &[LocalBins]) {
        for (tile_id, queue) in self.queues.iter_mut().enumerate() {
            queue.clear();
            let total: u32 = locals.iter().map(|l| l.count(tile_id)).sum();
            queue.reserve(total as usize);
        }
        for local in locals {
            for &(tile_id, record) in local.entries() {
                self.queues[tile_id as usize].push(record);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triangle::{ProjectedTriangle, SUBPIXEL_SCALE};
    use glam::IVec2;

    fn tri_at(px0: i32, py0: i32, px1: i32, py1: i32) -> ProjectedTriangle {
        let s = SUBPIXEL_SCALE;
        ProjectedTriangle::setup(
            [
                IVec2::new(px0 * s, py0 * s),
                IVec2::new(px1 * s, py0 * s),
                IVec2::new(px0 * s, py1 * s),
            ],
            0.5,
            0.0,
            0.0,
            0,
            0,
        )
        .unwrap()
    }

    fn input_with(triangles: Vec<ProjectedTriangle>) -> ThreadInput {
        ThreadInput {
            triangles,
            ..Default::default()
        }
    }

    #[test]
    fn triangle_lands_in_every_touched_tile_once() {
        let grid = TileGrid::new(64, 64, 5);
        let mut bins = LocalBins::new(grid.tile_count());
        // Spans all four tiles of a 64x64 target.
        bins.bin_thread(0, &input_with(vec![tri_at(8, 8, 56, 56)]), &grid);

        assert_eq!(bins.entries().len(), 4);
        for tile_id in 0..4 {
            assert_eq!(bins.count(tile_id), 1);
        }
    }

    #[test]
    fn off_screen_triangles_are_dropped() {
        let grid = TileGrid::new(64, 64, 5);
        let mut bins = LocalBins::new(grid.tile_count());
        bins.bin_thread(0, &input_with(vec![tri_at(-40, -40, -8, -8)]), &grid);
        assert!(bins.entries().is_empty());

        bins.bin_thread(0, &input_with(vec![tri_at(100, 100, 140, 140)]), &grid);
        assert!(bins.entries().is_empty());
    }

    #[test]
    fn bbox_is_clamped_to_the_grid() {
        let grid = TileGrid::new(64, 64, 5);
        let mut bins = LocalBins::new(grid.tile_count());
        // Overhangs every raster edge; must still only touch valid tiles.
        bins.bin_thread(0, &input_with(vec![tri_at(-32, -32, 96, 96)]), &grid);
        for &(tile_id, _) in bins.entries() {
            assert!((tile_id as usize) < grid.tile_count());
        }
    }

    #[test]
    fn merge_preserves_thread_then_arrival_order() {
        let grid = TileGrid::new(32, 32, 5);
        let mut locals = vec![LocalBins::new(1), LocalBins::new(1)];
        locals[0].bin_thread(0, &input_with(vec![tri_at(0, 0, 8, 8), tri_at(2, 2, 10, 10)]), &grid);
        locals[1].bin_thread(1, &input_with(vec![tri_at(4, 4, 12, 12)]), &grid);

        let mut bins = TileBins::new(1);
        bins.merge(&locals);

        let order: Vec<(u32, u32)> = bins
            .queue(0)
            .iter()
            .map(|t| (t.thread_id, t.tri_index))
            .collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (1, 0)]);

        // Merging again after a reset must not leak the previous frame.
        for local in &mut locals {
            local.reset();
        }
        bins.merge(&locals);
        assert!(bins.queue(0).is_empty());
    }
}
