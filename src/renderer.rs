use crate::binner::{LocalBins, TileBins, TileGrid, DEFAULT_TILE_SIZE_LOG2};
use crate::deferred;
use crate::forward;
use crate::framebuffer::FrameBuffer;
use crate::gbuffer::GBuffer;
use crate::state::{FragmentProgram, RenderState};
use crate::triangle::ProjectedTriangleInput;
use glam::Vec4;
use rayon::prelude::*;
use std::error::Error;
use std::fmt;

/// Fatal configuration errors, reported before any tile task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderError {
    FramebufferNotSet,
    DimensionMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
    WorkerCountMismatch {
        expected: usize,
        actual: usize,
    },
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FramebufferNotSet => write!(f, "no framebuffer has been set"),
            Self::DimensionMismatch { expected, actual } => write!(
                f,
                "render target is {}x{} but the renderer was configured for {}x{}",
                actual.0, actual.1, expected.0, expected.1
            ),
            Self::WorkerCountMismatch { expected, actual } => write!(
                f,
                "input carries {actual} worker buffers but the renderer has {expected} workers"
            ),
        }
    }
}

impl Error for RenderError {}

/// The polymorphic renderer interface. The framebuffer is passed into each
/// call; its `&mut` borrow pins it for the duration of the render.
pub trait Renderer {
    /// Recompute the tile grid for a render target, size the global and
    /// per-worker bins, and clear depth. Deferred implementations also
    /// allocate a matching G-buffer.
    fn set_frame_buffer(&mut self, fb: &mut FrameBuffer);

    /// Clear the framebuffer planes (and the G-buffer, where present), and
    /// drop any queued triangles.
    fn clear(&mut self, fb: &mut FrameBuffer, color: Vec4, clear_color: bool, clear_depth: bool);

    /// Run the full pass pipeline over one projected batch.
    fn render_projected_batch(
        &mut self,
        state: &mut RenderState,
        fb: &mut FrameBuffer,
        input: &ProjectedTriangleInput,
        vertex_output_size: usize,
    ) -> Result<(), RenderError>;

    /// Flush deferred writes. All writes in this design land during the tile
    /// passes, so this is a no-op kept for interface completeness.
    fn finish(&mut self);
}

/// Binning state and worker pool shared by both pipelines.
struct TileScheduler {
    cores: usize,
    tile_size_log2: u32,
    grid: Option<TileGrid>,
    local_bins: Vec<LocalBins>,
    bins: TileBins,
    pool: rayon::ThreadPool,
}

impl TileScheduler {
    fn new(cores: usize, tile_size_log2: u32) -> Self {
        let cores = cores.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(cores)
            .build()
            .expect("failed to build the worker pool");
        let mut local_bins = Vec::with_capacity(cores);
        local_bins.resize_with(cores, || LocalBins::new(0));
        Self {
            cores,
            tile_size_log2,
            grid: None,
            local_bins,
            bins: TileBins::default(),
            pool,
        }
    }

    fn configure(&mut self, fb: &FrameBuffer) -> TileGrid {
        let grid = TileGrid::new(fb.width() as i32, fb.height() as i32, self.tile_size_log2);
        log::debug!(
            "render target {}x{}: {}x{} tiles of {} px, {} workers",
            fb.width(),
            fb.height(),
            grid.grid_width,
            grid.grid_height,
            grid.tile_size(),
            self.cores
        );
        self.bins.resize(grid.tile_count());
        for bins in &mut self.local_bins {
            bins.resize(grid.tile_count());
        }
        self.grid = Some(grid);
        grid
    }

    /// Validate the batch configuration and return the grid, or the fatal
    /// error that aborts the frame before any tile task runs.
    fn check_batch(
        &self,
        fb: &FrameBuffer,
        input: &ProjectedTriangleInput,
    ) -> Result<TileGrid, RenderError> {
        let grid = self.grid.ok_or(RenderError::FramebufferNotSet)?;
        let expected = (grid.width as usize, grid.height as usize);
        let actual = (fb.width(), fb.height());
        if expected != actual {
            return Err(RenderError::DimensionMismatch { expected, actual });
        }
        if input.worker_count() != self.cores {
            return Err(RenderError::WorkerCountMismatch {
                expected: self.cores,
                actual: input.worker_count(),
            });
        }
        Ok(grid)
    }

    /// Phases 1 and 2: parallel binning into per-worker local bins, then the
    /// serial deterministic merge into the global per-tile queues.
    fn bin_and_merge(&mut self, input: &ProjectedTriangleInput, grid: TileGrid) {
        for bins in &mut self.local_bins {
            bins.reset();
        }
        self.bins.clear();

        let local_bins = &mut self.local_bins;
        self.pool.install(|| {
            local_bins
                .par_iter_mut()
                .enumerate()
                .for_each(|(thread_id, bins)| {
                    bins.bin_thread(thread_id as u32, &input.threads[thread_id], &grid);
                });
        });

        self.bins.merge(&self.local_bins);
    }
}

/// Single-pass forward renderer: bin, merge, then one shading task per tile.
pub struct TiledRenderer {
    scheduler: TileScheduler,
}

impl TiledRenderer {
    pub fn new(cores: usize) -> Self {
        Self::with_tile_size(cores, DEFAULT_TILE_SIZE_LOG2)
    }

    pub fn with_tile_size(cores: usize, tile_size_log2: u32) -> Self {
        Self {
            scheduler: TileScheduler::new(cores, tile_size_log2),
        }
    }
}

impl Renderer for TiledRenderer {
    fn set_frame_buffer(&mut self, fb: &mut FrameBuffer) {
        self.scheduler.configure(fb);
        fb.clear_depth();
    }

    fn clear(&mut self, fb: &mut FrameBuffer, color: Vec4, clear_color: bool, clear_depth: bool) {
        fb.clear(color, clear_color, clear_depth);
        self.scheduler.bins.clear();
    }

    fn render_projected_batch(
        &mut self,
        state: &mut RenderState,
        fb: &mut FrameBuffer,
        input: &ProjectedTriangleInput,
        vertex_output_size: usize,
    ) -> Result<(), RenderError> {
        let grid = self.scheduler.check_batch(fb, input)?;
        self.scheduler.bin_and_merge(input, grid);

        let bins = &self.scheduler.bins;
        let state: &RenderState = state;
        let views = fb.tile_views(&grid);
        self.scheduler.pool.install(|| {
            views.into_par_iter().with_max_len(1).for_each(|mut view| {
                let tile_id = view.tile_id();
                forward::process_tile(&mut view, bins.queue(tile_id), state, input, vertex_output_size);
            });
        });
        Ok(())
    }

    fn finish(&mut self) {}
}

/// Two-pass deferred renderer: the geometry pass fills the G-buffer, the
/// lighting pass shades it in screen space.
pub struct DeferredTiledRenderer {
    scheduler: TileScheduler,
    gbuffer: Option<GBuffer>,
}

impl DeferredTiledRenderer {
    pub fn new(cores: usize) -> Self {
        Self::with_tile_size(cores, DEFAULT_TILE_SIZE_LOG2)
    }

    pub fn with_tile_size(cores: usize, tile_size_log2: u32) -> Self {
        Self {
            scheduler: TileScheduler::new(cores, tile_size_log2),
            gbuffer: None,
        }
    }

    /// The G-buffer of the last configured render target, for inspection.
    pub fn gbuffer(&self) -> Option<&GBuffer> {
        self.gbuffer.as_ref()
    }
}

impl Renderer for DeferredTiledRenderer {
    fn set_frame_buffer(&mut self, fb: &mut FrameBuffer) {
        self.scheduler.configure(fb);
        fb.clear_depth();
        let mut gbuffer = GBuffer::new(fb.width(), fb.height());
        gbuffer.clear();
        self.gbuffer = Some(gbuffer);
    }

    fn clear(&mut self, fb: &mut FrameBuffer, color: Vec4, clear_color: bool, clear_depth: bool) {
        fb.clear(color, clear_color, clear_depth);
        if let Some(gbuffer) = &mut self.gbuffer {
            gbuffer.clear();
        }
        self.scheduler.bins.clear();
    }

    fn render_projected_batch(
        &mut self,
        state: &mut RenderState,
        fb: &mut FrameBuffer,
        input: &ProjectedTriangleInput,
        vertex_output_size: usize,
    ) -> Result<(), RenderError> {
        let grid = self.scheduler.check_batch(fb, input)?;
        let Some(gbuffer) = self.gbuffer.as_mut() else {
            return Err(RenderError::FramebufferNotSet);
        };
        if (gbuffer.width(), gbuffer.height()) != (fb.width(), fb.height()) {
            return Err(RenderError::DimensionMismatch {
                expected: (gbuffer.width(), gbuffer.height()),
                actual: (fb.width(), fb.height()),
            });
        }

        self.scheduler.bin_and_merge(input, grid);
        let bins = &self.scheduler.bins;
        let pool = &self.scheduler.pool;

        // Geometry pass: one task per tile, writing the G-buffer.
        {
            let bound = state.bind_program(FragmentProgram::GeometryPass);
            let bound = &bound;
            let gviews = gbuffer.tile_views(&grid);
            pool.install(|| {
                gviews.into_par_iter().with_max_len(1).for_each(|mut gview| {
                    let tile_id = gview.tile_id();
                    deferred::process_tile_geometry(
                        &mut gview,
                        bins.queue(tile_id),
                        bound,
                        input,
                        vertex_output_size,
                    );
                });
            });
        }

        // Lighting pass: skipped entirely when there are no lights.
        if !state.lights.is_empty() {
            let bound = state.bind_program(FragmentProgram::LightingPass);
            let bound = &bound;
            let gbuffer: &GBuffer = gbuffer;
            let views = fb.tile_views(&grid);
            pool.install(|| {
                views.into_par_iter().with_max_len(1).for_each(|mut view| {
                    deferred::process_tile_lighting(&mut view, gbuffer, bound);
                });
            });
        } else {
            log::warn!("deferred batch rendered without lights; lighting pass skipped");
        }

        Ok(())
    }

    fn finish(&mut self) {}
}
