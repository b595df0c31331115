//! Tile-based software rasterizer for indexed triangle meshes with
//! programmable fragment shading, in two interchangeable flavors: a
//! single-pass forward pipeline and a two-pass deferred pipeline built on a
//! G-buffer.
//!
//! Triangles arrive pre-projected in 28.4 fixed-point screen space, one
//! buffer per upstream worker ([`ProjectedTriangleInput`]). A batch renders
//! in phases: parallel binning into per-worker local bins, a serial merge
//! into per-tile queues (the deterministic depth tie-break order), then one
//! task per tile for each shading pass. Coverage is tested on 2x2
//! quad-fragments with an edge-function rasterizer applying the top-left
//! fill rule, so meshes are watertight across shared edges.

mod binner;
mod deferred;
mod forward;
mod framebuffer;
mod gbuffer;
mod rasterizer;
mod renderer;
mod shader;
mod state;
mod triangle;

pub use binner::{LocalBins, TileBins, TileGrid, TiledTriangle, DEFAULT_TILE_SIZE_LOG2};
pub use framebuffer::{FrameBuffer, TileView};
pub use gbuffer::{GBuffer, GBufferTileView};
pub use rasterizer::{quad_lane_pixel, quad_sample_coords, rasterize_triangle};
pub use renderer::{DeferredTiledRenderer, RenderError, Renderer, TiledRenderer};
pub use shader::{
    forward_lighting, interpolate_vertex_output, shade_surface, specular_power,
    MAX_VERTEX_OUTPUT, SLOT_CLIP, SLOT_NORMAL, SLOT_UV, SLOT_WORLD, VERTEX_OUTPUT_SIZE,
};
pub use state::{
    BoundProgram, ConstantEntry, FragmentProgram, Light, LightType, RenderState, ShadeFn,
};
pub use triangle::{
    FragmentCoverageMask, ProjectedTriangle, ProjectedTriangleInput, ThreadInput, TriangleSimd,
    COVERAGE_BITS, COVERAGE_FULL, HALF_PIXEL, ONE_HALF_PIXEL, SUBPIXEL_SCALE, SUBPIXEL_SHIFT,
};
