use crate::binner::TiledTriangle;
use crate::framebuffer::TileView;
use crate::gbuffer::{GBuffer, GBufferTileView};
use crate::rasterizer::{quad_lane_pixel, quad_sample_coords, rasterize_triangle};
use crate::shader::{
    interpolate_vertex_output, shade_surface, vertex_streams_valid, MAX_VERTEX_OUTPUT,
    SLOT_NORMAL, SLOT_WORLD,
};
use crate::state::{FragmentProgram, RenderState};
use crate::triangle::{
    FragmentCoverageMask, ProjectedTriangleInput, TriangleSimd, COVERAGE_BITS, COVERAGE_FULL,
};
use glam::{Vec3A, Vec4};

// G-buffer depth at or beyond this is far plane / no geometry.
const FAR_DEPTH: f32 = 0.99;

/// Geometry pass for one tile: identical to forward processing through the
/// depth test and depth write, but the sink is the G-buffer. World position
/// comes from vertex-output slots 7-9 and the normal from slots 4-6, stored
/// as interpolated (not normalized); albedo is the draw's constant diffuse.
pub(crate) fn process_tile_geometry(
    gview: &mut GBufferTileView,
    queue: &[TiledTriangle],
    state: &RenderState,
    input: &ProjectedTriangleInput,
    vertex_output_size: usize,
) {
    if !matches!(state.program(), FragmentProgram::GeometryPass) {
        return;
    }
    // Without world-position slots there is nothing to defer.
    if vertex_output_size < SLOT_WORLD + 3 {
        return;
    }

    let (tile_x0, tile_y0, tile_w, tile_h) = gview.rect();
    let stride = vertex_output_size.min(MAX_VERTEX_OUTPUT);

    for tiled in queue {
        let tri = &tiled.triangle;
        let Some(thread) = input.threads.get(tiled.thread_id as usize) else {
            debug_assert!(false, "binned triangle from unknown worker");
            continue;
        };
        if !vertex_streams_valid(tri.id, &thread.vertex_output, vertex_output_size, &thread.index_output) {
            debug_assert!(false, "triangle attribute streams out of range");
            continue;
        }

        let albedo = state.constant_diffuse(tri.constant_id);
        let simd = TriangleSimd::load(tri);
        rasterize_triangle(tile_x0, tile_y0, tile_w, tile_h, tri, &simd, |qx, qy, trivial| {
            let (sx, sy) = quad_sample_coords(qx, qy);
            let coverage = if trivial {
                COVERAGE_FULL
            } else {
                simd.test_quad(sx, sy)
            };

            let z = simd.depth_at(sx, sy);
            let current = gview.depth_quad(qx, qy);
            let depth_pass = z.cmplt(current).bitmask();

            let mut visibility = FragmentCoverageMask::default();
            for lane in 0..4 {
                if coverage & COVERAGE_BITS[lane] != 0 && depth_pass & (1 << lane) != 0 {
                    visibility.set(lane);
                    let (px, py) = quad_lane_pixel(qx, qy, lane);
                    gview.write_depth(px, py, z[lane]);
                }
            }
            if !visibility.any() {
                return;
            }

            let (alpha, beta, gamma) = simd.coordinates(sx, sy);
            let mut interpolated = [Vec4::ZERO; MAX_VERTEX_OUTPUT];
            if !interpolate_vertex_output(
                &mut interpolated[..stride],
                beta,
                gamma,
                alpha,
                tri.id,
                &thread.vertex_output,
                vertex_output_size,
                &thread.index_output,
            ) {
                return;
            }

            for lane in 0..4 {
                if !visibility.get(lane) {
                    continue;
                }
                let (px, py) = quad_lane_pixel(qx, qy, lane);
                let world = Vec3A::new(
                    interpolated[SLOT_WORLD][lane],
                    interpolated[SLOT_WORLD + 1][lane],
                    interpolated[SLOT_WORLD + 2][lane],
                );
                let normal = Vec3A::new(
                    interpolated[SLOT_NORMAL][lane],
                    interpolated[SLOT_NORMAL + 1][lane],
                    interpolated[SLOT_NORMAL + 2][lane],
                );
                gview.write_position(px, py, world);
                gview.write_normal(px, py, normal);
                gview.write_albedo(px, py, albedo);
            }
        });
    }
}

/// Lighting pass for one tile: read the G-buffer per pixel, accumulate the
/// state's lights and write the lit color to the framebuffer. Pixels at the
/// far plane are skipped and left untouched.
pub(crate) fn process_tile_lighting(view: &mut TileView, gbuffer: &GBuffer, state: &RenderState) {
    if !matches!(state.program(), FragmentProgram::LightingPass) {
        return;
    }

    let (x0, y0, w, h) = view.rect();
    for py in y0..y0 + h {
        for px in x0..x0 + w {
            if gbuffer.depth_at(px, py) >= FAR_DEPTH {
                continue;
            }
            let world = gbuffer.position_at(px, py);
            let normal = gbuffer.normal_at(px, py);
            let albedo = gbuffer.albedo_at(px, py);
            view.write_color(px, py, shade_surface(state, world, normal, albedo));
        }
    }
}
