use crate::binner::TiledTriangle;
use crate::framebuffer::TileView;
use crate::rasterizer::{quad_lane_pixel, quad_sample_coords, rasterize_triangle};
use crate::shader::{interpolate_vertex_output, vertex_streams_valid, MAX_VERTEX_OUTPUT};
use crate::state::{FragmentProgram, RenderState, ShadeFn};
use crate::triangle::{
    FragmentCoverageMask, ProjectedTriangleInput, TriangleSimd, COVERAGE_BITS, COVERAGE_FULL,
};
use glam::Vec4;

/// Forward-shade one tile: depth test, attribute interpolation, fragment
/// program invocation and color/depth writes, triangle by triangle in the
/// queue's merged submission order.
///
/// Without an active user program the task returns without side effects.
pub(crate) fn process_tile(
    view: &mut TileView,
    queue: &[TiledTriangle],
    state: &RenderState,
    input: &ProjectedTriangleInput,
    vertex_output_size: usize,
) {
    let FragmentProgram::UserDefined(program) = state.program() else {
        return;
    };
    let shade: &ShadeFn = &**program;

    let (tile_x0, tile_y0, tile_w, tile_h) = view.rect();
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

        let simd = TriangleSimd::load(tri);
        rasterize_triangle(tile_x0, tile_y0, tile_w, tile_h, tri, &simd, |qx, qy, trivial| {
            let (sx, sy) = quad_sample_coords(qx, qy);
            let coverage = if trivial {
                COVERAGE_FULL
            } else {
                simd.test_quad(sx, sy)
            };

            let z = simd.depth_at(sx, sy);
            let current = view.depth_quad(qx, qy);
            let depth_pass = z.cmplt(current).bitmask();

            let mut visibility = FragmentCoverageMask::default();
            for lane in 0..4 {
                if coverage & COVERAGE_BITS[lane] != 0 && depth_pass & (1 << lane) != 0 {
                    visibility.set(lane);
                    let (px, py) = quad_lane_pixel(qx, qy, lane);
                    view.write_depth(px, py, z[lane]);
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

            let mut shaded = [0.0f32; 16];
            shade(state, &mut shaded, &interpolated[..stride], tri.constant_id);

            for lane in 0..4 {
                if visibility.get(lane) {
                    let (px, py) = quad_lane_pixel(qx, qy, lane);
                    view.write_color(
                        px,
                        py,
                        Vec4::new(
                            shaded[lane],
                            shaded[lane + 4],
                            shaded[lane + 8],
                            shaded[lane + 12],
                        ),
                    );
                }
            }
        });
    }
}
