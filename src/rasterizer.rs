use crate::triangle::{
    ProjectedTriangle, TriangleSimd, COVERAGE_FULL, HALF_PIXEL, ONE_HALF_PIXEL, SUBPIXEL_SHIFT,
};
use glam::IVec4;

// Triangles whose clipped bounds exceed this are walked in coarse blocks
// first, so fully-outside blocks skip the per-quad tests.
const COARSE_BLOCK_SIZE: i32 = 16;

/// Sample coordinates (28.4 fixed point) for the four pixel centers of the
/// quad with top-left origin (qx, qy), in order TL, TR, BL, BR.
#[inline]
pub fn quad_sample_coords(qx: i32, qy: i32) -> (IVec4, IVec4) {
    let bx = qx << SUBPIXEL_SHIFT;
    let by = qy << SUBPIXEL_SHIFT;
    (
        IVec4::new(bx + HALF_PIXEL, bx + ONE_HALF_PIXEL, bx + HALF_PIXEL, bx + ONE_HALF_PIXEL),
        IVec4::new(by + HALF_PIXEL, by + HALF_PIXEL, by + ONE_HALF_PIXEL, by + ONE_HALF_PIXEL),
    )
}

/// Pixel coordinate of quad sample `lane` (0 TL, 1 TR, 2 BL, 3 BR).
#[inline]
pub fn quad_lane_pixel(qx: i32, qy: i32, lane: usize) -> (i32, i32) {
    (qx + (lane as i32 & 1), qy + (lane as i32 >> 1))
}

/// Enumerate the quad fragments of `tri` that may generate coverage within
/// the pixel region (region_x0, region_y0, region_w, region_h).
///
/// The triangle's integer pixel bounding box is clipped to the region and
/// snapped down to even pixels, then quad origins are walked with step 2 in
/// both axes. For every quad with a nonzero coverage pattern the callback
/// receives (qx, qy, trivial_accept); trivial_accept reports that all four
/// sample centers are covered, so callers may substitute full coverage
/// without retesting.
pub fn rasterize_triangle<F>(
    region_x0: i32,
    region_y0: i32,
    region_w: i32,
    region_h: i32,
    tri: &ProjectedTriangle,
    simd: &TriangleSimd,
    mut emit: F,
) where
    F: FnMut(i32, i32, bool),
{
    let (min_x, min_y, max_x, max_y) = tri.pixel_bounds();

    let mut px0 = min_x.max(region_x0);
    let mut py0 = min_y.max(region_y0);
    let mut px1 = max_x.min(region_x0 + region_w - 1);
    let mut py1 = max_y.min(region_y0 + region_h - 1);

    // Align to quads.
    px0 &= !1;
    py0 &= !1;
    px1 &= !1;
    py1 &= !1;
    if px0 > px1 || py0 > py1 {
        return;
    }

    // Fine raster small triangles immediately.
    if px1 - px0 < COARSE_BLOCK_SIZE && py1 - py0 < COARSE_BLOCK_SIZE {
        fine_raster(simd, px0, py0, px1, py1, &mut emit);
        return;
    }

    // Coarse raster in blocks, rejecting blocks that lie entirely outside
    // one edge before any per-quad work.
    let mut by = py0;
    while by <= py1 {
        let by1 = (by + COARSE_BLOCK_SIZE - 2).min(py1);
        let mut bx = px0;
        while bx <= px1 {
            let bx1 = (bx + COARSE_BLOCK_SIZE - 2).min(px1);
            if !block_fully_outside(simd, bx, by, bx1, by1) {
                fine_raster(simd, bx, by, bx1, by1, &mut emit);
            }
            bx += COARSE_BLOCK_SIZE;
        }
        by += COARSE_BLOCK_SIZE;
    }
}

/// Walk the quad origins of an even-aligned inclusive pixel range.
fn fine_raster<F>(simd: &TriangleSimd, qx0: i32, qy0: i32, qx1: i32, qy1: i32, emit: &mut F)
where
    F: FnMut(i32, i32, bool),
{
    let mut qy = qy0;
    while qy <= qy1 {
        let mut qx = qx0;
        while qx <= qx1 {
            let (sx, sy) = quad_sample_coords(qx, qy);
            let pattern = simd.test_quad(sx, sy);
            if pattern != 0 {
                emit(qx, qy, pattern == COVERAGE_FULL);
            }
            qx += 2;
        }
        qy += 2;
    }
}

/// Evaluate the edge functions at the extreme sample centers of a block of
/// quad origins. Edge weights are linear, so if every corner sample lies
/// strictly outside one edge the whole block does.
fn block_fully_outside(simd: &TriangleSimd, qx0: i32, qy0: i32, qx1: i32, qy1: i32) -> bool {
    let x_min = (qx0 << SUBPIXEL_SHIFT) + HALF_PIXEL;
    let x_max = (qx1 << SUBPIXEL_SHIFT) + ONE_HALF_PIXEL;
    let y_min = (qy0 << SUBPIXEL_SHIFT) + HALF_PIXEL;
    let y_max = (qy1 << SUBPIXEL_SHIFT) + ONE_HALF_PIXEL;
    let corners_x = IVec4::new(x_min, x_max, x_min, x_max);
    let corners_y = IVec4::new(y_min, y_min, y_max, y_max);
    simd.any_edge_excludes(corners_x, corners_y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triangle::{COVERAGE_BITS, SUBPIXEL_SCALE};
    use glam::IVec2;
    use std::collections::HashSet;

    fn fixed(x: i32, y: i32) -> IVec2 {
        IVec2::new(x * SUBPIXEL_SCALE, y * SUBPIXEL_SCALE)
    }

    fn covered_pixels(tri: &ProjectedTriangle, w: i32, h: i32) -> HashSet<(i32, i32)> {
        let simd = TriangleSimd::load(tri);
        let mut pixels = HashSet::new();
        rasterize_triangle(0, 0, w, h, tri, &simd, |qx, qy, trivial| {
            let (sx, sy) = quad_sample_coords(qx, qy);
            let pattern = if trivial {
                COVERAGE_FULL
            } else {
                simd.test_quad(sx, sy)
            };
            for lane in 0..4 {
                if pattern & COVERAGE_BITS[lane] != 0 {
                    pixels.insert(quad_lane_pixel(qx, qy, lane));
                }
            }
        });
        pixels
    }

    /// Per-pixel reference coverage, bypassing the quad walk entirely.
    fn reference_pixels(tri: &ProjectedTriangle, w: i32, h: i32) -> HashSet<(i32, i32)> {
        let simd = TriangleSimd::load(tri);
        let mut pixels = HashSet::new();
        for y in 0..h {
            for x in 0..w {
                let sx = IVec4::splat(x * SUBPIXEL_SCALE + HALF_PIXEL);
                let sy = IVec4::splat(y * SUBPIXEL_SCALE + HALF_PIXEL);
                if simd.test_quad(sx, sy) & COVERAGE_BITS[0] != 0 {
                    pixels.insert((x, y));
                }
            }
        }
        pixels
    }

    #[test]
    fn quads_stay_inside_the_bounding_box() {
        let tri = ProjectedTriangle::setup(
            [fixed(5, 3), fixed(21, 9), fixed(9, 19)],
            0.5,
            0.0,
            0.0,
            0,
            0,
        )
        .unwrap();
        let simd = TriangleSimd::load(&tri);
        let (min_x, min_y, max_x, max_y) = tri.pixel_bounds();
        rasterize_triangle(0, 0, 64, 64, &tri, &simd, |qx, qy, _| {
            assert!(qx >= min_x - 1 && qx <= max_x);
            assert!(qy >= min_y - 1 && qy <= max_y);
        });
    }

    #[test]
    fn region_restricts_emitted_quads() {
        let tri = ProjectedTriangle::setup(
            [fixed(0, 0), fixed(40, 0), fixed(0, 40)],
            0.5,
            0.0,
            0.0,
            0,
            0,
        )
        .unwrap();
        let simd = TriangleSimd::load(&tri);
        rasterize_triangle(16, 16, 16, 16, &tri, &simd, |qx, qy, _| {
            assert!((16..32).contains(&qx));
            assert!((16..32).contains(&qy));
        });
    }

    #[test]
    fn coarse_and_reference_coverage_agree() {
        // Large enough to take the coarse-block path, with awkward slopes.
        for verts in [
            [fixed(1, 2), fixed(61, 7), fixed(13, 59)],
            [fixed(0, 0), fixed(63, 0), fixed(0, 63)],
            [fixed(30, 1), fixed(62, 62), fixed(2, 40)],
        ] {
            let tri = ProjectedTriangle::setup(verts, 0.5, 0.0, 0.0, 0, 0).unwrap();
            assert_eq!(
                covered_pixels(&tri, 64, 64),
                reference_pixels(&tri, 64, 64),
                "coverage mismatch for {verts:?}"
            );
        }
    }

    #[test]
    fn shared_edge_is_covered_exactly_once() {
        // Two triangles with consistent winding sharing the diagonal.
        let a = ProjectedTriangle::setup(
            [fixed(0, 0), fixed(32, 0), fixed(0, 32)],
            0.5,
            0.0,
            0.0,
            0,
            0,
        )
        .unwrap();
        let b = ProjectedTriangle::setup(
            [fixed(32, 0), fixed(32, 32), fixed(0, 32)],
            0.5,
            0.0,
            0.0,
            1,
            0,
        )
        .unwrap();

        let cov_a = covered_pixels(&a, 32, 32);
        let cov_b = covered_pixels(&b, 32, 32);
        assert!(!cov_a.is_empty() && !cov_b.is_empty());
        assert!(
            cov_a.is_disjoint(&cov_b),
            "samples on the shared edge must belong to exactly one triangle"
        );

        // Every interior pixel of the square belongs to one of the two.
        for y in 1..31 {
            for x in 1..31 {
                assert!(
                    cov_a.contains(&(x, y)) || cov_b.contains(&(x, y)),
                    "pixel ({x}, {y}) fell through the shared edge"
                );
            }
        }
    }

    #[test]
    fn trivial_accept_means_all_centers_covered() {
        let tri = ProjectedTriangle::setup(
            [fixed(0, 0), fixed(64, 0), fixed(0, 64)],
            0.5,
            0.0,
            0.0,
            0,
            0,
        )
        .unwrap();
        let simd = TriangleSimd::load(&tri);
        let mut saw_trivial = false;
        rasterize_triangle(0, 0, 64, 64, &tri, &simd, |qx, qy, trivial| {
            if trivial {
                saw_trivial = true;
                let (sx, sy) = quad_sample_coords(qx, qy);
                assert_eq!(simd.test_quad(sx, sy), COVERAGE_FULL);
            }
        });
        assert!(saw_trivial);
    }
}
