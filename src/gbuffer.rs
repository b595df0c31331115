use crate::binner::TileGrid;
use crate::rasterizer::quad_lane_pixel;
use glam::{Vec3A, Vec4};
use std::marker::PhantomData;

/// Per-pixel geometric record written by the deferred geometry pass and read
/// by the screen-space lighting pass: world position, world normal (stored
/// as written, not normalized), albedo (alpha carried through to the final
/// image) and depth, with 1.0 meaning far/empty.
pub struct GBuffer {
    width: usize,
    height: usize,
    position: Vec<Vec3A>,
    normal: Vec<Vec3A>,
    albedo: Vec<Vec4>,
    depth: Vec<f32>,
}

impl GBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        let pixel_count = width * height;
        Self {
            width,
            height,
            position: vec![Vec3A::ZERO; pixel_count],
            normal: vec![Vec3A::Z; pixel_count],
            albedo: vec![Vec4::ZERO; pixel_count],
            depth: vec![1.0; pixel_count],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn clear(&mut self) {
        self.position.fill(Vec3A::ZERO);
        self.normal.fill(Vec3A::Z);
        self.albedo.fill(Vec4::ZERO);
        self.depth.fill(1.0);
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return None;
        }
        Some(y as usize * self.width + x as usize)
    }

    pub fn position_at(&self, x: i32, y: i32) -> Vec3A {
        self.index(x, y).map_or(Vec3A::ZERO, |i| self.position[i])
    }

    pub fn normal_at(&self, x: i32, y: i32) -> Vec3A {
        self.index(x, y).map_or(Vec3A::Z, |i| self.normal[i])
    }

    pub fn albedo_at(&self, x: i32, y: i32) -> Vec4 {
        self.index(x, y).map_or(Vec4::ZERO, |i| self.albedo[i])
    }

    pub fn depth_at(&self, x: i32, y: i32) -> f32 {
        self.index(x, y).map_or(1.0, |i| self.depth[i])
    }

    /// Per-tile write leases for the geometry pass; same partitioning
    /// contract as `FrameBuffer::tile_views`.
    pub fn tile_views<'a>(&'a mut self, grid: &TileGrid) -> Vec<GBufferTileView<'a>> {
        debug_assert_eq!(grid.width as usize, self.width);
        debug_assert_eq!(grid.height as usize, self.height);
        let position = self.position.as_mut_ptr();
        let normal = self.normal.as_mut_ptr();
        let albedo = self.albedo.as_mut_ptr();
        let depth = self.depth.as_mut_ptr();
        (0..grid.tile_count())
            .map(|tile_id| {
                let (x0, y0, w, h) = grid.tile_rect(tile_id);
                GBufferTileView {
                    tile_id,
                    x0,
                    y0,
                    w,
                    h,
                    stride: self.width,
                    position,
                    normal,
                    albedo,
                    depth,
                    _marker: PhantomData,
                }
            })
            .collect()
    }
}

/// Exclusive lease on one tile's pixel rectangle of a G-buffer.
pub struct GBufferTileView<'a> {
    tile_id: usize,
    x0: i32,
    y0: i32,
    w: i32,
    h: i32,
    stride: usize,
    position: *mut Vec3A,
    normal: *mut Vec3A,
    albedo: *mut Vec4,
    depth: *mut f32,
    _marker: PhantomData<&'a mut GBuffer>,
}

// Safety: same disjoint-rectangle argument as `TileView`.
unsafe impl Send for GBufferTileView<'_> {}

impl GBufferTileView<'_> {
    pub fn tile_id(&self) -> usize {
        self.tile_id
    }

    pub fn rect(&self) -> (i32, i32, i32, i32) {
        (self.x0, self.y0, self.w, self.h)
    }

    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x0 && x < self.x0 + self.w && y >= self.y0 && y < self.y0 + self.h
    }

    /// Current G-buffer depth for the four pixels of the quad at (qx, qy).
    /// Lanes outside the rectangle read -infinity.
    pub fn depth_quad(&self, qx: i32, qy: i32) -> Vec4 {
        let mut out = [f32::NEG_INFINITY; 4];
        for (lane, slot) in out.iter_mut().enumerate() {
            let (x, y) = quad_lane_pixel(qx, qy, lane);
            if self.contains(x, y) {
                *slot = unsafe { *self.depth.add(y as usize * self.stride + x as usize) };
            }
        }
        Vec4::from_array(out)
    }

    #[inline]
    fn checked_index(&self, x: i32, y: i32) -> Option<usize> {
        if !self.contains(x, y) {
            debug_assert!(false, "G-buffer write outside tile rectangle");
            return None;
        }
        Some(y as usize * self.stride + x as usize)
    }

    pub fn write_depth(&mut self, x: i32, y: i32, z: f32) {
        if let Some(i) = self.checked_index(x, y) {
            unsafe { *self.depth.add(i) = z };
        }
    }

    pub fn write_position(&mut self, x: i32, y: i32, position: Vec3A) {
        if let Some(i) = self.checked_index(x, y) {
            unsafe { *self.position.add(i) = position };
        }
    }

    pub fn write_normal(&mut self, x: i32, y: i32, normal: Vec3A) {
        if let Some(i) = self.checked_index(x, y) {
            unsafe { *self.normal.add(i) = normal };
        }
    }

    pub fn write_albedo(&mut self, x: i32, y: i32, albedo: Vec4) {
        if let Some(i) = self.checked_index(x, y) {
            unsafe { *self.albedo.add(i) = albedo };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_resets_to_far_plane_defaults() {
        let mut gbuffer = GBuffer::new(4, 4);
        let grid = TileGrid::new(4, 4, 2);
        {
            let mut views = gbuffer.tile_views(&grid);
            views[0].write_depth(1, 1, 0.25);
            views[0].write_normal(1, 1, Vec3A::X);
            views[0].write_albedo(1, 1, Vec4::ONE);
        }
        assert_eq!(gbuffer.depth_at(1, 1), 0.25);

        gbuffer.clear();
        assert_eq!(gbuffer.depth_at(1, 1), 1.0);
        assert_eq!(gbuffer.normal_at(1, 1), Vec3A::Z);
        assert_eq!(gbuffer.albedo_at(1, 1), Vec4::ZERO);
    }

    #[test]
    fn out_of_bounds_reads_return_defaults() {
        let gbuffer = GBuffer::new(4, 4);
        assert_eq!(gbuffer.depth_at(-1, 0), 1.0);
        assert_eq!(gbuffer.normal_at(10, 10), Vec3A::Z);
    }
}
