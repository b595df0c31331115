use glam::{Vec3A, Vec4};
use std::fmt;
use std::mem;
use std::ops::Deref;
use std::sync::Arc;

/// Fragment program entry point: `(state, output, input, constant_id)`.
///
/// `input` holds the interpolated vertex-output slots for one quad in SoA
/// order (slots 0-3 clip xyzw, 4-6 world normal, 7-9 world position, 10-11
/// UV), each `Vec4` carrying the four samples. `output` receives RGBA for
/// the four samples in SoA order: R0..R3, G0..G3, B0..B3, A0..A3.
pub type ShadeFn = dyn Fn(&RenderState, &mut [f32; 16], &[Vec4], u32) + Send + Sync;

/// The active fragment program, dispatched at tile-task entry. The geometry
/// and lighting passes are internal programs; user shading goes through
/// `UserDefined`.
#[derive(Clone, Default)]
pub enum FragmentProgram {
    #[default]
    None,
    GeometryPass,
    LightingPass,
    UserDefined(Arc<ShadeFn>),
}

impl fmt::Debug for FragmentProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::GeometryPass => f.write_str("GeometryPass"),
            Self::LightingPass => f.write_str("LightingPass"),
            Self::UserDefined(_) => f.write_str("UserDefined(..)"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum LightType {
    Point = 0,
    Directional = 1,
    Spot = 2,
}

/// Light record consumed by the lighting code. Cone angles are cosines.
#[derive(Clone, Copy, Debug)]
pub struct Light {
    pub position: Vec3A,
    pub direction: Vec3A,
    pub color: Vec3A,
    pub intensity: f32,
    pub ambient: f32,
    pub decay: f32,
    pub light_type: LightType,
    pub inner_cone_angle: f32,
    pub outer_cone_angle: f32,
}

impl Light {
    pub fn directional(direction: Vec3A, color: Vec3A, intensity: f32, ambient: f32) -> Self {
        Self {
            position: Vec3A::ZERO,
            direction,
            color,
            intensity,
            ambient,
            decay: 0.0,
            light_type: LightType::Directional,
            inner_cone_angle: 0.0,
            outer_cone_angle: 0.0,
        }
    }

    pub fn point(position: Vec3A, color: Vec3A, intensity: f32, ambient: f32, decay: f32) -> Self {
        Self {
            position,
            direction: Vec3A::ZERO,
            color,
            intensity,
            ambient,
            decay,
            light_type: LightType::Point,
            inner_cone_angle: 0.0,
            outer_cone_angle: 0.0,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn spot(
        position: Vec3A,
        direction: Vec3A,
        color: Vec3A,
        intensity: f32,
        ambient: f32,
        decay: f32,
        inner_cone_angle: f32,
        outer_cone_angle: f32,
    ) -> Self {
        Self {
            position,
            direction,
            color,
            intensity,
            ambient,
            decay,
            light_type: LightType::Spot,
            inner_cone_angle,
            outer_cone_angle,
        }
    }
}

/// Per-draw constants selected by a triangle's constant id.
#[derive(Clone, Copy, Debug)]
pub struct ConstantEntry {
    /// Material diffuse factor; stands in for a sampled texture.
    pub diffuse: Vec4,
}

impl Default for ConstantEntry {
    fn default() -> Self {
        Self { diffuse: Vec4::ONE }
    }
}

/// Render state shared by all tile tasks of a pass: the active fragment
/// program plus the lighting environment and per-draw constants.
pub struct RenderState {
    program: FragmentProgram,
    pub lights: Vec<Light>,
    pub camera_position: Vec3A,
    pub shininess: f32,
    pub specular_color: Vec3A,
    constants: Vec<ConstantEntry>,
}

impl Default for RenderState {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderState {
    pub fn new() -> Self {
        Self {
            program: FragmentProgram::None,
            lights: Vec::new(),
            camera_position: Vec3A::ZERO,
            shininess: 32.0,
            specular_color: Vec3A::splat(0.5),
            constants: Vec::new(),
        }
    }

    pub fn program(&self) -> &FragmentProgram {
        &self.program
    }

    pub fn set_program(&mut self, program: FragmentProgram) {
        self.program = program;
    }

    /// Diffuse factor for a constant id; an unbound id degrades to opaque
    /// white.
    pub fn constant_diffuse(&self, constant_id: u32) -> Vec4 {
        self.constants
            .get(constant_id as usize)
            .map_or(Vec4::ONE, |entry| entry.diffuse)
    }

    pub fn set_constant(&mut self, constant_id: u32, entry: ConstantEntry) {
        let index = constant_id as usize;
        if index >= self.constants.len() {
            self.constants.resize_with(index + 1, ConstantEntry::default);
        }
        self.constants[index] = entry;
    }

    /// Swap `program` into the fragment-program slot for the duration of the
    /// returned guard. The guard derefs to `&RenderState` for the parallel
    /// section and restores the previous program on every exit path.
    pub fn bind_program(&mut self, program: FragmentProgram) -> BoundProgram<'_> {
        let saved = mem::replace(&mut self.program, program);
        BoundProgram {
            state: self,
            saved: Some(saved),
        }
    }
}

/// Scoped hold on the render state's fragment-program slot.
pub struct BoundProgram<'a> {
    state: &'a mut RenderState,
    saved: Option<FragmentProgram>,
}

impl Deref for BoundProgram<'_> {
    type Target = RenderState;

    fn deref(&self) -> &RenderState {
        self.state
    }
}

impl Drop for BoundProgram<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.state.program = saved;
        }
    }
}
