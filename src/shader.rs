use crate::state::{FragmentProgram, LightType, RenderState};
use glam::{Vec3A, Vec4};
use std::sync::Arc;

// Vertex-output slot layout produced by the upstream vertex stage.
pub const SLOT_CLIP: usize = 0;
pub const SLOT_NORMAL: usize = 4;
pub const SLOT_WORLD: usize = 7;
pub const SLOT_UV: usize = 10;
pub const VERTEX_OUTPUT_SIZE: usize = 12;
pub const MAX_VERTEX_OUTPUT: usize = 16;

// Guards below which directions are left unnormalized and lights skipped.
const MIN_LENGTH: f32 = 1e-3;
const MIN_DECAY: f32 = 1e-2;
const MIN_ATTENUATION: f32 = 1e-3;

/// Interpolate one triangle's vertex outputs at the four samples of a quad.
///
/// `alpha`, `beta`, `gamma` are the per-sample barycentric weights of
/// vertices 0, 1, 2. Each `out[k]` receives attribute `k` for the four
/// samples. Returns false (writing nothing) when the triangle id or a
/// vertex index points outside the provided streams.
pub fn interpolate_vertex_output(
    out: &mut [Vec4],
    beta: Vec4,
    gamma: Vec4,
    alpha: Vec4,
    tri_id: u32,
    vertex_output: &[f32],
    stride: usize,
    index_output: &[u32],
) -> bool {
    let base = tri_id as usize * 3;
    let Some(indices) = index_output.get(base..base + 3) else {
        return false;
    };

    let mut vertex = [&[] as &[f32]; 3];
    for (slot, &index) in vertex.iter_mut().zip(indices) {
        let start = index as usize * stride;
        let Some(attrs) = vertex_output.get(start..start + stride) else {
            return false;
        };
        *slot = attrs;
    }

    for (k, slot) in out.iter_mut().enumerate().take(stride) {
        *slot = alpha * Vec4::splat(vertex[0][k])
            + beta * Vec4::splat(vertex[1][k])
            + gamma * Vec4::splat(vertex[2][k]);
    }
    true
}

/// Check one triangle's attribute streams before any fragment work: the
/// triangle id must address a full index triplet and every vertex index a
/// full attribute record.
pub(crate) fn vertex_streams_valid(
    tri_id: u32,
    vertex_output: &[f32],
    stride: usize,
    index_output: &[u32],
) -> bool {
    let base = tri_id as usize * 3;
    let Some(indices) = index_output.get(base..base + 3) else {
        return false;
    };
    indices
        .iter()
        .all(|&index| (index as usize + 1) * stride <= vertex_output.len())
}

/// `base^shininess` by repeated squaring, floor(log2 shininess) times.
/// Monotone in `base` and exact at power-of-two exponents.
pub fn specular_power(base: f32, shininess: f32) -> f32 {
    let mut power = base;
    let mut exponent = 1i32;
    while exponent < shininess as i32 {
        power *= power;
        exponent *= 2;
    }
    power
}

/// Blinn-Phong accumulation over the state's lights for one surface sample.
///
/// This is the single lighting core: the deferred lighting pass runs it per
/// G-buffer pixel and the shipped forward program runs it per covered lane,
/// so the two pipelines agree to floating-point noise. Returns clamped RGB
/// with the albedo's alpha carried through.
pub fn shade_surface(state: &RenderState, world: Vec3A, normal: Vec3A, albedo: Vec4) -> Vec4 {
    let normal = {
        let len = normal.length();
        if len > MIN_LENGTH {
            normal / len
        } else {
            normal
        }
    };

    let mut view = state.camera_position - world;
    let view_len = view.length();
    if view_len > MIN_LENGTH {
        view /= view_len;
    }

    let albedo_rgb = Vec3A::new(albedo.x, albedo.y, albedo.z);
    let mut color = Vec3A::ZERO;

    for light in &state.lights {
        let (light_dir, attenuation) = match light.light_type {
            LightType::Directional => (-light.direction, 1.0),
            LightType::Point | LightType::Spot => {
                let to_light = light.position - world;
                let distance = to_light.length();
                if distance <= MIN_LENGTH {
                    continue;
                }
                let dir = to_light / distance;

                let mut attenuation = 1.0;
                if light.decay > MIN_DECAY {
                    attenuation = (1.0 - distance / light.decay).max(0.0);
                }
                if light.light_type == LightType::Spot {
                    let cone_cos = dir.dot(-light.direction);
                    if cone_cos < light.outer_cone_angle {
                        attenuation = 0.0;
                    } else if cone_cos < light.inner_cone_angle {
                        attenuation *= (cone_cos - light.outer_cone_angle)
                            / (light.inner_cone_angle - light.outer_cone_angle);
                    }
                }
                (dir, attenuation)
            }
        };

        if attenuation <= MIN_ATTENUATION {
            continue;
        }

        let n_dot_l = normal.dot(light_dir);
        if n_dot_l > 0.0 {
            let diffuse = n_dot_l * attenuation * (1.0 - light.ambient);
            color += albedo_rgb * light.color * (light.intensity * diffuse);

            let half = light_dir + view;
            let half_len = half.length();
            if half_len > MIN_LENGTH {
                let half = half / half_len;
                let n_dot_h = normal.dot(half).max(0.0);
                let specular = specular_power(n_dot_h, state.shininess)
                    * n_dot_l
                    * attenuation
                    * light.intensity;
                color += state.specular_color * light.color * specular;
            }
        }

        // Flat ambient term, independent of N.L.
        color += light.color * light.ambient;
    }

    let color = color.clamp(Vec3A::ZERO, Vec3A::ONE);
    Vec4::new(color.x, color.y, color.z, albedo.w)
}

/// The shipped forward shading program: Blinn-Phong over the state's lights,
/// reading world position and normal from the interpolated vertex-output
/// slots and albedo from the draw's constant entry.
pub fn forward_lighting() -> FragmentProgram {
    FragmentProgram::UserDefined(Arc::new(|state, output, input, constant_id| {
        if input.len() < SLOT_WORLD + 3 {
            return;
        }
        let albedo = state.constant_diffuse(constant_id);
        for lane in 0..4 {
            let normal = Vec3A::new(
                input[SLOT_NORMAL][lane],
                input[SLOT_NORMAL + 1][lane],
                input[SLOT_NORMAL + 2][lane],
            );
            let world = Vec3A::new(
                input[SLOT_WORLD][lane],
                input[SLOT_WORLD + 1][lane],
                input[SLOT_WORLD + 2][lane],
            );
            let rgba = shade_surface(state, world, normal, albedo);
            output[lane] = rgba.x;
            output[lane + 4] = rgba.y;
            output[lane + 8] = rgba.z;
            output[lane + 12] = rgba.w;
        }
    }))
}
