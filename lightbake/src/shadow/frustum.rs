use std::f32::consts::FRAC_PI_2;

use glam::{Mat3, Mat4, Vec3};

use crate::config::DirectionalShadowConfig;

/// Cube faces in array layer order: +X, -X, +Y, -Y, +Z, -Z.
///
/// Each entry holds the rows of the face basis: the horizontal texture axis,
/// the negated vertical texture axis and the major axis. Texture rows grow
/// downward, hence the negation.
const CUBE_FACE_ROWS: [[Vec3; 3]; 6] = [
    [Vec3::NEG_Z, Vec3::Y, Vec3::X],
    [Vec3::Z, Vec3::Y, Vec3::NEG_X],
    [Vec3::X, Vec3::NEG_Z, Vec3::Y],
    [Vec3::X, Vec3::Z, Vec3::NEG_Y],
    [Vec3::X, Vec3::Y, Vec3::Z],
    [Vec3::NEG_X, Vec3::Y, Vec3::NEG_Z],
];

fn look_at(eye: Vec3, direction: Vec3) -> Mat4 {
    let up = if direction.dot(Vec3::Y).abs() > 0.999 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    Mat4::look_at_rh(eye, eye + direction, up)
}

/// Orthographic light space for a directional light looking along
/// `direction` from `standoff` units behind the origin.
pub fn directional_view_proj(direction: Vec3, config: &DirectionalShadowConfig) -> Mat4 {
    let e = config.half_extent;
    let projection = Mat4::orthographic_rh(-e, e, -e, e, config.near, config.far);
    projection * look_at(-direction * config.standoff, direction)
}

/// Perspective light space covering a spot cone of `outer_cutoff` degrees.
pub fn spot_view_proj(
    position: Vec3,
    direction: Vec3,
    outer_cutoff: f32,
    aspect: f32,
    near: f32,
    far: f32,
) -> Mat4 {
    let fov = (2.0 * outer_cutoff).to_radians();
    Mat4::perspective_rh(fov, aspect, near, far) * look_at(position, direction)
}

/// One view projection per cube face, sharing `near` and `far`.
pub fn cube_face_view_projs(position: Vec3, near: f32, far: f32) -> [Mat4; 6] {
    let projection = Mat4::perspective_lh(FRAC_PI_2, 1.0, near, far);
    let translation = Mat4::from_translation(-position);
    CUBE_FACE_ROWS.map(|[sc, tc, major]| {
        let basis = Mat3::from_cols(sc, tc, major).transpose();
        projection * Mat4::from_mat3(basis) * translation
    })
}

/// Depth stored by the perspective and cube passes: distance from the light,
/// rescaled so `near` maps to 0 and `far` to 1.
pub fn linear_depth(distance: f32, near: f32, far: f32) -> f32 {
    ((distance - near) / (far - near)).clamp(0.0, 1.0)
}
