//! CPU versions of the per-texel lighting terms evaluated by the bake shaders.
//!
//! Kept in lockstep with `shaders/bake_*.wgsl` and used to derive expected
//! texel values.

use glam::Vec3;

use crate::light::{Light, LightKind};

/// Smallest cone softness used by the spot falloff to keep the ratio finite
/// when the inner and outer cutoffs coincide.
pub const MIN_CONE_SOFTNESS: f32 = 1e-6;

/// Inverse square falloff with `dist²` clamped below by `floor`.
pub fn attenuation(distance_squared: f32, floor: f32) -> f32 {
    1.0 / distance_squared.max(floor)
}

/// Smooth edge of a spot cone, 1 inside the inner cutoff and 0 outside the
/// outer one.
pub fn spot_falloff(cos_theta: f32, cos_inner: f32, cos_outer: f32) -> f32 {
    let softness = (cos_inner - cos_outer).max(MIN_CONE_SOFTNESS);
    ((cos_theta - cos_outer) / softness).clamp(0.0, 1.0)
}

/// Value written to a texel after one light pass.
///
/// `visibility` is the PCF result in `[0, 1]`. Disabled lights leave `prev`
/// untouched.
pub fn contribution(
    prev: Vec3,
    light: &Light,
    world_position: Vec3,
    normal: Vec3,
    visibility: f32,
    attenuation_floor: f32,
) -> Vec3 {
    if !light.is_enabled() {
        return prev;
    }
    let normal = normal.normalize_or_zero();
    let diffuse = light.diffuse();
    let ambient = light.ambient();

    match *light.kind() {
        LightKind::Directional { direction } => {
            let lambert = normal.dot(-direction).max(0.0);
            prev + diffuse * lambert * visibility + ambient
        }
        LightKind::Point { position } => {
            let to_light = position - world_position;
            let atten = attenuation(to_light.length_squared(), attenuation_floor);
            let lambert = normal.dot(to_light.normalize_or_zero()).max(0.0);
            prev + diffuse * lambert * atten * visibility + ambient * atten
        }
        LightKind::Spot {
            position,
            direction,
            inner_cutoff,
            outer_cutoff,
        } => {
            let to_light = position - world_position;
            let l = to_light.normalize_or_zero();
            let atten = attenuation(to_light.length_squared(), attenuation_floor);
            let lambert = normal.dot(l).max(0.0);
            let cone = spot_falloff(
                l.dot(-direction),
                inner_cutoff.to_radians().cos(),
                outer_cutoff.to_radians().cos(),
            );
            prev + diffuse * lambert * cone * atten * visibility + ambient * atten
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < 1e-5
    }

    #[test]
    fn directional_overhead_on_flat_ground() {
        let light = Light::directional(Vec3::NEG_Y).unwrap();
        let texel = contribution(Vec3::ZERO, &light, Vec3::ZERO, Vec3::Y, 1.0, 1e-4);
        assert!(close(texel, Vec3::splat(1.3)));
    }

    #[test]
    fn grazing_directional_is_ambient_only() {
        let light = Light::directional(Vec3::X).unwrap();
        let texel = contribution(Vec3::ZERO, &light, Vec3::ZERO, Vec3::Y, 1.0, 1e-4);
        assert!(close(texel, Vec3::splat(0.3)));
    }

    #[test]
    fn point_light_two_units_up() {
        let light = Light::point(Vec3::new(0.0, 2.0, 0.0));
        let texel = contribution(Vec3::ZERO, &light, Vec3::ZERO, Vec3::Y, 1.0, 1e-4);
        // diffuse/4 + ambient/4 where ambient = 1/32.
        let expected = 0.25 + 1.0 / 128.0;
        assert!(close(texel, Vec3::splat(expected)));
    }

    #[test]
    fn shadowed_point_keeps_attenuated_ambient() {
        let light = Light::point(Vec3::new(0.0, 2.0, 0.0));
        let texel = contribution(Vec3::ZERO, &light, Vec3::ZERO, Vec3::Y, 0.0, 1e-4);
        assert!(close(texel, Vec3::splat(1.0 / 128.0)));
    }

    #[test]
    fn attenuation_floor_bounds_coincident_light() {
        assert_eq!(attenuation(0.0, 1e-4), 1e4);
        let light = Light::point(Vec3::ZERO);
        let texel = contribution(Vec3::ZERO, &light, Vec3::ZERO, Vec3::Y, 1.0, 1e-4);
        assert!(texel.is_finite());
    }

    #[test]
    fn spot_falloff_edges() {
        let inner = 10f32.to_radians().cos();
        let outer = 60f32.to_radians().cos();
        assert_eq!(spot_falloff(1.0, inner, outer), 1.0);
        assert_eq!(spot_falloff(outer - 0.01, inner, outer), 0.0);
        let mid = spot_falloff((inner + outer) * 0.5, inner, outer);
        assert!((mid - 0.5).abs() < 1e-5);
        // Hard cone when the cutoffs coincide.
        assert_eq!(spot_falloff(inner + 1e-3, inner, inner), 1.0);
        assert_eq!(spot_falloff(inner - 1e-3, inner, inner), 0.0);
    }

    #[test]
    fn spot_outside_cone_is_ambient_only() {
        let light = Light::spot(Vec3::new(0.0, 2.0, 0.0), Vec3::NEG_Y, 10.0, 20.0).unwrap();
        let far_off_axis = Vec3::new(10.0, 0.0, 0.0);
        let texel = contribution(Vec3::ZERO, &light, far_off_axis, Vec3::Y, 1.0, 1e-4);
        let atten = 1.0 / 104.0;
        assert!(close(texel, Vec3::splat(0.1 * atten)));
    }

    #[test]
    fn disabled_light_is_identity() {
        let mut light = Light::sun();
        light.set_enabled(false);
        let prev = Vec3::new(0.2, 0.4, 0.6);
        assert_eq!(contribution(prev, &light, Vec3::ZERO, Vec3::Y, 1.0, 1e-4), prev);
    }

    #[test]
    fn contributions_add_up() {
        let a = Light::directional(Vec3::NEG_Y).unwrap();
        let b = Light::point(Vec3::new(1.0, 3.0, 0.0));
        let p = Vec3::new(0.5, 0.0, 0.5);

        let both = contribution(contribution(Vec3::ZERO, &a, p, Vec3::Y, 1.0, 1e-4), &b, p, Vec3::Y, 1.0, 1e-4);
        let sum = contribution(Vec3::ZERO, &a, p, Vec3::Y, 1.0, 1e-4)
            + contribution(Vec3::ZERO, &b, p, Vec3::Y, 1.0, 1e-4);
        assert!(close(both, sum));
    }
}
