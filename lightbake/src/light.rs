use glam::Vec3;

use crate::error::{BakeError, Result};

/// Default sun color, a slightly warm white.
pub const SUN_COLOR: Vec3 = Vec3::new(1.0, 253.0 / 255.0, 242.0 / 255.0);

/// Geometry of a light source.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightKind {
    /// Infinitely distant light travelling along `direction`.
    Directional { direction: Vec3 },
    /// Omnidirectional light with inverse square falloff.
    Point { position: Vec3 },
    /// Cone light. Cutoffs are half angles in degrees, `inner <= outer`.
    Spot {
        position: Vec3,
        direction: Vec3,
        inner_cutoff: f32,
        outer_cutoff: f32,
    },
}

/// A bakeable light.
///
/// Every setter that affects baking bumps [`Light::revision`], which is how the baker notices a
/// cached shadow map went stale.
#[derive(Clone, Debug, PartialEq)]
pub struct Light {
    kind: LightKind,
    color: Vec3,
    intensity: f32,
    enabled: bool,
    icon_color: Vec3,
    revision: u64,
}

impl Light {
    /// Light shining along `direction` everywhere. Fails on a zero vector.
    pub fn directional(direction: Vec3) -> Result<Self> {
        Ok(Self::from_kind(LightKind::Directional {
            direction: normalized(direction)?,
        }))
    }

    /// The default sun: warm white light coming down at an angle.
    pub fn sun() -> Self {
        Self::from_kind(LightKind::Directional {
            direction: Vec3::new(-0.5, -1.0, 0.5).normalize(),
        })
        .with_color(SUN_COLOR)
    }

    /// Light radiating in all directions from `position`.
    pub fn point(position: Vec3) -> Self {
        Self::from_kind(LightKind::Point { position })
    }

    /// Cone light at `position`. Cutoffs are half angles in degrees with `0 < inner <= outer < 90`.
    pub fn spot(position: Vec3, direction: Vec3, inner_cutoff: f32, outer_cutoff: f32) -> Result<Self> {
        validate_cutoffs(inner_cutoff, outer_cutoff)?;
        Ok(Self::from_kind(LightKind::Spot {
            position,
            direction: normalized(direction)?,
            inner_cutoff,
            outer_cutoff,
        }))
    }

    fn from_kind(kind: LightKind) -> Self {
        Self {
            kind,
            color: Vec3::ONE,
            intensity: 1.0,
            enabled: true,
            icon_color: Vec3::ONE,
            revision: 0,
        }
    }

    /// Builder form of [`Light::set_color`].
    #[must_use]
    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color;
        self
    }

    /// Builder form of [`Light::set_intensity`].
    #[must_use]
    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }

    /// Variant specific parameters.
    pub fn kind(&self) -> &LightKind {
        &self.kind
    }

    /// Linear RGB color before intensity.
    pub fn color(&self) -> Vec3 {
        self.color
    }

    /// Scalar multiplier on the color.
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// Whether rebuilds include this light.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Counter bumped by every change that affects baking.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Scale applied to the diffuse color to get the ambient term.
    pub fn ambient_fraction(&self) -> f32 {
        match self.kind {
            LightKind::Directional { .. } => 0.3,
            LightKind::Point { .. } => 1.0 / 32.0,
            LightKind::Spot { .. } => 0.1,
        }
    }

    /// Color times intensity.
    pub fn diffuse(&self) -> Vec3 {
        self.color * self.intensity
    }

    /// Tint for whatever icon the host draws at the light. Not baked.
    pub fn icon_color(&self) -> Vec3 {
        self.icon_color
    }

    /// Builder form of [`Light::set_icon_color`].
    #[must_use]
    pub fn with_icon_color(mut self, color: Vec3) -> Self {
        self.icon_color = color;
        self
    }

    /// Diffuse scaled by the ambient fraction.
    pub fn ambient(&self) -> Vec3 {
        self.diffuse() * self.ambient_fraction()
    }

    /// Position of point and spot lights.
    pub fn position(&self) -> Option<Vec3> {
        match self.kind {
            LightKind::Directional { .. } => None,
            LightKind::Point { position } | LightKind::Spot { position, .. } => Some(position),
        }
    }

    /// Direction of directional and spot lights.
    pub fn direction(&self) -> Option<Vec3> {
        match self.kind {
            LightKind::Point { .. } => None,
            LightKind::Directional { direction } | LightKind::Spot { direction, .. } => {
                Some(direction)
            }
        }
    }

    /// Turn the light on or off. Only an actual change bumps the revision.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.touch();
        }
    }

    /// Change the icon tint. Leaves the revision alone, so cached shadow
    /// maps stay valid.
    pub fn set_icon_color(&mut self, color: Vec3) {
        self.icon_color = color;
    }

    /// Set the linear RGB color.
    pub fn set_color(&mut self, color: Vec3) {
        self.color = color;
        self.touch();
    }

    /// Set the intensity multiplier.
    pub fn set_intensity(&mut self, intensity: f32) {
        self.intensity = intensity;
        self.touch();
    }

    /// Move a point or spot light. Directional lights have no position.
    pub fn set_position(&mut self, new_position: Vec3) -> Result<()> {
        match &mut self.kind {
            LightKind::Point { position } | LightKind::Spot { position, .. } => {
                *position = new_position;
            }
            LightKind::Directional { .. } => {
                return Err(BakeError::InvalidLightParameter(
                    "directional lights have no position",
                ))
            }
        }
        self.touch();
        Ok(())
    }

    /// Aim a directional or spot light. The vector is normalized.
    pub fn set_direction(&mut self, new_direction: Vec3) -> Result<()> {
        let new_direction = normalized(new_direction)?;
        match &mut self.kind {
            LightKind::Directional { direction } | LightKind::Spot { direction, .. } => {
                *direction = new_direction;
            }
            LightKind::Point { .. } => {
                return Err(BakeError::InvalidLightParameter(
                    "point lights have no direction",
                ))
            }
        }
        self.touch();
        Ok(())
    }

    /// Change the cone of a spot light, in degrees.
    pub fn set_cutoff(&mut self, inner: f32, outer: f32) -> Result<()> {
        validate_cutoffs(inner, outer)?;
        match &mut self.kind {
            LightKind::Spot {
                inner_cutoff,
                outer_cutoff,
                ..
            } => {
                *inner_cutoff = inner;
                *outer_cutoff = outer;
            }
            _ => {
                return Err(BakeError::InvalidLightParameter(
                    "only spot lights have a cutoff",
                ))
            }
        }
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

fn normalized(direction: Vec3) -> Result<Vec3> {
    let normalized = direction.normalize_or_zero();
    if normalized == Vec3::ZERO || !normalized.is_finite() {
        return Err(BakeError::InvalidLightParameter("direction has zero length"));
    }
    Ok(normalized)
}

fn validate_cutoffs(inner: f32, outer: f32) -> Result<()> {
    if !(inner > 0.0 && inner <= outer && outer < 90.0) {
        return Err(BakeError::InvalidLightParameter(
            "spot cutoffs must satisfy 0 < inner <= outer < 90 degrees",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_direction_is_rejected() {
        assert!(Light::directional(Vec3::ZERO).is_err());
        let mut sun = Light::sun();
        assert!(sun.set_direction(Vec3::ZERO).is_err());
        assert_eq!(sun.revision(), 0);
    }

    #[test]
    fn setters_bump_revision() {
        let mut light = Light::point(Vec3::ZERO);
        light.set_position(Vec3::ONE).unwrap();
        light.set_color(Vec3::X);
        light.set_intensity(2.0);
        assert_eq!(light.revision(), 3);

        // No change, no bump.
        light.set_enabled(true);
        assert_eq!(light.revision(), 3);
        light.set_enabled(false);
        assert_eq!(light.revision(), 4);
    }

    #[test]
    fn icon_color_does_not_invalidate_shadows() {
        let mut light = Light::point(Vec3::Y).with_icon_color(Vec3::X);
        assert_eq!(light.icon_color(), Vec3::X);
        let before = light.revision();
        light.set_icon_color(Vec3::Z);
        assert_eq!(light.icon_color(), Vec3::Z);
        assert_eq!(light.revision(), before);
    }

    #[test]
    fn setters_reject_mismatched_kinds() {
        let mut point = Light::point(Vec3::ZERO);
        assert!(point.set_direction(Vec3::X).is_err());
        assert!(point.set_cutoff(10.0, 20.0).is_err());
        assert!(Light::sun().set_position(Vec3::ONE).is_err());
    }

    #[test]
    fn cutoffs_are_validated() {
        assert!(Light::spot(Vec3::ZERO, Vec3::NEG_Y, 30.0, 20.0).is_err());
        assert!(Light::spot(Vec3::ZERO, Vec3::NEG_Y, 10.0, 90.0).is_err());
        let mut spot = Light::spot(Vec3::ZERO, Vec3::NEG_Y, 10.0, 60.0).unwrap();
        spot.set_cutoff(20.0, 20.0).unwrap();
        assert!(matches!(
            spot.kind(),
            LightKind::Spot { inner_cutoff, outer_cutoff, .. } if *inner_cutoff == 20.0 && *outer_cutoff == 20.0
        ));
    }

    #[test]
    fn ambient_follows_kind() {
        let point = Light::point(Vec3::ZERO).with_intensity(32.0);
        assert_eq!(point.ambient(), Vec3::ONE);

        let sun = Light::directional(Vec3::NEG_Y).unwrap().with_color(Vec3::new(1.0, 0.5, 0.0));
        assert!((sun.ambient() - Vec3::new(0.3, 0.15, 0.0)).length() < 1e-6);
    }

    #[test]
    fn directions_are_normalized() {
        let light = Light::directional(Vec3::new(0.0, -4.0, 0.0)).unwrap();
        assert_eq!(light.direction(), Some(Vec3::NEG_Y));
        assert_eq!(light.position(), None);
    }
}
