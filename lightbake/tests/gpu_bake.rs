//! End-to-end bakes on a real adapter. Each test returns early when no GPU
//! is available.

use glam::{Mat4, Vec3};
use lightbake::{
    shading, BakeConfig, BakeError, BufferSlot, GpuContext, Light, LightmapBaker,
    LightmapFormat, LightmapImage, MeshLayout, SpotShadowConfig, SurfaceHandle,
};

const TOLERANCE: f32 = 1e-3;

fn gpu() -> Option<GpuContext> {
    match GpuContext::headless() {
        Ok(gpu) => Some(gpu),
        Err(err) => {
            eprintln!("skipping GPU test: {err}");
            None
        }
    }
}

fn test_config() -> BakeConfig {
    BakeConfig::default()
        .with_lightmap_format(LightmapFormat::Full)
        .with_shadow_map_size(512)
}

fn baker(gpu: &GpuContext) -> LightmapBaker {
    LightmapBaker::new(gpu, test_config()).unwrap()
}

/// Horizontal plane at y = 0 spanning `[-half, half]` on x and z.
fn add_plane(baker: &mut LightmapBaker, half: f32, size: u32) -> SurfaceHandle {
    let mesh = baker.register_mesh(MeshLayout::plane(half)).unwrap();
    baker.create_surface(Mat4::IDENTITY, size, size, mesh).unwrap()
}

fn add_box(baker: &mut LightmapBaker, center: Vec3, half: f32) -> SurfaceHandle {
    let mesh = baker
        .register_mesh(MeshLayout::cuboid(Vec3::splat(half)))
        .unwrap();
    baker
        .create_surface(Mat4::from_translation(center), 48, 32, mesh)
        .unwrap()
}

/// World position sampled by texel `(x, y)` of a plane from [`add_plane`].
fn plane_texel(half: f32, size: u32, x: u32, y: u32) -> Vec3 {
    let step = 2.0 * half / size as f32;
    Vec3::new(
        -half + (x as f32 + 0.5) * step,
        0.0,
        -half + (y as f32 + 0.5) * step,
    )
}

/// Value a single pass of `light` leaves on an upward facing texel.
fn expected(light: &Light, position: Vec3, visibility: f32) -> Vec3 {
    shading::contribution(
        Vec3::ZERO,
        light,
        position,
        Vec3::Y,
        visibility,
        test_config().attenuation_floor,
    )
}

fn assert_texel(image: &LightmapImage, x: u32, y: u32, expected: Vec3) {
    let actual = image.texel(x, y);
    assert!(
        (actual - expected).abs().max_element() < TOLERANCE,
        "texel ({x}, {y}) = {actual:?}, expected {expected:?}"
    );
}

#[test]
fn directional_light_over_plane_is_uniform() {
    let Some(gpu) = gpu() else { return };
    let mut baker = baker(&gpu);
    let plane = add_plane(&mut baker, 10.0, 16);
    let light = Light::directional(Vec3::NEG_Y).unwrap();
    baker.add_light(light.clone());

    let report = baker.rebuild_all().unwrap();
    assert_eq!(report.lights_baked, 1);
    assert_eq!(report.surfaces_baked, 1);

    let image = baker.read_lightmap(plane).unwrap();
    for y in 0..16 {
        for x in 0..16 {
            assert_texel(&image, x, y, expected(&light, plane_texel(10.0, 16, x, y), 1.0));
        }
    }
}

#[test]
fn point_light_center_texel_follows_inverse_square() {
    let Some(gpu) = gpu() else { return };
    let mut baker = baker(&gpu);
    let plane = add_plane(&mut baker, 1.0, 33);
    let light = Light::point(Vec3::new(0.0, 2.0, 0.0));
    baker.add_light(light.clone());
    baker.rebuild_all().unwrap();

    let image = baker.read_lightmap(plane).unwrap();
    let center = plane_texel(1.0, 33, 16, 16);
    assert!(center.length() < 1e-5);
    // 1/4 diffuse plus 1/32 of it as ambient, both at distance 2.
    assert!((expected(&light, center, 1.0) - Vec3::splat(0.25 + 0.25 / 32.0)).length() < 1e-6);
    assert_texel(&image, 16, 16, expected(&light, center, 1.0));
}

#[test]
fn spot_light_is_bright_inside_cone_and_dim_outside() {
    let Some(gpu) = gpu() else { return };
    let mut baker = baker(&gpu);
    let plane = add_plane(&mut baker, 4.0, 33);
    let light = Light::spot(Vec3::new(0.0, 2.0, 0.0), Vec3::NEG_Y, 20.0, 30.0).unwrap();
    baker.add_light(light.clone());
    baker.rebuild_all().unwrap();

    let image = baker.read_lightmap(plane).unwrap();
    assert_texel(&image, 16, 16, expected(&light, plane_texel(4.0, 33, 16, 16), 1.0));

    // The outer cone meets the plane at 2 * tan(30°) ≈ 1.155. Texel 21 of row
    // 16 sits at x ≈ 1.21, just past it, so only the ambient term is left.
    let past_edge = plane_texel(4.0, 33, 21, 16);
    let angle = past_edge.x.atan2(2.0).to_degrees();
    assert!(angle > 30.0 && angle < 32.0, "texel at {angle} degrees");
    let ambient_only = expected(&light, past_edge, 0.0);
    assert_eq!(expected(&light, past_edge, 1.0), ambient_only);
    assert_texel(&image, 21, 16, ambient_only);

    let corner = image.texel(0, 0);
    assert!(corner.max_element() < 0.01, "corner {corner:?}");
}

#[test]
fn contributions_are_additive() {
    let Some(gpu) = gpu() else { return };
    let mut baker = baker(&gpu);
    let plane = add_plane(&mut baker, 5.0, 32);
    let sun = baker.add_light(Light::directional(Vec3::new(-0.3, -1.0, 0.2)).unwrap());
    let lamp = baker.add_light(Light::point(Vec3::new(1.0, 3.0, -1.0)));

    baker.rebuild(&[plane], &[sun]).unwrap();
    let a = baker.read_lightmap(plane).unwrap();
    baker.rebuild(&[plane], &[lamp]).unwrap();
    let b = baker.read_lightmap(plane).unwrap();
    baker.rebuild(&[plane], &[sun, lamp]).unwrap();
    let both = baker.read_lightmap(plane).unwrap();

    for ((a, b), both) in a.texels.iter().zip(&b.texels).zip(&both.texels) {
        assert!((*a + *b - *both).abs().max_element() < TOLERANCE);
    }
}

#[test]
fn disabled_light_changes_nothing() {
    let Some(gpu) = gpu() else { return };
    let mut baker = baker(&gpu);
    let plane = add_plane(&mut baker, 5.0, 16);
    baker.add_light(Light::point(Vec3::new(0.0, 2.0, 0.0)));
    baker.rebuild_all().unwrap();
    let before = baker.read_lightmap(plane).unwrap();

    let extra = baker.add_light(Light::sun());
    baker.set_enabled(extra, false).unwrap();
    let report = baker.rebuild_all().unwrap();
    let after = baker.read_lightmap(plane).unwrap();

    assert_eq!(report.lights_baked, 1);
    for (before, after) in before.texels.iter().zip(&after.texels) {
        assert!((*before - *after).abs().max_element() < 1e-6);
    }
}

#[test]
fn rebuilding_twice_gives_the_same_result() {
    let Some(gpu) = gpu() else { return };
    let mut baker = baker(&gpu);
    let plane = add_plane(&mut baker, 10.0, 32);
    add_box(&mut baker, Vec3::new(0.0, 1.0, 0.0), 1.0);
    baker.add_light(Light::sun());
    baker.add_light(Light::point(Vec3::new(3.0, 4.0, 0.0)));

    baker.rebuild_all().unwrap();
    let first = baker.read_lightmap(plane).unwrap();
    baker.rebuild_all().unwrap();
    let second = baker.read_lightmap(plane).unwrap();

    for (a, b) in first.texels.iter().zip(&second.texels) {
        assert!((*a - *b).abs().max_element() < 1e-6);
    }
}

#[test]
fn occluder_only_darkens() {
    let Some(gpu) = gpu() else { return };
    let mut baker = baker(&gpu);
    let plane = add_plane(&mut baker, 10.0, 32);
    let light = Light::directional(Vec3::NEG_Y).unwrap();
    baker.add_light(light.clone());
    baker.rebuild_all().unwrap();
    let open = baker.read_lightmap(plane).unwrap();

    add_box(&mut baker, Vec3::new(0.0, 4.0, 0.0), 2.0);
    baker.rebuild_all().unwrap();
    let shadowed = baker.read_lightmap(plane).unwrap();

    for (open, shadowed) in open.texels.iter().zip(&shadowed.texels) {
        assert!(shadowed.max_element() <= open.max_element() + TOLERANCE);
    }
    // Texel (16, 16) sits right under the box: only the ambient term is left.
    assert_texel(&shadowed, 16, 16, expected(&light, plane_texel(10.0, 32, 16, 16), 0.0));
}

#[test]
fn point_light_casts_cube_shadows() {
    let Some(gpu) = gpu() else { return };
    let mut baker = baker(&gpu);
    let plane = add_plane(&mut baker, 10.0, 32);
    add_box(&mut baker, Vec3::new(0.0, 2.0, 0.0), 1.0);
    baker.add_light(Light::point(Vec3::new(0.0, 5.0, 0.0)));
    baker.rebuild_all().unwrap();

    let image = baker.read_lightmap(plane).unwrap();
    let under = image.texel(16, 16);
    let aside = image.texel(22, 16);
    assert!(under.max_element() < 0.01, "under the box {under:?}");
    assert!(aside.max_element() > 0.01, "beside the box {aside:?}");
}

#[test]
fn spot_light_casts_perspective_shadows() {
    let Some(gpu) = gpu() else { return };
    // A narrow kernel and a wider bias keep the grazing plane from shadowing
    // itself away from the cone axis.
    let config = test_config().with_spot_shadows(SpotShadowConfig {
        size: 1024,
        pcf_radius: 1,
        bias: 0.0005,
        ..SpotShadowConfig::default()
    });
    let mut baker = LightmapBaker::new(&gpu, config).unwrap();
    let plane = add_plane(&mut baker, 10.0, 32);
    add_box(&mut baker, Vec3::new(0.0, 3.0, 0.0), 0.5);
    let light = Light::spot(Vec3::new(0.0, 6.0, 0.0), Vec3::NEG_Y, 45.0, 55.0).unwrap();
    baker.add_light(light.clone());
    baker.rebuild_all().unwrap();

    let image = baker.read_lightmap(plane).unwrap();
    // The box top projects onto |x|, |z| < 1.2 on the plane.
    let under = plane_texel(10.0, 32, 16, 16);
    assert_texel(&image, 16, 16, expected(&light, under, 0.0));

    // x ≈ 4.06 is well inside the inner cone and clear of the shadow.
    let aside = plane_texel(10.0, 32, 22, 16);
    assert!(aside.x > 4.0 && aside.x.atan2(6.0).to_degrees() < 45.0);
    assert_texel(&image, 22, 16, expected(&light, aside, 1.0));
}

#[test]
fn read_slot_tracks_number_of_passes() {
    let Some(gpu) = gpu() else { return };
    let mut baker = baker(&gpu);
    let plane = add_plane(&mut baker, 5.0, 8);
    let lights: Vec<_> = (0..3)
        .map(|i| baker.add_light(Light::point(Vec3::new(i as f32, 2.0, 0.0))))
        .collect();

    baker.rebuild(&[plane], &lights).unwrap();
    assert_eq!(baker.read_slot(plane).unwrap(), BufferSlot::B);
    baker.rebuild(&[plane], &lights[..2]).unwrap();
    assert_eq!(baker.read_slot(plane).unwrap(), BufferSlot::A);
}

#[test]
fn stale_handles_are_skipped_in_rebuild_and_rejected_elsewhere() {
    let Some(gpu) = gpu() else { return };
    let mut baker = baker(&gpu);
    let keep = add_plane(&mut baker, 5.0, 8);
    let gone = add_plane(&mut baker, 5.0, 8);
    let light = baker.add_light(Light::sun());
    let removed = baker.add_light(Light::point(Vec3::Y));
    baker.destroy_surface(gone).unwrap();
    baker.remove_light(removed).unwrap();

    let report = baker.rebuild(&[keep, gone], &[light, removed]).unwrap();
    assert_eq!(report.skipped_surfaces, vec![gone]);
    assert_eq!(report.skipped_lights, vec![removed]);
    assert_eq!(report.surfaces_baked, 1);

    assert!(matches!(baker.destroy_surface(gone), Err(BakeError::UnknownSurface(_))));
    assert!(matches!(baker.set_enabled(removed, true), Err(BakeError::UnknownLight(_))));
    assert!(baker.baked_lightmap(gone).is_err());
}

#[test]
fn resizing_a_resolution_class_reallocates_lightmaps() {
    let Some(gpu) = gpu() else { return };
    let mut baker = baker(&gpu);
    let mesh = baker.register_mesh(MeshLayout::plane(5.0)).unwrap();
    let a = baker.create_surface(Mat4::IDENTITY, 16, 16, mesh).unwrap();
    let b = baker
        .create_surface(Mat4::from_translation(Vec3::X * 20.0), 16, 16, mesh)
        .unwrap();
    let other = baker.create_surface(Mat4::IDENTITY, 32, 32, mesh).unwrap();
    let light = Light::directional(Vec3::NEG_Y).unwrap();
    baker.add_light(light.clone());

    assert_eq!(baker.resize_resolution_class(mesh, (16, 16), (8, 4)).unwrap(), 2);
    baker.rebuild_all().unwrap();

    for handle in [a, b] {
        let texture = baker.baked_lightmap(handle).unwrap();
        assert_eq!((texture.width(), texture.height()), (8, 4));
        let image = baker.read_lightmap(handle).unwrap();
        assert_texel(&image, 3, 2, expected(&light, Vec3::ZERO, 1.0));
    }
    assert_eq!(baker.baked_lightmap(other).unwrap().width(), 32);
}

#[test]
fn invalid_sizes_are_rejected() {
    let Some(gpu) = gpu() else { return };
    let mut baker = baker(&gpu);
    let mesh = baker.register_mesh(MeshLayout::plane(1.0)).unwrap();
    let err = baker.create_surface(Mat4::IDENTITY, 0, 16, mesh).unwrap_err();
    assert!(matches!(err, BakeError::InvalidLightmapSize { .. }));
}

#[test]
fn shadow_map_sizes_beyond_the_device_are_rejected() {
    let Some(gpu) = gpu() else { return };
    let max = gpu.device.limits().max_texture_dimension_2d;
    let config = test_config().with_spot_shadows(SpotShadowConfig {
        size: max + 1,
        ..SpotShadowConfig::default()
    });
    let err = LightmapBaker::new(&gpu, config).err().unwrap();
    assert!(matches!(err, BakeError::InvalidShadowMapSize { light: "spot", .. }));
}

#[test]
fn disabling_a_light_releases_its_cached_shadow_map() {
    let Some(gpu) = gpu() else { return };
    let mut baker = LightmapBaker::new(&gpu, test_config().with_shadow_cache(true)).unwrap();
    add_plane(&mut baker, 5.0, 8);
    let sun = baker.add_light(Light::sun());
    let lamp = baker.add_light(Light::point(Vec3::Y * 3.0));

    baker.rebuild_all().unwrap();
    assert_eq!(baker.cached_shadow_maps(), 2);

    baker.set_enabled(lamp, false).unwrap();
    let report = baker.rebuild_all().unwrap();
    assert_eq!(report.shadow_maps_reused, 1);
    assert_eq!(baker.cached_shadow_maps(), 1);

    baker.set_enabled(lamp, true).unwrap();
    let report = baker.rebuild(&[], &[sun, lamp]).unwrap();
    assert_eq!(report.shadow_maps_rendered, 1);
    assert_eq!(report.shadow_maps_reused, 1);
}

#[test]
fn cached_shadow_maps_are_reused_until_something_changes() {
    let Some(gpu) = gpu() else { return };
    let mut baker = LightmapBaker::new(&gpu, test_config().with_shadow_cache(true)).unwrap();
    let plane = add_plane(&mut baker, 5.0, 8);
    let light = baker.add_light(Light::sun());

    assert_eq!(baker.rebuild_all().unwrap().shadow_maps_rendered, 1);
    assert_eq!(baker.rebuild_all().unwrap().shadow_maps_reused, 1);

    baker.light_mut(light).unwrap().set_intensity(2.0);
    assert_eq!(baker.rebuild_all().unwrap().shadow_maps_rendered, 1);

    add_box(&mut baker, Vec3::Y * 2.0, 0.5);
    assert_eq!(baker.rebuild(&[plane], &[light]).unwrap().shadow_maps_rendered, 1);
}
