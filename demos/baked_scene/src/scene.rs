use std::collections::BTreeMap;
use std::f32::consts::{FRAC_PI_4, TAU};
use std::time::Duration;

use anyhow::{anyhow, Result};
use crossbeam_channel::Receiver;
use glam::{Mat4, Quat, Vec3};
use lightbake::{
    forward, BakeConfig, ForwardRenderer, GpuContext, Light, LightHandle, LightmapBaker,
    MeshHandle, MeshLayout, SurfaceHandle,
};
use winit::dpi::PhysicalSize;
use winit::window::Window;

const GROUND_HALF_EXTENTS: Vec3 = Vec3::new(25.0, 0.5, 25.0);
const GROUND_LIGHTMAP: (u32, u32) = (1536, 1024);
const CUBE_LIGHTMAP: (u32, u32) = (384, 256);
const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.02,
    g: 0.02,
    b: 0.03,
    a: 1.0,
};

/// Kinds of light the number keys add.
#[derive(Clone, Copy, Debug)]
pub enum NewLight {
    Directional,
    Point,
    Spot,
}

/// A ground slab and a pile of cubes lit by baked lightmaps.
pub struct BakedScene {
    window: &'static Window,
    gpu: GpuContext,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    depth: wgpu::TextureView,
    baker: LightmapBaker,
    renderer: ForwardRenderer,
    _albedo: wgpu::Texture,
    albedo_view: wgpu::TextureView,
    materials: BTreeMap<SurfaceHandle, wgpu::BindGroup>,
    cube_mesh: MeshHandle,
    cubes: Vec<SurfaceHandle>,
    lights: Vec<LightHandle>,
    colors: Receiver<Vec3>,
    next_color: Vec3,
    orbit: f32,
}

impl BakedScene {
    pub fn new(window: &'static Window, config: BakeConfig, colors: Receiver<Vec3>) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window)?;
        let gpu = GpuContext::for_surface(instance, &surface)?;

        let size = window.inner_size();
        let capabilities = surface.get_capabilities(&gpu.adapter);
        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(|format| format.is_srgb())
            .or_else(|| capabilities.formats.first().copied())
            .ok_or_else(|| anyhow!("surface reports no formats"))?;
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: capabilities
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&gpu.device, &surface_config);
        let depth =
            forward::create_depth_view(&gpu.device, surface_config.width, surface_config.height);

        let mut baker = LightmapBaker::new(&gpu, config)?;
        let renderer = ForwardRenderer::new(
            &gpu.device,
            baker.bind_layouts(),
            format,
            baker.lightmap_format(),
        );
        let (albedo, albedo_view) =
            forward::upload_albedo(&gpu.device, &gpu.queue, &checker_albedo());

        let ground_mesh = baker.register_mesh(MeshLayout::cuboid(GROUND_HALF_EXTENTS))?;
        let cube_mesh = baker.register_mesh(MeshLayout::cuboid(Vec3::splat(0.5)))?;
        let (gw, gh) = GROUND_LIGHTMAP;
        baker.create_surface(Mat4::from_translation(Vec3::NEG_Y * 0.5), gw, gh, ground_mesh)?;
        let sun = baker.add_light(Light::sun());

        let mut scene = Self {
            window,
            gpu,
            surface,
            surface_config,
            depth,
            baker,
            renderer,
            _albedo: albedo,
            albedo_view,
            materials: BTreeMap::new(),
            cube_mesh,
            cubes: Vec::new(),
            lights: vec![sun],
            colors,
            next_color: Vec3::ONE,
            orbit: 0.0,
        };
        scene.rebuild()?;
        Ok(scene)
    }

    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.surface_config.width = size.width;
        self.surface_config.height = size.height;
        self.surface.configure(&self.gpu.device, &self.surface_config);
        self.depth = forward::create_depth_view(&self.gpu.device, size.width, size.height);
    }

    pub fn update(&mut self, delta: Duration) {
        self.orbit = (self.orbit + delta.as_secs_f32() * 0.1) % TAU;

        for color in self.colors.try_iter() {
            log::info!("next light color set to {color}");
            self.next_color = color;
        }
    }

    /// Drop a randomly sized and rotated cube somewhere above the ground. It
    /// stays black until the next rebuild.
    pub fn spawn_cube(&mut self) -> Result<()> {
        let position = Vec3::new(
            random_range(-12.0, 12.0),
            random_range(0.5, 4.0),
            random_range(-12.0, 12.0),
        );
        let rotation = Quat::from_euler(
            glam::EulerRot::XYZ,
            random_range(0.0, TAU),
            random_range(0.0, TAU),
            random_range(0.0, TAU),
        );
        let scale = Vec3::splat(random_range(0.5, 3.0));
        let model = Mat4::from_scale_rotation_translation(scale, rotation, position);

        let (w, h) = CUBE_LIGHTMAP;
        let cube = self.baker.create_surface(model, w, h, self.cube_mesh)?;
        self.cubes.push(cube);
        self.refresh_materials()?;
        log::info!("spawned cube {} at {position}", self.cubes.len());
        Ok(())
    }

    pub fn remove_cube(&mut self) -> Result<()> {
        if let Some(cube) = self.cubes.pop() {
            self.baker.destroy_surface(cube)?;
            self.materials.remove(&cube);
        }
        Ok(())
    }

    pub fn add_light(&mut self, kind: NewLight) -> Result<()> {
        let position = Vec3::new(
            random_range(-10.0, 10.0),
            random_range(3.0, 8.0),
            random_range(-10.0, 10.0),
        );
        let light = match kind {
            NewLight::Directional => Light::directional(Vec3::new(
                random_range(-1.0, 1.0),
                -1.0,
                random_range(-1.0, 1.0),
            ))?,
            NewLight::Point => Light::point(position).with_intensity(10.0),
            NewLight::Spot => {
                Light::spot(position, Vec3::NEG_Y, 25.0, 35.0)?.with_intensity(20.0)
            }
        };
        let light = light
            .with_color(self.next_color)
            .with_icon_color(self.next_color);
        let handle = self.baker.add_light(light);
        self.lights.push(handle);
        log::info!("added {kind:?} light");
        self.rebuild()
    }

    /// Flip the most recently added light on or off.
    pub fn toggle_light(&mut self) -> Result<()> {
        let Some(&handle) = self.lights.last() else {
            return Ok(());
        };
        let enabled = self.baker.light(handle)?.is_enabled();
        self.baker.set_enabled(handle, !enabled)?;
        self.rebuild()
    }

    pub fn rebuild(&mut self) -> Result<()> {
        let report = self.baker.rebuild_all()?;
        self.window.set_title(&format!(
            "Baked Scene (surfaces: {}, lights: {}, draw calls: {}, vertices: {}, {:.1} ms)",
            report.surfaces_baked,
            report.lights_baked,
            report.draw_calls,
            report.vertices,
            report.elapsed.as_secs_f64() * 1000.0,
        ));
        self.refresh_materials()
    }

    pub fn export_lightmaps(&self) -> Result<()> {
        for (index, handle) in self.baker.surface_handles().enumerate() {
            let path = format!("lightmap-{index:03}.png");
            self.baker.save_lightmap_png(handle, &path, 1.0)?;
            log::info!("wrote {path}");
        }
        Ok(())
    }

    /// The read side of every accumulator can change with each bake, so
    /// materials are rebuilt afterwards.
    fn refresh_materials(&mut self) -> Result<()> {
        self.materials.clear();
        for handle in self.baker.surface_handles() {
            let lightmap = self.baker.baked_lightmap_view(handle)?;
            let material = self
                .renderer
                .material(&self.gpu.device, &self.albedo_view, lightmap);
            self.materials.insert(handle, material);
        }
        Ok(())
    }

    fn view_proj(&self) -> Mat4 {
        let aspect = self.surface_config.width as f32 / self.surface_config.height as f32;
        let eye = Vec3::new(self.orbit.sin() * 30.0, 12.0, self.orbit.cos() * 30.0);
        Mat4::perspective_rh(FRAC_PI_4, aspect, 0.1, 500.0)
            * Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y)
    }

    pub fn draw(&mut self) -> Result<()> {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.gpu.device, &self.surface_config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.renderer.set_camera(&self.gpu.queue, self.view_proj());
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("baked-scene-frame"),
            });
        {
            let mut pass = self
                .renderer
                .begin_pass(&mut encoder, &view, &self.depth, CLEAR_COLOR);
            for (handle, material) in &self.materials {
                let surface = self.baker.surface_draw(*handle)?;
                self.renderer.draw(&mut pass, &surface, material);
            }
        }
        self.gpu.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }
}

fn random_range(min: f32, max: f32) -> f32 {
    min + fastrand::f32() * (max - min)
}

/// Two-tone grey checkerboard, eight cells across.
fn checker_albedo() -> image::RgbaImage {
    image::RgbaImage::from_fn(256, 256, |x, y| {
        if (x / 32 + y / 32) % 2 == 0 {
            image::Rgba([200, 200, 200, 255])
        } else {
            image::Rgba([140, 140, 140, 255])
        }
    })
}

/// Parse a color typed on stdin: three floats in `0..=1`, or `#rrggbb`.
pub fn parse_color(line: &str) -> Option<Vec3> {
    let line = line.trim();
    if let Some(hex) = line.strip_prefix('#') {
        if hex.len() != 6 {
            return None;
        }
        let channel = |i: usize| {
            u8::from_str_radix(hex.get(i..i + 2)?, 16)
                .ok()
                .map(|c| c as f32 / 255.0)
        };
        return Some(Vec3::new(channel(0)?, channel(2)?, channel(4)?));
    }

    let values: Vec<f32> = line
        .split_whitespace()
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    match values.as_slice() {
        [r, g, b] if [r, g, b].iter().all(|c| (0.0..=1.0).contains(*c)) => {
            Some(Vec3::new(*r, *g, *b))
        }
        _ => None,
    }
}
