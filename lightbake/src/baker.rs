use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::{Duration, Instant};

use glam::Mat4;
use wgpu::util::DeviceExt;

use crate::config::{BakeConfig, LightmapFormat};
use crate::contribution::{ContributionPipelines, LightUniforms};
use crate::error::{BakeError, Result};
use crate::gpu::GpuContext;
use crate::layouts::{BindLayouts, SurfaceUniforms};
use crate::light::Light;
use crate::lightmap::{BufferSlot, LightPass, LightmapAccumulator};
use crate::mesh::{GpuMesh, MeshLayout, TexelMapping};
use crate::readback::{self, LightmapImage};
use crate::shadow::{PassStats, ShadowCaster, ShadowMap, ShadowRenderer};

/// Handle to a surface owned by a [`LightmapBaker`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurfaceHandle(pub(crate) u32);

/// Handle to a light owned by a [`LightmapBaker`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LightHandle(pub(crate) u32);

/// Handle to a registered [`MeshLayout`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeshHandle(pub(crate) u32);

/// Where a rebuild currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BakeState {
    Idle,
    Clearing,
    PerLight,
    PerSurfaceApply,
}

/// Summary of one rebuild.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BakeReport {
    pub lights_baked: usize,
    pub surfaces_baked: usize,
    pub shadow_maps_rendered: usize,
    pub shadow_maps_reused: usize,
    pub draw_calls: u32,
    pub vertices: u64,
    /// Handles passed to the rebuild that no longer exist.
    pub skipped_surfaces: Vec<SurfaceHandle>,
    pub skipped_lights: Vec<LightHandle>,
    pub elapsed: Duration,
}

impl BakeReport {
    fn count(&mut self, stats: PassStats) {
        self.draw_calls += stats.draw_calls;
        self.vertices += stats.vertices;
    }
}

/// Everything needed to draw a surface with its baked lightmap.
pub struct SurfaceDraw<'a> {
    pub surface_bind_group: &'a wgpu::BindGroup,
    pub mesh: &'a GpuMesh,
    pub lightmap: &'a wgpu::TextureView,
}

/// A mesh uploaded at one lightmap size, shared by every surface using it.
struct ResolutionClass {
    mesh: GpuMesh,
    users: usize,
}

struct MeshEntry {
    layout: MeshLayout,
    classes: HashMap<TexelMapping, ResolutionClass>,
}

struct Surface {
    mesh: MeshHandle,
    mapping: TexelMapping,
    accumulator: LightmapAccumulator,
    bind_group: wgpu::BindGroup,
    bake_enabled: bool,
}

struct CachedShadow {
    light_revision: u64,
    scene_revision: u64,
    map: ShadowMap,
}

/// Bakes direct lighting from a set of lights into per-surface lightmaps.
///
/// A rebuild clears the targeted lightmaps, then for every enabled light
/// renders one shadow map over all surfaces and adds that light's
/// contribution to each targeted surface. Nothing happens between rebuilds.
pub struct LightmapBaker {
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: BakeConfig,
    format: LightmapFormat,
    layouts: BindLayouts,
    shadows: ShadowRenderer,
    contributions: ContributionPipelines,
    meshes: BTreeMap<MeshHandle, MeshEntry>,
    surfaces: BTreeMap<SurfaceHandle, Surface>,
    lights: BTreeMap<LightHandle, Light>,
    shadow_cache: HashMap<LightHandle, CachedShadow>,
    scene_revision: u64,
    state: BakeState,
    next_id: u32,
}

impl LightmapBaker {
    /// Build a baker on `gpu`. Fails if the lightmap format cannot be rendered
    /// or a shadow map size exceeds the device limits.
    pub fn new(gpu: &GpuContext, config: BakeConfig) -> Result<Self> {
        config.validate(gpu.device.limits().max_texture_dimension_2d)?;
        let format = gpu.resolve_lightmap_format(config.lightmap_format)?;
        let device = gpu.device.clone();
        let layouts = BindLayouts::new(&device);
        let shadows = ShadowRenderer::new(&device, &layouts);
        let contributions = ContributionPipelines::new(&device, &layouts, format.texture_format());

        Ok(Self {
            device,
            queue: gpu.queue.clone(),
            config,
            format,
            layouts,
            shadows,
            contributions,
            meshes: BTreeMap::new(),
            surfaces: BTreeMap::new(),
            lights: BTreeMap::new(),
            shadow_cache: HashMap::new(),
            scene_revision: 0,
            state: BakeState::Idle,
            next_id: 1,
        })
    }

    /// Config the baker was created with.
    pub fn config(&self) -> &BakeConfig {
        &self.config
    }

    /// Format the lightmaps are actually stored in, after any fallback.
    pub fn lightmap_format(&self) -> LightmapFormat {
        self.format
    }

    /// Bind group layouts shared with renderers that draw baked surfaces.
    pub fn bind_layouts(&self) -> &BindLayouts {
        &self.layouts
    }

    /// Current phase of the rebuild state machine. `Idle` outside `rebuild`.
    pub fn state(&self) -> BakeState {
        self.state
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // Meshes

    /// Validate and store a mesh layout. GPU buffers are created per lightmap size on first use.
    pub fn register_mesh(&mut self, layout: MeshLayout) -> Result<MeshHandle> {
        layout.validate()?;
        let handle = MeshHandle(self.next_id());
        self.meshes.insert(
            handle,
            MeshEntry {
                layout,
                classes: HashMap::new(),
            },
        );
        Ok(handle)
    }

    fn acquire_class(&mut self, mesh: MeshHandle, mapping: TexelMapping) -> Result<()> {
        let entry = self
            .meshes
            .get_mut(&mesh)
            .ok_or(BakeError::UnknownMesh(mesh))?;
        if let Some(class) = entry.classes.get_mut(&mapping) {
            class.users += 1;
            return Ok(());
        }
        let gpu_mesh = GpuMesh::upload(&self.device, &entry.layout, mapping)?;
        entry.classes.insert(
            mapping,
            ResolutionClass {
                mesh: gpu_mesh,
                users: 1,
            },
        );
        Ok(())
    }

    fn release_class(&mut self, mesh: MeshHandle, mapping: TexelMapping) {
        let Some(entry) = self.meshes.get_mut(&mesh) else {
            return;
        };
        if let Some(class) = entry.classes.get_mut(&mapping) {
            class.users = class.users.saturating_sub(1);
            if class.users == 0 {
                entry.classes.remove(&mapping);
            }
        }
    }

    // Surfaces

    /// Create a surface receiving a `width` x `height` lightmap. The lightmap
    /// starts black until the next rebuild.
    pub fn create_surface(
        &mut self,
        model: Mat4,
        width: u32,
        height: u32,
        mesh: MeshHandle,
    ) -> Result<SurfaceHandle> {
        if !self.meshes.contains_key(&mesh) {
            return Err(BakeError::UnknownMesh(mesh));
        }
        let accumulator = LightmapAccumulator::new(
            &self.device,
            &self.queue,
            &self.layouts,
            width,
            height,
            self.format.texture_format(),
        )?;
        let mapping = TexelMapping::new(width, height);
        self.acquire_class(mesh, mapping)?;

        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("surface-uniforms"),
                contents: bytemuck::bytes_of(&SurfaceUniforms::new(model)),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("surface-bind-group"),
            layout: &self.layouts.surface,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let handle = SurfaceHandle(self.next_id());
        self.surfaces.insert(
            handle,
            Surface {
                mesh,
                mapping,
                accumulator,
                bind_group,
                bake_enabled: true,
            },
        );
        self.scene_revision += 1;
        Ok(handle)
    }

    /// Remove a surface and free its lightmaps.
    pub fn destroy_surface(&mut self, handle: SurfaceHandle) -> Result<()> {
        let surface = self
            .surfaces
            .remove(&handle)
            .ok_or(BakeError::UnknownSurface(handle))?;
        self.release_class(surface.mesh, surface.mapping);
        self.scene_revision += 1;
        Ok(())
    }

    /// Exclude a surface from receiving light. It still casts shadows.
    pub fn set_surface_enabled(&mut self, handle: SurfaceHandle, enabled: bool) -> Result<()> {
        self.surfaces
            .get_mut(&handle)
            .ok_or(BakeError::UnknownSurface(handle))?
            .bake_enabled = enabled;
        Ok(())
    }

    /// Handles of every live surface, in creation order.
    pub fn surface_handles(&self) -> impl Iterator<Item = SurfaceHandle> + '_ {
        self.surfaces.keys().copied()
    }

    /// Whether `handle` still refers to a live surface.
    pub fn contains_surface(&self, handle: SurfaceHandle) -> bool {
        self.surfaces.contains_key(&handle)
    }

    /// Move every surface of `mesh` at lightmap size `from` to size `to`.
    ///
    /// Both buffers of each affected surface are recreated black and the mesh
    /// is remapped onto the new texel grid. Returns how many surfaces moved.
    pub fn resize_resolution_class(
        &mut self,
        mesh: MeshHandle,
        from: (u32, u32),
        to: (u32, u32),
    ) -> Result<usize> {
        if !self.meshes.contains_key(&mesh) {
            return Err(BakeError::UnknownMesh(mesh));
        }
        let from = TexelMapping::new(from.0, from.1);
        let to = TexelMapping::new(to.0, to.1);
        if from == to {
            return Ok(0);
        }

        let affected: Vec<SurfaceHandle> = self
            .surfaces
            .iter()
            .filter(|(_, surface)| surface.mesh == mesh && surface.mapping == from)
            .map(|(handle, _)| *handle)
            .collect();

        // Allocate everything first so a bad size leaves the old class intact.
        let mut accumulators = Vec::with_capacity(affected.len());
        for _ in &affected {
            accumulators.push(LightmapAccumulator::new(
                &self.device,
                &self.queue,
                &self.layouts,
                to.width,
                to.height,
                self.format.texture_format(),
            )?);
        }

        for (handle, accumulator) in affected.iter().zip(accumulators) {
            self.acquire_class(mesh, to)?;
            self.release_class(mesh, from);
            if let Some(surface) = self.surfaces.get_mut(handle) {
                surface.accumulator = accumulator;
                surface.mapping = to;
            }
        }

        log::debug!(
            "resized {} surface(s) of {mesh:?} from {}x{} to {}x{}",
            affected.len(),
            from.width,
            from.height,
            to.width,
            to.height
        );
        Ok(affected.len())
    }

    // Lights

    /// Register a light. It takes part in the next rebuild.
    pub fn add_light(&mut self, light: Light) -> LightHandle {
        let handle = LightHandle(self.next_id());
        self.lights.insert(handle, light);
        handle
    }

    /// Remove a light and its cached shadow map, returning the light.
    pub fn remove_light(&mut self, handle: LightHandle) -> Result<Light> {
        self.shadow_cache.remove(&handle);
        self.lights
            .remove(&handle)
            .ok_or(BakeError::UnknownLight(handle))
    }

    /// Enable or disable a light. Disabled lights are skipped by rebuilds.
    pub fn set_enabled(&mut self, handle: LightHandle, enabled: bool) -> Result<()> {
        self.light_mut(handle)?.set_enabled(enabled);
        Ok(())
    }

    /// Look up a light.
    pub fn light(&self, handle: LightHandle) -> Result<&Light> {
        self.lights.get(&handle).ok_or(BakeError::UnknownLight(handle))
    }

    /// Mutable access for the light's setters. Changes take effect at the
    /// next rebuild.
    pub fn light_mut(&mut self, handle: LightHandle) -> Result<&mut Light> {
        self.lights
            .get_mut(&handle)
            .ok_or(BakeError::UnknownLight(handle))
    }

    /// Every registered light with its handle.
    pub fn lights(&self) -> impl Iterator<Item = (LightHandle, &Light)> + '_ {
        self.lights.iter().map(|(handle, light)| (*handle, light))
    }

    // Output

    /// Texture holding the result of the last rebuild for `handle`.
    pub fn baked_lightmap(&self, handle: SurfaceHandle) -> Result<&wgpu::Texture> {
        Ok(self.surface(handle)?.accumulator.read_texture())
    }

    /// View of [`LightmapBaker::baked_lightmap`] for sampling.
    pub fn baked_lightmap_view(&self, handle: SurfaceHandle) -> Result<&wgpu::TextureView> {
        Ok(self.surface(handle)?.accumulator.read_view())
    }

    /// Number of shadow maps kept for reuse by the next rebuild.
    pub fn cached_shadow_maps(&self) -> usize {
        self.shadow_cache.len()
    }

    /// Which of the surface's two buffers currently holds the result.
    pub fn read_slot(&self, handle: SurfaceHandle) -> Result<BufferSlot> {
        Ok(self.surface(handle)?.accumulator.read_slot())
    }

    /// Bindings and mesh needed to draw `handle` with its lightmap.
    pub fn surface_draw(&self, handle: SurfaceHandle) -> Result<SurfaceDraw<'_>> {
        let surface = self.surface(handle)?;
        let mesh = self.gpu_mesh(surface)?;
        Ok(SurfaceDraw {
            surface_bind_group: &surface.bind_group,
            mesh,
            lightmap: surface.accumulator.read_view(),
        })
    }

    /// Copy the baked lightmap of `handle` back to the CPU.
    pub fn read_lightmap(&self, handle: SurfaceHandle) -> Result<LightmapImage> {
        let texture = self.baked_lightmap(handle)?;
        readback::read_lightmap(&self.device, &self.queue, texture, self.format)
    }

    /// Read back the lightmap of `handle` and write it as an sRGB PNG.
    pub fn save_lightmap_png(&self, handle: SurfaceHandle, path: impl AsRef<Path>, exposure: f32) -> Result<()> {
        self.read_lightmap(handle)?.save_png(path, exposure)
    }

    fn surface(&self, handle: SurfaceHandle) -> Result<&Surface> {
        self.surfaces
            .get(&handle)
            .ok_or(BakeError::UnknownSurface(handle))
    }

    fn gpu_mesh(&self, surface: &Surface) -> Result<&GpuMesh> {
        class_mesh(&self.meshes, surface)
    }

    // Baking

    /// Rebake every surface from every light.
    pub fn rebuild_all(&mut self) -> Result<BakeReport> {
        let surfaces: Vec<SurfaceHandle> = self.surfaces.keys().copied().collect();
        let lights: Vec<LightHandle> = self.lights.keys().copied().collect();
        self.rebuild(&surfaces, &lights)
    }

    /// Clear `surfaces` and accumulate the contribution of each enabled light
    /// in `lights` into them. Blocks until the GPU has finished.
    ///
    /// Handles that no longer exist are skipped and listed in the report.
    pub fn rebuild(&mut self, surfaces: &[SurfaceHandle], lights: &[LightHandle]) -> Result<BakeReport> {
        if self.state != BakeState::Idle {
            return Err(BakeError::RebuildInProgress);
        }
        let result = self.run_bake(surfaces, lights);
        transition(&mut self.state, BakeState::Idle);
        result
    }

    fn run_bake(&mut self, surfaces: &[SurfaceHandle], lights: &[LightHandle]) -> Result<BakeReport> {
        let started = Instant::now();
        let mut report = BakeReport::default();

        self.evict_disabled_shadows();
        let targets = self.resolve_surfaces(surfaces, &mut report);
        let light_ids = self.resolve_lights(lights, &mut report);

        transition(&mut self.state, BakeState::Clearing);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lightmap-clear"),
            });
        for handle in &targets {
            if let Some(surface) = self.surfaces.get_mut(handle) {
                surface.accumulator.clear(&mut encoder);
            }
        }
        self.queue.submit(Some(encoder.finish()));

        for light_id in light_ids {
            transition(&mut self.state, BakeState::PerLight);
            self.bake_light(light_id, &targets, &mut report)?;
        }

        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|err| BakeError::Readback(err.to_string()))?;

        report.surfaces_baked = targets.len();
        report.elapsed = started.elapsed();
        log::info!(
            "baked {} light(s) into {} surface(s): {} draw calls, {} vertices, {} shadow map(s) rendered, {} reused in {:.2?}",
            report.lights_baked,
            report.surfaces_baked,
            report.draw_calls,
            report.vertices,
            report.shadow_maps_rendered,
            report.shadow_maps_reused,
            report.elapsed
        );
        Ok(report)
    }

    fn resolve_surfaces(&self, requested: &[SurfaceHandle], report: &mut BakeReport) -> Vec<SurfaceHandle> {
        let mut handles = requested.to_vec();
        handles.sort_unstable();
        handles.dedup();
        handles
            .into_iter()
            .filter(|handle| match self.surfaces.get(handle) {
                Some(surface) => surface.bake_enabled,
                None => {
                    log::warn!("skipping unknown surface {handle:?}");
                    report.skipped_surfaces.push(*handle);
                    false
                }
            })
            .collect()
    }

    /// Drop cached shadow maps of lights that are currently disabled.
    fn evict_disabled_shadows(&mut self) {
        let lights = &self.lights;
        self.shadow_cache
            .retain(|handle, _| lights.get(handle).is_some_and(Light::is_enabled));
    }

    fn resolve_lights(&self, requested: &[LightHandle], report: &mut BakeReport) -> Vec<LightHandle> {
        let mut handles = requested.to_vec();
        handles.sort_unstable();
        handles.dedup();
        handles
            .into_iter()
            .filter(|handle| match self.lights.get(handle) {
                Some(light) => light.is_enabled(),
                None => {
                    log::warn!("skipping unknown light {handle:?}");
                    report.skipped_lights.push(*handle);
                    false
                }
            })
            .collect()
    }

    /// Render (or reuse) the light's shadow map, then apply it to every
    /// target, all in one submission.
    fn bake_light(&mut self, light_id: LightHandle, targets: &[SurfaceHandle], report: &mut BakeReport) -> Result<()> {
        let Self {
            device,
            queue,
            config,
            layouts,
            shadows,
            contributions,
            meshes,
            surfaces,
            lights,
            shadow_cache,
            scene_revision,
            state,
            ..
        } = self;

        let light = lights.get(&light_id).ok_or(BakeError::UnknownLight(light_id))?;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("lightmap-bake"),
        });

        let cached = shadow_cache
            .remove(&light_id)
            .filter(|cached| {
                cached.light_revision == light.revision() && cached.scene_revision == *scene_revision
            });
        let shadow_map = match cached {
            Some(cached) => {
                report.shadow_maps_reused += 1;
                cached.map
            }
            None => {
                let map = ShadowMap::for_light(device, light, config);
                let mut casters = Vec::with_capacity(surfaces.len());
                for surface in surfaces.values() {
                    casters.push(ShadowCaster {
                        surface_bind_group: &surface.bind_group,
                        mesh: class_mesh(meshes, surface)?,
                    });
                }
                report.count(shadows.render(queue, &mut encoder, &map, &casters));
                report.shadow_maps_rendered += 1;
                map
            }
        };

        let uniforms = LightUniforms::new(light, &shadow_map, config);
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("light-uniforms"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let light_bind_group =
            contributions.light_bind_group(device, layouts, &uniform_buffer, &shadow_map);
        let pipeline = contributions.pipeline_for(light);

        transition(state, BakeState::PerSurfaceApply);
        for handle in targets {
            let Some(surface) = surfaces.get_mut(handle) else {
                continue;
            };
            let mesh = class_mesh(meshes, surface)?;
            let stats = surface.accumulator.apply(
                &mut encoder,
                &LightPass {
                    pipeline,
                    surface_bind_group: &surface.bind_group,
                    light_bind_group: &light_bind_group,
                    mesh,
                },
            );
            report.count(stats);
        }
        queue.submit(Some(encoder.finish()));
        report.lights_baked += 1;

        if config.cache_shadow_maps {
            shadow_cache.insert(
                light_id,
                CachedShadow {
                    light_revision: light.revision(),
                    scene_revision: *scene_revision,
                    map: shadow_map,
                },
            );
        }
        Ok(())
    }
}

fn transition(state: &mut BakeState, next: BakeState) {
    if *state != next {
        log::debug!("bake state {:?} -> {:?}", state, next);
        *state = next;
    }
}

fn class_mesh<'a>(meshes: &'a BTreeMap<MeshHandle, MeshEntry>, surface: &Surface) -> Result<&'a GpuMesh> {
    meshes
        .get(&surface.mesh)
        .and_then(|entry| entry.classes.get(&surface.mapping))
        .map(|class| &class.mesh)
        .ok_or(BakeError::UnknownMesh(surface.mesh))
}
