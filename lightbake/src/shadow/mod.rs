//! Depth maps seen from a light, consumed by the bake passes for PCF.

pub mod frustum;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use wgpu::{
    BindGroupDescriptor, BindGroupEntry, BindingResource, DepthStencilState, Extent3d,
    PipelineLayoutDescriptor, RenderPassDescriptor, RenderPipeline, RenderPipelineDescriptor,
    ShaderModuleDescriptor, ShaderSource, TextureDescriptor, TextureFormat, TextureUsages,
    TextureViewDescriptor, TextureViewDimension, VertexState,
};

use crate::config::BakeConfig;
use crate::layouts::BindLayouts;
use crate::light::{Light, LightKind};
use crate::mesh::{BakeVertex, GpuMesh};

pub const SHADOW_DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Per-face block for the shadow passes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ShadowPassUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub light_position: [f32; 4],
    /// x = near, y = far.
    pub depth_range: [f32; 4],
}

/// A single-layer depth map and the light space it was rendered in.
pub struct PlanarShadow {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub view_proj: Mat4,
    /// Eye of the light space. Only meaningful for spot lights.
    pub light_position: Vec3,
    pub near: f32,
    pub far: f32,
    pub size: u32,
}

/// Six depth faces around a point light, stored as linear distance.
pub struct CubeShadow {
    pub texture: wgpu::Texture,
    pub face_views: Vec<wgpu::TextureView>,
    pub cube_view: wgpu::TextureView,
    pub face_view_projs: [Mat4; 6],
    pub position: Vec3,
    pub size: u32,
    pub near: f32,
    pub far: f32,
}

/// Shadow resource matching the kind of light it was made for.
pub enum ShadowMap {
    /// Directional lights. Depth is linear by construction.
    Orthographic2D(PlanarShadow),
    /// Spot lights. Stores linearized distance.
    Perspective2D(PlanarShadow),
    /// Point lights.
    Cube(CubeShadow),
}

impl ShadowMap {
    /// Allocate the depth targets for `light`. Nothing is rendered yet.
    pub fn for_light(device: &wgpu::Device, light: &Light, config: &BakeConfig) -> Self {
        match *light.kind() {
            LightKind::Directional { direction } => {
                let shadow = &config.directional;
                ShadowMap::Orthographic2D(PlanarShadow::new(
                    device,
                    "directional-shadow",
                    shadow.size,
                    frustum::directional_view_proj(direction, shadow),
                    -direction * shadow.standoff,
                    shadow.near,
                    shadow.far,
                ))
            }
            LightKind::Spot {
                position,
                direction,
                outer_cutoff,
                ..
            } => {
                let view_proj = frustum::spot_view_proj(
                    position,
                    direction,
                    outer_cutoff,
                    1.0,
                    config.spot.near,
                    config.spot.far,
                );
                ShadowMap::Perspective2D(PlanarShadow::new(
                    device,
                    "spot-shadow",
                    config.spot.size,
                    view_proj,
                    position,
                    config.spot.near,
                    config.spot.far,
                ))
            }
            LightKind::Point { position } => ShadowMap::Cube(CubeShadow::new(
                device,
                position,
                config.point.size,
                config.point.near,
                config.point.far,
            )),
        }
    }

    /// View bound as `shadow_map` in the bake pass.
    pub fn sample_view(&self) -> &wgpu::TextureView {
        match self {
            ShadowMap::Orthographic2D(planar) | ShadowMap::Perspective2D(planar) => &planar.view,
            ShadowMap::Cube(cube) => &cube.cube_view,
        }
    }

    /// Light space used when sampling a 2D map. Identity for cubes.
    pub fn view_proj(&self) -> Mat4 {
        match self {
            ShadowMap::Orthographic2D(planar) | ShadowMap::Perspective2D(planar) => {
                planar.view_proj
            }
            ShadowMap::Cube(_) => Mat4::IDENTITY,
        }
    }

    pub fn is_cube(&self) -> bool {
        matches!(self, ShadowMap::Cube(_))
    }
}

impl PlanarShadow {
    fn new(
        device: &wgpu::Device,
        label: &'static str,
        size: u32,
        view_proj: Mat4,
        light_position: Vec3,
        near: f32,
        far: f32,
    ) -> Self {
        let texture = create_depth_texture(device, label, size, 1);
        let view = texture.create_view(&TextureViewDescriptor::default());
        Self {
            texture,
            view,
            view_proj,
            light_position,
            near,
            far,
            size,
        }
    }
}

impl CubeShadow {
    fn new(device: &wgpu::Device, position: Vec3, size: u32, near: f32, far: f32) -> Self {
        let texture = create_depth_texture(device, "point-shadow", size, 6);
        let face_views = (0..6)
            .map(|layer| {
                texture.create_view(&TextureViewDescriptor {
                    label: Some("point-shadow-face"),
                    dimension: Some(TextureViewDimension::D2),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();
        let cube_view = texture.create_view(&TextureViewDescriptor {
            label: Some("point-shadow-cube"),
            dimension: Some(TextureViewDimension::Cube),
            ..Default::default()
        });
        Self {
            texture,
            face_views,
            cube_view,
            face_view_projs: frustum::cube_face_view_projs(position, near, far),
            position,
            size,
            near,
            far,
        }
    }
}

fn create_depth_texture(device: &wgpu::Device, label: &'static str, size: u32, layers: u32) -> wgpu::Texture {
    device.create_texture(&TextureDescriptor {
        label: Some(label),
        size: Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: layers,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: SHADOW_DEPTH_FORMAT,
        usage: TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    })
}

/// Geometry drawn into a shadow map: a surface's transform and its mesh.
pub struct ShadowCaster<'a> {
    pub surface_bind_group: &'a wgpu::BindGroup,
    pub mesh: &'a GpuMesh,
}

/// Counters for one rendered shadow map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassStats {
    pub draw_calls: u32,
    pub vertices: u64,
}

impl std::ops::AddAssign for PassStats {
    fn add_assign(&mut self, other: Self) {
        self.draw_calls += other.draw_calls;
        self.vertices += other.vertices;
    }
}

/// Pipelines and per-face uniforms for filling [`ShadowMap`]s.
pub struct ShadowRenderer {
    depth_pipeline: RenderPipeline,
    linear_pipeline: RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    uniform_stride: u64,
}

impl ShadowRenderer {
    pub fn new(device: &wgpu::Device, layouts: &BindLayouts) -> Self {
        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("shadow-shader"),
            source: ShaderSource::Wgsl(include_str!("../shaders/shadow.wgsl").into()),
        });
        let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("shadow-pipeline-layout"),
            bind_group_layouts: &[&layouts.shadow_pass, &layouts.surface],
            immediate_size: 0,
        });

        let depth_pipeline = create_shadow_pipeline(device, &layout, &shader, "vs_depth", None);
        let linear_pipeline =
            create_shadow_pipeline(device, &layout, &shader, "vs_linear", Some("fs_linear"));

        let alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        let size = std::mem::size_of::<ShadowPassUniforms>() as u64;
        let uniform_stride = (size + alignment - 1) & !(alignment - 1);

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("shadow-pass-uniforms"),
            size: uniform_stride * 6,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("shadow-pass-bind-group"),
            layout: &layouts.shadow_pass,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &uniform_buffer,
                    offset: 0,
                    size: std::num::NonZeroU64::new(size),
                }),
            }],
        });

        Self {
            depth_pipeline,
            linear_pipeline,
            uniform_buffer,
            uniform_bind_group,
            uniform_stride,
        }
    }

    /// Record the passes that fill `map` with the depth of `casters`.
    ///
    /// The uniform slots are rewritten on every call, so each call must be
    /// followed by its own submission before the next one.
    pub fn render(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        map: &ShadowMap,
        casters: &[ShadowCaster<'_>],
    ) -> PassStats {
        match map {
            ShadowMap::Orthographic2D(planar) => {
                self.write_slot(
                    queue,
                    0,
                    planar.view_proj,
                    planar.light_position,
                    planar.near,
                    planar.far,
                );
                self.render_face(encoder, &self.depth_pipeline, &planar.view, 0, casters)
            }
            ShadowMap::Perspective2D(planar) => {
                self.write_slot(
                    queue,
                    0,
                    planar.view_proj,
                    planar.light_position,
                    planar.near,
                    planar.far,
                );
                self.render_face(encoder, &self.linear_pipeline, &planar.view, 0, casters)
            }
            ShadowMap::Cube(cube) => {
                let mut stats = PassStats::default();
                for (face, (view, view_proj)) in
                    cube.face_views.iter().zip(cube.face_view_projs).enumerate()
                {
                    self.write_slot(queue, face, view_proj, cube.position, cube.near, cube.far);
                    stats += self.render_face(encoder, &self.linear_pipeline, view, face, casters);
                }
                stats
            }
        }
    }

    fn write_slot(
        &self,
        queue: &wgpu::Queue,
        slot: usize,
        view_proj: Mat4,
        light_position: Vec3,
        near: f32,
        far: f32,
    ) {
        let uniforms = ShadowPassUniforms {
            view_proj: view_proj.to_cols_array_2d(),
            light_position: light_position.extend(1.0).to_array(),
            depth_range: [near, far, 0.0, 0.0],
        };
        queue.write_buffer(
            &self.uniform_buffer,
            slot as u64 * self.uniform_stride,
            bytemuck::bytes_of(&uniforms),
        );
    }

    fn render_face(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &RenderPipeline,
        target: &wgpu::TextureView,
        slot: usize,
        casters: &[ShadowCaster<'_>],
    ) -> PassStats {
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("shadow-pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: target,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            multiview_mask: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        pass.set_pipeline(pipeline);
        let offset = (slot as u64 * self.uniform_stride) as u32;
        pass.set_bind_group(0, &self.uniform_bind_group, &[offset]);

        let mut stats = PassStats::default();
        for caster in casters {
            pass.set_bind_group(1, caster.surface_bind_group, &[]);
            caster.mesh.draw(&mut pass);
            stats.draw_calls += 1;
            stats.vertices += caster.mesh.index_count as u64;
        }
        stats
    }
}

fn create_shadow_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    vertex_entry: &'static str,
    fragment_entry: Option<&'static str>,
) -> RenderPipeline {
    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some(vertex_entry),
        layout: Some(layout),
        vertex: VertexState {
            module: shader,
            entry_point: Some(vertex_entry),
            buffers: &[BakeVertex::layout()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: fragment_entry.map(|entry| wgpu::FragmentState {
            module: shader,
            entry_point: Some(entry),
            targets: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            // Face bases mirror some cube faces, so winding is not reliable.
            cull_mode: None,
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: Some(DepthStencilState {
            format: SHADOW_DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}
