use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use wgpu::{
    BindGroupDescriptor, BindGroupEntry, BindingResource, ColorTargetState, ColorWrites,
    FragmentState, PipelineLayoutDescriptor, RenderPipeline, RenderPipelineDescriptor,
    ShaderModuleDescriptor, ShaderSource, VertexState,
};

use crate::config::BakeConfig;
use crate::layouts::BindLayouts;
use crate::light::{Light, LightKind};
use crate::mesh::BakeVertex;
use crate::shadow::ShadowMap;

const COMMON_SOURCE: &str = include_str!("shaders/bake_common.wgsl");

/// Group 2 uniform block of the bake passes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct LightUniforms {
    pub shadow_view_proj: [[f32; 4]; 4],
    pub position: [f32; 4],
    pub direction: [f32; 4],
    pub diffuse: [f32; 4],
    pub ambient: [f32; 4],
    /// cos inner, cos outer, near, far.
    pub cone: [f32; 4],
    /// bias, pcf radius, pcf offset, attenuation floor.
    pub shadow: [f32; 4],
}

impl LightUniforms {
    pub fn new(light: &Light, shadow_map: &ShadowMap, config: &BakeConfig) -> Self {
        let position = light.position().unwrap_or(Vec3::ZERO);
        let direction = light.direction().unwrap_or(Vec3::ZERO);

        let (cone, shadow) = match *light.kind() {
            LightKind::Directional { .. } => {
                let c = &config.directional;
                (
                    [1.0, 1.0, c.near, c.far],
                    [c.bias, c.pcf_radius as f32, 0.0, config.attenuation_floor],
                )
            }
            LightKind::Point { .. } => {
                let c = &config.point;
                (
                    [1.0, 1.0, c.near, c.far],
                    [c.bias, c.pcf_radius as f32, c.pcf_offset, config.attenuation_floor],
                )
            }
            LightKind::Spot {
                inner_cutoff,
                outer_cutoff,
                ..
            } => {
                let c = &config.spot;
                (
                    [
                        inner_cutoff.to_radians().cos(),
                        outer_cutoff.to_radians().cos(),
                        c.near,
                        c.far,
                    ],
                    [c.bias, c.pcf_radius as f32, 0.0, config.attenuation_floor],
                )
            }
        };

        Self {
            shadow_view_proj: shadow_map.view_proj().to_cols_array_2d(),
            position: position.extend(1.0).to_array(),
            direction: direction.extend(0.0).to_array(),
            diffuse: light.diffuse().extend(1.0).to_array(),
            ambient: light.ambient().extend(1.0).to_array(),
            cone,
            shadow,
        }
    }
}

/// One bake pipeline per light kind plus the shared comparison sampler.
pub struct ContributionPipelines {
    directional: RenderPipeline,
    point: RenderPipeline,
    spot: RenderPipeline,
    shadow_sampler: wgpu::Sampler,
}

impl ContributionPipelines {
    pub fn new(device: &wgpu::Device, layouts: &BindLayouts, format: wgpu::TextureFormat) -> Self {
        let directional = create_contribution_pipeline(
            device,
            layouts,
            &layouts.light_planar,
            format,
            "bake-directional",
            include_str!("shaders/bake_directional.wgsl"),
        );
        let spot = create_contribution_pipeline(
            device,
            layouts,
            &layouts.light_planar,
            format,
            "bake-spot",
            include_str!("shaders/bake_spot.wgsl"),
        );
        let point = create_contribution_pipeline(
            device,
            layouts,
            &layouts.light_cube,
            format,
            "bake-point",
            include_str!("shaders/bake_point.wgsl"),
        );

        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow-compare-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });

        Self {
            directional,
            point,
            spot,
            shadow_sampler,
        }
    }

    pub fn pipeline_for(&self, light: &Light) -> &RenderPipeline {
        match light.kind() {
            LightKind::Directional { .. } => &self.directional,
            LightKind::Point { .. } => &self.point,
            LightKind::Spot { .. } => &self.spot,
        }
    }

    /// Bind the light's uniforms and shadow map as group 2.
    pub fn light_bind_group(
        &self,
        device: &wgpu::Device,
        layouts: &BindLayouts,
        uniforms: &wgpu::Buffer,
        shadow_map: &ShadowMap,
    ) -> wgpu::BindGroup {
        let layout = if shadow_map.is_cube() {
            &layouts.light_cube
        } else {
            &layouts.light_planar
        };
        device.create_bind_group(&BindGroupDescriptor {
            label: Some("light-bind-group"),
            layout,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: uniforms.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::TextureView(shadow_map.sample_view()),
                },
                BindGroupEntry {
                    binding: 2,
                    resource: BindingResource::Sampler(&self.shadow_sampler),
                },
            ],
        })
    }
}

fn create_contribution_pipeline(
    device: &wgpu::Device,
    layouts: &BindLayouts,
    light_layout: &wgpu::BindGroupLayout,
    format: wgpu::TextureFormat,
    label: &'static str,
    fragment_source: &str,
) -> RenderPipeline {
    let source = format!("{COMMON_SOURCE}\n{fragment_source}");
    let shader = device.create_shader_module(ShaderModuleDescriptor {
        label: Some(label),
        source: ShaderSource::Wgsl(source.into()),
    });

    let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[&layouts.accumulator, &layouts.surface, light_layout],
        immediate_size: 0,
    });

    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        vertex: VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[BakeVertex::layout()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            // The shader adds to the previous total itself.
            targets: &[Some(ColorTargetState {
                format,
                blend: None,
                write_mask: ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            // Lightmap space winding is arbitrary.
            cull_mode: None,
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_matches_wgsl_size() {
        assert_eq!(std::mem::size_of::<LightUniforms>(), 160);
    }
}
