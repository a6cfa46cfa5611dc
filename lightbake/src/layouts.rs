use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4};
use wgpu::{
    BindGroupLayout, BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingType,
    BufferBindingType, SamplerBindingType, ShaderStages, TextureSampleType, TextureViewDimension,
};

/// Per-surface transform block, group 1 of every bake and shadow pipeline.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SurfaceUniforms {
    pub model: [[f32; 4]; 4],
    /// Inverse transpose of the model's upper 3x3, one padded column per row
    /// to match WGSL `mat3x3` layout.
    pub normal: [[f32; 4]; 3],
}

impl SurfaceUniforms {
    pub fn new(model: Mat4) -> Self {
        let normal = Mat3::from_mat4(model).inverse().transpose();
        Self {
            model: model.to_cols_array_2d(),
            normal: [
                normal.x_axis.extend(0.0).to_array(),
                normal.y_axis.extend(0.0).to_array(),
                normal.z_axis.extend(0.0).to_array(),
            ],
        }
    }
}

/// Bind group layouts shared between the accumulator, shadow renderer and
/// contribution pipelines.
pub struct BindLayouts {
    /// Group 0 of the bake pass: the accumulator's read buffer.
    pub accumulator: BindGroupLayout,
    pub surface: BindGroupLayout,
    /// Group 2 of the directional and spot bake passes.
    pub light_planar: BindGroupLayout,
    /// Group 2 of the point bake pass.
    pub light_cube: BindGroupLayout,
    /// Group 0 of the shadow passes, one dynamic slot per face.
    pub shadow_pass: BindGroupLayout,
}

impl BindLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let accumulator = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("lightmap-read-layout"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: false },
                    view_dimension: TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            }],
        });

        let surface = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("surface-layout"),
            entries: &[uniform_entry(
                0,
                ShaderStages::VERTEX_FRAGMENT,
                std::mem::size_of::<SurfaceUniforms>(),
                false,
            )],
        });

        let light_planar = light_layout(device, "light-planar-layout", TextureViewDimension::D2);
        let light_cube = light_layout(device, "light-cube-layout", TextureViewDimension::Cube);

        let shadow_pass = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("shadow-pass-layout"),
            entries: &[uniform_entry(
                0,
                ShaderStages::VERTEX_FRAGMENT,
                std::mem::size_of::<crate::shadow::ShadowPassUniforms>(),
                true,
            )],
        });

        Self {
            accumulator,
            surface,
            light_planar,
            light_cube,
            shadow_pass,
        }
    }
}

fn uniform_entry(
    binding: u32,
    visibility: ShaderStages,
    size: usize,
    has_dynamic_offset: bool,
) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset,
            min_binding_size: std::num::NonZeroU64::new(size as u64),
        },
        count: None,
    }
}

fn light_layout(
    device: &wgpu::Device,
    label: &'static str,
    view_dimension: TextureViewDimension,
) -> BindGroupLayout {
    device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[
            uniform_entry(
                0,
                ShaderStages::FRAGMENT,
                std::mem::size_of::<crate::contribution::LightUniforms>(),
                false,
            ),
            BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Depth,
                    view_dimension,
                    multisampled: false,
                },
                count: None,
            },
            BindGroupLayoutEntry {
                binding: 2,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Sampler(SamplerBindingType::Comparison),
                count: None,
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn surface_uniforms_match_wgsl_size() {
        assert_eq!(std::mem::size_of::<SurfaceUniforms>(), 112);
    }

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let model = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let uniforms = SurfaceUniforms::new(model);
        assert_eq!(uniforms.normal[0], [0.5, 0.0, 0.0, 0.0]);
        assert_eq!(uniforms.normal[1], [0.0, 1.0, 0.0, 0.0]);
    }
}
