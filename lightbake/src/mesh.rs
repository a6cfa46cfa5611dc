use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use wgpu::util::DeviceExt;

use crate::error::{BakeError, Result};

/// Vertex consumed by every bake, shadow and forward pipeline.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct BakeVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub albedo_uv: [f32; 2],
    /// Lightmap coordinate at the center of the texel owned by this corner.
    pub lightmap_uv: [f32; 2],
    /// Lightmap coordinate in clip space, on the texel grid.
    pub lightmap_clip: [f32; 2],
}

impl BakeVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x2,
        3 => Float32x2,
        4 => Float32x2,
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<BakeVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Maps lightmap coordinates onto the texel grid of one lightmap size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TexelMapping {
    pub width: u32,
    pub height: u32,
}

impl TexelMapping {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn size(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }

    /// Snap `uv` to the nearest texel edge.
    pub fn edge(&self, uv: Vec2) -> Vec2 {
        (uv * self.size()).round()
    }

    /// Texel center sampled at this corner of a lightmap quad.
    ///
    /// `corner` is set on an axis when the vertex sits on the far edge of its
    /// quad, so the sample moves back inside the quad.
    pub fn sample_uv(&self, uv: Vec2, corner: [bool; 2]) -> Vec2 {
        let c = corner_offset(corner);
        (self.edge(uv) + Vec2::splat(0.5) - c) / self.size()
    }

    /// Clip-space position of the vertex when rasterizing into the lightmap.
    pub fn clip(&self, uv: Vec2, corner: [bool; 2]) -> Vec2 {
        let c = corner_offset(corner);
        let on_grid = self.sample_uv(uv, corner) + (c - Vec2::splat(0.5)) / self.size();
        Vec2::new(on_grid.x * 2.0 - 1.0, 1.0 - on_grid.y * 2.0)
    }
}

fn corner_offset(corner: [bool; 2]) -> Vec2 {
    Vec2::new(corner[0] as u32 as f32, corner[1] as u32 as f32)
}

/// Resolution independent vertex description.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub albedo_uv: Vec2,
    pub lightmap_uv: Vec2,
    pub corner: [bool; 2],
}

impl LayoutVertex {
    pub fn new(position: Vec3, normal: Vec3, albedo_uv: Vec2, lightmap_uv: Vec2) -> Self {
        Self {
            position,
            normal,
            albedo_uv,
            lightmap_uv,
            corner: [false, false],
        }
    }

    #[must_use]
    pub fn with_corner(mut self, x: bool, y: bool) -> Self {
        self.corner = [x, y];
        self
    }

    pub fn to_bake_vertex(&self, mapping: TexelMapping) -> BakeVertex {
        BakeVertex {
            position: self.position.to_array(),
            normal: self.normal.to_array(),
            albedo_uv: self.albedo_uv.to_array(),
            lightmap_uv: mapping.sample_uv(self.lightmap_uv, self.corner).to_array(),
            lightmap_clip: mapping.clip(self.lightmap_uv, self.corner).to_array(),
        }
    }
}

/// Axis aligned rectangle in lightmap space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UvRect {
    pub min: Vec2,
    pub max: Vec2,
}

impl UvRect {
    pub const FULL: UvRect = UvRect {
        min: Vec2::ZERO,
        max: Vec2::ONE,
    };

    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }
}

/// Indexed triangle list with lightmap coordinates, independent of any
/// lightmap size.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshLayout {
    pub vertices: Vec<LayoutVertex>,
    pub indices: Vec<u32>,
}

impl MeshLayout {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Check the index list forms whole triangles over existing vertices.
    pub fn validate(&self) -> Result<()> {
        if self.indices.is_empty() {
            return Err(BakeError::InvalidMesh("no triangles"));
        }
        if self.indices.len() % 3 != 0 {
            return Err(BakeError::InvalidMesh("index count is not a multiple of 3"));
        }
        let count = self.vertices.len() as u32;
        if self.indices.iter().any(|&index| index >= count) {
            return Err(BakeError::InvalidMesh("index out of range"));
        }
        Ok(())
    }

    /// Resolve every vertex against one lightmap size.
    pub fn map_to(&self, mapping: TexelMapping) -> Vec<BakeVertex> {
        self.vertices
            .iter()
            .map(|vertex| vertex.to_bake_vertex(mapping))
            .collect()
    }

    /// A single upward facing square spanning the whole lightmap.
    pub fn plane(half_size: f32) -> MeshLayout {
        let mut builder = MeshBuilder::new();
        builder.quad(
            [
                Vec3::new(-half_size, 0.0, -half_size),
                Vec3::new(half_size, 0.0, -half_size),
                Vec3::new(half_size, 0.0, half_size),
                Vec3::new(-half_size, 0.0, half_size),
            ],
            Vec3::Y,
            UvRect::FULL,
            UvRect::FULL,
        );
        builder.build()
    }

    /// Axis aligned box with each face in its own cell of a 3x2 lightmap atlas.
    pub fn cuboid(half_extents: Vec3) -> MeshLayout {
        let h = half_extents;
        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::NEG_Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::NEG_Y),
            (Vec3::Y, Vec3::X, Vec3::Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::Z, Vec3::X, Vec3::NEG_Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::NEG_Y),
        ];

        let mut builder = MeshBuilder::new();
        for (i, (normal, right, down)) in faces.into_iter().enumerate() {
            let center = normal * h;
            let r = right * h;
            let d = down * h;
            let cell = Vec2::new((i % 3) as f32, (i / 3) as f32);
            let rect = UvRect::new(cell / Vec2::new(3.0, 2.0), (cell + 1.0) / Vec2::new(3.0, 2.0));
            builder.quad(
                [center - r - d, center + r - d, center + r + d, center - r + d],
                normal,
                UvRect::FULL,
                rect,
            );
        }
        builder.build()
    }
}

/// Incrementally assembles a [`MeshLayout`].
#[derive(Debug, Default)]
pub struct MeshBuilder {
    layout: MeshLayout,
}

impl MeshBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the next pushed vertex will receive.
    pub fn offset(&self) -> u32 {
        self.layout.vertices.len() as u32
    }

    pub fn vertex(&mut self, vertex: LayoutVertex) -> u32 {
        let index = self.offset();
        self.layout.vertices.push(vertex);
        index
    }

    pub fn triangle(&mut self, a: u32, b: u32, c: u32) -> &mut Self {
        self.layout.indices.extend_from_slice(&[a, b, c]);
        self
    }

    /// Push a quad. `positions` run from the lightmap rect's min corner
    /// around through (max, min), (max, max) and (min, max).
    pub fn quad(
        &mut self,
        positions: [Vec3; 4],
        normal: Vec3,
        albedo: UvRect,
        lightmap: UvRect,
    ) -> &mut Self {
        const CORNERS: [[bool; 2]; 4] = [[false, false], [true, false], [true, true], [false, true]];
        let base = self.offset();
        for (position, corner) in positions.into_iter().zip(CORNERS) {
            let pick = |rect: &UvRect| {
                Vec2::new(
                    if corner[0] { rect.max.x } else { rect.min.x },
                    if corner[1] { rect.max.y } else { rect.min.y },
                )
            };
            self.vertex(
                LayoutVertex::new(position, normal, pick(&albedo), pick(&lightmap))
                    .with_corner(corner[0], corner[1]),
            );
        }
        self.triangle(base, base + 1, base + 2);
        self.triangle(base, base + 2, base + 3)
    }

    pub fn build(self) -> MeshLayout {
        self.layout
    }
}

/// Vertex and index buffers of one mesh mapped at one lightmap size.
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
    pub vertex_count: u32,
}

impl GpuMesh {
    pub fn upload(device: &wgpu::Device, layout: &MeshLayout, mapping: TexelMapping) -> Result<Self> {
        layout.validate()?;
        let vertices = layout.map_to(mapping);

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("bake-mesh-vertices"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("bake-mesh-indices"),
            contents: bytemuck::cast_slice(&layout.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: layout.indices.len() as u32,
            vertex_count: vertices.len() as u32,
        })
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec2, b: Vec2) -> bool {
        (a - b).abs().max_element() < 1e-6
    }

    #[test]
    fn clip_lands_on_texel_edges() {
        let mapping = TexelMapping::new(4, 8);
        // uv 0.26 snaps to edge 1 of 4 horizontally, 0.5 is edge 4 of 8.
        let clip = mapping.clip(Vec2::new(0.26, 0.5), [false, false]);
        assert!(approx(clip, Vec2::new(-0.5, 0.0)));

        let clip = mapping.clip(Vec2::new(0.26, 0.5), [true, true]);
        assert!(approx(clip, Vec2::new(-0.5, 0.0)));
    }

    #[test]
    fn sample_stays_inside_quad() {
        let mapping = TexelMapping::new(4, 4);
        let low = mapping.sample_uv(Vec2::ZERO, [false, false]);
        let high = mapping.sample_uv(Vec2::ONE, [true, true]);
        assert!(approx(low, Vec2::splat(0.125)));
        assert!(approx(high, Vec2::splat(0.875)));
    }

    #[test]
    fn top_left_of_lightmap_is_top_of_clip_space() {
        let mapping = TexelMapping::new(16, 16);
        let clip = mapping.clip(Vec2::ZERO, [false, false]);
        assert!(approx(clip, Vec2::new(-1.0, 1.0)));
        let clip = mapping.clip(Vec2::ONE, [true, true]);
        assert!(approx(clip, Vec2::new(1.0, -1.0)));
    }

    #[test]
    fn quad_assigns_corner_flags_and_two_triangles() {
        let mut builder = MeshBuilder::new();
        builder.quad([Vec3::ZERO; 4], Vec3::Y, UvRect::FULL, UvRect::FULL);
        let layout = builder.build();

        assert_eq!(layout.triangle_count(), 2);
        assert_eq!(layout.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(layout.vertices[0].corner, [false, false]);
        assert_eq!(layout.vertices[2].corner, [true, true]);
        assert_eq!(layout.vertices[3].lightmap_uv, Vec2::new(0.0, 1.0));
    }

    #[test]
    fn validation_catches_broken_layouts() {
        assert!(MeshLayout::default().validate().is_err());

        let mut layout = MeshLayout::plane(1.0);
        assert!(layout.validate().is_ok());
        layout.indices.push(0);
        assert!(layout.validate().is_err());
        layout.indices.extend_from_slice(&[1, 99]);
        assert!(matches!(layout.validate(), Err(BakeError::InvalidMesh("index out of range"))));
    }

    #[test]
    fn cuboid_faces_get_disjoint_atlas_cells() {
        let layout = MeshLayout::cuboid(Vec3::ONE);
        assert_eq!(layout.vertices.len(), 24);
        assert_eq!(layout.triangle_count(), 12);

        let mut cells: Vec<(u32, u32)> = layout
            .vertices
            .chunks(4)
            .map(|quad| {
                let min = quad[0].lightmap_uv;
                ((min.x * 3.0).round() as u32, (min.y * 2.0).round() as u32)
            })
            .collect();
        cells.sort_unstable();
        cells.dedup();
        assert_eq!(cells.len(), 6);
    }

    #[test]
    fn cuboid_normals_match_face_winding_plane() {
        let layout = MeshLayout::cuboid(Vec3::new(1.0, 2.0, 3.0));
        for quad in layout.vertices.chunks(4) {
            let center = quad.iter().map(|v| v.position).sum::<Vec3>() / 4.0;
            assert!(center.normalize().dot(quad[0].normal) > 0.0);
        }
    }
}
