use wgpu::{
    BindGroup, CommandEncoder, Extent3d, LoadOp, Operations, RenderPass,
    RenderPassColorAttachment, RenderPassDescriptor, RenderPipeline, TextureDescriptor,
    TextureUsages, TextureView,
};

use crate::error::{BakeError, Result};
use crate::layouts::BindLayouts;
use crate::mesh::GpuMesh;
use crate::shadow::PassStats;

/// One of the two accumulation buffers of a surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferSlot {
    A,
    B,
}

impl BufferSlot {
    pub fn other(self) -> Self {
        match self {
            BufferSlot::A => BufferSlot::B,
            BufferSlot::B => BufferSlot::A,
        }
    }

    fn index(self) -> usize {
        match self {
            BufferSlot::A => 0,
            BufferSlot::B => 1,
        }
    }
}

/// Tracks which buffer holds the accumulated result. The write buffer is
/// always the other one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PingPong {
    read: BufferSlot,
}

impl Default for PingPong {
    fn default() -> Self {
        Self { read: BufferSlot::A }
    }
}

impl PingPong {
    pub fn read(&self) -> BufferSlot {
        self.read
    }

    pub fn write(&self) -> BufferSlot {
        self.read.other()
    }

    pub fn swap(&mut self) {
        self.read = self.read.other();
    }
}

struct LightmapBuffer {
    texture: wgpu::Texture,
    view: TextureView,
    /// Group 0 of the bake pass when this buffer is the read side.
    read_bind_group: BindGroup,
}

/// Everything one light pass over one surface needs besides the accumulator.
pub struct LightPass<'a> {
    pub pipeline: &'a RenderPipeline,
    pub surface_bind_group: &'a BindGroup,
    pub light_bind_group: &'a BindGroup,
    pub mesh: &'a GpuMesh,
}

/// Two same-sized color targets that light passes bounce between. Each pass
/// reads the running total from one and writes total plus contribution into
/// the other.
pub struct LightmapAccumulator {
    buffers: [LightmapBuffer; 2],
    roles: PingPong,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
}

impl LightmapAccumulator {
    /// Allocate both buffers and clear them to black.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layouts: &BindLayouts,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Result<Self> {
        let max = device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(BakeError::InvalidLightmapSize { width, height, max });
        }

        let buffers = [
            create_buffer(device, layouts, "lightmap-a", width, height, format),
            create_buffer(device, layouts, "lightmap-b", width, height, format),
        ];
        let mut accumulator = Self {
            buffers,
            roles: PingPong::default(),
            width,
            height,
            format,
        };

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("lightmap-init"),
        });
        accumulator.clear(&mut encoder);
        queue.submit(Some(encoder.finish()));

        Ok(accumulator)
    }

    /// Record a clear of both buffers to opaque black. Buffer A becomes the
    /// read side again.
    pub fn clear(&mut self, encoder: &mut CommandEncoder) {
        self.roles = PingPong::default();
        for buffer in &self.buffers {
            let pass = begin_target_pass(
                encoder,
                "lightmap-clear",
                &buffer.view,
                LoadOp::Clear(wgpu::Color::BLACK),
                self.width,
                self.height,
            );
            drop(pass);
        }
    }

    /// Record one light pass into the write buffer, reading the running total
    /// from the read buffer, then swap the roles.
    pub fn apply(&mut self, encoder: &mut CommandEncoder, light_pass: &LightPass<'_>) -> PassStats {
        let read = &self.buffers[self.roles.read().index()];
        let write = &self.buffers[self.roles.write().index()];

        let mut pass = begin_target_pass(
            encoder,
            "lightmap-apply",
            &write.view,
            LoadOp::Load,
            self.width,
            self.height,
        );
        pass.set_pipeline(light_pass.pipeline);
        pass.set_bind_group(0, &read.read_bind_group, &[]);
        pass.set_bind_group(1, light_pass.surface_bind_group, &[]);
        pass.set_bind_group(2, light_pass.light_bind_group, &[]);
        light_pass.mesh.draw(&mut pass);
        drop(pass);

        self.roles.swap();
        PassStats {
            draw_calls: 1,
            vertices: light_pass.mesh.index_count as u64,
        }
    }

    /// Texture holding the accumulated result.
    pub fn read_texture(&self) -> &wgpu::Texture {
        &self.buffers[self.roles.read().index()].texture
    }

    pub fn read_view(&self) -> &TextureView {
        &self.buffers[self.roles.read().index()].view
    }

    pub fn read_slot(&self) -> BufferSlot {
        self.roles.read()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }
}

/// Begin a pass rendering into `view` with the viewport covering exactly
/// `width` x `height`. Target and viewport end with the returned pass.
fn begin_target_pass<'e>(
    encoder: &'e mut CommandEncoder,
    label: &'static str,
    view: &TextureView,
    load: LoadOp<wgpu::Color>,
    width: u32,
    height: u32,
) -> RenderPass<'e> {
    let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        multiview_mask: None,
        occlusion_query_set: None,
        timestamp_writes: None,
    });
    pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
    pass
}

fn create_buffer(
    device: &wgpu::Device,
    layouts: &BindLayouts,
    label: &'static str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
) -> LightmapBuffer {
    let texture = device.create_texture(&TextureDescriptor {
        label: Some(label),
        size: Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: TextureUsages::RENDER_ATTACHMENT
            | TextureUsages::TEXTURE_BINDING
            | TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let read_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout: &layouts.accumulator,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::TextureView(&view),
        }],
    });
    LightmapBuffer {
        texture,
        view,
        read_bind_group,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_is_always_the_other_buffer() {
        let mut roles = PingPong::default();
        for _ in 0..5 {
            assert_ne!(roles.read(), roles.write());
            roles.swap();
        }
    }

    #[test]
    fn read_slot_follows_swap_parity() {
        let mut roles = PingPong::default();
        for passes in 0..9 {
            let expected = if passes % 2 == 0 { BufferSlot::A } else { BufferSlot::B };
            assert_eq!(roles.read(), expected, "after {passes} passes");
            roles.swap();
        }
    }
}
