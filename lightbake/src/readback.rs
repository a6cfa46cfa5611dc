use std::path::Path;

use glam::Vec3;
use half::f16;

use crate::config::LightmapFormat;
use crate::error::{BakeError, Result};

/// CPU copy of a baked lightmap in linear RGB.
#[derive(Clone, Debug, PartialEq)]
pub struct LightmapImage {
    pub width: u32,
    pub height: u32,
    /// Row-major, top row first.
    pub texels: Vec<Vec3>,
}

impl LightmapImage {
    pub fn texel(&self, x: u32, y: u32) -> Vec3 {
        self.texels[(y * self.width + x) as usize]
    }

    /// Decode tightly packed rows of `format` texels.
    pub fn decode(width: u32, height: u32, format: LightmapFormat, bytes: &[u8]) -> Result<Self> {
        let texel_size = format.texel_size() as usize;
        let expected = width as usize * height as usize * texel_size;
        if bytes.len() != expected {
            return Err(BakeError::Readback(format!(
                "expected {expected} bytes for {width}x{height}, got {}",
                bytes.len()
            )));
        }

        let texels = bytes
            .chunks_exact(texel_size)
            .map(|texel| match format {
                LightmapFormat::Packed => {
                    unpack_rg11b10(u32::from_le_bytes([texel[0], texel[1], texel[2], texel[3]]))
                }
                LightmapFormat::Half => {
                    let channel =
                        |i: usize| f16::from_le_bytes([texel[i], texel[i + 1]]).to_f32();
                    Vec3::new(channel(0), channel(2), channel(4))
                }
                LightmapFormat::Full => {
                    let channel = |i: usize| {
                        f32::from_le_bytes([texel[i], texel[i + 1], texel[i + 2], texel[i + 3]])
                    };
                    Vec3::new(channel(0), channel(4), channel(8))
                }
            })
            .collect();

        Ok(Self {
            width,
            height,
            texels,
        })
    }

    /// Write an 8-bit sRGB preview, scaling radiance by `exposure` first.
    pub fn save_png(&self, path: impl AsRef<Path>, exposure: f32) -> Result<()> {
        let image = image::RgbImage::from_fn(self.width, self.height, |x, y| {
            let c = self.texel(x, y) * exposure;
            image::Rgb([encode_srgb(c.x), encode_srgb(c.y), encode_srgb(c.z)])
        });
        image.save(path.as_ref())?;
        Ok(())
    }
}

fn encode_srgb(linear: f32) -> u8 {
    let c = linear.clamp(0.0, 1.0);
    let encoded = if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    (encoded * 255.0).round() as u8
}

/// Copy `texture` to the CPU and decode it. Blocks until the GPU is idle.
pub fn read_lightmap(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    format: LightmapFormat,
) -> Result<LightmapImage> {
    let width = texture.width();
    let height = texture.height();
    let tight_bpr = (width * format.texel_size()) as usize;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize;
    let padded_bpr = tight_bpr.div_ceil(align) * align;

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("lightmap-readback"),
        size: (padded_bpr * height as usize) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("lightmap-readback"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bpr as u32),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(Some(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = crossbeam_channel::bounded(1);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|err| BakeError::Readback(err.to_string()))?;
    receiver
        .recv()
        .map_err(|_| BakeError::Readback("map callback dropped".into()))?
        .map_err(|err| BakeError::Readback(err.to_string()))?;

    let data = slice.get_mapped_range();
    let mut tight = Vec::with_capacity(tight_bpr * height as usize);
    for row in data.chunks(padded_bpr).take(height as usize) {
        tight.extend_from_slice(&row[..tight_bpr]);
    }
    drop(data);
    staging.unmap();

    LightmapImage::decode(width, height, format, &tight)
}

/// Decode one channel of a packed unsigned float with a 5-bit exponent.
fn unpack_ufloat(bits: u32, mantissa_bits: u32) -> f32 {
    let mantissa = bits & ((1 << mantissa_bits) - 1);
    let exponent = bits >> mantissa_bits;
    let scale = (1u32 << mantissa_bits) as f32;
    match exponent {
        0 => mantissa as f32 / scale * 2f32.powi(-14),
        31 if mantissa == 0 => f32::INFINITY,
        31 => f32::NAN,
        e => 2f32.powi(e as i32 - 15) * (1.0 + mantissa as f32 / scale),
    }
}

fn unpack_rg11b10(packed: u32) -> Vec3 {
    Vec3::new(
        unpack_ufloat(packed & 0x7ff, 6),
        unpack_ufloat((packed >> 11) & 0x7ff, 6),
        unpack_ufloat(packed >> 22, 5),
    )
}
