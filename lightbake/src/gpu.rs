use wgpu::{DeviceDescriptor, Instance, RequestAdapterOptions};

use crate::config::LightmapFormat;
use crate::error::{BakeError, Result};

/// Device and queue shared by the baker and whatever renders its output.
pub struct GpuContext {
    pub instance: Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Open a device without a presentation surface.
    pub fn headless() -> Result<Self> {
        let instance = Instance::default();
        Self::with_instance(instance, None)
    }

    /// Open a device able to present to `surface`.
    pub fn for_surface(instance: Instance, surface: &wgpu::Surface<'_>) -> Result<Self> {
        Self::with_instance(instance, Some(surface))
    }

    fn with_instance(instance: Instance, surface: Option<&wgpu::Surface<'_>>) -> Result<Self> {
        let adapter = pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface,
            force_fallback_adapter: false,
        }))?;

        // Ask for the packed float render target only when the adapter has it.
        let required_features =
            adapter.features() & LightmapFormat::Packed.required_features();

        let (device, queue) = pollster::block_on(adapter.request_device(&DeviceDescriptor {
            label: Some("lightbake-device"),
            required_features,
            required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: wgpu::Trace::Off,
        }))?;

        let info = adapter.get_info();
        log::info!("using {} ({:?})", info.name, info.backend);

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    /// Resolve the requested lightmap format against what the device can
    /// render, falling back from the packed format to half floats.
    pub fn resolve_lightmap_format(&self, requested: LightmapFormat) -> Result<LightmapFormat> {
        if self.supports(requested) {
            return Ok(requested);
        }
        if requested == LightmapFormat::Packed && self.supports(LightmapFormat::Half) {
            log::warn!(
                "{:?} is not renderable here, baking into {:?}",
                requested.texture_format(),
                LightmapFormat::Half.texture_format()
            );
            return Ok(LightmapFormat::Half);
        }
        Err(BakeError::UnsupportedFormat(requested.texture_format()))
    }

    fn supports(&self, format: LightmapFormat) -> bool {
        if !self.device.features().contains(format.required_features()) {
            return false;
        }
        let features = self
            .adapter
            .get_texture_format_features(format.texture_format());
        features
            .allowed_usages
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING)
    }
}
