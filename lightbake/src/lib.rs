//! Lightbake - texture-space direct lighting on the GPU.
//!
//! Surfaces are rasterized in lightmap space, one pass per light, with each
//! pass adding that light's shadowed contribution to the running total. The
//! resulting textures are sampled at render time by [`forward`].

pub mod baker;
pub mod config;
pub mod contribution;
pub mod error;
pub mod forward;
pub mod gpu;
pub mod layouts;
pub mod light;
pub mod lightmap;
pub mod mesh;
pub mod readback;
pub mod shading;
pub mod shadow;

pub use crate::baker::{
    BakeReport, BakeState, LightHandle, LightmapBaker, MeshHandle, SurfaceDraw, SurfaceHandle,
};
pub use crate::config::{
    BakeConfig, DirectionalShadowConfig, LightmapFormat, PointShadowConfig, SpotShadowConfig,
};
pub use crate::error::{BakeError, Result};
pub use crate::forward::ForwardRenderer;
pub use crate::gpu::GpuContext;
pub use crate::light::{Light, LightKind};
pub use crate::lightmap::BufferSlot;
pub use crate::mesh::{BakeVertex, LayoutVertex, MeshBuilder, MeshLayout, TexelMapping, UvRect};
pub use crate::readback::LightmapImage;
pub use crate::shadow::ShadowMap;
