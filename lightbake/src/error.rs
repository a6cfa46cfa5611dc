use std::path::PathBuf;

use thiserror::Error;

use crate::baker::{LightHandle, MeshHandle, SurfaceHandle};

/// Errors produced while creating bake resources or driving a rebuild.
#[derive(Debug, Error)]
pub enum BakeError {
    #[error("no compatible GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to open GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("lightmap format {0:?} is not renderable on this device")]
    UnsupportedFormat(wgpu::TextureFormat),

    #[error("invalid lightmap size {width}x{height} (device limit {max})")]
    InvalidLightmapSize { width: u32, height: u32, max: u32 },

    #[error("invalid {light} shadow map size {size} (device limit {max})")]
    InvalidShadowMapSize {
        light: &'static str,
        size: u32,
        max: u32,
    },

    #[error("unknown surface {0:?}")]
    UnknownSurface(SurfaceHandle),

    #[error("unknown light {0:?}")]
    UnknownLight(LightHandle),

    #[error("unknown mesh {0:?}")]
    UnknownMesh(MeshHandle),

    #[error("invalid mesh layout: {0}")]
    InvalidMesh(&'static str),

    #[error("a rebuild is already in progress")]
    RebuildInProgress,

    #[error("invalid light parameter: {0}")]
    InvalidLightParameter(&'static str),

    #[error("lightmap readback failed: {0}")]
    Readback(String),

    #[error("failed to parse bake config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image export failed: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, BakeError>;
