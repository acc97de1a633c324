use thiserror::Error;

use crate::blend::Operator;
use crate::format::PictFormat;
use crate::sampler::PictFilter;

pub type Result<T> = std::result::Result<T, RenderError>;

/// Errors returned by the render entry points.
///
/// Most variants are declines: the 3D path cannot express the request and the caller is
/// expected to fall back to another path. [`RenderError::is_fallback`] separates those from
/// the fatal resource failures.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("unsupported composite operator {0}")]
    UnsupportedOperator(u8),

    #[error("unsupported picture format {0:?}")]
    UnsupportedFormat(PictFormat),

    #[error("destination is not backed by a drawable")]
    UnsupportedDestination,

    #[error("surface {width}x{height} exceeds the 3D pipe limit of {max}")]
    SurfaceTooLarge { width: u32, height: u32, max: u32 },

    #[error("unsupported picture filter {0:?}")]
    UnsupportedFilter(PictFilter),

    #[error("picture has no backing storage and needs a software fixup")]
    NeedsFixup,

    #[error("component-alpha mask cannot be expressed for operator {op:?}")]
    UnsupportedComponentAlpha { op: Operator },

    #[error("unsupported raster operation {0:#x}")]
    UnsupportedAlu(u8),

    #[error("no render format for drawables of depth {0}")]
    UnsupportedDepth(u8),

    #[error("copy between overlapping regions of the same buffer")]
    OverlappingCopy,

    #[error("batch has no room for {words} words and {surfaces} surfaces")]
    OutOfSpace { words: usize, surfaces: usize },

    #[error("failed to upload {bytes} bytes of vertex data")]
    VertexUpload { bytes: usize },

    #[error("failed to upload {bytes} bytes of static state")]
    StaticUpload { bytes: usize },

    #[error("no solid-color buffer available for {color:#010x}")]
    SolidUnavailable { color: u32 },
}

impl RenderError {
    /// Whether the request was declined and should be retried through another path.
    pub fn is_fallback(&self) -> bool {
        !matches!(
            self,
            RenderError::OutOfSpace { .. }
                | RenderError::VertexUpload { .. }
                | RenderError::StaticUpload { .. }
                | RenderError::SolidUnavailable { .. }
        )
    }
}
