//! Pictures as supplied by the caller, and the sampled channels they are prepared into.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::RenderConfig;
use crate::error::{RenderError, Result};
use crate::format::{PictFormat, SurfaceFormat};
use crate::sampler::{Extend, Filter, PictFilter, Repeat};
use crate::transform::Transform;
use crate::transport::{Buffer, Transport};

/// A GPU-backed image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pixmap {
    pub buffer: Buffer,
    pub width: u32,
    pub height: u32,
    pub depth: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PictureSource {
    /// A constant a8r8g8b8 color.
    Solid { color: u32 },
    /// A drawable at offset (`x`, `y`) within its backing pixmap.
    Drawable {
        pixmap: Pixmap,
        #[serde(default)]
        x: i16,
        #[serde(default)]
        y: i16,
    },
    /// A source without pixel storage, such as a gradient.
    Gradient,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Picture {
    pub source: PictureSource,
    pub format: PictFormat,
    #[serde(default)]
    pub transform: Option<Transform>,
    #[serde(default)]
    pub filter: PictFilter,
    #[serde(default)]
    pub repeat: Repeat,
    #[serde(default)]
    pub component_alpha: bool,
}

impl Picture {
    pub fn solid(color: u32) -> Self {
        Self {
            source: PictureSource::Solid { color },
            format: PictFormat::A8r8g8b8,
            transform: None,
            filter: PictFilter::Nearest,
            repeat: Repeat::Normal,
            component_alpha: false,
        }
    }

    pub fn drawable(pixmap: Pixmap, format: PictFormat) -> Self {
        Self {
            source: PictureSource::Drawable { pixmap, x: 0, y: 0 },
            format,
            transform: None,
            filter: PictFilter::Nearest,
            repeat: Repeat::None,
            component_alpha: false,
        }
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct ChannelFlags: u8 {
        /// A 1x1 repeating constant color.
        const SOLID = 1 << 0;
        /// Every sampled texel has full alpha.
        const OPAQUE = 1 << 1;
        /// Per-component mask values (mask channels only).
        const COMPONENT_ALPHA = 1 << 2;
    }
}

/// One sampled input of an operation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Channel {
    pub buffer: Buffer,
    pub width: u32,
    pub height: u32,
    pub card_format: SurfaceFormat,
    pub transform: Option<Transform>,
    pub filter: Filter,
    pub extend: Extend,
    /// Added to request coordinates before transformation.
    pub offset: [i32; 2],
    /// Normalizes texel coordinates into [0, 1].
    pub scale: [f32; 2],
    pub flags: ChannelFlags,
}

impl Channel {
    /// A repeating 1x1 channel over a solid-color buffer.
    pub fn solid(buffer: Buffer, color: u32) -> Self {
        let mut flags = ChannelFlags::SOLID;
        if color >> 24 == 0xff {
            flags |= ChannelFlags::OPAQUE;
        }
        Self {
            buffer,
            width: 1,
            height: 1,
            card_format: SurfaceFormat::B8G8R8A8Unorm,
            transform: None,
            filter: Filter::Nearest,
            extend: Extend::Repeat,
            offset: [0, 0],
            scale: [1.0, 1.0],
            flags,
        }
    }

    pub fn is_solid(&self) -> bool {
        self.flags.contains(ChannelFlags::SOLID)
    }

    #[cfg(test)]
    fn is_opaque(&self) -> bool {
        self.flags.contains(ChannelFlags::OPAQUE)
    }

    pub fn has_component_alpha(&self) -> bool {
        self.flags.contains(ChannelFlags::COMPONENT_ALPHA)
    }

    pub fn is_affine(&self) -> bool {
        self.transform.map_or(true, |t| t.is_affine())
    }
}

/// Prepares `picture` for sampling at (`x`, `y`) on behalf of a draw at (`dst_x`, `dst_y`).
pub fn prepare_channel<T: Transport>(
    t: &mut T,
    config: &RenderConfig,
    picture: &Picture,
    x: i32,
    y: i32,
    dst_x: i32,
    dst_y: i32,
) -> Result<Channel> {
    let (pixmap, dx, dy) = match picture.source {
        PictureSource::Solid { color } => {
            let buffer = t
                .solid(color)
                .ok_or(RenderError::SolidUnavailable { color })?;
            return Ok(Channel::solid(buffer, color));
        }
        PictureSource::Gradient => return Err(RenderError::NeedsFixup),
        PictureSource::Drawable { pixmap, x, y } => (pixmap, i32::from(x), i32::from(y)),
    };

    let extend = Extend::from(picture.repeat);
    let mut filter =
        Filter::from_picture(picture.filter).ok_or(RenderError::UnsupportedFilter(picture.filter))?;

    let mut x = x + dx;
    let mut y = y + dy;
    let transform = match picture.transform {
        None => {
            filter = Filter::Nearest;
            None
        }
        Some(transform) => match transform.integer_translation() {
            Some((tx, ty)) => {
                x += tx;
                y += ty;
                filter = Filter::Nearest;
                None
            }
            None => Some(transform),
        },
    };

    let card_format = picture
        .format
        .texture_format()
        .ok_or(RenderError::UnsupportedFormat(picture.format))?;
    if !config.fits(pixmap.width, pixmap.height) {
        return Err(RenderError::SurfaceTooLarge {
            width: pixmap.width,
            height: pixmap.height,
            max: config.max_3d_size,
        });
    }

    let mut flags = ChannelFlags::empty();
    if !picture.format.has_alpha() {
        flags |= ChannelFlags::OPAQUE;
    }
    if picture.component_alpha && picture.format.has_rgb() {
        flags |= ChannelFlags::COMPONENT_ALPHA;
    }

    let channel = Channel {
        buffer: pixmap.buffer,
        width: pixmap.width,
        height: pixmap.height,
        card_format,
        transform,
        filter,
        extend,
        offset: [x - dst_x, y - dst_y],
        scale: [1.0 / pixmap.width as f32, 1.0 / pixmap.height as f32],
        flags,
    };
    trace!(
        buffer = channel.buffer.id.0,
        ?filter,
        ?extend,
        affine = channel.is_affine(),
        offset = ?channel.offset,
        "channel prepared"
    );
    Ok(channel)
}

/// Drops the reference a prepared channel holds on transient storage.
pub fn release_channel<T: Transport>(t: &mut T, channel: &Channel) {
    if channel.is_solid() {
        t.destroy(channel.buffer.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{BufferId, MemoryBatch, Tiling};

    fn pixmap(width: u32, height: u32) -> Pixmap {
        Pixmap {
            buffer: Buffer {
                id: BufferId(5),
                pitch: width * 4,
                tiling: Tiling::None,
            },
            width,
            height,
            depth: 32,
        }
    }

    #[test]
    fn solid_pictures_become_repeating_texels() {
        let mut batch = MemoryBatch::default();
        let channel = prepare_channel(
            &mut batch,
            &RenderConfig::default(),
            &Picture::solid(0xffff_0000),
            3,
            4,
            0,
            0,
        )
        .unwrap();
        assert!(channel.is_solid());
        assert!(channel.is_opaque());
        assert_eq!((channel.width, channel.height), (1, 1));
        assert_eq!(channel.extend, Extend::Repeat);
        assert_eq!(batch.buffer_refs(channel.buffer.id), 1);

        release_channel(&mut batch, &channel);
        assert_eq!(batch.buffer_refs(channel.buffer.id), 0);
    }

    #[test]
    fn drawable_offsets_and_scale() {
        let mut batch = MemoryBatch::default();
        let mut picture = Picture::drawable(pixmap(64, 32), PictFormat::X8r8g8b8);
        picture.source = PictureSource::Drawable {
            pixmap: pixmap(64, 32),
            x: 2,
            y: 3,
        };
        picture.filter = PictFilter::Bilinear;
        picture.transform = Some(Transform::translate(10.0, 20.0));

        let channel =
            prepare_channel(&mut batch, &RenderConfig::default(), &picture, 1, 1, 5, 5).unwrap();
        assert_eq!(channel.transform, None);
        assert_eq!(channel.filter, Filter::Nearest);
        assert_eq!(channel.offset, [1 + 2 + 10 - 5, 1 + 3 + 20 - 5]);
        assert_eq!(channel.scale, [1.0 / 64.0, 1.0 / 32.0]);
        assert_eq!(channel.card_format, SurfaceFormat::B8G8R8X8Unorm);
        assert!(channel.is_opaque());
    }

    #[test]
    fn scaled_transforms_are_kept() {
        let mut batch = MemoryBatch::default();
        let mut picture = Picture::drawable(pixmap(16, 16), PictFormat::A8r8g8b8);
        picture.filter = PictFilter::Bilinear;
        picture.transform = Some(Transform::scale(0.5, 0.5));
        let channel =
            prepare_channel(&mut batch, &RenderConfig::default(), &picture, 0, 0, 0, 0).unwrap();
        assert_eq!(channel.filter, Filter::Bilinear);
        assert!(channel.is_affine());
        assert!(channel.transform.is_some());
    }

    #[test]
    fn declines() {
        let mut batch = MemoryBatch::default();
        let config = RenderConfig::default();

        let mut picture = Picture::drawable(pixmap(16, 16), PictFormat::A8r8g8b8);
        picture.filter = PictFilter::Convolution;
        assert!(matches!(
            prepare_channel(&mut batch, &config, &picture, 0, 0, 0, 0),
            Err(RenderError::UnsupportedFilter(PictFilter::Convolution))
        ));

        let picture = Picture::drawable(pixmap(16, 16), PictFormat::A1);
        assert!(matches!(
            prepare_channel(&mut batch, &config, &picture, 0, 0, 0, 0),
            Err(RenderError::UnsupportedFormat(PictFormat::A1))
        ));

        let picture = Picture::drawable(pixmap(20000, 16), PictFormat::A8);
        assert!(matches!(
            prepare_channel(&mut batch, &config, &picture, 0, 0, 0, 0),
            Err(RenderError::SurfaceTooLarge { width: 20000, .. })
        ));

        let mut picture = Picture::solid(0);
        picture.source = PictureSource::Gradient;
        assert!(matches!(
            prepare_channel(&mut batch, &config, &picture, 0, 0, 0, 0),
            Err(RenderError::NeedsFixup)
        ));
    }

    #[test]
    fn component_alpha_requires_rgb() {
        let mut batch = MemoryBatch::default();
        let config = RenderConfig::default();
        let mut picture = Picture::drawable(pixmap(8, 8), PictFormat::A8);
        picture.component_alpha = true;
        let channel = prepare_channel(&mut batch, &config, &picture, 0, 0, 0, 0).unwrap();
        assert!(!channel.has_component_alpha());

        picture.format = PictFormat::A8r8g8b8;
        let channel = prepare_channel(&mut batch, &config, &picture, 0, 0, 0, 0).unwrap();
        assert!(channel.has_component_alpha());
    }
}
