//! Picture formats and their hardware surface-format equivalents.

use serde::{Deserialize, Serialize};

/// Hardware surface formats understood by the sampler and render-target paths.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SurfaceFormat {
    B8G8R8A8Unorm = 0x0C0,
    B8G8R8X8Unorm = 0x0E9,
    R8G8B8A8Unorm = 0x0C7,
    R8G8B8X8Unorm = 0x0EB,
    B10G10R10A2Unorm = 0x0D1,
    R10G10B10A2Unorm = 0x0C2,
    B10G10R10X2Unorm = 0x0EE,
    R8G8B8Unorm = 0x193,
    B5G6R5Unorm = 0x100,
    B5G5R5A1Unorm = 0x102,
    B4G4R4A4Unorm = 0x104,
    A8Unorm = 0x144,
    R8Unorm = 0x140,
    YCrCbNormal = 0x182,
    YCrCbSwapY = 0x190,
    R32G32Float = 0x085,
    R32G32B32Float = 0x040,
    R32G32B32A32Float = 0x000,
    R16G16SScaled = 0x0F6,
}

impl SurfaceFormat {
    pub fn bits(self) -> u32 {
        self as u32
    }

    /// Whether the format can be bound as a render target.
    pub fn is_render_target(self) -> bool {
        matches!(
            self,
            SurfaceFormat::B8G8R8A8Unorm
                | SurfaceFormat::R8G8B8A8Unorm
                | SurfaceFormat::B10G10R10A2Unorm
                | SurfaceFormat::R10G10B10A2Unorm
                | SurfaceFormat::B5G6R5Unorm
                | SurfaceFormat::B5G5R5A1Unorm
                | SurfaceFormat::A8Unorm
                | SurfaceFormat::B4G4R4A4Unorm
        )
    }
}

/// Client-visible pixel layouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PictFormat {
    A8r8g8b8,
    X8r8g8b8,
    A8b8g8r8,
    X8b8g8r8,
    A2r10g10b10,
    X2r10g10b10,
    A2b10g10r10,
    R8g8b8,
    R5g6b5,
    A1r5g5b5,
    X1r5g5b5,
    A4r4g4b4,
    X4r4g4b4,
    A8,
    A1,
}

impl PictFormat {
    pub fn has_alpha(self) -> bool {
        matches!(
            self,
            PictFormat::A8r8g8b8
                | PictFormat::A8b8g8r8
                | PictFormat::A2r10g10b10
                | PictFormat::A2b10g10r10
                | PictFormat::A1r5g5b5
                | PictFormat::A4r4g4b4
                | PictFormat::A8
                | PictFormat::A1
        )
    }

    pub fn has_rgb(self) -> bool {
        !matches!(self, PictFormat::A8 | PictFormat::A1)
    }

    pub fn depth(self) -> u8 {
        match self {
            PictFormat::A8r8g8b8 | PictFormat::A8b8g8r8 => 32,
            PictFormat::A2r10g10b10 | PictFormat::A2b10g10r10 => 32,
            PictFormat::X2r10g10b10 => 30,
            PictFormat::X8r8g8b8 | PictFormat::X8b8g8r8 | PictFormat::R8g8b8 => 24,
            PictFormat::R5g6b5 | PictFormat::A1r5g5b5 | PictFormat::A4r4g4b4 => 16,
            PictFormat::X1r5g5b5 => 15,
            PictFormat::X4r4g4b4 => 12,
            PictFormat::A8 => 8,
            PictFormat::A1 => 1,
        }
    }

    /// Default picture format for a drawable of the given depth.
    pub fn for_depth(depth: u8) -> Option<Self> {
        match depth {
            32 => Some(PictFormat::A8r8g8b8),
            30 => Some(PictFormat::A2r10g10b10),
            24 => Some(PictFormat::X8r8g8b8),
            16 => Some(PictFormat::R5g6b5),
            15 => Some(PictFormat::X1r5g5b5),
            8 => Some(PictFormat::A8),
            _ => None,
        }
    }

    /// Render-target format used when this picture is the destination.
    ///
    /// Formats without alpha are written through their alpha-carrying twin; the blend unit is
    /// told to treat destination alpha as one.
    pub fn render_target_format(self) -> Option<SurfaceFormat> {
        match self {
            PictFormat::A8r8g8b8 | PictFormat::X8r8g8b8 => Some(SurfaceFormat::B8G8R8A8Unorm),
            PictFormat::A8b8g8r8 | PictFormat::X8b8g8r8 => Some(SurfaceFormat::R8G8B8A8Unorm),
            PictFormat::A2r10g10b10 | PictFormat::X2r10g10b10 => {
                Some(SurfaceFormat::B10G10R10A2Unorm)
            }
            PictFormat::R5g6b5 => Some(SurfaceFormat::B5G6R5Unorm),
            PictFormat::A1r5g5b5 | PictFormat::X1r5g5b5 => Some(SurfaceFormat::B5G5R5A1Unorm),
            PictFormat::A8 => Some(SurfaceFormat::A8Unorm),
            PictFormat::A4r4g4b4 | PictFormat::X4r4g4b4 => Some(SurfaceFormat::B4G4R4A4Unorm),
            PictFormat::A2b10g10r10 | PictFormat::R8g8b8 | PictFormat::A1 => None,
        }
    }

    /// Sampler format used when this picture is a source or mask.
    pub fn texture_format(self) -> Option<SurfaceFormat> {
        match self {
            PictFormat::A8r8g8b8 => Some(SurfaceFormat::B8G8R8A8Unorm),
            PictFormat::X8r8g8b8 => Some(SurfaceFormat::B8G8R8X8Unorm),
            PictFormat::A8b8g8r8 => Some(SurfaceFormat::R8G8B8A8Unorm),
            PictFormat::X8b8g8r8 => Some(SurfaceFormat::R8G8B8X8Unorm),
            PictFormat::A2r10g10b10 => Some(SurfaceFormat::B10G10R10A2Unorm),
            PictFormat::X2r10g10b10 => Some(SurfaceFormat::B10G10R10X2Unorm),
            PictFormat::A2b10g10r10 => Some(SurfaceFormat::R10G10B10A2Unorm),
            PictFormat::R8g8b8 => Some(SurfaceFormat::R8G8B8Unorm),
            PictFormat::R5g6b5 => Some(SurfaceFormat::B5G6R5Unorm),
            PictFormat::A1r5g5b5 => Some(SurfaceFormat::B5G5R5A1Unorm),
            PictFormat::A4r4g4b4 => Some(SurfaceFormat::B4G4R4A4Unorm),
            PictFormat::A8 => Some(SurfaceFormat::A8Unorm),
            PictFormat::X1r5g5b5 | PictFormat::X4r4g4b4 | PictFormat::A1 => None,
        }
    }
}

/// Converts a packed pixel of a drawable with `depth` bits into a8r8g8b8.
pub fn rgba_for_color(color: u32, depth: u8) -> u32 {
    fn expand(value: u32, bits: u32) -> u32 {
        let value = value & ((1 << bits) - 1);
        let mut out = value << (8 - bits);
        out |= out >> bits;
        out & 0xff
    }

    match depth {
        1 => {
            if color & 1 != 0 {
                0xff00_0000
            } else {
                0
            }
        }
        8 => color << 24,
        15 => {
            0xff00_0000
                | expand(color >> 10, 5) << 16
                | expand(color >> 5, 5) << 8
                | expand(color, 5)
        }
        16 => {
            0xff00_0000
                | expand(color >> 11, 5) << 16
                | expand(color >> 5, 6) << 8
                | expand(color, 5)
        }
        24 => 0xff00_0000 | color,
        30 => {
            0xff00_0000
                | ((color >> 22) & 0xff) << 16
                | ((color >> 12) & 0xff) << 8
                | ((color >> 2) & 0xff)
        }
        _ => color,
    }
}

/// A 16-bit-per-channel color as supplied to the fill entry points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderColor {
    pub red: u16,
    pub green: u16,
    pub blue: u16,
    pub alpha: u16,
}

impl RenderColor {
    /// Packs the color as a8r8g8b8, truncating each channel to its high byte.
    pub fn to_a8r8g8b8(self) -> u32 {
        (u32::from(self.alpha >> 8) << 24)
            | (u32::from(self.red >> 8) << 16)
            | (u32::from(self.green >> 8) << 8)
            | u32::from(self.blue >> 8)
    }
}
