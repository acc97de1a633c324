//! Sampler filter/extend modes and the sampler-pair table layout.

use serde::{Deserialize, Serialize};

use crate::hw::{self, SamplerState};

/// Filters requested by a picture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PictFilter {
    #[default]
    Nearest,
    Bilinear,
    Fast,
    Good,
    Best,
    Convolution,
}

/// Repeat modes requested by a picture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Repeat {
    #[default]
    None,
    Normal,
    Pad,
    Reflect,
}

/// Filters the sampler table is built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest = 0,
    Bilinear = 1,
}

pub const FILTER_COUNT: u32 = 2;

impl Filter {
    pub const ALL: [Filter; FILTER_COUNT as usize] = [Filter::Nearest, Filter::Bilinear];

    pub fn from_picture(filter: PictFilter) -> Option<Self> {
        match filter {
            PictFilter::Nearest => Some(Filter::Nearest),
            PictFilter::Bilinear => Some(Filter::Bilinear),
            _ => None,
        }
    }

    fn map_filter(self) -> u32 {
        match self {
            Filter::Nearest => hw::MAPFILTER_NEAREST,
            Filter::Bilinear => hw::MAPFILTER_LINEAR,
        }
    }
}

/// Edge behavior of a sampled channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Extend {
    None = 0,
    Repeat = 1,
    Pad = 2,
    Reflect = 3,
}

pub const EXTEND_COUNT: u32 = 4;

impl Extend {
    pub const ALL: [Extend; EXTEND_COUNT as usize] =
        [Extend::None, Extend::Repeat, Extend::Pad, Extend::Reflect];

    fn wrap_mode(self) -> u32 {
        match self {
            Extend::None => hw::TEXCOORDMODE_CLAMP_BORDER,
            Extend::Repeat => hw::TEXCOORDMODE_WRAP,
            Extend::Pad => hw::TEXCOORDMODE_CLAMP,
            Extend::Reflect => hw::TEXCOORDMODE_MIRROR,
        }
    }
}

impl From<Repeat> for Extend {
    fn from(repeat: Repeat) -> Self {
        match repeat {
            Repeat::None => Extend::None,
            Repeat::Normal => Extend::Repeat,
            Repeat::Pad => Extend::Pad,
            Repeat::Reflect => Extend::Reflect,
        }
    }
}

/// Size in bytes of the full sampler-pair table.
pub const SAMPLER_TABLE_BYTES: u32 =
    FILTER_COUNT * EXTEND_COUNT * FILTER_COUNT * EXTEND_COUNT * 2 * SamplerState::SIZE_BYTES;

/// Byte offset of the (source, mask) sampler pair within the sampler table.
pub fn sampler_offset(
    src_filter: Filter,
    src_extend: Extend,
    mask_filter: Filter,
    mask_extend: Extend,
) -> u32 {
    let index = ((src_filter as u32 * EXTEND_COUNT + src_extend as u32) * FILTER_COUNT
        + mask_filter as u32)
        * EXTEND_COUNT
        + mask_extend as u32;
    index * 2 * SamplerState::SIZE_BYTES
}

pub fn sampler_state(filter: Filter, extend: Extend) -> SamplerState {
    SamplerState::new(filter.map_filter(), extend.wrap_mode())
}

/// Builds every (source, mask) sampler pair in table order.
pub fn build_sampler_table() -> Vec<SamplerState> {
    let mut table = Vec::with_capacity((SAMPLER_TABLE_BYTES / SamplerState::SIZE_BYTES) as usize);
    for src_filter in Filter::ALL {
        for src_extend in Extend::ALL {
            for mask_filter in Filter::ALL {
                for mask_extend in Extend::ALL {
                    table.push(sampler_state(src_filter, src_extend));
                    table.push(sampler_state(mask_filter, mask_extend));
                }
            }
        }
    }
    table
}
