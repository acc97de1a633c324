//! Porter-Duff operators and the precomputed blend-state table.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::format::PictFormat;
use crate::hw::BlendState;

/// Hardware blend factors.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    One = 0x01,
    SrcColor = 0x02,
    SrcAlpha = 0x03,
    DstAlpha = 0x04,
    DstColor = 0x05,
    SrcAlphaSaturate = 0x06,
    ConstColor = 0x07,
    ConstAlpha = 0x08,
    Src1Color = 0x09,
    Src1Alpha = 0x0A,
    Zero = 0x11,
    InvSrcColor = 0x12,
    InvSrcAlpha = 0x13,
    InvDstAlpha = 0x14,
}

/// Stride of the factor axis in the blend table.
pub const BLENDFACTOR_COUNT: u32 = BlendFactor::InvDstAlpha as u32 + 1;
/// Size in bytes of the full blend table.
pub const BLEND_TABLE_BYTES: u32 = BLENDFACTOR_COUNT * BLENDFACTOR_COUNT * BlendState::SIZE_BYTES;

/// The thirteen Porter-Duff operators accepted by the composite path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Clear = 0,
    Src = 1,
    Dst = 2,
    Over = 3,
    OverReverse = 4,
    In = 5,
    InReverse = 6,
    Out = 7,
    OutReverse = 8,
    Atop = 9,
    AtopReverse = 10,
    Xor = 11,
    Add = 12,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlendInfo {
    /// The destination factor reads source alpha.
    pub src_alpha: bool,
    pub src: BlendFactor,
    pub dst: BlendFactor,
}

const fn info(src_alpha: bool, src: BlendFactor, dst: BlendFactor) -> BlendInfo {
    BlendInfo {
        src_alpha,
        src,
        dst,
    }
}

const BLEND_OPS: [BlendInfo; 13] = [
    info(false, BlendFactor::Zero, BlendFactor::Zero),
    info(false, BlendFactor::One, BlendFactor::Zero),
    info(false, BlendFactor::Zero, BlendFactor::One),
    info(true, BlendFactor::One, BlendFactor::InvSrcAlpha),
    info(false, BlendFactor::InvDstAlpha, BlendFactor::One),
    info(false, BlendFactor::DstAlpha, BlendFactor::Zero),
    info(true, BlendFactor::Zero, BlendFactor::SrcAlpha),
    info(false, BlendFactor::InvDstAlpha, BlendFactor::Zero),
    info(true, BlendFactor::Zero, BlendFactor::InvSrcAlpha),
    info(true, BlendFactor::DstAlpha, BlendFactor::InvSrcAlpha),
    info(true, BlendFactor::InvDstAlpha, BlendFactor::SrcAlpha),
    info(true, BlendFactor::InvDstAlpha, BlendFactor::InvSrcAlpha),
    info(false, BlendFactor::One, BlendFactor::One),
];

impl Operator {
    pub const ALL: [Operator; 13] = [
        Operator::Clear,
        Operator::Src,
        Operator::Dst,
        Operator::Over,
        Operator::OverReverse,
        Operator::In,
        Operator::InReverse,
        Operator::Out,
        Operator::OutReverse,
        Operator::Atop,
        Operator::AtopReverse,
        Operator::Xor,
        Operator::Add,
    ];

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn info(self) -> BlendInfo {
        BLEND_OPS[self as usize]
    }
}

/// Resolves the source and destination factors for `op`.
///
/// Destinations without an alpha channel read alpha as one, so destination-alpha factors are
/// folded to constants. With a component-alpha mask the per-channel mask lands in the source
/// color, so source-alpha destination factors become source-color factors.
pub fn blend_factors(
    op: Operator,
    component_alpha: bool,
    dst_format: PictFormat,
) -> (BlendFactor, BlendFactor) {
    let info = op.info();
    let mut src = info.src;
    let mut dst = info.dst;

    if !dst_format.has_alpha() {
        src = match src {
            BlendFactor::DstAlpha => BlendFactor::One,
            BlendFactor::InvDstAlpha => BlendFactor::Zero,
            other => other,
        };
    }

    if component_alpha && info.src_alpha {
        dst = match dst {
            BlendFactor::SrcAlpha => BlendFactor::SrcColor,
            BlendFactor::InvSrcAlpha => BlendFactor::InvSrcColor,
            other => other,
        };
    }

    (src, dst)
}

/// Byte offset of the blend-state entry for a factor pair within the blend table.
pub fn blend_offset(src: BlendFactor, dst: BlendFactor) -> u32 {
    ((src as u32) * BLENDFACTOR_COUNT + dst as u32) * BlendState::SIZE_BYTES
}

pub fn get_blend(op: Operator, component_alpha: bool, dst_format: PictFormat) -> u32 {
    let (src, dst) = blend_factors(op, component_alpha, dst_format);
    trace!(?op, component_alpha, ?dst_format, ?src, ?dst, "blend");
    blend_offset(src, dst)
}

/// Builds the full blend table, one 64-byte entry per (src, dst) factor pair.
pub fn build_blend_table() -> Vec<BlendState> {
    let mut table = Vec::with_capacity((BLENDFACTOR_COUNT * BLENDFACTOR_COUNT) as usize);
    for src in 0..BLENDFACTOR_COUNT {
        for dst in 0..BLENDFACTOR_COUNT {
            table.push(BlendState::new(src, dst));
        }
    }
    table
}
