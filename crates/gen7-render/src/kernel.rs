//! Pixel-shader kernel identities and selection.

use crate::blend::Operator;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kernel {
    NoMask = 0,
    NoMaskProjective,
    Mask,
    MaskProjective,
    MaskCa,
    MaskCaProjective,
    MaskCaSrcAlpha,
    MaskCaSrcAlphaProjective,
    VideoPlanar,
    VideoPacked,
}

pub const KERNEL_COUNT: usize = 10;

impl Kernel {
    pub const ALL: [Kernel; KERNEL_COUNT] = [
        Kernel::NoMask,
        Kernel::NoMaskProjective,
        Kernel::Mask,
        Kernel::MaskProjective,
        Kernel::MaskCa,
        Kernel::MaskCaProjective,
        Kernel::MaskCaSrcAlpha,
        Kernel::MaskCaSrcAlphaProjective,
        Kernel::VideoPlanar,
        Kernel::VideoPacked,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Kernel::NoMask => "NOMASK",
            Kernel::NoMaskProjective => "NOMASK_PROJECTIVE",
            Kernel::Mask => "MASK",
            Kernel::MaskProjective => "MASK_PROJECTIVE",
            Kernel::MaskCa => "MASKCA",
            Kernel::MaskCaProjective => "MASKCA_PROJECTIVE",
            Kernel::MaskCaSrcAlpha => "MASKCA_SRCALPHA",
            Kernel::MaskCaSrcAlphaProjective => "MASKCA_SRCALPHA_PROJECTIVE",
            Kernel::VideoPlanar => "VIDEO_PLANAR",
            Kernel::VideoPacked => "VIDEO_PACKED",
        }
    }

    fn projective(self) -> Self {
        match self {
            Kernel::NoMask => Kernel::NoMaskProjective,
            Kernel::Mask => Kernel::MaskProjective,
            Kernel::MaskCa => Kernel::MaskCaProjective,
            Kernel::MaskCaSrcAlpha => Kernel::MaskCaSrcAlphaProjective,
            other => other,
        }
    }
}

/// Picks the composite kernel for an operator and channel configuration.
pub fn choose_composite_kernel(
    op: Operator,
    has_mask: bool,
    is_ca: bool,
    is_affine: bool,
) -> Kernel {
    let base = if has_mask {
        if is_ca {
            if op.info().src_alpha {
                Kernel::MaskCaSrcAlpha
            } else {
                Kernel::MaskCa
            }
        } else {
            Kernel::Mask
        }
    } else {
        Kernel::NoMask
    };

    if is_affine {
        base
    } else {
        base.projective()
    }
}

/// Shader programs, one per [`Kernel`], as 128-bit instructions.
///
/// The programs themselves are opaque to the renderer; they are uploaded into the static state
/// buffer and referenced by offset.
#[derive(Clone, Debug)]
pub struct KernelBinaries {
    programs: Vec<Vec<[u32; 4]>>,
}

impl KernelBinaries {
    pub fn from_fn(mut f: impl FnMut(Kernel) -> Vec<[u32; 4]>) -> Self {
        Self {
            programs: Kernel::ALL.iter().map(|&kernel| f(kernel)).collect(),
        }
    }

    /// One zeroed instruction per kernel. Sufficient for command-stream inspection.
    pub fn placeholder() -> Self {
        Self::from_fn(|_| vec![[0; 4]])
    }

    pub fn get(&self, kernel: Kernel) -> &[[u32; 4]] {
        &self.programs[kernel.index()]
    }
}
