//! Gen7 (Ivybridge) 3D pipe command encodings and indirect state record layouts.
//!
//! Only the subset of the command set needed to drive the pipe as a 2D blit/composite engine is
//! described here: a rectangle-list primitive, a single pixel-shader stage and the fixed-function
//! blend/sampler state that feeds it. All other stages are programmed to pass-through once per
//! batch by the invariant preamble.

use bytemuck::{Pod, Zeroable};

const fn gen7_3d(pipeline: u32, op: u32, sub: u32) -> u32 {
    (3 << 29) | (pipeline << 27) | (op << 24) | (sub << 16)
}

// MI commands.
pub const MI_FLUSH: u32 = 0x04 << 23;
pub const MI_INHIBIT_RENDER_CACHE_FLUSH: u32 = 1 << 2;
/// Mask selecting the MI opcode of a command header.
pub const MI_OPCODE_MASK: u32 = 0xff << 23;

// Non-pipelined state.
pub const PIPELINE_SELECT: u32 = gen7_3d(1, 1, 4);
pub const PIPELINE_SELECT_3D: u32 = 0;
pub const STATE_BASE_ADDRESS: u32 = gen7_3d(0, 1, 0x01);
pub const STATE_SIP: u32 = gen7_3d(0, 1, 0x02);
pub const BASE_ADDRESS_MODIFY: u32 = 1;

// Pipelined 3D state.
pub const STATE_VERTEX_BUFFERS: u32 = gen7_3d(3, 0, 0x08);
pub const STATE_VERTEX_ELEMENTS: u32 = gen7_3d(3, 0, 0x09);
pub const STATE_CLEAR_PARAMS: u32 = gen7_3d(3, 0, 0x04);
pub const STATE_DEPTH_BUFFER: u32 = gen7_3d(3, 0, 0x05);
pub const STATE_VS: u32 = gen7_3d(3, 0, 0x10);
pub const STATE_GS: u32 = gen7_3d(3, 0, 0x11);
pub const STATE_CLIP: u32 = gen7_3d(3, 0, 0x12);
pub const STATE_SF: u32 = gen7_3d(3, 0, 0x13);
pub const STATE_WM: u32 = gen7_3d(3, 0, 0x14);
pub const STATE_CONSTANT_PS: u32 = gen7_3d(3, 0, 0x17);
pub const STATE_SAMPLE_MASK: u32 = gen7_3d(3, 0, 0x18);
pub const STATE_HS: u32 = gen7_3d(3, 0, 0x1B);
pub const STATE_TE: u32 = gen7_3d(3, 0, 0x1C);
pub const STATE_DS: u32 = gen7_3d(3, 0, 0x1D);
pub const STATE_STREAMOUT: u32 = gen7_3d(3, 0, 0x1E);
pub const STATE_SBE: u32 = gen7_3d(3, 0, 0x1F);
pub const STATE_PS: u32 = gen7_3d(3, 0, 0x20);
pub const STATE_VIEWPORT_STATE_POINTERS_SF_CL: u32 = gen7_3d(3, 0, 0x21);
pub const STATE_VIEWPORT_STATE_POINTERS_CC: u32 = gen7_3d(3, 0, 0x23);
pub const STATE_BLEND_STATE_POINTERS: u32 = gen7_3d(3, 0, 0x24);
pub const STATE_BINDING_TABLE_POINTERS_PS: u32 = gen7_3d(3, 0, 0x2A);
pub const STATE_SAMPLER_STATE_POINTERS_PS: u32 = gen7_3d(3, 0, 0x2F);
pub const STATE_URB_VS: u32 = gen7_3d(3, 0, 0x30);
pub const STATE_URB_HS: u32 = gen7_3d(3, 0, 0x31);
pub const STATE_URB_DS: u32 = gen7_3d(3, 0, 0x32);
pub const STATE_URB_GS: u32 = gen7_3d(3, 0, 0x33);
pub const STATE_DRAWING_RECTANGLE: u32 = gen7_3d(3, 1, 0x00);
pub const STATE_MULTISAMPLE: u32 = gen7_3d(3, 1, 0x0D);
pub const STATE_PUSH_CONSTANT_ALLOC_PS: u32 = gen7_3d(3, 1, 0x16);
pub const PRIMITIVE: u32 = gen7_3d(3, 3, 0x00);

// 3DSTATE_MULTISAMPLE
pub const MULTISAMPLE_PIXEL_LOCATION_CENTER: u32 = 0 << 4;
pub const MULTISAMPLE_NUMSAMPLES_1: u32 = 0 << 1;

// 3DSTATE_PUSH_CONSTANT_ALLOC_* / 3DSTATE_URB_*
pub const PUSH_CONSTANT_BUFFER_OFFSET_SHIFT: u32 = 16;
pub const URB_ENTRY_NUMBER_SHIFT: u32 = 0;
pub const URB_ENTRY_SIZE_SHIFT: u32 = 16;
pub const URB_STARTING_ADDRESS_SHIFT: u32 = 25;

// 3DSTATE_SF
pub const SF_CULL_NONE: u32 = 1 << 29;
pub const SF_TRIFAN_PROVOKE_SHIFT: u32 = 25;

// 3DSTATE_SBE
pub const SBE_NUM_OUTPUTS_SHIFT: u32 = 22;
pub const SBE_URB_ENTRY_READ_LENGTH_SHIFT: u32 = 11;
pub const SBE_URB_ENTRY_READ_OFFSET_SHIFT: u32 = 4;

// 3DSTATE_WM
pub const WM_DISPATCH_ENABLE: u32 = 1 << 29;
pub const WM_PERSPECTIVE_PIXEL_BARYCENTRIC: u32 = 1 << 11;

// 3DSTATE_PS
pub const PS_SAMPLER_COUNT_SHIFT: u32 = 27;
pub const PS_BINDING_TABLE_ENTRY_COUNT_SHIFT: u32 = 18;
pub const PS_MAX_THREADS_SHIFT: u32 = 24;
pub const PS_ATTRIBUTE_ENABLE: u32 = 1 << 10;
pub const PS_16_DISPATCH_ENABLE: u32 = 1 << 1;
pub const PS_DISPATCH_START_GRF_SHIFT_0: u32 = 16;
/// Thread count programmed for the pixel-shader stage.
pub const PS_MAX_THREADS: u32 = 86;

// 3DSTATE_VERTEX_ELEMENTS
pub const VE0_VERTEX_BUFFER_INDEX_SHIFT: u32 = 26;
pub const VE0_VALID: u32 = 1 << 25;
pub const VE0_FORMAT_SHIFT: u32 = 16;
pub const VE0_OFFSET_SHIFT: u32 = 0;
pub const VE1_VFCOMPONENT_0_SHIFT: u32 = 28;
pub const VE1_VFCOMPONENT_1_SHIFT: u32 = 24;
pub const VE1_VFCOMPONENT_2_SHIFT: u32 = 20;
pub const VE1_VFCOMPONENT_3_SHIFT: u32 = 16;
pub const VFCOMPONENT_NOSTORE: u32 = 0;
pub const VFCOMPONENT_STORE_SRC: u32 = 1;
pub const VFCOMPONENT_STORE_0: u32 = 2;
pub const VFCOMPONENT_STORE_1_FLT: u32 = 3;

// 3DSTATE_VERTEX_BUFFERS
pub const VB0_BUFFER_INDEX_SHIFT: u32 = 26;
pub const VB0_VERTEXDATA: u32 = 0 << 20;
pub const VB0_ADDRESS_MODIFY_ENABLE: u32 = 1 << 14;
pub const VB0_BUFFER_PITCH_SHIFT: u32 = 0;

// 3DPRIMITIVE
pub const PRIMITIVE_VERTEX_SEQUENTIAL: u32 = 0 << 8;
pub const PRIMITIVE_RECTLIST: u32 = 0x0F;

// 3DSTATE_DEPTH_BUFFER
pub const DEPTH_BUFFER_TYPE_SHIFT: u32 = 29;
pub const DEPTH_BUFFER_FORMAT_SHIFT: u32 = 18;
pub const DEPTHFORMAT_D32_FLOAT: u32 = 1;

// SURFACE_STATE
pub const SURFACE_TYPE_SHIFT: u32 = 29;
pub const SURFACE_2D: u32 = 1;
pub const SURFACE_NULL: u32 = 7;
pub const SURFACE_FORMAT_SHIFT: u32 = 18;
pub const SURFACE_TILED: u32 = 1 << 14;
pub const SURFACE_TILED_Y: u32 = 1 << 13;
pub const SURFACE_WIDTH_SHIFT: u32 = 0;
pub const SURFACE_HEIGHT_SHIFT: u32 = 16;
pub const SURFACE_PITCH_SHIFT: u32 = 0;

// Relocation domains.
pub const DOMAIN_RENDER: u32 = 0x0000_0002;
pub const DOMAIN_SAMPLER: u32 = 0x0000_0004;
pub const DOMAIN_INSTRUCTION: u32 = 0x0000_0010;
pub const DOMAIN_VERTEX: u32 = 0x0000_0020;

// Sampler state encodings.
pub const MAPFILTER_NEAREST: u32 = 0;
pub const MAPFILTER_LINEAR: u32 = 1;
pub const TEXCOORDMODE_WRAP: u32 = 0;
pub const TEXCOORDMODE_MIRROR: u32 = 1;
pub const TEXCOORDMODE_CLAMP: u32 = 2;
pub const TEXCOORDMODE_CLAMP_BORDER: u32 = 4;

pub const BLENDFUNCTION_ADD: u32 = 0;

/// Number of 32-bit words occupied by a padded surface-state record.
pub const SURFACE_STATE_WORDS: usize = 8;
/// Number of 32-bit words reserved for one binding table.
pub const BINDING_TABLE_WORDS: usize = 8;

/// Length of a `3DPRIMITIVE` packet in words.
pub const PRIMITIVE_WORDS: usize = 7;
/// Length of a single-buffer `3DSTATE_VERTEX_BUFFERS` packet in words.
pub const VERTEX_BUFFER_WORDS: usize = 5;
/// Upper bound of the words appended by the component-alpha second pass, including the
/// state restore performed when the pass runs in the middle of an operation.
pub const CA_PASS_WORDS: usize = 2 + 8 + 1 + PRIMITIVE_WORDS + 2 + 8 + 1;

/// SURFACE_STATE, padded to a 32-byte slot.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct SurfaceState {
    pub ss: [u32; SURFACE_STATE_WORDS],
}

impl SurfaceState {
    pub const SIZE_BYTES: u32 = 32;
}

/// SAMPLER_STATE.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct SamplerState {
    pub ss0: u32,
    pub ss1: u32,
    pub ss2: u32,
    pub ss3: u32,
}

impl SamplerState {
    pub const SIZE_BYTES: u32 = 16;

    const SS0_MIN_FILTER_SHIFT: u32 = 14;
    const SS0_MAG_FILTER_SHIFT: u32 = 17;
    const SS0_LOD_PRECLAMP: u32 = 1 << 28;
    const SS0_DEFAULT_COLOR_LEGACY: u32 = 1 << 29;
    const SS3_R_WRAP_SHIFT: u32 = 0;
    const SS3_T_WRAP_SHIFT: u32 = 3;
    const SS3_S_WRAP_SHIFT: u32 = 6;

    pub fn new(map_filter: u32, wrap_mode: u32) -> Self {
        Self {
            ss0: Self::SS0_DEFAULT_COLOR_LEGACY
                | Self::SS0_LOD_PRECLAMP
                | (map_filter << Self::SS0_MIN_FILTER_SHIFT)
                | (map_filter << Self::SS0_MAG_FILTER_SHIFT),
            ss1: 0,
            ss2: 0,
            ss3: (wrap_mode << Self::SS3_R_WRAP_SHIFT)
                | (wrap_mode << Self::SS3_T_WRAP_SHIFT)
                | (wrap_mode << Self::SS3_S_WRAP_SHIFT),
        }
    }
}

/// BLEND_STATE, padded to the 64-byte stride used by the blend table.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct BlendState {
    pub blend0: u32,
    pub blend1: u32,
    pub _pad: [u32; 14],
}

impl BlendState {
    pub const SIZE_BYTES: u32 = 64;

    const BLEND0_DEST_FACTOR_SHIFT: u32 = 0;
    const BLEND0_SOURCE_FACTOR_SHIFT: u32 = 5;
    const BLEND0_FUNCTION_SHIFT: u32 = 11;
    const BLEND0_ENABLE: u32 = 1 << 31;
    const BLEND1_POST_BLEND_CLAMP: u32 = 1 << 0;
    const BLEND1_PRE_BLEND_CLAMP: u32 = 1 << 1;

    pub fn new(src_factor: u32, dst_factor: u32) -> Self {
        let mut state = Self::zeroed();
        // A ONE/ZERO pair is a plain copy; leave blending off for it.
        let enable = !(dst_factor == crate::blend::BlendFactor::Zero as u32
            && src_factor == crate::blend::BlendFactor::One as u32);
        state.blend0 = (BLENDFUNCTION_ADD << Self::BLEND0_FUNCTION_SHIFT)
            | (src_factor << Self::BLEND0_SOURCE_FACTOR_SHIFT)
            | (dst_factor << Self::BLEND0_DEST_FACTOR_SHIFT);
        if enable {
            state.blend0 |= Self::BLEND0_ENABLE;
        }
        state.blend1 = Self::BLEND1_POST_BLEND_CLAMP | Self::BLEND1_PRE_BLEND_CLAMP;
        state
    }
}

/// CC_VIEWPORT.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CcViewport {
    pub min_depth: f32,
    pub max_depth: f32,
}

impl CcViewport {
    pub const SIZE_BYTES: u32 = 8;
}
