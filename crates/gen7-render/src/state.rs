//! Last-emitted pipeline state, so that only deltas reach the command stream.

use tracing::{debug, trace};

use crate::format::SurfaceFormat;
use crate::hw::*;
use crate::kernel::Kernel;
use crate::statics::StaticOffsets;
use crate::transport::{BufferId, Transport};
use crate::vertex::VERTEX_BUFFER_SLOTS;

/// Drawing-rectangle bounds as programmed: origin offset and inclusive limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawRect {
    pub offset: u32,
    pub limit: u32,
}

impl DrawRect {
    pub fn new(x: i16, y: i16, width: u32, height: u32) -> Self {
        Self {
            offset: (u32::from(y as u16) << 16) | u32::from(x as u16),
            limit: ((height - 1) << 16) | (width - 1),
        }
    }
}

/// Everything one operation needs programmed before its first primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateRequest {
    /// Blend-table byte offset.
    pub blend: u32,
    /// Sampler-table byte offset.
    pub samplers: u32,
    pub has_mask: bool,
    pub kernel: Kernel,
    pub nr_surfaces: u32,
    pub nr_inputs: u32,
    pub ve_id: u32,
    pub is_affine: bool,
    /// Word index of the binding table in the batch.
    pub binding_table: usize,
    pub drawrect: DrawRect,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct WmKey {
    kernel: Kernel,
    nr_surfaces: u32,
    nr_inputs: u32,
}

/// Mirror of the state last written to the current batch. `None` means unknown.
#[derive(Clone, Debug)]
pub struct PipelineStateCache {
    blend: Option<u32>,
    samplers: Option<u32>,
    wm: Option<WmKey>,
    num_sf_outputs: Option<u32>,
    ve_id: Option<u32>,
    surface_table: Option<usize>,
    drawrect: Option<DrawRect>,
    vb_bound: u8,
    needs_invariant: bool,
    last_primitive: Option<usize>,
}

impl Default for PipelineStateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStateCache {
    pub fn new() -> Self {
        Self {
            blend: None,
            samplers: None,
            wm: None,
            num_sf_outputs: None,
            ve_id: None,
            surface_table: None,
            drawrect: None,
            vb_bound: 0,
            needs_invariant: true,
            last_primitive: None,
        }
    }

    /// Forgets everything; the next batch starts from scratch.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn needs_invariant(&self) -> bool {
        self.needs_invariant
    }

    pub fn blend(&self) -> Option<u32> {
        self.blend
    }

    pub fn kernel(&self) -> Option<Kernel> {
        self.wm.map(|wm| wm.kernel)
    }

    pub fn surface_table(&self) -> Option<usize> {
        self.surface_table
    }

    pub fn last_primitive(&self) -> Option<usize> {
        self.last_primitive
    }

    pub fn set_last_primitive(&mut self, index: Option<usize>) {
        self.last_primitive = index;
    }

    pub fn is_vertex_buffer_bound(&self, id: u32) -> bool {
        self.vb_bound & (1 << id) != 0
    }

    pub fn bind_vertex_buffer(&mut self, id: u32) {
        debug_assert!((id as usize) < VERTEX_BUFFER_SLOTS);
        self.vb_bound |= 1 << id;
    }

    pub fn unbind_vertex_buffers(&mut self) {
        self.vb_bound = 0;
    }

    /// Programs the state that never changes within a batch.
    pub fn emit_invariant<T: Transport>(
        &mut self,
        t: &mut T,
        statics: &StaticOffsets,
        general: BufferId,
    ) {
        let start = t.used();

        t.append(PIPELINE_SELECT | PIPELINE_SELECT_3D);

        t.append(STATE_MULTISAMPLE | (4 - 2));
        t.append(MULTISAMPLE_PIXEL_LOCATION_CENTER | MULTISAMPLE_NUMSAMPLES_1);
        t.append(0);
        t.append(0);

        t.append(STATE_SAMPLE_MASK | (2 - 2));
        t.append(1);

        t.append(STATE_SIP);
        t.append(0);

        // URB: push constants for the pixel shader, minimal VS allocation, nothing else.
        t.append(STATE_PUSH_CONSTANT_ALLOC_PS | (2 - 2));
        t.append(8);
        t.append(STATE_URB_VS | (2 - 2));
        t.append(
            (32 << URB_ENTRY_NUMBER_SHIFT)
                | ((2 - 1) << URB_ENTRY_SIZE_SHIFT)
                | (1 << URB_STARTING_ADDRESS_SHIFT),
        );
        t.append(STATE_URB_HS | (2 - 2));
        t.append(2 << URB_STARTING_ADDRESS_SHIFT);
        t.append(STATE_URB_DS | (2 - 2));
        t.append(2 << URB_STARTING_ADDRESS_SHIFT);
        t.append(STATE_URB_GS | (2 - 2));
        t.append(1 << URB_STARTING_ADDRESS_SHIFT);

        // Surface state lives in the batch; dynamic state and kernels in the static buffer.
        t.append(STATE_BASE_ADDRESS | (10 - 2));
        t.append(0);
        append_reloc(t, None, DOMAIN_INSTRUCTION << 16, BASE_ADDRESS_MODIFY);
        append_reloc(t, Some(general), DOMAIN_INSTRUCTION << 16, BASE_ADDRESS_MODIFY);
        t.append(0);
        append_reloc(t, Some(general), DOMAIN_INSTRUCTION << 16, BASE_ADDRESS_MODIFY);
        t.append(0);
        t.append(BASE_ADDRESS_MODIFY);
        t.append(0);
        t.append(BASE_ADDRESS_MODIFY);

        append_disabled(t, STATE_VS, 6);
        append_disabled(t, STATE_HS, 7);
        append_disabled(t, STATE_TE, 4);
        append_disabled(t, STATE_DS, 6);
        append_disabled(t, STATE_GS, 7);
        append_disabled(t, STATE_CLIP, 4);
        append_disabled(t, STATE_VIEWPORT_STATE_POINTERS_SF_CL, 2);

        t.append(STATE_SF | (7 - 2));
        t.append(0);
        t.append(SF_CULL_NONE);
        t.append(2 << SF_TRIFAN_PROVOKE_SHIFT);
        t.append(0);
        t.append(0);
        t.append(0);

        t.append(STATE_WM | (3 - 2));
        t.append(WM_DISPATCH_ENABLE | WM_PERSPECTIVE_PIXEL_BARYCENTRIC);
        t.append(0);
        append_disabled(t, STATE_CONSTANT_PS, 7);

        debug_assert_eq!(statics.cc_viewport % 32, 0);
        t.append(STATE_VIEWPORT_STATE_POINTERS_CC | (2 - 2));
        t.append(statics.cc_viewport);

        append_disabled(t, STATE_STREAMOUT, 3);

        t.append(STATE_DEPTH_BUFFER | (7 - 2));
        t.append(
            (SURFACE_NULL << DEPTH_BUFFER_TYPE_SHIFT)
                | (DEPTHFORMAT_D32_FLOAT << DEPTH_BUFFER_FORMAT_SHIFT),
        );
        for _ in 0..5 {
            t.append(0);
        }
        append_disabled(t, STATE_CLEAR_PARAMS, 3);

        self.needs_invariant = false;
        debug!(words = t.used() - start, "invariant state emitted");
    }

    /// Points the blend unit at `blend`. Returns whether a command was emitted.
    pub fn emit_cc<T: Transport>(&mut self, t: &mut T, statics: &StaticOffsets, blend: u32) -> bool {
        if self.blend == Some(blend) {
            return false;
        }
        debug_assert_eq!((statics.cc_blend + blend) % 64, 0);
        t.append(STATE_BLEND_STATE_POINTERS | (2 - 2));
        t.append((statics.cc_blend + blend) | 1);
        self.blend = Some(blend);
        true
    }

    pub fn emit_sampler<T: Transport>(
        &mut self,
        t: &mut T,
        statics: &StaticOffsets,
        samplers: u32,
    ) -> bool {
        if self.samplers == Some(samplers) {
            return false;
        }
        debug_assert_eq!((statics.samplers + samplers) % 32, 0);
        t.append(STATE_SAMPLER_STATE_POINTERS_PS | (2 - 2));
        t.append(statics.samplers + samplers);
        self.samplers = Some(samplers);
        true
    }

    /// Programs the setup-backend attribute count: one varying per bound channel.
    pub fn emit_sf<T: Transport>(&mut self, t: &mut T, has_mask: bool) -> bool {
        let num_sf_outputs = if has_mask { 2 } else { 1 };
        if self.num_sf_outputs == Some(num_sf_outputs) {
            return false;
        }
        trace!(num_sf_outputs, "sbe");
        t.append(STATE_SBE | (14 - 2));
        t.append(
            (num_sf_outputs << SBE_NUM_OUTPUTS_SHIFT)
                | (1 << SBE_URB_ENTRY_READ_LENGTH_SHIFT)
                | (1 << SBE_URB_ENTRY_READ_OFFSET_SHIFT),
        );
        for _ in 0..12 {
            t.append(0);
        }
        self.num_sf_outputs = Some(num_sf_outputs);
        true
    }

    pub fn emit_wm<T: Transport>(
        &mut self,
        t: &mut T,
        statics: &StaticOffsets,
        kernel: Kernel,
        nr_surfaces: u32,
        nr_inputs: u32,
    ) -> bool {
        let key = WmKey {
            kernel,
            nr_surfaces,
            nr_inputs,
        };
        if self.wm == Some(key) {
            return false;
        }
        debug!(kernel = kernel.name(), nr_surfaces, nr_inputs, "switching kernel");
        t.append(STATE_PS | (8 - 2));
        t.append(statics.kernel(kernel));
        t.append((1 << PS_SAMPLER_COUNT_SHIFT) | (nr_surfaces << PS_BINDING_TABLE_ENTRY_COUNT_SHIFT));
        t.append(0);
        t.append(((PS_MAX_THREADS - 1) << PS_MAX_THREADS_SHIFT) | PS_ATTRIBUTE_ENABLE | PS_16_DISPATCH_ENABLE);
        t.append(6 << PS_DISPATCH_START_GRF_SHIFT_0);
        t.append(0);
        t.append(0);
        self.wm = Some(key);
        true
    }

    /// Describes the vertex layout: packed position, then one or two texture coordinates.
    pub fn emit_vertex_elements<T: Transport>(
        &mut self,
        t: &mut T,
        ve_id: u32,
        has_mask: bool,
        is_affine: bool,
    ) -> bool {
        if self.ve_id == Some(ve_id) {
            return false;
        }

        let nelem = if has_mask { 2 } else { 1 };
        let selem = if is_affine { 2 } else { 3 };
        let (src_format, w_component) = if is_affine {
            (SurfaceFormat::R32G32Float.bits(), VFCOMPONENT_STORE_1_FLT)
        } else {
            (SurfaceFormat::R32G32B32Float.bits(), VFCOMPONENT_STORE_SRC)
        };
        let element = |format: u32, offset: u32| {
            (ve_id << VE0_VERTEX_BUFFER_INDEX_SHIFT)
                | VE0_VALID
                | (format << VE0_FORMAT_SHIFT)
                | (offset << VE0_OFFSET_SHIFT)
        };
        let components = |c0: u32, c1: u32, c2: u32, c3: u32| {
            (c0 << VE1_VFCOMPONENT_0_SHIFT)
                | (c1 << VE1_VFCOMPONENT_1_SHIFT)
                | (c2 << VE1_VFCOMPONENT_2_SHIFT)
                | (c3 << VE1_VFCOMPONENT_3_SHIFT)
        };

        t.append(STATE_VERTEX_ELEMENTS | ((2 * (2 + nelem)) + 1 - 2));

        // Pad element: the VUE header is all zeros.
        t.append(element(SurfaceFormat::R32G32B32A32Float.bits(), 0));
        t.append(components(
            VFCOMPONENT_STORE_0,
            VFCOMPONENT_STORE_0,
            VFCOMPONENT_STORE_0,
            VFCOMPONENT_STORE_0,
        ));

        // x, y
        t.append(element(SurfaceFormat::R16G16SScaled.bits(), 0));
        t.append(components(
            VFCOMPONENT_STORE_SRC,
            VFCOMPONENT_STORE_SRC,
            VFCOMPONENT_STORE_1_FLT,
            VFCOMPONENT_STORE_1_FLT,
        ));

        // u0, v0[, w0]
        t.append(element(src_format, 4));
        t.append(components(
            VFCOMPONENT_STORE_SRC,
            VFCOMPONENT_STORE_SRC,
            w_component,
            VFCOMPONENT_STORE_1_FLT,
        ));

        // u1, v1[, w1]
        if has_mask {
            t.append(element(src_format, (1 + selem) * 4));
            t.append(components(
                VFCOMPONENT_STORE_SRC,
                VFCOMPONENT_STORE_SRC,
                w_component,
                VFCOMPONENT_STORE_1_FLT,
            ));
        }

        self.ve_id = Some(ve_id);
        true
    }

    pub fn emit_binding_table<T: Transport>(&mut self, t: &mut T, offset: usize) -> bool {
        if self.surface_table == Some(offset) {
            return false;
        }
        debug_assert_eq!((4 * offset) % 32, 0);
        t.append(STATE_BINDING_TABLE_POINTERS_PS | (2 - 2));
        t.append((offset * 4) as u32);
        self.surface_table = Some(offset);
        true
    }

    pub fn emit_drawing_rectangle<T: Transport>(
        &mut self,
        t: &mut T,
        drawrect: DrawRect,
        force: bool,
    ) -> bool {
        if !force && self.drawrect == Some(drawrect) {
            return false;
        }
        t.append(STATE_DRAWING_RECTANGLE | (4 - 2));
        t.append(0);
        t.append(drawrect.limit);
        t.append(drawrect.offset);
        self.drawrect = Some(drawrect);
        true
    }

    /// Brings every state axis in line with `req`, emitting only what differs.
    ///
    /// The drawing rectangle is re-sent whenever another axis changed, unless the stream
    /// already ends in a pipeline flush. Returns whether anything was emitted.
    pub fn apply<T: Transport>(
        &mut self,
        t: &mut T,
        statics: &StaticOffsets,
        req: &StateRequest,
    ) -> bool {
        let flushed = t
            .last_word()
            .is_some_and(|word| word & MI_OPCODE_MASK == MI_FLUSH);

        let mut changed = self.emit_cc(t, statics, req.blend);
        changed |= self.emit_sampler(t, statics, req.samplers);
        changed |= self.emit_sf(t, req.has_mask);
        changed |= self.emit_wm(t, statics, req.kernel, req.nr_surfaces, req.nr_inputs);
        changed |= self.emit_vertex_elements(t, req.ve_id, req.has_mask, req.is_affine);
        changed |= self.emit_binding_table(t, req.binding_table);
        changed |= self.emit_drawing_rectangle(t, req.drawrect, changed && !flushed);
        changed
    }
}

fn append_reloc<T: Transport>(t: &mut T, target: Option<BufferId>, domains: u32, delta: u32) {
    let index = t.used();
    let value = t.add_relocation(index, target, domains, delta);
    t.append(value);
}

/// Emits `cmd` with an all-zero body of `len - 1` words.
fn append_disabled<T: Transport>(t: &mut T, cmd: u32, len: u32) {
    t.append(cmd | (len - 2));
    for _ in 1..len {
        t.append(0);
    }
}
