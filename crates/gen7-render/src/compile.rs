//! Compiles a composite request into concrete hardware selections.

use bitflags::bitflags;
use tracing::debug;

use crate::blend::{get_blend, BlendFactor, Operator};
use crate::channel::{Channel, Picture, PictureSource};
use crate::config::RenderConfig;
use crate::emit::PrimitiveEmitter;
use crate::error::{RenderError, Result};
use crate::format::{PictFormat, SurfaceFormat};
use crate::kernel::{choose_composite_kernel, Kernel};
use crate::sampler::{sampler_offset, Extend, Filter};
use crate::state::{DrawRect, StateRequest};
use crate::transport::Buffer;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct OpFlags: u8 {
        /// Every channel is sampled through an affine (or no) transform.
        const AFFINE = 1 << 0;
        /// The mask carries per-component alpha.
        const COMPONENT_ALPHA = 1 << 1;
        /// The main pass runs as OutReverse and an Add pass follows each vertex run.
        const MAGIC_CA_PASS = 1 << 2;
    }
}

impl TryFrom<u8> for Operator {
    type Error = RenderError;

    fn try_from(code: u8) -> Result<Self> {
        Operator::from_code(code).ok_or(RenderError::UnsupportedOperator(code))
    }
}

/// The render target of an operation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Target {
    pub buffer: Buffer,
    pub width: u32,
    pub height: u32,
    pub format: PictFormat,
    /// Origin of the drawing rectangle within the target.
    pub x: i16,
    pub y: i16,
}

impl Target {
    /// Resolves the destination picture, declining anything the 3D pipe cannot render to.
    pub fn from_picture(picture: &Picture, config: &RenderConfig) -> Result<Self> {
        let PictureSource::Drawable { pixmap, x, y } = picture.source else {
            return Err(RenderError::UnsupportedDestination);
        };
        if picture.format.render_target_format().is_none() {
            return Err(RenderError::UnsupportedFormat(picture.format));
        }
        if !config.fits(pixmap.width, pixmap.height) {
            return Err(RenderError::SurfaceTooLarge {
                width: pixmap.width,
                height: pixmap.height,
                max: config.max_3d_size,
            });
        }
        Ok(Self {
            buffer: pixmap.buffer,
            width: pixmap.width,
            height: pixmap.height,
            format: picture.format,
            x,
            y,
        })
    }

    pub fn surface_format(&self) -> SurfaceFormat {
        // Targets are validated on construction.
        self.format
            .render_target_format()
            .unwrap_or(SurfaceFormat::B8G8R8A8Unorm)
    }

    pub fn drawrect(&self) -> DrawRect {
        DrawRect::new(self.x, self.y, self.width, self.height)
    }
}

/// A compiled operation, alive from its entry point until its `done`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompositeOp {
    /// Operator of the main pass.
    pub op: Operator,
    pub dst: Target,
    pub src: Channel,
    pub mask: Option<Channel>,
    pub flags: OpFlags,
    pub floats_per_vertex: usize,
    pub emitter: PrimitiveEmitter,
    pub kernel: Kernel,
    pub nr_surfaces: u32,
    pub nr_inputs: u32,
    /// Vertex-element layout id, also used as the vertex-buffer index.
    pub ve_id: u32,
}

impl CompositeOp {
    pub fn is_affine(&self) -> bool {
        self.flags.contains(OpFlags::AFFINE)
    }

    pub fn has_component_alpha(&self) -> bool {
        self.flags.contains(OpFlags::COMPONENT_ALPHA)
    }

    pub fn needs_ca_pass(&self) -> bool {
        self.flags.contains(OpFlags::MAGIC_CA_PASS)
    }

    pub fn has_mask(&self) -> bool {
        self.mask.is_some()
    }

    /// Blend-table offset of the main pass.
    pub fn blend(&self) -> u32 {
        get_blend(self.op, self.has_component_alpha(), self.dst.format)
    }

    /// Sampler-table offset of the (source, mask) pair.
    pub fn samplers(&self) -> u32 {
        let (mask_filter, mask_extend) = self
            .mask
            .map_or((Filter::Nearest, Extend::None), |m| (m.filter, m.extend));
        sampler_offset(self.src.filter, self.src.extend, mask_filter, mask_extend)
    }

    pub fn state_request(&self, binding_table: usize) -> StateRequest {
        StateRequest {
            blend: self.blend(),
            samplers: self.samplers(),
            has_mask: self.has_mask(),
            kernel: self.kernel,
            nr_surfaces: self.nr_surfaces,
            nr_inputs: self.nr_inputs,
            ve_id: self.ve_id,
            is_affine: self.is_affine(),
            binding_table,
            drawrect: self.dst.drawrect(),
        }
    }

    /// A single-source operation with the plain no-mask kernel, as used by copy, fill and video.
    pub fn simple(op: Operator, dst: Target, src: Channel, kernel: Kernel, nr_surfaces: u32) -> Self {
        Self {
            op,
            dst,
            src,
            mask: None,
            flags: OpFlags::AFFINE,
            floats_per_vertex: 3,
            emitter: PrimitiveEmitter::Generic,
            kernel,
            nr_surfaces,
            nr_inputs: 1,
            ve_id: 1,
        }
    }
}

/// Vertex-element layout id for a channel configuration.
pub fn choose_vertex_elements(has_mask: bool, is_affine: bool) -> u32 {
    (u32::from(has_mask) << 1) | u32::from(is_affine)
}

/// Floats per vertex: packed position, then two or three coordinates per channel.
pub fn floats_per_vertex(has_mask: bool, is_affine: bool) -> usize {
    let per_channel = if is_affine { 2 } else { 3 };
    1 + per_channel * (1 + usize::from(has_mask))
}

/// Selects blend, kernel, vertex layout and emitter for `op` over prepared channels.
///
/// A component-alpha mask combined with an operator whose blend reads both the source value
/// and source alpha cannot be expressed in one pass. `Over` is split into an `OutReverse`
/// pass followed by an `Add` pass over the same vertices; every other such operator is
/// declined.
pub fn compile_composite(
    op: Operator,
    dst: Target,
    src: Channel,
    mask: Option<Channel>,
) -> Result<CompositeOp> {
    let mut flags = OpFlags::empty();
    let mut main_op = op;

    let mut is_affine = src.is_affine();
    if let Some(mask) = mask.as_ref() {
        is_affine &= mask.is_affine();
        if mask.has_component_alpha() {
            flags |= OpFlags::COMPONENT_ALPHA;
            let info = op.info();
            if info.src_alpha && info.src != BlendFactor::Zero {
                if op != Operator::Over {
                    return Err(RenderError::UnsupportedComponentAlpha { op });
                }
                flags |= OpFlags::MAGIC_CA_PASS;
                main_op = Operator::OutReverse;
            }
        }
    }
    if is_affine {
        flags |= OpFlags::AFFINE;
    }

    let has_mask = mask.is_some();
    let kernel = choose_composite_kernel(
        main_op,
        has_mask,
        flags.contains(OpFlags::COMPONENT_ALPHA),
        is_affine,
    );
    let emitter = PrimitiveEmitter::select(&src, mask.as_ref(), is_affine);
    let compiled = CompositeOp {
        op: main_op,
        dst,
        src,
        mask,
        flags,
        floats_per_vertex: floats_per_vertex(has_mask, is_affine),
        emitter,
        kernel,
        nr_surfaces: 2 + u32::from(has_mask),
        nr_inputs: 1 + u32::from(has_mask),
        ve_id: choose_vertex_elements(has_mask, is_affine),
    };
    debug!(
        ?op,
        main = ?main_op,
        kernel = kernel.name(),
        ?emitter,
        floats_per_vertex = compiled.floats_per_vertex,
        ca_pass = compiled.needs_ca_pass(),
        "composite compiled"
    );
    Ok(compiled)
}
