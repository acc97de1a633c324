//! The rendering context.
//!
//! [`Gen7Render`] owns the state mirror, surface bindings and vertex arena of the batch under
//! construction and drives them through the composite, copy, fill and video entry points.
//! Every entry point either completes its work inside the batch or returns an error before
//! emitting anything that depends on it; declines are reported through
//! [`RenderError::is_fallback`].

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::blend::{get_blend, Operator};
use crate::channel::{prepare_channel, release_channel, Channel, ChannelFlags, Picture, Pixmap};
use crate::compile::{compile_composite, CompositeOp, Target};
use crate::config::RenderConfig;
use crate::emit::{BoxRec, CompositeRectangles, Point};
use crate::error::{RenderError, Result};
use crate::format::{rgba_for_color, PictFormat, RenderColor, SurfaceFormat};
use crate::hw::{
    BINDING_TABLE_WORDS, CA_PASS_WORDS, DOMAIN_VERTEX, MI_FLUSH, MI_INHIBIT_RENDER_CACHE_FLUSH,
    PRIMITIVE, PRIMITIVE_RECTLIST, PRIMITIVE_VERTEX_SEQUENTIAL, PRIMITIVE_WORDS,
    STATE_VERTEX_BUFFERS, VB0_ADDRESS_MODIFY_ENABLE, VB0_BUFFER_INDEX_SHIFT,
    VB0_BUFFER_PITCH_SHIFT, VB0_VERTEXDATA, VERTEX_BUFFER_WORDS,
};
use crate::kernel::{choose_composite_kernel, Kernel, KernelBinaries};
use crate::sampler::{Extend, Filter};
use crate::state::PipelineStateCache;
use crate::statics::StaticResources;
use crate::stats::RenderStats;
use crate::surface::{alloc_binding_table, finish_binding_table, SurfaceAllocator};
use crate::transport::{BufferId, Mode, Transport};
use crate::vertex::VertexArena;
use crate::video::VideoFrame;

/// Raster operation that copies the source unchanged.
pub const GX_COPY: u8 = 0x3;
/// Raster operation that clears the destination.
pub const GX_CLEAR: u8 = 0x0;

/// A composite request as handed to [`Gen7Render::composite`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompositeRequest {
    pub op: Operator,
    pub src: Picture,
    #[serde(default)]
    pub mask: Option<Picture>,
    pub dst: Picture,
    #[serde(default)]
    pub src_x: i32,
    #[serde(default)]
    pub src_y: i32,
    #[serde(default)]
    pub mask_x: i32,
    #[serde(default)]
    pub mask_y: i32,
    #[serde(default)]
    pub dst_x: i32,
    #[serde(default)]
    pub dst_y: i32,
    pub width: i32,
    pub height: i32,
}

/// An open copy between two pixmaps, drawn with [`Gen7Render::copy_blt`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CopyOp {
    base: CompositeOp,
}

impl CopyOp {
    /// The compiled state the copy draws with.
    pub fn op(&self) -> &CompositeOp {
        &self.base
    }
}

/// An open solid fill, drawn with [`Gen7Render::fill_blt`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FillOp {
    base: CompositeOp,
}

impl FillOp {
    /// The compiled state the fill draws with; its source is the solid texel.
    pub fn op(&self) -> &CompositeOp {
        &self.base
    }
}

/// The pending component-alpha fixup of the active operation.
#[derive(Clone, Copy, Debug)]
struct CaPass {
    dst_format: PictFormat,
    is_affine: bool,
}

impl CaPass {
    fn for_op(op: &CompositeOp) -> Option<Self> {
        op.needs_ca_pass().then_some(Self {
            dst_format: op.dst.format,
            is_affine: op.is_affine(),
        })
    }
}

/// Which surfaces follow the destination in the binding table.
#[derive(Clone, Copy)]
enum Sources<'a> {
    Channels,
    Video(&'a VideoFrame),
}

pub struct Gen7Render<T: Transport> {
    transport: T,
    config: RenderConfig,
    statics: StaticResources,
    general: BufferId,
    state: PipelineStateCache,
    surfaces: SurfaceAllocator,
    vertices: VertexArena,
    ca: Option<CaPass>,
    stats: RenderStats,
}

impl<T: Transport> Gen7Render<T> {
    /// Builds the static tables from `kernels` and uploads them through `transport`.
    pub fn new(mut transport: T, config: RenderConfig, kernels: &KernelBinaries) -> Result<Self> {
        let statics = StaticResources::build(kernels);
        let general = statics.upload(&mut transport)?;
        debug!(
            max_3d_size = config.max_3d_size,
            vertex_capacity = config.vertex_capacity,
            "render context created"
        );
        Ok(Self {
            transport,
            config,
            statics,
            general,
            state: PipelineStateCache::new(),
            surfaces: SurfaceAllocator::new(),
            vertices: VertexArena::new(config.vertex_capacity),
            ca: None,
            stats: RenderStats::default(),
        })
    }

    /// The transport the batch is built in.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Gives the transport back without submitting pending work.
    pub fn into_inner(self) -> T {
        self.transport
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Counters accumulated since the context was created.
    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Mirror of the pipeline state programmed into the current batch.
    pub fn state(&self) -> &PipelineStateCache {
        &self.state
    }

    pub fn vertices(&self) -> &VertexArena {
        &self.vertices
    }

    /// Buffer holding the uploaded static tables.
    pub fn general_buffer(&self) -> BufferId {
        self.general
    }

    // ---------------------------------------------------------------------
    // Composite
    // ---------------------------------------------------------------------

    /// Prepares a composite and programs its state.
    ///
    /// The returned operation stays active until [`Gen7Render::composite_done`]; rectangles
    /// are added with [`Gen7Render::composite_blt`] and [`Gen7Render::composite_boxes`].
    pub fn composite(&mut self, req: &CompositeRequest) -> Result<CompositeOp> {
        let dst = Target::from_picture(&req.dst, &self.config)?;
        let src = prepare_channel(
            &mut self.transport,
            &self.config,
            &req.src,
            req.src_x,
            req.src_y,
            req.dst_x,
            req.dst_y,
        )?;
        let mask = match req.mask.as_ref() {
            None => None,
            Some(picture) => match prepare_channel(
                &mut self.transport,
                &self.config,
                picture,
                req.mask_x,
                req.mask_y,
                req.dst_x,
                req.dst_y,
            ) {
                Ok(mask) => Some(mask),
                Err(err) => {
                    release_channel(&mut self.transport, &src);
                    return Err(err);
                }
            },
        };

        let op = match compile_composite(req.op, dst, src, mask) {
            Ok(op) => op,
            Err(err) => {
                release_channel(&mut self.transport, &src);
                if let Some(mask) = mask.as_ref() {
                    release_channel(&mut self.transport, mask);
                }
                return Err(err);
            }
        };

        let mut buffers = vec![op.dst.buffer.id, op.src.buffer.id];
        let mut sampled = vec![op.src.buffer.id];
        if let Some(mask) = op.mask.as_ref() {
            buffers.push(mask.buffer.id);
            sampled.push(mask.buffer.id);
        }
        let started = self
            .prepare_buffers(&buffers, &sampled)
            .and_then(|()| self.emit_state(&op, Sources::Channels))
            .and_then(|()| self.align_vertex(&op));
        if let Err(err) = started {
            self.release_op_channels(&op);
            return Err(err);
        }
        self.ca = CaPass::for_op(&op);
        Ok(op)
    }

    /// Adds one rectangle to the active composite.
    pub fn composite_blt(&mut self, op: &CompositeOp, r: &CompositeRectangles) -> Result<()> {
        self.acquire(op, 1, Sources::Channels)?;
        op.emitter.emit(&mut self.vertices, op, r);
        Ok(())
    }

    /// Adds `boxes` to the active composite, sampling each at its own destination position.
    pub fn composite_boxes(&mut self, op: &CompositeOp, boxes: &[BoxRec]) -> Result<()> {
        let mut boxes = boxes;
        while !boxes.is_empty() {
            let n = self.acquire(op, boxes.len(), Sources::Channels)?;
            let (now, rest) = boxes.split_at(n);
            for b in now {
                let at = Point::new(b.x1, b.y1);
                let r = CompositeRectangles {
                    src: at,
                    mask: at,
                    dst: at,
                    width: b.width(),
                    height: b.height(),
                };
                op.emitter.emit(&mut self.vertices, op, &r);
            }
            boxes = rest;
        }
        Ok(())
    }

    /// Closes the active composite, running its component-alpha fixup if it has one.
    pub fn composite_done(&mut self, op: &CompositeOp) {
        self.vertex_flush();
        self.ca = None;
        self.transport.set_mode(Mode::Render);
        self.release_op_channels(op);
    }

    // ---------------------------------------------------------------------
    // Copy
    // ---------------------------------------------------------------------

    /// Copies `boxes` from `src` (offset by `src_dx`, `src_dy`) to `dst` (offset by `dst_dx`,
    /// `dst_dy`).
    #[allow(clippy::too_many_arguments)]
    pub fn copy_boxes(
        &mut self,
        alu: u8,
        src: &Pixmap,
        src_dx: i16,
        src_dy: i16,
        dst: &Pixmap,
        dst_dx: i16,
        dst_dy: i16,
        boxes: &[BoxRec],
    ) -> Result<()> {
        let op = self.compile_copy(alu, src, dst, dst_dx, dst_dy)?;
        if boxes.is_empty() {
            return Ok(());
        }
        self.begin_copy(&op)?;

        let (sdx, sdy) = (i32::from(src_dx), i32::from(src_dy));
        let mut boxes = boxes;
        while !boxes.is_empty() {
            let n = self.acquire(&op, boxes.len(), Sources::Channels)?;
            let (now, rest) = boxes.split_at(n);
            for b in now {
                emit_copy_rect(
                    &mut self.vertices,
                    op.src.scale,
                    (b.x1 + sdx, b.y1 + sdy),
                    (b.width(), b.height()),
                    (b.x1, b.y1),
                );
            }
            boxes = rest;
        }

        self.vertex_flush();
        self.transport.set_mode(Mode::Render);
        Ok(())
    }

    /// Opens a copy from `src` to `dst` for any number of [`Gen7Render::copy_blt`] calls.
    pub fn copy(&mut self, alu: u8, src: &Pixmap, dst: &Pixmap) -> Result<CopyOp> {
        let base = self.compile_copy(alu, src, dst, 0, 0)?;
        self.begin_copy(&base)?;
        Ok(CopyOp { base })
    }

    /// Copies a `width` x `height` rectangle from (`sx`, `sy`) to (`dx`, `dy`).
    #[allow(clippy::too_many_arguments)]
    pub fn copy_blt(
        &mut self,
        op: &CopyOp,
        sx: i16,
        sy: i16,
        width: i16,
        height: i16,
        dx: i16,
        dy: i16,
    ) -> Result<()> {
        self.acquire(&op.base, 1, Sources::Channels)?;
        emit_copy_rect(
            &mut self.vertices,
            op.base.src.scale,
            (i32::from(sx), i32::from(sy)),
            (i32::from(width), i32::from(height)),
            (i32::from(dx), i32::from(dy)),
        );
        Ok(())
    }

    /// Closes the copy's open primitive.
    pub fn copy_done(&mut self, _op: &CopyOp) {
        self.vertex_flush();
    }

    fn compile_copy(
        &self,
        alu: u8,
        src: &Pixmap,
        dst: &Pixmap,
        dst_dx: i16,
        dst_dy: i16,
    ) -> Result<CompositeOp> {
        let op = match alu {
            GX_COPY => Operator::Src,
            GX_CLEAR => Operator::Clear,
            other => return Err(RenderError::UnsupportedAlu(other)),
        };
        if src.buffer.id == dst.buffer.id {
            return Err(RenderError::OverlappingCopy);
        }
        for pixmap in [src, dst] {
            self.check_size(pixmap)?;
        }
        let dst_format = PictFormat::for_depth(dst.depth).ok_or(RenderError::UnsupportedDepth(dst.depth))?;
        let card_format = PictFormat::for_depth(src.depth)
            .and_then(PictFormat::texture_format)
            .ok_or(RenderError::UnsupportedDepth(src.depth))?;

        let target = Target {
            buffer: dst.buffer,
            width: dst.width,
            height: dst.height,
            format: dst_format,
            x: dst_dx,
            y: dst_dy,
        };
        let channel = Channel {
            buffer: src.buffer,
            width: src.width,
            height: src.height,
            card_format,
            transform: None,
            filter: Filter::Nearest,
            extend: Extend::None,
            offset: [0, 0],
            scale: [1.0 / src.width as f32, 1.0 / src.height as f32],
            flags: ChannelFlags::empty(),
        };
        Ok(CompositeOp::simple(op, target, channel, Kernel::NoMask, 2))
    }

    fn begin_copy(&mut self, op: &CompositeOp) -> Result<()> {
        self.prepare_buffers(&[op.dst.buffer.id, op.src.buffer.id], &[op.src.buffer.id])?;
        self.emit_state(op, Sources::Channels)?;
        self.align_vertex(op)
    }

    // ---------------------------------------------------------------------
    // Fill
    // ---------------------------------------------------------------------

    /// Fills `boxes` of `dst` with `color` under operator `op`.
    pub fn fill_boxes(
        &mut self,
        op: Operator,
        format: PictFormat,
        color: RenderColor,
        dst: &Pixmap,
        boxes: &[BoxRec],
    ) -> Result<()> {
        self.check_size(dst)?;
        if format.render_target_format().is_none() {
            return Err(RenderError::UnsupportedFormat(format));
        }
        if boxes.is_empty() {
            return Ok(());
        }

        let pixel = color.to_a8r8g8b8();
        let base = self.compile_fill(op, format, pixel, dst)?;
        let result = self.fill_box_run(&base, boxes);
        self.vertex_flush();
        release_channel(&mut self.transport, &base.src);
        result
    }

    fn fill_box_run(&mut self, op: &CompositeOp, boxes: &[BoxRec]) -> Result<()> {
        self.prepare_buffers(&[op.dst.buffer.id], &[])?;
        self.emit_state(op, Sources::Channels)?;
        self.align_vertex(op)?;

        let mut boxes = boxes;
        while !boxes.is_empty() {
            let n = self.acquire(op, boxes.len(), Sources::Channels)?;
            let (now, rest) = boxes.split_at(n);
            for b in now {
                emit_fill_rect(&mut self.vertices, b);
            }
            boxes = rest;
        }
        Ok(())
    }

    /// Opens a solid fill of `dst` with a pixel value in the drawable's own depth.
    pub fn fill(&mut self, alu: u8, dst: &Pixmap, color: u32) -> Result<FillOp> {
        let color = match alu {
            GX_CLEAR => 0,
            GX_COPY => color,
            other => return Err(RenderError::UnsupportedAlu(other)),
        };
        self.check_size(dst)?;
        let format = PictFormat::for_depth(dst.depth).ok_or(RenderError::UnsupportedDepth(dst.depth))?;
        let op = if color == 0 {
            Operator::Clear
        } else {
            Operator::Src
        };

        let base = self.compile_fill(op, format, rgba_for_color(color, dst.depth), dst)?;
        let started = self
            .prepare_buffers(&[base.dst.buffer.id], &[])
            .and_then(|()| self.emit_state(&base, Sources::Channels))
            .and_then(|()| self.align_vertex(&base));
        if let Err(err) = started {
            release_channel(&mut self.transport, &base.src);
            return Err(err);
        }
        Ok(FillOp { base })
    }

    /// Fills one rectangle of the destination.
    pub fn fill_blt(&mut self, op: &FillOp, x: i16, y: i16, width: i16, height: i16) -> Result<()> {
        self.acquire(&op.base, 1, Sources::Channels)?;
        let (x, y) = (i32::from(x), i32::from(y));
        emit_fill_rect(
            &mut self.vertices,
            &BoxRec::new(x, y, x + i32::from(width), y + i32::from(height)),
        );
        Ok(())
    }

    /// Closes the fill and drops its reference on the solid texel.
    pub fn fill_done(&mut self, op: &FillOp) {
        self.vertex_flush();
        release_channel(&mut self.transport, &op.base.src);
        self.transport.set_mode(Mode::Render);
    }

    fn compile_fill(
        &mut self,
        op: Operator,
        format: PictFormat,
        pixel: u32,
        dst: &Pixmap,
    ) -> Result<CompositeOp> {
        let solid = self
            .transport
            .solid(pixel)
            .ok_or(RenderError::SolidUnavailable { color: pixel })?;
        let target = Target {
            buffer: dst.buffer,
            width: dst.width,
            height: dst.height,
            format,
            x: 0,
            y: 0,
        };
        trace!(?op, pixel, "fill compiled");
        Ok(CompositeOp::simple(
            op,
            target,
            Channel::solid(solid, pixel),
            Kernel::NoMask,
            2,
        ))
    }

    // ---------------------------------------------------------------------
    // Video
    // ---------------------------------------------------------------------

    /// Converts `frame` to RGB and scales it onto the `region` of `dst`.
    ///
    /// `src_w` x `src_h` is the part of the frame shown; `drw_w` x `drw_h` is the size it is
    /// drawn at, with the region's top-left corner as its origin.
    #[allow(clippy::too_many_arguments)]
    pub fn video(
        &mut self,
        frame: &VideoFrame,
        region: &[BoxRec],
        src_w: u16,
        src_h: u16,
        drw_w: u16,
        drw_h: u16,
        dst: &Pixmap,
    ) -> Result<()> {
        self.check_size(dst)?;
        let format = PictFormat::for_depth(dst.depth).ok_or(RenderError::UnsupportedDepth(dst.depth))?;
        let Some(extents) = BoxRec::extents(region) else {
            return Ok(());
        };

        let planes = frame.planes();
        let channel = Channel {
            buffer: frame.buffer,
            width: frame.width,
            height: frame.height,
            card_format: planes
                .first()
                .map_or(SurfaceFormat::R8Unorm, |plane| plane.format),
            transform: None,
            filter: Filter::Bilinear,
            extend: Extend::Pad,
            offset: [0, 0],
            scale: [1.0, 1.0],
            flags: ChannelFlags::empty(),
        };
        let target = Target {
            buffer: dst.buffer,
            width: dst.width,
            height: dst.height,
            format,
            x: 0,
            y: 0,
        };
        let op = CompositeOp::simple(
            Operator::Src,
            target,
            channel,
            frame.kernel(),
            frame.nr_surfaces(),
        );

        self.prepare_buffers(&[dst.buffer.id, frame.buffer.id], &[frame.buffer.id])?;
        self.emit_state(&op, Sources::Video(frame))?;
        self.align_vertex(&op)?;

        let scale_x = (f32::from(src_w) / frame.width as f32) / f32::from(drw_w);
        let scale_y = (f32::from(src_h) / frame.height as f32) / f32::from(drw_h);
        let (dxo, dyo) = (extents.x1, extents.y1);
        debug!(
            fourcc = ?frame.id,
            boxes = region.len(),
            scale_x,
            scale_y,
            "video"
        );

        for b in region {
            self.acquire(&op, 1, Sources::Video(frame))?;
            let u = |x: i32| (x - dxo) as f32 * scale_x;
            let v = |y: i32| (y - dyo) as f32 * scale_y;
            let vx = &mut self.vertices;
            vx.push_position(b.x2, b.y2);
            vx.push(u(b.x2));
            vx.push(v(b.y2));
            vx.push_position(b.x1, b.y2);
            vx.push(u(b.x1));
            vx.push(v(b.y2));
            vx.push_position(b.x1, b.y1);
            vx.push(u(b.x1));
            vx.push(v(b.y1));
        }

        self.vertex_flush();
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Batch control
    // ---------------------------------------------------------------------

    /// Hands any staged vertices to the batch without submitting it.
    ///
    /// An open primitive is closed first, so a pending component-alpha fixup runs over the
    /// rectangles drawn so far and leaves its own blend and kernel bound. An operation that
    /// keeps drawing afterwards gets its main blend and kernel back when its next primitive
    /// opens.
    pub fn flush(&mut self) -> Result<()> {
        self.vertex_finish(true)
    }

    /// Finishes the batch under construction and hands it to the transport.
    ///
    /// The batch is submitted even when staged vertices could not be uploaded; the upload
    /// failure is returned afterwards.
    pub fn submit(&mut self) -> Result<()> {
        if self.transport.used() == 0 && self.vertices.is_empty() {
            return Ok(());
        }
        let finished = self.vertex_finish(true);
        if let Err(err) = finished.as_ref() {
            warn!(%err, "submitting without staged vertices");
        }
        self.transport.submit();
        self.stats.submissions += 1;
        self.reset();
        finished
    }

    /// Forgets all per-batch state. Called after every submission.
    pub fn reset(&mut self) {
        self.state.reset();
        self.surfaces.reset();
    }

    /// Moves the batch to `mode`, submitting work queued for another engine.
    pub fn context_switch(&mut self, mode: Mode) -> Result<()> {
        let current = self.transport.mode();
        if mode == Mode::None || mode == current {
            return Ok(());
        }
        if current != Mode::None {
            debug!(from = ?current, to = ?mode, "context switch");
            self.submit()?;
        }
        self.transport.set_mode(mode);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // State emission
    // ---------------------------------------------------------------------

    /// Submits if any of `buffers` cannot join the batch, and flushes the render cache if
    /// any `sampled` buffer was rendered to in this batch.
    fn prepare_buffers(&mut self, buffers: &[BufferId], sampled: &[BufferId]) -> Result<()> {
        if buffers.iter().any(|&b| !self.transport.check_buffer(b)) {
            debug!("buffer does not fit the batch, submitting");
            self.submit()?;
        }
        if sampled.iter().any(|&b| self.transport.is_dirty(b)) {
            self.emit_flush()?;
        }
        Ok(())
    }

    fn emit_flush(&mut self) -> Result<()> {
        if self.transport.used() == 0 {
            return Ok(());
        }
        if !self.transport.reserve(1, 0) {
            return self.submit();
        }
        trace!("pipeline flush");
        self.transport.append(MI_FLUSH);
        Ok(())
    }

    /// Ensures the batch is in render mode with room for `words` and `surfaces`.
    fn get_batch(&mut self, words: usize, surfaces: usize) -> Result<()> {
        self.context_switch(Mode::Render)?;
        if !self.transport.reserve(words, surfaces) || !self.transport.relocation_room() {
            debug!(words, surfaces, used = self.transport.used(), "batch full, submitting");
            self.submit()?;
            if !self.transport.reserve(words, surfaces) {
                return Err(RenderError::OutOfSpace { words, surfaces });
            }
            // Submission leaves the transport without a mode.
            self.transport.set_mode(Mode::Render);
        }
        if self.state.needs_invariant() {
            self.state
                .emit_invariant(&mut self.transport, self.statics.offsets(), self.general);
        }
        Ok(())
    }

    fn emit_state(&mut self, op: &CompositeOp, sources: Sources<'_>) -> Result<()> {
        let mut words = self.config.state_reserve_words;
        if op.needs_ca_pass() {
            words += CA_PASS_WORDS;
        }
        self.get_batch(words, 1 + op.nr_surfaces as usize)?;

        let t = &mut self.transport;
        let table = alloc_binding_table(t);
        let mut entries = [0u32; BINDING_TABLE_WORDS];
        let mut n = 0;

        let dst = &op.dst;
        entries[n] = self
            .surfaces
            .bind(t, &dst.buffer, dst.width, dst.height, dst.surface_format(), true);
        n += 1;
        match sources {
            Sources::Channels => {
                for channel in std::iter::once(&op.src).chain(op.mask.as_ref()) {
                    entries[n] = self.surfaces.bind(
                        t,
                        &channel.buffer,
                        channel.width,
                        channel.height,
                        channel.card_format,
                        false,
                    );
                    n += 1;
                }
            }
            Sources::Video(frame) => {
                for plane in frame.planes() {
                    entries[n] = self.surfaces.bind_plane(t, &frame.buffer, &plane);
                    n += 1;
                }
            }
        }

        let offset = finish_binding_table(t, &self.state, table, &entries[..n]);
        if offset != table {
            self.stats.binding_table_reuses += 1;
        }
        self.state
            .apply(&mut self.transport, self.statics.offsets(), &op.state_request(offset));
        Ok(())
    }

    /// Switches the arena to the operation's vertex layout, finishing it first when the
    /// rounded-up cursor would leave no room for a rectangle.
    fn align_vertex(&mut self, op: &CompositeOp) -> Result<()> {
        if self.vertices.floats_per_vertex() == op.floats_per_vertex {
            return Ok(());
        }
        trace!(
            from = self.vertices.floats_per_vertex(),
            to = op.floats_per_vertex,
            "vertex layout changed"
        );
        if self.vertices.space() < 2 * 3 * op.floats_per_vertex {
            self.vertex_finish(false)?;
        }
        self.vertices.align(op.floats_per_vertex);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Vertex management
    // ---------------------------------------------------------------------

    /// Reserves vertices for up to `want` rectangles, re-emitting state once if needed.
    fn acquire(&mut self, op: &CompositeOp, want: usize, sources: Sources<'_>) -> Result<usize> {
        if self.state.needs_invariant() {
            // The batch was submitted since the operation programmed its state.
            debug!("state lost mid-operation, re-emitting");
            self.emit_state(op, sources)?;
            self.align_vertex(op)?;
        }
        let n = self.get_rectangles(op, want)?;
        if n > 0 {
            return Ok(n);
        }
        self.emit_state(op, sources)?;
        self.align_vertex(op)?;
        match self.get_rectangles(op, want)? {
            0 => Err(RenderError::OutOfSpace {
                words: VERTEX_BUFFER_WORDS + PRIMITIVE_WORDS,
                surfaces: 0,
            }),
            n => Ok(n),
        }
    }

    /// Claims vertices for up to `want` rectangles. Zero means the batch needs new state.
    fn get_rectangles(&mut self, op: &CompositeOp, want: usize) -> Result<usize> {
        let per_rect = 3 * op.floats_per_vertex;
        let mut rem = self.vertices.space();
        if rem < per_rect {
            rem = self.flush_for_space(op)?;
            if rem == 0 {
                return Ok(0);
            }
        }
        if !self.rectangle_begin(op) {
            return Ok(0);
        }

        let mut want = want;
        if want > 1 && want * per_rect > rem {
            want = rem / per_rect;
        }
        self.vertices.claim(3 * want as u32);
        Ok(want)
    }

    /// Hands the full arena to the batch mid-operation. Returns the floats now free, or zero
    /// if the batch itself is out of room.
    fn flush_for_space(&mut self, op: &CompositeOp) -> Result<usize> {
        let mut words = VERTEX_BUFFER_WORDS;
        if op.needs_ca_pass() {
            words += CA_PASS_WORDS;
        }
        if !self.transport.reserve(words, 0) || !self.transport.relocation_room() {
            return Ok(0);
        }
        debug!(used = self.vertices.used(), "vertex arena full");
        self.vertex_finish(false)?;
        self.vertices.align(op.floats_per_vertex);
        Ok(self.vertices.capacity())
    }

    /// Binds the vertex buffer and opens a primitive if either is missing.
    ///
    /// A component-alpha operation gets its main blend and kernel back before the primitive
    /// opens, since a fixup pass may have replaced them.
    fn rectangle_begin(&mut self, op: &CompositeOp) -> bool {
        let bind = !self.state.is_vertex_buffer_bound(op.ve_id);
        let open = self.vertices.open().is_none();

        let mut words = 0;
        if bind {
            words += VERTEX_BUFFER_WORDS;
        }
        if open {
            words += PRIMITIVE_WORDS;
            if op.needs_ca_pass() {
                words += CA_PASS_WORDS;
            }
        }
        if words == 0 {
            return true;
        }
        if !self.transport.reserve(words, 0) {
            return false;
        }

        if open && op.needs_ca_pass() {
            self.restore_main_pass(op);
        }
        if bind {
            self.emit_vertex_buffer(op);
        }
        if open {
            self.emit_primitive();
        }
        true
    }

    fn restore_main_pass(&mut self, op: &CompositeOp) {
        let offsets = self.statics.offsets();
        let t = &mut self.transport;
        let changed = self.state.emit_cc(t, offsets, op.blend());
        self.state
            .emit_wm(t, offsets, op.kernel, op.nr_surfaces, op.nr_inputs);
        if changed {
            trace!("main blend restored");
            t.append(MI_FLUSH | MI_INHIBIT_RENDER_CACHE_FLUSH);
        }
    }

    fn emit_vertex_buffer(&mut self, op: &CompositeOp) {
        let id = op.ve_id;
        let pitch = 4 * op.floats_per_vertex as u32;
        let t = &mut self.transport;
        t.append(STATE_VERTEX_BUFFERS | (VERTEX_BUFFER_WORDS as u32 - 2));
        t.append(
            (id << VB0_BUFFER_INDEX_SHIFT)
                | VB0_VERTEXDATA
                | VB0_ADDRESS_MODIFY_ENABLE
                | (pitch << VB0_BUFFER_PITCH_SHIFT),
        );
        let index = t.append(0);
        t.append(0);
        t.append(0);
        self.vertices.set_reloc(id, index);
        self.state.bind_vertex_buffer(id);
        trace!(id, pitch, index, "vertex buffer bound");
    }

    /// Opens a rectangle-list primitive, extending the previous one when it ends the batch.
    fn emit_primitive(&mut self) {
        let used = self.transport.used();
        if self.state.last_primitive() == Some(used) {
            self.vertices.reopen(used - 5);
            self.stats.merged_primitives += 1;
            trace!("primitive extended");
            return;
        }

        let t = &mut self.transport;
        t.append(PRIMITIVE | (PRIMITIVE_WORDS as u32 - 2));
        t.append(PRIMITIVE_VERTEX_SEQUENTIAL | PRIMITIVE_RECTLIST);
        let count_index = t.append(0);
        t.append(self.vertices.index());
        t.append(1);
        t.append(0);
        t.append(0);
        self.vertices.begin(count_index);
        self.state.set_last_primitive(Some(t.used()));
        self.stats.primitives += 1;
    }

    /// Patches the vertex count of the open primitive and runs the pending fixup pass.
    fn vertex_flush(&mut self) {
        let Some((open, count)) = self.vertices.close() else {
            return;
        };
        trace!(start = open.start, count, "primitive closed");
        self.transport.patch(open.count_index, count);
        if let Some(ca) = self.ca {
            self.magic_ca_pass(ca, open.start, count);
        }
    }

    /// Replays the vertices `start..start + count` with `Add` over source color.
    fn magic_ca_pass(&mut self, ca: CaPass, start: u32, count: u32) {
        debug!(start, count, "component-alpha pass");
        let offsets = self.statics.offsets();
        let t = &mut self.transport;
        let changed = self
            .state
            .emit_cc(t, offsets, get_blend(Operator::Add, true, ca.dst_format));
        self.state.emit_wm(
            t,
            offsets,
            choose_composite_kernel(Operator::Add, true, true, ca.is_affine),
            3,
            2,
        );
        if changed {
            t.append(MI_FLUSH | MI_INHIBIT_RENDER_CACHE_FLUSH);
        }

        t.append(PRIMITIVE | (PRIMITIVE_WORDS as u32 - 2));
        t.append(PRIMITIVE_VERTEX_SEQUENTIAL | PRIMITIVE_RECTLIST);
        t.append(count);
        t.append(start);
        t.append(1);
        t.append(0);
        t.append(0);
        self.state.set_last_primitive(None);
        self.stats.ca_passes += 1;
    }

    /// Closes the open primitive and moves staged vertices into the batch or a buffer of their
    /// own, patching every bound vertex-buffer address.
    fn vertex_finish(&mut self, last: bool) -> Result<()> {
        self.vertex_flush();
        if self.vertices.is_empty() {
            return Ok(());
        }

        let used = self.vertices.used();
        let t = &mut self.transport;
        let (target, delta) = if last && t.used() + used <= t.surface_offset() {
            let start = t.used();
            for value in self.vertices.data() {
                t.append(value.to_bits());
            }
            self.stats.inline_vertex_uploads += 1;
            debug!(floats = used, offset = start * 4, "vertices copied inline");
            (None, (start * 4) as u32)
        } else {
            let bytes: &[u8] = bytemuck::cast_slice(self.vertices.data());
            let buffer = t
                .create_linear_buffer(bytes.len())
                .ok_or(RenderError::VertexUpload { bytes: bytes.len() })?;
            if !t.write(buffer, bytes) {
                t.destroy(buffer);
                return Err(RenderError::VertexUpload { bytes: bytes.len() });
            }
            self.stats.buffer_vertex_uploads += 1;
            debug!(floats = used, ?buffer, "vertices uploaded");
            (Some(buffer), 0)
        };

        let end = delta + (used * 4) as u32 - 1;
        for index in self.vertices.take_relocs() {
            let start_address = t.add_relocation(index, target, DOMAIN_VERTEX << 16, delta);
            t.patch(index, start_address);
            let end_address = t.add_relocation(index + 1, target, DOMAIN_VERTEX << 16, end);
            t.patch(index + 1, end_address);
        }
        if let Some(buffer) = target {
            // The batch keeps its own reference until it retires.
            t.destroy(buffer);
        }

        self.vertices.reset();
        self.state.unbind_vertex_buffers();
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    fn check_size(&self, pixmap: &Pixmap) -> Result<()> {
        if self.config.fits(pixmap.width, pixmap.height) {
            Ok(())
        } else {
            Err(RenderError::SurfaceTooLarge {
                width: pixmap.width,
                height: pixmap.height,
                max: self.config.max_3d_size,
            })
        }
    }

    fn release_op_channels(&mut self, op: &CompositeOp) {
        release_channel(&mut self.transport, &op.src);
        if let Some(mask) = op.mask.as_ref() {
            release_channel(&mut self.transport, mask);
        }
    }
}

/// Three vertices of a copied rectangle: `src` and `dst` are top-left corners.
fn emit_copy_rect(
    v: &mut VertexArena,
    scale: [f32; 2],
    src: (i32, i32),
    size: (i32, i32),
    dst: (i32, i32),
) {
    let (sx, sy) = src;
    let (w, h) = size;
    let (dx, dy) = dst;
    v.push_position(dx + w, dy + h);
    v.push((sx + w) as f32 * scale[0]);
    v.push((sy + h) as f32 * scale[1]);
    v.push_position(dx, dy + h);
    v.push(sx as f32 * scale[0]);
    v.push((sy + h) as f32 * scale[1]);
    v.push_position(dx, dy);
    v.push(sx as f32 * scale[0]);
    v.push(sy as f32 * scale[1]);
}

/// Three vertices of a solid rectangle sampling the corners of a 1x1 texel.
fn emit_fill_rect(v: &mut VertexArena, b: &BoxRec) {
    v.push_position(b.x2, b.y2);
    v.push(1.0);
    v.push(1.0);
    v.push_position(b.x1, b.y2);
    v.push(0.0);
    v.push(1.0);
    v.push_position(b.x1, b.y1);
    v.push(0.0);
    v.push(0.0);
}
