//! Primitive emitters.
//!
//! Every rectangle becomes three vertices (bottom-right, bottom-left, top-left) of a
//! rectangle-list primitive. Each vertex starts with the packed destination position,
//! followed by the source coordinates and, when present, the mask coordinates.

use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::compile::CompositeOp;
use crate::transform::{transform_point, transform_point_3d};
use crate::vertex::VertexArena;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// One composite rectangle: where to sample the source and mask, and where to draw.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeRectangles {
    #[serde(default)]
    pub src: Point,
    #[serde(default)]
    pub mask: Point,
    pub dst: Point,
    pub width: i32,
    pub height: i32,
}

/// An axis-aligned box with exclusive lower-right corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxRec {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoxRec {
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// Smallest box covering every box in `boxes`.
    pub fn extents(boxes: &[BoxRec]) -> Option<BoxRec> {
        let (first, rest) = boxes.split_first()?;
        Some(rest.iter().fold(*first, |acc, b| {
            BoxRec::new(
                acc.x1.min(b.x1),
                acc.y1.min(b.y1),
                acc.x2.max(b.x2),
                acc.y2.max(b.y2),
            )
        }))
    }
}

/// Vertex-writing strategy, chosen once when an operation is compiled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimitiveEmitter {
    /// Constant source; texture coordinates span the 1x1 texel.
    Solid,
    /// Untransformed source, no mask.
    IdentitySource,
    /// Affine source, no mask.
    AffineSource,
    /// Untransformed source and mask.
    IdentitySourceMask,
    /// Any combination of affine or projective channels.
    Generic,
}

impl PrimitiveEmitter {
    pub fn select(src: &Channel, mask: Option<&Channel>, is_affine: bool) -> Self {
        match mask {
            None if src.is_solid() => PrimitiveEmitter::Solid,
            None if src.transform.is_none() => PrimitiveEmitter::IdentitySource,
            None if is_affine => PrimitiveEmitter::AffineSource,
            Some(mask) if src.transform.is_none() && mask.transform.is_none() => {
                PrimitiveEmitter::IdentitySourceMask
            }
            _ => PrimitiveEmitter::Generic,
        }
    }

    /// Writes the three vertices of `r` into `v`.
    pub fn emit(self, v: &mut VertexArena, op: &CompositeOp, r: &CompositeRectangles) {
        match self {
            PrimitiveEmitter::Solid => emit_solid(v, r),
            PrimitiveEmitter::IdentitySource => emit_identity_source(v, &op.src, r),
            PrimitiveEmitter::AffineSource => emit_affine_source(v, &op.src, r),
            PrimitiveEmitter::IdentitySourceMask => match op.mask.as_ref() {
                Some(mask) => emit_identity_source_mask(v, &op.src, mask, r),
                None => emit_identity_source(v, &op.src, r),
            },
            PrimitiveEmitter::Generic => emit_generic(v, op, r),
        }
    }
}

fn emit_solid(v: &mut VertexArena, r: &CompositeRectangles) {
    v.push_position(r.dst.x + r.width, r.dst.y + r.height);
    v.push(1.0);
    v.push(1.0);

    v.push_position(r.dst.x, r.dst.y + r.height);
    v.push(0.0);
    v.push(1.0);

    v.push_position(r.dst.x, r.dst.y);
    v.push(0.0);
    v.push(0.0);
}

fn emit_identity_source(v: &mut VertexArena, src: &Channel, r: &CompositeRectangles) {
    let [sx, sy] = src.scale;
    let u0 = (r.src.x + src.offset[0]) as f32 * sx;
    let v0 = (r.src.y + src.offset[1]) as f32 * sy;
    let u1 = u0 + r.width as f32 * sx;
    let v1 = v0 + r.height as f32 * sy;

    v.push_position(r.dst.x + r.width, r.dst.y + r.height);
    v.push(u1);
    v.push(v1);

    v.push_position(r.dst.x, r.dst.y + r.height);
    v.push(u0);
    v.push(v1);

    v.push_position(r.dst.x, r.dst.y);
    v.push(u0);
    v.push(v0);
}

fn emit_affine_source(v: &mut VertexArena, src: &Channel, r: &CompositeRectangles) {
    let transform = src.transform.as_ref();
    let [sx, sy] = src.scale;
    let x = (src.offset[0] + r.src.x) as f32;
    let y = (src.offset[1] + r.src.y) as f32;
    let w = r.width as f32;
    let h = r.height as f32;

    let corners = [
        (r.dst.x + r.width, r.dst.y + r.height, x + w, y + h),
        (r.dst.x, r.dst.y + r.height, x, y + h),
        (r.dst.x, r.dst.y, x, y),
    ];
    for (dx, dy, u, t) in corners {
        let (u, t) = transform_point(transform, u, t);
        v.push_position(dx, dy);
        v.push(u * sx);
        v.push(t * sy);
    }
}

fn emit_identity_source_mask(
    v: &mut VertexArena,
    src: &Channel,
    mask: &Channel,
    r: &CompositeRectangles,
) {
    let src_x = (r.src.x + src.offset[0]) as f32;
    let src_y = (r.src.y + src.offset[1]) as f32;
    let msk_x = (r.mask.x + mask.offset[0]) as f32;
    let msk_y = (r.mask.y + mask.offset[1]) as f32;
    let w = r.width as f32;
    let h = r.height as f32;

    let src_u0 = src_x * src.scale[0];
    let src_v0 = src_y * src.scale[1];
    let src_u1 = (src_x + w) * src.scale[0];
    let src_v1 = (src_y + h) * src.scale[1];
    let msk_u0 = msk_x * mask.scale[0];
    let msk_v0 = msk_y * mask.scale[1];
    let msk_u1 = (msk_x + w) * mask.scale[0];
    let msk_v1 = (msk_y + h) * mask.scale[1];

    v.push_position(r.dst.x + r.width, r.dst.y + r.height);
    v.push(src_u1);
    v.push(src_v1);
    v.push(msk_u1);
    v.push(msk_v1);

    v.push_position(r.dst.x, r.dst.y + r.height);
    v.push(src_u0);
    v.push(src_v1);
    v.push(msk_u0);
    v.push(msk_v1);

    v.push_position(r.dst.x, r.dst.y);
    v.push(src_u0);
    v.push(src_v0);
    v.push(msk_u0);
    v.push(msk_v0);
}

/// Homogeneous coordinates of the top-left, bottom-left and bottom-right corners.
type Corners = [(f32, f32, f32); 3];

fn channel_corners(
    channel: &Channel,
    at: Point,
    r: &CompositeRectangles,
    is_affine: bool,
) -> Option<Corners> {
    let transform = channel.transform.as_ref();
    let x = (at.x + channel.offset[0]) as f32;
    let y = (at.y + channel.offset[1]) as f32;
    let w = r.width as f32;
    let h = r.height as f32;
    let points = [(x, y), (x, y + h), (x + w, y + h)];

    let mut out = [(0.0, 0.0, 1.0); 3];
    for (slot, (px, py)) in out.iter_mut().zip(points) {
        *slot = if is_affine {
            let (u, t) = transform_point(transform, px, py);
            (u, t, 1.0)
        } else {
            transform_point_3d(transform, px, py)?
        };
    }
    Some(out)
}

fn emit_generic(v: &mut VertexArena, op: &CompositeOp, r: &CompositeRectangles) {
    let is_affine = op.is_affine();
    let src = channel_corners(&op.src, r.src, r, is_affine);
    let mask = match op.mask.as_ref() {
        Some(mask) => channel_corners(mask, r.mask, r, is_affine).map(Some),
        None => Some(None),
    };
    let (Some(src), Some(mask)) = (src, mask) else {
        // A corner maps to infinity: collapse the rectangle so the vertex count still holds.
        for _ in 0..3 {
            v.push_position(r.dst.x, r.dst.y);
            for _ in 1..op.floats_per_vertex {
                v.push(0.0);
            }
        }
        return;
    };

    let positions = [
        (r.dst.x + r.width, r.dst.y + r.height),
        (r.dst.x, r.dst.y + r.height),
        (r.dst.x, r.dst.y),
    ];
    for (corner, (dx, dy)) in [2usize, 1, 0].into_iter().zip(positions) {
        v.push_position(dx, dy);
        let (u, t, w) = src[corner];
        v.push(u * op.src.scale[0]);
        v.push(t * op.src.scale[1]);
        if !is_affine {
            v.push(w);
        }
        if let (Some(mask), Some(channel)) = (mask.as_ref(), op.mask.as_ref()) {
            let (u, t, w) = mask[corner];
            v.push(u * channel.scale[0]);
            v.push(t * channel.scale[1]);
            if !is_affine {
                v.push(w);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blend::Operator;
    use crate::channel::ChannelFlags;
    use crate::compile::{CompositeOp, OpFlags, Target};
    use crate::format::{PictFormat, SurfaceFormat};
    use crate::kernel::Kernel;
    use crate::sampler::{Extend, Filter};
    use crate::transform::Transform;
    use crate::transport::{Buffer, BufferId, Tiling};
    use crate::vertex::unpack_position;

    fn channel(id: u32, size: u32) -> Channel {
        Channel {
            buffer: Buffer {
                id: BufferId(id),
                pitch: size * 4,
                tiling: Tiling::None,
            },
            width: size,
            height: size,
            card_format: SurfaceFormat::B8G8R8A8Unorm,
            transform: None,
            filter: Filter::Nearest,
            extend: Extend::None,
            offset: [0, 0],
            scale: [1.0 / size as f32, 1.0 / size as f32],
            flags: ChannelFlags::empty(),
        }
    }

    fn composite_op(
        src: Channel,
        mask: Option<Channel>,
        floats_per_vertex: usize,
        affine: bool,
    ) -> CompositeOp {
        let mut flags = OpFlags::empty();
        if affine {
            flags |= OpFlags::AFFINE;
        }
        CompositeOp {
            op: Operator::Over,
            dst: Target {
                buffer: Buffer {
                    id: BufferId(1),
                    pitch: 256,
                    tiling: Tiling::None,
                },
                width: 64,
                height: 64,
                format: PictFormat::A8r8g8b8,
                x: 0,
                y: 0,
            },
            src,
            mask,
            flags,
            floats_per_vertex,
            emitter: PrimitiveEmitter::Generic,
            kernel: Kernel::NoMask,
            nr_surfaces: 2,
            nr_inputs: 1,
            ve_id: 1,
        }
    }

    fn rect() -> CompositeRectangles {
        CompositeRectangles {
            src: Point::new(2, 4),
            mask: Point::new(0, 0),
            dst: Point::new(5, 5),
            width: 10,
            height: 10,
        }
    }

    fn arena(fpv: usize) -> VertexArena {
        let mut v = VertexArena::new(64);
        v.align(fpv);
        v
    }

    #[test]
    fn solid_spans_the_texel() {
        let mut v = arena(3);
        emit_solid(&mut v, &rect());
        let d = v.data();
        assert_eq!(unpack_position(d[0]), (15, 15));
        assert_eq!(&d[1..3], &[1.0, 1.0]);
        assert_eq!(unpack_position(d[3]), (5, 15));
        assert_eq!(&d[4..6], &[0.0, 1.0]);
        assert_eq!(unpack_position(d[6]), (5, 5));
        assert_eq!(&d[7..9], &[0.0, 0.0]);
    }

    #[test]
    fn identity_source_normalizes() {
        let mut src = channel(2, 16);
        src.offset = [1, 0];
        let mut v = arena(3);
        emit_identity_source(&mut v, &src, &rect());
        let d = v.data();
        assert_eq!(d[7], 3.0 / 16.0);
        assert_eq!(d[8], 4.0 / 16.0);
        assert_eq!(d[1], 13.0 / 16.0);
        assert_eq!(d[2], 14.0 / 16.0);
        assert_eq!(d[4], d[7]);
        assert_eq!(d[5], d[2]);
    }

    #[test]
    fn specialised_emitters_match_generic() {
        let src = channel(2, 16);
        let mask = channel(3, 32);

        let mut a = arena(5);
        let mut b = arena(5);
        let op = composite_op(src, Some(mask), 5, true);
        PrimitiveEmitter::IdentitySourceMask.emit(&mut a, &op, &rect());
        PrimitiveEmitter::Generic.emit(&mut b, &op, &rect());
        assert_eq!(a.data(), b.data());

        let mut scaled = src;
        scaled.transform = Some(Transform::scale(2.0, 2.0));
        let op = composite_op(scaled, None, 3, true);
        let mut a = arena(3);
        let mut b = arena(3);
        PrimitiveEmitter::AffineSource.emit(&mut a, &op, &rect());
        PrimitiveEmitter::Generic.emit(&mut b, &op, &rect());
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn projective_vertices_carry_w() {
        let mut src = channel(2, 16);
        let mut transform = Transform::identity();
        transform.matrix[2] = [0.0, 0.0, 2.0];
        src.transform = Some(transform);
        let op = composite_op(src, None, 4, false);
        let mut v = arena(4);
        PrimitiveEmitter::Generic.emit(&mut v, &op, &rect());
        assert_eq!(v.used(), 12);
        assert_eq!(v.data()[3], 2.0);
    }

    #[test]
    fn points_at_infinity_collapse() {
        let mut src = channel(2, 16);
        let mut transform = Transform::identity();
        transform.matrix[2] = [0.0, 0.0, 0.0];
        src.transform = Some(transform);
        let op = composite_op(src, None, 4, false);
        let mut v = arena(4);
        PrimitiveEmitter::Generic.emit(&mut v, &op, &rect());
        assert_eq!(v.used(), 12);
        assert!(v.data().chunks(4).all(|c| unpack_position(c[0]) == (5, 5)));
    }

    #[test]
    fn selection() {
        let solid = Channel {
            flags: ChannelFlags::SOLID,
            ..channel(2, 1)
        };
        let plain = channel(3, 8);
        let mut affine = plain;
        affine.transform = Some(Transform::scale(0.5, 0.5));

        assert_eq!(PrimitiveEmitter::select(&solid, None, true), PrimitiveEmitter::Solid);
        assert_eq!(
            PrimitiveEmitter::select(&plain, None, true),
            PrimitiveEmitter::IdentitySource
        );
        assert_eq!(
            PrimitiveEmitter::select(&affine, None, true),
            PrimitiveEmitter::AffineSource
        );
        assert_eq!(
            PrimitiveEmitter::select(&plain, Some(&plain), true),
            PrimitiveEmitter::IdentitySourceMask
        );
        assert_eq!(
            PrimitiveEmitter::select(&affine, Some(&plain), true),
            PrimitiveEmitter::Generic
        );
    }

    #[test]
    fn box_helpers() {
        let boxes = [BoxRec::new(0, 0, 4, 4), BoxRec::new(8, -2, 10, 3)];
        assert_eq!(BoxRec::extents(&boxes), Some(BoxRec::new(0, -2, 10, 4)));
        assert_eq!(BoxRec::extents(&[]), None);
    }
}
