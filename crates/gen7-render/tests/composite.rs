mod common;

use common::{argb_target, count, pixmap, pointers, primitives, render, request, static_offsets};
use gen7_render::blend::{blend_offset, get_blend, BlendFactor};
use gen7_render::hw::{
    DOMAIN_VERTEX, MI_FLUSH, MI_INHIBIT_RENDER_CACHE_FLUSH, PIPELINE_SELECT, PIPELINE_SELECT_3D,
    STATE_BINDING_TABLE_POINTERS_PS, STATE_BLEND_STATE_POINTERS,
};
use gen7_render::kernel::choose_composite_kernel;
use gen7_render::vertex::unpack_position;
use gen7_render::{
    BoxRec, CompositeRectangles, Operator, PictFilter, PictFormat, Picture, PictureSource, Point,
    RenderError, Transport,
};
use pretty_assertions::assert_eq;

fn full_rect() -> CompositeRectangles {
    CompositeRectangles {
        src: Point::new(0, 0),
        mask: Point::new(0, 0),
        dst: Point::new(0, 0),
        width: 64,
        height: 64,
    }
}

fn ca_mask(id: u32) -> Picture {
    let mut mask = Picture::drawable(pixmap(id, 64, 64, 32), PictFormat::A8r8g8b8);
    mask.component_alpha = true;
    mask
}

#[test]
fn solid_over_draws_one_rectangle() {
    let mut r = render();
    let req = request(Operator::Over, Picture::solid(0x80ff_0000), None, argb_target(1));
    let op = r.composite(&req).unwrap();
    r.composite_blt(&op, &full_rect()).unwrap();
    r.composite_done(&op);
    r.submit().unwrap();

    let batch = r.transport_mut().take_submitted().remove(0);
    assert_eq!(batch.commands[0], PIPELINE_SELECT | PIPELINE_SELECT_3D);
    let prims = primitives(&batch.commands);
    assert_eq!(prims.len(), 1);
    assert_eq!((prims[0].1, prims[0].2), (3, 0));

    let cc = static_offsets().cc_blend;
    assert_eq!(
        pointers(&batch.commands, STATE_BLEND_STATE_POINTERS),
        vec![(cc + blend_offset(BlendFactor::One, BlendFactor::InvSrcAlpha)) | 1]
    );

    // Vertices were copied into the tail of the batch.
    let vertex_relocs: Vec<_> = batch
        .relocations
        .iter()
        .filter(|reloc| reloc.domains == DOMAIN_VERTEX << 16)
        .collect();
    assert_eq!(vertex_relocs.len(), 2);
    assert_eq!(vertex_relocs[0].target, None);
    let start = vertex_relocs[0].delta as usize / 4;
    assert_eq!(vertex_relocs[1].delta as usize, start * 4 + 9 * 4 - 1);

    let floats: Vec<f32> = batch.commands[start..start + 9]
        .iter()
        .map(|w| f32::from_bits(*w))
        .collect();
    assert_eq!(unpack_position(floats[0]), (64, 64));
    assert_eq!(unpack_position(floats[3]), (0, 64));
    assert_eq!(unpack_position(floats[6]), (0, 0));
    assert_eq!(
        [floats[1], floats[2], floats[4], floats[5], floats[7], floats[8]],
        [1.0, 1.0, 0.0, 1.0, 0.0, 0.0]
    );

    let stats = r.stats();
    assert_eq!(stats.primitives, 1);
    assert_eq!(stats.inline_vertex_uploads, 1);
    assert_eq!(stats.submissions, 1);
}

#[test]
fn component_alpha_over_replays_the_same_vertices() {
    let mut r = render();
    let src = Picture::drawable(pixmap(1, 64, 64, 32), PictFormat::A8r8g8b8);
    let req = request(Operator::Over, src, Some(ca_mask(2)), argb_target(3));
    let op = r.composite(&req).unwrap();
    assert!(op.needs_ca_pass());
    r.composite_boxes(&op, &[BoxRec::new(0, 0, 8, 8), BoxRec::new(8, 8, 16, 16)])
        .unwrap();
    r.composite_done(&op);

    let commands = r.transport().commands();
    let prims = primitives(commands);
    assert_eq!(prims.len(), 2);
    assert_eq!((prims[0].1, prims[0].2), (6, 0));
    assert_eq!((prims[1].1, prims[1].2), (6, 0));
    assert_eq!(
        commands[prims[1].0 - 1],
        MI_FLUSH | MI_INHIBIT_RENDER_CACHE_FLUSH
    );

    let cc = static_offsets().cc_blend;
    let main = get_blend(Operator::OutReverse, true, PictFormat::A8r8g8b8);
    let fixup = get_blend(Operator::Add, true, PictFormat::A8r8g8b8);
    assert_eq!(
        pointers(commands, STATE_BLEND_STATE_POINTERS),
        vec![(cc + main) | 1, (cc + fixup) | 1]
    );
    assert_eq!(r.state().blend(), Some(fixup));
    assert_eq!(
        r.state().kernel(),
        Some(choose_composite_kernel(Operator::Add, true, true, true))
    );
    assert_eq!(r.stats().ca_passes, 1);
}

#[test]
fn component_alpha_with_other_source_alpha_operators_falls_back() {
    for op in [Operator::Atop, Operator::Xor] {
        let mut r = render();
        let req = request(op, Picture::solid(0xff00_ff00), Some(ca_mask(2)), argb_target(3));
        let err = r.composite(&req).unwrap_err();
        assert!(matches!(err, RenderError::UnsupportedComponentAlpha { .. }));
        assert!(err.is_fallback());
        assert!(r.transport().commands().is_empty());

        // The solid prepared for the source was released again.
        let solid = r.transport_mut().solid(0xff00_ff00).unwrap();
        assert_eq!(r.transport().buffer_refs(solid.id), 1);
    }
}

#[test]
fn alpha_less_destination_reads_destination_alpha_as_one() {
    let mut r = render();
    let src = Picture::drawable(pixmap(1, 64, 64, 32), PictFormat::A8r8g8b8);
    let dst = Picture::drawable(pixmap(2, 64, 64, 24), PictFormat::X8r8g8b8);
    let op = r.composite(&request(Operator::Atop, src, None, dst)).unwrap();
    r.composite_done(&op);
    assert_eq!(
        r.state().blend(),
        Some(blend_offset(BlendFactor::One, BlendFactor::InvSrcAlpha))
    );
}

#[test]
fn identical_state_emits_nothing_and_extends_the_primitive() {
    let mut r = render();
    let req = request(Operator::Over, Picture::solid(0xff12_3456), None, argb_target(1));

    let op = r.composite(&req).unwrap();
    r.composite_blt(&op, &full_rect()).unwrap();
    r.composite_done(&op);
    let used = r.transport().used();

    let op = r.composite(&req).unwrap();
    assert_eq!(r.transport().used(), used);
    r.composite_blt(&op, &full_rect()).unwrap();
    r.composite_done(&op);
    assert_eq!(r.transport().used(), used);

    let prims = primitives(r.transport().commands());
    assert_eq!(prims.len(), 1);
    assert_eq!((prims[0].1, prims[0].2), (6, 0));

    let stats = r.stats();
    assert_eq!(stats.binding_table_reuses, 1);
    assert_eq!(stats.merged_primitives, 1);
}

#[test]
fn new_source_gets_a_new_binding_table() {
    let mut r = render();
    let first = Picture::drawable(pixmap(1, 64, 64, 32), PictFormat::A8r8g8b8);
    let second = Picture::drawable(pixmap(2, 64, 64, 32), PictFormat::A8r8g8b8);

    for src in [first, second] {
        let op = r.composite(&request(Operator::Src, src, None, argb_target(3))).unwrap();
        r.composite_blt(&op, &full_rect()).unwrap();
        r.composite_done(&op);
    }

    let tables = pointers(r.transport().commands(), STATE_BINDING_TABLE_POINTERS_PS);
    assert_eq!(tables.len(), 2);
    assert!(tables[1] < tables[0]);
    assert_eq!(r.stats().binding_table_reuses, 0);
    assert_eq!(r.stats().primitives, 2);
}

#[test]
fn boxes_share_one_primitive() {
    let mut r = render();
    let src = Picture::drawable(pixmap(1, 64, 64, 32), PictFormat::A8r8g8b8);
    let op = r.composite(&request(Operator::Src, src, None, argb_target(2))).unwrap();
    let boxes: Vec<_> = (0..5).map(|i| BoxRec::new(i * 8, 0, i * 8 + 8, 8)).collect();
    r.composite_boxes(&op, &boxes).unwrap();
    r.composite_done(&op);

    let prims = primitives(r.transport().commands());
    assert_eq!(prims.len(), 1);
    assert_eq!(prims[0].1, 15);
}

#[test]
fn sampling_a_rendered_pixmap_flushes_first() {
    let mut r = render();
    let a = Picture::drawable(pixmap(1, 64, 64, 32), PictFormat::A8r8g8b8);
    let op = r
        .composite(&request(Operator::Src, Picture::solid(0xff00_0000), None, a))
        .unwrap();
    r.composite_blt(&op, &full_rect()).unwrap();
    r.composite_done(&op);
    assert_eq!(count(r.transport().commands(), MI_FLUSH), 0);

    let op = r.composite(&request(Operator::Over, a, None, argb_target(2))).unwrap();
    r.composite_done(&op);
    assert_eq!(count(r.transport().commands(), MI_FLUSH), 1);
}

#[test]
fn declines_leave_the_batch_untouched() {
    let mut r = render();
    let target = argb_target(9);

    let mut gradient = Picture::solid(0);
    gradient.source = PictureSource::Gradient;
    let mut convolved = Picture::drawable(pixmap(1, 64, 64, 32), PictFormat::A8r8g8b8);
    convolved.filter = PictFilter::Convolution;
    let huge = Picture::drawable(pixmap(2, 16385, 64, 32), PictFormat::A8r8g8b8);

    let cases = [
        (request(Operator::Over, gradient, None, target), "needs fixup"),
        (request(Operator::Over, convolved, None, target), "filter"),
        (request(Operator::Over, huge, None, target), "too large"),
        (
            request(
                Operator::Over,
                Picture::solid(0xffff_ffff),
                None,
                Picture::drawable(pixmap(3, 64, 64, 24), PictFormat::R8g8b8),
            ),
            "destination format",
        ),
        (
            request(Operator::Over, Picture::solid(0xffff_ffff), None, Picture::solid(0)),
            "destination",
        ),
    ];
    for (req, what) in cases {
        let err = r.composite(&req).unwrap_err();
        assert!(err.is_fallback(), "{what}: {err}");
    }
    assert!(r.transport().commands().is_empty());
    assert!(r.transport().submitted().is_empty());
}
