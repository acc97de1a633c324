mod common;

use common::{argb_target, pixmap, pointers, primitives, render, render_with, request, static_offsets};
use gen7_render::blend::get_blend;
use gen7_render::hw::{
    DOMAIN_VERTEX, PIPELINE_SELECT, PIPELINE_SELECT_3D, STATE_BINDING_TABLE_POINTERS_PS,
    STATE_BLEND_STATE_POINTERS, STATE_PS,
};
use gen7_render::{
    BoxRec, MemoryBatchConfig, Mode, Operator, PictFormat, Picture, RenderColor, RenderConfig,
    Transform, Transport, GX_COPY,
};
use pretty_assertions::assert_eq;

const RED: RenderColor = RenderColor {
    red: 0xffff,
    green: 0,
    blue: 0,
    alpha: 0xffff,
};

#[test]
fn full_vertex_arena_is_flushed_once() {
    // Room for exactly four rectangles of three floats per vertex.
    let config = RenderConfig {
        vertex_capacity: 4 * 3 * 3,
        ..RenderConfig::default()
    };
    let mut r = render_with(MemoryBatchConfig::default(), config);
    let boxes: Vec<_> = (0..8).map(|i| BoxRec::new(i * 4, 0, i * 4 + 4, 4)).collect();
    r.fill_boxes(Operator::Src, PictFormat::A8r8g8b8, RED, &pixmap(1, 64, 64, 32), &boxes)
        .unwrap();

    let stats = r.stats();
    assert_eq!(stats.buffer_vertex_uploads, 1);
    assert_eq!(stats.inline_vertex_uploads, 0);
    assert_eq!(stats.primitives, 2);

    let prims = primitives(r.transport().commands());
    assert_eq!(
        prims.iter().map(|p| (p.1, p.2)).collect::<Vec<_>>(),
        vec![(12, 0), (12, 0)]
    );

    // The first run lives in its own buffer, referenced from both address words.
    let relocs: Vec<_> = r
        .transport()
        .relocations()
        .iter()
        .filter(|reloc| reloc.domains == DOMAIN_VERTEX << 16)
        .copied()
        .collect();
    assert_eq!(relocs.len(), 2);
    assert!(relocs[0].target.is_some());
    assert_eq!(relocs[0].delta, 0);
    assert_eq!(relocs[1].delta, 12 * 3 * 4 - 1);

    r.submit().unwrap();
    assert_eq!(r.stats().inline_vertex_uploads, 1);
    let batch = &r.transport().submitted()[0];
    let uploaded = relocs[0].target.and_then(|id| batch.buffers.get(&id));
    assert_eq!(uploaded.map(Vec::len), Some(36 * 4));
}

#[test]
fn component_alpha_runs_are_fixed_up_before_each_flush() {
    let config = RenderConfig {
        vertex_capacity: 2 * 3 * 5,
        ..RenderConfig::default()
    };
    let mut r = render_with(MemoryBatchConfig::default(), config);
    let src = Picture::drawable(pixmap(1, 64, 64, 32), PictFormat::A8r8g8b8);
    let mut mask = Picture::drawable(pixmap(2, 64, 64, 32), PictFormat::A8r8g8b8);
    mask.component_alpha = true;

    let op = r
        .composite(&request(Operator::Over, src, Some(mask), argb_target(3)))
        .unwrap();
    let boxes: Vec<_> = (0..4).map(|i| BoxRec::new(i * 8, 0, i * 8 + 8, 8)).collect();
    r.composite_boxes(&op, &boxes).unwrap();
    r.composite_done(&op);

    assert_eq!(r.stats().ca_passes, 2);
    assert_eq!(r.stats().buffer_vertex_uploads, 1);
    let counts: Vec<_> = primitives(r.transport().commands())
        .iter()
        .map(|p| p.1)
        .collect();
    assert_eq!(counts, vec![6, 6, 6, 6]);
    // The main blend is restored after the mid-operation fixup.
    let cc = static_offsets().cc_blend;
    let main = (cc + get_blend(Operator::OutReverse, true, PictFormat::A8r8g8b8)) | 1;
    let fixup = (cc + get_blend(Operator::Add, true, PictFormat::A8r8g8b8)) | 1;
    assert_eq!(
        pointers(r.transport().commands(), STATE_BLEND_STATE_POINTERS),
        vec![main, fixup, main, fixup]
    );
}

#[test]
fn batch_pressure_submits_and_restarts_state() {
    let batch = MemoryBatchConfig {
        batch_words: 640,
        ..MemoryBatchConfig::default()
    };
    let mut r = render_with(batch, RenderConfig::default());
    for i in 0..40 {
        r.fill_boxes(
            Operator::Src,
            PictFormat::A8r8g8b8,
            RED,
            &pixmap(100 + i, 32, 32, 32),
            &[BoxRec::new(0, 0, 8, 8)],
        )
        .unwrap();
    }
    r.submit().unwrap();

    let submitted = r.transport().submitted();
    assert!(submitted.len() > 1);
    assert_eq!(submitted.len() as u64, r.stats().submissions);
    for batch in submitted {
        assert_eq!(batch.commands[0], PIPELINE_SELECT | PIPELINE_SELECT_3D);
        assert_eq!(batch.mode, Mode::Render);
        assert!(!primitives(&batch.commands).is_empty());
    }
}

#[test]
fn render_work_submits_pending_blitter_work() {
    let mut r = render();
    r.context_switch(Mode::Blt).unwrap();
    r.transport_mut().append(0);

    r.fill_boxes(
        Operator::Src,
        PictFormat::A8r8g8b8,
        RED,
        &pixmap(1, 16, 16, 32),
        &[BoxRec::new(0, 0, 4, 4)],
    )
    .unwrap();
    assert_eq!(r.transport().submitted().len(), 1);
    assert_eq!(r.transport().submitted()[0].mode, Mode::Blt);
    assert_eq!(r.transport().mode(), Mode::Render);

    r.submit().unwrap();
    let submitted = r.transport().submitted();
    assert_eq!(submitted.len(), 2);
    assert_eq!(submitted[1].mode, Mode::Render);
    assert_eq!(submitted[1].commands[0], PIPELINE_SELECT | PIPELINE_SELECT_3D);
    assert!(r.vertices().is_empty());
    assert!(r.state().needs_invariant());
}

#[test]
fn flush_keeps_the_batch_open() {
    let mut r = render();
    let op = r
        .composite(&request(Operator::Over, Picture::solid(0xff00_00ff), None, argb_target(1)))
        .unwrap();
    r.composite_boxes(&op, &[BoxRec::new(0, 0, 4, 4)]).unwrap();
    r.composite_done(&op);
    r.flush().unwrap();

    assert!(r.vertices().is_empty());
    assert!(r.transport().submitted().is_empty());
    assert!(!r.transport().commands().is_empty());
    assert_eq!(r.stats().inline_vertex_uploads, 1);
}

#[test]
fn submitting_mid_operation_restarts_its_state() {
    let mut r = render();
    let op = r
        .composite(&request(Operator::Over, Picture::solid(0xffff_0000), None, argb_target(1)))
        .unwrap();
    r.composite_boxes(&op, &[BoxRec::new(0, 0, 4, 4)]).unwrap();
    r.submit().unwrap();
    r.composite_boxes(&op, &[BoxRec::new(8, 8, 12, 12)]).unwrap();
    r.composite_done(&op);
    r.submit().unwrap();

    let submitted = r.transport().submitted();
    assert_eq!(submitted.len(), 2);
    let blend = (static_offsets().cc_blend + op.blend()) | 1;
    for batch in submitted {
        assert_eq!(batch.commands[0], PIPELINE_SELECT | PIPELINE_SELECT_3D);
        assert_eq!(pointers(&batch.commands, STATE_BLEND_STATE_POINTERS), vec![blend]);
        assert_eq!(pointers(&batch.commands, STATE_BINDING_TABLE_POINTERS_PS).len(), 1);
        assert_eq!(
            primitives(&batch.commands)
                .iter()
                .map(|p| (p.1, p.2))
                .collect::<Vec<_>>(),
            vec![(3, 0)]
        );
    }
}

#[test]
fn blitter_work_between_fills_keeps_the_fill_drawable() {
    let mut r = render();
    let op = r.fill(GX_COPY, &pixmap(1, 32, 32, 32), 0xff00ff).unwrap();
    r.fill_blt(&op, 0, 0, 4, 4).unwrap();
    r.context_switch(Mode::Blt).unwrap();
    r.transport_mut().append(0);
    r.fill_blt(&op, 8, 8, 4, 4).unwrap();
    r.fill_done(&op);
    r.submit().unwrap();

    let submitted = r.transport().submitted();
    assert_eq!(
        submitted.iter().map(|b| b.mode).collect::<Vec<_>>(),
        vec![Mode::Render, Mode::Blt, Mode::Render]
    );
    let last = &submitted[2];
    assert_eq!(last.commands[0], PIPELINE_SELECT | PIPELINE_SELECT_3D);
    assert_eq!(pointers(&last.commands, STATE_BLEND_STATE_POINTERS).len(), 1);
    assert_eq!(pointers(&last.commands, STATE_BINDING_TABLE_POINTERS_PS).len(), 1);
    assert_eq!(primitives(&last.commands).len(), 1);
    assert_eq!(primitives(&last.commands)[0].1, 3);
}

#[test]
fn flushing_a_component_alpha_operation_restores_the_main_pass() {
    let mut r = render();
    let src = Picture::drawable(pixmap(1, 64, 64, 32), PictFormat::A8r8g8b8);
    let mut mask = Picture::drawable(pixmap(2, 64, 64, 32), PictFormat::A8r8g8b8);
    mask.component_alpha = true;

    let op = r
        .composite(&request(Operator::Over, src, Some(mask), argb_target(3)))
        .unwrap();
    r.composite_boxes(&op, &[BoxRec::new(0, 0, 8, 8)]).unwrap();
    r.flush().unwrap();
    r.composite_boxes(&op, &[BoxRec::new(8, 0, 16, 8)]).unwrap();
    r.composite_done(&op);

    let commands = r.transport().commands();
    let cc = static_offsets().cc_blend;
    let main = (cc + get_blend(Operator::OutReverse, true, PictFormat::A8r8g8b8)) | 1;
    let fixup = (cc + get_blend(Operator::Add, true, PictFormat::A8r8g8b8)) | 1;
    assert_eq!(
        pointers(commands, STATE_BLEND_STATE_POINTERS),
        vec![main, fixup, main, fixup]
    );
    let kernels = pointers(commands, STATE_PS | (8 - 2));
    assert_eq!(kernels.len(), 4);
    assert_ne!(kernels[0], kernels[1]);
    assert_eq!(kernels[0], kernels[2]);
    assert_eq!(kernels[1], kernels[3]);
    assert_eq!(
        primitives(commands)
            .iter()
            .map(|p| (p.1, p.2))
            .collect::<Vec<_>>(),
        vec![(3, 0), (3, 0), (3, 0), (3, 0)]
    );
    assert_eq!(r.stats().ca_passes, 2);
}

#[test]
fn layout_change_on_a_full_arena_finishes_it_first() {
    // 27 floats of fills, one float of padding, then two projective rectangles fill it.
    let config = RenderConfig {
        vertex_capacity: 28 + 2 * 12,
        ..RenderConfig::default()
    };
    let mut r = render_with(MemoryBatchConfig::default(), config);
    let boxes: Vec<_> = (0..3).map(|i| BoxRec::new(i * 4, 0, i * 4 + 4, 4)).collect();
    r.fill_boxes(Operator::Src, PictFormat::A8r8g8b8, RED, &pixmap(1, 64, 64, 32), &boxes)
        .unwrap();

    let mut src = Picture::drawable(pixmap(2, 64, 64, 32), PictFormat::A8r8g8b8);
    src.transform = Some(Transform {
        matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.001, 0.0, 1.0]],
    });
    let op = r
        .composite(&request(Operator::Src, src, None, argb_target(3)))
        .unwrap();
    assert_eq!(op.floats_per_vertex, 4);
    r.composite_boxes(&op, &[BoxRec::new(0, 0, 4, 4), BoxRec::new(4, 0, 8, 4)])
        .unwrap();
    r.composite_done(&op);
    assert_eq!(r.vertices().space(), 0);
    assert_eq!(r.stats().buffer_vertex_uploads, 0);

    r.fill_boxes(
        Operator::Src,
        PictFormat::A8r8g8b8,
        RED,
        &pixmap(1, 64, 64, 32),
        &[BoxRec::new(0, 8, 4, 12)],
    )
    .unwrap();
    assert_eq!(r.stats().buffer_vertex_uploads, 1);
    assert_eq!(r.vertices().used(), 9);
    assert_eq!(r.vertices().floats_per_vertex(), 3);
    assert_eq!(
        primitives(r.transport().commands())
            .iter()
            .map(|p| (p.1, p.2))
            .collect::<Vec<_>>(),
        vec![(9, 0), (6, 7), (3, 0)]
    );
}
