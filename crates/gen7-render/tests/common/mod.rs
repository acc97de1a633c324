//! Shared helpers for `gen7-render` integration tests.
#![allow(dead_code)]

use gen7_render::hw::{PRIMITIVE, PRIMITIVE_RECTLIST, PRIMITIVE_VERTEX_SEQUENTIAL, PRIMITIVE_WORDS};
use gen7_render::statics::{StaticOffsets, StaticResources};
use gen7_render::{
    Buffer, BufferId, CompositeRequest, Gen7Render, KernelBinaries, MemoryBatch,
    MemoryBatchConfig, Operator, PictFormat, Picture, Pixmap, RenderConfig, Tiling,
};

pub fn render() -> Gen7Render<MemoryBatch> {
    render_with(MemoryBatchConfig::default(), RenderConfig::default())
}

pub fn render_with(batch: MemoryBatchConfig, config: RenderConfig) -> Gen7Render<MemoryBatch> {
    Gen7Render::new(
        MemoryBatch::new(batch),
        config,
        &KernelBinaries::placeholder(),
    )
    .expect("static state upload")
}

/// Offsets the static tables land at for the placeholder kernels.
pub fn static_offsets() -> StaticOffsets {
    *StaticResources::build(&KernelBinaries::placeholder()).offsets()
}

pub fn pixmap(id: u32, width: u32, height: u32, depth: u8) -> Pixmap {
    Pixmap {
        buffer: Buffer {
            id: BufferId(id),
            pitch: width * 4,
            tiling: Tiling::X,
        },
        width,
        height,
        depth,
    }
}

pub fn request(op: Operator, src: Picture, mask: Option<Picture>, dst: Picture) -> CompositeRequest {
    CompositeRequest {
        op,
        src,
        mask,
        dst,
        src_x: 0,
        src_y: 0,
        mask_x: 0,
        mask_y: 0,
        dst_x: 0,
        dst_y: 0,
        width: 64,
        height: 64,
    }
}

pub fn argb_target(id: u32) -> Picture {
    Picture::drawable(pixmap(id, 64, 64, 32), PictFormat::A8r8g8b8)
}

/// `(index, vertex count, start vertex)` of every rectangle-list primitive in `words`.
pub fn primitives(words: &[u32]) -> Vec<(usize, u32, u32)> {
    words
        .windows(PRIMITIVE_WORDS)
        .enumerate()
        .filter(|(_, w)| {
            w[0] == PRIMITIVE | (PRIMITIVE_WORDS as u32 - 2)
                && w[1] == PRIMITIVE_VERTEX_SEQUENTIAL | PRIMITIVE_RECTLIST
        })
        .map(|(i, w)| (i, w[2], w[3]))
        .collect()
}

/// Payload words of every occurrence of the two-word command `header`.
pub fn pointers(words: &[u32], header: u32) -> Vec<u32> {
    words
        .windows(2)
        .filter(|w| w[0] == header)
        .map(|w| w[1])
        .collect()
}

pub fn count(words: &[u32], word: u32) -> usize {
    words.iter().filter(|&&w| w == word).count()
}
