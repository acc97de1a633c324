//! Surface-state records and binding tables, allocated from the end of the batch.

use std::collections::HashMap;

use tracing::trace;

use crate::format::SurfaceFormat;
use crate::hw::{
    BINDING_TABLE_WORDS, DOMAIN_RENDER, DOMAIN_SAMPLER, SURFACE_2D, SURFACE_FORMAT_SHIFT,
    SURFACE_HEIGHT_SHIFT, SURFACE_PITCH_SHIFT, SURFACE_STATE_WORDS, SURFACE_TILED,
    SURFACE_TILED_Y, SURFACE_TYPE_SHIFT, SURFACE_WIDTH_SHIFT,
};
use crate::state::PipelineStateCache;
use crate::transport::{Buffer, BufferId, Tiling, Transport};

fn tiling_bits(tiling: Tiling) -> u32 {
    match tiling {
        Tiling::None => 0,
        Tiling::X => SURFACE_TILED,
        Tiling::Y => SURFACE_TILED | SURFACE_TILED_Y,
    }
}

/// Layout of one surface as seen through a binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceDesc {
    pub width: u32,
    pub height: u32,
    pub format: SurfaceFormat,
    /// Byte offset of the surface within its buffer.
    pub offset: u32,
    pub pitch: u32,
}

#[derive(Clone, Copy, Debug, Default)]
struct Bound {
    /// Byte offset of the render-target-format record.
    dst: Option<u32>,
    /// Byte offset of the sampler-only record.
    src: Option<u32>,
}

/// Allocates surface-state records, reusing one per buffer and role within a batch.
#[derive(Debug, Default)]
pub struct SurfaceAllocator {
    bound: HashMap<BufferId, Bound>,
}

impl SurfaceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets all records; they die with the batch.
    pub fn reset(&mut self) {
        self.bound.clear();
    }

    /// Binds `buffer` as a render target (`is_dst`) or a sampled texture.
    ///
    /// Returns the byte offset of the surface-state record within the batch.
    pub fn bind<T: Transport>(
        &mut self,
        t: &mut T,
        buffer: &Buffer,
        width: u32,
        height: u32,
        format: SurfaceFormat,
        is_dst: bool,
    ) -> u32 {
        let domains;
        let memo_as_dst;
        if is_dst {
            domains = (DOMAIN_RENDER << 16) | DOMAIN_RENDER;
            memo_as_dst = true;
            t.mark_dirty(buffer.id);
        } else {
            domains = DOMAIN_SAMPLER << 16;
            memo_as_dst = format.is_render_target();
        }

        let bound = self.bound.entry(buffer.id).or_default();
        let memo = if memo_as_dst {
            &mut bound.dst
        } else {
            &mut bound.src
        };
        if let Some(offset) = *memo {
            return offset;
        }

        let desc = SurfaceDesc {
            width,
            height,
            format,
            offset: 0,
            pitch: buffer.pitch,
        };
        let offset = write_surface(t, buffer, &desc, domains);
        *memo = Some(offset);
        offset
    }

    /// Binds a sub-surface (one video plane) without memoizing it.
    pub fn bind_plane<T: Transport>(&mut self, t: &mut T, buffer: &Buffer, desc: &SurfaceDesc) -> u32 {
        write_surface(t, buffer, desc, DOMAIN_SAMPLER << 16)
    }
}

fn write_surface<T: Transport>(t: &mut T, buffer: &Buffer, desc: &SurfaceDesc, domains: u32) -> u32 {
    let index = t.alloc_surface(SURFACE_STATE_WORDS);
    let address = t.add_relocation(index + 1, Some(buffer.id), domains, desc.offset);
    let ss = [
        (SURFACE_2D << SURFACE_TYPE_SHIFT)
            | tiling_bits(buffer.tiling)
            | (desc.format.bits() << SURFACE_FORMAT_SHIFT),
        address,
        ((desc.width - 1) << SURFACE_WIDTH_SHIFT) | ((desc.height - 1) << SURFACE_HEIGHT_SHIFT),
        (desc.pitch - 1) << SURFACE_PITCH_SHIFT,
        0,
        0,
        0,
        0,
    ];
    t.write_words(index, &ss);

    let offset = (index * 4) as u32;
    trace!(
        offset,
        buffer = buffer.id.0,
        format = ?desc.format,
        width = desc.width,
        height = desc.height,
        pitch = desc.pitch,
        render = domains & 0xffff != 0,
        "bind surface"
    );
    offset
}

/// Claims a zeroed binding table, returning its word index.
pub fn alloc_binding_table<T: Transport>(t: &mut T) -> usize {
    t.alloc_surface(BINDING_TABLE_WORDS)
}

/// Fills the binding table at `table` and deduplicates it against the one currently bound.
///
/// When no surface record was allocated after the table and its entries match the bound
/// table, the new table is handed back and the bound one is reused. Returns the word index of
/// the table to program.
pub fn finish_binding_table<T: Transport>(
    t: &mut T,
    cache: &PipelineStateCache,
    table: usize,
    entries: &[u32],
) -> usize {
    debug_assert!(entries.len() <= BINDING_TABLE_WORDS);
    t.write_words(table, entries);

    if t.surface_offset() != table {
        return table;
    }
    let Some(previous) = cache.surface_table() else {
        return table;
    };
    let same = entries
        .iter()
        .enumerate()
        .all(|(i, &entry)| t.word(previous + i) == entry);
    if !same {
        return table;
    }

    t.release_surface(BINDING_TABLE_WORDS);
    trace!(table = previous, "binding table reused");
    previous
}
