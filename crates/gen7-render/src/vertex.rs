//! Vertex staging arena.
//!
//! Rectangles are staged as three vertices each into a float arena that is later either copied
//! inline into the batch or uploaded into its own buffer. The arena tracks the open primitive
//! whose vertex count is patched when the run closes, and the command words that must receive
//! the final vertex-buffer address.

/// Number of vertex-buffer ids a batch can bind.
pub const VERTEX_BUFFER_SLOTS: usize = 8;

/// Packs a signed 16-bit position pair into the bit pattern of one float slot.
pub fn pack_position(x: i32, y: i32) -> f32 {
    f32::from_bits(((y as i16 as u16 as u32) << 16) | (x as i16 as u16 as u32))
}

pub fn unpack_position(value: f32) -> (i16, i16) {
    let bits = value.to_bits();
    (bits as u16 as i16, (bits >> 16) as u16 as i16)
}

/// A primitive whose vertex count has not been patched yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenPrimitive {
    /// Batch index of the vertex-count word.
    pub count_index: usize,
    /// First vertex of the run.
    pub start: u32,
}

#[derive(Debug, Clone)]
pub struct VertexArena {
    data: Vec<f32>,
    used: usize,
    index: u32,
    start: u32,
    floats_per_vertex: usize,
    open: Option<OpenPrimitive>,
    relocs: [Option<usize>; VERTEX_BUFFER_SLOTS],
}

impl VertexArena {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity],
            used: 0,
            index: 0,
            start: 0,
            floats_per_vertex: 0,
            open: None,
            relocs: [None; VERTEX_BUFFER_SLOTS],
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Floats still free.
    pub fn space(&self) -> usize {
        self.data.len().saturating_sub(self.used)
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Next vertex index to be handed out.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn floats_per_vertex(&self) -> usize {
        self.floats_per_vertex
    }

    pub fn data(&self) -> &[f32] {
        &self.data[..self.used]
    }

    /// Switches to a new vertex layout, rounding the write cursor up to a whole vertex.
    pub fn align(&mut self, floats_per_vertex: usize) {
        if floats_per_vertex == self.floats_per_vertex {
            return;
        }
        if floats_per_vertex > 0 {
            let index = self.used.div_ceil(floats_per_vertex);
            self.index = index as u32;
            self.used = index * floats_per_vertex;
        }
        self.floats_per_vertex = floats_per_vertex;
    }

    /// Claims `count` vertex indices for rectangles about to be written.
    pub fn claim(&mut self, count: u32) {
        self.index += count;
    }

    pub fn push(&mut self, value: f32) {
        self.data[self.used] = value;
        self.used += 1;
    }

    pub fn push_position(&mut self, x: i32, y: i32) {
        self.push(pack_position(x, y));
    }

    pub fn open(&self) -> Option<OpenPrimitive> {
        self.open
    }

    /// Marks a new primitive starting at the current vertex.
    pub fn begin(&mut self, count_index: usize) {
        self.start = self.index;
        self.open = Some(OpenPrimitive {
            count_index,
            start: self.start,
        });
    }

    /// Reopens the previous primitive; its start vertex is kept.
    pub fn reopen(&mut self, count_index: usize) {
        self.open = Some(OpenPrimitive {
            count_index,
            start: self.start,
        });
    }

    /// Closes the open primitive, returning it with its final vertex count.
    pub fn close(&mut self) -> Option<(OpenPrimitive, u32)> {
        let open = self.open.take()?;
        Some((open, self.index - open.start))
    }

    /// Records the batch index of the address word for vertex-buffer `id`.
    pub fn set_reloc(&mut self, id: u32, index: usize) {
        self.relocs[id as usize] = Some(index);
    }

    /// Drains the recorded address words.
    pub fn take_relocs(&mut self) -> impl Iterator<Item = usize> {
        std::mem::replace(&mut self.relocs, [None; VERTEX_BUFFER_SLOTS])
            .into_iter()
            .flatten()
    }

    /// Empties the arena after its contents were handed to the batch.
    pub fn reset(&mut self) {
        self.used = 0;
        self.index = 0;
    }
}
