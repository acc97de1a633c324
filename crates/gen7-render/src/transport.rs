//! The command-stream transport the renderer writes into.
//!
//! A batch is a fixed array of 32-bit words. Commands grow from the front and indirect surface
//! state grows down from the end; the batch is full when the two regions meet. Buffer
//! addresses are never written directly: every address is recorded as a relocation against a
//! target buffer and patched at submission time.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::hw::SURFACE_STATE_WORDS;

/// Opaque handle naming a GPU buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BufferId(pub u32);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tiling {
    #[default]
    None,
    X,
    Y,
}

/// A buffer together with the layout information needed to bind it as a surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Buffer {
    pub id: BufferId,
    /// Row pitch in bytes.
    pub pitch: u32,
    #[serde(default)]
    pub tiling: Tiling,
}

/// Engine a batch is destined for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    None,
    Render,
    Blt,
}

/// Interface to the batch-buffer manager.
pub trait Transport {
    fn mode(&self) -> Mode;
    fn set_mode(&mut self, mode: Mode);

    /// Number of command words appended so far.
    fn used(&self) -> usize;
    /// Word index where the surface-state region currently begins.
    fn surface_offset(&self) -> usize;

    fn word(&self, index: usize) -> u32;
    /// Appends a command word, returning its index.
    fn append(&mut self, word: u32) -> usize;
    fn patch(&mut self, index: usize, word: u32);
    /// Writes consecutive words starting at `index` (command or surface region).
    fn write_words(&mut self, index: usize, words: &[u32]);

    /// Whether `words` command words and `surfaces` surface-state records still fit.
    fn reserve(&self, words: usize, surfaces: usize) -> bool;
    /// Whether another relocation and exec-list entry can be recorded.
    fn relocation_room(&self) -> bool;
    /// Whether `buffer` can be referenced by the current batch.
    fn check_buffer(&self, buffer: BufferId) -> bool;

    /// Claims `words` zeroed words from the end of the surface region, returning their index.
    fn alloc_surface(&mut self, words: usize) -> usize;
    /// Returns the most recently claimed `words` to the surface region.
    fn release_surface(&mut self, words: usize);

    /// Records that word `index` holds the address of `target` plus `delta`.
    ///
    /// `target` of `None` names the batch itself. Returns the presumed address to write.
    fn add_relocation(
        &mut self,
        index: usize,
        target: Option<BufferId>,
        domains: u32,
        delta: u32,
    ) -> u32;

    fn create_linear_buffer(&mut self, size_bytes: usize) -> Option<BufferId>;
    fn write(&mut self, buffer: BufferId, data: &[u8]) -> bool;
    /// Drops a reference to `buffer`.
    fn destroy(&mut self, buffer: BufferId);

    /// Hands the batch to the hardware and starts a fresh one.
    fn submit(&mut self);

    fn mark_dirty(&mut self, buffer: BufferId);
    /// Whether `buffer` has been rendered to since the last submission.
    fn is_dirty(&self, buffer: BufferId) -> bool;

    /// A referenced 1x1 buffer holding `color` as a8r8g8b8.
    fn solid(&mut self, color: u32) -> Option<Buffer>;

    fn last_word(&self) -> Option<u32> {
        match self.used() {
            0 => None,
            n => Some(self.word(n - 1)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryBatchConfig {
    /// Batch size in words.
    pub batch_words: usize,
    pub max_relocations: usize,
    pub max_exec: usize,
}

impl Default for MemoryBatchConfig {
    fn default() -> Self {
        Self {
            batch_words: 4096,
            max_relocations: 4096,
            max_exec: 384,
        }
    }
}

/// Words kept free at the end of the command region for the batch terminator.
const BATCH_RESERVED: usize = 2;
const MI_BATCH_BUFFER_END: u32 = 0x0A << 23;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Relocation {
    pub index: usize,
    pub target: Option<BufferId>,
    pub domains: u32,
    pub delta: u32,
}

/// A batch captured by [`MemoryBatch::submit`].
#[derive(Clone, Debug, Serialize)]
pub struct SubmittedBatch {
    pub mode: Mode,
    /// Command words, including the terminator.
    pub commands: Vec<u32>,
    /// Index of the first surface-state word in the full batch.
    pub surface_offset: usize,
    pub surfaces: Vec<u32>,
    pub relocations: Vec<Relocation>,
    /// Contents of the transport-owned buffers referenced by the batch.
    pub buffers: BTreeMap<BufferId, Vec<u8>>,
}

impl SubmittedBatch {
    /// Reads a word of the full batch image by index.
    pub fn word(&self, index: usize) -> Option<u32> {
        if index < self.commands.len() {
            Some(self.commands[index])
        } else if index >= self.surface_offset {
            self.surfaces.get(index - self.surface_offset).copied()
        } else {
            None
        }
    }
}

#[derive(Debug)]
struct OwnedBuffer {
    refs: u32,
    data: Vec<u8>,
}

/// In-memory [`Transport`] that records batches instead of executing them.
#[derive(Debug)]
pub struct MemoryBatch {
    config: MemoryBatchConfig,
    mode: Mode,
    words: Vec<u32>,
    nbatch: usize,
    surface: usize,
    relocations: Vec<Relocation>,
    exec: HashSet<BufferId>,
    dirty: HashSet<BufferId>,
    buffers: HashMap<BufferId, OwnedBuffer>,
    solids: HashMap<u32, BufferId>,
    next_id: u32,
    submitted: Vec<SubmittedBatch>,
}

/// Ids below this are left for caller-owned buffers such as pixmaps.
const FIRST_OWNED_ID: u32 = 0x1000_0000;

impl MemoryBatch {
    pub fn new(config: MemoryBatchConfig) -> Self {
        Self {
            config,
            mode: Mode::None,
            words: vec![0; config.batch_words],
            nbatch: 0,
            surface: config.batch_words,
            relocations: Vec::new(),
            exec: HashSet::new(),
            dirty: HashSet::new(),
            buffers: HashMap::new(),
            solids: HashMap::new(),
            next_id: FIRST_OWNED_ID,
            submitted: Vec::new(),
        }
    }

    pub fn config(&self) -> &MemoryBatchConfig {
        &self.config
    }

    /// Command words of the batch under construction.
    pub fn commands(&self) -> &[u32] {
        &self.words[..self.nbatch]
    }

    pub fn relocations(&self) -> &[Relocation] {
        &self.relocations
    }

    pub fn submitted(&self) -> &[SubmittedBatch] {
        &self.submitted
    }

    pub fn take_submitted(&mut self) -> Vec<SubmittedBatch> {
        std::mem::take(&mut self.submitted)
    }

    /// Contents of a transport-owned buffer.
    pub fn buffer_data(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|b| b.data.as_slice())
    }

    /// Outstanding references held on a transport-owned buffer.
    pub fn buffer_refs(&self, buffer: BufferId) -> u32 {
        self.buffers.get(&buffer).map_or(0, |b| b.refs)
    }

    fn alloc_id(&mut self) -> BufferId {
        let id = BufferId(self.next_id);
        self.next_id += 1;
        id
    }

    fn release_unreferenced(&mut self) {
        let exec = &self.exec;
        let solids = &mut self.solids;
        self.buffers.retain(|id, buffer| {
            let keep = buffer.refs > 0 || exec.contains(id);
            if !keep {
                solids.retain(|_, solid| solid != id);
            }
            keep
        });
    }
}

impl Default for MemoryBatch {
    fn default() -> Self {
        Self::new(MemoryBatchConfig::default())
    }
}

impl Transport for MemoryBatch {
    fn mode(&self) -> Mode {
        self.mode
    }

    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    fn used(&self) -> usize {
        self.nbatch
    }

    fn surface_offset(&self) -> usize {
        self.surface
    }

    fn word(&self, index: usize) -> u32 {
        self.words[index]
    }

    fn append(&mut self, word: u32) -> usize {
        assert!(self.nbatch < self.surface, "batch overflow");
        let index = self.nbatch;
        self.words[index] = word;
        self.nbatch += 1;
        index
    }

    fn patch(&mut self, index: usize, word: u32) {
        self.words[index] = word;
    }

    fn write_words(&mut self, index: usize, words: &[u32]) {
        self.words[index..index + words.len()].copy_from_slice(words);
    }

    fn reserve(&self, words: usize, surfaces: usize) -> bool {
        self.nbatch + words + surfaces * SURFACE_STATE_WORDS + BATCH_RESERVED <= self.surface
    }

    fn relocation_room(&self) -> bool {
        self.relocations.len() + 1 < self.config.max_relocations
            && self.exec.len() + 1 < self.config.max_exec
    }

    fn check_buffer(&self, buffer: BufferId) -> bool {
        self.exec.contains(&buffer) || self.exec.len() + 1 < self.config.max_exec
    }

    fn alloc_surface(&mut self, words: usize) -> usize {
        assert!(self.surface - words >= self.nbatch, "surface region overflow");
        self.surface -= words;
        self.words[self.surface..self.surface + words].fill(0);
        self.surface
    }

    fn release_surface(&mut self, words: usize) {
        self.surface += words;
    }

    fn add_relocation(
        &mut self,
        index: usize,
        target: Option<BufferId>,
        domains: u32,
        delta: u32,
    ) -> u32 {
        trace!(index, ?target, domains, delta, "relocation");
        self.relocations.push(Relocation {
            index,
            target,
            domains,
            delta,
        });
        if let Some(target) = target {
            self.exec.insert(target);
        }
        delta
    }

    fn create_linear_buffer(&mut self, size_bytes: usize) -> Option<BufferId> {
        let id = self.alloc_id();
        self.buffers.insert(
            id,
            OwnedBuffer {
                refs: 1,
                data: vec![0; size_bytes],
            },
        );
        Some(id)
    }

    fn write(&mut self, buffer: BufferId, data: &[u8]) -> bool {
        match self.buffers.get_mut(&buffer) {
            Some(owned) if data.len() <= owned.data.len() => {
                owned.data[..data.len()].copy_from_slice(data);
                true
            }
            _ => false,
        }
    }

    fn destroy(&mut self, buffer: BufferId) {
        if let Some(owned) = self.buffers.get_mut(&buffer) {
            owned.refs = owned.refs.saturating_sub(1);
        }
        self.release_unreferenced();
    }

    fn submit(&mut self) {
        if self.nbatch == 0 {
            return;
        }
        let mut commands = self.words[..self.nbatch].to_vec();
        commands.push(MI_BATCH_BUFFER_END);
        let surfaces = self.words[self.surface..].to_vec();
        let buffers = self
            .exec
            .iter()
            .filter_map(|id| self.buffers.get(id).map(|b| (*id, b.data.clone())))
            .collect();

        debug!(
            words = commands.len(),
            surface_words = surfaces.len(),
            relocations = self.relocations.len(),
            "batch submitted"
        );
        self.submitted.push(SubmittedBatch {
            mode: self.mode,
            commands,
            surface_offset: self.surface,
            surfaces,
            relocations: std::mem::take(&mut self.relocations),
            buffers,
        });

        self.words.fill(0);
        self.nbatch = 0;
        self.surface = self.config.batch_words;
        self.exec.clear();
        self.dirty.clear();
        self.mode = Mode::None;
        self.release_unreferenced();
    }

    fn mark_dirty(&mut self, buffer: BufferId) {
        self.dirty.insert(buffer);
    }

    fn is_dirty(&self, buffer: BufferId) -> bool {
        self.dirty.contains(&buffer)
    }

    fn solid(&mut self, color: u32) -> Option<Buffer> {
        let id = match self.solids.get(&color) {
            Some(&id) => {
                if let Some(owned) = self.buffers.get_mut(&id) {
                    owned.refs += 1;
                }
                id
            }
            None => {
                let id = self.create_linear_buffer(4)?;
                self.write(id, &color.to_le_bytes());
                self.solids.insert(color, id);
                id
            }
        };
        Some(Buffer {
            id,
            pitch: 4,
            tiling: Tiling::None,
        })
    }
}
