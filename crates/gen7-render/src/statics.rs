//! The static state buffer: kernels, sampler pairs, blend table and viewport, built once per
//! renderer and referenced by offset from every batch.

use std::fmt;

use bytemuck::Pod;
use tracing::debug;

use crate::blend::build_blend_table;
use crate::error::{RenderError, Result};
use crate::hw::{BlendState, CcViewport, SamplerState};
use crate::kernel::{Kernel, KernelBinaries, KERNEL_COUNT};
use crate::sampler::build_sampler_table;
use crate::transport::{BufferId, Transport};

/// Round `value` up to the nearest multiple of `alignment`.
pub(crate) fn align_up(value: u32, alignment: u32) -> u32 {
    debug_assert!(alignment > 0);
    value.div_ceil(alignment) * alignment
}

/// Append-only byte stream with aligned sub-allocation.
#[derive(Clone, Default)]
pub struct StaticStream {
    data: Vec<u8>,
}

impl StaticStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` at the next `alignment` boundary and returns their offset.
    pub fn add(&mut self, bytes: &[u8], alignment: u32) -> u32 {
        let offset = align_up(self.data.len() as u32, alignment.max(1));
        self.data.resize(offset as usize, 0);
        self.data.extend_from_slice(bytes);
        offset
    }

    pub fn add_records<T: Pod>(&mut self, records: &[T], alignment: u32) -> u32 {
        self.add(bytemuck::cast_slice(records), alignment)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for StaticStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticStream")
            .field("len", &self.data.len())
            .finish()
    }
}

/// Offsets of each static table within the uploaded stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StaticOffsets {
    pub kernels: [u32; KERNEL_COUNT],
    pub samplers: u32,
    pub cc_blend: u32,
    pub cc_viewport: u32,
}

impl StaticOffsets {
    pub fn kernel(&self, kernel: Kernel) -> u32 {
        self.kernels[kernel.index()]
    }
}

#[derive(Clone, Debug)]
pub struct StaticResources {
    stream: StaticStream,
    offsets: StaticOffsets,
}

impl StaticResources {
    pub fn build(binaries: &KernelBinaries) -> Self {
        let mut stream = StaticStream::new();
        let mut kernels = [0u32; KERNEL_COUNT];
        for kernel in Kernel::ALL {
            kernels[kernel.index()] = stream.add_records(binaries.get(kernel), 64);
        }
        let samplers = stream.add_records(&build_sampler_table(), 32);
        let cc_blend = stream.add_records(&build_blend_table(), BlendState::SIZE_BYTES);
        let viewport = CcViewport {
            min_depth: -1.0e35,
            max_depth: 1.0e35,
        };
        let cc_viewport = stream.add_records(std::slice::from_ref(&viewport), 32);
        debug_assert_eq!(samplers % SamplerState::SIZE_BYTES, 0);

        Self {
            stream,
            offsets: StaticOffsets {
                kernels,
                samplers,
                cc_blend,
                cc_viewport,
            },
        }
    }

    pub fn offsets(&self) -> &StaticOffsets {
        &self.offsets
    }

    pub fn stream(&self) -> &StaticStream {
        &self.stream
    }

    /// Uploads the stream into a new linear buffer.
    pub fn upload<T: Transport>(&self, transport: &mut T) -> Result<BufferId> {
        let bytes = self.stream.len();
        let buffer = transport
            .create_linear_buffer(bytes)
            .ok_or(RenderError::StaticUpload { bytes })?;
        if !transport.write(buffer, self.stream.as_bytes()) {
            transport.destroy(buffer);
            return Err(RenderError::StaticUpload { bytes });
        }
        debug!(bytes, ?buffer, "static state uploaded");
        Ok(buffer)
    }
}
