//! `gen7-render` accelerates 2D composition on the Gen7 3D pipeline.
//!
//! The crate turns composite, copy, fill and video requests into command batches:
//! - A mirror of the pipeline state so only changed state is re-emitted (see [`state`]).
//! - Surface-state and binding-table allocation with per-batch reuse (see [`surface`]).
//! - A vertex staging arena, flushed inline or into its own buffer (see [`vertex`]).
//! - The rendering context driving all of the above (see [`Gen7Render`]).
//!
//! Batches are written through the [`Transport`] trait; [`MemoryBatch`] records them in memory.

mod channel;
mod compile;
mod emit;
mod error;
mod render;

pub mod blend;
pub mod config;
pub mod format;
pub mod hw;
pub mod kernel;
pub mod sampler;
pub mod state;
pub mod statics;
pub mod stats;
pub mod surface;
pub mod transform;
pub mod transport;
pub mod vertex;
pub mod video;

pub use blend::Operator;
pub use channel::{prepare_channel, release_channel, Channel, ChannelFlags, Picture, PictureSource, Pixmap};
pub use compile::{compile_composite, CompositeOp, OpFlags, Target};
pub use config::RenderConfig;
pub use emit::{BoxRec, CompositeRectangles, Point, PrimitiveEmitter};
pub use error::{RenderError, Result};
pub use format::{PictFormat, RenderColor, SurfaceFormat};
pub use kernel::{Kernel, KernelBinaries};
pub use render::{CompositeRequest, CopyOp, FillOp, Gen7Render, GX_CLEAR, GX_COPY};
pub use sampler::{Extend, Filter, PictFilter, Repeat};
pub use stats::RenderStats;
pub use transform::Transform;
pub use transport::{Buffer, BufferId, MemoryBatch, MemoryBatchConfig, Mode, Relocation, SubmittedBatch, Tiling, Transport};
pub use video::{FourCc, VideoFrame};
