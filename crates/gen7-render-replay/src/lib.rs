//! Replays JSON render scenarios against the in-memory batch transport.
//!
//! A scenario names the renderer configuration, the batch geometry and a list of steps. Each
//! step calls one entry point of [`Gen7Render`]; declined requests are recorded in the report
//! and replay continues, while resource failures abort it.

use std::fs;
use std::path::{Path, PathBuf};

use gen7_render::{
    BoxRec, CompositeRectangles, CompositeRequest, Gen7Render, KernelBinaries, MemoryBatch,
    MemoryBatchConfig, Mode, Operator, PictFormat, Pixmap, RenderColor, RenderConfig, RenderError,
    RenderStats, SubmittedBatch, Transport, VideoFrame,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read scenario {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed scenario")]
    Parse(#[from] serde_json::Error),

    #[error("step {step} failed")]
    Render {
        step: usize,
        #[source]
        source: RenderError,
    },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub config: RenderConfig,
    #[serde(default)]
    pub batch: MemoryBatchConfig,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_json(text: &str) -> Result<Self, ReplayError> {
        Ok(serde_json::from_str(text)?)
    }
}

pub fn load_scenario(path: &Path) -> Result<Scenario, ReplayError> {
    let text = fs::read_to_string(path).map_err(|source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Scenario::from_json(&text)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// A composite drawn as explicit rectangles and/or boxes.
    Composite {
        request: CompositeRequest,
        #[serde(default)]
        rects: Vec<CompositeRectangles>,
        #[serde(default)]
        boxes: Vec<BoxRec>,
    },
    CopyBoxes {
        alu: u8,
        src: Pixmap,
        #[serde(default)]
        src_dx: i16,
        #[serde(default)]
        src_dy: i16,
        dst: Pixmap,
        #[serde(default)]
        dst_dx: i16,
        #[serde(default)]
        dst_dy: i16,
        boxes: Vec<BoxRec>,
    },
    FillBoxes {
        op: Operator,
        format: PictFormat,
        color: RenderColor,
        dst: Pixmap,
        boxes: Vec<BoxRec>,
    },
    /// A solid fill in the drawable's pixel format, drawn box by box.
    Fill {
        alu: u8,
        dst: Pixmap,
        color: u32,
        boxes: Vec<BoxRec>,
    },
    Video {
        frame: VideoFrame,
        region: Vec<BoxRec>,
        src_w: u16,
        src_h: u16,
        drw_w: u16,
        drw_h: u16,
        dst: Pixmap,
    },
    /// Queues work for the blitter, forcing a context switch on the next render step.
    Blt { words: usize },
    Flush,
    Submit,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Rendered,
    Declined { reason: String },
}

/// Shape of one submitted batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub mode: Mode,
    pub command_words: usize,
    pub surface_words: usize,
    pub relocations: usize,
    pub buffers: usize,
}

impl From<&SubmittedBatch> for BatchSummary {
    fn from(batch: &SubmittedBatch) -> Self {
        Self {
            mode: batch.mode,
            command_words: batch.commands.len(),
            surface_words: batch.surfaces.len(),
            relocations: batch.relocations.len(),
            buffers: batch.buffers.len(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Report {
    pub steps: Vec<StepOutcome>,
    pub batches: Vec<BatchSummary>,
    pub stats: RenderStats,
}

pub struct Replay {
    pub report: Report,
    /// Every batch submitted during the replay, including the final one.
    pub batches: Vec<SubmittedBatch>,
}

/// Runs every step of `scenario` and submits whatever is left at the end.
pub fn replay_scenario(scenario: &Scenario) -> Result<Replay, ReplayError> {
    let transport = MemoryBatch::new(scenario.batch);
    let mut render = Gen7Render::new(transport, scenario.config, &KernelBinaries::placeholder())
        .map_err(|source| ReplayError::Render { step: 0, source })?;

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let outcome = match run_step(&mut render, step) {
            Ok(()) => StepOutcome::Rendered,
            Err(err) if err.is_fallback() => {
                debug!(step = index, %err, "declined");
                StepOutcome::Declined {
                    reason: err.to_string(),
                }
            }
            Err(source) => return Err(ReplayError::Render { step: index, source }),
        };
        steps.push(outcome);
    }
    render.submit().map_err(|source| ReplayError::Render {
        step: scenario.steps.len(),
        source,
    })?;

    let stats = render.stats();
    let batches = render.into_inner().take_submitted();
    info!(
        steps = steps.len(),
        batches = batches.len(),
        primitives = stats.primitives,
        vertex_uploads = stats.vertex_uploads(),
        "replay finished"
    );
    Ok(Replay {
        report: Report {
            steps,
            batches: batches.iter().map(BatchSummary::from).collect(),
            stats,
        },
        batches,
    })
}

fn run_step(render: &mut Gen7Render<MemoryBatch>, step: &Step) -> gen7_render::Result<()> {
    match step {
        Step::Composite {
            request,
            rects,
            boxes,
        } => {
            let op = render.composite(request)?;
            let drawn = rects
                .iter()
                .try_for_each(|r| render.composite_blt(&op, r))
                .and_then(|()| render.composite_boxes(&op, boxes));
            render.composite_done(&op);
            drawn
        }
        Step::CopyBoxes {
            alu,
            src,
            src_dx,
            src_dy,
            dst,
            dst_dx,
            dst_dy,
            boxes,
        } => render.copy_boxes(*alu, src, *src_dx, *src_dy, dst, *dst_dx, *dst_dy, boxes),
        Step::FillBoxes {
            op,
            format,
            color,
            dst,
            boxes,
        } => render.fill_boxes(*op, *format, *color, dst, boxes),
        Step::Fill {
            alu,
            dst,
            color,
            boxes,
        } => {
            let op = render.fill(*alu, dst, *color)?;
            let drawn = boxes.iter().try_for_each(|b| {
                render.fill_blt(
                    &op,
                    b.x1 as i16,
                    b.y1 as i16,
                    b.width() as i16,
                    b.height() as i16,
                )
            });
            render.fill_done(&op);
            drawn
        }
        Step::Video {
            frame,
            region,
            src_w,
            src_h,
            drw_w,
            drw_h,
            dst,
        } => render.video(frame, region, *src_w, *src_h, *drw_w, *drw_h, dst),
        Step::Blt { words } => {
            render.context_switch(Mode::Blt)?;
            let t = render.transport_mut();
            for _ in 0..*words {
                t.append(0);
            }
            Ok(())
        }
        Step::Flush => render.flush(),
        Step::Submit => render.submit(),
    }
}
