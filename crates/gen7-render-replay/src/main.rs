use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use gen7_render_replay::{load_scenario, replay_scenario};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "gen7-render-replay",
    about = "Replay a JSON render scenario against an in-memory batch and report what was emitted."
)]
struct Args {
    /// Scenario JSON path
    scenario: PathBuf,

    /// Write every submitted batch, words and relocations included, as JSON to this path
    #[arg(long, value_name = "PATH")]
    dump_batches: Option<PathBuf>,

    /// Print the report on a single line
    #[arg(long, action = clap::ArgAction::SetTrue)]
    compact: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let scenario = load_scenario(&args.scenario)
        .with_context(|| format!("loading {}", args.scenario.display()))?;
    let replay = replay_scenario(&scenario)
        .with_context(|| format!("replaying {}", args.scenario.display()))?;

    if let Some(path) = &args.dump_batches {
        let json = serde_json::to_vec_pretty(&replay.batches).context("encoding batches")?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    }

    let report = if args.compact {
        serde_json::to_string(&replay.report)
    } else {
        serde_json::to_string_pretty(&replay.report)
    }
    .context("encoding report")?;
    println!("{report}");
    Ok(())
}
