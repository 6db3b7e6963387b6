//! Watch or record a policy playing a rendered task
//!
//! Usage:
//! - `cargo run --example visual_agent -- watch`: draw every step on the console
//! - `cargo run --example visual_agent -- record [out.gif]`: save an episode
//!   as an animated GIF plus a PNG of the last frame
//! - `cargo run --example visual_agent -- record out.gif saved_name`: record a
//!   policy restored from `models/saved_name.json`
use std::path::PathBuf;

use anyhow::{bail, Result};
use gymrig::prelude::*;

const TRAIN_STEPS: usize = 20_000;
const FPS: u32 = 30;

fn main() -> Result<()> {
    gymrig::telemetry::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("record") => {
            let output = args.get(1).map(PathBuf::from).unwrap_or_else(|| "agent_gameplay.gif".into());
            record(output, args.get(2).map(String::as_str))
        }
        Some("watch") => watch(),
        Some(other) => bail!("unknown mode '{other}' (expected 'watch' or 'record')"),
    }
}

fn grid_walk_agent(render_mode: RenderMode, restore: Option<&str>) -> Result<Agent> {
    let mut agent = Agent::builder().env_id("grid-walk-task").seed(7).build()?;
    agent.create_environment(1, render_mode)?;

    match restore {
        Some(name) => {
            agent.restore(name)?;
            println!("✓ Restored policy '{}'", name);
        }
        None => {
            let config = PolicyConfig::new().n_steps(500).batch_size(100).n_epochs(4).seed(7);
            agent.create_policy(PolicyKind::ImageGrid, 1e-2, config)?;
            println!("🏋️  Training for {} steps...", TRAIN_STEPS);
            let summary = agent.train(TRAIN_STEPS)?;
            println!("✓ {}", summary);
        }
    }
    Ok(agent)
}

fn watch() -> Result<()> {
    let mut agent = grid_walk_agent(RenderMode::Human, None)?;
    let returns = agent.evaluate(1)?;
    agent.close();
    println!("\n✓ Episode finished, total reward {:.2}", returns[0]);
    Ok(())
}

fn record(output: PathBuf, restore: Option<&str>) -> Result<()> {
    let mut agent = grid_walk_agent(RenderMode::RgbArray, restore)?;

    println!("🎥 Capturing one episode...");
    let mut frames = FrameBuffer::with_capacity_limit(agent.config().max_episode_steps);
    let returns = agent.evaluate_rendered(1, |frame| frames.append(frame))?;
    agent.close();

    if let Some(last) = frames.frames().last() {
        let snapshot = output.with_extension("png");
        last.save(&snapshot)?;
        println!("🖼️  Last frame saved to {}", snapshot.display());
    }

    let written = frames.flush(&output, FPS)?;
    println!("✓ {} frames at {} fps written to {} (total reward {:.2})", written, FPS, output.display(), returns[0]);
    Ok(())
}
