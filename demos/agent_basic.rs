//! Train a policy on the toy balance task, evaluate it and save it
//!
//! Usage: `cargo run --release --example agent_basic [total_steps]`
use anyhow::Result;
use gymrig::prelude::*;

fn main() -> Result<()> {
    gymrig::telemetry::init();

    let total_steps: usize = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 50_000,
    };

    println!("🚀 Training on toy-balance-task for {} steps\n", total_steps);

    let mut agent = Agent::builder().env_id("toy-balance-task").seed(42).build()?;
    let config = PolicyConfig::new().n_steps(2048).batch_size(64).n_epochs(10).seed(42);
    agent.create_policy(PolicyKind::Flat, 3e-4, config)?;
    println!("✓ Policy created ({})", agent.state());

    let summary = agent.train(total_steps)?;
    println!("✓ Training finished: {}", summary);

    println!("\n📊 Evaluating 5 episodes...");
    for (episode, total) in agent.evaluate(5)?.iter().enumerate() {
        println!("  Episode {}: total reward = {:.1}", episode + 1, total);
    }

    let path = agent.save_model()?;
    println!("\n💾 Saved policy to {}", path.display());

    agent.close();
    Ok(())
}
