//! Check the host for game-backed environments and smoke-test the built-ins
//!
//! Usage: `cargo run --example check_setup [env_id]`
use anyhow::Result;
use gymrig::{
    env::EnvRegistry,
    setup::{setup_instructions, smoke_test_environment, HostRequirements},
};

fn main() -> Result<()> {
    gymrig::telemetry::init();

    let registry = EnvRegistry::with_builtins();

    println!("🔍 Probing built-in environments\n");
    for id in registry.ids() {
        match smoke_test_environment(&registry, id) {
            Ok(report) => print!("{}", report),
            Err(e) => println!("✗ {}: {}", id, e),
        }
        println!();
    }

    let env_id = std::env::args().nth(1).unwrap_or_else(|| "MineRLNavigateDense-v0".to_string());
    println!("🔍 Checking host requirements for '{}'\n", env_id);
    let report = HostRequirements::new(&env_id).check(&registry);
    print!("{}", report);

    if report.all_passed() {
        println!("\n✓ Everything is ready");
    } else {
        println!("\n✗ Some requirements are missing\n");
        println!("{}", setup_instructions());
    }
    Ok(())
}
