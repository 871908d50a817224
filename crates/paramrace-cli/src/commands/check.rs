//! Check command: validate a session file and show what it describes.

use crate::config::SessionConfig;
use crate::Result;
use clap::Args;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Args)]
pub struct CheckArgs {
    /// Session configuration file
    #[arg(short, long)]
    pub config: PathBuf,
}

pub async fn execute(args: CheckArgs) -> Result<()> {
    let session = SessionConfig::load(&args.config)?;
    let base = args.config.parent().unwrap_or_else(|| Path::new("."));
    let space = session.build_space()?;
    let instances = session.load_instances(base)?;

    println!("Session file OK: {}", args.config.display());
    println!();
    println!("Parameters ({}):", space.len());
    for def in space.params() {
        println!("  {:<24} {}", def.name, def.domain);
    }
    println!();
    println!("Instances ({}):", instances.len());
    for instance in &instances {
        println!("  {}", instance.spec());
    }
    println!();
    let engine = &session.tuner.engine;
    println!(
        "Engine: {} coordinator(s) x {} worker(s), tournament cap {}, {:.0}% winners, racing {}",
        engine.coordinator_count,
        engine.worker_count,
        engine.tournament_size,
        engine.winner_percentage * 100.0,
        if engine.racing_enabled { "on" } else { "off" },
    );
    let genetics = &session.tuner.genetics;
    println!(
        "Genetics: population {} ({} competitive), max age {}, {} generation(s)",
        genetics.population_size,
        genetics.competitive_size(),
        genetics.max_age,
        session.tuner.generations,
    );
    println!(
        "Target: {}",
        session.target.command
    );
    Ok(())
}
