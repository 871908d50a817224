//! Subprocess target adapter.
//!
//! Runs an external solver command once per (genome, instance) pair. The
//! command template substitutes `{instance}`, `{params}` and `{cutoff}`;
//! the reported quality is parsed from stdout. Non-zero exits and missing
//! quality lines are transient failures, handled by the engine's retry
//! budget.

use crate::config::TargetConfig;
use async_trait::async_trait;
use paramrace_core::{Genome, Instance};
use paramrace_engine::{EngineError, Result, TargetAlgorithm, TargetFactory, TargetRun};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

pub struct CommandTargetFactory {
    config: TargetConfig,
}

impl CommandTargetFactory {
    pub fn new(config: TargetConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TargetFactory for CommandTargetFactory {
    async fn create(&self) -> Result<Box<dyn TargetAlgorithm>> {
        Ok(Box::new(CommandTarget {
            config: self.config.clone(),
        }))
    }
}

/// One worker slot's handle on the external command.
pub struct CommandTarget {
    config: TargetConfig,
}

#[async_trait]
impl TargetAlgorithm for CommandTarget {
    async fn run(
        &mut self,
        genome: &Genome,
        instance: &Instance,
        budget: Duration,
    ) -> Result<TargetRun> {
        let command = render_command(&self.config, genome, instance, budget);
        debug!(%command, "launching target");

        let started = Instant::now();
        let output = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| EngineError::TargetRun(format!("failed to launch target: {e}")))?;
        let runtime = started.elapsed();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::TargetRun(format!(
                "target exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let quality = parse_quality(&stdout, &self.config.quality_prefix)?;
        Ok(TargetRun {
            quality,
            runtime: Some(runtime),
        })
    }
}

/// Substitute the per-run placeholders into the command template.
fn render_command(
    config: &TargetConfig,
    genome: &Genome,
    instance: &Instance,
    budget: Duration,
) -> String {
    let params = genome
        .alleles()
        .iter()
        .map(|(name, value)| {
            config
                .param_format
                .replace("{name}", name)
                .replace("{value}", &value.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ");
    config
        .command
        .replace("{instance}", instance.spec())
        .replace("{params}", &params)
        .replace("{cutoff}", &format!("{:.3}", budget.as_secs_f64()))
}

/// Find the first stdout line starting with the quality prefix and parse
/// the remainder as a float.
fn parse_quality(stdout: &str, prefix: &str) -> Result<f64> {
    for line in stdout.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix(prefix) {
            return rest.trim().parse::<f64>().map_err(|_| {
                EngineError::TargetRun(format!("unparseable quality value: {line:?}"))
            });
        }
    }
    Err(EngineError::TargetRun(format!(
        "no line starting with {prefix:?} in target output"
    )))
}
