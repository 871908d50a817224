//! Session configuration loaded from a TOML file.
//!
//! One file describes a whole tuning session: the tuner knobs, the target
//! command line, the parameter space, the instance inventory and the
//! optional status snapshot path.

use crate::{CliError, Result};
use paramrace_core::{Instance, InstanceId, ParamDef, ParamSpace, TunerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level session file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub tuner: TunerConfig,
    pub target: TargetConfig,
    #[serde(rename = "parameter")]
    pub parameters: Vec<ParamDef>,
    pub instances: InstancesConfig,
    pub status: StatusConfig,
}

/// How to invoke the target algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Shell command; `{instance}`, `{params}` and `{cutoff}` are
    /// substituted per run.
    pub command: String,
    /// Rendering of one parameter inside `{params}`; `{name}` and
    /// `{value}` are substituted.
    pub param_format: String,
    /// Prefix of the stdout line announcing the run's quality.
    pub quality_prefix: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            param_format: "--{name}={value}".to_string(),
            quality_prefix: "quality=".to_string(),
        }
    }
}

/// Instance inventory: either inline or one spec per line in a file
/// (blank lines and `#` comments are skipped).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstancesConfig {
    pub file: Option<PathBuf>,
    pub list: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Where to write the per-generation JSON snapshot.
    pub path: Option<PathBuf>,
}

impl SessionConfig {
    /// Read and validate a session file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CliError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.tuner.validate()?;
        if self.target.command.trim().is_empty() {
            return Err(CliError::Config("target.command must not be empty".into()));
        }
        if self.parameters.is_empty() {
            return Err(CliError::Config(
                "at least one [[parameter]] is required".into(),
            ));
        }
        if self.instances.file.is_some() && !self.instances.list.is_empty() {
            return Err(CliError::Config(
                "instances.file and instances.list are mutually exclusive".into(),
            ));
        }
        if self.instances.file.is_none() && self.instances.list.is_empty() {
            return Err(CliError::Config("no instances configured".into()));
        }
        Ok(())
    }

    /// The typed parameter space described by the `[[parameter]]` tables.
    pub fn build_space(&self) -> Result<ParamSpace> {
        Ok(ParamSpace::new(self.parameters.clone())?)
    }

    /// Materialize the instance inventory. Relative file paths resolve
    /// against `base`, the directory holding the session file.
    pub fn load_instances(&self, base: &Path) -> Result<Vec<Instance>> {
        let specs: Vec<String> = match &self.instances.file {
            Some(file) => {
                let path = resolve(base, file);
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    CliError::Config(format!(
                        "cannot read instance file {}: {e}",
                        path.display()
                    ))
                })?;
                content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && !line.starts_with('#'))
                    .map(str::to_string)
                    .collect()
            }
            None => self.instances.list.clone(),
        };
        if specs.is_empty() {
            return Err(CliError::Config("instance inventory is empty".into()));
        }
        Ok(specs
            .into_iter()
            .enumerate()
            .map(|(index, spec)| Instance::new(InstanceId::new(index as u64), spec))
            .collect())
    }

    pub fn status_path(&self, base: &Path) -> Option<PathBuf> {
        self.status.path.as_ref().map(|path| resolve(base, path))
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paramrace_core::ParamDomain;
    use std::fs;

    const FULL_SESSION: &str = r#"
[tuner]
generations = 5
objective = "quality"

[tuner.engine]
coordinator_count = 2
worker_count = 3
tournament_size = 6
winner_percentage = 0.25

[tuner.genetics]
population_size = 16
seed = 7

[target]
command = "solver -i {instance} {params} -t {cutoff}"
quality_prefix = "cost="

[[parameter]]
name = "depth"
type = "int"
min = 1
max = 64

[[parameter]]
name = "ratio"
type = "float"
min = 0.0
max = 1.0

[[parameter]]
name = "greedy"
type = "bool"

[[parameter]]
name = "strategy"
type = "categorical"
choices = ["dfs", "bfs"]

[instances]
list = ["graphs/a.cnf", "graphs/b.cnf"]

[status]
path = "status.json"
"#;

    fn write_session(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_full_session() {
        let (_dir, path) = write_session(FULL_SESSION);
        let config = SessionConfig::load(&path).unwrap();

        assert_eq!(config.tuner.generations, 5);
        assert_eq!(config.tuner.engine.coordinator_count, 2);
        assert_eq!(config.tuner.engine.worker_count, 3);
        assert_eq!(config.tuner.genetics.population_size, 16);
        assert_eq!(config.tuner.genetics.seed, Some(7));
        assert_eq!(config.target.quality_prefix, "cost=");
        // Unset fields keep their defaults.
        assert_eq!(config.target.param_format, "--{name}={value}");

        let space = config.build_space().unwrap();
        assert_eq!(space.len(), 4);
        assert!(matches!(
            space.get("depth").unwrap().domain,
            ParamDomain::Int { min: 1, max: 64 }
        ));
        assert!(matches!(
            space.get("strategy").unwrap().domain,
            ParamDomain::Categorical { .. }
        ));
    }

    #[test]
    fn test_inline_instances_are_indexed_in_order() {
        let (dir, path) = write_session(FULL_SESSION);
        let config = SessionConfig::load(&path).unwrap();
        let instances = config.load_instances(dir.path()).unwrap();

        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].id(), InstanceId::new(0));
        assert_eq!(instances[0].spec(), "graphs/a.cnf");
        assert_eq!(instances[1].spec(), "graphs/b.cnf");
    }

    #[test]
    fn test_instance_file_skips_comments_and_blanks() {
        let (dir, path) = write_session(
            r#"
[target]
command = "solver {instance} {params}"

[[parameter]]
name = "depth"
type = "int"
min = 1
max = 8

[instances]
file = "instances.txt"
"#,
        );
        fs::write(
            dir.path().join("instances.txt"),
            "# training set\n\na.cnf\n  b.cnf  \n\n# holdout\nc.cnf\n",
        )
        .unwrap();

        let config = SessionConfig::load(&path).unwrap();
        let instances = config.load_instances(dir.path()).unwrap();
        let specs: Vec<_> = instances.iter().map(|i| i.spec().to_string()).collect();
        assert_eq!(specs, ["a.cnf", "b.cnf", "c.cnf"]);
    }

    #[test]
    fn test_missing_target_command_is_rejected() {
        let (_dir, path) = write_session(
            r#"
[[parameter]]
name = "depth"
type = "int"
min = 1
max = 8

[instances]
list = ["a"]
"#,
        );
        let error = SessionConfig::load(&path).unwrap_err();
        assert!(error.to_string().contains("target.command"));
    }

    #[test]
    fn test_both_instance_sources_are_rejected() {
        let (_dir, path) = write_session(
            r#"
[target]
command = "solver"

[[parameter]]
name = "depth"
type = "int"
min = 1
max = 8

[instances]
file = "instances.txt"
list = ["a"]
"#,
        );
        let error = SessionConfig::load(&path).unwrap_err();
        assert!(error.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn test_no_parameters_rejected() {
        let (_dir, path) = write_session(
            r#"
[target]
command = "solver"

[instances]
list = ["a"]
"#,
        );
        assert!(SessionConfig::load(&path).is_err());
    }

    #[test]
    fn test_status_path_resolves_relative_to_base() {
        let (dir, path) = write_session(FULL_SESSION);
        let config = SessionConfig::load(&path).unwrap();
        let status = config.status_path(dir.path()).unwrap();
        assert_eq!(status, dir.path().join("status.json"));
    }
}
