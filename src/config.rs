use anyhow::{bail, Context};
use clap::Parser;
use serde::{Deserialize, Serialize};

/// CBS nodes expanded before giving up when no limit is configured.
pub const DEFAULT_HIGH_LEVEL_NODE_LIMIT: usize = 10_000;

#[derive(Parser, Debug)]
#[command(
    name = "box_cbs",
    about = "Conflict-based search for multi-agent box pushing.",
    version = "0.1"
)]
pub struct Cli {
    #[arg(long, help = "Path to a YAML config file")]
    pub config: Option<String>,

    #[arg(long, help = "Path to the level file")]
    pub level_path: Option<String>,

    #[arg(long, help = "Path to write the plan to, stdout when unset")]
    pub output_path: Option<String>,

    #[arg(long, help = "Path to write statistics as JSON")]
    pub stats_path: Option<String>,

    #[arg(long, help = "Seed for the successor shuffling")]
    pub seed: Option<u64>,

    #[arg(long, help = "Maximum number of CBS nodes to expand, 10000 when unset")]
    pub high_level_node_limit: Option<usize>,

    #[arg(long, help = "Maximum number of states one A* search may expand")]
    pub low_level_node_limit: Option<usize>,

    #[arg(long, help = "Threads for the distance table, 0 for all cores")]
    pub threads: Option<usize>,

    #[arg(long, help = "Tracing filter, e.g. info or box_cbs=debug")]
    pub log_filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub level_path: String,
    pub output_path: Option<String>,
    pub stats_path: Option<String>,
    pub seed: u64,
    pub high_level_node_limit: Option<usize>,
    pub low_level_node_limit: Option<usize>,
    pub threads: usize,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            level_path: String::new(),
            output_path: None,
            stats_path: None,
            seed: 0,
            high_level_node_limit: Some(DEFAULT_HIGH_LEVEL_NODE_LIMIT),
            low_level_node_limit: None,
            threads: 0,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(yaml).context("invalid config")
    }

    /// Command line values win over the config file.
    pub fn override_from_command_line(mut self, cli: &Cli) -> anyhow::Result<Self> {
        if let Some(level_path) = &cli.level_path {
            self.level_path = level_path.clone();
        }
        if cli.output_path.is_some() {
            self.output_path = cli.output_path.clone();
        }
        if cli.stats_path.is_some() {
            self.stats_path = cli.stats_path.clone();
        }
        if let Some(seed) = cli.seed {
            self.seed = seed;
        }
        if cli.high_level_node_limit.is_some() {
            self.high_level_node_limit = cli.high_level_node_limit;
        }
        if cli.low_level_node_limit.is_some() {
            self.low_level_node_limit = cli.low_level_node_limit;
        }
        if let Some(threads) = cli.threads {
            self.threads = threads;
        }
        if let Some(log_filter) = &cli.log_filter {
            self.log_filter = log_filter.clone();
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.level_path.is_empty() {
            bail!("No level file given, set level_path or pass --level-path");
        }
        if self.high_level_node_limit == Some(0) {
            bail!("High-level node limit must be greater than 0");
        }
        if self.low_level_node_limit == Some(0) {
            bail!("Low-level node limit must be greater than 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = Config::from_yaml_str("level_path: levels/MAsimple1.lvl\nseed: 3\n").unwrap();
        assert_eq!(config.level_path, "levels/MAsimple1.lvl");
        assert_eq!(config.seed, 3);
        assert_eq!(config.threads, 0);
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.high_level_node_limit, Some(DEFAULT_HIGH_LEVEL_NODE_LIMIT));
    }

    #[test]
    fn test_node_budget_is_finite_unless_disabled() {
        assert_eq!(
            Config::default().high_level_node_limit,
            Some(DEFAULT_HIGH_LEVEL_NODE_LIMIT)
        );
        let config = Config::from_yaml_str("level_path: a.lvl\nhigh_level_node_limit: null\n").unwrap();
        assert_eq!(config.high_level_node_limit, None);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        assert!(Config::from_yaml_str("level: x\n").is_err());
    }

    #[test]
    fn test_command_line_overrides_file() {
        let config = Config::from_yaml_str("level_path: a.lvl\nseed: 3\nthreads: 2\n").unwrap();
        let cli = Cli::parse_from([
            "box_cbs",
            "--level-path",
            "b.lvl",
            "--seed",
            "9",
            "--high-level-node-limit",
            "100",
        ]);
        let config = config.override_from_command_line(&cli).unwrap();
        assert_eq!(config.level_path, "b.lvl");
        assert_eq!(config.seed, 9);
        assert_eq!(config.threads, 2);
        assert_eq!(config.high_level_node_limit, Some(100));
    }

    #[test]
    fn test_validate() {
        let cli = Cli::parse_from(["box_cbs"]);
        assert!(Config::default().override_from_command_line(&cli).is_err());

        let config = Config {
            level_path: "a.lvl".to_string(),
            low_level_node_limit: Some(0),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
