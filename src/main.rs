use box_cbs::config::{Cli, Config};
use box_cbs::level::Level;
use box_cbs::solver::{Solver, CBS};

use anyhow::{bail, Context};
use clap::Parser;
use std::fs;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = if let Some(config_file) = cli.config.as_ref() {
        let config_str = fs::read_to_string(config_file)
            .with_context(|| format!("cannot read config file: {config_file}"))?;
        Config::from_yaml_str(&config_str)
            .with_context(|| format!("error with config file: {config_file}"))?
    } else {
        Config::default()
    }
    .override_from_command_line(&cli)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .with_context(|| format!("invalid log filter: {}", config.log_filter))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    if cli.config.is_none() {
        info!("No config file specified, using default config");
    }

    let level = Level::from_file(&config.level_path)
        .with_context(|| format!("error loading level: {}", config.level_path))?;
    info!(
        "level {} is {}x{} with {} agent(s)",
        level.name,
        level.height,
        level.width,
        level.agents.len()
    );

    let mut solver = CBS::new(&level, &config)
        .with_context(|| format!("cannot plan level: {}", config.level_path))?;
    let solution = solver.solve(&config);

    if let Some(stats_path) = &config.stats_path {
        fs::write(stats_path, solver.stats().to_json()?)
            .with_context(|| format!("cannot write stats: {stats_path}"))?;
    }

    let Some(solution) = solution else {
        bail!("no plan found for level {}", level.name);
    };
    if !solution.verify(solver.initial_state()) {
        warn!("plan does not verify against the initial state");
    }

    match &config.output_path {
        Some(output_path) => fs::write(output_path, solution.to_string())
            .with_context(|| format!("cannot write plan: {output_path}"))?,
        None => print!("{solution}"),
    }
    Ok(())
}
