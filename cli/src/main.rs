use clap::{Parser, Subcommand};
use gridroute_common::util::config::RouterConfig;
use gridroute_common::util::logger;
use gridroute_router::via::ConfigViaLibrary;
use std::path::PathBuf;

mod demo;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Builds a synthetic design in memory and routes it.
    Route {
        #[arg(long, default_value_t = 20)]
        nets: usize,
        #[arg(long, default_value_t = 1)]
        seed: u64,
    },
}

fn main() -> anyhow::Result<()> {
    logger::init();
    let args = Args::parse();
    let config = load_config(&args.config);

    let command = args.command.unwrap_or(Commands::Route { nets: 20, seed: 1 });
    match command {
        Commands::Route { nets, seed } => run_route(&config, nets, seed)?,
    }

    Ok(())
}

fn load_config(path: &PathBuf) -> RouterConfig {
    if !path.exists() {
        log::warn!("Configuration file {:?} not found. Using internal defaults.", path);
        return RouterConfig::default();
    }
    log::info!("Loading configuration from {:?}", path);
    match std::fs::read_to_string(path) {
        Ok(text) => toml::from_str(&text).unwrap_or_else(|e| {
            log::warn!("Failed to parse config TOML ({}), using internal defaults.", e);
            RouterConfig::default()
        }),
        Err(e) => {
            log::warn!("Failed to read config file ({}), using internal defaults.", e);
            RouterConfig::default()
        }
    }
}

fn run_route(config: &RouterConfig, nets: usize, seed: u64) -> anyhow::Result<()> {
    log::info!("Building synthetic design ({} nets, seed {})...", nets, seed);
    let (mut grid, mut arena) = demo::build_synthetic_design(config, nets, seed);

    let via_lib = ConfigViaLibrary { layers: &config.layers };

    log::info!("Starting Routing...");
    let report = gridroute_router::route_design(&mut grid, &mut arena, &via_lib, config)
        .map_err(|e| anyhow::anyhow!("Routing failed: {e}"))?;

    log::info!(
        "Routed {} of {} nets ({} rip-up passes).",
        nets - report.failed_nets.len(),
        nets,
        report.ripup_passes
    );
    if !report.failed_nets.is_empty() {
        log::warn!("Unroutable nets: {:?}", report.failed_nets);
        std::process::exit(1);
    }

    Ok(())
}
