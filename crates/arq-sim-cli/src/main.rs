use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing::level_filters::LevelFilter;

use arq_sim_abstract::{SimConfig, SimConfigOverride};
use arq_sim_protocols::builtin_by_name;
use arq_sim_simulator::{SimulationReport, Simulator, scenario_runner};

#[derive(Parser, Debug)]
#[command(author, version, about = "Selective Repeat ARQ simulator over a lossy link")]
struct Args {
    /// Load a base configuration from a TOML file; flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a scenario from disk instead of the paced message source. The
    /// config flags below are applied on top of the scenario's own config.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Builtin protocol: `sr` or `gbn`.
    #[arg(long, default_value = "sr")]
    protocol: String,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,

    #[arg(long)]
    num_messages: Option<u64>,
    #[arg(long)]
    loss_prob: Option<f64>,
    #[arg(long)]
    corrupt_prob: Option<f64>,
    #[arg(long)]
    mean_delay: Option<f64>,
    #[arg(long)]
    message_interval: Option<f64>,
    #[arg(long)]
    window_size: Option<u32>,
    #[arg(long)]
    rxmt_interval: Option<f64>,
    /// 0 = warnings only, 1 = protocol log, 2 = every event, 3 = everything.
    #[arg(long)]
    trace: Option<u8>,
    #[arg(long)]
    seed: Option<u64>,
    /// Give up after this many events.
    #[arg(long)]
    max_events: Option<u64>,
}

impl Args {
    fn overrides(&self) -> SimConfigOverride {
        SimConfigOverride {
            num_messages: self.num_messages,
            loss_prob: self.loss_prob,
            corrupt_prob: self.corrupt_prob,
            mean_delay: self.mean_delay,
            message_interval: self.message_interval,
            window_size: self.window_size,
            rxmt_interval: self.rxmt_interval,
            trace: self.trace,
            seed: self.seed,
            max_events: self.max_events,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let protocol = builtin_by_name(&args.protocol)?;

    if args.scenario.is_some() && args.config.is_some() {
        anyhow::bail!("--scenario and --config cannot be used together");
    }

    let report = if let Some(path) = &args.scenario {
        let scenario = scenario_runner::load_scenario(path)?;
        let overrides = args.overrides();
        init_logging(scenario_runner::scenario_config(&scenario, &overrides).trace);
        info!("arq-sim starting scenario {}", path.display());
        scenario_runner::run_loaded_scenario(&scenario, &overrides, |config| {
            protocol.load_pair(config.window())
        })?
    } else {
        let mut config = load_config(args.config.as_deref())?;
        args.overrides().apply_to(&mut config);
        init_logging(config.trace);
        info!(
            "arq-sim starting: {} messages, protocol {}",
            config.num_messages,
            protocol.name()
        );

        let (sender, receiver) = protocol.load_pair(config.window());
        let mut sim = Simulator::new(config, sender, receiver)?;
        sim.run_until_complete()?;
        sim.export_report()
    };

    println!("{report}");

    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &report)?;
    }

    Ok(())
}

fn init_logging(trace: u8) {
    let level = match trace {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

fn load_config(path: Option<&Path>) -> Result<SimConfig> {
    let Some(path) = path else {
        return Ok(SimConfig::default());
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&content).context("Failed to parse config file")
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}
