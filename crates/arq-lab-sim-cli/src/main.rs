use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use arq_lab_abstract::{LinkConfig, TestScenario};
use arq_lab_protocol::codec_by_name;
use arq_lab_simulator::{LiveReport, Simulation, SimulationReport, live, scenario_runner};

#[derive(Parser, Debug)]
#[command(author, version, about = "Go-Back-N sliding window simulator")]
struct Args {
    /// Load link parameters from a TOML file; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a scenario file (config overrides, faults and assertions).
    #[arg(long)]
    scenario: Option<PathBuf>,

    #[arg(long)]
    window_size: Option<u32>,
    #[arg(long)]
    sequence_space: Option<u32>,
    #[arg(long)]
    total_frames: Option<u64>,
    #[arg(long)]
    frame_loss: Option<f64>,
    #[arg(long)]
    ack_loss: Option<f64>,
    #[arg(long)]
    corruption: Option<f64>,
    /// Transmission delay (ticks, or ms with --live).
    #[arg(long)]
    delay: Option<u64>,
    /// Retransmission timeout (ticks, or ms with --live).
    #[arg(long)]
    timeout: Option<u64>,
    #[arg(long)]
    seed: Option<u64>,

    /// Frame-integrity codec: hamming74 or identity.
    #[arg(long)]
    codec: Option<String>,

    /// Run sender and receiver as concurrent tasks in real time.
    #[arg(long, default_value_t = false)]
    live: bool,

    /// Give up after this many rounds.
    #[arg(long, default_value_t = 100_000)]
    max_rounds: u64,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,

    /// Print the link event timeline after the run.
    #[arg(long, default_value_t = false)]
    events: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt::init();
    info!("arq-lab-sim-cli starting…");

    if args.live && (args.scenario.is_some() || args.trace_out.is_some()) {
        anyhow::bail!("--live cannot be combined with --scenario or --trace-out");
    }

    if args.live {
        let report = run_live(args.link_config(None)?)?;
        log_live_summary(&report);
        return Ok(());
    }

    let report = if let Some(path) = &args.scenario {
        let scenario = scenario_runner::load_scenario(path)?;
        run_scenario(&args, scenario)?
    } else {
        let config = args.link_config(None)?;
        let mut sim = Simulation::new(config).context("Invalid link configuration")?;
        if let Some(name) = &args.codec {
            sim = sim.with_codec(codec_by_name(name)?);
        }
        sim.run_to_completion(args.max_rounds)?
    };

    log_summary(&report);
    if args.events {
        for event in &report.link_events {
            println!("[round {:>4} t={:>6}] {}", event.round, event.time, event.description);
        }
    }
    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &report)?;
    }
    Ok(())
}

fn run_scenario(args: &Args, mut scenario: TestScenario) -> Result<SimulationReport> {
    if scenario.codec.is_none() {
        scenario.codec = args.codec.clone();
    }
    let config = args.link_config(Some(&scenario))?;
    let mut sim = scenario_runner::build_simulation(&scenario, config)?;
    let report = sim
        .run_to_completion(args.round_limit(&scenario))
        .context("Scenario did not complete")?;
    scenario_runner::check_assertions(&scenario.assertions, &report)?;
    info!("Scenario '{}' passed", scenario.name);
    Ok(report)
}

impl Args {
    /// Config file (or defaults), then scenario overrides, then flags.
    fn link_config(&self, scenario: Option<&TestScenario>) -> Result<LinkConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => LinkConfig::default(),
        };
        if let Some(scenario) = scenario {
            config = scenario_runner::scenario_config(scenario, config);
        }
        self.apply_flags(&mut config);
        Ok(config)
    }

    /// The tighter of `--max-rounds` and the scenario's own limit.
    fn round_limit(&self, scenario: &TestScenario) -> u64 {
        scenario_runner::round_limit(scenario)
            .map_or(self.max_rounds, |limit| limit.min(self.max_rounds))
    }

    fn apply_flags(&self, config: &mut LinkConfig) {
        if let Some(v) = self.window_size {
            config.window_size = v;
        }
        if let Some(v) = self.sequence_space {
            config.sequence_space = v;
        }
        if let Some(v) = self.total_frames {
            config.total_frames = v;
        }
        if let Some(v) = self.frame_loss {
            config.frame_loss_probability = v;
        }
        if let Some(v) = self.ack_loss {
            config.ack_loss_probability = v;
        }
        if let Some(v) = self.corruption {
            config.corruption_probability = v;
        }
        if let Some(v) = self.delay {
            config.transmission_delay = v;
        }
        if let Some(v) = self.timeout {
            config.timeout = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
    }
}

fn load_config(path: &Path) -> Result<LinkConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&content).context("Failed to parse config file")
}

fn run_live(config: LinkConfig) -> Result<LiveReport> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    let total_frames = config.total_frames;
    let report = runtime.block_on(live::run(config))?;
    if !report.delivered_in_order(total_frames) {
        anyhow::bail!("live transfer delivered {:?}", report.delivered);
    }
    Ok(report)
}

fn log_summary(report: &SimulationReport) {
    info!(
        "Rounds: {} | frames sent: {} | retransmissions: {} | timeouts: {} | delivered: {} (in order: {})",
        report.rounds,
        report.frames_sent,
        report.retransmissions,
        report.timeouts,
        report.delivered.len(),
        report.delivered_in_order()
    );
}

fn log_live_summary(report: &LiveReport) {
    info!(
        "Elapsed: {:?} | frames sent: {} | retransmissions: {} | timeouts: {} | delivered: {}",
        report.elapsed,
        report.sender.frames_sent,
        report.sender.retransmissions,
        report.sender.timeouts,
        report.delivered.len()
    );
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arq_lab_abstract::TestAssertion;

    fn scenario_path(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../scenarios")
            .join(name)
    }

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["arq-lab-sim-cli"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    fn lost_third_frame() -> TestScenario {
        scenario_runner::load_scenario(&scenario_path("lost_third_frame.toml")).unwrap()
    }

    #[test]
    fn flags_override_scenario_config() {
        let scenario = scenario_runner::load_scenario(&scenario_path("clean_link.toml")).unwrap();
        let args = args(&["--window-size", "2", "--seed", "5"]);
        let config = args.link_config(Some(&scenario)).unwrap();
        assert_eq!(config.window_size, 2);
        assert_eq!(config.seed, 5);
        // untouched by flags, taken from the scenario
        assert_eq!(config.total_frames, 10);
    }

    #[test]
    fn scenario_run_uses_flag_window() {
        let scenario = lost_third_frame();
        let args = args(&["--window-size", "2"]);
        let report = run_scenario(&args, scenario).unwrap();
        assert_eq!(report.config.window_size, 2);
        assert!(report.max_in_flight <= 2);
        assert!(report.delivered_in_order());
    }

    #[test]
    fn scenario_round_limit_is_honoured() {
        let mut scenario = lost_third_frame();
        scenario.assertions = vec![TestAssertion::MaxRounds { rounds: 3 }];
        let args = args(&[]);
        assert_eq!(args.round_limit(&scenario), 3);
        assert!(run_scenario(&args, scenario).is_err());
    }

    #[test]
    fn max_rounds_flag_caps_scenario_limit() {
        let scenario = lost_third_frame();
        let args = args(&["--max-rounds", "5"]);
        assert_eq!(args.round_limit(&scenario), 5);
        assert_eq!(args.round_limit(&TestScenario { assertions: Vec::new(), ..scenario }), 5);
    }
}
