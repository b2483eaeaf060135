use anyhow::Result;
use arq_lab_simulator::{SimulationReport, scenario_runner};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless grader for Go-Back-N scenarios")]
struct Args {
    /// Scenario TOML files to execute, in order.
    #[arg(required = true)]
    scenarios: Vec<PathBuf>,

    /// Keep going after a failed scenario instead of stopping.
    #[arg(long, default_value_t = false)]
    keep_going: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt::init();
    info!("arq-lab-eval-host starting...");

    let mut failures = 0usize;
    for path in &args.scenarios {
        match scenario_runner::run_scenario(path) {
            Ok(report) => log_summary(&report),
            Err(err) => {
                error!("{}: {:#}", path.display(), err);
                failures += 1;
                if !args.keep_going {
                    break;
                }
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} scenario(s) failed");
    }
    info!("All {} scenario(s) passed", args.scenarios.len());
    Ok(())
}

fn log_summary(report: &SimulationReport) {
    info!(
        "Rounds: {} | frames sent: {} | retransmissions: {} | deliveries: {}",
        report.rounds,
        report.frames_sent,
        report.retransmissions,
        report.delivered.len()
    );
}
