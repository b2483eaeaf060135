use anyhow::{Context, anyhow};
use arq_lab_abstract::{LinkConfig, TestAssertion, TestScenario};
use arq_lab_protocol::codec_by_name;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::engine::Simulation;
use crate::trace::SimulationReport;

const DEFAULT_MAX_ROUNDS: u64 = 10_000;

pub fn load_scenario(path: &Path) -> anyhow::Result<TestScenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    toml::from_str(&content).context("Failed to parse scenario")
}

/// `base_config` with the scenario's `[config]` overrides on top.
pub fn scenario_config(scenario: &TestScenario, base_config: LinkConfig) -> LinkConfig {
    let mut config = base_config;
    scenario.config.apply_to(&mut config);
    config
}

/// Round limit set by a `max_rounds` assertion, if the scenario has one.
pub fn round_limit(scenario: &TestScenario) -> Option<u64> {
    scenario.assertions.iter().find_map(|a| {
        if let TestAssertion::MaxRounds { rounds } = a {
            Some(*rounds)
        } else {
            None
        }
    })
}

/// Build the simulation for a scenario's faults and codec. `config` is
/// used as given; see [`scenario_config`] for applying the overrides.
pub fn build_simulation(scenario: &TestScenario, config: LinkConfig) -> anyhow::Result<Simulation> {
    let mut sim = Simulation::new(config).context("Invalid scenario configuration")?;
    if let Some(name) = &scenario.codec {
        sim = sim.with_codec(codec_by_name(name)?);
    }
    for action in &scenario.actions {
        sim.add_fault(action);
    }
    Ok(sim)
}

pub fn run_scenario(path: &Path) -> anyhow::Result<SimulationReport> {
    let scenario = load_scenario(path)?;
    run_loaded(&scenario)
}

pub fn run_loaded(scenario: &TestScenario) -> anyhow::Result<SimulationReport> {
    info!("Running Scenario: {}", scenario.name);
    info!("Description: {}", scenario.description);

    let config = scenario_config(scenario, LinkConfig::default());
    let mut sim = build_simulation(scenario, config)?;
    let max_rounds = round_limit(scenario).unwrap_or(DEFAULT_MAX_ROUNDS);

    let report = sim
        .run_to_completion(max_rounds)
        .with_context(|| format!("Scenario '{}' did not complete", scenario.name))?;
    check_assertions(&scenario.assertions, &report)?;

    info!("Test Scenario Passed!");
    Ok(report)
}

fn check_range(label: &str, value: u64, min: u64, max: Option<u64>) -> anyhow::Result<()> {
    if value < min {
        return Err(anyhow!(
            "Assertion Failed: {} was {}, expected min {}",
            label,
            value,
            min
        ));
    }
    if let Some(max) = max
        && value > max
    {
        return Err(anyhow!(
            "Assertion Failed: {} was {}, expected max {}",
            label,
            value,
            max
        ));
    }
    Ok(())
}

pub fn check_assertions(
    assertions: &[TestAssertion],
    report: &SimulationReport,
) -> anyhow::Result<()> {
    for assertion in assertions {
        match assertion {
            TestAssertion::DeliveredInOrder => {
                if !report.delivered_in_order() {
                    return Err(anyhow!(
                        "Assertion Failed: delivered {:?}, expected 0..{} in order",
                        report.delivered,
                        report.config.total_frames
                    ));
                }
            }
            TestAssertion::Retransmissions { min, max } => {
                check_range("retransmissions", report.retransmissions, *min, *max)?;
            }
            TestAssertion::Timeouts { min, max } => {
                check_range("timeouts", report.timeouts, *min, *max)?;
            }
            TestAssertion::OutOfOrderDiscards { min, max } => {
                check_range(
                    "out-of-order discards",
                    report.out_of_order_discards,
                    *min,
                    *max,
                )?;
            }
            TestAssertion::FramesSent { min, max } => {
                check_range("frames sent", report.frames_sent, *min, *max)?;
            }
            TestAssertion::MaxRounds { rounds } => {
                if report.rounds > *rounds {
                    return Err(anyhow!(
                        "Assertion Failed: finished after {} rounds, expected at most {}",
                        report.rounds,
                        rounds
                    ));
                }
            }
        }
    }
    Ok(())
}
