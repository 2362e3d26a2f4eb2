use anyhow::{Context, anyhow, bail};
use std::fs;
use std::path::Path;

use arq_sim_abstract::{
    SimConfig, SimConfigOverride, TestAction, TestAssertion, TestScenario, TransportProtocol,
};
use tracing::info;

use crate::engine::Simulator;
use crate::trace::SimulationReport;

/// Scenarios drive the sender through scripted `app_send` actions; the
/// random source stays silent unless the scenario asks for messages.
pub fn scenario_base_config() -> SimConfig {
    SimConfig {
        num_messages: 0,
        ..Default::default()
    }
}

/// Configuration a scenario runs with: the scenario base, the scenario's own
/// `[config]` table, then `extra` on top.
pub fn scenario_config(scenario: &TestScenario, extra: &SimConfigOverride) -> SimConfig {
    let mut config = scenario_base_config();
    scenario.config.apply_to(&mut config);
    extra.apply_to(&mut config);
    config
}

pub fn load_scenario(path: &Path) -> anyhow::Result<TestScenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    toml::from_str(&content).context("Failed to parse scenario")
}

/// Configure actions (app sends, deterministic faults) on a fresh simulator.
pub fn configure_actions(sim: &mut Simulator, actions: &[TestAction]) {
    for action in actions {
        match action {
            TestAction::AppSend { time, data } => {
                sim.schedule_app_send(*time, data.as_bytes().to_vec());
            }
            TestAction::DropNextFromSenderSeq { seq } => {
                sim.add_drop_sender_seq_once(*seq);
            }
            TestAction::DropNextFromReceiverAck { ack } => {
                sim.add_drop_receiver_ack_once(*ack);
            }
            TestAction::CorruptNextFromSenderSeq { seq } => {
                sim.add_corrupt_sender_seq_once(*seq);
            }
            TestAction::CorruptNextFromReceiverAck { ack } => {
                sim.add_corrupt_receiver_ack_once(*ack);
            }
        }
    }
}

/// Load a scenario, build the entity pair for its resolved config with
/// `load`, run it to completion and check every assertion.
pub fn run_scenario<F>(path: &Path, load: F) -> anyhow::Result<SimulationReport>
where
    F: FnOnce(&SimConfig) -> (Box<dyn TransportProtocol>, Box<dyn TransportProtocol>),
{
    let scenario = load_scenario(path)?;
    run_loaded_scenario(&scenario, &SimConfigOverride::default(), load)
}

/// Run an already parsed scenario with `extra` applied over its config.
pub fn run_loaded_scenario<F>(
    scenario: &TestScenario,
    extra: &SimConfigOverride,
    load: F,
) -> anyhow::Result<SimulationReport>
where
    F: FnOnce(&SimConfig) -> (Box<dyn TransportProtocol>, Box<dyn TransportProtocol>),
{
    info!("Running Scenario: {}", scenario.name);
    if !scenario.description.is_empty() {
        info!("Description: {}", scenario.description);
    }

    let config = scenario_config(scenario, extra);
    let (sender, receiver) = load(&config);
    let mut sim = Simulator::new(config, sender, receiver)?;
    configure_actions(&mut sim, &scenario.actions);

    sim.init()?;

    let max_duration = scenario.assertions.iter().find_map(|a| match a {
        TestAssertion::MaxDuration { time } => Some(*time),
        _ => None,
    });

    while sim.step()? {
        if let Some(limit) = max_duration {
            if sim.current_time() > limit {
                bail!("Test timed out after {} time units", limit);
            }
        }
    }

    let report = sim.export_report();
    check_assertions(scenario, &report)?;
    info!("Test Scenario Passed!");
    Ok(report)
}

fn check_range(what: &str, value: u64, min: u64, max: Option<u64>) -> anyhow::Result<()> {
    if value < min {
        bail!("Assertion Failed: {what} was {value}, expected min {min}");
    }
    if let Some(max) = max {
        if value > max {
            bail!("Assertion Failed: {what} was {value}, expected max {max}");
        }
    }
    Ok(())
}

pub fn check_assertions(scenario: &TestScenario, report: &SimulationReport) -> anyhow::Result<()> {
    for assertion in &scenario.assertions {
        match assertion {
            TestAssertion::DataDelivered { data } => {
                let found = report.delivered_data.iter().any(|d| d == data.as_bytes());
                if !found {
                    return Err(anyhow!(
                        "Assertion Failed: Data {:?} was not delivered",
                        data
                    ));
                }
            }
            TestAssertion::DeliveredInOrder { data } => {
                let expected: Vec<&[u8]> = data.iter().map(|d| d.as_bytes()).collect();
                let actual: Vec<&[u8]> = report.delivered_data.iter().map(Vec::as_slice).collect();
                if actual != expected {
                    return Err(anyhow!(
                        "Assertion Failed: delivered {:?}, expected {:?}",
                        report
                            .delivered_data
                            .iter()
                            .map(|d| String::from_utf8_lossy(d))
                            .collect::<Vec<_>>(),
                        data
                    ));
                }
            }
            TestAssertion::SenderPacketCount { min, max } => {
                check_range(
                    "Sender original packet count",
                    report.stats.original_packets,
                    *min,
                    *max,
                )?;
            }
            TestAssertion::Retransmissions { min, max } => {
                check_range("Retransmissions", report.stats.retransmissions, *min, *max)?;
            }
            TestAssertion::CorruptedCount { min, max } => {
                check_range("Corrupted packets", report.stats.corrupted, *min, *max)?;
            }
            TestAssertion::SenderWindowMax { max } => {
                if report.max_in_flight > *max as usize {
                    return Err(anyhow!(
                        "Assertion Failed: Sender had {} packets in flight > expected max {}",
                        report.max_in_flight,
                        max
                    ));
                }
            }
            TestAssertion::MaxDuration { .. } => {} // Already checked
        }
    }
    Ok(())
}
