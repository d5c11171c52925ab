//! Run every defined scenario and export all metrics to one CSV
//!
//! Usage: scenario_report [PERIODS] [OUTPUT]
//! Reads data/scenarios/scenarios.csv when present, otherwise the built-in presets.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use microlend_projection::assumptions::{load_scenarios, DEFAULT_SCENARIOS_PATH};
use microlend_projection::{Metric, Scenario, ScenarioComparator, TimeGrid};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Instant;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let periods: u32 = match args.get(1) {
        Some(arg) => arg.parse().with_context(|| format!("invalid period count '{}'", arg))?,
        None => 60,
    };
    let output_path = args.get(2).map(String::as_str).unwrap_or("scenario_report.csv");

    let start = Instant::now();
    let scenarios = if Path::new(DEFAULT_SCENARIOS_PATH).exists() {
        load_scenarios(Path::new(DEFAULT_SCENARIOS_PATH))?
    } else {
        Scenario::presets()
    };
    println!("Loaded {} scenarios in {:?}", scenarios.len(), start.elapsed());

    let grid_start = NaiveDate::from_ymd_opt(2025, 1, 1).context("invalid grid start")?;
    let grid = TimeGrid::monthly(grid_start, periods)?;

    // Scenarios run in parallel inside the comparator
    println!("Running projections...");
    let proj_start = Instant::now();
    let comparator = ScenarioComparator::default();
    let mut runs = BTreeMap::new();
    for (name, outcome) in comparator.run_each(&scenarios, &grid)? {
        match outcome {
            Ok(run) => {
                runs.insert(name, run);
            }
            Err(e) => eprintln!("Skipping scenario '{}': {}", name, e),
        }
    }
    println!("Projections complete in {:?}", proj_start.elapsed());

    let file = File::create(output_path).with_context(|| format!("creating {}", output_path))?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));

    let mut header = vec!["scenario".to_string(), "period".to_string(), "date".to_string()];
    header.extend(Metric::ALL.iter().map(|m| m.to_string()));
    writer.write_record(&header)?;

    for (name, run) in &runs {
        for period in grid.periods() {
            let mut record = vec![name.clone(), period.index.to_string(), period.start.to_string()];
            for metric in Metric::ALL {
                let value = run.value(metric, period.index as usize).unwrap_or(0.0);
                record.push(format!("{:.2}", value));
            }
            writer.write_record(&record)?;
        }
    }
    writer.flush()?;

    println!("Output written to {}", output_path);

    println!("\nScenario Summary ({} periods to {}):", grid.len(), grid.horizon());
    println!(
        "{:<22} {:>14} {:>16} {:>14} {:>18}",
        "Scenario", "Active Users", "Originations", "Losses", "Cum Net Revenue"
    );
    println!("{}", "-".repeat(88));
    for (name, run) in &runs {
        let summary = run.summary();
        println!(
            "{:<22} {:>14.0} {:>16.0} {:>14.0} {:>18.0}",
            name,
            summary.final_active_users,
            summary.total_originations,
            summary.total_losses,
            summary.cumulative_net_revenue
        );
    }

    println!("\nTotal time: {:?}", start.elapsed());
    Ok(())
}
