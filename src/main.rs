//! Microlending projection CLI
//!
//! Runs projections, scenario comparisons, sensitivity analysis and unit
//! economics from the command line. Data goes to `--output` (or stdout) as CSV
//! or JSON; human-readable summaries go to stderr.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use microlend_projection::assumptions::{load_registry, load_scenarios, DEFAULT_SCENARIOS_PATH};
use microlend_projection::economics::{annual_summary, AnnualSummary, InvestmentMetrics, LoanEconomics, PaydayComparison, StakerMetrics};
use microlend_projection::{
    compare, AssumptionRegistry, Cadence, Metric, ProjectionError, ProjectionRun, Scenario, ScenarioComparator, TimeGrid,
};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

const DEFAULT_PERIODS: u32 = 60;

#[derive(Debug, Parser)]
#[command(name = "microlend", version, about = "Microlending platform projections and scenario analysis")]
struct Cli {
    /// Directory holding registry.csv (defaults to the built-in registry)
    #[arg(long, global = true)]
    assumptions_dir: Option<PathBuf>,

    /// Scenario definitions CSV (scenario,assumption,value)
    #[arg(long, global = true)]
    scenarios: Option<PathBuf>,

    #[command(flatten)]
    grid: GridArgs,

    #[command(subcommand)]
    command: Command,
}

/// Time grid options
#[derive(Debug, Args)]
struct GridArgs {
    /// First period start date (YYYY-MM-DD)
    #[arg(long, global = true, default_value = "2025-01-01")]
    start: NaiveDate,

    /// Period cadence: monthly, quarterly or annual
    #[arg(long, global = true, default_value = "monthly")]
    cadence: Cadence,

    /// Number of periods
    #[arg(long, global = true, conflicts_with = "horizon")]
    periods: Option<u32>,

    /// Last date to cover; the grid ends at the period containing it
    #[arg(long, global = true)]
    horizon: Option<NaiveDate>,
}

impl GridArgs {
    fn build(&self) -> Result<TimeGrid> {
        let grid = match self.horizon {
            Some(horizon) => TimeGrid::spanning(self.start, horizon, self.cadence)?,
            None => TimeGrid::new(self.start, self.cadence, self.periods.unwrap_or(DEFAULT_PERIODS))?,
        };
        Ok(grid)
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Csv,
    Json,
}

/// Output destination options
#[derive(Debug, Args)]
struct OutputArgs {
    #[arg(long, value_enum, default_value_t = Format::Csv)]
    format: Format,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl OutputArgs {
    fn open(&self) -> Result<Box<dyn Write>> {
        Ok(match &self.output {
            Some(path) => Box::new(BufWriter::new(
                File::create(path).with_context(|| format!("creating {}", path.display()))?,
            )),
            None => Box::new(io::stdout().lock()),
        })
    }
}

/// Scenario selection plus ad-hoc overrides
#[derive(Debug, Args)]
struct ScenarioArgs {
    /// Scenario to run
    #[arg(long, default_value = "base")]
    scenario: String,

    /// Override an assumption, e.g. --set growth_rate=0.1 (repeatable)
    #[arg(long = "set", value_parser = parse_override)]
    overrides: Vec<(String, f64)>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Project every metric for one scenario
    Project {
        #[command(flatten)]
        scenario: ScenarioArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Tabulate one metric across scenarios (period x scenario)
    Compare {
        /// Metric to compare
        #[arg(long, default_value = "net_revenue")]
        metric: String,
        /// Scenarios to include (defaults to every defined scenario)
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// One-at-a-time tornado analysis around a scenario
    Sensitivity {
        #[command(flatten)]
        scenario: ScenarioArgs,
        /// Metric measured at the horizon
        #[arg(long, default_value = "net_revenue")]
        metric: String,
        /// Assumptions to perturb (defaults to every registered assumption)
        #[arg(long = "assumption", value_delimiter = ',')]
        assumptions: Vec<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Per-loan, staker and investor economics for a scenario
    Economics {
        #[command(flatten)]
        scenario: ScenarioArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
}

fn parse_override(s: &str) -> std::result::Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", s))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("bad value for '{}': {}", name.trim(), e))?;
    Ok((name.trim().to_string(), value))
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let registry = match &cli.assumptions_dir {
        Some(dir) => load_registry(dir).with_context(|| format!("loading registry from {}", dir.display()))?,
        None => AssumptionRegistry::standard(),
    };
    let scenarios = scenario_catalog(cli.scenarios.as_deref())?;
    let grid = cli.grid.build()?;
    let comparator = ScenarioComparator::new(registry);

    match cli.command {
        Command::Project { scenario, output } => {
            let scenario = select(&scenarios, &scenario)?;
            let run = comparator.run_one(&scenario, &grid)?;
            write_run(&run, &output)?;
            print_summary(&scenario.name, &run);
        }
        Command::Compare { metric, only, output } => {
            let selected: Vec<Scenario> = if only.is_empty() {
                scenarios
            } else {
                only.iter()
                    .map(|name| find(&scenarios, name))
                    .collect::<std::result::Result<_, _>>()?
            };
            let runs = comparator.run_scenarios(&selected, &grid)?;
            let table = compare(&runs, &metric)?;

            let mut out = output.open()?;
            match output.format {
                Format::Csv => table.write_csv(&mut out)?,
                Format::Json => serde_json::to_writer_pretty(&mut out, &table)?,
            }
            out.flush()?;

            for (name, run) in &runs {
                eprintln!("{:<22} {} at horizon: {:.2}", name, table.metric, run.horizon_value(table.metric).unwrap_or(0.0));
            }
        }
        Command::Sensitivity {
            scenario,
            metric,
            assumptions,
            output,
        } => {
            let scenario = select(&scenarios, &scenario)?;
            let names: Vec<&str> = assumptions.iter().map(String::as_str).collect();
            let entries = comparator.sensitivity(&scenario, &names, &metric, &grid)?;

            let mut out = output.open()?;
            match output.format {
                Format::Csv => write_csv_rows(&mut out, &entries)?,
                Format::Json => serde_json::to_writer_pretty(&mut out, &entries)?,
            }
            out.flush()?;

            eprintln!("Sensitivity of {} at {} ({}):", metric, grid.horizon(), scenario.name);
            for e in &entries {
                eprintln!("  {:<26} low {:>16.2}  high {:>16.2}", e.assumption, e.delta_low, e.delta_high);
            }
        }
        Command::Economics { scenario, output } => {
            let scenario = select(&scenarios, &scenario)?;
            let run = comparator.run_one(&scenario, &grid)?;
            let report = EconomicsReport {
                loan: LoanEconomics::from_set(&run.assumptions)?,
                payday: PaydayComparison::from_set(&run.assumptions)?,
                stakers: StakerMetrics::from_run(&run),
                investment: InvestmentMetrics::from_run(&run),
                annual: annual_summary(&run),
            };

            let mut out = output.open()?;
            match output.format {
                Format::Csv => write_csv_rows(&mut out, &report.annual)?,
                Format::Json => serde_json::to_writer_pretty(&mut out, &report)?,
            }
            out.flush()?;
            print_economics(&report);
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct EconomicsReport {
    loan: LoanEconomics,
    payday: PaydayComparison,
    stakers: StakerMetrics,
    investment: InvestmentMetrics,
    annual: Vec<AnnualSummary>,
}

/// Scenario file if present, otherwise the built-in presets
fn scenario_catalog(path: Option<&Path>) -> Result<Vec<Scenario>> {
    match path {
        Some(path) => load_scenarios(path).with_context(|| format!("loading scenarios from {}", path.display())),
        None => {
            let default = Path::new(DEFAULT_SCENARIOS_PATH);
            if default.exists() {
                Ok(load_scenarios(default)?)
            } else {
                log::info!("{} not found; using built-in presets", DEFAULT_SCENARIOS_PATH);
                Ok(Scenario::presets())
            }
        }
    }
}

fn find(scenarios: &[Scenario], name: &str) -> std::result::Result<Scenario, ProjectionError> {
    scenarios
        .iter()
        .find(|s| s.name == name)
        .cloned()
        .ok_or_else(|| ProjectionError::UnknownScenario(name.to_string()))
}

fn select(scenarios: &[Scenario], args: &ScenarioArgs) -> Result<Scenario> {
    let mut scenario = find(scenarios, &args.scenario)?;
    for (name, value) in &args.overrides {
        scenario = scenario.with(name, *value);
    }
    Ok(scenario)
}

fn write_run(run: &ProjectionRun, output: &OutputArgs) -> Result<()> {
    let mut out = output.open()?;
    match output.format {
        Format::Json => serde_json::to_writer_pretty(&mut out, run)?,
        Format::Csv => {
            let mut writer = csv::Writer::from_writer(&mut out);
            let mut header = vec!["period".to_string(), "date".to_string()];
            header.extend(Metric::ALL.iter().map(|m| m.to_string()));
            writer.write_record(&header)?;

            for period in run.grid.periods() {
                let mut record = vec![period.index.to_string(), period.start.to_string()];
                for metric in Metric::ALL {
                    let value = run.value(metric, period.index as usize).unwrap_or(0.0);
                    record.push(value.to_string());
                }
                writer.write_record(&record)?;
            }
            writer.flush()?;
        }
    }
    out.flush()?;
    Ok(())
}

fn write_csv_rows<W: Write, T: Serialize>(out: W, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn print_summary(name: &str, run: &ProjectionRun) {
    let summary = run.summary();
    eprintln!("\nSummary ({}, {} periods, fingerprint {}):", name, summary.periods, run.fingerprint);
    eprintln!("  Final Active Users:     {:.0}", summary.final_active_users);
    eprintln!("  Total Originations:     ${:.2}", summary.total_originations);
    eprintln!("  Total Unmet Demand:     ${:.2}", summary.total_unmet_demand);
    eprintln!("  Total Losses:           ${:.2}", summary.total_losses);
    eprintln!("  Total Yield Paid:       ${:.2}", summary.total_yield_paid);
    eprintln!("  Final Outstanding:      ${:.2}", summary.final_outstanding);
    eprintln!("  Final Capital:          ${:.2}", summary.final_capital);
    eprintln!("  Cumulative Net Revenue: ${:.2}", summary.cumulative_net_revenue);
    if summary.shortfall_periods > 0 || summary.clamped_values > 0 {
        eprintln!(
            "  Annotations: {} capacity shortfalls, {} clamped values",
            summary.shortfall_periods, summary.clamped_values
        );
    }
}

fn print_economics(report: &EconomicsReport) {
    let loan = &report.loan;
    eprintln!("\nPer-loan (${:.2}):", loan.loan_size);
    eprintln!("  Total Fee: ${:.2} (interest ${:.2}, origination ${:.2})", loan.total_fee, loan.interest_fee, loan.origination_fee);
    eprintln!("  Platform / Stakers: ${:.2} / ${:.2}", loan.platform_revenue, loan.staker_revenue);
    eprintln!("  APR: {:.1}%  vs payday {:.1}%", loan.apr * 100.0, report.payday.payday_apr * 100.0);
    eprintln!("  Consumer Savings vs Payday: ${:.2}", report.payday.consumer_savings);

    eprintln!("\nStakers:");
    eprintln!("  Annualised Yield: {:.2}%", report.stakers.annualised_yield * 100.0);
    eprintln!("  Peak Utilization: {:.1}%", report.stakers.peak_utilization * 100.0);

    let inv = &report.investment;
    eprintln!("\nInvestment ({} years):", inv.years);
    eprintln!("  Year 1 Gross Revenue: ${:.2}", inv.first_year_gross_revenue);
    eprintln!("  Final Year Gross Revenue: ${:.2}", inv.final_year_gross_revenue);
    match inv.revenue_cagr {
        Some(cagr) => eprintln!("  Revenue CAGR: {:.1}%", cagr * 100.0),
        None => eprintln!("  Revenue CAGR: n/a"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_override() {
        assert_eq!(parse_override("growth_rate=0.1").unwrap(), ("growth_rate".to_string(), 0.1));
        assert_eq!(parse_override(" fee_rate = 0.2 ").unwrap(), ("fee_rate".to_string(), 0.2));
        assert!(parse_override("growth_rate").is_err());
        assert!(parse_override("growth_rate=fast").is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "microlend",
            "--periods",
            "24",
            "sensitivity",
            "--metric",
            "net_revenue",
            "--assumption",
            "yield_rate,fee_rate",
            "--set",
            "growth_rate=0.1",
        ])
        .unwrap();

        assert_eq!(cli.grid.periods, Some(24));
        match cli.command {
            Command::Sensitivity { scenario, assumptions, .. } => {
                assert_eq!(scenario.scenario, "base");
                assert_eq!(scenario.overrides, vec![("growth_rate".to_string(), 0.1)]);
                assert_eq!(assumptions, vec!["yield_rate".to_string(), "fee_rate".to_string()]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_periods_and_horizon_conflict() {
        assert!(Cli::try_parse_from(["microlend", "--periods", "12", "--horizon", "2026-01-01", "project"]).is_err());
    }

    #[test]
    fn test_unknown_scenario() {
        let args = ScenarioArgs {
            scenario: "sideways".to_string(),
            overrides: Vec::new(),
        };
        assert!(select(&Scenario::presets(), &args).is_err());
        assert!(matches!(
            find(&Scenario::presets(), "sideways"),
            Err(ProjectionError::UnknownScenario(_))
        ));
    }

    #[test]
    fn test_grid_args() {
        let args = GridArgs {
            start: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            cadence: Cadence::Quarterly,
            periods: None,
            horizon: Some(NaiveDate::from_ymd_opt(2026, 12, 31).unwrap()),
        };
        assert_eq!(args.build().unwrap().len(), 8);
    }
}
