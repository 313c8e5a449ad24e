//! dvp-sim: DvP settlement network simulator
//!
//! Seeds a random population of institutions, streams instruction pairs at
//! them over a configurable number of business days and prints settlement
//! efficiency at the end. Runs are reproducible from the seed.

use anyhow::{Context, Result};
use clap::Parser;
use dvp_settlement_core::{
    EfficiencyReport, EngineConfig, EventRecord, SettlementEngine, SettlementPhase,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

mod rng;
mod workload;

use workload::{WorkloadConfig, WorkloadGenerator};

#[derive(Parser)]
#[command(name = "dvp-sim", version, about = "DvP securities settlement network simulator")]
struct Cli {
    /// Business days to simulate
    #[arg(long, default_value_t = 5)]
    days: usize,

    /// Ticks per business day
    #[arg(long, default_value_t = 100)]
    ticks_per_day: usize,

    /// Tick-within-day at which trading closes
    #[arg(long, default_value_t = 80)]
    trading_close_tick: usize,

    /// Tick-within-day at which the batch window opens
    #[arg(long, default_value_t = 90)]
    batch_start_tick: usize,

    /// Instructions older than this many ticks are cancelled
    #[arg(long, default_value_t = 250)]
    timeout_ticks: usize,

    /// Minimum settleable slice for a partial split (cents)
    #[arg(long, default_value_t = 100_00)]
    min_settlement_amount: i64,

    /// Number of institutions to seed
    #[arg(long, default_value_t = 10)]
    institutions: usize,

    /// Per-institution, per-tick probability of submitting a pair
    #[arg(long, default_value_t = 0.5)]
    pair_probability: f64,

    /// RNG seed; same seed, same run
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Write the full event log as CSV
    #[arg(long)]
    events_csv: Option<PathBuf>,

    /// Write the efficiency report as JSON
    #[arg(long)]
    report_json: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = EngineConfig {
        ticks_per_day: cli.ticks_per_day,
        trading_open_tick: 0,
        trading_close_tick: cli.trading_close_tick,
        batch_start_tick: cli.batch_start_tick,
        timeout_ticks: cli.timeout_ticks,
        min_settlement_amount: cli.min_settlement_amount,
    };
    let mut engine = SettlementEngine::new(config).context("engine configuration rejected")?;

    let mut workload = WorkloadGenerator::new(
        cli.seed,
        WorkloadConfig {
            institutions: cli.institutions,
            pair_probability: cli.pair_probability,
            ..WorkloadConfig::default()
        },
    );
    workload
        .seed_institutions(&mut engine)
        .context("seeding institutions failed")?;

    let mut settled = 0usize;
    let mut partially_settled = 0usize;
    let mut matched = 0usize;
    let mut timed_out = 0usize;

    let total_ticks = cli.days * cli.ticks_per_day;
    for _ in 0..total_ticks {
        if engine.clock().phase() == SettlementPhase::Trading {
            workload
                .step(&mut engine)
                .context("workload submission rejected")?;
        }
        let result = engine.tick();
        settled += result.settled;
        partially_settled += result.partially_settled;
        matched += result.matched;
        timed_out += result.timed_out;
    }

    let report = EfficiencyReport::compute(engine.state());

    println!("run: {} days x {} ticks, seed {}", cli.days, cli.ticks_per_day, cli.seed);
    println!("pairs submitted:       {}", workload.submitted);
    println!("pairs matched:         {}", matched);
    println!("settlements:           {}", settled);
    println!("  of which partial:    {}", partially_settled);
    println!("timeouts:              {}", timed_out);
    println!(
        "instruction efficiency: {:.2}% ({}/{} pairs fully settled)",
        report.instruction_efficiency_pct, report.fully_settled_pairs, report.total_pairs
    );
    println!(
        "value efficiency:       {:.2}% ({} of {} cents moved)",
        report.value_efficiency_pct, report.settled_value, report.intended_value
    );

    if let Some(path) = &cli.events_csv {
        write_events_csv(path, engine.events().records())
            .with_context(|| format!("writing event log to {}", path.display()))?;
    }
    if let Some(path) = &cli.report_json {
        let file = File::create(path)
            .with_context(|| format!("creating report file {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &report)
            .context("serializing efficiency report")?;
    }

    Ok(())
}

fn write_events_csv(path: &PathBuf, records: &[EventRecord]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "tick,subject_id,is_settlement,message")?;
    for record in records {
        writeln!(
            writer,
            "{},{},{},\"{}\"",
            record.tick,
            record.subject_id,
            record.is_settlement,
            record.message.replace('"', "\"\"")
        )?;
    }
    writer.flush()?;
    Ok(())
}
