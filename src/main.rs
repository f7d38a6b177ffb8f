use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::info;
use sched_sim::{
    PolicyKind, Sim, Workload,
    core::{Compat, Priority, Ticks},
    scheduler::SchedulerConfig,
    sim::{Synthetic, bernoulli_tasks},
};

/// Discrete-tick CPU scheduling simulator.
///
/// Runs a workload under FCFS, SRTF, PRIOP or PRIOPEnv and reports mean
/// turnaround and waiting time.
#[derive(Debug, Parser)]
struct Opts {
    /// Workload file (line format, or JSON when it ends in .json).
    workload: Option<PathBuf>,

    /// Generate a synthetic workload instead of loading one.
    #[clap(long, conflicts_with = "workload")]
    random: bool,

    /// Seed for --random.
    #[clap(long, default_value = "0")]
    seed: u64,

    /// Ticks over which --random spawns tasks.
    #[clap(long, default_value = "20")]
    ticks: Ticks,

    /// Per-tick arrival probability for --random.
    #[clap(long, default_value = "0.3")]
    p_arrival: f64,

    /// Override the workload's scheduling policy (FCFS, SRTF, PRIOP, PRIOPEnv).
    #[clap(short = 'p', long)]
    policy: Option<PolicyKind>,

    /// Override the quantum; 0 disables it.
    #[clap(short = 'q', long)]
    quantum: Option<Ticks>,

    /// Override the PRIOPEnv aging increment.
    #[clap(short = 'a', long)]
    aging: Option<Priority>,

    /// Abort once this many ticks pass with tasks still live.
    #[clap(long, default_value = "100000")]
    max_ticks: Ticks,

    /// Print the report as JSON.
    #[clap(long)]
    json: bool,

    /// Enable verbose output, including per-tick events. Specify multiple
    /// times to increase verbosity.
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn load_workload(opts: &Opts) -> Result<Workload> {
    let mut workload = match (&opts.workload, opts.random) {
        (Some(path), _) => Workload::load(path)
            .with_context(|| format!("Failed to load workload {}", path.display()))?,
        (None, true) => {
            let params = Synthetic {
                ticks: opts.ticks,
                p_arrival: opts.p_arrival,
                ..Synthetic::default()
            };
            Workload {
                config: SchedulerConfig {
                    policy: PolicyKind::Fcfs,
                    quantum: 0,
                    aging: 1,
                },
                compat: Compat::default(),
                tasks: bernoulli_tasks(&params, opts.seed),
            }
        }
        (None, false) => bail!("Either a workload file or --random is required"),
    };

    if let Some(policy) = opts.policy {
        workload.config.policy = policy;
    }
    if let Some(quantum) = opts.quantum {
        workload.config.quantum = quantum;
    }
    if let Some(aging) = opts.aging {
        workload.config.aging = aging;
    }
    Ok(workload)
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    let loglevel = match opts.verbose {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };
    let mut lcfg = simplelog::ConfigBuilder::new();
    lcfg.set_time_level(simplelog::LevelFilter::Error)
        .set_location_level(simplelog::LevelFilter::Off)
        .set_target_level(simplelog::LevelFilter::Off)
        .set_thread_level(simplelog::LevelFilter::Off);
    simplelog::TermLogger::init(
        loglevel,
        lcfg.build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )?;

    let workload = load_workload(&opts)?;
    info!(
        "{} quantum={} aging={} tasks={}",
        workload.config.policy,
        workload.config.quantum,
        workload.config.aging,
        workload.tasks.len()
    );

    let mut sim = Sim::new(workload)?.with_tick_limit(opts.max_ticks);
    let report = sim.run()?;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for task in &report.tasks {
        println!(
            "{:>8} arrival={:<4} stop={:<4} waited={:<4} longest_wait={}",
            task.id,
            task.arrival,
            task.stop.unwrap_or_default(),
            task.waiting_time,
            task.longest_starvation
        );
    }
    println!("Tt = {:.2} ticks", report.turnaround_time);
    println!("Tw = {:.2} ticks", report.waiting_time);
    println!("Longest starvation period: {} ticks", report.longest_starvation);
    Ok(())
}
