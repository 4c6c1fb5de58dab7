use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use arcemu_core::logging::{LogCategory, LogConfig, LogLevel};
use clap::Parser;

mod machine;

use machine::MachineConfig;

#[derive(Parser)]
#[command(name = "arcemu", about = "Run a JSON-described multi-CPU machine headless")]
struct Args {
    /// Machine description (JSON)
    machine: PathBuf,

    /// Number of frames to run
    #[arg(long, default_value_t = 60)]
    frames: u32,

    /// Restore this save state before running
    #[arg(long)]
    load: Option<PathBuf>,

    /// Dump the machine save state to this file as JSON
    #[arg(long)]
    save: Option<PathBuf>,

    /// Global core log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Per-category core log level, e.g. `bus=debug` (repeatable)
    #[arg(long = "log", value_name = "CATEGORY=LEVEL")]
    log_categories: Vec<String>,

    /// Trace every instruction (core CPU category at trace level)
    #[arg(long, default_value_t = false)]
    log_cpu: bool,

    /// Send core log output to a file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Suppress the per-unit summary
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

fn parse_level(s: &str) -> Result<LogLevel> {
    match LogLevel::from_str(s) {
        Some(level) => Ok(level),
        None => bail!("unknown log level {:?}", s),
    }
}

fn configure_core_logging(args: &Args) -> Result<()> {
    let config = LogConfig::global();
    config.set_global_level(parse_level(&args.log_level)?);
    for entry in &args.log_categories {
        let Some((cat, level)) = entry.split_once('=') else {
            bail!("expected CATEGORY=LEVEL, got {:?}", entry);
        };
        let Some(category) = LogCategory::from_name(cat) else {
            bail!("unknown log category {:?}", cat);
        };
        config.set_level(category, parse_level(level)?);
    }
    if args.log_cpu {
        config.set_level(LogCategory::CPU, LogLevel::Trace);
    }
    if let Some(path) = &args.log_file {
        config
            .set_log_file(path.clone())
            .with_context(|| format!("opening log file {}", path.display()))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    configure_core_logging(&args)?;

    let cfg = MachineConfig::from_path(&args.machine)?;
    let base_dir = args.machine.parent().unwrap_or(Path::new("."));
    let mut machine = cfg.build(base_dir)?;
    let sched = &mut machine.scheduler;

    if let Some(path) = &args.load {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading save state {}", path.display()))?;
        let state: serde_json::Value = serde_json::from_str(&text)?;
        sched
            .load_state(&state)
            .with_context(|| format!("restoring {}", path.display()))?;
        log::info!("restored state at frame {}", sched.frame());
    }

    for _ in 0..args.frames {
        sched.run_frame();
    }
    log::info!("ran {} frames, master tick {}", args.frames, sched.now());

    if !args.quiet {
        for unit in &cfg.units {
            let id = sched.find(&unit.device.name)?;
            let cpu = sched.unit(id)?;
            println!(
                "{:<12} {:>6} pc={:06X} cycles={} state={:?}",
                cpu.name(),
                unit.device.isa.label(),
                cpu.pc(),
                cpu.total_cycles(),
                cpu.run_state()
            );
        }
    }

    if let Some(path) = &args.save {
        let state = sched.save_state();
        let mut f = File::create(path)
            .with_context(|| format!("creating save state {}", path.display()))?;
        write!(f, "{}", serde_json::to_string_pretty(&state)?)?;
    }

    Ok(())
}
