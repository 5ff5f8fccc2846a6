//! Robomission CLI: run predefined missions on the simulated robot.
//!
//! Results are written under the results root, one directory per mission.

// CLI-specific lint allowances (CLI binary, not library)
#![allow(missing_docs)]
#![allow(clippy::print_stdout)] // CLI must print to stdout
#![allow(clippy::print_stderr)] // CLI must print to stderr
#![allow(clippy::exit)] // CLI uses exit codes

use clap::{ArgAction, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use miette::{IntoDiagnostic, Result};
use robomission::mission_source::{MissionSource, PredefinedMissions};
use robomission::{
    ErrorInfo, Mission, MissionStatus, RejectionError, Service, Settings, SimulatedDriver,
    SimulationConfig,
};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

mod progress;

/// Exit code when the mission ran but did not succeed.
const EXIT_MISSION_FAILED: i32 = 1;
/// Exit code when the mission was refused or could not be loaded.
const EXIT_REJECTED: i32 = 2;
/// Exit code when the mission did not finish within `--timeout-secs`.
const EXIT_TIMEOUT: i32 = 3;

/// Color output mode
#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum ColorMode {
    /// Auto-detect based on terminal and `NO_COLOR` env
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

#[derive(Debug, Parser)]
#[command(name = "robomission", version, about = "Robot mission runner")]
struct Cli {
    /// Control color output
    #[arg(long, value_enum, default_value = "auto", global = true)]
    color: ColorMode,

    /// Increase log verbosity (-v info and progress, -vv debug)
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a predefined mission on the simulated robot
    Run {
        #[arg(long, help = "Predefined mission id (file stem in the missions folder)")]
        mission: String,
        #[arg(long, help = "Folder holding predefined mission definitions")]
        missions_dir: Option<PathBuf>,
        #[arg(long, help = "Root directory for inspection results")]
        results: Option<PathBuf>,
        #[arg(long, help = "Settings file (JSON or YAML)")]
        config: Option<PathBuf>,
        #[arg(long, default_value_t = 300, help = "Give up waiting after this many seconds")]
        timeout_secs: u64,
        #[arg(long, help = "Simulated time per task in milliseconds")]
        sim_task_ms: Option<u64>,
        #[arg(long)]
        json: bool,
    },
    /// Check that a predefined mission can be loaded and scheduled
    Validate {
        #[arg(long)]
        mission: String,
        #[arg(long)]
        missions_dir: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// List predefined missions
    List {
        #[arg(long)]
        missions_dir: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        #[arg(value_enum, help = "Shell to generate completions for")]
        shell: Shell,
    },
}

/// Configure color output based on CLI flag and environment
fn configure_colors(mode: ColorMode) {
    let use_color = match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => {
            if std::env::var("NO_COLOR").is_ok() {
                false
            } else {
                supports_color::on(supports_color::Stream::Stderr).is_some()
            }
        }
    };

    miette::set_hook(Box::new(move |_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .color(use_color)
                .unicode(use_color)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set
}

/// Install the stderr log subscriber. `RUST_LOG` takes precedence over `-v`.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "robomission=warn",
        1 => "robomission=info",
        _ => "robomission=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    configure_colors(cli.color);
    init_logging(cli.verbose);
    match cli.command {
        Commands::Run {
            mission,
            missions_dir,
            results,
            config,
            timeout_secs,
            sim_task_ms,
            json,
        } => {
            let mut settings = load_settings(config, missions_dir)?;
            if let Some(results) = results {
                settings.results_root = results;
            }
            let options = RunOptions {
                mission,
                timeout: Duration::from_secs(timeout_secs),
                sim_task: sim_task_ms.map(Duration::from_millis),
                json,
                progress: cli.verbose > 0 && !json,
            };
            cmd_run(&settings, &options)
        }
        Commands::Validate {
            mission,
            missions_dir,
            config,
            json,
        } => cmd_validate(&load_settings(config, missions_dir)?, &mission, json),
        Commands::List {
            missions_dir,
            config,
            json,
        } => cmd_list(&load_settings(config, missions_dir)?, json),
        Commands::Completions { shell } => cmd_completions(shell),
    }
}

/// Settings file, then `ROBOMISSION_*` environment, then flags.
fn load_settings(config: Option<PathBuf>, missions_dir: Option<PathBuf>) -> Result<Settings> {
    let settings = match config {
        Some(path) => Settings::load(&path)?,
        None => Settings::default(),
    };
    let mut settings = settings.with_env_overrides();
    if let Some(dir) = missions_dir {
        settings.predefined_missions_folder = dir;
    }
    Ok(settings)
}

// =============================================================================
// Command Handlers
// =============================================================================

struct RunOptions {
    mission: String,
    timeout: Duration,
    sim_task: Option<Duration>,
    json: bool,
    progress: bool,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    mission: Mission,
    results_dir: PathBuf,
    inspections_stored: usize,
    inspections_failed: usize,
    timed_out: bool,
}

fn cmd_run(settings: &Settings, options: &RunOptions) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;

    let interrupt = Arc::new(Notify::new());
    let on_interrupt = Arc::clone(&interrupt);
    ctrlc::set_handler(move || on_interrupt.notify_one()).into_diagnostic()?;

    let outcome = runtime.block_on(run_mission(settings, options, &interrupt))?;
    match outcome {
        Ok(summary) => emit_summary(options.json, &summary),
        Err(rejection) => emit_rejection(options.json, &rejection),
    }
}

async fn run_mission(
    settings: &Settings,
    options: &RunOptions,
    interrupt: &Notify,
) -> Result<std::result::Result<RunSummary, RejectionError>> {
    let mut sim = SimulationConfig::default();
    if let Some(task_duration) = options.sim_task {
        sim.task_duration = task_duration;
    }
    let driver = Arc::new(SimulatedDriver::new(sim));
    let service = Service::from_settings(settings, driver);
    let events = service.events().subscribe();

    let accepted = match service.scheduling().start_mission(&options.mission).await {
        Ok(accepted) => accepted,
        Err(rejection) => {
            service.shutdown().await;
            return Ok(Err(rejection));
        }
    };
    let id = accepted.mission_id;
    let progress = options
        .progress
        .then(|| tokio::spawn(progress::MissionProgress::new(id).follow(events)));

    let machine = service.machine().clone();
    let grace = settings.machine.stop_timeout() * settings.machine.stop_attempts.max(1)
        + Duration::from_secs(1);
    let mut timed_out = false;
    let finished = tokio::select! {
        finished = machine.wait_for_mission(id, options.timeout) => finished,
        () = interrupt.notified() => {
            eprintln!("interrupt received, stopping mission {}", id.short());
            let _ = service.scheduling().stop_mission().await;
            machine.wait_for_mission(id, grace).await
        }
    };
    let finished = match finished {
        Some(mission) => mission,
        None => {
            timed_out = true;
            eprintln!("mission {} did not finish in time, stopping it", id.short());
            let _ = service.scheduling().stop_mission().await;
            machine
                .wait_for_mission(id, grace)
                .await
                .or_else(|| machine.current_mission())
                .ok_or_else(|| miette::miette!("mission {id} disappeared from the state machine"))?
        }
    };

    let report = service.shutdown().await;
    if let Some(progress) = progress {
        let _ = progress.await;
    }
    Ok(Ok(RunSummary {
        results_dir: settings.results_root.join(id.to_string()),
        mission: finished,
        inspections_stored: report.stored,
        inspections_failed: report.failed,
        timed_out,
    }))
}

fn emit_summary(json: bool, summary: &RunSummary) -> Result<()> {
    let mission = &summary.mission;
    if json {
        let payload = serde_json::to_string(summary).into_diagnostic()?;
        println!("{payload}");
    } else {
        println!("mission {} ({}): {}", mission.name, mission.id, mission.status);
        for (index, task) in mission.tasks.iter().enumerate() {
            println!(
                "  {}. {} {} (attempts: {})",
                index + 1,
                task.kind.name(),
                task.status,
                task.attempts
            );
        }
        if let Some(error) = &mission.error {
            println!("  error: {}: {}", error.code, error.message);
        }
        println!(
            "inspections stored: {}, failed: {}",
            summary.inspections_stored, summary.inspections_failed
        );
        println!("results: {}", summary.results_dir.display());
    }
    if summary.timed_out {
        std::process::exit(EXIT_TIMEOUT);
    }
    if mission.status != MissionStatus::Successful {
        std::process::exit(EXIT_MISSION_FAILED);
    }
    Ok(())
}

fn emit_rejection(json: bool, rejection: &RejectionError) -> Result<()> {
    if json {
        let info = ErrorInfo::new(rejection.code(), rejection.to_string());
        let payload = serde_json::to_string(&info).into_diagnostic()?;
        println!("{payload}");
    } else {
        eprintln!("error: {rejection}");
    }
    std::process::exit(EXIT_REJECTED);
}

fn cmd_validate(settings: &Settings, id: &str, json: bool) -> Result<()> {
    let source = PredefinedMissions::new(settings.predefined_missions_folder.clone());
    let checked = source
        .load_mission(id)
        .map_err(RejectionError::from)
        .and_then(|mission| mission.validate().map(|()| mission));
    match checked {
        Ok(mission) => {
            if json {
                let payload = serde_json::json!({
                    "valid": true,
                    "id": id,
                    "name": mission.name,
                    "tasks": mission.tasks.iter().map(|t| t.kind.name()).collect::<Vec<_>>(),
                });
                println!("{payload}");
            } else {
                println!("{id}: ok ({} tasks)", mission.tasks.len());
            }
            Ok(())
        }
        Err(rejection) => emit_rejection(json, &rejection),
    }
}

fn cmd_list(settings: &Settings, json: bool) -> Result<()> {
    let source = PredefinedMissions::new(settings.predefined_missions_folder.clone());
    let missions = source.list_missions()?;
    if json {
        let payload = serde_json::to_string(&missions).into_diagnostic()?;
        println!("{payload}");
    } else if missions.is_empty() {
        eprintln!(
            "no missions in {}",
            settings.predefined_missions_folder.display()
        );
    } else {
        for mission in missions {
            println!("{}\t{}\t{} tasks", mission.id, mission.name, mission.tasks);
        }
    }
    Ok(())
}

fn cmd_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}
