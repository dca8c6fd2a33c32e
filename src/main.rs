//! Study Timer CLI
//!
//! A study session stopwatch that keeps counting correctly across
//! restarts, sleeps and multiple clients:
//! - start / pause / resume / stop / reset a session
//! - a hard ceiling on session length
//! - an optional focus/break (Pomodoro) cycle
//! - reminders ahead of scheduled sessions

use anyhow::Result;
use clap::{CommandFactory, Parser};

use study_timer::cli::{
    Cli, Commands, CycleCommand, DaemonArgs, Display, IpcClient, ReminderCommand,
};
use study_timer::daemon::{run_daemon, DaemonOptions};
use study_timer::timer::{SystemTimeSource, TimeSource};
use study_timer::types::TimerIdentity;

/// Main entry point
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_tracing(cli.verbose);

    // Execute command
    if let Err(e) = execute(cli).await {
        Display::show_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber for logging.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

/// Executes the CLI command.
async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Start(args)) => {
            let client = IpcClient::new()?;
            let response = client.start(&args).await?;
            Display::show_start_success(&response);
        }
        Some(Commands::Pause) => {
            let client = IpcClient::new()?;
            let response = client.pause().await?;
            Display::show_pause_success(&response);
        }
        Some(Commands::Resume) => {
            let client = IpcClient::new()?;
            let response = client.resume().await?;
            Display::show_resume_success(&response);
        }
        Some(Commands::Stop) => {
            let client = IpcClient::new()?;
            let response = client.stop().await?;
            Display::show_stop_success(&response);
        }
        Some(Commands::Reset(args)) => {
            require_confirmation(args.yes)?;
            let client = IpcClient::new()?;
            let response = client.reset(true).await?;
            Display::show_reset_success(&response);
        }
        Some(Commands::Status) => {
            let client = IpcClient::new()?;
            let response = client.status().await?;
            Display::show_status(&response);
        }
        Some(Commands::Cycle { action }) => {
            let client = IpcClient::new()?;
            match action {
                CycleCommand::Start => {
                    let response = client.cycle_start().await?;
                    Display::show_cycle_start_success(&response);
                }
                CycleCommand::Reset(args) => {
                    require_confirmation(args.yes)?;
                    let response = client.cycle_reset(true).await?;
                    Display::show_cycle_reset_success(&response);
                }
            }
        }
        Some(Commands::Reminder { action }) => {
            let client = IpcClient::new()?;
            match action {
                ReminderCommand::Add(args) => {
                    let starts_at = args.starts_at_millis(SystemTimeSource.now_millis());
                    client.remind(&args.session_id, starts_at, args.lead).await?;
                    Display::show_reminder_added(&args.session_id, args.lead);
                }
                ReminderCommand::Cancel { session_id } => {
                    client.cancel_reminder(&session_id).await?;
                    Display::show_reminder_cancelled(&session_id);
                }
            }
        }
        Some(Commands::Daemon(args)) => {
            run_daemon(daemon_options(&args)?).await?;
        }
        Some(Commands::Completions { shell }) => {
            generate_completions(shell);
        }
        None => {
            // No command provided, show help
            Cli::command().print_help()?;
        }
    }

    Ok(())
}

/// Rejects destructive commands issued without `--yes`.
fn require_confirmation(confirmed: bool) -> Result<()> {
    if !confirmed {
        anyhow::bail!("リセットするには --yes を指定してください");
    }
    Ok(())
}

fn daemon_options(args: &DaemonArgs) -> Result<DaemonOptions> {
    let mut options = DaemonOptions::new(TimerIdentity::new(args.identity.clone()))?;
    options.timer = args.timer_config();
    options.cycle = args.cycle_config();
    Ok(options)
}

/// Generates shell completion scripts.
fn generate_completions(shell: clap_complete::Shell) {
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, &mut io::stdout());
}

// ============================================================================
// Tests
// ============================================================================
