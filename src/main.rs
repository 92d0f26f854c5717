use anyhow::Result;
use clap::{CommandFactory, FromArgMatches};
use crossbeam_channel::{unbounded, Receiver};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::thread;

use epdsift::{ExtractError, Extractor, ProgressEvent, RunOutcome};

mod cli;
mod config_file;
mod platform;
mod tty;

use cli::{Cli, ProgressFormat};
use config_file::ConfigFile;
use platform::{Ctrl, ExitCode, SafeStdout, SignalHandler};
use tty::Prefixes;

/// Most recent progress event, for `status` requests
type LastEvent = Arc<Mutex<Option<ProgressEvent>>>;

fn main() -> Result<()> {
    let cli = process_args_with_config();
    init_logging(&cli);
    let prefixes = Prefixes::new(tty::should_use_emoji(cli.no_emoji));

    if cli.show_config {
        print!("{}", ConfigFile::describe());
        ExitCode::Success.exit();
    }

    if let Some(path) = &cli.config_file {
        log::debug!("Using configuration file '{}'", path);
    }
    if cli.ignore_config && !cli.alias.is_empty() {
        eprintln!(
            "{} Aliases ignored because of --ignore-config: {}",
            prefixes.error,
            cli.alias.join(", ")
        );
    }

    let Some(settings) = cli.to_settings() else {
        eprintln!("{} Error: no input PGN file given", prefixes.error);
        eprintln!("{}", Cli::command().render_usage());
        ExitCode::InvalidUsage.exit();
    };

    // Control channel fed by signals and, optionally, stdin
    let (ctrl_tx, ctrl_rx) = unbounded::<Ctrl>();
    let _signal_handler = match SignalHandler::new(ctrl_tx.clone()) {
        Ok(handler) => handler,
        Err(e) => {
            eprintln!("{} Failed to initialize signal handling: {}", prefixes.error, e);
            ExitCode::GeneralError.exit();
        }
    };
    if cli.control_stdin {
        if let Err(e) = platform::spawn_stdin_control(ctrl_tx.clone()) {
            eprintln!("{} {:#}", prefixes.error, e);
            ExitCode::GeneralError.exit();
        }
    }
    drop(ctrl_tx);

    if !cli.quiet {
        eprintln!(
            "{} Creating EPD suite from '{}'",
            prefixes.info,
            settings.input_file.display()
        );
        for line in settings.describe() {
            eprintln!("{}   {}", prefixes.info, line);
        }
    }

    let extractor = Arc::new(Extractor::new());
    let events = match extractor.start(settings) {
        Ok(events) => events,
        Err(e) => {
            eprintln!("{} Error: {}", prefixes.error, e);
            match e {
                ExtractError::Config(_) => ExitCode::InvalidUsage.exit(),
                _ => ExitCode::GeneralError.exit(),
            }
        }
    };

    let last_event: LastEvent = Arc::new(Mutex::new(None));
    {
        let extractor = Arc::clone(&extractor);
        let last_event = Arc::clone(&last_event);
        let save_on_interrupt = cli.save_on_interrupt;
        thread::Builder::new()
            .name("epdsift-ctrl".to_string())
            .spawn(move || {
                control_loop(ctrl_rx, &extractor, &last_event, save_on_interrupt, prefixes)
            })?;
    }

    report_progress(&events, &cli, &last_event)?;

    let exit_code = match extractor.wait() {
        Some(Ok(outcome)) => {
            if cli.stats && !cli.quiet {
                eprintln!("{} {}", prefixes.info, outcome.summary().format_stats());
            }
            exit_code_for(&outcome)
        }
        Some(Err(e)) => {
            // Already reported through the terminal event unless progress is hidden
            if cli.quiet || cli.progress == ProgressFormat::None {
                eprintln!("{} Error: {}", prefixes.error, e);
            }
            ExitCode::GeneralError
        }
        None => ExitCode::GeneralError,
    };
    exit_code.exit();
}

fn exit_code_for(outcome: &RunOutcome) -> ExitCode {
    if outcome.is_user_stop() {
        platform::interrupt_exit_code()
    } else {
        ExitCode::Success
    }
}

/// Print events until the terminal one arrives
fn report_progress(events: &Receiver<ProgressEvent>, cli: &Cli, last_event: &LastEvent) -> Result<()> {
    let mut stdout = SafeStdout::new();
    for event in events.iter() {
        if !cli.quiet {
            match cli.progress {
                ProgressFormat::Text => {
                    let mut stderr = std::io::stderr().lock();
                    let _ = writeln!(stderr, "{}", event.to_text());
                }
                ProgressFormat::Json => stdout.writeln(&serde_json::to_string(&event)?)?,
                ProgressFormat::None => {}
            }
        }

        let terminal = event.terminal;
        if let Ok(mut last) = last_event.lock() {
            *last = Some(event);
        }
        if terminal {
            break;
        }
    }
    Ok(())
}

fn control_loop(
    ctrl_rx: Receiver<Ctrl>,
    extractor: &Extractor,
    last_event: &LastEvent,
    save_on_interrupt: bool,
    prefixes: Prefixes,
) {
    for ctrl in ctrl_rx.iter() {
        match ctrl {
            Ctrl::Interrupt => {
                let action = if save_on_interrupt { "saving" } else { "discarding" };
                eprintln!(
                    "{} Interrupted, stopping workers and {} results (repeat to exit now)",
                    prefixes.info, action
                );
                extractor.stop(save_on_interrupt);
            }
            Ctrl::Stop { save } => extractor.stop(save),
            Ctrl::Pause => extractor.pause(),
            Ctrl::Resume => extractor.resume(),
            Ctrl::Status => {
                let progress = last_event
                    .lock()
                    .ok()
                    .and_then(|last| last.as_ref().map(|e| e.progress))
                    .unwrap_or(0);
                eprintln!(
                    "{} Status: {} ({}%)",
                    prefixes.info,
                    extractor.status(),
                    progress
                );
            }
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = cli.log_level().to_string();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn extract_config_file_arg(args: &[String]) -> Option<String> {
    args.windows(2)
        .find(|pair| pair[0] == "--config-file")
        .map(|pair| pair[1].clone())
}

/// Parse arguments after applying config file defaults and aliases
fn process_args_with_config() -> Cli {
    let raw_args: Vec<String> = std::env::args().collect();
    let config_file_path = extract_config_file_arg(&raw_args);
    let ignore_config = raw_args.iter().any(|arg| arg == "--ignore-config");

    let processed_args = if ignore_config || raw_args.iter().any(|arg| arg == "--show-config") {
        raw_args
    } else {
        match ConfigFile::load_with_custom_path(config_file_path.as_deref()) {
            Ok(config_file) => match config_file.process_args(raw_args) {
                Ok(processed) => processed,
                Err(e) => {
                    eprintln!("epdsift: Config error: {:#}", e);
                    ExitCode::GeneralError.exit();
                }
            },
            Err(e) => {
                eprintln!("epdsift: Config file error: {:#}", e);
                ExitCode::GeneralError.exit();
            }
        }
    };

    let matches = Cli::command().get_matches_from(processed_args);
    match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    }
}
