use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use std::io::{self, BufRead, Write};
use std::process;
use std::sync::atomic::{AtomicI32, Ordering};
use std::thread;

#[cfg(unix)]
use signal_hook::{
    consts::{SIGINT, SIGTERM, SIGUSR1},
    iterator::Signals,
};

// Additional signal for status printing (Ctrl-T)
#[cfg(all(
    unix,
    any(
        target_os = "macos",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    )
))]
use signal_hook::consts::SIGINFO;

#[cfg(windows)]
use signal_hook::{consts::SIGINT, flag};

/// Standard Unix exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    InvalidUsage = 2,
    SignalInt = 130,  // 128 + SIGINT (2)
    SignalPipe = 141, // 128 + SIGPIPE (13)
    SignalTerm = 143, // 128 + SIGTERM (15)
}

impl ExitCode {
    pub fn exit(self) -> ! {
        process::exit(self as i32)
    }
}

/// Exit code to use once a signal-triggered stop has finished
static INTERRUPT_EXIT_CODE: AtomicI32 = AtomicI32::new(ExitCode::SignalInt as i32);

pub fn interrupt_exit_code() -> ExitCode {
    if INTERRUPT_EXIT_CODE.load(Ordering::Relaxed) == ExitCode::SignalTerm as i32 {
        ExitCode::SignalTerm
    } else {
        ExitCode::SignalInt
    }
}

/// Control messages from the signal handler and the stdin control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ctrl {
    /// SIGINT/SIGTERM; saving follows --save-on-interrupt
    Interrupt,
    Stop { save: bool },
    Pause,
    Resume,
    Status,
}

/// Parse one line of the stdin control channel
pub fn parse_control_command(line: &str) -> Option<Ctrl> {
    let words: Vec<String> = line
        .split_whitespace()
        .map(|w| w.to_ascii_lowercase())
        .collect();
    let words: Vec<&str> = words.iter().map(String::as_str).collect();
    match words.as_slice() {
        ["pause"] => Some(Ctrl::Pause),
        ["resume"] => Some(Ctrl::Resume),
        ["stop"] => Some(Ctrl::Stop { save: false }),
        ["stop", "save"] => Some(Ctrl::Stop { save: true }),
        ["status"] => Some(Ctrl::Status),
        _ => None,
    }
}

/// Read control commands from stdin until EOF
pub fn spawn_stdin_control(sender: Sender<Ctrl>) -> Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("epdsift-control".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_control_command(&line) {
                    Some(ctrl) => {
                        if sender.send(ctrl).is_err() {
                            break;
                        }
                    }
                    None => log::warn!("Unknown control command: {}", line.trim()),
                }
            }
        })
        .context("Failed to start stdin control thread")
}

/// Signal handler for cooperative shutdown
pub struct SignalHandler {
    _handle: thread::JoinHandle<()>,
}

impl SignalHandler {
    /// Initialize signal handling - cross-platform
    pub fn new(ctrl_sender: Sender<Ctrl>) -> Result<Self> {
        #[cfg(unix)]
        {
            #[allow(unused_mut)]
            let mut signals_to_handle = vec![SIGINT, SIGTERM, SIGUSR1];

            #[cfg(any(
                target_os = "macos",
                target_os = "freebsd",
                target_os = "openbsd",
                target_os = "netbsd",
                target_os = "dragonfly"
            ))]
            signals_to_handle.push(SIGINFO);

            let mut signals = Signals::new(&signals_to_handle)?;

            let handle = thread::spawn(move || {
                let mut interrupts = 0;
                for sig in signals.forever() {
                    match sig {
                        SIGINT | SIGTERM => {
                            let code = if sig == SIGTERM {
                                ExitCode::SignalTerm
                            } else {
                                ExitCode::SignalInt
                            };
                            INTERRUPT_EXIT_CODE.store(code as i32, Ordering::Relaxed);
                            interrupts += 1;
                            // A second signal means the user does not want to wait
                            if interrupts > 1 {
                                code.exit();
                            }
                            let _ = ctrl_sender.send(Ctrl::Interrupt);
                        }
                        _ => {
                            // SIGUSR1 and SIGINFO
                            let _ = ctrl_sender.send(Ctrl::Status);
                        }
                    }
                }
            });

            Ok(SignalHandler { _handle: handle })
        }

        #[cfg(windows)]
        {
            let interrupted = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
            flag::register(SIGINT, std::sync::Arc::clone(&interrupted))?;

            let handle = thread::spawn(move || {
                let mut interrupts = 0;
                loop {
                    thread::sleep(std::time::Duration::from_millis(100));
                    if interrupted.swap(false, Ordering::Relaxed) {
                        interrupts += 1;
                        if interrupts > 1 {
                            ExitCode::SignalInt.exit();
                        }
                        let _ = ctrl_sender.send(Ctrl::Interrupt);
                    }
                }
            });

            Ok(SignalHandler { _handle: handle })
        }
    }
}

/// Stdout writer that exits quietly on a broken pipe
pub struct SafeStdout {
    stdout: io::Stdout,
}

impl Default for SafeStdout {
    fn default() -> Self {
        Self::new()
    }
}

impl SafeStdout {
    pub fn new() -> Self {
        Self {
            stdout: io::stdout(),
        }
    }

    /// Write one line and flush, so consumers see each event immediately
    pub fn writeln(&mut self, data: &str) -> Result<()> {
        let mut lock = self.stdout.lock();
        let written = writeln!(lock, "{}", data).and_then(|()| lock.flush());
        match written {
            Ok(()) => Ok(()),
            Err(e) if is_broken_pipe(&e) => ExitCode::SignalPipe.exit(),
            Err(e) => Err(anyhow::anyhow!("Failed to write to stdout: {}", e)),
        }
    }
}

/// Cross-platform broken pipe detection
fn is_broken_pipe(e: &io::Error) -> bool {
    #[cfg(windows)]
    {
        // ERROR_NO_DATA and ERROR_BROKEN_PIPE
        e.kind() == io::ErrorKind::BrokenPipe
            || e.raw_os_error() == Some(232)
            || e.raw_os_error() == Some(109)
    }
    #[cfg(not(windows))]
    {
        e.kind() == io::ErrorKind::BrokenPipe
    }
}
