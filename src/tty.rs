use std::io::IsTerminal;

/// Check if stderr is connected to a TTY
pub fn is_stderr_tty() -> bool {
    std::io::stderr().is_terminal()
}

/// Decide whether diagnostics get emoji prefixes
pub fn should_use_emoji(no_emoji: bool) -> bool {
    if no_emoji {
        return false;
    }

    // Respect NO_EMOJI the way NO_COLOR is respected for colors
    if std::env::var("NO_EMOJI").is_ok() {
        return false;
    }

    is_stderr_tty()
}

/// Prefixes for user-facing stderr lines
#[derive(Debug, Clone, Copy)]
pub struct Prefixes {
    pub info: &'static str,
    pub error: &'static str,
}

impl Prefixes {
    pub fn new(use_emoji: bool) -> Self {
        if use_emoji {
            Self {
                info: "🔹",
                error: "⚠️",
            }
        } else {
            Self {
                info: "epdsift:",
                error: "epdsift:",
            }
        }
    }
}
