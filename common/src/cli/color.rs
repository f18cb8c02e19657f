//! Standardized CLI color policy.
//!
//! Mirrors common Rust tool behavior:
//! - Command-line choice wins.
//! - `NO_COLOR` disables colors, `CLICOLOR_FORCE` enables them.
//! - `EMACS` implies non-interactive output.
//! - In `Auto`, only enable colors when the target stream is a TTY.

use std::env;

/// When to emit ANSI colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorWhen {
    /// Enable colors only when output is a TTY.
    #[default]
    Auto,

    /// Always enable colors.
    Always,

    /// Never enable colors.
    Never,
}

/// Snapshot of the environment inputs the colour decision depends on.
#[derive(Debug, Clone, Copy, Default)]
struct ColorEnv {
    no_color: bool,
    force: bool,
    emacs: bool,
    is_tty: bool,
}

impl ColorEnv {
    fn capture(stream: atty::Stream) -> Self {
        // ---
        Self {
            no_color: env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty()),
            force: env::var_os("CLICOLOR_FORCE").is_some_and(|v| v != "0"),
            emacs: env::var_os("EMACS").is_some(),
            is_tty: atty::is(stream),
        }
    }
}

impl ColorWhen {
    // ---
    /// Returns whether ANSI color should be used for the given stream.
    pub fn should_color(self, stream: atty::Stream) -> bool {
        self.resolve(ColorEnv::capture(stream))
    }

    /// Colour decision for stderr, where logs are written.
    pub fn should_color_stderr(self) -> bool {
        self.should_color(atty::Stream::Stderr)
    }

    fn resolve(self, env: ColorEnv) -> bool {
        match self {
            ColorWhen::Always => true,
            ColorWhen::Never => false,
            ColorWhen::Auto => {
                if env.no_color || env.emacs {
                    return false;
                }
                env.force || env.is_tty
            }
        }
    }
}
