//! # Output Configuration
//!
//! Decides whether the run summary is coloured.
//!
//! The following flags and environment variables are respected:
//! - `--color=never|always|auto` - global CLI flag
//! - `--no-colour` - download flag, same as `--color=never`
//! - `NO_COLOR` - disables colours when set (per https://no-color.org/)
//! - `CLICOLOR=0` - disables colours
//! - `CLICOLOR_FORCE=1` - forces colours even without a TTY
//! - `TERM=dumb` - disables colours
//!
//! ```rust,ignore
//! use bundle_sync::output::{paint, OutputConfig};
//!
//! let config = OutputConfig::from_env_and_flag("auto");
//! println!("{}", paint(&config, "Following projects ...").bold());
//! ```

use std::env;

use console::{style, StyledObject};

/// Output configuration for the run summary.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Whether ANSI colours should be emitted.
    pub use_color: bool,
}

impl OutputConfig {
    /// Create an output configuration from the environment and the
    /// `--color` flag value ("always", "never" or "auto").
    ///
    /// In auto mode, colours are disabled if `NO_COLOR` is set, `CLICOLOR=0`,
    /// `TERM=dumb`, or stdout is not a TTY (unless `CLICOLOR_FORCE=1`).
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };

        Self { use_color }
    }

    /// Like [`OutputConfig::from_env_and_flag`], with `--no-colour` taking
    /// precedence.
    pub fn from_flags(color_flag: &str, no_colour: bool) -> Self {
        if no_colour {
            Self { use_color: false }
        } else {
            Self::from_env_and_flag(color_flag)
        }
    }

    fn detect_color_support() -> bool {
        // Presence alone disables, even if empty
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }

        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }

        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }

        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }

        console::Term::stdout().features().colors_supported()
    }

    #[cfg(test)]
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    #[cfg(test)]
    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// Wrap `text` for styling; styles are only emitted when the configuration
/// allows colour.
pub fn paint<S: Into<String>>(config: &OutputConfig, text: S) -> StyledObject<String> {
    style(text.into()).force_styling(config.use_color)
}
