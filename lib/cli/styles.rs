use clap::builder::styling::{AnsiColor, Effects, Style, Styles};
use std::fmt::Write;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

#[cfg(not(test))]
/// Global flag indicating whether we're in an ANSI-capable interactive terminal
static IS_ANSI_TERMINAL: std::sync::LazyLock<bool> =
    std::sync::LazyLock::new(is_ansi_interactive_terminal);

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns a `Styles` object with the default styles for the CLI.
pub fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default())
        .error(AnsiColor::Red.on_default() | Effects::BOLD)
        .valid(AnsiColor::Green.on_default() | Effects::BOLD)
        .invalid(AnsiColor::Red.on_default() | Effects::BOLD)
}

/// Whether stdout is an interactive terminal that understands ANSI codes.
#[cfg(not(test))]
fn is_ansi_interactive_terminal() -> bool {
    use std::io::IsTerminal;

    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var("TERM").unwrap_or_default() == "dumb" {
        return false;
    }
    std::io::stdout().is_terminal()
}

/// Helper function to apply a style to text
fn apply_style(text: String, style: &Style) -> String {
    #[cfg(not(test))]
    if !*IS_ANSI_TERMINAL {
        return text;
    }

    #[cfg(test)]
    {
        if std::env::var("TERM").unwrap_or_default() == "dumb" {
            return text;
        }
    }

    let mut styled = String::with_capacity(text.len() + 20); // Reserve extra space for ANSI codes
    let _ = write!(styled, "{}", style);
    styled.push_str(&text);
    let _ = write!(styled, "{}", style.render_reset());
    styled
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// A trait for applying Styles defined in [`styles`] to text.
pub trait AnsiStyles {
    /// Apply header style to text
    fn header(&self) -> String;

    /// Apply usage style to text
    fn usage(&self) -> String;

    /// Apply literal style to text
    fn literal(&self) -> String;

    /// Apply placeholder style to text
    fn placeholder(&self) -> String;

    /// Apply error style to text
    fn error(&self) -> String;

    /// Apply valid style to text
    fn valid(&self) -> String;

    /// Apply invalid style to text
    fn invalid(&self) -> String;
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl AnsiStyles for String {
    fn header(&self) -> String {
        apply_style(self.clone(), styles().get_header())
    }

    fn usage(&self) -> String {
        apply_style(self.clone(), styles().get_usage())
    }

    fn literal(&self) -> String {
        apply_style(self.clone(), styles().get_literal())
    }

    fn placeholder(&self) -> String {
        apply_style(self.clone(), styles().get_placeholder())
    }

    fn error(&self) -> String {
        apply_style(self.clone(), styles().get_error())
    }

    fn valid(&self) -> String {
        apply_style(self.clone(), styles().get_valid())
    }

    fn invalid(&self) -> String {
        apply_style(self.clone(), styles().get_invalid())
    }
}

impl AnsiStyles for &str {
    fn header(&self) -> String {
        self.to_string().header()
    }

    fn usage(&self) -> String {
        self.to_string().usage()
    }

    fn literal(&self) -> String {
        self.to_string().literal()
    }

    fn placeholder(&self) -> String {
        self.to_string().placeholder()
    }

    fn error(&self) -> String {
        self.to_string().error()
    }

    fn valid(&self) -> String {
        self.to_string().valid()
    }

    fn invalid(&self) -> String {
        self.to_string().invalid()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[ignore = "this test won't work correctly in cargo-nextest. run with `cargo test -- --ignored`"]
    #[serial]
    fn test_ansi_styles_non_interactive() {
        helper::setup_non_interactive();

        let text = String::from("test");
        assert_eq!(text.header(), "test");
        assert_eq!(text.literal(), "test");
        assert_eq!(text.error(), "test");
        assert_eq!(text.valid(), "test");
    }

    #[test]
    #[ignore = "this test won't work correctly in cargo-nextest. run with `cargo test -- --ignored`"]
    #[serial]
    fn test_ansi_styles_interactive() {
        helper::setup_interactive();

        let error = "test".error();
        assert!(error.contains("\x1b[1m"));
        assert!(error.contains("\x1b[31m"));
        assert!(error.contains("test"));
        assert!(error.contains("\x1b[0m"));

        let valid = "test".valid();
        assert!(valid.contains("\x1b[32m"));
        assert!(valid.ends_with("\x1b[0m"));
    }
}
