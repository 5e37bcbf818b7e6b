//! Terminal rendering of core UI output

use appctl_core::Ui;
use colored::Colorize;

/// Writes text to stdout and warnings to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalUi;

impl Ui for TerminalUi {
    fn display_text(&self, text: &str) {
        println!("{}", text);
    }

    fn display_warning(&self, warning: &str) {
        eprintln!("{}", warning.yellow());
    }

    fn display_ok(&self) {
        println!("{}", "OK".green().bold());
    }
}
