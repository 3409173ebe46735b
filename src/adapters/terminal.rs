//! Terminal notifier sink
//!
//! Default breach output: one bordered panel per dispatch, one line per
//! breach, colored by severity when stdout is a terminal.

use std::io::IsTerminal;

use crate::domain::rules::{BreachLevel, RuleBreach};
use crate::ports::notifier::NotifierSink;

const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

pub struct TerminalSink {
    color: bool,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self {
            color: std::io::stdout().is_terminal(),
        }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("{code}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn render(&self, account_label: &str, breaches: &[RuleBreach]) -> String {
        // Plain rows first so the border width ignores color escapes.
        let mut rows = vec![account_label.to_string()];
        for breach in breaches {
            rows.push(format!("{} {} - {}", breach.level, breach.code, breach.message));
        }
        let width = rows.iter().map(String::len).max().unwrap_or(0);

        let mut out = String::new();
        out.push_str(&format!("┌{}┐\n", "─".repeat(width + 2)));
        for (i, row) in rows.iter().enumerate() {
            let padding = " ".repeat(width - row.len());
            let painted = if i == 0 {
                self.paint(BOLD, row)
            } else {
                match breaches[i - 1].level {
                    BreachLevel::Hard => self.paint(RED, row),
                    BreachLevel::Warn => self.paint(YELLOW, row),
                }
            };
            out.push_str(&format!("│ {painted}{padding} │\n"));
        }
        out.push_str(&format!("└{}┘", "─".repeat(width + 2)));
        out
    }
}

impl Default for TerminalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifierSink for TerminalSink {
    fn name(&self) -> &str {
        "terminal"
    }

    fn notify(&self, account_label: &str, breaches: &[RuleBreach]) {
        if breaches.is_empty() {
            return;
        }
        println!("{}", self.render(account_label, breaches));
    }
}
