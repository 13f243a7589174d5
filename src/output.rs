// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Normal mode prints colored lines, quiet mode only results, JSON mode one event per line.

use colored::Colorize;
use serde::Serialize;
use std::time::Instant;

use crate::diagnostics::Diagnostics;
use crate::provision::DiffReport;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    fn elapsed_secs(&self) -> Option<f64> {
        self.start_time.map(|t| t.elapsed().as_secs_f64())
    }

    fn emit_json(&self, event: &str, message: &str, stacks: Option<Vec<String>>) -> String {
        let event = JsonEvent {
            event,
            message,
            stacks,
            duration_secs: self.elapsed_secs(),
        };
        serde_json::to_string(&event).unwrap_or_default()
    }

    /// Progress message, suppressed in quiet and JSON mode.
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{} {message}", "→".dimmed());
        }
    }

    /// Final result; plain text (stdout) in normal and quiet mode.
    pub fn result(&self, text: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => println!("{text}"),
            OutputMode::Json => println!("{}", self.emit_json("result", text, None)),
        }
    }

    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => match self.elapsed_secs() {
                Some(elapsed) => println!("{} {message} ({elapsed:.1}s)", "✓".green().bold()),
                None => println!("{} {message}", "✓".green().bold()),
            },
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => println!("{}", self.emit_json("success", message, None)),
        }
    }

    /// Every collected warning, on stderr.
    pub fn warnings(&self, diagnostics: &Diagnostics) {
        for warning in diagnostics.warnings() {
            match self.mode {
                OutputMode::Normal | OutputMode::Quiet => {
                    eprintln!("{} {}", "warning:".yellow().bold(), warning.message);
                }
                OutputMode::Json => {
                    eprintln!("{}", self.emit_json("warning", &warning.message, None));
                }
            }
        }
    }

    /// Print a diff report, naming the stacks that changed.
    pub fn diff(&self, report: &DiffReport) {
        let changed: Vec<String> = report
            .changed_stacks()
            .into_iter()
            .map(ToString::to_string)
            .collect();
        match self.mode {
            OutputMode::Normal => print!("{report}"),
            OutputMode::Quiet => {
                for stack in &changed {
                    println!("{stack}");
                }
            }
            OutputMode::Json => {
                let message = if changed.is_empty() {
                    "no changes"
                } else {
                    "stacks changed"
                };
                println!("{}", self.emit_json("diff", message, Some(changed)));
            }
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                eprintln!("{} {message}", "Error:".red().bold());
            }
            OutputMode::Json => eprintln!("{}", self.emit_json("error", message, None)),
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stacks: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_events_skip_unset_fields() {
        let output = Output::new(OutputMode::Json);
        let line = output.emit_json("diff", "stacks changed", Some(vec!["etcd".into()]));
        assert_eq!(
            line,
            r#"{"event":"diff","message":"stacks changed","stacks":["etcd"]}"#
        );
        assert_eq!(
            output.emit_json("success", "done", None),
            r#"{"event":"success","message":"done"}"#
        );
    }
}
