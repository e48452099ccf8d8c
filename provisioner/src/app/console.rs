//! Terminal rendering of run status and progress

use std::io::{self, Write};
use std::sync::Mutex;

use colored::Colorize;

use crate::observer::RunObserver;

/// Prints status lines and a progress percentage to stdout
#[derive(Debug, Default)]
pub struct ConsoleObserver {
    // last whole percentage printed, to avoid repeating identical lines
    last_percent: Mutex<Option<u32>>,
}

impl ConsoleObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunObserver for ConsoleObserver {
    fn on_status(&self, message: &str) {
        let line = if message.contains("failed") {
            message.red().bold().to_string()
        } else if message.contains("completed") {
            message.green().bold().to_string()
        } else {
            message.to_string()
        };
        println!("{}", line);
    }

    fn on_progress(&self, percent: f64) {
        let whole = percent.clamp(0.0, 100.0).round() as u32;
        if let Ok(mut last) = self.last_percent.lock() {
            if *last == Some(whole) {
                return;
            }
            *last = Some(whole);
        }
        println!("{}", format!("[{:>3}%]", whole).cyan());
        let _ = io::stdout().flush();
    }
}
