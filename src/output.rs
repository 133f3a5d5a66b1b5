use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, RunSummary};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(result: &RunSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards pipeline progress to the tracing subscriber.
pub struct LogOutput;

impl ProgressSink for LogOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => {
                tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message)
            }
            None => tracing::info!("{}", event.message),
        }
    }
}

impl LogOutput {
    pub fn print_summary(result: &RunSummary) {
        println!(
            "run {} (#{}, {}): {} records from {} sample sheet(s)",
            result.run_folder,
            result.run_number,
            result.timestamp,
            result.records,
            result.sample_sheets.len()
        );
        for warning in &result.warnings {
            println!("  warning: {warning}");
        }
        match &result.csv_path {
            Some(path) => println!("  csv: {path}"),
            None => println!("  csv: not written"),
        }
        match &result.ledger_partition {
            Some(partition) => println!("  LIMS: appended to {partition}"),
            None => println!("  LIMS: not updated"),
        }
    }
}
