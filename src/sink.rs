use std::fmt;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use serde::Serialize;

use crate::error::LimsError;
use crate::record::{COLUMN_HEADERS, LimsRecord};
use crate::sheets::SheetsClient;

pub const CSV_DELIMITER: u8 = b',';
pub const CSV_QUOTE: u8 = b'|';

/// Default CSV file name for a run.
pub fn csv_file_name(run_folder: &str) -> String {
    format!("{run_folder}-lims-sheet.csv")
}

/// Writes the header and one row per record to `path`, replacing any
/// existing file. The file is staged next to the target and renamed into
/// place.
pub fn write_csv<'a, I>(path: &Utf8Path, records: I) -> Result<(), LimsError>
where
    I: IntoIterator<Item = &'a LimsRecord>,
{
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| LimsError::Filesystem(err.to_string()))?;
    let temp = tempfile::Builder::new()
        .prefix("lims-sheet")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| LimsError::Filesystem(err.to_string()))?;

    {
        let mut writer = WriterBuilder::new()
            .delimiter(CSV_DELIMITER)
            .quote(CSV_QUOTE)
            .quote_style(QuoteStyle::Necessary)
            .from_writer(temp.as_file());
        writer
            .write_record(COLUMN_HEADERS)
            .map_err(|err| LimsError::Csv(err.to_string()))?;
        for record in records {
            writer
                .write_record(record.to_row())
                .map_err(|err| LimsError::Csv(err.to_string()))?;
        }
        writer
            .flush()
            .map_err(|err| LimsError::Filesystem(err.to_string()))?;
    }

    temp.persist(path.as_std_path())
        .map_err(|err| LimsError::Filesystem(err.to_string()))?;
    Ok(())
}

/// Reads a file produced by [`write_csv`], checking the header.
pub fn read_csv(path: &Utf8Path) -> Result<Vec<LimsRecord>, LimsError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(CSV_DELIMITER)
        .quote(CSV_QUOTE)
        .has_headers(true)
        .from_path(path.as_std_path())
        .map_err(|err| LimsError::Csv(format!("{path}: {err}")))?;
    let headers = reader
        .headers()
        .map_err(|err| LimsError::Csv(err.to_string()))?;
    if !headers.iter().eq(COLUMN_HEADERS.iter().copied()) {
        return Err(LimsError::Csv(format!("{path}: unexpected header row")));
    }

    reader
        .records()
        .map(|row| {
            let row = row.map_err(|err| LimsError::Csv(err.to_string()))?;
            let cells = row.iter().map(str::to_string).collect::<Vec<_>>();
            LimsRecord::from_row(&cells)
        })
        .collect()
}

/// Ledger tab receiving the rows of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LedgerPartition {
    Runs,
    FailedRuns,
}

impl LedgerPartition {
    pub fn for_run(failed_run: bool) -> Self {
        if failed_run {
            LedgerPartition::FailedRuns
        } else {
            LedgerPartition::Runs
        }
    }

    pub fn sheet_name(&self) -> &'static str {
        match self {
            LedgerPartition::Runs => "Sheet1",
            LedgerPartition::FailedRuns => "Failed Runs",
        }
    }
}

impl fmt::Display for LedgerPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sheet_name())
    }
}

/// The shared LIMS ledger. An append either stores the whole batch or
/// fails.
pub trait LedgerClient {
    fn append(&self, partition: LedgerPartition, records: &[LimsRecord]) -> Result<(), LimsError>;
}

/// Ledger kept in a Google spreadsheet.
#[derive(Clone)]
pub struct SheetsLedger {
    sheets: SheetsClient,
    spreadsheet_id: String,
}

impl SheetsLedger {
    pub fn new(sheets: SheetsClient, spreadsheet_id: String) -> Self {
        Self {
            sheets,
            spreadsheet_id,
        }
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }
}

impl LedgerClient for SheetsLedger {
    fn append(&self, partition: LedgerPartition, records: &[LimsRecord]) -> Result<(), LimsError> {
        let rows = records.iter().map(LimsRecord::to_ledger_row).collect();
        self.sheets
            .append_values(&self.spreadsheet_id, partition.sheet_name(), rows)
    }
}

/// Location the CSV sink writes to for a run.
pub fn csv_path(csv_outdir: &Utf8Path, run_folder: &str) -> Utf8PathBuf {
    csv_outdir.join(csv_file_name(run_folder))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_names() {
        assert_eq!(LedgerPartition::for_run(false).sheet_name(), "Sheet1");
        assert_eq!(LedgerPartition::for_run(true).sheet_name(), "Failed Runs");
    }

    #[test]
    fn csv_path_uses_run_folder() {
        let path = csv_path(Utf8Path::new("/tmp"), "200101_A00130_0001_AHABCDEFGH");
        assert_eq!(path, "/tmp/200101_A00130_0001_AHABCDEFGH-lims-sheet.csv");
    }
}
