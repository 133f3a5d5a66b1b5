use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs;

use camino::Utf8PathBuf;
use csv::ReaderBuilder;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::LimsError;
use crate::sheets::SheetsClient;

pub const SUBJECT_ID: &str = "SubjectID";
pub const SAMPLE_ID: &str = "SampleID";
pub const LIBRARY_ID: &str = "LibraryID";
pub const EXTERNAL_SUBJECT_ID: &str = "ExternalSubjectID";
pub const EXTERNAL_SAMPLE_ID: &str = "ExternalSampleID";
pub const EXTERNAL_LIBRARY_ID: &str = "ExternalLibraryID";
pub const SAMPLE_NAME: &str = "SampleName";
pub const PROJECT_OWNER: &str = "ProjectOwner";
pub const PROJECT_NAME: &str = "ProjectName";
pub const TYPE: &str = "Type";
pub const ASSAY: &str = "Assay";
pub const PHENOTYPE: &str = "Phenotype";
pub const SOURCE: &str = "Source";
pub const QUALITY: &str = "Quality";

/// Columns every yearly tracking sheet must carry.
pub const REQUIRED_COLUMNS: [&str; 13] = [
    SUBJECT_ID,
    EXTERNAL_SUBJECT_ID,
    SAMPLE_ID,
    EXTERNAL_SAMPLE_ID,
    SAMPLE_NAME,
    LIBRARY_ID,
    TYPE,
    PHENOTYPE,
    SOURCE,
    ASSAY,
    PROJECT_NAME,
    PROJECT_OWNER,
    QUALITY,
];

/// A tracking sheet as delivered by the registry: the header row followed
/// by data rows, all cells as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSheet {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawSheet {
    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Self {
        if rows.is_empty() {
            return Self::default();
        }
        let header = rows.remove(0);
        Self { header, rows }
    }
}

/// One library row of the tracking sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackingRecord {
    pub subject_id: String,
    pub sample_id: String,
    pub library_id: String,
    pub external_subject_id: String,
    pub external_sample_id: String,
    pub external_library_id: Option<String>,
    pub sample_name: String,
    pub project_owner: String,
    pub project_name: String,
    pub assay_type: String,
    pub assay: String,
    pub phenotype: String,
    pub source: String,
    pub quality: String,
}

/// Validated tracking data for one year.
#[derive(Debug, Clone, Default)]
pub struct TrackingTable {
    pub year: String,
    pub records: Vec<TrackingRecord>,
}

impl TrackingTable {
    /// Checks the header against [`REQUIRED_COLUMNS`] and converts rows.
    /// Rows shorter than the header are padded with empty cells.
    pub fn from_raw(year: &str, raw: RawSheet) -> Result<Self, LimsError> {
        let columns = raw
            .header
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.trim().to_string(), idx))
            .collect::<HashMap<_, _>>();

        for column in REQUIRED_COLUMNS {
            debug!(year, column, "checking for tracking sheet column");
            if !columns.contains_key(column) {
                return Err(LimsError::MissingColumn {
                    year: year.to_string(),
                    column: column.to_string(),
                });
            }
        }

        let records = raw
            .rows
            .iter()
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .map(|row| {
                let cell = |name: &str| {
                    columns
                        .get(name)
                        .and_then(|idx| row.get(*idx))
                        .map(|value| value.trim().to_string())
                        .unwrap_or_default()
                };
                TrackingRecord {
                    subject_id: cell(SUBJECT_ID),
                    sample_id: cell(SAMPLE_ID),
                    library_id: cell(LIBRARY_ID),
                    external_subject_id: cell(EXTERNAL_SUBJECT_ID),
                    external_sample_id: cell(EXTERNAL_SAMPLE_ID),
                    external_library_id: Some(cell(EXTERNAL_LIBRARY_ID))
                        .filter(|value| !value.is_empty()),
                    sample_name: cell(SAMPLE_NAME),
                    project_owner: cell(PROJECT_OWNER),
                    project_name: cell(PROJECT_NAME),
                    assay_type: cell(TYPE),
                    assay: cell(ASSAY),
                    phenotype: cell(PHENOTYPE),
                    source: cell(SOURCE),
                    quality: cell(QUALITY),
                }
            })
            .collect();

        Ok(Self {
            year: year.to_string(),
            records,
        })
    }

    pub fn find_by_library_id<'a>(&'a self, library_id: &str) -> Vec<&'a TrackingRecord> {
        self.records
            .iter()
            .filter(|record| record.library_id == library_id)
            .collect()
    }
}

/// Source of the yearly library tracking sheets.
pub trait TrackingRegistry {
    fn fetch_year(&self, year: &str) -> Result<RawSheet, LimsError>;
}

/// Tracking sheets kept as one tab per year in a Google spreadsheet.
#[derive(Clone)]
pub struct SheetsRegistry {
    sheets: SheetsClient,
    spreadsheet_id: String,
}

impl SheetsRegistry {
    pub fn new(sheets: SheetsClient, spreadsheet_id: String) -> Self {
        Self {
            sheets,
            spreadsheet_id,
        }
    }
}

impl TrackingRegistry for SheetsRegistry {
    fn fetch_year(&self, year: &str) -> Result<RawSheet, LimsError> {
        let rows = self.sheets.get_values(&self.spreadsheet_id, year)?;
        Ok(RawSheet::from_rows(rows))
    }
}

/// Tracking sheets exported as `<dir>/<year>.csv`.
#[derive(Debug, Clone)]
pub struct CsvDirectoryRegistry {
    root: Utf8PathBuf,
}

impl CsvDirectoryRegistry {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }
}

impl TrackingRegistry for CsvDirectoryRegistry {
    fn fetch_year(&self, year: &str) -> Result<RawSheet, LimsError> {
        let path = self.root.join(format!("{year}.csv"));
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| LimsError::Filesystem(format!("read {path}: {err}")))?;
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(content.as_bytes());
        let rows = reader
            .records()
            .map(|record| {
                record
                    .map(|record| record.iter().map(str::to_string).collect::<Vec<_>>())
                    .map_err(|err| LimsError::Csv(format!("{path}: {err}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RawSheet::from_rows(rows))
    }
}

/// Per-invocation cache of validated tracking tables, loading each year at
/// most once.
pub struct RegistryCache<R: TrackingRegistry> {
    registry: R,
    tables: HashMap<String, TrackingTable>,
}

impl<R: TrackingRegistry> RegistryCache<R> {
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            tables: HashMap::new(),
        }
    }

    pub fn table(&mut self, year: &str) -> Result<&TrackingTable, LimsError> {
        let table = match self.tables.entry(year.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                info!(year, "loading tracking data");
                let raw = self.registry.fetch_year(year)?;
                let table = TrackingTable::from_raw(year, raw)?;
                info!(
                    year,
                    records = table.records.len(),
                    "loaded records from library tracking sheet"
                );
                entry.insert(table)
            }
        };
        Ok(table)
    }

    pub fn loaded_years(&self) -> Vec<String> {
        let mut years = self.tables.keys().cloned().collect::<Vec<_>>();
        years.sort();
        years
    }
}
