use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Value, json};

use crate::domain::{RunIdentity, SplitSampleId};
use crate::error::LimsError;
use crate::fastq::FastqLocation;
use crate::registry::TrackingRecord;
use crate::samplesheet::SampleSheetEntry;

/// Column headers of the LIMS sheet, in order.
pub const COLUMN_HEADERS: [&str; 25] = [
    "IlluminaID",
    "Run",
    "Timestamp",
    "SubjectID",
    "SampleID",
    "LibraryID",
    "ExternalSubjectID",
    "ExternalSampleID",
    "ExternalLibraryID",
    "SampleName",
    "ProjectOwner",
    "ProjectName",
    "Type",
    "Assay",
    "Phenotype",
    "Source",
    "Quality",
    "Topup",
    "SecondaryAnalysis",
    "FASTQ",
    "NumberFASTQS",
    "Results",
    "Trello",
    "Notes",
    "ToDo",
];

/// Filler for columns curated by hand after the row is appended.
pub const PLACEHOLDER: &str = "-";

/// One reconciled LIMS row. Field order matches [`COLUMN_HEADERS`]; the
/// derived ordering is used to keep output sets deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LimsRecord {
    pub illumina_id: String,
    pub run: u32,
    pub timestamp: String,
    pub subject_id: String,
    pub sample_id: String,
    pub library_id: String,
    pub external_subject_id: String,
    pub external_sample_id: String,
    pub external_library_id: String,
    pub sample_name: String,
    pub project_owner: String,
    pub project_name: String,
    pub assay_type: String,
    pub assay: String,
    pub phenotype: String,
    pub source: String,
    pub quality: String,
    pub topup: String,
    pub secondary_analysis: String,
    pub fastq: String,
    pub number_fastqs: usize,
    pub results: String,
    pub trello: String,
    pub notes: String,
    pub todo: String,
}

impl LimsRecord {
    /// Cell values as text, in column order.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.illumina_id.clone(),
            self.run.to_string(),
            self.timestamp.clone(),
            self.subject_id.clone(),
            self.sample_id.clone(),
            self.library_id.clone(),
            self.external_subject_id.clone(),
            self.external_sample_id.clone(),
            self.external_library_id.clone(),
            self.sample_name.clone(),
            self.project_owner.clone(),
            self.project_name.clone(),
            self.assay_type.clone(),
            self.assay.clone(),
            self.phenotype.clone(),
            self.source.clone(),
            self.quality.clone(),
            self.topup.clone(),
            self.secondary_analysis.clone(),
            self.fastq.clone(),
            self.number_fastqs.to_string(),
            self.results.clone(),
            self.trello.clone(),
            self.notes.clone(),
            self.todo.clone(),
        ]
    }

    /// Cell values for the ledger; numeric columns stay numeric.
    pub fn to_ledger_row(&self) -> Vec<Value> {
        self.to_row()
            .into_iter()
            .enumerate()
            .map(|(idx, cell)| match idx {
                1 => json!(self.run),
                20 => json!(self.number_fastqs),
                _ => Value::String(cell),
            })
            .collect()
    }

    /// Rebuilds a record from cells in column order.
    pub fn from_row(row: &[String]) -> Result<Self, LimsError> {
        if row.len() != COLUMN_HEADERS.len() {
            return Err(LimsError::Csv(format!(
                "expected {} columns, got {}",
                COLUMN_HEADERS.len(),
                row.len()
            )));
        }
        Ok(Self {
            illumina_id: row[0].clone(),
            run: parse_number(row, 1)?,
            timestamp: row[2].clone(),
            subject_id: row[3].clone(),
            sample_id: row[4].clone(),
            library_id: row[5].clone(),
            external_subject_id: row[6].clone(),
            external_sample_id: row[7].clone(),
            external_library_id: row[8].clone(),
            sample_name: row[9].clone(),
            project_owner: row[10].clone(),
            project_name: row[11].clone(),
            assay_type: row[12].clone(),
            assay: row[13].clone(),
            phenotype: row[14].clone(),
            source: row[15].clone(),
            quality: row[16].clone(),
            topup: row[17].clone(),
            secondary_analysis: row[18].clone(),
            fastq: row[19].clone(),
            number_fastqs: parse_number(row, 20)?,
            results: row[21].clone(),
            trello: row[22].clone(),
            notes: row[23].clone(),
            todo: row[24].clone(),
        })
    }
}

fn parse_number<T>(row: &[String], idx: usize) -> Result<T, LimsError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    row[idx].parse::<T>().map_err(|err| {
        LimsError::Csv(format!("{} is not a number: {err}", COLUMN_HEADERS[idx]))
    })
}

/// Merges run, sample sheet and tracking data into a LIMS row after
/// checking that both sources name the same library.
pub fn assemble(
    run: &RunIdentity,
    sample: &SampleSheetEntry,
    tracking: &TrackingRecord,
    split: &SplitSampleId,
    fastqs: &FastqLocation,
) -> Result<LimsRecord, LimsError> {
    if sample.sample_name != tracking.library_id {
        return Err(LimsError::LibraryMismatch {
            sample_sheet: sample.sample_name.clone(),
            registry: tracking.library_id.clone(),
        });
    }
    tracing::debug!(
        sample_id = %sample.sample_id,
        internal = %split.internal,
        external = %split.external,
        "split sample ID"
    );

    Ok(LimsRecord {
        illumina_id: run.folder().to_string(),
        run: run.number(),
        timestamp: run.timestamp(),
        subject_id: tracking.subject_id.clone(),
        sample_id: tracking.sample_id.clone(),
        library_id: tracking.library_id.clone(),
        external_subject_id: tracking.external_subject_id.clone(),
        external_sample_id: tracking.external_sample_id.clone(),
        external_library_id: tracking
            .external_library_id
            .clone()
            .unwrap_or_else(|| PLACEHOLDER.to_string()),
        sample_name: tracking.sample_name.clone(),
        project_owner: tracking.project_owner.clone(),
        project_name: tracking.project_name.clone(),
        assay_type: tracking.assay_type.clone(),
        assay: tracking.assay.clone(),
        phenotype: tracking.phenotype.clone(),
        source: tracking.source.clone(),
        quality: tracking.quality.clone(),
        topup: PLACEHOLDER.to_string(),
        secondary_analysis: PLACEHOLDER.to_string(),
        fastq: fastqs.destination_pattern.clone(),
        number_fastqs: fastqs.count,
        results: PLACEHOLDER.to_string(),
        trello: PLACEHOLDER.to_string(),
        notes: PLACEHOLDER.to_string(),
        todo: PLACEHOLDER.to_string(),
    })
}
