use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use csv::ReaderBuilder;
use serde::Serialize;

use crate::error::LimsError;

const DATA_SECTION: &str = "[Data]";
const SAMPLE_ID_COLUMN: &str = "Sample_ID";
const SAMPLE_NAME_COLUMN: &str = "Sample_Name";
const SAMPLE_PROJECT_COLUMN: &str = "Sample_Project";

/// One row of the `[Data]` section of a sample sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleSheetEntry {
    pub sample_id: String,
    /// The lab library ID.
    pub sample_name: String,
    pub sample_project: String,
}

#[derive(Debug, Clone)]
pub struct SampleSheet {
    pub path: Utf8PathBuf,
    pub samples: Vec<SampleSheetEntry>,
}

impl SampleSheet {
    pub fn from_path(path: &Utf8Path) -> Result<Self, LimsError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| LimsError::Filesystem(format!("read {path}: {err}")))?;
        let samples = parse_samples(&content).map_err(|message| LimsError::SampleSheet {
            path: path.to_string(),
            message,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            samples,
        })
    }
}

/// Sample sheets used for a run: the bcl2fastq-generated
/// `SampleSheet.csv.custom.*` files, or the original `SampleSheet.csv` when
/// the run failed and was never converted.
pub fn sample_sheet_pattern(
    raw_data_base_dir: &Utf8Path,
    run_folder: &str,
    failed_run: bool,
) -> String {
    let run_dir = raw_data_base_dir.join(run_folder);
    let escaped = glob::Pattern::escape(run_dir.as_str());
    if failed_run {
        format!("{escaped}/SampleSheet.csv")
    } else {
        format!("{escaped}/SampleSheet.csv.custom.*")
    }
}

pub fn discover_sample_sheets(
    raw_data_base_dir: &Utf8Path,
    run_folder: &str,
    failed_run: bool,
) -> Result<Vec<Utf8PathBuf>, LimsError> {
    let pattern = sample_sheet_pattern(raw_data_base_dir, run_folder, failed_run);
    let entries = glob::glob(&pattern).map_err(|err| LimsError::Filesystem(err.to_string()))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|err| LimsError::Filesystem(err.to_string()))?;
        let path = Utf8PathBuf::from_path_buf(path)
            .map_err(|path| LimsError::Filesystem(format!("non UTF-8 path: {}", path.display())))?;
        if path.is_file() {
            paths.push(path);
        }
    }
    if paths.is_empty() {
        return Err(LimsError::NoSampleSheets(pattern));
    }
    paths.sort();
    Ok(paths)
}

pub fn parse_samples(content: &str) -> Result<Vec<SampleSheetEntry>, String> {
    let data = data_section(content).ok_or_else(|| format!("missing {DATA_SECTION} section"))?;

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes());

    let headers = reader.headers().map_err(|err| err.to_string())?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|header| header == name)
            .ok_or_else(|| format!("missing column {name} in {DATA_SECTION} section"))
    };
    let id_idx = column(SAMPLE_ID_COLUMN)?;
    let name_idx = column(SAMPLE_NAME_COLUMN)?;
    let project_idx = column(SAMPLE_PROJECT_COLUMN)?;

    let mut samples = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| err.to_string())?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        let field = |idx: usize| record.get(idx).unwrap_or_default().to_string();
        let entry = SampleSheetEntry {
            sample_id: field(id_idx),
            sample_name: field(name_idx),
            sample_project: field(project_idx),
        };
        if entry.sample_id.is_empty() {
            return Err(format!("sample row without {SAMPLE_ID_COLUMN}"));
        }
        samples.push(entry);
    }
    Ok(samples)
}

/// Lines between the `[Data]` marker and the next section (or EOF).
fn data_section(content: &str) -> Option<String> {
    let mut lines = content.lines();
    lines.find(|line| {
        section_name(line).is_some_and(|name| name.eq_ignore_ascii_case(DATA_SECTION))
    })?;
    let body = lines
        .take_while(|line| section_name(line).is_none())
        .collect::<Vec<_>>()
        .join("\n");
    Some(body)
}

fn section_name(line: &str) -> Option<&str> {
    let first = line.split(',').next().unwrap_or_default().trim();
    (first.starts_with('[') && first.ends_with(']')).then_some(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_section_stops_at_next_section() {
        let content = "[Header]\nIEMFileVersion,5\n[Data]\nSample_ID,Sample_Name\nA,B\n[Extra]\nx,y\n";
        assert_eq!(data_section(content).unwrap(), "Sample_ID,Sample_Name\nA,B");
    }

    #[test]
    fn section_marker_with_trailing_commas() {
        assert_eq!(section_name("[Data],,,"), Some("[Data]"));
        assert_eq!(section_name("Sample_ID,Sample_Name"), None);
    }
}
