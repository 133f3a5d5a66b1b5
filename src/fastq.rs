use camino::Utf8Path;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::RunIdentity;
use crate::error::LimsError;
use crate::samplesheet::SampleSheetEntry;

const FASTQ_SUFFIX: &str = "*.fastq.gz";

/// Storage holding freshly converted FASTQs that can be listed by pattern.
pub trait FastqStore {
    fn count_matches(&self, pattern: &str) -> Result<usize, LimsError>;
}

/// bcl2fastq output on a local (or mounted) filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFastqStore;

impl FastqStore for LocalFastqStore {
    fn count_matches(&self, pattern: &str) -> Result<usize, LimsError> {
        let entries = glob::glob(pattern)
            .map_err(|err| LimsError::Filesystem(format!("invalid pattern {pattern}: {err}")))?;
        let mut count = 0;
        for entry in entries {
            let path = entry.map_err(|err| LimsError::Filesystem(err.to_string()))?;
            if path.is_file() {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FastqLocation {
    /// Where the FASTQs are expected once moved to the destination storage.
    pub destination_pattern: String,
    /// Files found on the processing storage.
    pub count: usize,
}

/// Pattern `{base}/{run}/{project}/{sample_id}/{sample_name}*.fastq.gz`.
pub fn fastq_pattern(base: &str, run: &RunIdentity, sample: &SampleSheetEntry) -> String {
    let separator = if base.is_empty() || base.ends_with('/') {
        ""
    } else {
        "/"
    };
    format!(
        "{base}{separator}{}/{}/{}/{}{FASTQ_SUFFIX}",
        run.folder(),
        sample.sample_project,
        sample.sample_id,
        sample.sample_name
    )
}

pub fn locate_fastqs<F: FastqStore>(
    store: &F,
    processing_base: &Utf8Path,
    destination_base: &str,
    run: &RunIdentity,
    sample: &SampleSheetEntry,
) -> Result<FastqLocation, LimsError> {
    let escaped_base = glob::Pattern::escape(processing_base.as_str());
    let escaped_sample = SampleSheetEntry {
        sample_id: glob::Pattern::escape(&sample.sample_id),
        sample_name: glob::Pattern::escape(&sample.sample_name),
        sample_project: glob::Pattern::escape(&sample.sample_project),
    };
    let processing_pattern = fastq_pattern(&escaped_base, run, &escaped_sample);
    debug!(pattern = %processing_pattern, "looking for FASTQs");
    let count = store.count_matches(&processing_pattern)?;
    if count == 0 {
        warn!(sample_id = %sample.sample_id, "found no FASTQ files for sample");
    }

    Ok(FastqLocation {
        destination_pattern: fastq_pattern(destination_base, run, sample),
        count,
    })
}
