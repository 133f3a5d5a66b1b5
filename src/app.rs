use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{LibraryId, RunIdentity, split_sample_id};
use crate::error::LimsError;
use crate::fastq::{FastqStore, locate_fastqs};
use crate::matcher::match_library;
use crate::record::{LimsRecord, assemble};
use crate::registry::{RegistryCache, TrackingRegistry};
use crate::samplesheet::{SampleSheet, SampleSheetEntry, discover_sample_sheets};
use crate::sink::{LedgerClient, LedgerPartition, write_csv};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub raw_data_base_dir: Utf8PathBuf,
    pub bcl2fastq_base_dir: Utf8PathBuf,
    pub fastq_hpc_base_dir: String,
    /// Target of the CSV sink, `None` to skip it.
    pub csv_path: Option<Utf8PathBuf>,
    pub skip_lims_update: bool,
    pub failed_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleOutcome {
    pub sample_sheet: String,
    pub sample_id: String,
    pub internal_id: String,
    pub external_id: String,
    pub library_id: String,
    pub fastq_count: usize,
}

/// Records reconciled for one run, ready to be written.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub run: RunIdentity,
    pub sample_sheets: Vec<Utf8PathBuf>,
    pub samples: Vec<SampleOutcome>,
    pub records: BTreeSet<LimsRecord>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_folder: String,
    pub run_number: u32,
    pub timestamp: String,
    pub sample_sheets: Vec<String>,
    pub samples: Vec<SampleOutcome>,
    pub records: usize,
    pub warnings: Vec<String>,
    pub csv_path: Option<String>,
    pub ledger_partition: Option<LedgerPartition>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<R: TrackingRegistry, F: FastqStore, L: LedgerClient> {
    registry: RegistryCache<R>,
    fastq: F,
    ledger: L,
}

impl<R: TrackingRegistry, F: FastqStore, L: LedgerClient> App<R, F, L> {
    pub fn new(registry: R, fastq: F, ledger: L) -> Self {
        Self {
            registry: RegistryCache::new(registry),
            fastq,
            ledger,
        }
    }

    pub fn registry(&self) -> &RegistryCache<R> {
        &self.registry
    }

    /// Reconciles the run and writes the enabled sinks. Nothing is written
    /// unless every sample reconciles.
    pub fn run(
        &mut self,
        run_folder: &str,
        options: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, LimsError> {
        let started = Instant::now();
        let reconciliation = self.reconcile(run_folder, options, sink)?;
        let summary = self.publish(reconciliation, options, sink)?;
        sink.event(ProgressEvent {
            message: format!("phase=Done; {} records", summary.records),
            elapsed: Some(started.elapsed()),
        });
        info!("all done");
        Ok(summary)
    }

    pub fn reconcile(
        &mut self,
        run_folder: &str,
        options: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<Reconciliation, LimsError> {
        let run: RunIdentity = run_folder.parse()?;
        info!(
            run_number = run.number(),
            year = %run.year(),
            timestamp = %run.timestamp(),
            "extracted run number/year/timestamp"
        );
        sink.event(ProgressEvent {
            message: format!("phase=Parse; run {} #{}", run.timestamp(), run.number()),
            elapsed: None,
        });

        if options.failed_run {
            info!("processing failed run, using original sample sheet");
        } else {
            info!("processing successful run, using generated sample sheet(s)");
        }
        let sample_sheets =
            discover_sample_sheets(&options.raw_data_base_dir, run.folder(), options.failed_run)?;
        info!(count = sample_sheets.len(), "using sample sheet(s)");

        let mut reconciliation = Reconciliation {
            run,
            sample_sheets: sample_sheets.clone(),
            samples: Vec::new(),
            records: BTreeSet::new(),
            warnings: Vec::new(),
        };

        for path in &sample_sheets {
            let sheet = SampleSheet::from_path(path)?;
            info!(sample_sheet = %path, samples = sheet.samples.len(), "processing sample sheet");
            sink.event(ProgressEvent {
                message: format!("phase=Reconcile; {} ({} samples)", path, sheet.samples.len()),
                elapsed: None,
            });
            for sample in &sheet.samples {
                self.reconcile_sample(&mut reconciliation, &sheet, sample, options, sink)
                    .map_err(|err| err.for_sample(&sample.sample_id))?;
            }
        }

        Ok(reconciliation)
    }

    fn reconcile_sample(
        &mut self,
        reconciliation: &mut Reconciliation,
        sheet: &SampleSheet,
        sample: &SampleSheetEntry,
        options: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<(), LimsError> {
        tracing::debug!(
            sample_id = %sample.sample_id,
            library_id = %sample.sample_name,
            "looking up tracking metadata"
        );
        let library_id: LibraryId = sample.sample_name.parse()?;
        let tracking = match_library(&mut self.registry, &library_id)?;

        let fastqs = locate_fastqs(
            &self.fastq,
            &options.bcl2fastq_base_dir,
            &options.fastq_hpc_base_dir,
            &reconciliation.run,
            sample,
        )?;
        if fastqs.count == 0 {
            let warning = format!("found no FASTQ files for sample {}", sample.sample_id);
            sink.event(ProgressEvent {
                message: format!("phase=Locate; {warning}"),
                elapsed: None,
            });
            reconciliation.warnings.push(warning);
        }

        let split = split_sample_id(&sample.sample_id);
        let record = assemble(&reconciliation.run, sample, tracking, &split, &fastqs)?;

        reconciliation.samples.push(SampleOutcome {
            sample_sheet: sheet.path.to_string(),
            sample_id: sample.sample_id.clone(),
            internal_id: split.internal,
            external_id: split.external,
            library_id: library_id.to_string(),
            fastq_count: fastqs.count,
        });
        reconciliation.records.insert(record);
        Ok(())
    }

    /// Writes the CSV file first, then the ledger batch.
    pub fn publish(
        &self,
        reconciliation: Reconciliation,
        options: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, LimsError> {
        let records = &reconciliation.records;

        let csv_path = match &options.csv_path {
            Some(path) => {
                info!(records = records.len(), path = %path, "writing records to CSV file");
                write_csv(path, records)?;
                sink.event(ProgressEvent {
                    message: format!("phase=Write; CSV {path}"),
                    elapsed: None,
                });
                Some(path.to_string())
            }
            None => {
                info!("not writing CSV file");
                None
            }
        };

        let ledger_partition = if options.skip_lims_update {
            warn!("skipping LIMS update");
            None
        } else if records.is_empty() {
            warn!("no records to append to the LIMS");
            None
        } else {
            let partition = LedgerPartition::for_run(options.failed_run);
            info!(records = records.len(), partition = %partition, "appending records to LIMS");
            let batch = records.iter().cloned().collect::<Vec<_>>();
            self.ledger.append(partition, &batch)?;
            sink.event(ProgressEvent {
                message: format!("phase=Write; LIMS {partition}"),
                elapsed: None,
            });
            Some(partition)
        };

        Ok(RunSummary {
            run_folder: reconciliation.run.folder().to_string(),
            run_number: reconciliation.run.number(),
            timestamp: reconciliation.run.timestamp(),
            sample_sheets: reconciliation
                .sample_sheets
                .iter()
                .map(|path| path.to_string())
                .collect(),
            samples: reconciliation.samples,
            records: reconciliation.records.len(),
            warnings: reconciliation.warnings,
            csv_path,
            ledger_partition,
        })
    }
}
