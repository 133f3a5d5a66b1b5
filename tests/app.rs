use std::fs;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use lims_ledger::app::{App, RunOptions};
use lims_ledger::error::LimsError;
use lims_ledger::fastq::LocalFastqStore;
use lims_ledger::output::JsonOutput;
use lims_ledger::record::LimsRecord;
use lims_ledger::registry::{CsvDirectoryRegistry, RawSheet, TrackingRegistry};
use lims_ledger::sink::{LedgerClient, LedgerPartition, csv_path, read_csv};

const RUN_FOLDER: &str = "200101_A00130_0001_AHABCDEFGH";

type Appended = Arc<Mutex<Vec<(LedgerPartition, Vec<LimsRecord>)>>>;

struct CountingRegistry {
    inner: CsvDirectoryRegistry,
    calls: Arc<Mutex<Vec<String>>>,
}

impl CountingRegistry {
    fn fixtures() -> Self {
        let root =
            Utf8PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/tracking"));
        Self {
            inner: CsvDirectoryRegistry::new(root),
            calls: Arc::default(),
        }
    }
}

impl TrackingRegistry for CountingRegistry {
    fn fetch_year(&self, year: &str) -> Result<RawSheet, LimsError> {
        self.calls.lock().unwrap().push(year.to_string());
        self.inner.fetch_year(year)
    }
}

#[derive(Default)]
struct RecordingLedger {
    appended: Appended,
    fail: bool,
}

impl LedgerClient for RecordingLedger {
    fn append(&self, partition: LedgerPartition, records: &[LimsRecord]) -> Result<(), LimsError> {
        if self.fail {
            return Err(LimsError::LedgerStatus {
                status: 403,
                message: "The caller does not have permission".to_string(),
            });
        }
        self.appended
            .lock()
            .unwrap()
            .push((partition, records.to_vec()));
        Ok(())
    }
}

struct Workspace {
    _temp: tempfile::TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        Self { _temp: temp, root }
    }

    fn raw_dir(&self) -> Utf8PathBuf {
        self.root.join("raw")
    }

    fn bcl2fastq_dir(&self) -> Utf8PathBuf {
        self.root.join("bcl2fastq")
    }

    fn csv_outdir(&self) -> Utf8PathBuf {
        self.root.join("out")
    }

    fn sample_sheet(&self, name: &str, rows: &[(&str, &str, &str)]) {
        let mut content = String::from(
            "[Header]\nIEMFileVersion,5\n\n[Data]\nSample_ID,Sample_Name,Sample_Project\n",
        );
        for (sample_id, sample_name, project) in rows {
            content.push_str(&format!("{sample_id},{sample_name},{project}\n"));
        }
        let path = self.raw_dir().join(RUN_FOLDER).join(name);
        write(&path, &content);
    }

    fn fastq(&self, project: &str, sample_id: &str, file_name: &str) {
        let path = self
            .bcl2fastq_dir()
            .join(RUN_FOLDER)
            .join(project)
            .join(sample_id)
            .join(file_name);
        write(&path, "@read\nACGT\n+\nFFFF\n");
    }

    fn options(&self) -> RunOptions {
        RunOptions {
            raw_data_base_dir: self.raw_dir(),
            bcl2fastq_base_dir: self.bcl2fastq_dir(),
            fastq_hpc_base_dir: "s3://fastq-bucket/".to_string(),
            csv_path: Some(csv_path(&self.csv_outdir(), RUN_FOLDER)),
            skip_lims_update: false,
            failed_run: false,
        }
    }
}

fn write(path: &Utf8Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn run_writes_csv_and_ledger() {
    let workspace = Workspace::new();
    workspace.sample_sheet(
        "SampleSheet.csv.custom.1.truseq",
        &[("PRJ200001_EXT1", "L2000001", "Cancer")],
    );
    let ledger = RecordingLedger::default();
    let appended = ledger.appended.clone();
    let options = workspace.options();

    let mut app = App::new(CountingRegistry::fixtures(), LocalFastqStore, ledger);
    let summary = app.run(RUN_FOLDER, &options, &JsonOutput).unwrap();

    assert_eq!(summary.run_number, 1);
    assert_eq!(summary.timestamp, "2020-01-01");
    assert_eq!(summary.records, 1);
    assert_eq!(summary.warnings, vec!["found no FASTQ files for sample PRJ200001_EXT1"]);
    assert_eq!(summary.ledger_partition, Some(LedgerPartition::Runs));
    assert_eq!(summary.samples[0].internal_id, "PRJ200001");
    assert_eq!(summary.samples[0].external_id, "EXT1");

    let csv = options.csv_path.clone().unwrap();
    assert_eq!(summary.csv_path.as_deref(), Some(csv.as_str()));
    let written = read_csv(&csv).unwrap();
    assert_eq!(written.len(), 1);
    let record = &written[0];
    assert_eq!(record.illumina_id, RUN_FOLDER);
    assert_eq!(record.library_id, "L2000001");
    assert_eq!(record.subject_id, "SBJ00001");
    assert_eq!(record.external_library_id, "-");
    assert_eq!(record.number_fastqs, 0);
    assert_eq!(
        record.fastq,
        format!("s3://fastq-bucket/{RUN_FOLDER}/Cancer/PRJ200001_EXT1/L2000001*.fastq.gz")
    );

    let appended = appended.lock().unwrap();
    assert_eq!(appended.len(), 1);
    assert_eq!(appended[0].0, LedgerPartition::Runs);
    assert_eq!(appended[0].1, written);
}

#[test]
fn run_counts_fastqs_on_processing_storage() {
    let workspace = Workspace::new();
    workspace.sample_sheet(
        "SampleSheet.csv.custom.1.truseq",
        &[("PRJ200002_EXT2", "L2000002", "Cancer")],
    );
    workspace.fastq("Cancer", "PRJ200002_EXT2", "L2000002_S1_R1_001.fastq.gz");
    workspace.fastq("Cancer", "PRJ200002_EXT2", "L2000002_S1_R2_001.fastq.gz");
    workspace.fastq("Cancer", "PRJ200002_EXT2", "L2000002_S1_R1_001.md5");

    let mut app = App::new(
        CountingRegistry::fixtures(),
        LocalFastqStore,
        RecordingLedger::default(),
    );
    let summary = app.run(RUN_FOLDER, &workspace.options(), &JsonOutput).unwrap();

    assert!(summary.warnings.is_empty());
    assert_eq!(summary.samples[0].fastq_count, 2);
    let written = read_csv(&csv_path(&workspace.csv_outdir(), RUN_FOLDER)).unwrap();
    assert_eq!(written[0].number_fastqs, 2);
    assert_eq!(written[0].external_library_id, "EXTLIB2");
}

#[test]
fn invalid_run_folder_stops_before_registry() {
    let workspace = Workspace::new();
    let registry = CountingRegistry::fixtures();
    let calls = registry.calls.clone();
    let ledger = RecordingLedger::default();
    let appended = ledger.appended.clone();

    let mut app = App::new(registry, LocalFastqStore, ledger);
    let err = app
        .run("200101_A00001_0001_AHABCD", &workspace.options(), &JsonOutput)
        .unwrap_err();

    assert_matches!(err, LimsError::RunFolderLength { actual: 25, .. });
    assert!(calls.lock().unwrap().is_empty());
    assert!(appended.lock().unwrap().is_empty());
    assert!(!csv_path(&workspace.csv_outdir(), "200101_A00001_0001_AHABCD").exists());
}

#[test]
fn unknown_library_aborts_without_writing() {
    let workspace = Workspace::new();
    workspace.sample_sheet(
        "SampleSheet.csv.custom.1.truseq",
        &[
            ("PRJ200001_EXT1", "L2000001", "Cancer"),
            ("PRJ200009_EXT9", "L2000009", "Cancer"),
        ],
    );
    let ledger = RecordingLedger::default();
    let appended = ledger.appended.clone();
    let options = workspace.options();

    let mut app = App::new(CountingRegistry::fixtures(), LocalFastqStore, ledger);
    let err = app.run(RUN_FOLDER, &options, &JsonOutput).unwrap_err();

    assert_matches!(err, LimsError::Sample { ref sample_id, .. } if sample_id == "PRJ200009_EXT9");
    assert_matches!(err.root(), LimsError::LibraryNotFound { library_id, .. } if library_id == "L2000009");
    assert!(appended.lock().unwrap().is_empty());
    assert!(!options.csv_path.unwrap().exists());
}

#[test]
fn failed_run_uses_original_sheet_and_partition() {
    let workspace = Workspace::new();
    workspace.sample_sheet("SampleSheet.csv", &[("NTC_TSq200102", "L2000003", "Control")]);
    workspace.sample_sheet(
        "SampleSheet.csv.custom.1.truseq",
        &[("PRJ200009_EXT9", "L2000009", "Cancer")],
    );
    let ledger = RecordingLedger::default();
    let appended = ledger.appended.clone();
    let mut options = workspace.options();
    options.failed_run = true;

    let mut app = App::new(CountingRegistry::fixtures(), LocalFastqStore, ledger);
    let summary = app.run(RUN_FOLDER, &options, &JsonOutput).unwrap();

    assert_eq!(summary.sample_sheets.len(), 1);
    assert!(summary.sample_sheets[0].ends_with("/SampleSheet.csv"));
    assert_eq!(summary.ledger_partition, Some(LedgerPartition::FailedRuns));
    assert_eq!(summary.samples[0].internal_id, "NTC_TSq200102");
    assert_eq!(summary.samples[0].external_id, "");

    let appended = appended.lock().unwrap();
    assert_eq!(appended[0].0, LedgerPartition::FailedRuns);
    assert_eq!(appended[0].1[0].phenotype, "negative-control");
}

#[test]
fn skip_lims_update_only_writes_csv() {
    let workspace = Workspace::new();
    workspace.sample_sheet(
        "SampleSheet.csv.custom.1.truseq",
        &[("PRJ200001_EXT1", "L2000001", "Cancer")],
    );
    let ledger = RecordingLedger {
        fail: true,
        ..RecordingLedger::default()
    };
    let mut options = workspace.options();
    options.skip_lims_update = true;

    let mut app = App::new(CountingRegistry::fixtures(), LocalFastqStore, ledger);
    let summary = app.run(RUN_FOLDER, &options, &JsonOutput).unwrap();

    assert_eq!(summary.ledger_partition, None);
    assert_eq!(read_csv(&options.csv_path.unwrap()).unwrap().len(), 1);
}

#[test]
fn ledger_failure_keeps_csv() {
    let workspace = Workspace::new();
    workspace.sample_sheet(
        "SampleSheet.csv.custom.1.truseq",
        &[("PRJ200001_EXT1", "L2000001", "Cancer")],
    );
    let ledger = RecordingLedger {
        fail: true,
        ..RecordingLedger::default()
    };
    let options = workspace.options();

    let mut app = App::new(CountingRegistry::fixtures(), LocalFastqStore, ledger);
    let err = app.run(RUN_FOLDER, &options, &JsonOutput).unwrap_err();

    assert_matches!(err, LimsError::LedgerStatus { status: 403, .. });
    assert_eq!(read_csv(&options.csv_path.unwrap()).unwrap().len(), 1);
}

#[test]
fn identical_rows_across_sheets_are_merged() {
    let workspace = Workspace::new();
    let rows = [
        ("PRJ200001_EXT1", "L2000001", "Cancer"),
        ("PRJ200002_EXT2", "L2000002", "Cancer"),
    ];
    workspace.sample_sheet("SampleSheet.csv.custom.1.truseq", &rows);
    workspace.sample_sheet("SampleSheet.csv.custom.2.truseq", &rows[..1]);
    let registry = CountingRegistry::fixtures();
    let calls = registry.calls.clone();
    let ledger = RecordingLedger::default();
    let appended = ledger.appended.clone();

    let mut app = App::new(registry, LocalFastqStore, ledger);
    let summary = app.run(RUN_FOLDER, &workspace.options(), &JsonOutput).unwrap();

    assert_eq!(summary.samples.len(), 3);
    assert_eq!(summary.records, 2);
    assert_eq!(*calls.lock().unwrap(), vec!["2020"]);
    assert_eq!(app.registry().loaded_years(), vec!["2020"]);

    let appended = appended.lock().unwrap();
    let library_ids = appended[0]
        .1
        .iter()
        .map(|record| record.library_id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(library_ids, vec!["L2000001", "L2000002"]);
}

#[test]
fn missing_sample_sheets_is_reported() {
    let workspace = Workspace::new();
    fs::create_dir_all(workspace.raw_dir().join(RUN_FOLDER)).unwrap();

    let mut app = App::new(
        CountingRegistry::fixtures(),
        LocalFastqStore,
        RecordingLedger::default(),
    );
    let err = app
        .run(RUN_FOLDER, &workspace.options(), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, LimsError::NoSampleSheets(_));
}
