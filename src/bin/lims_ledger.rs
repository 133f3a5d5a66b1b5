use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use lims_ledger::app::{App, RunOptions};
use lims_ledger::config::{
    ConfigLoader, ConfigOverrides, DeployEnv, ResolvedConfig, TrackingSource,
};
use lims_ledger::domain::RunIdentity;
use lims_ledger::error::LimsError;
use lims_ledger::fastq::LocalFastqStore;
use lims_ledger::output::{JsonOutput, LogOutput, OutputMode};
use lims_ledger::record::LimsRecord;
use lims_ledger::registry::{CsvDirectoryRegistry, RawSheet, SheetsRegistry, TrackingRegistry};
use lims_ledger::sheets::SheetsClient;
use lims_ledger::sink::{LedgerClient, LedgerPartition, SheetsLedger, csv_path};

#[derive(Parser)]
#[command(name = "lims-ledger")]
#[command(about = "Generate LIMS records for a sequencing run and append them to the LIMS sheet")]
#[command(version, author)]
struct Cli {
    /// The run folder name, e.g. 200101_A00130_0001_AHABCDEFGH
    runfolder: String,

    #[arg(long)]
    config: Option<String>,

    #[arg(long, env = "DEPLOY_ENV")]
    deploy_env: Option<DeployEnv>,

    /// Where to find the sample sheet(s) used for the run
    #[arg(long)]
    raw_data_base_dir: Option<Utf8PathBuf>,

    /// Where to find the bcl2fastq output
    #[arg(long)]
    bcl2fastq_base_dir: Option<Utf8PathBuf>,

    /// Destination base path the FASTQs are moved to
    #[arg(long)]
    fastq_hpc_base_dir: Option<String>,

    #[arg(long)]
    csv_outdir: Option<Utf8PathBuf>,

    #[arg(long)]
    write_csv: bool,

    #[arg(long)]
    lims_spreadsheet_id: Option<String>,

    /// Read tracking sheets from <dir>/<year>.csv instead of the spreadsheet
    #[arg(long)]
    tracking_dir: Option<Utf8PathBuf>,

    #[arg(long)]
    skip_lims_update: bool,

    /// Mark the run as failed (rows go to the Failed Runs sheet)
    #[arg(long)]
    failed_run: bool,

    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<LimsError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &LimsError) -> u8 {
    match error.root() {
        LimsError::LibraryNotFound { .. }
        | LimsError::DuplicateLibrary { .. }
        | LimsError::LibraryMismatch { .. }
        | LimsError::NoSampleSheets(_) => 2,
        LimsError::RegistryHttp(_)
        | LimsError::RegistryStatus { .. }
        | LimsError::LedgerHttp(_)
        | LimsError::LedgerStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::info!(runfolder = %cli.runfolder, "invocation");
    let run: RunIdentity = cli.runfolder.parse()?;
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    let overrides = ConfigOverrides {
        deploy_env: cli.deploy_env,
        raw_data_base_dir: cli.raw_data_base_dir,
        bcl2fastq_base_dir: cli.bcl2fastq_base_dir,
        fastq_hpc_base_dir: cli.fastq_hpc_base_dir,
        csv_outdir: cli.csv_outdir,
        lims_spreadsheet_id: cli.lims_spreadsheet_id,
        tracking_dir: cli.tracking_dir,
    };
    let config = ConfigLoader::resolve(cli.config.as_deref(), overrides)?;

    let options = RunOptions {
        raw_data_base_dir: config.raw_data_base_dir.clone(),
        bcl2fastq_base_dir: config.bcl2fastq_base_dir.clone(),
        fastq_hpc_base_dir: config.fastq_hpc_base_dir.clone(),
        csv_path: cli
            .write_csv
            .then(|| csv_path(&config.csv_outdir, run.folder())),
        skip_lims_update: cli.skip_lims_update,
        failed_run: cli.failed_run,
    };

    let registry = RegistrySource::from_config(&config)?;
    if options.skip_lims_update {
        run_pipeline(&cli.runfolder, registry, NopLedger, &options, output_mode)
    } else {
        let sheets = SheetsClient::new(config.access_token()?)?;
        let ledger = SheetsLedger::new(sheets, config.lims_spreadsheet_id.clone());
        run_pipeline(&cli.runfolder, registry, ledger, &options, output_mode)
    }
}

fn run_pipeline<L: LedgerClient>(
    runfolder: &str,
    registry: RegistrySource,
    ledger: L,
    options: &RunOptions,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let mut app = App::new(registry, LocalFastqStore, ledger);
    match output_mode {
        OutputMode::Json => {
            let summary = app.run(runfolder, options, &JsonOutput)?;
            JsonOutput::print_summary(&summary).into_diagnostic()?;
        }
        OutputMode::Text => {
            let summary = app.run(runfolder, options, &LogOutput)?;
            LogOutput::print_summary(&summary);
        }
    }
    Ok(())
}

enum RegistrySource {
    Sheets(SheetsRegistry),
    Directory(CsvDirectoryRegistry),
}

impl RegistrySource {
    fn from_config(config: &ResolvedConfig) -> miette::Result<Self> {
        match &config.tracking {
            TrackingSource::Directory(dir) => {
                Ok(Self::Directory(CsvDirectoryRegistry::new(dir.clone())))
            }
            TrackingSource::Spreadsheet(id) => {
                let token = config.access_token()?;
                let sheets = SheetsClient::new(token)?;
                Ok(Self::Sheets(SheetsRegistry::new(sheets, id.clone())))
            }
        }
    }
}

impl TrackingRegistry for RegistrySource {
    fn fetch_year(&self, year: &str) -> Result<RawSheet, LimsError> {
        match self {
            RegistrySource::Sheets(registry) => registry.fetch_year(year),
            RegistrySource::Directory(registry) => registry.fetch_year(year),
        }
    }
}

struct NopLedger;

impl LedgerClient for NopLedger {
    fn append(
        &self,
        _partition: LedgerPartition,
        _records: &[LimsRecord],
    ) -> Result<(), LimsError> {
        Err(LimsError::LedgerHttp("LIMS update is disabled".to_string()))
    }
}
