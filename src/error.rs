use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum LimsError {
    #[error("runfolder name {name} did not match the expected length of {expected} characters (got {actual})")]
    RunFolderLength {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("runfolder name {name} did not match expected format: {pattern}")]
    RunFolderFormat { name: String, pattern: String },

    #[error("runfolder name {name} carries an invalid date: {date}")]
    RunFolderDate { name: String, date: String },

    #[error("unsupported library ID format: {0}")]
    #[diagnostic(help("library IDs must start with `L` or `LPRJ` followed by a two digit year"))]
    UnsupportedLibraryId(String),

    #[error("invalid sample sheet {path}: {message}")]
    SampleSheet { path: String, message: String },

    #[error("no sample sheets found matching {0}")]
    NoSampleSheets(String),

    #[error("tracking sheet for year {year} is missing column {column}")]
    #[diagnostic(help("the tracking sheet is not structured as expected; fix the sheet before rerunning"))]
    MissingColumn { year: String, column: String },

    #[error("no entry for library ID {library_id} in tracking sheet {year}")]
    LibraryNotFound { library_id: String, year: String },

    #[error("multiple entries ({count}) for library ID {library_id} in tracking sheet {year}")]
    DuplicateLibrary {
        library_id: String,
        year: String,
        count: usize,
    },

    #[error("library IDs did not match. Samplesheet: {sample_sheet} Tracking sheet: {registry}")]
    LibraryMismatch {
        sample_sheet: String,
        registry: String,
    },

    #[error("sample {sample_id}: {source}")]
    Sample {
        sample_id: String,
        #[source]
        source: Box<LimsError>,
    },

    #[error("tracking registry request failed: {0}")]
    RegistryHttp(String),

    #[error("tracking registry returned status {status}: {message}")]
    RegistryStatus { status: u16, message: String },

    #[error("LIMS ledger request failed: {0}")]
    LedgerHttp(String),

    #[error("LIMS ledger returned status {status}: {message}")]
    LedgerStatus { status: u16, message: String },

    #[error("missing access token: environment variable {0} is not set")]
    MissingCredentials(String),

    #[error("deploy environment is not set")]
    #[diagnostic(help("pass --deploy-env, set DEPLOY_ENV, or add deploy_env to lims.json"))]
    MissingDeployEnv,

    #[error("deploy environment must be `prod` or `dev`, got: {0}")]
    InvalidDeployEnv(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl LimsError {
    /// Attaches the offending sample ID to a per-sample failure.
    pub fn for_sample(self, sample_id: &str) -> Self {
        LimsError::Sample {
            sample_id: sample_id.to_string(),
            source: Box::new(self),
        }
    }

    /// Unwraps per-sample context, returning the underlying failure.
    pub fn root(&self) -> &LimsError {
        match self {
            LimsError::Sample { source, .. } => source.root(),
            other => other,
        }
    }
}
