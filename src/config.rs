use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use camino::Utf8PathBuf;
use clap::ValueEnum;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::LimsError;

pub const CONFIG_FILE_NAME: &str = "lims.json";
pub const DEFAULT_FASTQ_HPC_BASE_DIR: &str = "s3://umccr-fastq-data-prod/";
pub const DEFAULT_CSV_OUTDIR: &str = "/tmp";
pub const DEFAULT_ACCESS_TOKEN_ENV: &str = "LIMS_ACCESS_TOKEN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeployEnv {
    Prod,
    Dev,
}

impl fmt::Display for DeployEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployEnv::Prod => write!(f, "prod"),
            DeployEnv::Dev => write!(f, "dev"),
        }
    }
}

impl FromStr for DeployEnv {
    type Err = LimsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "prod" => Ok(DeployEnv::Prod),
            "dev" => Ok(DeployEnv::Dev),
            _ => Err(LimsError::InvalidDeployEnv(value.to_string())),
        }
    }
}

/// Defaults that differ between the production and development setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvProfile {
    pub raw_data_base_dir: Utf8PathBuf,
    pub bcl2fastq_base_dir: Utf8PathBuf,
    pub lims_spreadsheet_id: String,
    pub tracking_spreadsheet_id: String,
}

impl EnvProfile {
    pub fn for_env(env: DeployEnv) -> Self {
        match env {
            DeployEnv::Prod => Self {
                raw_data_base_dir: Utf8PathBuf::from("/storage/shared/raw/Baymax"),
                bcl2fastq_base_dir: Utf8PathBuf::from("/storage/shared/bcl2fastq_output"),
                lims_spreadsheet_id: "1aaTvXrZSdA1ekiLEpW60OeNq2V7D_oEMBzTgC-uDJAM".to_string(),
                tracking_spreadsheet_id: "1pZRph8a6-795odibsvhxCqfC6l0hHZzKbGYpesgNXOA"
                    .to_string(),
            },
            DeployEnv::Dev => Self {
                raw_data_base_dir: Utf8PathBuf::from("/storage/shared/dev/Baymax"),
                bcl2fastq_base_dir: Utf8PathBuf::from("/storage/shared/dev/bcl2fastq_output"),
                lims_spreadsheet_id: "1vX89Km1D8dm12aTl_552GMVPwOkEHo6sdf1zgI6Rq0g".to_string(),
                tracking_spreadsheet_id: "1Pgz13btHOJePiImo-NceA8oJKiQBbkWI5D2dLdKpPiY"
                    .to_string(),
            },
        }
    }
}

/// Contents of `lims.json`. Every key is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub deploy_env: Option<DeployEnv>,
    #[serde(default)]
    pub raw_data_base_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub bcl2fastq_base_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub fastq_hpc_base_dir: Option<String>,
    #[serde(default)]
    pub csv_outdir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub lims_spreadsheet_id: Option<String>,
    #[serde(default)]
    pub tracking_spreadsheet_id: Option<String>,
    #[serde(default)]
    pub tracking_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub access_token_env: Option<String>,
}

/// Values supplied on the command line; they win over the config file.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub deploy_env: Option<DeployEnv>,
    pub raw_data_base_dir: Option<Utf8PathBuf>,
    pub bcl2fastq_base_dir: Option<Utf8PathBuf>,
    pub fastq_hpc_base_dir: Option<String>,
    pub csv_outdir: Option<Utf8PathBuf>,
    pub lims_spreadsheet_id: Option<String>,
    pub tracking_dir: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingSource {
    Spreadsheet(String),
    Directory(Utf8PathBuf),
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub deploy_env: DeployEnv,
    pub raw_data_base_dir: Utf8PathBuf,
    pub bcl2fastq_base_dir: Utf8PathBuf,
    pub fastq_hpc_base_dir: String,
    pub csv_outdir: Utf8PathBuf,
    pub lims_spreadsheet_id: String,
    pub tracking: TrackingSource,
    pub access_token_env: String,
}

impl ResolvedConfig {
    pub fn access_token(&self) -> Result<String, LimsError> {
        std::env::var(&self.access_token_env)
            .ok()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| LimsError::MissingCredentials(self.access_token_env.clone()))
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, else `./lims.json`, else the user config directory.
    /// Without any file only the deploy environment defaults apply.
    pub fn resolve(
        path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, LimsError> {
        let config = match Self::locate(path)? {
            Some(config_path) => {
                let content = fs::read_to_string(&config_path)
                    .map_err(|_| LimsError::ConfigRead(config_path.clone()))?;
                serde_json::from_str(&content)
                    .map_err(|err| LimsError::ConfigParse(err.to_string()))?
            }
            None => Config::default(),
        };
        Self::resolve_config(config, overrides)
    }

    fn locate(path: Option<&str>) -> Result<Option<PathBuf>, LimsError> {
        if let Some(path) = path {
            let path = PathBuf::from(path);
            if !path.exists() {
                return Err(LimsError::ConfigRead(path));
            }
            return Ok(Some(path));
        }
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Ok(Some(local));
        }
        let user = ProjectDirs::from("org", "umccr", "lims-ledger")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .filter(|path| path.exists());
        Ok(user)
    }

    pub fn resolve_config(
        config: Config,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, LimsError> {
        let deploy_env = overrides
            .deploy_env
            .or(config.deploy_env)
            .ok_or(LimsError::MissingDeployEnv)?;
        let profile = EnvProfile::for_env(deploy_env);

        let tracking = match overrides.tracking_dir.or(config.tracking_dir) {
            Some(dir) => TrackingSource::Directory(dir),
            None => TrackingSource::Spreadsheet(
                config
                    .tracking_spreadsheet_id
                    .unwrap_or(profile.tracking_spreadsheet_id),
            ),
        };

        Ok(ResolvedConfig {
            deploy_env,
            raw_data_base_dir: overrides
                .raw_data_base_dir
                .or(config.raw_data_base_dir)
                .unwrap_or(profile.raw_data_base_dir),
            bcl2fastq_base_dir: overrides
                .bcl2fastq_base_dir
                .or(config.bcl2fastq_base_dir)
                .unwrap_or(profile.bcl2fastq_base_dir),
            fastq_hpc_base_dir: overrides
                .fastq_hpc_base_dir
                .or(config.fastq_hpc_base_dir)
                .unwrap_or_else(|| DEFAULT_FASTQ_HPC_BASE_DIR.to_string()),
            csv_outdir: overrides
                .csv_outdir
                .or(config.csv_outdir)
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_CSV_OUTDIR)),
            lims_spreadsheet_id: overrides
                .lims_spreadsheet_id
                .or(config.lims_spreadsheet_id)
                .unwrap_or(profile.lims_spreadsheet_id),
            tracking,
            access_token_env: config
                .access_token_env
                .unwrap_or_else(|| DEFAULT_ACCESS_TOKEN_ENV.to_string()),
        })
    }
}
