use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::KiraError;

pub const DEFAULT_CONFIG_FILE: &str = "kira-geo2hca.json";

/// Column header row plus the four example rows shipped with the HCA template.
pub const DEFAULT_HEADER_ROW_COUNT: usize = 5;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub library_template: Option<String>,
    #[serde(default)]
    pub taxon_id: Option<String>,
    #[serde(default)]
    pub file_source: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub header_row_count: HeaderRowConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HeaderRowConfig {
    #[serde(default)]
    pub specimen: Option<usize>,
    #[serde(default)]
    pub cell_suspension: Option<usize>,
    #[serde(default)]
    pub library_preparation: Option<usize>,
    #[serde(default)]
    pub sequencing: Option<usize>,
    #[serde(default)]
    pub analysis_file: Option<usize>,
}

/// Rows at the top of each sheet that are kept verbatim on merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeaderRowCounts {
    pub specimen: usize,
    pub cell_suspension: usize,
    pub library_preparation: usize,
    pub sequencing: usize,
    pub analysis_file: usize,
}

impl Default for HeaderRowCounts {
    fn default() -> Self {
        Self {
            specimen: DEFAULT_HEADER_ROW_COUNT,
            cell_suspension: DEFAULT_HEADER_ROW_COUNT,
            library_preparation: DEFAULT_HEADER_ROW_COUNT,
            sequencing: DEFAULT_HEADER_ROW_COUNT,
            analysis_file: DEFAULT_HEADER_ROW_COUNT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub template: PathBuf,
    pub library_template: PathBuf,
    pub taxon_id: String,
    pub file_source: String,
    pub timeout_secs: u64,
    pub header_rows: HeaderRowCounts,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        ConfigLoader::resolve_config(Config::default())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must be readable; a missing default file (looked up
    /// in `default_dir`) yields defaults.
    pub fn resolve(path: Option<&str>, default_dir: &Path) -> Result<ResolvedConfig, KiraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => default_dir.join(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| KiraError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config))
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        let defaults = HeaderRowCounts::default();
        let rows = config.header_row_count;
        ResolvedConfig {
            template: PathBuf::from(
                config
                    .template
                    .unwrap_or_else(|| "hca_template.xlsx".to_string()),
            ),
            library_template: PathBuf::from(
                config
                    .library_template
                    .unwrap_or_else(|| "library_protocol_template.xlsx".to_string()),
            ),
            taxon_id: config.taxon_id.unwrap_or_else(|| "9606".to_string()),
            file_source: config.file_source.unwrap_or_else(|| "GEO".to_string()),
            timeout_secs: config.timeout_secs.unwrap_or(60),
            header_rows: HeaderRowCounts {
                specimen: rows.specimen.unwrap_or(defaults.specimen),
                cell_suspension: rows.cell_suspension.unwrap_or(defaults.cell_suspension),
                library_preparation: rows
                    .library_preparation
                    .unwrap_or(defaults.library_preparation),
                sequencing: rows.sequencing.unwrap_or(defaults.sequencing),
                analysis_file: rows.analysis_file.unwrap_or(defaults.analysis_file),
            },
        }
    }
}
