use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("invalid GEO series accession: {0}")]
    InvalidSeriesAccession(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("GEO request failed: {0}")]
    GeoHttp(String),

    #[error("GEO returned status {status}: {message}")]
    GeoStatus { status: u16, message: String },

    #[error("failed to extract MINiML archive: {0}")]
    Archive(String),

    #[error("MINiML archive does not contain {0}")]
    ArchiveEntryMissing(String),

    #[error("MINiML document not found: {0}")]
    DocumentNotFound(PathBuf),

    #[error("failed to parse MINiML document at byte {position}: {message}")]
    DocumentParse { position: u64, message: String },

    #[error("sample table not found: {0} (run extract first)")]
    TableNotFound(PathBuf),

    #[error("failed to read or write sample table: {0}")]
    Table(String),

    #[error("workbook not found: {0}")]
    WorkbookNotFound(PathBuf),

    #[error("workbook error: {0}")]
    Workbook(String),

    #[error("sheet '{sheet}' missing from {workbook}")]
    SheetMissing { sheet: String, workbook: String },

    #[error("sheet '{0}' has no header row")]
    EmptyTemplateSheet(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
