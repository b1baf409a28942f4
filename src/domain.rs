use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

fn series_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^GSE\d+$").expect("valid series regex"))
}

/// A GEO series accession such as `GSE102902`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeoSeriesAccession(String);

impl GeoSeriesAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// FTP directory bucket: the last three digits replaced by `nnn`.
    pub fn series_stub(&self) -> String {
        let digits = self.0.trim_start_matches("GSE");
        if digits.len() <= 3 {
            return "GSEnnn".to_string();
        }
        let head = &digits[..digits.len() - 3];
        format!("GSE{head}nnn")
    }

    pub fn family_archive_name(&self) -> String {
        format!("{}_family.xml.tgz", self.0)
    }

    pub fn family_document_name(&self) -> String {
        format!("{}_family.xml", self.0)
    }

    pub fn table_name(&self) -> String {
        format!("{}.tsv", self.0)
    }

    pub fn workbook_name(&self) -> String {
        format!("{}.xlsx", self.0)
    }
}

impl fmt::Display for GeoSeriesAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GeoSeriesAccession {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        if !series_pattern().is_match(&normalized) {
            return Err(KiraError::InvalidSeriesAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}
