use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, warn};

use crate::domain::GeoSeriesAccession;
use crate::error::KiraError;
use crate::fs_util::extract_tgz_entry;
use crate::workspace::Workspace;

pub const GEO_SERIES_BASE_URL: &str = "https://ftp.ncbi.nlm.nih.gov/geo/series";

pub trait GeoClient: Send + Sync {
    /// Raw bytes of the `<accession>_family.xml.tgz` MINiML archive.
    fn fetch_family_archive(&self, accession: &GeoSeriesAccession) -> Result<Vec<u8>, KiraError>;
}

#[derive(Clone)]
pub struct GeoHttpClient {
    client: Client,
    base_url: String,
}

impl GeoHttpClient {
    pub fn new(timeout_secs: u64) -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-geo2hca/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::Filesystem(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|err| KiraError::GeoHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: GEO_SERIES_BASE_URL.to_string(),
        })
    }
}

impl GeoClient for GeoHttpClient {
    fn fetch_family_archive(&self, accession: &GeoSeriesAccession) -> Result<Vec<u8>, KiraError> {
        let url = miniml_url(&self.base_url, accession);
        debug!(%url, "requesting MINiML archive");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| KiraError::GeoHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "GEO request failed".to_string());
            return Err(KiraError::GeoStatus { status, message });
        }
        let bytes = response
            .bytes()
            .map_err(|err| KiraError::GeoHttp(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

pub fn miniml_url(base_url: &str, accession: &GeoSeriesAccession) -> String {
    format!(
        "{base}/{stub}/{acc}/miniml/{acc}_family.xml.tgz",
        base = base_url.trim_end_matches('/'),
        stub = accession.series_stub(),
        acc = accession.as_str()
    )
}

/// Downloads the MINiML archive next to the other run artifacts, extracts
/// `<accession>_family.xml` and removes the archive whatever the outcome.
pub fn download_family_document<G: GeoClient + ?Sized>(
    client: &G,
    accession: &GeoSeriesAccession,
    workspace: &Workspace,
) -> Result<Utf8PathBuf, KiraError> {
    let bytes = client.fetch_family_archive(accession)?;

    let archive_path = workspace.archive_path(accession);
    let document_path = workspace.document_path(accession);
    let outcome = Workspace::write_bytes_atomic(&archive_path, &bytes).and_then(|_| {
        let file = fs::File::open(archive_path.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        extract_tgz_entry(
            file,
            &accession.family_document_name(),
            document_path.as_std_path(),
        )
    });

    if archive_path.as_std_path().exists() {
        if let Err(err) = fs::remove_file(archive_path.as_std_path()) {
            warn!(path = %archive_path, error = %err, "failed to remove MINiML archive");
        }
    }

    outcome.map(|_| document_path)
}
