use std::fs;
use std::io::{self, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;

use crate::error::KiraError;

/// Unpacks the entry whose file name equals `entry_name` from a gzip tar
/// stream into `destination`. Other entries are skipped. The entry is
/// staged in a temporary file next to `destination`, so a failed or short
/// read leaves nothing behind.
pub fn extract_tgz_entry<R: Read>(
    reader: R,
    entry_name: &str,
    destination: &Path,
) -> Result<(), KiraError> {
    let mut archive = Archive::new(GzDecoder::new(reader));
    let entries = archive
        .entries()
        .map_err(|err| KiraError::Archive(err.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|err| KiraError::Archive(err.to_string()))?;
        let matches = {
            let path = entry
                .path()
                .map_err(|err| KiraError::Archive(err.to_string()))?;
            path.file_name()
                .map(|name| name == entry_name)
                .unwrap_or(false)
        };
        if !matches || !entry.header().entry_type().is_file() {
            continue;
        }

        let parent = destination
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix("kira-geo2hca-entry")
            .tempfile_in(parent)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;

        let expected = entry.size();
        let written = io::copy(&mut entry, temp.as_file_mut())
            .map_err(|err| KiraError::Archive(err.to_string()))?;
        if written != expected {
            return Err(KiraError::Archive(format!(
                "{entry_name} truncated: {written} of {expected} bytes"
            )));
        }
        temp.persist(destination)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        return Ok(());
    }

    Err(KiraError::ArchiveEntryMissing(entry_name.to_string()))
}
