use std::fs;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::GeoSeriesAccession;
use crate::error::KiraError;

/// Directory holding every per-accession artifact of a run.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: Utf8PathBuf,
}

impl Workspace {
    pub fn new() -> Result<Self, KiraError> {
        let cwd = std::env::current_dir().map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Self::from_std_path(&cwd)
    }

    pub fn from_std_path(path: &Path) -> Result<Self, KiraError> {
        let root = Utf8PathBuf::from_path_buf(path.to_path_buf())
            .map_err(|_| KiraError::Filesystem("invalid workspace path".to_string()))?;
        Ok(Self { root })
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn archive_path(&self, accession: &GeoSeriesAccession) -> Utf8PathBuf {
        self.root.join(accession.family_archive_name())
    }

    pub fn document_path(&self, accession: &GeoSeriesAccession) -> Utf8PathBuf {
        self.root.join(accession.family_document_name())
    }

    pub fn table_path(&self, accession: &GeoSeriesAccession) -> Utf8PathBuf {
        self.root.join(accession.table_name())
    }

    pub fn workbook_path(&self, accession: &GeoSeriesAccession) -> Utf8PathBuf {
        self.root.join(accession.workbook_name())
    }

    /// Relative paths are taken from the workspace root.
    pub fn resolve(&self, path: &Path) -> Result<Utf8PathBuf, KiraError> {
        let path = Utf8PathBuf::from_path_buf(path.to_path_buf())
            .map_err(|_| KiraError::Filesystem("non-utf8 path".to_string()))?;
        if path.is_absolute() {
            Ok(path)
        } else {
            Ok(self.root.join(path))
        }
    }

    pub fn ensure_root(&self) -> Result<(), KiraError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), KiraError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(tmp_path.as_std_path(), content)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), KiraError> {
        let parent = dest
            .parent()
            .ok_or_else(|| KiraError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix("kira-geo2hca-file")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        fs::copy(source.as_std_path(), temp.path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        temp.persist(dest.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let workspace = Workspace::new_with_root(Utf8PathBuf::from("/data/run"));
        let acc: GeoSeriesAccession = "GSE00001".parse().unwrap();

        assert_eq!(
            workspace.archive_path(&acc),
            Utf8PathBuf::from("/data/run/GSE00001_family.xml.tgz")
        );
        assert!(workspace.document_path(&acc).ends_with("GSE00001_family.xml"));
        assert!(workspace.table_path(&acc).ends_with("GSE00001.tsv"));
        assert!(workspace.workbook_path(&acc).ends_with("GSE00001.xlsx"));
        assert_eq!(
            workspace
                .resolve(Path::new("hca_template.xlsx"))
                .unwrap(),
            Utf8PathBuf::from("/data/run/hca_template.xlsx")
        );
    }
}
