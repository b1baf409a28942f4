use std::collections::{BTreeMap, HashSet};

use camino::Utf8Path;
use csv::{ReaderBuilder, WriterBuilder};

use crate::error::KiraError;
use crate::miniml::SampleRecord;

pub const SAMPLE_ID: &str = "Sample_ID";
pub const TITLE: &str = "Title";
pub const ORGANISM: &str = "Organism";
pub const TAXONOMY_ID: &str = "Taxonomy_ID";
pub const BIOSAMPLE_ID: &str = "BioSample_ID";
pub const PLATFORM_ID: &str = "Platform_ID";
pub const LIBRARY_STRATEGY: &str = "Library strategy";
pub const INSTRUMENT_MODEL: &str = "Instrument model";

pub const FIXED_COLUMNS: [&str; 8] = [
    SAMPLE_ID,
    TITLE,
    ORGANISM,
    TAXONOMY_ID,
    BIOSAMPLE_ID,
    PLATFORM_ID,
    LIBRARY_STRATEGY,
    INSTRUMENT_MODEL,
];

pub type Row = BTreeMap<String, String>;

/// Flattened samples with a column set shared by every row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleTable {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl SampleTable {
    /// Fixed columns first, then characteristic tags in order of first
    /// appearance across records.
    pub fn from_records(records: &[SampleRecord]) -> Self {
        let mut columns: Vec<String> = FIXED_COLUMNS.iter().map(|c| c.to_string()).collect();
        let mut known: HashSet<String> = columns.iter().cloned().collect();
        for record in records {
            for (tag, _) in &record.characteristics {
                if known.insert(tag.clone()) {
                    columns.push(tag.clone());
                }
            }
        }

        let rows = records.iter().map(flatten).collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Absent cells read as the empty string.
    pub fn cell<'a>(&'a self, row: &'a Row, column: &str) -> &'a str {
        row.get(column).map(String::as_str).unwrap_or("")
    }

    pub fn column_values(&self, column: &str) -> Vec<&str> {
        self.rows.iter().map(|row| self.cell(row, column)).collect()
    }

    /// Non-empty values of `column` in order of first appearance.
    pub fn distinct_values(&self, column: &str) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.column_values(column)
            .into_iter()
            .filter(|value| !value.is_empty() && seen.insert(*value))
            .collect()
    }

    pub fn sample_ids(&self) -> Vec<&str> {
        self.column_values(SAMPLE_ID)
    }

    pub fn write_tsv(&self, path: &Utf8Path) -> Result<(), KiraError> {
        let mut writer = WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(Vec::new());
        writer
            .write_record(&self.columns)
            .map_err(|err| KiraError::Table(err.to_string()))?;
        for row in &self.rows {
            writer
                .write_record(self.columns.iter().map(|column| self.cell(row, column)))
                .map_err(|err| KiraError::Table(err.to_string()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| KiraError::Table(err.to_string()))?;
        crate::workspace::Workspace::write_bytes_atomic(path, &bytes)
    }

    pub fn read_tsv(path: &Utf8Path) -> Result<Self, KiraError> {
        if !path.as_std_path().exists() {
            return Err(KiraError::TableNotFound(path.as_std_path().to_path_buf()));
        }
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(path.as_std_path())
            .map_err(|err| KiraError::Table(err.to_string()))?;
        let columns: Vec<String> = reader
            .headers()
            .map_err(|err| KiraError::Table(err.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|err| KiraError::Table(err.to_string()))?;
            let row = columns
                .iter()
                .zip(record.iter())
                .map(|(column, value)| (column.clone(), value.to_string()))
                .collect();
            rows.push(row);
        }
        Ok(Self { columns, rows })
    }
}

fn flatten(record: &SampleRecord) -> Row {
    let mut row = Row::new();
    row.insert(SAMPLE_ID.to_string(), record.id.clone());
    row.insert(TITLE.to_string(), record.title.clone());
    row.insert(ORGANISM.to_string(), record.organism.clone());
    row.insert(TAXONOMY_ID.to_string(), record.taxid.clone());
    row.insert(BIOSAMPLE_ID.to_string(), record.biosample.clone());
    row.insert(PLATFORM_ID.to_string(), record.platform.clone());
    row.insert(LIBRARY_STRATEGY.to_string(), record.library_strategy.clone());
    row.insert(INSTRUMENT_MODEL.to_string(), record.instrument_model.clone());
    for (tag, value) in &record.characteristics {
        row.insert(tag.clone(), value.clone());
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, characteristics: &[(&str, &str)]) -> SampleRecord {
        SampleRecord {
            id: id.to_string(),
            title: format!("{id} title"),
            organism: "Homo sapiens".to_string(),
            taxid: "9606".to_string(),
            biosample: format!("SAMN{id}"),
            platform: "GPL1".to_string(),
            library_strategy: "RNA-Seq".to_string(),
            instrument_model: "Illumina HiSeq 2500".to_string(),
            characteristics: characteristics
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn columns_are_union_of_fixed_and_characteristics() {
        let table = SampleTable::from_records(&[
            record("GSM1", &[("tissue", "lung"), ("age", "40")]),
            record("GSM2", &[("sex", "F"), ("tissue", "liver")]),
        ]);

        let mut expected: Vec<&str> = FIXED_COLUMNS.to_vec();
        expected.extend(["tissue", "age", "sex"]);
        assert_eq!(table.columns(), expected.as_slice());
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(&table.rows()[0], "sex"), "");
        assert_eq!(table.cell(&table.rows()[1], "age"), "");
    }

    #[test]
    fn tsv_round_trip_preserves_rows_and_column_order() {
        let table = SampleTable::from_records(&[
            record("GSM1", &[("tissue", "lung"), ("note", "has\ttab")]),
            record("GSM2", &[("stage", "E14.5")]),
        ]);
        let temp = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(temp.path().join("GSE1.tsv")).unwrap();

        table.write_tsv(&path).unwrap();
        let loaded = SampleTable::read_tsv(&path).unwrap();

        assert_eq!(loaded.columns(), table.columns());
        for (left, right) in loaded.rows().iter().zip(table.rows()) {
            for column in table.columns() {
                assert_eq!(loaded.cell(left, column), table.cell(right, column));
            }
        }
        assert_eq!(loaded.len(), table.len());
    }

    #[test]
    fn distinct_values_skip_empty_and_keep_first_order() {
        let mut a = record("GSM1", &[]);
        a.instrument_model = "NextSeq 500".to_string();
        let b = record("GSM2", &[]);
        let mut c = record("GSM3", &[]);
        c.instrument_model = "NextSeq 500".to_string();
        let mut d = record("GSM4", &[]);
        d.instrument_model = String::new();

        let table = SampleTable::from_records(&[a, b, c, d]);
        assert_eq!(
            table.distinct_values(INSTRUMENT_MODEL),
            vec!["NextSeq 500", "Illumina HiSeq 2500"]
        );
    }
}
