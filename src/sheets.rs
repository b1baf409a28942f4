//! Merging the flattened sample table into the HCA metadata workbook.
//!
//! Every sheet keeps its leading header block (column header plus template
//! example rows) verbatim and receives a freshly built body. Target columns
//! that the template does not define are skipped with a warning.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::ResolvedConfig;
use crate::domain::GeoSeriesAccession;
use crate::error::KiraError;
use crate::table::{self, SampleTable};
use crate::workbook::{Grid, WorkbookStore};

pub const SPECIMEN_SHEET: &str = "Specimen from organism";
pub const CELL_SUSPENSION_SHEET: &str = "Cell suspension";
pub const LIBRARY_PREPARATION_SHEET: &str = "Library preparation protocol";
pub const SEQUENCING_SHEET: &str = "Sequencing protocol";
pub const ANALYSIS_FILE_SHEET: &str = "Analysis file";

pub const CELL_SUSPENSION_ID: &str = "CELL SUSPENSION ID (Required)";
pub const LIBRARY_CONSTRUCTION_METHOD: &str = "LIBRARY CONSTRUCTION METHOD (Required)";
pub const INSTRUMENT_MODEL: &str = "INSTRUMENT MANUFACTURER AND MODEL (Required)";
pub const SEQUENCING_PROTOCOL_NAME: &str = "SEQUENCING PROTOCOL NAME";
pub const SEQUENCING_PROTOCOL_ID: &str = "SEQUENCING PROTOCOL ID (Required)";
pub const FILE_NAME: &str = "FILE NAME (Required)";
pub const FILE_FORMAT: &str = "FILE FORMAT (Required)";
pub const FILE_SOURCE: &str = "FILE SOURCE";
pub const NCBI_TAXON_ID: &str = "NCBI TAXON ID (Required)";

/// Separator of the aggregate identifier given to series-level files.
pub const SERIES_ID_SEPARATOR: &str = "||";

/// Table column copied into a sheet column.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub source: &'static str,
    pub target: &'static str,
}

const fn map(source: &'static str, target: &'static str) -> FieldMapping {
    FieldMapping { source, target }
}

pub const SPECIMEN_FIELDS: &[FieldMapping] = &[
    map(table::SAMPLE_ID, "SPECIMEN FROM ORGANISM ID (Required)"),
    map(table::TITLE, "SPECIMEN FROM ORGANISM NAME"),
    map(table::BIOSAMPLE_ID, "BIOSAMPLES ACCESSION"),
    map(table::ORGANISM, "GENUS SPECIES (Required)"),
];

pub const CELL_SUSPENSION_FIELDS: &[FieldMapping] = &[
    map(table::SAMPLE_ID, CELL_SUSPENSION_ID),
    map(table::TITLE, "CELL SUSPENSION NAME"),
    map(table::BIOSAMPLE_ID, "BIOSAMPLES ACCESSION"),
    map(table::ORGANISM, "GENUS SPECIES (Required)"),
];

/// A sheet split into its preserved header block and a body under
/// construction.
#[derive(Debug, Clone)]
pub struct SheetFrame {
    name: String,
    preserved: Vec<Vec<String>>,
    body: Vec<Vec<String>>,
    missing: HashSet<String>,
}

impl SheetFrame {
    /// `header_row_count` counts the column-header row itself.
    pub fn from_template(
        name: &str,
        template: &Grid,
        header_row_count: usize,
    ) -> Result<Self, KiraError> {
        if template.header().is_none_or(|header| header.is_empty()) {
            return Err(KiraError::EmptyTemplateSheet(name.to_string()));
        }
        let keep = header_row_count.max(1);
        Ok(Self {
            name: name.to_string(),
            preserved: template.rows.iter().take(keep).cloned().collect(),
            body: Vec::new(),
            missing: HashSet::new(),
        })
    }

    pub fn header(&self) -> &[String] {
        &self.preserved[0]
    }

    fn column_index(&mut self, column: &str) -> Option<usize> {
        let index = self.header().iter().position(|cell| cell == column);
        if index.is_none() && self.missing.insert(column.to_string()) {
            warn!(sheet = %self.name, column, "template has no such column; values dropped");
        }
        index
    }

    /// Appends a body row with the given named cells; other cells stay empty.
    pub fn push_row(&mut self, cells: &[(&str, &str)]) {
        let mut row = vec![String::new(); self.header().len()];
        for (column, value) in cells {
            if let Some(index) = self.column_index(column) {
                row[index] = value.to_string();
            }
        }
        self.body.push(row);
    }

    /// Appends a row verbatim.
    pub fn push_raw(&mut self, row: Vec<String>) {
        self.body.push(row);
    }

    /// Preserved rows followed by the body. A template shorter than the
    /// configured header block keeps all of its rows.
    pub fn into_filled(self) -> FilledSheet {
        let header_rows = self.preserved.len();
        let mut rows = self.preserved;
        rows.extend(self.body);
        FilledSheet {
            grid: Grid::new(rows),
            header_rows,
        }
    }
}

/// A rebuilt sheet and the count of leading rows carried over from its
/// template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilledSheet {
    pub grid: Grid,
    pub header_rows: usize,
}

impl FilledSheet {
    pub fn body(&self) -> &[Vec<String>] {
        &self.grid.rows[self.header_rows..]
    }

    /// Values of a named column in the body rows.
    pub fn column_values(&self, column: &str) -> Vec<&str> {
        self.grid.column_below(column, self.header_rows)
    }
}

fn fill_direct(
    name: &str,
    template: &Grid,
    header_row_count: usize,
    table: &SampleTable,
    fields: &[FieldMapping],
    taxon_id: &str,
) -> Result<FilledSheet, KiraError> {
    let mut frame = SheetFrame::from_template(name, template, header_row_count)?;
    for row in table.rows() {
        let mut cells: Vec<(&str, &str)> = fields
            .iter()
            .map(|field| (field.target, table.cell(row, field.source)))
            .collect();
        cells.push((NCBI_TAXON_ID, taxon_id));
        frame.push_row(&cells);
    }
    Ok(frame.into_filled())
}

pub fn fill_specimen(
    template: &Grid,
    table: &SampleTable,
    config: &ResolvedConfig,
) -> Result<FilledSheet, KiraError> {
    fill_direct(
        SPECIMEN_SHEET,
        template,
        config.header_rows.specimen,
        table,
        SPECIMEN_FIELDS,
        &config.taxon_id,
    )
}

pub fn fill_cell_suspension(
    template: &Grid,
    table: &SampleTable,
    config: &ResolvedConfig,
) -> Result<FilledSheet, KiraError> {
    fill_direct(
        CELL_SUSPENSION_SHEET,
        template,
        config.header_rows.cell_suspension,
        table,
        CELL_SUSPENSION_FIELDS,
        &config.taxon_id,
    )
}

/// Fan-out join: for every distinct library strategy, append each catalog
/// row whose construction method contains it (case-insensitive). A catalog
/// row matching several strategies is appended once per strategy.
pub fn fill_library_preparation(
    catalog: &Grid,
    table: &SampleTable,
    config: &ResolvedConfig,
) -> Result<FilledSheet, KiraError> {
    let header_rows = config.header_rows.library_preparation.max(1);
    let mut frame = SheetFrame::from_template(LIBRARY_PREPARATION_SHEET, catalog, header_rows)?;

    let Some(method_index) = catalog.column_index(LIBRARY_CONSTRUCTION_METHOD) else {
        warn!(
            column = LIBRARY_CONSTRUCTION_METHOD,
            "library protocol catalog has no construction method column"
        );
        return Ok(frame.into_filled());
    };
    if !table.has_column(table::LIBRARY_STRATEGY) {
        warn!("sample table has no library strategy column");
    }

    for strategy in table.distinct_values(table::LIBRARY_STRATEGY) {
        let needle = strategy.to_lowercase();
        let matches: Vec<&Vec<String>> = catalog
            .rows
            .iter()
            .skip(header_rows)
            .filter(|row| {
                row.get(method_index)
                    .is_some_and(|method| method.to_lowercase().contains(&needle))
            })
            .collect();
        if matches.is_empty() {
            warn!(strategy, "no library protocol matches strategy");
        }
        for row in matches {
            frame.push_raw(row.clone());
        }
    }
    Ok(frame.into_filled())
}

/// One protocol per distinct instrument model.
pub fn fill_sequencing_protocol(
    template: &Grid,
    table: &SampleTable,
    config: &ResolvedConfig,
) -> Result<FilledSheet, KiraError> {
    let mut frame =
        SheetFrame::from_template(SEQUENCING_SHEET, template, config.header_rows.sequencing)?;
    for model in table.distinct_values(table::INSTRUMENT_MODEL) {
        let protocol_id = sequencing_protocol_id(model);
        frame.push_row(&[
            (INSTRUMENT_MODEL, model),
            (SEQUENCING_PROTOCOL_NAME, model),
            (SEQUENCING_PROTOCOL_ID, protocol_id.as_str()),
        ]);
    }
    Ok(frame.into_filled())
}

pub fn sequencing_protocol_id(model: &str) -> String {
    model.replace(' ', "_")
}

/// A supplementary file listed in the MINiML document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub name: String,
    pub format: String,
    /// Owning cell suspension, or the aggregate identifier for series-level files.
    pub owner: Option<String>,
    pub source: String,
}

impl FileRecord {
    pub fn from_listing(listing: &str, source: &str) -> Self {
        let name = listing
            .trim()
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        let format = name
            .rsplit_once('.')
            .map(|(_, suffix)| suffix.to_string())
            .unwrap_or_default();
        Self {
            name,
            format,
            owner: None,
            source: source.to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        self.name.split('_').next().unwrap_or_default()
    }
}

/// Resolves owners: files named after the series get every sample ID joined
/// with `||`; others get their underscore prefix when it is a known cell
/// suspension, and no owner otherwise.
pub fn derive_file_records(
    listings: &[String],
    accession: &GeoSeriesAccession,
    cell_suspension_ids: &[&str],
    sample_ids: &[&str],
    source: &str,
) -> Vec<FileRecord> {
    let known: HashSet<&str> = cell_suspension_ids
        .iter()
        .copied()
        .filter(|id| !id.is_empty())
        .collect();
    let series_owner = sample_ids.join(SERIES_ID_SEPARATOR);

    listings
        .iter()
        .map(|listing| FileRecord::from_listing(listing, source))
        .filter(|file| !file.name.is_empty())
        .map(|mut file| {
            if is_series_file(&file.name, accession) {
                file.owner = Some(series_owner.clone());
            } else if known.contains(file.prefix()) {
                file.owner = Some(file.prefix().to_string());
            } else {
                warn!(file = %file.name, "no cell suspension matches file prefix");
            }
            file
        })
        .collect()
}

/// `GSE1_RAW.tar` and `GSE1.txt` belong to `GSE1`; `GSE10_RAW.tar` does not.
pub fn is_series_file(name: &str, accession: &GeoSeriesAccession) -> bool {
    name.strip_prefix(accession.as_str())
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(['_', '.']))
}

pub fn fill_analysis_files(
    template: &Grid,
    files: &[FileRecord],
    config: &ResolvedConfig,
) -> Result<FilledSheet, KiraError> {
    let mut frame =
        SheetFrame::from_template(ANALYSIS_FILE_SHEET, template, config.header_rows.analysis_file)?;
    for file in files {
        frame.push_row(&[
            (FILE_NAME, file.name.as_str()),
            (FILE_FORMAT, file.format.as_str()),
            (FILE_SOURCE, file.source.as_str()),
            (CELL_SUSPENSION_ID, file.owner.as_deref().unwrap_or("")),
        ]);
    }
    Ok(frame.into_filled())
}

#[derive(Debug, Clone, Serialize)]
pub struct SheetWrite {
    pub sheet: String,
    pub body_rows: usize,
}

/// Hooks called after each sheet is saved.
pub trait SheetObserver {
    fn sheet_written(&self, write: &SheetWrite);
}

/// Fills and saves the five sheets in order, saving after each one.
pub struct Projector<'a> {
    pub accession: &'a GeoSeriesAccession,
    pub config: &'a ResolvedConfig,
    pub table: &'a SampleTable,
    pub supplementary_files: &'a [String],
}

impl Projector<'_> {
    pub fn run(
        &self,
        template: &dyn WorkbookStore,
        catalog: &dyn WorkbookStore,
        target: &mut dyn WorkbookStore,
        observer: &dyn SheetObserver,
    ) -> Result<Vec<SheetWrite>, KiraError> {
        let mut writes = Vec::new();

        let specimen = fill_specimen(&template.load_sheet(SPECIMEN_SHEET)?, self.table, self.config)?;
        writes.push(save(target, SPECIMEN_SHEET, &specimen, observer)?);

        let cell_suspension = fill_cell_suspension(
            &template.load_sheet(CELL_SUSPENSION_SHEET)?,
            self.table,
            self.config,
        )?;
        writes.push(save(target, CELL_SUSPENSION_SHEET, &cell_suspension, observer)?);

        let library = fill_library_preparation(
            &catalog.load_sheet(LIBRARY_PREPARATION_SHEET)?,
            self.table,
            self.config,
        )?;
        writes.push(save(target, LIBRARY_PREPARATION_SHEET, &library, observer)?);

        let sequencing = fill_sequencing_protocol(
            &template.load_sheet(SEQUENCING_SHEET)?,
            self.table,
            self.config,
        )?;
        writes.push(save(target, SEQUENCING_SHEET, &sequencing, observer)?);

        let cell_ids = cell_suspension.column_values(CELL_SUSPENSION_ID);
        let files = derive_file_records(
            self.supplementary_files,
            self.accession,
            &cell_ids,
            &self.table.sample_ids(),
            &self.config.file_source,
        );
        info!(files = files.len(), "derived analysis file records");
        let analysis = fill_analysis_files(
            &template.load_sheet(ANALYSIS_FILE_SHEET)?,
            &files,
            self.config,
        )?;
        writes.push(save(target, ANALYSIS_FILE_SHEET, &analysis, observer)?);

        Ok(writes)
    }
}

fn save(
    target: &mut dyn WorkbookStore,
    sheet: &str,
    filled: &FilledSheet,
    observer: &dyn SheetObserver,
) -> Result<SheetWrite, KiraError> {
    target.save_sheet(sheet, &filled.grid)?;
    let write = SheetWrite {
        sheet: sheet.to_string(),
        body_rows: filled.body().len(),
    };
    observer.sheet_written(&write);
    Ok(write)
}
