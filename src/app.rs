use std::fs;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use crate::config::ResolvedConfig;
use crate::domain::GeoSeriesAccession;
use crate::error::KiraError;
use crate::filter::{FilterOutcome, SampleFilter};
use crate::geo::{GeoClient, download_family_document};
use crate::miniml::{SkippedSample, parse_document};
use crate::sheets::{Projector, SheetObserver, SheetWrite};
use crate::table::SampleTable;
use crate::workbook::{WorkbookStore, XlsxWorkbook};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Serialize)]
pub struct ExtractResult {
    pub accession: String,
    pub document_path: String,
    pub table_path: String,
    pub total_samples: usize,
    pub selected_samples: usize,
    pub filter: FilterOutcome,
    pub skipped: Vec<SkippedSample>,
    pub columns: usize,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectResult {
    pub accession: String,
    pub workbook_path: String,
    pub sheets: Vec<SheetWrite>,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub extract: ExtractResult,
    pub project: ProjectResult,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            elapsed: None,
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

struct SheetProgress<'a> {
    sink: &'a dyn ProgressSink,
    workbook: String,
}

impl SheetObserver for SheetProgress<'_> {
    fn sheet_written(&self, write: &SheetWrite) {
        self.sink.event(ProgressEvent::message(format!(
            "Wrote {} tab to {}",
            write.sheet, self.workbook
        )));
    }
}

#[derive(Clone)]
pub struct App<G: GeoClient> {
    workspace: Workspace,
    config: ResolvedConfig,
    geo: G,
}

impl<G: GeoClient> App<G> {
    pub fn new(workspace: Workspace, config: ResolvedConfig, geo: G) -> Self {
        Self {
            workspace,
            config,
            geo,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// fetch, parse, filter, flatten, and write `<accession>.tsv`.
    pub fn extract(
        &self,
        accession: &GeoSeriesAccession,
        filter: &SampleFilter,
        sink: &dyn ProgressSink,
    ) -> Result<ExtractResult, KiraError> {
        self.workspace.ensure_root()?;

        sink.event(ProgressEvent::message(format!(
            "Downloading MINiML file for accession {accession}..."
        )));
        let start = Instant::now();
        let document_path = download_family_document(&self.geo, accession, &self.workspace)?;
        sink.event(ProgressEvent {
            message: format!("Extracted MINiML file: {}", accession.family_document_name()),
            elapsed: Some(start.elapsed()),
        });

        let xml = fs::read_to_string(document_path.as_std_path())
            .map_err(|err| KiraError::Filesystem(format!("read {document_path}: {err}")))?;
        let document = parse_document(&xml)?;
        let outcome = document.records();
        let total_samples = outcome.records.len();
        sink.event(ProgressEvent::message(format!(
            "Parsed {} samples ({} skipped)",
            total_samples,
            outcome.skipped.len()
        )));
        for skipped in &outcome.skipped {
            sink.event(ProgressEvent::message(format!(
                "Skipped sample {}: {}",
                skipped.id.as_deref().unwrap_or("<unknown>"),
                skipped.reason
            )));
        }

        let selection = filter.apply(outcome.records);
        match selection.outcome {
            FilterOutcome::Fallback => sink.event(ProgressEvent::message(format!(
                "No samples matched filter ({}); falling back to all {} samples",
                filter.describe(),
                selection.records.len()
            ))),
            FilterOutcome::Matched => sink.event(ProgressEvent::message(format!(
                "Selected {} of {} samples ({})",
                selection.records.len(),
                total_samples,
                filter.describe()
            ))),
            FilterOutcome::Unfiltered => {}
        }

        let table = SampleTable::from_records(&selection.records);
        let table_path = self.workspace.table_path(accession);
        table.write_tsv(&table_path)?;
        info!(path = %table_path, rows = table.len(), columns = table.columns().len(), "wrote sample table");
        sink.event(ProgressEvent::message(format!(
            "Wrote {} rows to {}",
            table.len(),
            accession.table_name()
        )));

        Ok(ExtractResult {
            accession: accession.to_string(),
            document_path: document_path.to_string(),
            table_path: table_path.to_string(),
            total_samples,
            selected_samples: table.len(),
            filter: selection.outcome,
            skipped: outcome.skipped,
            columns: table.columns().len(),
            generated_at: iso_timestamp(),
        })
    }

    /// Merges `<accession>.tsv` and the MINiML document into `<accession>.xlsx`.
    pub fn project(
        &self,
        accession: &GeoSeriesAccession,
        sink: &dyn ProgressSink,
    ) -> Result<ProjectResult, KiraError> {
        let template_path = self.workspace.resolve(&self.config.template)?;
        let library_path = self.workspace.resolve(&self.config.library_template)?;
        let workbook_path = self.workspace.workbook_path(accession);

        let template = XlsxWorkbook::open(&template_path)?;
        let catalog = XlsxWorkbook::open(&library_path)?;
        let mut target = XlsxWorkbook::create_or_copy(&template_path, &workbook_path)?;

        self.project_into(accession, &template, &catalog, &mut target, sink)
    }

    /// Projection against arbitrary workbook stores.
    pub fn project_into(
        &self,
        accession: &GeoSeriesAccession,
        template: &dyn WorkbookStore,
        catalog: &dyn WorkbookStore,
        target: &mut dyn WorkbookStore,
        sink: &dyn ProgressSink,
    ) -> Result<ProjectResult, KiraError> {
        let table_path = self.workspace.table_path(accession);
        let table = SampleTable::read_tsv(&table_path)?;

        let document_path = self.workspace.document_path(accession);
        if !document_path.as_std_path().exists() {
            return Err(KiraError::DocumentNotFound(
                document_path.as_std_path().to_path_buf(),
            ));
        }
        let xml = fs::read_to_string(document_path.as_std_path())
            .map_err(|err| KiraError::Filesystem(format!("read {document_path}: {err}")))?;
        let document = parse_document(&xml)?;

        let projector = Projector {
            accession,
            config: &self.config,
            table: &table,
            supplementary_files: &document.supplementary_files,
        };
        let observer = SheetProgress {
            sink,
            workbook: accession.workbook_name(),
        };
        let sheets = projector.run(template, catalog, target, &observer)?;

        Ok(ProjectResult {
            accession: accession.to_string(),
            workbook_path: self.workspace.workbook_path(accession).to_string(),
            sheets,
            generated_at: iso_timestamp(),
        })
    }

    pub fn run(
        &self,
        accession: &GeoSeriesAccession,
        filter: &SampleFilter,
        sink: &dyn ProgressSink,
    ) -> Result<RunResult, KiraError> {
        let extract = self.extract(accession, filter, sink)?;
        let project = self.project(accession, sink)?;
        Ok(RunResult { extract, project })
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
