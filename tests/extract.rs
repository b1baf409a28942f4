mod common;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use kira_geo2hca::app::App;
use kira_geo2hca::config::ResolvedConfig;
use kira_geo2hca::domain::GeoSeriesAccession;
use kira_geo2hca::error::KiraError;
use kira_geo2hca::filter::{FilterOutcome, HUMAN_ORGANISM, SampleFilter};
use kira_geo2hca::table::SampleTable;
use kira_geo2hca::workspace::Workspace;

use common::{MockGeo, RecordingSink, family_archive, human_and_mouse};

fn workspace(temp: &tempfile::TempDir) -> Workspace {
    Workspace::new_with_root(Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap())
}

fn accession() -> GeoSeriesAccession {
    "GSE00001".parse().unwrap()
}

#[test]
fn organism_filter_keeps_matching_samples() {
    let temp = tempfile::tempdir().unwrap();
    let geo = MockGeo::serving(family_archive("GSE00001", &human_and_mouse("GSE00001")));
    let app = App::new(workspace(&temp), ResolvedConfig::default(), geo);
    let sink = RecordingSink::default();
    let filter = SampleFilter {
        organism: Some(HUMAN_ORGANISM.to_string()),
        platform: None,
    };

    let result = app.extract(&accession(), &filter, &sink).unwrap();
    assert_eq!(result.total_samples, 2);
    assert_eq!(result.selected_samples, 1);
    assert_eq!(result.filter, FilterOutcome::Matched);
    assert!(result.skipped.is_empty());

    let table = SampleTable::read_tsv(&app.workspace().table_path(&accession())).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(
        &table.columns()[..8],
        [
            "Sample_ID",
            "Title",
            "Organism",
            "Taxonomy_ID",
            "BioSample_ID",
            "Platform_ID",
            "Library strategy",
            "Instrument model",
        ]
    );
    let row = &table.rows()[0];
    assert_eq!(table.cell(row, "Sample_ID"), "GSM1");
    assert_eq!(table.cell(row, "Taxonomy_ID"), "9606");
    assert_eq!(table.cell(row, "BioSample_ID"), "SAMN_GSM1");
    assert_eq!(table.cell(row, "Instrument model"), "Illumina HiSeq 2500");
    assert_eq!(table.cell(row, "tissue"), "lung");
    // columns come from the selected records only
    assert!(!table.has_column("strain"));

    let messages = sink.messages();
    assert_eq!(
        messages[0],
        "Downloading MINiML file for accession GSE00001..."
    );
    assert!(
        messages
            .iter()
            .any(|message| message == "Extracted MINiML file: GSE00001_family.xml")
    );
}

#[test]
fn unmatched_filter_falls_back_to_every_sample() {
    let temp = tempfile::tempdir().unwrap();
    let geo = MockGeo::serving(family_archive("GSE00001", &human_and_mouse("GSE00001")));
    let app = App::new(workspace(&temp), ResolvedConfig::default(), geo);
    let sink = RecordingSink::default();
    let filter = SampleFilter {
        organism: None,
        platform: Some("GPL999".to_string()),
    };

    let result = app.extract(&accession(), &filter, &sink).unwrap();
    assert_eq!(result.filter, FilterOutcome::Fallback);
    assert_eq!(result.selected_samples, 2);

    let table = SampleTable::read_tsv(&app.workspace().table_path(&accession())).unwrap();
    assert_eq!(table.sample_ids(), vec!["GSM1", "GSM2"]);
    assert!(table.has_column("tissue"));
    assert!(table.has_column("strain"));
    assert!(
        sink.messages()
            .iter()
            .any(|message| message.starts_with("No samples matched filter"))
    );
}

#[test]
fn archive_is_removed_after_extraction() {
    let temp = tempfile::tempdir().unwrap();
    let geo = MockGeo::serving(family_archive("GSE00001", &human_and_mouse("GSE00001")));
    let app = App::new(workspace(&temp), ResolvedConfig::default(), geo);

    app.extract(&accession(), &SampleFilter::default(), &RecordingSink::default())
        .unwrap();

    let ws = app.workspace();
    assert!(!ws.archive_path(&accession()).exists());
    assert!(ws.document_path(&accession()).exists());
    assert!(ws.table_path(&accession()).exists());
}

#[test]
fn archive_without_family_document_fails_and_is_removed() {
    let temp = tempfile::tempdir().unwrap();
    let geo = MockGeo::serving(family_archive("GSE99999", &human_and_mouse("GSE99999")));
    let app = App::new(workspace(&temp), ResolvedConfig::default(), geo);

    let err = app
        .extract(&accession(), &SampleFilter::default(), &RecordingSink::default())
        .unwrap_err();
    assert_matches!(err, KiraError::ArchiveEntryMissing(_));
    assert!(!app.workspace().archive_path(&accession()).exists());
    assert!(!app.workspace().table_path(&accession()).exists());
}

#[test]
fn download_failure_writes_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(workspace(&temp), ResolvedConfig::default(), MockGeo::offline());

    let err = app
        .extract(&accession(), &SampleFilter::default(), &RecordingSink::default())
        .unwrap_err();
    assert_matches!(err, KiraError::GeoHttp(_));
    assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[test]
fn malformed_document_aborts_extraction() {
    let temp = tempfile::tempdir().unwrap();
    let geo = MockGeo::serving(family_archive(
        "GSE00001",
        "<MINiML><Sample iid=\"GSM1\"><Title>t</Sample></MINiML>",
    ));
    let app = App::new(workspace(&temp), ResolvedConfig::default(), geo);

    let err = app
        .extract(&accession(), &SampleFilter::default(), &RecordingSink::default())
        .unwrap_err();
    assert_matches!(err, KiraError::DocumentParse { .. });
    assert!(!app.workspace().table_path(&accession()).exists());
}
