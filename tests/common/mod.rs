#![allow(dead_code)]

use std::io::Write;
use std::sync::Mutex;

use flate2::Compression;
use flate2::write::GzEncoder;

use kira_geo2hca::app::{ProgressEvent, ProgressSink};
use kira_geo2hca::domain::GeoSeriesAccession;
use kira_geo2hca::error::KiraError;
use kira_geo2hca::geo::GeoClient;

pub struct MockGeo {
    archive: Option<Vec<u8>>,
}

impl MockGeo {
    pub fn serving(archive: Vec<u8>) -> Self {
        Self {
            archive: Some(archive),
        }
    }

    pub fn offline() -> Self {
        Self { archive: None }
    }
}

impl GeoClient for MockGeo {
    fn fetch_family_archive(&self, _accession: &GeoSeriesAccession) -> Result<Vec<u8>, KiraError> {
        self.archive
            .clone()
            .ok_or_else(|| KiraError::GeoHttp("connection refused".to_string()))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

pub fn family_archive(accession: &str, xml: &str) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let name = format!("{accession}_family.xml");
    let mut header = tar::Header::new_gnu();
    header.set_size(xml.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, xml.as_bytes()).unwrap();
    let mut encoder = builder.into_inner().unwrap();
    encoder.flush().unwrap();
    encoder.finish().unwrap()
}

pub struct SampleFixture<'a> {
    pub id: &'a str,
    pub organism: &'a str,
    pub taxid: &'a str,
    pub platform: &'a str,
    pub strategy: &'a str,
    pub instrument: &'a str,
    pub characteristics: &'a [(&'a str, &'a str)],
}

pub fn miniml(accession: &str, samples: &[SampleFixture<'_>]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<MINiML xmlns=\"http://www.ncbi.nlm.nih.gov/geo/info/MINiML\" version=\"0.5.0\">\n",
    );
    for sample in samples {
        xml.push_str(&format!("  <Sample iid=\"{}\">\n", sample.id));
        xml.push_str(&format!("    <Title>{} title</Title>\n", sample.id));
        xml.push_str("    <Channel position=\"1\">\n");
        xml.push_str(&format!(
            "      <Organism taxid=\"{}\">{}</Organism>\n",
            sample.taxid, sample.organism
        ));
        for (tag, value) in sample.characteristics {
            xml.push_str(&format!(
                "      <Characteristics tag=\"{tag}\">{value}</Characteristics>\n"
            ));
        }
        xml.push_str("    </Channel>\n");
        xml.push_str(&format!("    <Platform-Ref ref=\"{}\" />\n", sample.platform));
        xml.push_str(&format!(
            "    <Library-Strategy>{}</Library-Strategy>\n",
            sample.strategy
        ));
        xml.push_str(&format!(
            "    <Instrument-Model><Predefined>{}</Predefined></Instrument-Model>\n",
            sample.instrument
        ));
        xml.push_str(&format!(
            "    <Supplementary-Data type=\"TXT\">ftp://ftp.ncbi.nlm.nih.gov/geo/samples/GSMnnn/{id}/suppl/{id}_counts.txt.gz</Supplementary-Data>\n",
            id = sample.id
        ));
        xml.push_str(&format!(
            "    <Relation type=\"BioSample\" target=\"https://www.ncbi.nlm.nih.gov/biosample/SAMN_{}\" />\n",
            sample.id
        ));
        xml.push_str("  </Sample>\n");
    }
    xml.push_str(&format!(
        "  <Series iid=\"{accession}\">\n    <Title>series</Title>\n    <Supplementary-Data type=\"TAR\">ftp://ftp.ncbi.nlm.nih.gov/geo/series/GSEnnn/{accession}/suppl/{accession}_RAW.tar</Supplementary-Data>\n  </Series>\n"
    ));
    xml.push_str("</MINiML>\n");
    xml
}

pub fn human_and_mouse(accession: &str) -> String {
    miniml(
        accession,
        &[
            SampleFixture {
                id: "GSM1",
                organism: "Homo sapiens",
                taxid: "9606",
                platform: "GPL1",
                strategy: "RNA-Seq",
                instrument: "Illumina HiSeq 2500",
                characteristics: &[("tissue", "lung"), ("age", "41")],
            },
            SampleFixture {
                id: "GSM2",
                organism: "Mus musculus",
                taxid: "10090",
                platform: "GPL2",
                strategy: "RNA-Seq",
                instrument: "Illumina NovaSeq 6000",
                characteristics: &[("strain", "C57BL/6")],
            },
        ],
    )
}
