//! Decoder for GEO MINiML family documents.
//!
//! Only the parts of the schema the curation pipeline consumes are decoded:
//! `Sample` elements with their first channel's organism and characteristics,
//! a handful of sample-level descriptors, and every `Supplementary-Data`
//! listing in document order (sample and series level alike).

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::Serialize;
use tracing::warn;

use crate::error::KiraError;

/// Key used for `Characteristics` elements that carry no `tag` attribute.
pub const UNTAGGED_CHARACTERISTIC: &str = "characteristics";

/// One sample as it appears in the document; optional everywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleNode {
    pub iid: Option<String>,
    pub title: Option<String>,
    pub organism: Option<String>,
    pub taxid: Option<String>,
    pub platform: Option<String>,
    pub library_strategy: Option<String>,
    pub instrument_model: Option<String>,
    pub biosample_url: Option<String>,
    pub characteristics: Vec<(String, String)>,
    pub supplementary_files: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MinimlDocument {
    pub samples: Vec<SampleNode>,
    /// Every supplementary listing in document order.
    pub supplementary_files: Vec<String>,
}

/// A sample with all required fields present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleRecord {
    pub id: String,
    pub title: String,
    pub organism: String,
    pub taxid: String,
    pub biosample: String,
    pub platform: String,
    pub library_strategy: String,
    pub instrument_model: String,
    pub characteristics: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSample {
    pub id: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct RecordOutcome {
    pub records: Vec<SampleRecord>,
    pub skipped: Vec<SkippedSample>,
}

impl SampleNode {
    pub fn into_record(self) -> Result<SampleRecord, SkippedSample> {
        let id = match self.iid {
            Some(id) if !id.is_empty() => id,
            _ => {
                return Err(SkippedSample {
                    id: None,
                    reason: "missing iid attribute".to_string(),
                });
            }
        };
        let Some(title) = self.title else {
            return Err(SkippedSample {
                id: Some(id),
                reason: "missing Title".to_string(),
            });
        };
        let Some(organism) = self.organism else {
            return Err(SkippedSample {
                id: Some(id),
                reason: "missing Organism".to_string(),
            });
        };

        Ok(SampleRecord {
            id,
            title,
            organism,
            taxid: self.taxid.unwrap_or_default(),
            biosample: self
                .biosample_url
                .as_deref()
                .map(biosample_accession)
                .unwrap_or_default(),
            platform: self.platform.unwrap_or_default(),
            library_strategy: self.library_strategy.unwrap_or_default(),
            instrument_model: self.instrument_model.unwrap_or_default(),
            characteristics: self.characteristics,
        })
    }
}

impl MinimlDocument {
    /// Converts sample nodes into records, skipping (and reporting) the ones
    /// that lack a required field.
    pub fn records(&self) -> RecordOutcome {
        let mut outcome = RecordOutcome::default();
        for node in &self.samples {
            match node.clone().into_record() {
                Ok(record) => outcome.records.push(record),
                Err(skipped) => {
                    warn!(
                        sample = skipped.id.as_deref().unwrap_or("<unknown>"),
                        reason = %skipped.reason,
                        "skipping sample"
                    );
                    outcome.skipped.push(skipped);
                }
            }
        }
        outcome
    }
}

/// Last path segment of a BioSample relation target.
pub fn biosample_accession(url: &str) -> String {
    url.trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    Title,
    Organism,
    Characteristic,
    LibraryStrategy,
    InstrumentModel,
    Supplementary,
}

pub fn parse_document(xml: &str) -> Result<MinimlDocument, KiraError> {
    let mut reader = Reader::from_str(xml);
    let mut document = MinimlDocument::default();

    let mut stack: Vec<String> = Vec::new();
    let mut sample: Option<SampleNode> = None;
    let mut capture: Option<Capture> = None;
    let mut characteristic_tag: Option<String> = None;
    let mut text = String::new();

    loop {
        let event = reader.read_event().map_err(|err| KiraError::DocumentParse {
            position: reader.buffer_position() as u64,
            message: err.to_string(),
        })?;
        match event {
            Event::Start(e) => {
                let name = element_name(&e);
                let parent = stack.last().map(String::as_str);
                match (name.as_str(), parent) {
                    ("Sample", _) => {
                        sample = Some(SampleNode {
                            iid: attribute(&e, b"iid")?,
                            ..SampleNode::default()
                        });
                    }
                    ("Title", Some("Sample")) => capture = Some(Capture::Title),
                    ("Organism", _) if sample.is_some() => {
                        capture = Some(Capture::Organism);
                        if let Some(node) = sample.as_mut() {
                            if node.taxid.is_none() {
                                node.taxid = attribute(&e, b"taxid")?;
                            }
                        }
                    }
                    ("Characteristics", _) if sample.is_some() => {
                        capture = Some(Capture::Characteristic);
                        characteristic_tag = attribute(&e, b"tag")?;
                    }
                    ("Library-Strategy", Some("Sample")) => {
                        capture = Some(Capture::LibraryStrategy)
                    }
                    ("Predefined", Some("Instrument-Model")) if sample.is_some() => {
                        capture = Some(Capture::InstrumentModel)
                    }
                    ("Supplementary-Data", _) => capture = Some(Capture::Supplementary),
                    _ => visit_attributes(&e, sample.as_mut())?,
                }
                text.clear();
                stack.push(name);
            }
            Event::Empty(e) => {
                let name = element_name(&e);
                match name.as_str() {
                    "Characteristics" => {
                        if let Some(node) = sample.as_mut() {
                            let tag = attribute(&e, b"tag")?
                                .unwrap_or_else(|| UNTAGGED_CHARACTERISTIC.to_string());
                            push_characteristic(node, tag, String::new());
                        }
                    }
                    _ => visit_attributes(&e, sample.as_mut())?,
                }
            }
            Event::Text(e) => {
                if capture.is_some() {
                    let value = e.unescape().map_err(|err| KiraError::DocumentParse {
                        position: reader.buffer_position() as u64,
                        message: err.to_string(),
                    })?;
                    text.push_str(&value);
                }
            }
            Event::CData(e) => {
                if capture.is_some() {
                    text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::End(_) => {
                let name = stack.pop().unwrap_or_default();
                if name == "Sample" {
                    if let Some(node) = sample.take() {
                        document.samples.push(node);
                    }
                    continue;
                }
                let Some(kind) = capture_for(&name, capture) else {
                    continue;
                };
                let value = text.trim().to_string();
                text.clear();
                capture = None;
                match kind {
                    Capture::Supplementary => {
                        if value.is_empty() {
                            continue;
                        }
                        if let Some(node) = sample.as_mut() {
                            node.supplementary_files.push(value.clone());
                        }
                        document.supplementary_files.push(value);
                    }
                    Capture::Characteristic => {
                        if let Some(node) = sample.as_mut() {
                            let tag = characteristic_tag
                                .take()
                                .unwrap_or_else(|| UNTAGGED_CHARACTERISTIC.to_string());
                            push_characteristic(node, tag, value);
                        }
                    }
                    other => {
                        if let Some(node) = sample.as_mut() {
                            let slot = match other {
                                Capture::Title => &mut node.title,
                                Capture::Organism => &mut node.organism,
                                Capture::LibraryStrategy => &mut node.library_strategy,
                                Capture::InstrumentModel => &mut node.instrument_model,
                                Capture::Characteristic | Capture::Supplementary => continue,
                            };
                            // multi-channel samples keep the first channel's organism
                            if slot.is_none() {
                                *slot = Some(value);
                            }
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(document)
}

fn capture_for(name: &str, capture: Option<Capture>) -> Option<Capture> {
    let expected = match capture? {
        Capture::Title => "Title",
        Capture::Organism => "Organism",
        Capture::Characteristic => "Characteristics",
        Capture::LibraryStrategy => "Library-Strategy",
        Capture::InstrumentModel => "Predefined",
        Capture::Supplementary => "Supplementary-Data",
    };
    (name == expected).then_some(capture?)
}

/// Attribute-only elements of a sample: platform and BioSample references.
fn visit_attributes(e: &BytesStart<'_>, sample: Option<&mut SampleNode>) -> Result<(), KiraError> {
    let Some(node) = sample else {
        return Ok(());
    };
    match element_name(e).as_str() {
        "Platform-Ref" => {
            if node.platform.is_none() {
                node.platform = attribute(e, b"ref")?;
            }
        }
        "Relation" => {
            let is_biosample = attribute(e, b"type")?
                .map(|kind| kind == "BioSample")
                .unwrap_or(false);
            if is_biosample && node.biosample_url.is_none() {
                node.biosample_url = attribute(e, b"target")?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn push_characteristic(node: &mut SampleNode, tag: String, value: String) {
    if let Some(existing) = node.characteristics.iter_mut().find(|(key, _)| *key == tag) {
        existing.1 = value;
    } else {
        node.characteristics.push((tag, value));
    }
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, KiraError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| KiraError::DocumentParse {
            position: 0,
            message: err.to_string(),
        })?;
        if attr.key.local_name().as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|err| KiraError::DocumentParse {
                    position: 0,
                    message: err.to_string(),
                })?;
            return Ok(Some(value.trim().to_string()));
        }
    }
    Ok(None)
}
