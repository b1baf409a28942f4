use std::collections::HashSet;

use serde::Serialize;
use tracing::{info, warn};

use crate::miniml::SampleRecord;

pub const HUMAN_ORGANISM: &str = "Homo sapiens";

/// Optional selection predicates; when both are set a record must match both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleFilter {
    pub organism: Option<String>,
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOutcome {
    /// No predicate was supplied.
    Unfiltered,
    Matched,
    /// Predicates matched nothing; the full record set was kept.
    Fallback,
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub records: Vec<SampleRecord>,
    pub outcome: FilterOutcome,
}

impl SampleFilter {
    pub fn is_empty(&self) -> bool {
        self.organism.is_none() && self.platform.is_none()
    }

    pub fn matches(&self, record: &SampleRecord) -> bool {
        let organism_ok = self
            .organism
            .as_deref()
            .map(|organism| record.organism == organism)
            .unwrap_or(true);
        let platform_ok = self
            .platform
            .as_deref()
            .map(|platform| record.platform == platform)
            .unwrap_or(true);
        organism_ok && platform_ok
    }

    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(organism) = &self.organism {
            parts.push(format!("organism={organism}"));
        }
        if let Some(platform) = &self.platform {
            parts.push(format!("platform={platform}"));
        }
        if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join(", ")
        }
    }

    pub fn apply(&self, records: Vec<SampleRecord>) -> Selection {
        let records = dedup_by_id(records);
        if self.is_empty() {
            return Selection {
                records,
                outcome: FilterOutcome::Unfiltered,
            };
        }

        let selected: Vec<SampleRecord> = records
            .iter()
            .filter(|record| self.matches(record))
            .cloned()
            .collect();
        if selected.is_empty() {
            warn!(
                filter = %self.describe(),
                total = records.len(),
                "filter matched no samples; keeping the unfiltered set"
            );
            return Selection {
                records,
                outcome: FilterOutcome::Fallback,
            };
        }

        info!(
            filter = %self.describe(),
            selected = selected.len(),
            total = records.len(),
            "filtered samples"
        );
        Selection {
            records: selected,
            outcome: FilterOutcome::Matched,
        }
    }
}

fn dedup_by_id(records: Vec<SampleRecord>) -> Vec<SampleRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| {
            let fresh = seen.insert(record.id.clone());
            if !fresh {
                warn!(sample = %record.id, "duplicate sample identifier dropped");
            }
            fresh
        })
        .collect()
}
