use crate::domain::{AnonymityTier, ProfileRecord};
use crate::error::Result;
use crate::pipeline::merge::MasterRecord;
use crate::tables;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// The one label whose raw repeats are counted before deduplication.
pub const ICPSR_SUMMER_PROGRAM: &str = "ISR ICPSR Summer Program";

pub const AFFILIATED: &str = "Affiliated";
pub const NOT_AFFILIATED: &str = "Not Affiliated";
pub const AFFILIATION_COLUMN_PREFIX: &str = "Affiliation: ";

/// Closed set of affiliation labels that get their own extract file. New
/// labels appearing upstream require a code change here; they are reported,
/// never silently split out.
pub const KNOWN_AFFILIATIONS: [&str; 15] = [
    "ISR ICPSR Consort Pol/ Soc Res",
    "ISR ICPSR Summer Program",
    "ISR Survey Research Center",
    "ISR Historic Affiliate",
    "ISR Event Attendee",
    "ISR Ret Support Staff List",
    "ISR Social Psychology",
    "ISR Res Ctr for Group Dynamics",
    "ISR Ctr for Political Studies",
    "Friend",
    "ISR Population Studies Center Trainee",
    "ISR Dissertation Affiliates",
    "ISR Next Gen Awardee",
    "ISR Organizational Psych",
    "ISR Top Lifetime Donor",
];

/// Deduplicated, first-seen-ordered affiliation labels for one record, plus
/// the raw repeat count of the summer-program label.
#[derive(Debug, Clone, Default)]
pub struct AffiliationSet {
    labels: Vec<String>,
    icpsr_repeat_count: usize,
}

impl AffiliationSet {
    /// Split the line-delimited blob into labels. Blank lines are dropped;
    /// a missing blob is an empty set.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };
        let mut labels: Vec<String> = Vec::new();
        let mut icpsr_repeat_count = 0;
        for line in raw.split('\n') {
            let label = line.trim_end_matches('\r');
            if label.is_empty() {
                continue;
            }
            if label == ICPSR_SUMMER_PROGRAM {
                icpsr_repeat_count += 1;
            }
            if !labels.iter().any(|existing| existing == label) {
                labels.push(label.to_string());
            }
        }
        Self {
            labels,
            icpsr_repeat_count,
        }
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|existing| existing == label)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn num_affiliations(&self) -> usize {
        self.labels.len()
    }

    pub fn icpsr_repeat_count(&self) -> usize {
        self.icpsr_repeat_count
    }
}

/// A master record with its affiliation set and anonymity tier resolved —
/// the final shape written to the master extract and the layer files.
#[derive(Debug, Clone)]
pub struct RefinedRecord {
    pub master: MasterRecord,
    pub affiliations: AffiliationSet,
    pub anonymous_type: AnonymityTier,
}

/// Collapse the indicator columns to one categorical value. The secondary
/// indicator outranks the primary.
pub fn anonymity_tier(record: &ProfileRecord) -> AnonymityTier {
    if record.anon_secondary.as_deref() == Some("A") {
        AnonymityTier::Secondary
    } else if record.anon_primary.as_deref() == Some("A") {
        AnonymityTier::Primary
    } else {
        AnonymityTier::None
    }
}

/// Normalize every record's affiliation blob and derive the global label
/// vocabulary (first-seen order across all records). The vocabulary drives
/// one membership column per label on the extracts.
#[instrument(skip(masters))]
pub fn normalize_affiliations(masters: Vec<MasterRecord>) -> (Vec<RefinedRecord>, Vec<String>) {
    let refined: Vec<RefinedRecord> = masters
        .into_iter()
        .map(|master| {
            let affiliations = AffiliationSet::parse(master.enriched.base.affiliation.as_deref());
            let anonymous_type = anonymity_tier(&master.enriched.base);
            RefinedRecord {
                master,
                affiliations,
                anonymous_type,
            }
        })
        .collect();

    let mut vocabulary: Vec<String> = Vec::new();
    for record in &refined {
        for label in record.affiliations.labels() {
            if !vocabulary.iter().any(|existing| existing == label) {
                vocabulary.push(label.clone());
            }
        }
    }
    (refined, vocabulary)
}

/// Labels observed in the data that the closed split list does not cover.
pub fn unknown_labels(vocabulary: &[String]) -> Vec<String> {
    vocabulary
        .iter()
        .filter(|label| !KNOWN_AFFILIATIONS.contains(&label.as_str()))
        .cloned()
        .collect()
}

/// Deterministic file slug for a label: spaces and slashes become hyphens.
pub fn layer_slug(label: &str) -> String {
    label.replace(' ', "-").replace('/', "-")
}

/// Partition the final table by membership in each known affiliation and
/// write one extract per label.
#[instrument(skip(records, vocabulary))]
pub fn write_affiliation_layers(
    dir: &Path,
    records: &[RefinedRecord],
    vocabulary: &[String],
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(KNOWN_AFFILIATIONS.len());
    for label in KNOWN_AFFILIATIONS {
        let subset: Vec<&RefinedRecord> = records
            .iter()
            .filter(|record| record.affiliations.contains(label))
            .collect();
        let path = dir.join(format!("{}-layer.csv", layer_slug(label)));
        tables::write_extract(&path, &subset, vocabulary)?;
        info!(label, rows = subset.len(), "wrote affiliation layer");
        written.push(path);
    }
    Ok(written)
}
