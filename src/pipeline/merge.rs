use crate::domain::{BulkProfileRecord, ConstituentId, Coordinates, InterestEvent, InterestProfile};
use crate::pipeline::enrich::EnrichedRecord;
use std::collections::{HashMap, HashSet};
use tracing::instrument;

/// One row of the working master table: a cleaned record joined with the
/// bulk-profile projection and interest data. The legacy
/// communication-preference column is dropped here by construction — the
/// master shape simply does not carry it.
#[derive(Debug, Clone)]
pub struct MasterRecord {
    pub enriched: EnrichedRecord,
    pub coordinates: Option<Coordinates>,
    /// Renamed from `Date of Last Recognition Transaction`.
    pub um_last_recognition: Option<String>,
    /// Renamed from `Date of Last Recognition Transaction.1`.
    pub isr_last_recognition: Option<String>,
    pub interests: Option<InterestProfile>,
    pub interest_category: Option<String>,
    pub interest_subcategory: Option<String>,
    pub interest_level: Option<String>,
}

/// Left-join chain producing the master table.
///
/// The bulk-profile projection is restricted to ids present in the primary
/// profile export; the cleaned table is the authoritative left side, so its
/// records (with their coordinate assignments) are preserved and duplicate
/// ids are resolved first-seen-wins.
#[instrument(skip_all, fields(cleaned = cleaned.len(), bulk = bulk.len()))]
pub fn merge_records(
    cleaned: Vec<EnrichedRecord>,
    coordinates: Vec<Option<Coordinates>>,
    bulk: &[BulkProfileRecord],
    profile_ids: &HashSet<ConstituentId>,
    interest_profiles: &HashMap<ConstituentId, InterestProfile>,
    first_interest_events: &HashMap<ConstituentId, InterestEvent>,
) -> Vec<MasterRecord> {
    // Bulk projection, filtered to the primary profile's id universe.
    // First-seen wins on duplicate bulk ids, matching the downstream
    // first-occurrence dedup.
    let mut projection: HashMap<&str, &BulkProfileRecord> = HashMap::new();
    for row in bulk {
        if !profile_ids.contains(&row.lookup_id) {
            continue;
        }
        projection.entry(row.lookup_id.as_str()).or_insert(row);
    }

    let mut seen: HashSet<ConstituentId> = HashSet::new();
    let mut masters = Vec::with_capacity(cleaned.len());
    for (record, coordinates) in cleaned.into_iter().zip(coordinates) {
        if !seen.insert(record.base.lookup_id.clone()) {
            continue;
        }
        let id = record.base.lookup_id.as_str();
        let dates = projection.get(id);
        let first_event = first_interest_events.get(id);
        let um_last_recognition = dates.and_then(|d| d.um_last_recognition.clone());
        let isr_last_recognition = dates.and_then(|d| d.isr_last_recognition.clone());
        let interests = interest_profiles.get(id).cloned();
        let interest_category = first_event.and_then(|e| e.category.clone());
        let interest_subcategory = first_event.and_then(|e| e.subcategory.clone());
        let interest_level = first_event.and_then(|e| e.level.clone());
        masters.push(MasterRecord {
            coordinates,
            um_last_recognition,
            isr_last_recognition,
            interests,
            interest_category,
            interest_subcategory,
            interest_level,
            enriched: record,
        });
    }
    masters
}
