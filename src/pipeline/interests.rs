use crate::domain::{ConstituentId, InterestEvent, InterestProfile, InterestValue};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Sentinel written to the `Interests` column for records with no known
/// interest data.
pub const NO_KNOWN_INTERESTS: &str = "No Known Interests";

/// Fold the interest-event table into one profile per constituent.
///
/// The first event seen for an id stores the bare subcategory under its
/// category; every later event for that id stores a `(subcategory, level)`
/// pair under its own category, overwriting on a repeated category. The
/// first-vs-later asymmetry is a documented contract pinned by tests; see
/// DESIGN.md before changing it.
#[instrument(skip(events))]
pub fn aggregate_interests(
    events: &[InterestEvent],
) -> HashMap<ConstituentId, InterestProfile> {
    let mut profiles: HashMap<ConstituentId, InterestProfile> = HashMap::new();
    for event in events {
        let (Some(category), Some(subcategory)) =
            (event.category.clone(), event.subcategory.clone())
        else {
            debug!(constituent_id = %event.lookup_id, "skipping interest event without category/subcategory");
            continue;
        };
        match profiles.entry(event.lookup_id.clone()) {
            Entry::Vacant(slot) => {
                let mut profile = InterestProfile::default();
                profile.set(category, InterestValue::Subcategory(subcategory));
                slot.insert(profile);
            }
            Entry::Occupied(mut slot) => {
                slot.get_mut().set(
                    category,
                    InterestValue::Rated {
                        subcategory,
                        level: event.level.clone().unwrap_or_default(),
                    },
                );
            }
        }
    }
    profiles
}

/// First interest event per id, used for the denormalized
/// category/subcategory/level columns on the master extract.
pub fn first_events_by_id(
    events: &[InterestEvent],
) -> HashMap<ConstituentId, InterestEvent> {
    let mut first: HashMap<ConstituentId, InterestEvent> = HashMap::new();
    for event in events {
        first
            .entry(event.lookup_id.clone())
            .or_insert_with(|| event.clone());
    }
    first
}

/// Render the `Interests` column value for one master record.
pub fn render_interest_column(profile: Option<&InterestProfile>) -> String {
    match profile {
        Some(profile) if !profile.is_empty() => profile.to_json().to_string(),
        _ => NO_KNOWN_INTERESTS.to_string(),
    }
}
