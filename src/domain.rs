use serde::{Deserialize, Serialize};

/// Stable unique key shared by every source export.
pub type ConstituentId = String;

/// A resolved latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// One row of the primary profile export. The previously-cleaned export
/// carries the identical column contract and reuses this shape.
///
/// Column names are matched byte-for-byte against the upstream export,
/// including the embedded line breaks in the recognition headers and the
/// misspelled legacy communication-preference header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRecord {
    #[serde(rename = "Constituent LookupID")]
    pub lookup_id: ConstituentId,
    #[serde(rename = "Constituent Name")]
    pub name: Option<String>,
    #[serde(rename = "Home Address")]
    pub home_address: Option<String>,
    #[serde(rename = "Home City")]
    pub home_city: Option<String>,
    #[serde(rename = "Home State")]
    pub home_state: Option<String>,
    #[serde(rename = "Home Zip")]
    pub home_zip: Option<String>,
    #[serde(rename = "Home Country")]
    pub home_country: Option<String>,
    #[serde(rename = "UM-Wide\nLifetime Recognition")]
    pub um_lifetime_recognition: Option<String>,
    #[serde(rename = "Institute for Social Research\nLifetime Recognition")]
    pub isr_lifetime_recognition: Option<String>,
    /// Pre-existing explicit status. Not part of the required contract; most
    /// exports do not carry it.
    #[serde(rename = "Donor Status", default)]
    pub donor_status: Option<String>,
    /// Free text, one affiliation label per line.
    #[serde(rename = "Constituent Affiliation")]
    pub affiliation: Option<String>,
    /// Primary anonymity indicator; the value `A` marks the flag as set.
    #[serde(rename = "A")]
    pub anon_primary: Option<String>,
    /// Secondary anonymity indicator, takes priority over the primary.
    #[serde(rename = "A.1")]
    pub anon_secondary: Option<String>,
    /// Legacy column, dropped from the master extract unconditionally.
    #[serde(rename = "SCU Selected Communicaiton Preference Codes")]
    pub scu_communication_preference: Option<String>,
}

/// Projection of the bulk profile export: id plus the two
/// recognition-transaction-date columns (UM-wide, then ISR-scoped — the
/// upstream export disambiguates the duplicate header with a `.1` suffix).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkProfileRecord {
    #[serde(rename = "Constituent LookupID")]
    pub lookup_id: ConstituentId,
    #[serde(rename = "Date of Last Recognition Transaction")]
    pub um_last_recognition: Option<String>,
    #[serde(rename = "Date of Last Recognition Transaction.1")]
    pub isr_last_recognition: Option<String>,
}

/// One row of the interest-event export; an id may appear many times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestEvent {
    #[serde(rename = "Constituent LookupID")]
    pub lookup_id: ConstituentId,
    #[serde(rename = "Interest Category")]
    pub category: Option<String>,
    #[serde(rename = "Interest Subcategory")]
    pub subcategory: Option<String>,
    #[serde(rename = "Interest Level")]
    pub level: Option<String>,
}

/// Derived donor status, evaluated once per record and never recomputed.
#[derive(Debug, Clone, PartialEq)]
pub enum DonorStatus {
    /// Passthrough of a pre-existing explicit status.
    Explicit(String),
    IsrDonor,
    UmDonor,
    NonDonor,
}

impl DonorStatus {
    pub fn as_str(&self) -> &str {
        match self {
            DonorStatus::Explicit(status) => status,
            DonorStatus::IsrDonor => "ISR Donor",
            DonorStatus::UmDonor => "UM Donor",
            DonorStatus::NonDonor => "Non Donor",
        }
    }
}

impl std::fmt::Display for DonorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A donor's public-recognition preference, collapsed from the indicator
/// columns by fixed priority (secondary first, then primary).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnonymityTier {
    Secondary,
    Primary,
    None,
}

impl AnonymityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnonymityTier::Secondary => "A.1",
            AnonymityTier::Primary => "A",
            AnonymityTier::None => "None",
        }
    }
}

/// Value stored for one interest category of a constituent.
///
/// The first event ever seen for an id stores the bare subcategory; every
/// later event for that id stores the `(subcategory, level)` pair. Downstream
/// consumers rely on this asymmetry; see DESIGN.md before changing it.
#[derive(Debug, Clone, PartialEq)]
pub enum InterestValue {
    Subcategory(String),
    Rated { subcategory: String, level: String },
}

/// Category → value mapping for one constituent, in first-seen category
/// order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterestProfile {
    categories: Vec<(String, InterestValue)>,
}

impl InterestProfile {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Insert or overwrite the value stored under `category`.
    pub fn set(&mut self, category: String, value: InterestValue) {
        if let Some(slot) = self
            .categories
            .iter_mut()
            .find(|(existing, _)| *existing == category)
        {
            slot.1 = value;
        } else {
            self.categories.push((category, value));
        }
    }

    pub fn get(&self, category: &str) -> Option<&InterestValue> {
        self.categories
            .iter()
            .find(|(existing, _)| existing == category)
            .map(|(_, value)| value)
    }

    /// Render the profile for the master extract's `Interests` column:
    /// bare subcategories as strings, rated entries as two-element arrays.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (category, value) in &self.categories {
            let rendered = match value {
                InterestValue::Subcategory(subcategory) => {
                    serde_json::Value::String(subcategory.clone())
                }
                InterestValue::Rated { subcategory, level } => serde_json::json!([
                    subcategory, level
                ]),
            };
            map.insert(category.clone(), rendered);
        }
        serde_json::Value::Object(map)
    }
}
