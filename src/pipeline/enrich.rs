use crate::domain::{DonorStatus, ProfileRecord};
use crate::error::{RefineryError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::instrument;

/// Locale-formatted amount: optional dollar sign, grouping commas, optional
/// decimal fraction.
static CURRENCY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$?\s*[0-9][0-9,]*(\.[0-9]+)?$").unwrap());

/// A profile row with the per-record derived columns attached. Source fields
/// are never mutated; derivation is append-only.
#[derive(Debug, Clone)]
pub struct EnrichedRecord {
    pub base: ProfileRecord,
    pub formatted_address: String,
    pub donor_status: DonorStatus,
    pub um_recognition_amount: f64,
    pub isr_recognition_amount: f64,
}

/// Convert a locale-formatted monetary string to a numeric amount.
///
/// Missing input is `0`. A non-missing string that does not parse is a fatal
/// data-contract violation; financial figures are never silently zeroed.
pub fn parse_currency(raw: Option<&str>) -> Result<f64> {
    let Some(raw) = raw else {
        return Ok(0.0);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    if !CURRENCY_PATTERN.is_match(trimmed) {
        return Err(RefineryError::MalformedCurrency(raw.to_string()));
    }
    let cleaned: String = trimmed
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();
    cleaned
        .parse::<f64>()
        .map_err(|_| RefineryError::MalformedCurrency(raw.to_string()))
}

/// Derive the categorical donor status for one record.
///
/// A pre-existing explicit status always wins. Otherwise the UM-wide
/// recognition rule is evaluated before the ISR-scoped one, and a record
/// with neither field present is a `Non Donor`.
pub fn classify_donor_status(record: &ProfileRecord) -> DonorStatus {
    if let Some(explicit) = record.donor_status.as_deref() {
        return DonorStatus::Explicit(explicit.to_string());
    }
    if record.um_lifetime_recognition.is_some() {
        DonorStatus::UmDonor
    } else if record.isr_lifetime_recognition.is_some() {
        DonorStatus::IsrDonor
    } else {
        DonorStatus::NonDonor
    }
}

/// Build the canonical single-line address used as the geocode cache key.
/// Missing components render as empty text; the separators are always
/// present so the string shape is stable.
pub fn format_address(record: &ProfileRecord) -> String {
    format!(
        "{}, {}, {} {}, {}",
        component(&record.home_address),
        component(&record.home_city),
        component(&record.home_state),
        component(&record.home_zip),
        component(&record.home_country),
    )
}

fn component(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

/// Attach all per-record derived columns to a loaded table.
#[instrument(skip(records))]
pub fn derive_columns(records: Vec<ProfileRecord>) -> Result<Vec<EnrichedRecord>> {
    records
        .into_iter()
        .map(|base| {
            let um_recognition_amount =
                parse_currency(base.um_lifetime_recognition.as_deref())?;
            let isr_recognition_amount =
                parse_currency(base.isr_lifetime_recognition.as_deref())?;
            Ok(EnrichedRecord {
                formatted_address: format_address(&base),
                donor_status: classify_donor_status(&base),
                um_recognition_amount,
                isr_recognition_amount,
                base,
            })
        })
        .collect()
}
