use crate::domain::{BulkProfileRecord, InterestEvent, ProfileRecord};
use crate::error::{RefineryError, Result};
use crate::pipeline::affiliation::{RefinedRecord, AFFILIATED, AFFILIATION_COLUMN_PREFIX, NOT_AFFILIATED};
use crate::pipeline::interests;
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::{info, instrument};

/// Fill value for text fields absent from the source exports.
pub const NOT_AVAILABLE: &str = "Not Available";

/// Required column contract per export. Matched byte-for-byte against the
/// file headers, embedded line breaks included, before any row is read.
const PROFILE_COLUMNS: [&str; 13] = [
    "Constituent LookupID",
    "Constituent Name",
    "Home Address",
    "Home City",
    "Home State",
    "Home Zip",
    "Home Country",
    "UM-Wide\nLifetime Recognition",
    "Institute for Social Research\nLifetime Recognition",
    "Constituent Affiliation",
    "A",
    "A.1",
    "SCU Selected Communicaiton Preference Codes",
];

const BULK_PROFILE_COLUMNS: [&str; 3] = [
    "Constituent LookupID",
    "Date of Last Recognition Transaction",
    "Date of Last Recognition Transaction.1",
];

const INTEREST_COLUMNS: [&str; 4] = [
    "Constituent LookupID",
    "Interest Category",
    "Interest Subcategory",
    "Interest Level",
];

fn validate_headers(
    headers: &csv::StringRecord,
    required: &[&str],
    table: &str,
) -> Result<()> {
    for column in required {
        if !headers.iter().any(|header| header == *column) {
            return Err(RefineryError::MissingColumn {
                table: table.to_string(),
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

fn load_table<T: DeserializeOwned>(
    path: &Path,
    table: &str,
    required: &[&str],
) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        RefineryError::Config(format!(
            "Failed to open {} export '{}': {}",
            table,
            path.display(),
            e
        ))
    })?;
    let headers = reader.headers()?.clone();
    validate_headers(&headers, required, table)?;

    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    info!(table, rows = rows.len(), "loaded export");
    Ok(rows)
}

/// Load the primary profile export or the previously-cleaned export (same
/// contract); `table` names the source in schema errors.
#[instrument(skip(path))]
pub fn load_profile_records(path: &Path, table: &str) -> Result<Vec<ProfileRecord>> {
    load_table(path, table, &PROFILE_COLUMNS)
}

#[instrument(skip(path))]
pub fn load_bulk_profile(path: &Path) -> Result<Vec<BulkProfileRecord>> {
    load_table(path, "bulk profile", &BULK_PROFILE_COLUMNS)
}

#[instrument(skip(path))]
pub fn load_interest_events(path: &Path) -> Result<Vec<InterestEvent>> {
    load_table(path, "interest", &INTEREST_COLUMNS)
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Write the final table shape: the master column set plus one membership
/// column per vocabulary label. Used for the master extract and, on
/// filtered subsets, for every affiliation layer file.
pub fn write_extract(
    path: &Path,
    records: &[&RefinedRecord],
    vocabulary: &[String],
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;

    let mut header: Vec<String> = [
        "Constituent LookupID",
        "Constituent Name",
        "Home Address",
        "Home City",
        "Home State",
        "Home Zip",
        "Home Country",
        "UM-Wide\nLifetime Recognition",
        "Institute for Social Research\nLifetime Recognition",
        "A",
        "A.1",
        "formatted_address",
        "donor_status",
        "Institute for Social Research Lifetime Recognition Numric",
        "UM-Wide Lifetime Recognition Numeric",
        "latitude",
        "longitude",
        "Date of Last UM Recognition Transaction",
        "Date of Last ISR Recognition Transaction",
        "Interests",
        "Interest Category",
        "Interest Subcategory",
        "Interest Level",
        "# Times in ICPSR",
        "Num_Affiliations",
    ]
    .iter()
    .map(|column| column.to_string())
    .collect();
    for label in vocabulary {
        header.push(format!("{AFFILIATION_COLUMN_PREFIX}{label}"));
    }
    header.push("Anonymous_Type".to_string());
    writer.write_record(&header)?;

    for record in records {
        let base = &record.master.enriched.base;
        let mut row: Vec<String> = vec![
            base.lookup_id.clone(),
            text(&base.name),
            text(&base.home_address),
            text(&base.home_city),
            text(&base.home_state),
            text(&base.home_zip),
            text(&base.home_country),
            text(&base.um_lifetime_recognition),
            text(&base.isr_lifetime_recognition),
            text(&base.anon_primary),
            text(&base.anon_secondary),
            record.master.enriched.formatted_address.clone(),
            record.master.enriched.donor_status.to_string(),
            record.master.enriched.isr_recognition_amount.to_string(),
            record.master.enriched.um_recognition_amount.to_string(),
            record
                .master
                .coordinates
                .map(|c| c.latitude.to_string())
                .unwrap_or_default(),
            record
                .master
                .coordinates
                .map(|c| c.longitude.to_string())
                .unwrap_or_default(),
            text(&record.master.um_last_recognition),
            text(&record.master.isr_last_recognition),
            interests::render_interest_column(record.master.interests.as_ref()),
            text(&record.master.interest_category),
            text(&record.master.interest_subcategory),
            text(&record.master.interest_level),
            record.affiliations.icpsr_repeat_count().to_string(),
            record.affiliations.num_affiliations().to_string(),
        ];
        for label in vocabulary {
            row.push(if record.affiliations.contains(label) {
                AFFILIATED.to_string()
            } else {
                NOT_AFFILIATED.to_string()
            });
        }
        row.push(record.anonymous_type.as_str().to_string());
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}
