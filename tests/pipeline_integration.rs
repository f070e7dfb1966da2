use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

use constituent_refinery::config::{Config, GeocodeConfig, InputsConfig, OutputsConfig};
use constituent_refinery::domain::Coordinates;
use constituent_refinery::pipeline::geocode::{GeocodeCache, GeocodeCacheEntry};
use constituent_refinery::pipeline::Refinery;
use constituent_refinery::ports::GeocoderPort;

const ADDRESS_CACHED: &str = "100 Main St, Ann Arbor, MI 48109, USA";
const ADDRESS_FRESH: &str = "200 Oak Ave, Ypsilanti, MI 48197, USA";

/// Scripted geocoding collaborator: fixed answers, call accounting.
struct ScriptedGeocoder {
    calls: AtomicUsize,
    asked: Mutex<Vec<String>>,
}

impl ScriptedGeocoder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            asked: Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeocoderPort for ScriptedGeocoder {
    async fn lookup(
        &self,
        address: &str,
    ) -> constituent_refinery::error::Result<Option<Coordinates>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.asked.lock().unwrap().push(address.to_string());
        if address == ADDRESS_FRESH {
            Ok(Some(Coordinates {
                latitude: 42.24,
                longitude: -83.61,
            }))
        } else {
            Ok(None)
        }
    }
}

fn write_csv(path: &Path, header: &[&str], rows: &[Vec<&str>]) {
    let mut writer = csv::Writer::from_path(path).unwrap();
    writer.write_record(header).unwrap();
    for row in rows {
        writer.write_record(row).unwrap();
    }
    writer.flush().unwrap();
}

fn profile_header() -> Vec<&'static str> {
    vec![
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
    ]
}

/// Lay down the four exports plus a warm cache entry for 8-1 and return a
/// run config rooted in `dir`.
fn build_fixtures(dir: &Path) -> Config {
    let profile = dir.join("profile.csv");
    let cleaned = dir.join("cleaned.csv");
    let bulk_profile = dir.join("bulk_profile.csv");
    let interests = dir.join("interest_events.csv");
    let cache_path = dir.join("geocode_data").join("address_cache.csv");

    let row_8_1 = vec![
        "8-1",
        "Ada Lovelace",
        "100 Main St",
        "Ann Arbor",
        "MI",
        "48109",
        "USA",
        "$1,000.00",
        "",
        "Friend\nFriend\nISR Event Attendee",
        "",
        "A",
        "Email",
    ];
    let row_8_1_duplicate = vec![
        "8-1",
        "Ada Duplicate",
        "100 Main St",
        "Ann Arbor",
        "MI",
        "48109",
        "USA",
        "",
        "",
        "Friend",
        "",
        "",
        "Email",
    ];
    let row_8_2 = vec![
        "8-2",
        "Grace Hopper",
        "200 Oak Ave",
        "Ypsilanti",
        "MI",
        "48197",
        "USA",
        "",
        "$250.00",
        "ISR ICPSR Summer Program\nISR ICPSR Summer Program",
        "A",
        "",
        "Mail",
    ];

    write_csv(
        &cleaned,
        &profile_header(),
        &[row_8_1.clone(), row_8_1_duplicate, row_8_2.clone()],
    );
    write_csv(&profile, &profile_header(), &[row_8_1, row_8_2]);

    write_csv(
        &bulk_profile,
        &[
            "Constituent LookupID",
            "Date of Last Recognition Transaction",
            "Date of Last Recognition Transaction.1",
        ],
        &[
            vec!["8-1", "2023-06-01", "2022-01-15"],
            // Outside the primary profile's id universe; must be filtered.
            vec!["8-9", "2019-03-03", "2019-03-03"],
        ],
    );

    write_csv(
        &interests,
        &[
            "Constituent LookupID",
            "Interest Category",
            "Interest Subcategory",
            "Interest Level",
        ],
        &[
            vec!["8-1", "Athletics", "Basketball", "High"],
            vec!["8-1", "Arts", "Theater", "Medium"],
        ],
    );

    let mut cache = GeocodeCache::default();
    cache.insert(GeocodeCacheEntry {
        constituent_id: "8-1".to_string(),
        formatted_address: ADDRESS_CACHED.to_string(),
        latitude: Some(42.2808),
        longitude: Some(-83.743),
    });
    cache.save(&cache_path).unwrap();

    Config {
        inputs: InputsConfig {
            profile,
            cleaned,
            bulk_profile,
            interests,
        },
        geocode: GeocodeConfig {
            cache_path,
            timeout_seconds: 5,
            max_concurrent_lookups: 4,
        },
        outputs: OutputsConfig {
            master: dir.join("output").join("new_master_dataset.csv"),
            layers_dir: dir.join("output").join("affiliation_layers"),
        },
    }
}

fn read_rows(path: &Path) -> (csv::StringRecord, Vec<csv::StringRecord>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let headers = reader.headers().unwrap().clone();
    let rows = reader.records().map(|r| r.unwrap()).collect();
    (headers, rows)
}

fn field<'a>(
    headers: &csv::StringRecord,
    row: &'a csv::StringRecord,
    name: &str,
) -> &'a str {
    let index = headers
        .iter()
        .position(|h| h == name)
        .unwrap_or_else(|| panic!("no column {name:?}"));
    row.get(index).unwrap()
}

#[tokio::test]
async fn test_full_run_produces_master_layers_and_cache() -> Result<()> {
    let dir = tempdir()?;
    let config = build_fixtures(dir.path());
    let geocoder = Arc::new(ScriptedGeocoder::new());

    let summary = Refinery::run(&config, geocoder.clone(), false).await?;

    // Only 8-2 needed the collaborator; 8-1 (both occurrences) reused the
    // cached coordinates.
    assert_eq!(geocoder.call_count(), 1);
    assert_eq!(geocoder.asked.lock().unwrap()[0], ADDRESS_FRESH);
    assert_eq!(summary.cache_hits, 2);
    assert_eq!(summary.fresh_lookups, 1);
    assert_eq!(summary.master_records, 2);

    let (headers, rows) = read_rows(&config.outputs.master);
    assert_eq!(rows.len(), 2);

    let ada = rows
        .iter()
        .find(|r| field(&headers, r, "Constituent LookupID") == "8-1")
        .unwrap();
    // First occurrence survives deduplication.
    assert_eq!(field(&headers, ada, "Constituent Name"), "Ada Lovelace");
    assert_eq!(field(&headers, ada, "donor_status"), "UM Donor");
    assert_eq!(
        field(&headers, ada, "UM-Wide Lifetime Recognition Numeric"),
        "1000"
    );
    assert_eq!(field(&headers, ada, "formatted_address"), ADDRESS_CACHED);
    assert_eq!(field(&headers, ada, "latitude"), "42.2808");
    assert_eq!(
        field(&headers, ada, "Date of Last UM Recognition Transaction"),
        "2023-06-01"
    );
    assert_eq!(
        field(&headers, ada, "Date of Last ISR Recognition Transaction"),
        "2022-01-15"
    );
    // First interest event stays bare, the later one carries its level.
    assert_eq!(
        field(&headers, ada, "Interests"),
        r#"{"Arts":["Theater","Medium"],"Athletics":"Basketball"}"#
    );
    assert_eq!(field(&headers, ada, "Interest Category"), "Athletics");
    assert_eq!(field(&headers, ada, "Num_Affiliations"), "2");
    assert_eq!(field(&headers, ada, "# Times in ICPSR"), "0");
    assert_eq!(field(&headers, ada, "Affiliation: Friend"), "Affiliated");
    assert_eq!(
        field(&headers, ada, "Affiliation: ISR Event Attendee"),
        "Affiliated"
    );
    assert_eq!(
        field(&headers, ada, "Affiliation: ISR ICPSR Summer Program"),
        "Not Affiliated"
    );
    assert_eq!(field(&headers, ada, "Anonymous_Type"), "A.1");

    let grace = rows
        .iter()
        .find(|r| field(&headers, r, "Constituent LookupID") == "8-2")
        .unwrap();
    assert_eq!(field(&headers, grace, "donor_status"), "ISR Donor");
    assert_eq!(field(&headers, grace, "latitude"), "42.24");
    assert_eq!(field(&headers, grace, "longitude"), "-83.61");
    assert_eq!(field(&headers, grace, "Interests"), "No Known Interests");
    assert_eq!(field(&headers, grace, "# Times in ICPSR"), "2");
    assert_eq!(field(&headers, grace, "Num_Affiliations"), "1");
    assert_eq!(field(&headers, grace, "Anonymous_Type"), "A");
    // Bulk dates for 8-9 never attach to anyone.
    assert_eq!(
        field(&headers, grace, "Date of Last UM Recognition Transaction"),
        "Not Available"
    );

    // Cache snapshot covers both ids, with the fresh address stored exactly.
    let cache = GeocodeCache::load(&config.geocode.cache_path)?;
    assert_eq!(cache.len(), 2);
    let fresh = cache.get("8-2").unwrap();
    assert_eq!(fresh.formatted_address, ADDRESS_FRESH);
    assert_eq!(
        fresh.coordinates(),
        Some(Coordinates {
            latitude: 42.24,
            longitude: -83.61,
        })
    );

    // Every known label gets a layer file; membership decides the rows.
    assert_eq!(summary.layer_files.len(), 15);
    let friend_layer: PathBuf = config
        .outputs
        .layers_dir
        .join("Friend-layer.csv");
    let (layer_headers, layer_rows) = read_rows(&friend_layer);
    assert_eq!(layer_rows.len(), 1);
    assert_eq!(
        field(&layer_headers, &layer_rows[0], "Constituent LookupID"),
        "8-1"
    );
    let summer_layer = config
        .outputs
        .layers_dir
        .join("ISR-ICPSR-Summer-Program-layer.csv");
    let (_, summer_rows) = read_rows(&summer_layer);
    assert_eq!(summer_rows.len(), 1);
    let empty_layer = config
        .outputs
        .layers_dir
        .join("ISR-Survey-Research-Center-layer.csv");
    let (_, empty_rows) = read_rows(&empty_layer);
    assert!(empty_rows.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_second_run_reuses_every_geocode() -> Result<()> {
    let dir = tempdir()?;
    let config = build_fixtures(dir.path());

    let first = Arc::new(ScriptedGeocoder::new());
    Refinery::run(&config, first.clone(), false).await?;
    assert_eq!(first.call_count(), 1);

    // Addresses unchanged, cache now warm for both ids: zero lookups.
    let second = Arc::new(ScriptedGeocoder::new());
    let summary = Refinery::run(&config, second.clone(), false).await?;
    assert_eq!(second.call_count(), 0);
    assert_eq!(summary.fresh_lookups, 0);
    assert_eq!(summary.cache_hits, 3);

    Ok(())
}

#[tokio::test]
async fn test_dry_run_writes_nothing() -> Result<()> {
    let dir = tempdir()?;
    let config = build_fixtures(dir.path());
    let cache_before = std::fs::read_to_string(&config.geocode.cache_path)?;

    let geocoder = Arc::new(ScriptedGeocoder::new());
    let summary = Refinery::run(&config, geocoder, true).await?;

    assert!(summary.dry_run);
    assert!(summary.layer_files.is_empty());
    assert!(!config.outputs.master.exists());
    assert!(!config.outputs.layers_dir.exists());
    assert_eq!(
        std::fs::read_to_string(&config.geocode.cache_path)?,
        cache_before
    );

    Ok(())
}

#[tokio::test]
async fn test_missing_column_aborts_before_any_output() -> Result<()> {
    let dir = tempdir()?;
    let config = build_fixtures(dir.path());

    // Strip the affiliation column out of the cleaned export.
    let mut header = profile_header();
    header.retain(|column| *column != "Constituent Affiliation");
    write_csv(&config.inputs.cleaned, &header, &[]);

    let geocoder = Arc::new(ScriptedGeocoder::new());
    let err = Refinery::run(&config, geocoder, false).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Constituent Affiliation"), "{message}");
    assert!(!config.outputs.master.exists());
    assert!(!config.outputs.layers_dir.exists());

    Ok(())
}
