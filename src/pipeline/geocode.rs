use crate::domain::{ConstituentId, Coordinates};
use crate::error::Result;
use crate::pipeline::enrich::EnrichedRecord;
use crate::ports::GeocoderPort;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

/// One persisted cache row. An entry vouches for its coordinates only under
/// the exact address string it was computed from; any textual difference
/// invalidates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeCacheEntry {
    pub constituent_id: ConstituentId,
    pub formatted_address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl GeocodeCacheEntry {
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }
}

/// Address→coordinate cache keyed by constituent id, read once at the start
/// of a run and rewritten once at the end.
#[derive(Debug, Default)]
pub struct GeocodeCache {
    entries: HashMap<ConstituentId, GeocodeCacheEntry>,
}

impl GeocodeCache {
    /// Read the cache file. A missing file is an empty cache, not an error:
    /// the first run of a deployment starts cold.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("no geocode cache at {}, starting cold", path.display());
            return Ok(Self::default());
        }
        let mut reader = csv::Reader::from_path(path)?;
        let mut entries = HashMap::new();
        for row in reader.deserialize() {
            let entry: GeocodeCacheEntry = row?;
            entries.insert(entry.constituent_id.clone(), entry);
        }
        Ok(Self { entries })
    }

    /// Rewrite the cache file with this snapshot, in id order so successive
    /// runs produce diffable files.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)?;
        let mut ids: Vec<&ConstituentId> = self.entries.keys().collect();
        ids.sort();
        for id in ids {
            writer.serialize(&self.entries[id])?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&GeocodeCacheEntry> {
        self.entries.get(id)
    }

    pub fn insert(&mut self, entry: GeocodeCacheEntry) {
        self.entries.insert(entry.constituent_id.clone(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GeocodeStats {
    pub cache_hits: usize,
    pub fresh_lookups: usize,
    pub failed_lookups: usize,
}

/// Result of reconciling one batch against the cache: coordinate
/// assignments aligned with the input records, the cache snapshot to
/// persist, and counters for the run summary.
#[derive(Debug)]
pub struct GeocodeOutcome {
    pub coordinates: Vec<Option<Coordinates>>,
    pub updated_cache: GeocodeCache,
    pub stats: GeocodeStats,
}

/// Merge the persisted cache against the current records and fill in the
/// coordinate column pair.
///
/// A record whose formatted address matches its cache entry reuses the
/// cached coordinates with no external call. Everything else — new ids,
/// changed addresses, and entries persisted without coordinates by an
/// earlier failed run — goes to the geocoder. Lookups fan out as one task
/// per address, bounded by `max_concurrent` and a per-lookup timeout; a
/// single failure downgrades that record to unknown coordinates and never
/// aborts the batch. Results rejoin by constituent id, not completion
/// order.
#[instrument(skip(records, cache, geocoder))]
pub async fn reconcile(
    records: &[EnrichedRecord],
    cache: &GeocodeCache,
    geocoder: Arc<dyn GeocoderPort>,
    lookup_timeout: Duration,
    max_concurrent: usize,
) -> GeocodeOutcome {
    let mut coordinates: Vec<Option<Coordinates>> = vec![None; records.len()];
    let mut updated_cache = GeocodeCache::default();
    let mut stats = GeocodeStats::default();
    let mut pending: Vec<(usize, ConstituentId, String)> = Vec::new();

    for (index, record) in records.iter().enumerate() {
        let id = record.base.lookup_id.as_str();
        match cache.get(id) {
            Some(entry)
                if entry.formatted_address == record.formatted_address
                    && entry.coordinates().is_some() =>
            {
                coordinates[index] = entry.coordinates();
                updated_cache.insert(entry.clone());
                stats.cache_hits += 1;
            }
            _ => {
                // Seed an unknown entry now so the snapshot covers every
                // record even if the lookup task dies.
                updated_cache.insert(GeocodeCacheEntry {
                    constituent_id: id.to_string(),
                    formatted_address: record.formatted_address.clone(),
                    latitude: None,
                    longitude: None,
                });
                pending.push((index, id.to_string(), record.formatted_address.clone()));
            }
        }
    }

    if pending.is_empty() {
        info!(
            "all {} records reused cached coordinates, no lookups needed",
            records.len()
        );
        return GeocodeOutcome {
            coordinates,
            updated_cache,
            stats,
        };
    }

    info!(
        "geocoding {} of {} records ({} reused from cache)",
        pending.len(),
        records.len(),
        stats.cache_hits
    );

    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut lookups = JoinSet::new();
    for (index, id, address) in pending {
        let geocoder = geocoder.clone();
        let semaphore = semaphore.clone();
        lookups.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            let outcome = match tokio::time::timeout(lookup_timeout, geocoder.lookup(&address))
                .await
            {
                Ok(Ok(found)) => Ok(found),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("lookup timed out after {:?}", lookup_timeout)),
            };
            (index, id, address, outcome)
        });
    }

    while let Some(joined) = lookups.join_next().await {
        let (index, id, address, outcome) = match joined {
            Ok(result) => result,
            Err(e) => {
                warn!("geocode lookup task died: {e}");
                stats.failed_lookups += 1;
                continue;
            }
        };
        stats.fresh_lookups += 1;
        let found = match outcome {
            Ok(Some(found)) => Some(found),
            Ok(None) => {
                stats.failed_lookups += 1;
                warn!(constituent_id = %id, "geocoder returned no match");
                None
            }
            Err(reason) => {
                stats.failed_lookups += 1;
                warn!(constituent_id = %id, %reason, "geocode lookup failed");
                None
            }
        };
        coordinates[index] = found;
        updated_cache.insert(GeocodeCacheEntry {
            constituent_id: id,
            formatted_address: address,
            latitude: found.map(|c| c.latitude),
            longitude: found.map(|c| c.longitude),
        });
    }

    GeocodeOutcome {
        coordinates,
        updated_cache,
        stats,
    }
}
