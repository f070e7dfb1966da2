pub mod affiliation;
pub mod enrich;
pub mod geocode;
pub mod interests;
pub mod merge;

use crate::config::Config;
use crate::domain::ConstituentId;
use crate::error::Result;
use crate::ports::GeocoderPort;
use crate::tables;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Result of a complete refinery run.
#[derive(Debug)]
pub struct RunSummary {
    pub cleaned_records: usize,
    pub master_records: usize,
    pub cache_hits: usize,
    pub fresh_lookups: usize,
    pub failed_lookups: usize,
    pub affiliation_vocabulary: usize,
    pub unknown_affiliation_labels: Vec<String>,
    pub master_path: PathBuf,
    pub layer_files: Vec<PathBuf>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub dry_run: bool,
}

pub struct Refinery;

impl Refinery {
    /// Run the full transform-and-merge pipeline once.
    ///
    /// Every fallible transformation completes before the first output byte
    /// is written, so a fatal error leaves no partial extracts behind.
    #[instrument(skip(config, geocoder))]
    pub async fn run(
        config: &Config,
        geocoder: Arc<dyn GeocoderPort>,
        dry_run: bool,
    ) -> Result<RunSummary> {
        let t_run = std::time::Instant::now();
        counter!("refinery_runs_total").increment(1);

        // Step 1: load everything up front; schema errors abort here.
        info!("📥 Loading source exports...");
        println!("📥 Loading source exports...");
        let profile = tables::load_profile_records(&config.inputs.profile, "profile")?;
        let cleaned = tables::load_profile_records(&config.inputs.cleaned, "cleaned")?;
        let bulk = tables::load_bulk_profile(&config.inputs.bulk_profile)?;
        let interest_events = tables::load_interest_events(&config.inputs.interests)?;
        let cache = geocode::GeocodeCache::load(&config.geocode.cache_path)?;
        info!(
            "✅ Loaded {} profile / {} cleaned / {} bulk / {} interest rows, {} cached addresses",
            profile.len(),
            cleaned.len(),
            bulk.len(),
            interest_events.len(),
            cache.len()
        );

        // Step 2: per-record derived columns on the canonical table.
        let cleaned_count = cleaned.len();
        let enriched = enrich::derive_columns(cleaned)?;
        counter!("refinery_records_total").increment(cleaned_count as u64);

        // Step 3: reconcile addresses against the cache.
        println!("🌍 Reconciling geocodes ({} records)...", enriched.len());
        let t_geocode = std::time::Instant::now();
        let geocoded = geocode::reconcile(
            &enriched,
            &cache,
            geocoder,
            Duration::from_secs(config.geocode.timeout_seconds),
            config.geocode.max_concurrent_lookups,
        )
        .await;
        histogram!("refinery_geocode_duration_seconds")
            .record(t_geocode.elapsed().as_secs_f64());
        counter!("refinery_geocode_cache_hits_total")
            .increment(geocoded.stats.cache_hits as u64);
        counter!("refinery_geocode_lookups_total")
            .increment(geocoded.stats.fresh_lookups as u64);
        counter!("refinery_geocode_failures_total")
            .increment(geocoded.stats.failed_lookups as u64);
        info!(
            "✅ Geocodes reconciled: {} reused, {} fresh, {} failed",
            geocoded.stats.cache_hits,
            geocoded.stats.fresh_lookups,
            geocoded.stats.failed_lookups
        );

        // Step 4: interest aggregation and the merge chain.
        println!("🔗 Merging sources...");
        let interest_profiles = interests::aggregate_interests(&interest_events);
        let first_interest_events = interests::first_events_by_id(&interest_events);
        let profile_ids: HashSet<ConstituentId> =
            profile.into_iter().map(|r| r.lookup_id).collect();
        let masters = merge::merge_records(
            enriched,
            geocoded.coordinates,
            &bulk,
            &profile_ids,
            &interest_profiles,
            &first_interest_events,
        );
        info!("✅ Merged down to {} master records", masters.len());

        // Step 5: affiliation normalization.
        println!("🏷️  Normalizing affiliations...");
        let (refined, vocabulary) = affiliation::normalize_affiliations(masters);
        let unknown_affiliation_labels = affiliation::unknown_labels(&vocabulary);
        if !unknown_affiliation_labels.is_empty() {
            warn!(
                count = unknown_affiliation_labels.len(),
                labels = ?unknown_affiliation_labels,
                "affiliation labels outside the known split list; no layer files for these"
            );
        }

        // Step 6: write phase. All transforms are done; nothing below can
        // leave a partially transformed extract behind.
        let master_records = refined.len();
        let layer_files = if dry_run {
            info!("dry run: skipping master extract, layer files, and cache write");
            println!("⏭️  Dry run: no outputs written");
            Vec::new()
        } else {
            println!("💾 Writing outputs...");
            let all: Vec<&affiliation::RefinedRecord> = refined.iter().collect();
            tables::write_extract(&config.outputs.master, &all, &vocabulary)?;
            info!("💾 Wrote master extract to {}", config.outputs.master.display());
            let layer_files = affiliation::write_affiliation_layers(
                &config.outputs.layers_dir,
                &refined,
                &vocabulary,
            )?;
            geocoded.updated_cache.save(&config.geocode.cache_path)?;
            info!(
                "💾 Rewrote geocode cache ({} entries) at {}",
                geocoded.updated_cache.len(),
                config.geocode.cache_path.display()
            );
            layer_files
        };

        let duration_seconds = t_run.elapsed().as_secs_f64();
        histogram!("refinery_run_duration_seconds").record(duration_seconds);

        Ok(RunSummary {
            cleaned_records: cleaned_count,
            master_records,
            cache_hits: geocoded.stats.cache_hits,
            fresh_lookups: geocoded.stats.fresh_lookups,
            failed_lookups: geocoded.stats.failed_lookups,
            affiliation_vocabulary: vocabulary.len(),
            unknown_affiliation_labels,
            master_path: config.outputs.master.clone(),
            layer_files,
            completed_at: Utc::now(),
            duration_seconds,
            dry_run,
        })
    }
}
