use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use constituent_refinery::config::Config;
use constituent_refinery::infra::arcgis::ArcGisGeocoder;
use constituent_refinery::logging;
use constituent_refinery::pipeline::Refinery;
use constituent_refinery::ports::GeocoderPort;

#[derive(Parser)]
#[command(name = "constituent_refinery")]
#[command(about = "Constituent profile enrichment and affiliation extract pipeline")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the pipeline configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Run every transformation but write no output files
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let geocoder: Arc<dyn GeocoderPort> = Arc::new(ArcGisGeocoder::from_env()?);

    println!("🚀 Starting refinery run...");
    info!("Starting refinery run");

    match Refinery::run(&config, geocoder, cli.dry_run).await {
        Ok(summary) => {
            info!("Refinery run finished");
            println!("\n📊 Run results:");
            println!("   Cleaned records in: {}", summary.cleaned_records);
            println!("   Master records out: {}", summary.master_records);
            println!(
                "   Geocodes: {} reused, {} fresh, {} failed",
                summary.cache_hits, summary.fresh_lookups, summary.failed_lookups
            );
            println!(
                "   Affiliation vocabulary: {} labels",
                summary.affiliation_vocabulary
            );
            if !summary.unknown_affiliation_labels.is_empty() {
                println!(
                    "⚠️  {} label(s) outside the known split list: {}",
                    summary.unknown_affiliation_labels.len(),
                    summary.unknown_affiliation_labels.join(", ")
                );
            }
            if summary.dry_run {
                println!("   Dry run: no outputs written");
            } else {
                println!("   Master extract: {}", summary.master_path.display());
                println!("   Layer files: {}", summary.layer_files.len());
            }
            println!("   Duration: {:.1}s", summary.duration_seconds);
        }
        Err(e) => {
            error!("Refinery run failed: {}", e);
            eprintln!("❌ Run failed: {e}");
            std::process::exit(1);
        }
    }

    Ok(())
}
