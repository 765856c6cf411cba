//! staygraph CLI - Debug tool for the stay-point mining pipeline
//!
//! Usage:
//!   staygraph-cli mine <data_dir>
//!   staygraph-cli staypoints <file.plt>
//!   staygraph-cli hotspot <data_dir> --lat <lat> --lng <lng> [--radius-km <km>]
//!   staygraph-cli recommend <data_dir> --user <folder> [--threshold <t>] [--top <n>]
//!
//! Each command runs the offline pipeline over an in-memory store and shows
//! verbose output of the phases, helping to understand how stay points,
//! frameworks and recommendations come out of a Geolife directory.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use staygraph::{
    geolife, staypoint::detect_stay_points, CancelToken, MemoryStore, MiningConfig, MiningEngine,
    Result, StayPointConfig, Store,
};

#[derive(Parser)]
#[command(name = "staygraph-cli")]
#[command(about = "Debug tool for stay-point mining and recommendation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base DBSCAN radius in kilometers
    #[arg(long, global = true, default_value = "0.1")]
    eps_km: f64,

    /// Minimum neighborhood size for a core point
    #[arg(long, global = true, default_value = "2")]
    min_pts: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a Geolife directory and build framework plus user graphs
    Mine {
        /// Directory containing Data/<user>/Trajectory/*.plt
        data_dir: PathBuf,
    },

    /// Detect stay points in a single .plt file
    Staypoints {
        /// Path to one .plt trajectory file
        file: PathBuf,
    },

    /// Find popular clusters near a coordinate
    Hotspot {
        /// Directory containing Data/<user>/Trajectory/*.plt
        data_dir: PathBuf,

        #[arg(long)]
        lat: f64,

        #[arg(long)]
        lng: f64,

        /// Search radius in kilometers
        #[arg(long, default_value = "5.0")]
        radius_km: f64,
    },

    /// Recommend unvisited clusters for one user
    Recommend {
        /// Directory containing Data/<user>/Trajectory/*.plt
        data_dir: PathBuf,

        /// User folder name (e.g. "000")
        #[arg(long)]
        user: String,

        /// Minimum similarity for potential friends
        #[arg(long, default_value = "0.5")]
        threshold: f64,

        /// Maximum number of recommendations
        #[arg(long, default_value = "5")]
        top: usize,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    let cli = Cli::parse();

    let mut config = MiningConfig::default();
    config.framework.eps_km = cli.eps_km;
    config.framework.min_pts = cli.min_pts;

    let result = match cli.command {
        Commands::Mine { data_dir } => run_mine(&data_dir, config),
        Commands::Staypoints { file } => run_staypoints(&file, &config.stay_point),
        Commands::Hotspot {
            data_dir,
            lat,
            lng,
            radius_km,
        } => run_hotspot(&data_dir, config, lat, lng, radius_km),
        Commands::Recommend {
            data_dir,
            user,
            threshold,
            top,
        } => run_recommend(&data_dir, config, &user, threshold, top),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Import and build everything, printing per-phase summaries.
fn run_pipeline(
    data_dir: &PathBuf,
    config: MiningConfig,
    cancel: &CancelToken,
) -> Result<MiningEngine<MemoryStore>> {
    let mut engine = MiningEngine::with_config(MemoryStore::new(), config);

    println!("{}", "=".repeat(60));
    println!("IMPORT: {}", data_dir.display());
    println!("{}", "=".repeat(60));
    let stats = engine.import(data_dir, cancel)?;
    println!(
        "  {} users, {} trajectories, {} stay points ({} skipped, {} failed)",
        stats.users_imported,
        stats.trajectories,
        stats.stay_points,
        stats.users_skipped,
        stats.users_failed
    );

    println!("\n[Phase 2] Building hierarchical framework...");
    let framework = engine.build_framework(cancel)?;
    for layer in &framework.layers {
        println!("  layer {}: {} clusters", layer.level, layer.clusters.len());
    }

    println!("\n[Phase 3] Building user graphs...");
    let built = engine.build_user_graphs(cancel)?;
    println!("  {built} graphs persisted");

    Ok(engine)
}

fn run_mine(data_dir: &PathBuf, config: MiningConfig) -> Result<()> {
    let cancel = CancelToken::new();
    run_pipeline(data_dir, config, &cancel)?;
    println!("\nDone.");
    Ok(())
}

fn run_staypoints(file: &PathBuf, config: &StayPointConfig) -> Result<()> {
    let fixes = geolife::parse_plt(file)?;
    println!("{}: {} fixes", file.display(), fixes.len());

    let stays = detect_stay_points(&fixes, config);
    println!("Stay points found: {}", stays.len());
    for (i, sp) in stays.iter().enumerate() {
        println!(
            "  {:3}. ({:.6}, {:.6})  {} -> {}  ({} min)",
            i + 1,
            sp.latitude,
            sp.longitude,
            sp.arrival.format("%Y-%m-%d %H:%M:%S"),
            sp.departure.format("%Y-%m-%d %H:%M:%S"),
            sp.duration().num_minutes()
        );
    }
    Ok(())
}

fn run_hotspot(
    data_dir: &PathBuf,
    config: MiningConfig,
    lat: f64,
    lng: f64,
    radius_km: f64,
) -> Result<()> {
    let cancel = CancelToken::new();
    let mut engine = run_pipeline(data_dir, config, &cancel)?;

    println!("\n{}", "-".repeat(60));
    println!("HOTSPOTS near ({lat:.5}, {lng:.5}) within {radius_km} km");
    println!("{}", "-".repeat(60));

    let hits = engine.hotspots(lat, lng, radius_km, &cancel)?;
    if hits.is_empty() {
        println!("  (none)");
        return Ok(());
    }
    for cluster in &hits {
        println!(
            "  cluster {}: center ({:.5}, {:.5}), radius {:.3} km, {} users",
            cluster.id,
            cluster.center_lat,
            cluster.center_lng,
            cluster.radius_km,
            cluster.visit_count
        );
    }
    Ok(())
}

fn run_recommend(
    data_dir: &PathBuf,
    mut config: MiningConfig,
    user_folder: &str,
    threshold: f64,
    top: usize,
) -> Result<()> {
    config.recommend.min_similarity = threshold;
    config.recommend.top_n = top;

    let cancel = CancelToken::new();
    let mut engine = run_pipeline(data_dir, config, &cancel)?;

    let (user, _) = engine.store().find_or_create_user(user_folder, &cancel)?;

    println!("\n{}", "-".repeat(60));
    println!("RECOMMENDATIONS for user {user_folder} (id {})", user.id);
    println!("{}", "-".repeat(60));

    let recommendations = engine.recommend(user.id, &cancel)?;
    if recommendations.is_empty() {
        println!("  (no similar users or nothing new to suggest)");
        return Ok(());
    }

    let json =
        serde_json::to_string_pretty(&recommendations).unwrap_or_else(|_| "[]".to_string());
    println!("{json}");
    Ok(())
}
