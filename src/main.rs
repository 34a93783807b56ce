use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use clap::Parser;

use whereami::{
    config::{API_KEY_ENV, AppConfig},
    geocode::{HttpTransport, ReverseGeocoder},
    location::{Permission, ReplaySource, Track},
    overlay::Emphasis,
    telemetry,
    template::{apply_template, marker_description, render_info_panel},
    tracker::Tracker,
};

#[derive(Parser)]
#[command(name = "whereami")]
#[command(about = "Where Am I - live address and nearest restaurant along a position track")]
struct Args {
    /// Track to replay (Google Takeout location history or a coordinate list)
    #[arg(value_name = "TRACK")]
    track: Utf8PathBuf,

    /// Configuration file
    #[arg(short, long, default_value = "whereami.yaml")]
    config: Utf8PathBuf,

    /// Playback speed multiplier applied to the watch interval
    #[arg(short, long, default_value_t = 1.0)]
    speed: f64,

    /// Refuse the location permission request
    #[arg(long)]
    deny_permission: bool,

    /// Overlay region to show instead of the configured default
    #[arg(short, long)]
    overlay: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init(args.verbose);

    println!("📍 WHEREAMI - Live Location Tracker");

    let config = AppConfig::load(&args.config)?;

    if !args.speed.is_finite() || args.speed <= 0.0 {
        bail!("--speed must be a positive number, got {}", args.speed);
    }

    let track = Track::from_file(&args.track)
        .with_context(|| format!("Failed to load track: {}", args.track))?;
    println!("🗺️  Loaded {} position(s) from {}", track.len(), args.track);

    match config.overlays.selection()? {
        Some(mut overlays) => {
            if let Some(id) = &args.overlay {
                overlays.select(id)?;
            }
            println!("🎨 Overlays:");
            for region in overlays.regions() {
                let marker = match overlays.emphasis(&region.id) {
                    Emphasis::Bold => "●",
                    Emphasis::Normal => "○",
                };
                println!(
                    "   {marker} {} ({}, {} vertices)",
                    region.label,
                    region.stroke_color,
                    region.coordinates.len()
                );
            }
        }
        None if args.overlay.is_some() => bail!("No overlay regions configured"),
        None => {}
    }

    let settings = config.geocode.settings();
    if settings.api_key.is_none() {
        println!("⚠️  No geocoding API key configured, set {API_KEY_ENV} to see addresses");
    }
    let geocoder = ReverseGeocoder::new(HttpTransport::new()?, settings);

    let permission = if args.deny_permission {
        Permission::Denied
    } else {
        Permission::Granted
    };
    let source = ReplaySource::new(track)
        .with_permission(permission)
        .with_speed(args.speed);

    let (tracker, handle) = Tracker::new(
        source,
        geocoder,
        config.generator(),
        config.watch.clone(),
    );
    let mut updates = handle.watch();
    let task = tokio::spawn(tracker.run());

    let stopper = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.stop();
        }
    });

    while updates.changed().await.is_ok() {
        let state = updates.borrow_and_update().clone();
        println!("{}", apply_template(&config.display.status, &state));
        if state.phase().is_terminal() {
            break;
        }
    }

    let final_state = task.await.context("Tracker task failed")?;

    println!("\n📋 Summary:");
    for line in render_info_panel(&final_state) {
        println!("   {line}");
    }
    if !final_state.candidates().is_empty() {
        println!("\n🍺 Places:");
        for place in final_state.candidates() {
            println!(
                "   - {} ({:.6}, {:.6}): {}",
                place.name,
                place.coordinate.latitude(),
                place.coordinate.longitude(),
                marker_description(place, &final_state)
            );
        }
    }
    println!("   Updates processed: {}", final_state.cycle());

    Ok(())
}
