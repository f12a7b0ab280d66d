//! cropscan - run one scanning session and print what the scanner sees
//!
//! This binary:
//! 1. Resolves the scanner configuration (presets, CROPSCAN_CONFIG, env overrides)
//! 2. Opens the camera source and starts a session
//! 3. Prints every state change until Ctrl-C or `--seconds` elapses

use anyhow::{anyhow, Result};
use clap::Parser;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use cropscan::{
    open_provider, DecoderRegistry, Preset, ScannerConfig, ScannerSnapshot, SessionController,
    SyntheticConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Camera source: stub://..., a local image path, or v4l2:// (feature camera-v4l2).
    #[arg(long, env = "CROPSCAN_SOURCE")]
    source: Option<String>,
    /// Pipeline preset (cropper or continuous).
    #[arg(long)]
    preset: Option<Preset>,
    /// Text the synthetic camera paints as a marker symbol.
    #[arg(long)]
    payload: Option<String>,
    /// Run duration in seconds; 0 runs until Ctrl-C.
    #[arg(long, default_value_t = 10)]
    seconds: u64,
    /// Print snapshots as JSON lines.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = ScannerConfig::load_with_preset(args.preset)?;
    if let Some(source) = args.source {
        config.source = source;
    }
    config.validate()?;

    let provider = open_provider(
        &config.source,
        SyntheticConfig {
            payload: args.payload.clone(),
            ..SyntheticConfig::default()
        },
    )?;
    let decoder = DecoderRegistry::with_builtin().resolve(&config.decoder)?;
    log::info!(
        "cropscan: source {} via {} provider, decoder '{}', preset {:?}",
        config.source,
        provider.name(),
        decoder.name(),
        config.preset
    );

    let controller = SessionController::new(config, provider, decoder)?;
    let mut updates = controller.subscribe();

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    ctrlc::set_handler(move || signal.cancel()).expect("error setting Ctrl-C handler");

    if let Err(err) = controller.start().await {
        print_snapshot(&controller.snapshot(), args.json)?;
        return Err(anyhow!("failed to start scanning: {}", err));
    }

    let deadline = async {
        if args.seconds == 0 {
            std::future::pending::<()>().await
        } else {
            tokio::time::sleep(Duration::from_secs(args.seconds)).await
        }
    };
    tokio::pin!(deadline);

    let mut last_printed: Option<ScannerSnapshot> = None;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                log::info!("shutdown signal received, stopping session...");
                break;
            }
            _ = &mut deadline => {
                log::info!("run time elapsed, stopping session...");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if should_print(last_printed.as_ref(), &snapshot) {
                    print_snapshot(&snapshot, args.json)?;
                    last_printed = Some(snapshot);
                }
            }
        }
    }

    controller.stop();
    print_snapshot(&controller.snapshot(), args.json)?;
    Ok(())
}

/// Tick counters change every cycle; only print when something visible changed.
fn should_print(previous: Option<&ScannerSnapshot>, next: &ScannerSnapshot) -> bool {
    match previous {
        None => true,
        Some(prev) => {
            prev.phase != next.phase
                || prev.last_decoded_text != next.last_decoded_text
                || prev.last_error != next.last_error
                || prev.overlay_rect != next.overlay_rect
        }
    }
}

fn print_snapshot(snapshot: &ScannerSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
        return Ok(());
    }
    let text = snapshot.last_decoded_text.as_deref().unwrap_or("-");
    let overlay = snapshot
        .overlay_rect
        .map(|r| {
            format!(
                "{:.1}%,{:.1}% {:.1}%x{:.1}%",
                r.left_pct, r.top_pct, r.width_pct, r.height_pct
            )
        })
        .unwrap_or_else(|| "-".to_string());
    println!(
        "[{:?}] ticks={} decoded={} overlay={}",
        snapshot.phase, snapshot.ticks, text, overlay
    );
    if let Some(err) = &snapshot.last_error {
        println!("  error: {}", err);
    }
    Ok(())
}
