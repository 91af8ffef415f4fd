use clap::Parser;
use log::{info, warn};
use miette::{miette, IntoDiagnostic, Result, WrapErr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use timebase::config::Settings;
use timebase::recording::{
    run_playback, run_synthetic, FrameRecorder, Passthrough, PlaybackOutcome, RecorderConfig,
    RecordingManager,
};
use timebase::{Cli, Commands};
use timebase_core::{scan, MonotonicClock, PacketLayout, PlaybackController};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    let settings = match &cli.settings {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    let layout = if cli.native {
        PacketLayout::Native
    } else {
        settings.layout
    };
    let dir = cli.dir.clone().unwrap_or_else(|| settings.recordings_dir());
    let manager = RecordingManager::with_base_dir(dir, layout);

    match cli.command {
        Commands::List { json } => list(&manager, json),
        Commands::Info { file } => show_info(&resolve(&manager, &file), layout),
        Commands::Play {
            file,
            rate,
            loop_playback,
        } => {
            let rate = rate.unwrap_or(settings.default_rate);
            let looping = loop_playback || settings.loop_playback;
            play(&resolve(&manager, &file), layout, rate, looping, &settings).await
        }
        Commands::Record {
            seconds,
            fps,
            size,
            name,
        } => record(&manager, &settings, layout, seconds, fps, size, name.as_deref()).await,
    }
}

/// A bare name refers to the recordings directory unless it exists locally.
fn resolve(manager: &RecordingManager, file: &Path) -> PathBuf {
    if file.exists() || file.components().count() > 1 {
        file.to_path_buf()
    } else {
        manager.base_dir().join(file)
    }
}

/// Cancel the returned token on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted");
            token.cancel();
        }
    });
    cancel
}

fn list(manager: &RecordingManager, json: bool) -> Result<()> {
    let recordings = manager.list_recordings();

    if json {
        let out = serde_json::to_string_pretty(&recordings).into_diagnostic()?;
        println!("{}", out);
        return Ok(());
    }

    if recordings.is_empty() {
        println!("No recordings in {}", manager.base_dir().display());
        return Ok(());
    }

    println!(
        "{:<40} {:>10} {:>8} {:>10}",
        "FILE", "BYTES", "PACKETS", "SECONDS"
    );
    for r in &recordings {
        let torn = if r.tail_bytes > 0 { " (torn tail)" } else { "" };
        println!(
            "{:<40} {:>10} {:>8} {:>10.3}{}",
            r.filename, r.size, r.packets, r.duration_seconds, torn
        );
    }
    Ok(())
}

fn show_info(path: &Path, layout: PacketLayout) -> Result<()> {
    let summary = scan(path, layout)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to scan {}", path.display()))?;

    println!("{}", path.display());
    println!("  layout:        {}", layout);
    println!("  packets:       {}", summary.packets);
    println!("  duration:      {:.3}s", summary.duration());
    if let (Some(first), Some(last)) = (summary.first_timestamp, summary.last_timestamp) {
        println!("  timestamps:    {:.3}s .. {:.3}s", first, last);
    }
    println!("  payload bytes: {}", summary.payload_bytes);
    println!("  file bytes:    {}", summary.file_bytes);
    if summary.has_truncated_tail() {
        println!("  torn tail:     {} bytes ignored", summary.tail_bytes);
    }
    Ok(())
}

async fn play(
    path: &Path,
    layout: PacketLayout,
    rate: f32,
    looping: bool,
    settings: &Settings,
) -> Result<()> {
    let sink = |timestamp: f32, frame: &[u8]| {
        info!("{:>10.3}s  {} bytes", timestamp, frame.len());
    };
    let mut controller = PlaybackController::open(path, layout, sink, MonotonicClock::shared())
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to open {}", path.display()))?;

    controller.set_loop(looping);
    controller.play();
    if !controller.set_rate(rate) {
        return Err(miette!("Invalid playback rate {}", rate));
    }

    let outcome = run_playback(&mut controller, settings.tick_interval(), cancel_on_ctrl_c()).await;
    let status = controller.status();
    match outcome {
        PlaybackOutcome::Finished => println!(
            "Finished {}: {} frames",
            path.display(),
            status.frame_count
        ),
        PlaybackOutcome::Cancelled => println!(
            "Stopped at {:.3}s: {} frames",
            status.play_head, status.frame_count
        ),
    }
    Ok(())
}

async fn record(
    manager: &RecordingManager,
    settings: &Settings,
    layout: PacketLayout,
    seconds: Duration,
    fps: f32,
    size: usize,
    name: Option<&str>,
) -> Result<()> {
    if !(fps.is_finite() && fps > 0.0) {
        return Err(miette!("Frame rate must be positive, got {}", fps));
    }

    let filename = manager.generate_filename(name);
    let path = manager.get_recording_path(&filename);

    let config = RecorderConfig {
        poll_interval: settings.poll_interval(),
        layout,
    };
    let mut recorder = FrameRecorder::new(Passthrough, MonotonicClock::shared(), config);
    recorder.start(&path).into_diagnostic()?;

    let stats = run_synthetic(
        recorder.producer(),
        fps,
        size,
        seconds,
        cancel_on_ctrl_c(),
    )
    .await;
    recorder.stop().into_diagnostic()?;

    for e in recorder.errors().try_iter() {
        warn!("{}", e);
    }

    let status = recorder.status();
    println!("Recorded {}", path.display());
    println!("  generated: {}", stats.generated);
    println!("  accepted:  {}", stats.accepted);
    println!("  written:   {}", status.frames_written);
    println!("  dropped:   {}", status.frames_dropped);
    if status.failures > 0 {
        println!("  failures:  {}", status.failures);
    }
    Ok(())
}
