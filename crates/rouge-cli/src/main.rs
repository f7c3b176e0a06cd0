use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use rouge_core::face_mesh::FaceMeshTracker;
use rouge_core::{shades, LandmarkSet, Shade};
use rouge_engine::{Compositor, EngineConfig, Session, Viewport};
use rouge_hw::{Frame, V4lCamera};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "rouge", about = "Rouge virtual lipstick try-on")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a live try-on session against a camera
    Run {
        /// V4L2 device path (overrides the config file)
        #[arg(short, long)]
        device: Option<String>,
        /// Face-landmark ONNX model (overrides the config file)
        #[arg(short, long)]
        model: Option<PathBuf>,
        /// Shade name or catalog id
        #[arg(short, long, default_value = "Scarlet Siren")]
        shade: String,
        /// Stop after this many seconds (runs until Ctrl-C otherwise)
        #[arg(long)]
        seconds: Option<u64>,
        /// Save a snapshot into this directory before stopping
        #[arg(long)]
        snapshot_dir: Option<PathBuf>,
        /// TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Apply a shade to a still image using precomputed landmarks
    Recolor {
        /// Input image
        #[arg(short, long)]
        image: PathBuf,
        /// JSON array of normalized {x, y, z} face-mesh landmarks
        #[arg(short, long)]
        landmarks: PathBuf,
        /// Shade name or catalog id
        #[arg(short, long)]
        shade: String,
        /// Output image
        #[arg(short, long)]
        out: PathBuf,
        /// TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List the shade catalog
    Shades,
    /// List V4L2 capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            device,
            model,
            shade,
            seconds,
            snapshot_dir,
            config,
        } => {
            let mut config = EngineConfig::load(config.as_deref())?;
            if let Some(device) = device {
                config.capture.device = device;
            }
            if let Some(model) = model {
                config.tracker.model_path = model;
            }
            run(config, find_shade(&shade)?, seconds, snapshot_dir).await?;
        }
        Commands::Recolor {
            image,
            landmarks,
            shade,
            out,
            config,
        } => {
            let config = EngineConfig::load(config.as_deref())?;
            recolor(&config, &image, &landmarks, &find_shade(&shade)?, &out)?;
            println!("Wrote {}", out.display());
        }
        Commands::Shades => {
            for shade in shades::catalog() {
                println!("{:>3}  {:<20} {}", shade.id, shade.name, shade.color.as_str());
            }
        }
        Commands::Devices => {
            let devices = V4lCamera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
    }

    Ok(())
}

fn find_shade(selector: &str) -> Result<Shade> {
    shades::lookup(selector).ok_or_else(|| anyhow!("unknown shade: {selector} (see `rouge shades`)"))
}

async fn run(
    config: EngineConfig,
    shade: Shade,
    seconds: Option<u64>,
    snapshot_dir: Option<PathBuf>,
) -> Result<()> {
    let model_path = config.tracker.model_path.clone();
    let options = config.tracker.options;
    let layout = config.tracker.input_layout;
    let tracker = tokio::task::spawn_blocking(move || {
        FaceMeshTracker::load(&model_path.to_string_lossy(), options, layout)
    })
    .await
    .context("model loading task failed")??;

    let camera = V4lCamera::new(config.capture.device.clone());
    let mut session = Session::new(config, Box::new(camera), Some(Box::new(tracker)));
    session.select_shade(shade);
    session.start().await?;
    println!("Session running. Press Ctrl-C to stop.");

    let deadline = async {
        match seconds {
            Some(s) => tokio::time::sleep(Duration::from_secs(s)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut report = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
            _ = &mut deadline => break,
            _ = report.tick() => {
                let status = session.status().await;
                tracing::info!(
                    state = ?status.state,
                    frames = status.frames_presented,
                    tracking = ?status.tracking,
                    submitted = status.inferences_submitted,
                    rejected = status.inferences_rejected,
                    "status"
                );
            }
        }
    }

    if let Some(dir) = snapshot_dir {
        match session.snapshot().await {
            Ok(snapshot) => {
                let path = snapshot.save(&dir)?;
                println!("Snapshot saved to {}", path.display());
            }
            Err(e) => eprintln!("{e}"),
        }
    }
    session.stop().await;
    Ok(())
}

fn recolor(
    config: &EngineConfig,
    image_path: &Path,
    landmarks_path: &Path,
    shade: &Shade,
    out: &Path,
) -> Result<()> {
    let rgba = image::open(image_path)
        .with_context(|| format!("failed to open {}", image_path.display()))?
        .to_rgba8();
    let (width, height) = rgba.dimensions();
    let frame = Frame::from_rgba(rgba.into_raw(), width, height, 0)?;

    let json = std::fs::read_to_string(landmarks_path)
        .with_context(|| format!("failed to read {}", landmarks_path.display()))?;
    let landmarks: LandmarkSet = serde_json::from_str(&json).context("invalid landmarks JSON")?;
    tracing::info!(count = landmarks.len(), width, height, "landmarks loaded");

    let mut compositor = Compositor::new(
        Viewport::new(width, height, 1.0, config.visual.dpr_limit),
        config.smoothing,
        config.visual,
        config.performance,
    );
    compositor.accept_results(Some(landmarks));
    let report = compositor.compose(Some(&frame.view()), shade);
    if !report.recolored && !shade.is_bare() {
        tracing::warn!("lip region not found; output is the unmodified image");
    }

    // The compositor renders a selfie (mirrored) view; flip back for a still.
    let output = image::imageops::flip_horizontal(compositor.buffers().front());
    output
        .save(out)
        .with_context(|| format!("failed to write {}", out.display()))?;
    Ok(())
}
