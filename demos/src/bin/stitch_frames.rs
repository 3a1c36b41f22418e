//! Stitches a directory of frames into one panorama
//!
//! Frames are read in file-name order, downscaled, stitched progressively and
//! cropped. Unreadable files and frames that cannot be registered are skipped.
//!
//! Run with: cargo run -p cv-demos --bin stitch_frames -- <frames_dir> [output] [--config file.json]

use anyhow::{bail, Context, Result};
use cv_stitching::{stitch_panorama, StitchConfig};
use image::RgbImage;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_OUTPUT: &str = "stitched_result.png";

struct Args {
    frames_dir: PathBuf,
    output: PathBuf,
    config: Option<PathBuf>,
}

fn parse_args() -> Result<Option<Args>> {
    let args: Vec<String> = env::args().collect();
    let mut positional = Vec::new();
    let mut config = None;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let path = iter.next().context("--config needs a file path")?;
            config = Some(PathBuf::from(path));
        } else {
            positional.push(arg.clone());
        }
    }

    if positional.is_empty() || positional.len() > 2 {
        println!("Usage: {} <frames_dir> [output] [--config file.json]", args[0]);
        return Ok(None);
    }

    Ok(Some(Args {
        frames_dir: PathBuf::from(&positional[0]),
        output: PathBuf::from(positional.get(1).map_or(DEFAULT_OUTPUT, String::as_str)),
        config,
    }))
}

fn load_config(path: Option<&Path>) -> Result<StitchConfig> {
    let Some(path) = path else {
        return Ok(StitchConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: StitchConfig =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}

fn is_frame(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
        .unwrap_or(false)
}

/// Frame files of `dir`, sorted by name.
fn frame_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_frame(p))
        .collect();
    paths.sort();
    Ok(paths)
}

/// Decodes every readable frame; the returned paths are parallel to the images.
fn load_frames(paths: Vec<PathBuf>) -> (Vec<PathBuf>, Vec<RgbImage>) {
    paths
        .into_iter()
        .filter_map(|path| match image::open(&path) {
            Ok(img) => Some((path, img.to_rgb8())),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable frame");
                None
            }
        })
        .unzip()
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let Some(args) = parse_args()? else {
        return Ok(());
    };
    cv_core::init_global_thread_pool(None).map_err(anyhow::Error::msg)?;
    let config = load_config(args.config.as_deref())?;

    let (paths, frames) = load_frames(frame_paths(&args.frames_dir)?);
    if frames.is_empty() {
        bail!("no readable frames in {}", args.frames_dir.display());
    }
    info!(frames = frames.len(), dir = %args.frames_dir.display(), "loaded frames");

    let report = stitch_panorama(frames, &config)?;
    for skipped in &report.skipped {
        warn!(
            frame = %paths.get(skipped.index).map(|p| p.display().to_string()).unwrap_or_default(),
            reason = %skipped.reason,
            "frame not stitched"
        );
    }

    report
        .panorama
        .save(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!(
        output = %args.output.display(),
        width = report.panorama.width(),
        height = report.panorama.height(),
        stitched = report.stitched,
        skipped = report.skipped.len(),
        "panorama saved"
    );

    Ok(())
}
