use clap::Parser;
use echovol_core::cli::report::{FrameSetReport, SequenceReport, VolumeReport};
use echovol_core::cli::{Cli, Command, OutputFormat};
use echovol_core::{
    extract_philips_frames, load_ge_movie, load_kretz, load_kretz_embedded, ExtractedFrameSet,
    ImageSequence, KretzReadOptions, LoadedVolume, Result,
};
use log::{error, info};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let outcome = match cli.command {
        Command::Kretz {
            ref file,
            spacing,
            no_scan_convert,
            offset,
            embedded,
            ref output,
        } => {
            let options = KretzReadOptions {
                scan_convert: !no_scan_convert,
                output_spacing_mm: spacing,
                source_byte_offset: offset,
            };
            run_kretz(file, &options, embedded, output.as_deref(), &cli.format)
        }
        Command::Movie {
            ref file,
            ref output_dir,
        } => run_movie(file, output_dir.as_deref(), &cli.format),
        Command::Philips {
            ref file,
            ref output_dir,
        } => run_philips(file, output_dir.as_deref(), &cli.format),
    };

    if let Err(e) = outcome {
        error!("{}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn setup_logging(verbose: bool) {
    if verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }
}

fn run_kretz(
    file: &Path,
    options: &KretzReadOptions,
    embedded: bool,
    output: Option<&Path>,
    format: &OutputFormat,
) -> Result<()> {
    info!("Loading Kretz volume from {}", file.display());
    let loaded = if embedded {
        load_kretz_embedded(file, options)?
    } else {
        load_kretz(file, options)?
    };

    if let Some(path) = output {
        fs::write(path, &loaded.volume.voxels)?;
        info!(
            "Wrote {} voxel bytes to {}",
            loaded.volume.voxels.len(),
            path.display()
        );
    }

    match format {
        OutputFormat::Text => print!("{}", VolumeReport::new(&loaded)),
        OutputFormat::Json => print_json(|| volume_json(&loaded)),
    }
    Ok(())
}

fn run_movie(file: &Path, output_dir: Option<&Path>, format: &OutputFormat) -> Result<()> {
    info!("Loading GE movie group from {}", file.display());
    let sequence = load_ge_movie(file)?;

    if let Some(dir) = output_dir {
        fs::create_dir_all(dir)?;
        for (number, frame) in sequence.frames().iter().enumerate() {
            let path = dir.join(format!("frame_{:04}.raw", number));
            fs::write(&path, &frame.image.pixels)?;
        }
        info!("Wrote {} frames to {}", sequence.len(), dir.display());
    }

    match format {
        OutputFormat::Text => print!("{}", SequenceReport::new(&sequence)),
        OutputFormat::Json => print_json(|| sequence_json(&sequence)),
    }
    Ok(())
}

fn run_philips(file: &Path, output_dir: Option<&Path>, format: &OutputFormat) -> Result<()> {
    info!("Extracting Philips 4D US frames from {}", file.display());
    let sets = extract_philips_frames(file)?;

    if let Some(dir) = output_dir {
        fs::create_dir_all(dir)?;
        write_frame_sets(&sets, dir)?;
    }

    match format {
        OutputFormat::Text => print!("{}", FrameSetReport::new(&sets)),
        OutputFormat::Json => print_json(|| frame_sets_json(&sets)),
    }
    Ok(())
}

/// Writes extracted frames, one file per distinct (frame size, frame count)
/// pair; streams sharing a shape append to the same file.
fn write_frame_sets(sets: &[ExtractedFrameSet], dir: &Path) -> Result<()> {
    let mut outputs: BTreeMap<(usize, usize), PathBuf> = BTreeMap::new();
    for set in sets {
        let key = (set.frame_size(), set.frames.len());
        let path = outputs
            .entry(key)
            .or_insert_with(|| dir.join(format!("frames_{}x{}b.raw", key.1, key.0)))
            .clone();
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        for frame in &set.frames {
            file.write_all(frame)?;
        }
        info!(
            "Wrote {} frames of {} bytes to {}",
            set.frames.len(),
            set.frame_size(),
            path.display()
        );
    }
    Ok(())
}

fn print_json<F>(serialize: F)
where
    F: FnOnce() -> std::result::Result<String, JsonError>,
{
    match serialize() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            error!("Failed to serialize to JSON: {}", e);
            eprintln!("Error: Failed to serialize to JSON: {}", e);
            process::exit(1);
        }
    }
}

#[cfg(feature = "json")]
type JsonError = serde_json::Error;
#[cfg(not(feature = "json"))]
type JsonError = String;

#[cfg(feature = "json")]
fn volume_json(loaded: &LoadedVolume) -> std::result::Result<String, JsonError> {
    use serde::Serialize;

    #[derive(Serialize)]
    struct VolumeJson<'a> {
        name: &'a str,
        dimensions: [u32; 3],
        spacing: [f64; 3],
        origin: [f64; 3],
        voxel_count: usize,
    }

    serde_json::to_string_pretty(&VolumeJson {
        name: &loaded.name,
        dimensions: loaded.volume.dimensions,
        spacing: loaded.volume.spacing,
        origin: loaded.volume.origin,
        voxel_count: loaded.volume.voxel_count(),
    })
}

#[cfg(feature = "json")]
fn sequence_json(sequence: &ImageSequence) -> std::result::Result<String, JsonError> {
    use serde::Serialize;

    #[derive(Serialize)]
    struct FrameJson<'a> {
        index: &'a str,
        timestamp_s: f64,
        width: u32,
        height: u32,
    }

    let frames: Vec<FrameJson> = sequence
        .frames()
        .iter()
        .map(|f| FrameJson {
            index: &f.index_key,
            timestamp_s: f.timestamp_s,
            width: f.image.width,
            height: f.image.height,
        })
        .collect();
    serde_json::to_string_pretty(&frames)
}

#[cfg(feature = "json")]
fn frame_sets_json(sets: &[ExtractedFrameSet]) -> std::result::Result<String, JsonError> {
    use serde::Serialize;

    #[derive(Serialize)]
    struct SetJson<'a> {
        datatype: &'a str,
        scheme: &'static str,
        frame_count: usize,
        frame_size: usize,
    }

    let summaries: Vec<SetJson> = sets
        .iter()
        .map(|s| SetJson {
            datatype: &s.datatype,
            scheme: s.scheme.tag(),
            frame_count: s.frames.len(),
            frame_size: s.frame_size(),
        })
        .collect();
    serde_json::to_string_pretty(&summaries)
}

#[cfg(not(feature = "json"))]
fn volume_json(_loaded: &LoadedVolume) -> std::result::Result<String, JsonError> {
    Err(json_feature_missing())
}

#[cfg(not(feature = "json"))]
fn sequence_json(_sequence: &ImageSequence) -> std::result::Result<String, JsonError> {
    Err(json_feature_missing())
}

#[cfg(not(feature = "json"))]
fn frame_sets_json(_sets: &[ExtractedFrameSet]) -> std::result::Result<String, JsonError> {
    Err(json_feature_missing())
}

#[cfg(not(feature = "json"))]
fn json_feature_missing() -> String {
    "JSON output requires the 'json' feature (rebuild with: cargo build --features json)"
        .to_string()
}
