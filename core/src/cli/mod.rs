pub mod report;

use crate::types::OutputSpacing;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Command-line arguments for echovol
#[derive(Parser, Debug)]
#[command(name = "echovol")]
#[command(about = "Proprietary ultrasound volume and cine loop decoder")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output format
    #[arg(short, long, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Supported container formats; there is no auto-detection
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a GE Kretz volume file, scan converting spherical grids
    Kretz {
        /// Path to the Kretz volume file (or DICOM file with --embedded)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output voxel spacing in mm, one value or three ("0.5" or "0.5,0.5,0.4")
        #[arg(short, long, default_value = "0.5", value_parser = OutputSpacing::parse)]
        spacing: OutputSpacing,

        /// Keep the native acquisition grid instead of scan converting
        #[arg(long)]
        no_scan_convert: bool,

        /// Byte offset of the Kretz payload within the file
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Read the payload from the KRETZ_US private element of a DICOM file
        #[arg(long)]
        embedded: bool,

        /// Write the decoded voxel buffer to this file as raw bytes
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decode a GE movie group cine loop from a DICOM file
    Movie {
        /// Path to the DICOM file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Write each frame as a raw file into this directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Extract and decompress Philips 4D US frame sets from a DICOM file
    Philips {
        /// Path to the DICOM file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Write one raw file per distinct (frame size, frame count) pair
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
}

/// Output format options
#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    Text,
    /// JSON format
    Json,
}
