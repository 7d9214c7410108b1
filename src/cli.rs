// src/cli.rs

use crate::error::{Result, VidsimError};
use crate::ffmpeg::Toolchain;
use clap::Parser;
use log::debug;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Paths of the video files to compare (only the first two are used)
    #[arg(short = 'v', long = "Videos", num_args = 0.., value_name = "PATH")]
    pub videos: Vec<PathBuf>,

    /// ffprobe executable used to inspect the videos
    #[arg(long, value_name = "PATH", default_value = "ffprobe")]
    pub ffprobe: PathBuf,

    /// ffmpeg executable used to decode the videos
    #[arg(long, value_name = "PATH", default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    /// Decoder threads passed to ffmpeg (default: number of CPUs)
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Write a per-frame JSON report to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Write a per-frame similarity plot (PNG) to this file
    #[arg(long, value_name = "FILE")]
    pub plot: Option<PathBuf>,

    /// Print debug logging to stderr
    #[arg(long)]
    pub verbose: bool,

    /// Enable logging to file (e.g., vidsim_YYYYMMDD_HHMMSS.log)
    #[arg(long)]
    pub log: bool,

    /// Directory for the log file (default: current directory)
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

impl CliArgs {
    /// Returns the two videos to compare. Anything past the second path is ignored.
    pub fn video_pair(&self) -> Result<(&Path, &Path)> {
        match self.videos.as_slice() {
            [first, second, rest @ ..] => {
                if !rest.is_empty() {
                    debug!("Ignoring {} extra video path(s)", rest.len());
                }
                Ok((first.as_path(), second.as_path()))
            }
            _ => Err(VidsimError::Input(format!(
                "expected at least two video paths, got {}",
                self.videos.len()
            ))),
        }
    }

    pub fn toolchain(&self) -> Toolchain {
        Toolchain {
            ffprobe: self.ffprobe.clone(),
            ffmpeg: self.ffmpeg.clone(),
        }
    }

    pub fn decoder_threads(&self) -> usize {
        self.threads.filter(|&n| n > 0).unwrap_or_else(num_cpus::get)
    }
}

pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}
