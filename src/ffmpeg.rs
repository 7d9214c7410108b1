// src/ffmpeg.rs

use crate::error::{Result, VidsimError};
use crate::frame::{Frame, FrameSource, frame_size};
use log::{debug, error, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

pub const VIDEO_SWS_FLAGS: &str = "accurate_rnd+full_chroma_int";

/// Longest tail of decoder stderr carried into an error message.
const STDERR_TAIL_BYTES: usize = 2000;

/// Executables used to probe and decode videos.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub ffprobe: PathBuf,
    pub ffmpeg: PathBuf,
}

impl Default for Toolchain {
    fn default() -> Self {
        Toolchain {
            ffprobe: PathBuf::from("ffprobe"),
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VideoInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frame_count: Option<u64>,
    pub fps: f64,
    pub pix_fmt: String,
    /// Channels the decoded raw frames carry (1, 2, 3 or 4).
    pub channels: u8,
}

/// Runs ffprobe to get video metadata.
pub fn get_video_info(ffprobe: &Path, video_path: &Path) -> Result<VideoInfo> {
    info!("Probing video file: {}", video_path.display());

    let output = Command::new(ffprobe)
        .args(["-v", "error", "-select_streams", "v:0"])
        .args([
            "-show_entries",
            "stream=width,height,pix_fmt,nb_frames,r_frame_rate",
            "-of",
            "json",
        ])
        .arg(video_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("ffprobe failed for {}: {}", video_path.display(), stderr.trim());
        return Err(VidsimError::Command(format!(
            "ffprobe failed for {}: {}",
            video_path.display(),
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    debug!("ffprobe output for {}: {}", video_path.display(), stdout);
    parse_probe_output(video_path, &stdout)
}

/// Parses the JSON printed by ffprobe for the first video stream.
pub fn parse_probe_output(video_path: &Path, stdout: &str) -> Result<VideoInfo> {
    let json: serde_json::Value = serde_json::from_str(stdout)
        .map_err(|e| VidsimError::Parse(format!("Failed to parse ffprobe JSON: {}", e)))?;

    let stream = json["streams"]
        .get(0)
        .ok_or_else(|| VidsimError::Parse("No video stream found in ffprobe output".to_string()))?;

    let width = stream["width"]
        .as_u64()
        .ok_or_else(|| VidsimError::Parse("Missing width".to_string()))? as u32;
    let height = stream["height"]
        .as_u64()
        .ok_or_else(|| VidsimError::Parse("Missing height".to_string()))? as u32;
    if width == 0 || height == 0 {
        return Err(VidsimError::Parse(format!(
            "Invalid frame dimensions {}x{}",
            width, height
        )));
    }

    let pix_fmt = stream["pix_fmt"]
        .as_str()
        .ok_or_else(|| VidsimError::Parse("Missing pix_fmt".to_string()))?
        .to_string();
    let channels = channels_for_pix_fmt(&pix_fmt);

    // Containers without an index report no count; the decoder finds the end anyway.
    let frame_count = stream["nb_frames"]
        .as_str()
        .and_then(|fc| fc.parse::<u64>().ok());

    let fps = match stream["r_frame_rate"].as_str() {
        Some(fps_str) => parse_frame_rate(fps_str)?,
        None => 0.0,
    };

    info!(
        "Detected Info for {}: {}x{} @ {:.3} fps, {} frames, pix_fmt={} ({} channels)",
        video_path.display(),
        width,
        height,
        fps,
        frame_count.map_or_else(|| "unknown".to_string(), |c| c.to_string()),
        pix_fmt,
        channels
    );

    Ok(VideoInfo {
        path: video_path.to_path_buf(),
        width,
        height,
        frame_count,
        fps,
        pix_fmt,
        channels,
    })
}

/// Parses frame rate string (e.g., "24000/1001") into f64.
fn parse_frame_rate(fps_str: &str) -> Result<f64> {
    if let Some((num, den)) = fps_str.split_once('/') {
        let num = num
            .parse::<f64>()
            .map_err(|_| VidsimError::Parse(format!("Invalid FPS numerator: {}", num)))?;
        let den = den
            .parse::<f64>()
            .map_err(|_| VidsimError::Parse(format!("Invalid FPS denominator: {}", den)))?;
        if den == 0.0 {
            Err(VidsimError::Parse("FPS denominator cannot be zero".to_string()))
        } else {
            Ok(num / den)
        }
    } else {
        fps_str
            .parse::<f64>()
            .map_err(|_| VidsimError::Parse(format!("Invalid FPS format: {}", fps_str)))
    }
}

static GRAY_ALPHA_PIX_FMT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ya(8|16)").expect("Invalid gray+alpha pix_fmt regex"));
static GRAY_PIX_FMT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(gray|mono(white|black)|y(8|10|12|14|16))").expect("Invalid gray pix_fmt regex")
});
static ALPHA_PIX_FMT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(rgba|bgra|argb|abgr|yuva|gbrap|ayuv|vuya|rgb32|bgr32|pal8)")
        .expect("Invalid alpha pix_fmt regex")
});

/// Number of channels a decoded frame keeps for the given source pixel format.
pub fn channels_for_pix_fmt(pix_fmt: &str) -> u8 {
    if GRAY_ALPHA_PIX_FMT.is_match(pix_fmt) {
        2
    } else if GRAY_PIX_FMT.is_match(pix_fmt) {
        1
    } else if ALPHA_PIX_FMT.is_match(pix_fmt) {
        4
    } else {
        3
    }
}

/// Raw output pixel format that preserves `channels` samples per pixel.
fn raw_pix_fmt(channels: u8) -> &'static str {
    match channels {
        1 => "gray",
        2 => "ya8",
        4 => "rgba",
        _ => "rgb24",
    }
}

/// An ffmpeg process decoding one file into raw frames on its stdout.
///
/// The child process is killed and reaped when the stream is released or dropped.
#[derive(Debug)]
pub struct VideoStream {
    path: PathBuf,
    info: Option<VideoInfo>,
    child: Option<Child>,
    stdout: Option<BufReader<ChildStdout>>,
    stderr_log: Option<File>,
    frames_read: u64,
}

impl VideoStream {
    /// Opens `path` for decoding. A file ffprobe cannot make sense of gives a
    /// stream that reports itself closed rather than an error; only a missing
    /// ffprobe/ffmpeg executable is fatal.
    pub fn open(tools: &Toolchain, path: &Path, threads: usize) -> Result<Self> {
        let mut stream = VideoStream {
            path: path.to_path_buf(),
            info: None,
            child: None,
            stdout: None,
            stderr_log: None,
            frames_read: 0,
        };

        let info = match get_video_info(&tools.ffprobe, path) {
            Ok(info) => info,
            Err(VidsimError::Io(e)) => {
                error!("Could not run ffprobe: {}", e);
                return Err(VidsimError::Io(e));
            }
            Err(e) => {
                warn!("Cannot open {} as a video: {}", path.display(), e);
                return Ok(stream);
            }
        };

        let pix_fmt = raw_pix_fmt(info.channels);
        let stderr_log = tempfile::tempfile()?;
        let mut command = Command::new(&tools.ffmpeg);
        command
            .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            .args(["-threads", threads.to_string().as_str()])
            // Frames must come out in the coded width x height ffprobe reported.
            .arg("-noautorotate")
            .arg("-i")
            .arg(path)
            .args(["-map", "0:v:0", "-fps_mode", "passthrough"])
            .args(["-sws_flags", VIDEO_SWS_FLAGS])
            .args(["-f", "rawvideo", "-pix_fmt", pix_fmt, "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(stderr_log.try_clone()?));
        debug!("Spawning decoder for {}: {:?}", path.display(), command);

        let mut child = command.spawn()?;
        stream.stdout = child.stdout.take().map(BufReader::new);
        stream.child = Some(child);
        stream.stderr_log = Some(stderr_log);
        stream.info = Some(info);
        Ok(stream)
    }

    pub fn info(&self) -> Option<&VideoInfo> {
        self.info.as_ref()
    }

    /// Stops the decoder if it is still running and waits for it to exit.
    pub fn release(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!("Decoder for {} already exited: {}", self.path.display(), e);
            }
            match child.wait() {
                Ok(status) => debug!(
                    "Released decoder for {} after {} frames ({})",
                    self.path.display(),
                    self.frames_read,
                    status
                ),
                Err(e) => warn!("Failed to reap decoder for {}: {}", self.path.display(), e),
            }
        }
    }

    /// Waits for the decoder after its output ended. Only a clean exit counts
    /// as end of stream.
    fn finish(&mut self) -> Result<()> {
        self.stdout = None;
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };
        let status = child.wait()?;
        if status.success() {
            debug!(
                "Decoder for {} finished after {} frames",
                self.path.display(),
                self.frames_read
            );
            return Ok(());
        }

        let stderr = self.decoder_stderr();
        error!(
            "Decoder for {} failed after {} frames ({}): {}",
            self.path.display(),
            self.frames_read,
            status,
            stderr
        );
        Err(VidsimError::Command(format!(
            "ffmpeg failed decoding {} after {} frames ({}): {}",
            self.path.display(),
            self.frames_read,
            status,
            stderr
        )))
    }

    /// Tail of what the decoder wrote to stderr.
    fn decoder_stderr(&mut self) -> String {
        let Some(log) = self.stderr_log.as_mut() else {
            return String::new();
        };
        let mut captured = Vec::new();
        if let Err(e) = log
            .seek(SeekFrom::Start(0))
            .and_then(|_| log.read_to_end(&mut captured))
        {
            warn!("Could not read decoder stderr for {}: {}", self.path.display(), e);
        }
        let start = captured.len().saturating_sub(STDERR_TAIL_BYTES);
        String::from_utf8_lossy(&captured[start..]).trim().to_string()
    }
}

impl FrameSource for VideoStream {
    fn is_opened(&self) -> bool {
        self.child.is_some()
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        let (Some(info), Some(reader)) = (self.info.as_ref(), self.stdout.as_mut()) else {
            return Ok(None);
        };
        let (width, height, channels) = (info.width, info.height, info.channels);

        let mut buf = vec![0u8; frame_size(width, height, channels)];
        let filled = fill_frame(reader, &mut buf)?;
        if filled == 0 {
            self.finish()?;
            return Ok(None);
        }
        if filled < buf.len() {
            return Err(VidsimError::Decode(format!(
                "truncated frame {} from {}: got {} of {} bytes",
                self.frames_read,
                self.path.display(),
                filled,
                buf.len()
            )));
        }

        self.frames_read += 1;
        Frame::from_raw(width, height, channels, buf).map(Some)
    }
}

impl Drop for VideoStream {
    fn drop(&mut self) {
        self.release();
    }
}

/// Reads until `buf` is full or the reader hits end of stream, returning the
/// number of bytes read.
fn fill_frame<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Writes a `/bin/sh` script standing in for ffprobe or ffmpeg.
#[cfg(all(test, unix))]
pub fn write_stub(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Stub toolchain whose ffprobe reports a 4x2 yuv420p stream (24-byte rgb24
/// frames) and whose ffmpeg runs `decoder_body`.
#[cfg(all(test, unix))]
pub fn stub_toolchain(dir: &Path, decoder_body: &str) -> Toolchain {
    let probe = r#"printf '%s' '{"streams":[{"width":4,"height":2,"pix_fmt":"yuv420p","r_frame_rate":"10/1","nb_frames":"2"}]}'"#;
    Toolchain {
        ffprobe: write_stub(dir, "ffprobe", probe),
        ffmpeg: write_stub(dir, "ffmpeg", decoder_body),
    }
}

/// Encodes `frames` frames of ffmpeg's test pattern into a lossless clip.
#[cfg(test)]
pub fn synthesize_clip(path: &Path, frames: u32, pattern: &str) -> Result<()> {
    let status = Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-y"])
        .args(["-f", "lavfi", "-i", format!("{}=size=64x48:rate=10", pattern).as_str()])
        .args(["-frames:v", frames.to_string().as_str(), "-pix_fmt", "yuv420p", "-c:v", "ffv1"])
        .arg(path)
        .status()?;
    if !status.success() {
        return Err(VidsimError::Command(format!(
            "ffmpeg failed to synthesize {}",
            path.display()
        )));
    }
    Ok(())
}
