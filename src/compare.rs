// src/compare.rs

use crate::error::Result;
use crate::ffmpeg::{Toolchain, VideoInfo, VideoStream};
use crate::frame::FrameSource;
use crate::metrics;
use crate::output::{self, ComparisonResult, ErrorKind};
use log::{debug, info, warn};
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct CompareOptions {
    pub tools: Toolchain,
    pub decoder_threads: usize,
}

/// What a comparison emitted, plus the per-frame scores behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub result: ComparisonResult,
    /// Similarity of frame i of the first video to frame i of the second.
    pub frame_scores: Vec<f64>,
    /// Frame pairs where at least one frame was not 3-channel.
    pub non_rgb_frames: u64,
}

/// Compares two video files frame by frame and writes the outcome to `out`.
///
/// Every outcome the user should see is a JSON line on `out`; an `Err` is
/// reserved for faults the comparison cannot report that way (decoder
/// missing, undecodable frame, frames of different size).
pub fn compare<W: Write>(
    path_1: &Path,
    path_2: &Path,
    options: &CompareOptions,
    out: &mut W,
) -> Result<Comparison> {
    // Best-effort guard: the files may still vanish before the decoder opens them.
    if !path_1.exists() || !path_2.exists() {
        warn!(
            "Missing input: {} exists={}, {} exists={}",
            path_1.display(),
            path_1.exists(),
            path_2.display(),
            path_2.exists()
        );
        return finish(out, ComparisonResult::Error(ErrorKind::FileNotFound), Vec::new(), 0);
    }

    let first = VideoStream::open(&options.tools, path_1, options.decoder_threads)?;
    let second = VideoStream::open(&options.tools, path_2, options.decoder_threads)?;
    if let (Some(info_1), Some(info_2)) = (first.info(), second.info()) {
        log_pairing(info_1, info_2);
    }
    compare_streams(first, second, out)
}

fn log_pairing(first: &VideoInfo, second: &VideoInfo) {
    debug!(
        "Pairing {} ({}x{}, {}) with {} ({}x{}, {})",
        first.path.display(),
        first.width,
        first.height,
        first.pix_fmt,
        second.path.display(),
        second.width,
        second.height,
        second.pix_fmt
    );
    if (first.width, first.height) != (second.width, second.height) {
        warn!("Frame sizes differ; frames cannot be scored against each other");
    }
    if let (Some(count_1), Some(count_2)) = (first.frame_count, second.frame_count) {
        if count_1 != count_2 {
            warn!("Containers report {} and {} frames", count_1, count_2);
        }
    }
    if (first.fps - second.fps).abs() > 0.01 {
        warn!(
            "Frame rate mismatch ({:.3} vs {:.3}); frames are still paired by index",
            first.fps, second.fps
        );
    }
}

/// Reads both sources in lockstep and scores each frame pair.
///
/// Both sources are owned here and dropped on every return path.
pub fn compare_streams<A, B, W>(mut first: A, mut second: B, out: &mut W) -> Result<Comparison>
where
    A: FrameSource,
    B: FrameSource,
    W: Write,
{
    let mut frame_count: u64 = 0;
    let mut total_score = 0.0;
    let mut frame_scores = Vec::new();
    let mut non_rgb_frames = 0;

    while first.is_opened() && second.is_opened() {
        let frame_1 = first.read()?;
        let frame_2 = second.read()?;

        let (frame_1, frame_2) = match (frame_1, frame_2) {
            (Some(frame_1), Some(frame_2)) => (frame_1, frame_2),
            (None, None) => {
                debug!("Both videos ended after {} frames", frame_count);
                break;
            }
            (first_frame, _) => {
                warn!(
                    "{} video ended first, after {} frames",
                    if first_frame.is_none() { "First" } else { "Second" },
                    frame_count
                );
                let result = ComparisonResult::Error(ErrorKind::UnequalLength);
                return finish(out, result, frame_scores, non_rgb_frames);
            }
        };

        // Reported but not fatal: the pair is still scored and averaged.
        if !frame_1.is_rgb() || !frame_2.is_rgb() {
            warn!(
                "Frame {} is not RGB: shapes {:?} and {:?}",
                frame_count,
                frame_1.shape(),
                frame_2.shape()
            );
            non_rgb_frames += 1;
            output::emit(out, &ComparisonResult::Error(ErrorKind::NotRgb))?;
        }

        let score = metrics::structural_similarity(&frame_1, &frame_2)?;
        debug!("Frame {}: ssim={:.6}", frame_count, score);
        frame_count += 1;
        total_score += score;
        frame_scores.push(score);
    }

    let result = if frame_count == 0 {
        ComparisonResult::Error(ErrorKind::CannotOpen)
    } else {
        ComparisonResult::AvgSim(total_score / frame_count as f64)
    };
    finish(out, result, frame_scores, non_rgb_frames)
}

fn finish<W: Write>(
    out: &mut W,
    result: ComparisonResult,
    frame_scores: Vec<f64>,
    non_rgb_frames: u64,
) -> Result<Comparison> {
    match result {
        ComparisonResult::AvgSim(avg) => {
            info!("Compared {} frames, average similarity {:.6}", frame_scores.len(), avg)
        }
        ComparisonResult::Error(kind) => info!("Comparison ended: {}", kind),
    }
    output::emit(out, &result)?;
    Ok(Comparison {
        result,
        frame_scores,
        non_rgb_frames,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VidsimError;
    use crate::ffmpeg::synthesize_clip;
    use crate::frame::Frame;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    struct MemorySource {
        opened: bool,
        frames: VecDeque<Frame>,
        released: Rc<Cell<bool>>,
    }

    impl MemorySource {
        fn new(frames: Vec<Frame>) -> (Self, Rc<Cell<bool>>) {
            let released = Rc::new(Cell::new(false));
            let source = MemorySource {
                opened: true,
                frames: frames.into(),
                released: Rc::clone(&released),
            };
            (source, released)
        }

        fn closed() -> Self {
            let (mut source, _) = Self::new(Vec::new());
            source.opened = false;
            source
        }
    }

    impl FrameSource for MemorySource {
        fn is_opened(&self) -> bool {
            self.opened
        }

        fn read(&mut self) -> Result<Option<Frame>> {
            Ok(self.frames.pop_front())
        }
    }

    impl Drop for MemorySource {
        fn drop(&mut self) {
            self.released.set(true);
        }
    }

    fn frame(seed: u8) -> Frame {
        let data = (0..16 * 16 * 3)
            .map(|i: u32| ((i * (seed as u32 + 1) * 31) % 251) as u8)
            .collect();
        Frame::from_raw(16, 16, 3, data).unwrap()
    }

    fn clip(len: u8) -> Vec<Frame> {
        (0..len).map(frame).collect()
    }

    fn lines(out: &[u8]) -> Vec<String> {
        String::from_utf8_lossy(out).lines().map(str::to_string).collect()
    }

    #[test]
    fn identical_videos_average_to_one() {
        let (a, _) = MemorySource::new(clip(4));
        let (b, _) = MemorySource::new(clip(4));
        let mut out = Vec::new();
        let comparison = compare_streams(a, b, &mut out).unwrap();
        let avg = comparison.result.avg_sim().unwrap();
        assert!(avg >= 0.999, "avg was {}", avg);
        assert_eq!(comparison.frame_scores.len(), 4);
        assert_eq!(lines(&out).len(), 1);
        assert!(lines(&out)[0].starts_with(r#"{"avg_sim": "#));
    }

    #[test]
    fn average_is_mean_of_pairwise_scores() {
        let first = clip(5);
        let second: Vec<Frame> = (0..5).map(|i| frame(4 - i)).collect();
        let expected: f64 = first
            .iter()
            .zip(&second)
            .map(|(a, b)| metrics::structural_similarity(a, b).unwrap())
            .sum::<f64>()
            / 5.0;

        let (a, _) = MemorySource::new(first);
        let (b, _) = MemorySource::new(second);
        let comparison = compare_streams(a, b, &mut Vec::new()).unwrap();
        let avg = comparison.result.avg_sim().unwrap();
        assert!((avg - expected).abs() < 1e-12);
        assert!(avg < 1.0);
    }

    #[test]
    fn unequal_lengths_stop_and_release_both_sources() {
        let (a, a_released) = MemorySource::new(clip(10));
        let (b, b_released) = MemorySource::new(clip(12));
        let mut out = Vec::new();
        let comparison = compare_streams(a, b, &mut out).unwrap();
        assert_eq!(comparison.result, ComparisonResult::Error(ErrorKind::UnequalLength));
        assert_eq!(lines(&out), [r#"{"error": "videos does not have equal length"}"#]);
        assert_eq!(comparison.frame_scores.len(), 10);
        assert!(a_released.get() && b_released.get());
    }

    #[test]
    fn second_video_shorter_is_also_unequal() {
        let (a, _) = MemorySource::new(clip(3));
        let (b, _) = MemorySource::new(clip(2));
        let comparison = compare_streams(a, b, &mut Vec::new()).unwrap();
        assert_eq!(comparison.result, ComparisonResult::Error(ErrorKind::UnequalLength));
    }

    #[test]
    fn zero_frames_cannot_be_opened() {
        let (a, _) = MemorySource::new(Vec::new());
        let (b, _) = MemorySource::new(Vec::new());
        let mut out = Vec::new();
        let comparison = compare_streams(a, b, &mut out).unwrap();
        assert_eq!(comparison.result, ComparisonResult::Error(ErrorKind::CannotOpen));
        assert_eq!(lines(&out), [r#"{"error": "video file cannot be opened"}"#]);
    }

    #[test]
    fn closed_source_cannot_be_opened() {
        let (b, b_released) = MemorySource::new(clip(3));
        let mut out = Vec::new();
        let comparison = compare_streams(MemorySource::closed(), b, &mut out).unwrap();
        assert_eq!(comparison.result, ComparisonResult::Error(ErrorKind::CannotOpen));
        assert!(b_released.get());
    }

    #[test]
    fn non_rgb_frames_are_reported_and_still_averaged() {
        let gray = Frame::from_raw(16, 16, 1, vec![128; 256]).unwrap();
        let (a, _) = MemorySource::new(vec![gray.clone(), frame(1), gray]);
        let (b, _) = MemorySource::new(vec![
            Frame::from_raw(16, 16, 1, vec![128; 256]).unwrap(),
            frame(1),
            Frame::from_raw(16, 16, 3, vec![128; 768]).unwrap(),
        ]);
        let mut out = Vec::new();
        let comparison = compare_streams(a, b, &mut out).unwrap();
        assert_eq!(comparison.non_rgb_frames, 2);
        assert_eq!(comparison.frame_scores.len(), 3);
        let out = lines(&out);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], r#"{"error": "videos are not rgb"}"#);
        assert_eq!(out[1], r#"{"error": "videos are not rgb"}"#);
        assert!(out[2].starts_with(r#"{"avg_sim": "#));
    }

    #[test]
    fn mismatched_frame_sizes_are_fatal() {
        let small = Frame::from_raw(8, 8, 3, vec![0; 192]).unwrap();
        let (a, a_released) = MemorySource::new(vec![small]);
        let (b, b_released) = MemorySource::new(clip(1));
        let mut out = Vec::new();
        let err = compare_streams(a, b, &mut out).unwrap_err();
        assert!(matches!(err, VidsimError::Metric(_)));
        assert!(out.is_empty());
        assert!(a_released.get() && b_released.get());
    }

    #[test]
    fn missing_file_is_reported_before_decoding() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.mkv");
        std::fs::write(&present, b"").unwrap();
        let missing = dir.path().join("missing.mkv");
        let options = CompareOptions {
            tools: Toolchain::default(),
            decoder_threads: 1,
        };

        for (p1, p2) in [(&present, &missing), (&missing, &present)] {
            let mut out = Vec::new();
            let comparison = compare(p1, p2, &options, &mut out).unwrap();
            assert_eq!(comparison.result, ComparisonResult::Error(ErrorKind::FileNotFound));
            assert_eq!(lines(&out), [r#"{"error": "no file found in the given path"}"#]);
        }
    }

    #[test]
    #[ignore = "needs ffmpeg"]
    fn decoded_videos_compare_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let ten = dir.path().join("ten.mkv");
        let twelve = dir.path().join("twelve.mkv");
        let other = dir.path().join("other.mkv");
        let empty = dir.path().join("empty.mkv");
        synthesize_clip(&ten, 10, "testsrc").unwrap();
        synthesize_clip(&twelve, 12, "testsrc").unwrap();
        synthesize_clip(&other, 10, "mandelbrot").unwrap();
        std::fs::write(&empty, b"").unwrap();
        let options = CompareOptions {
            tools: Toolchain::default(),
            decoder_threads: 1,
        };

        let same = compare(&ten, &ten, &options, &mut Vec::new()).unwrap();
        assert!(same.result.avg_sim().unwrap() >= 0.999);
        assert_eq!(same.frame_scores.len(), 10);

        let unequal = compare(&ten, &twelve, &options, &mut Vec::new()).unwrap();
        assert_eq!(unequal.result, ComparisonResult::Error(ErrorKind::UnequalLength));

        let different = compare(&ten, &other, &options, &mut Vec::new()).unwrap();
        assert!(different.result.avg_sim().unwrap() < 0.99);

        let mut out = Vec::new();
        let unopenable = compare(&empty, &empty, &options, &mut out).unwrap();
        assert_eq!(unopenable.result, ComparisonResult::Error(ErrorKind::CannotOpen));
        assert_eq!(lines(&out), [r#"{"error": "video file cannot be opened"}"#]);
    }

    #[cfg(unix)]
    fn stub_options(dir: &Path, decoder_body: &str) -> CompareOptions {
        CompareOptions {
            tools: crate::ffmpeg::stub_toolchain(dir, decoder_body),
            decoder_threads: 1,
        }
    }

    #[cfg(unix)]
    #[test]
    fn decoder_streams_of_different_length_are_unequal() {
        let dir = tempfile::tempdir().unwrap();
        // 24 bytes per frame: ten.mp4 decodes to 10 frames, anything else to 12.
        let options = stub_options(
            dir.path(),
            r#"case "$*" in
  *ten.mp4*) head -c 240 /dev/zero ;;
  *) head -c 288 /dev/zero ;;
esac"#,
        );
        let ten = dir.path().join("ten.mp4");
        let twelve = dir.path().join("twelve.mp4");
        std::fs::write(&ten, b"stub").unwrap();
        std::fs::write(&twelve, b"stub").unwrap();

        let mut out = Vec::new();
        let unequal = compare(&ten, &twelve, &options, &mut out).unwrap();
        assert_eq!(lines(&out), [r#"{"error": "videos does not have equal length"}"#]);
        assert_eq!(unequal.frame_scores.len(), 10);

        let same = compare(&ten, &ten, &options, &mut Vec::new()).unwrap();
        assert!(same.result.avg_sim().unwrap() >= 0.999);
        assert_eq!(same.frame_scores.len(), 10);
    }

    #[cfg(unix)]
    #[test]
    fn decoder_failure_is_fatal_instead_of_json() {
        let dir = tempfile::tempdir().unwrap();
        let options = stub_options(dir.path(), "echo 'Unrecognized option' >&2\nexit 1");
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"stub").unwrap();

        let mut out = Vec::new();
        let err = compare(&video, &video, &options, &mut out).unwrap_err();
        assert!(matches!(err, VidsimError::Command(_)));
        assert_eq!(err.exit_status(), 1);
        assert!(out.is_empty());
    }
}
