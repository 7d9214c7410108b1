// src/report.rs

use crate::compare::Comparison;
use crate::error::Result;
use crate::metrics::MetricStats;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FrameScore {
    #[serde(rename = "frameNum")]
    pub frame_num: u64,
    pub ssim: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PooledMetrics {
    pub ssim: MetricStats,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SimilarityReport {
    pub reference: String,
    pub distorted: String,
    pub avg_sim: f64,
    pub non_rgb_frames: u64,
    pub pooled_metrics: PooledMetrics,
    pub frames: Vec<FrameScore>,
}

impl SimilarityReport {
    /// Builds a report for a comparison that produced an average; `None` otherwise.
    pub fn new(reference: &Path, distorted: &Path, comparison: &Comparison) -> Option<Self> {
        let avg_sim = comparison.result.avg_sim()?;
        let ssim = MetricStats::from_scores(&comparison.frame_scores)?;
        let frames = comparison
            .frame_scores
            .iter()
            .enumerate()
            .map(|(i, &ssim)| FrameScore {
                frame_num: i as u64,
                ssim,
            })
            .collect();
        Some(SimilarityReport {
            reference: reference.to_string_lossy().into_owned(),
            distorted: distorted.to_string_lossy().into_owned(),
            avg_sim,
            non_rgb_frames: comparison.non_rgb_frames,
            pooled_metrics: PooledMetrics { ssim },
            frames,
        })
    }
}

/// Writes the per-frame report as pretty JSON. Comparisons that ended in an
/// error have nothing to report and write no file.
pub fn write_report(
    reference: &Path,
    distorted: &Path,
    comparison: &Comparison,
    report_path: &Path,
) -> Result<bool> {
    let Some(report) = SimilarityReport::new(reference, distorted, comparison) else {
        warn!("No similarity scores to report; skipping {}", report_path.display());
        return Ok(false);
    };
    let content = serde_json::to_string_pretty(&report)?;
    fs::write(report_path, content)?;
    info!(
        "Saved report for {} frames to {}",
        report.frames.len(),
        report_path.display()
    );
    Ok(true)
}
