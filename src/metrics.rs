// src/metrics.rs

use crate::error::{Result, VidsimError};
use crate::frame::Frame;
use image_compare::Algorithm;
use log::debug;
use quantiles::ckms::CKMS;
use serde::{Deserialize, Serialize};

/// Full-image structural similarity of two frames, computed over all three
/// colour channels. Frames that are not RGB are widened to RGB first.
pub fn structural_similarity(first: &Frame, second: &Frame) -> Result<f64> {
    if (first.width(), first.height()) != (second.width(), second.height()) {
        return Err(VidsimError::Metric(format!(
            "frame dimensions differ: {}x{} vs {}x{}",
            first.width(),
            first.height(),
            second.width(),
            second.height()
        )));
    }

    let first = first.to_rgb_image()?;
    let second = second.to_rgb_image()?;
    let similarity =
        image_compare::rgb_similarity_structure(&Algorithm::MSSIMSimple, &first, &second)
            .map_err(|e| VidsimError::Metric(format!("SSIM computation failed: {:?}", e)))?;
    Ok(similarity.score)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MetricStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub harmonic_mean: Option<f64>,
    pub p1: f64,
    pub p25: f64,
    pub p75: f64,
}

impl MetricStats {
    /// Pools per-frame scores. Returns `None` for an empty slice.
    pub fn from_scores(scores: &[f64]) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }
        let count = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / count;

        let mut sorted = scores.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        // CKMS gives the rank; the value is looked up in the sorted scores.
        let mut quantiles_data = CKMS::<f64>::new(0.001);
        for score in &sorted {
            quantiles_data.insert(*score);
        }
        let percentile = |quantile: f64| -> f64 {
            quantiles_data
                .query(quantile)
                .map(|(rank, _)| {
                    let index = rank.saturating_sub(1).min(sorted.len() - 1);
                    sorted[index]
                })
                .unwrap_or(f64::NAN)
        };

        let harmonic_mean = if sorted.iter().all(|&s| s > 0.0) {
            Some(count / scores.iter().map(|s| 1.0 / s).sum::<f64>())
        } else {
            None
        };

        let stats = MetricStats {
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean,
            harmonic_mean,
            p1: percentile(0.01),
            p25: percentile(0.25),
            p75: percentile(0.75),
        };
        debug!("Pooled {} scores: {:?}", scores.len(), stats);
        Some(stats)
    }
}
