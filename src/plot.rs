// src/plot.rs

use crate::error::{Result, VidsimError};
use crate::metrics::MetricStats;
use log::{error, info};
use plotters::prelude::*;
use plotters::style::full_palette::{GREEN, ORANGE};
use std::path::Path;

/// Draws per-frame similarity scores with mean and percentile reference lines.
pub fn generate_plot(frame_scores: &[f64], output_path: &Path) -> Result<()> {
    info!("Generating SSIM plot: {}", output_path.display());

    let Some(stats) = MetricStats::from_scores(frame_scores) else {
        error!("No SSIM scores found to plot for {}", output_path.display());
        return Err(VidsimError::Plot("No SSIM scores to plot".to_string()));
    };

    let count = frame_scores.len();
    let x_max = count.saturating_sub(1).max(1) as u32;
    // SSIM lives in [-1, 1]; zoom in on the populated band.
    let y_min = ((stats.p1 - 0.05).max(-1.0) * 100.0).floor() / 100.0;
    let y_max = 1.005;

    let root = BitMapBackend::new(output_path, (1280, 720)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| VidsimError::Plot(format!("Failed to fill plot background: {}", e)))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("SSIM Scores ({} Frames)", count), ("sans-serif", 24).into_font())
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(0..x_max, y_min..y_max)
        .map_err(|e| VidsimError::Plot(format!("Failed to build chart: {}", e)))?;

    let y_label_format = |y: &f64| format!("{:.3}", y);
    chart
        .configure_mesh()
        .x_desc("Frame Number")
        .y_desc("SSIM")
        .y_label_formatter(&y_label_format)
        .axis_desc_style(("sans-serif", 16))
        .label_style(("sans-serif", 14))
        .y_max_light_lines(5)
        .y_labels(10)
        .draw()
        .map_err(|e| VidsimError::Plot(format!("Failed to draw mesh: {:?}", e)))?;

    chart
        .draw_series(LineSeries::new(
            frame_scores.iter().enumerate().map(|(i, s)| (i as u32, *s)),
            BLUE.mix(0.8).stroke_width(1),
        ))
        .map_err(|e| VidsimError::Plot(format!("Failed to draw main series: {:?}", e)))?
        .label("SSIM Scores")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE.filled()));

    let stat_lines = [
        (format!("Mean: {:.4}", stats.mean), stats.mean, BLACK),
        (format!("1%:   {:.4}", stats.p1), stats.p1, RED),
        (format!("25%: {:.4}", stats.p25), stats.p25, ORANGE),
        (format!("75%: {:.4}", stats.p75), stats.p75, GREEN),
    ];
    for (label, value, color) in stat_lines {
        chart
            .draw_series(LineSeries::new(
                vec![(0, value), (x_max, value)],
                stat_line_style(color),
            ))
            .map_err(|e| VidsimError::Plot(format!("Failed to draw {} line: {:?}", label, e)))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], stat_line_style(color)));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerMiddle)
        .margin(10)
        .label_font(("sans-serif", 12))
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(|e| VidsimError::Plot(format!("Failed to draw legend: {:?}", e)))?;

    root.present()
        .map_err(|e| VidsimError::Plot(format!("Failed to save plot: {:?}", e)))?;
    info!("Successfully generated SSIM plot: {}", output_path.display());

    Ok(())
}

fn stat_line_style(color: RGBColor) -> ShapeStyle {
    ShapeStyle {
        color: color.to_rgba(),
        filled: false,
        stroke_width: 1,
    }
}
