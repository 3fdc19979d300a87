//! SVG charts for the aggregate report.

use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::FontTransform;
use std::path::Path;

use crate::analysis::{ComplexityScatter, CorrelationMatrix, ElapsedDistribution, FailureRate, ValidElapsed};
use crate::error::ArtifactError;
use crate::grid::AlgorithmType;

const FONT: &str = "sans-serif";
const CHART_SIZE: (u32, u32) = (800, 500);
const HEATMAP_SIZE: (u32, u32) = (1000, 800);

fn render_err<E: std::fmt::Display>(e: E) -> ArtifactError {
    ArtifactError::Render(e.to_string())
}

fn algorithm_color(algorithm: AlgorithmType) -> RGBColor {
    match algorithm {
        AlgorithmType::Genetic => RGBColor(31, 119, 180),
        AlgorithmType::Tournament => RGBColor(255, 127, 14),
    }
}

fn category_range(count: usize) -> std::ops::Range<f64> {
    -0.5..(count.max(1) as f64 - 0.5)
}

/// Axis label for categorical positions 0, 1, ...; blank between them.
fn category_label(names: &[String], x: f64) -> String {
    let i = x.round();
    if (x - i).abs() > 1e-6 || i < 0.0 {
        return String::new();
    }
    names.get(i as usize).cloned().unwrap_or_default()
}

fn centered(size: i32, v: VPos) -> TextStyle<'static> {
    TextStyle::from((FONT, size).into_font()).pos(Pos::new(HPos::Center, v))
}

pub fn elapsed_time_boxplot(groups: &[ElapsedDistribution], path: &Path) -> Result<(), ArtifactError> {
    let boxes: Vec<(f64, AlgorithmType, &crate::stats::BoxStats)> = groups
        .iter()
        .enumerate()
        .filter_map(|(i, g)| g.stats.as_ref().map(|s| (i as f64, g.algorithm, s)))
        .collect();
    if boxes.is_empty() {
        return Err(ArtifactError::NoData("no elapsed times recorded"));
    }
    let y_max = boxes.iter().map(|b| b.2.max).fold(f64::MIN, f64::max);
    let y_min = boxes.iter().map(|b| b.2.min).fold(0.0, f64::min);
    let names: Vec<String> = groups.iter().map(|g| g.algorithm.to_string()).collect();

    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Elapsed Time Comparison: Genetic Algorithm vs Tournament Solver", (FONT, 20))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(category_range(groups.len()), y_min..(y_max * 1.05).max(y_min + 1e-9))
        .map_err(render_err)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(groups.len() + 1)
        .x_label_formatter(&|x| category_label(&names, *x))
        .x_desc("Algorithm Type")
        .y_desc("Elapsed Time (Seconds)")
        .draw()
        .map_err(render_err)?;

    const HALF: f64 = 0.3;
    chart
        .draw_series(boxes.iter().map(|(x, algorithm, s)| {
            Rectangle::new(
                [(x - HALF, s.q1), (x + HALF, s.q3)],
                algorithm_color(*algorithm).mix(0.7).filled(),
            )
        }))
        .map_err(render_err)?;

    let mut lines = Vec::new();
    for (x, _, s) in &boxes {
        let (x, cap) = (*x, HALF / 2.0);
        lines.push(vec![(x - HALF, s.median), (x + HALF, s.median)]);
        lines.push(vec![(x, s.q3), (x, s.whisker_high)]);
        lines.push(vec![(x, s.q1), (x, s.whisker_low)]);
        lines.push(vec![(x - cap, s.whisker_high), (x + cap, s.whisker_high)]);
        lines.push(vec![(x - cap, s.whisker_low), (x + cap, s.whisker_low)]);
        lines.push(vec![(x - HALF, s.q1), (x + HALF, s.q1), (x + HALF, s.q3), (x - HALF, s.q3), (x - HALF, s.q1)]);
    }
    chart
        .draw_series(lines.into_iter().map(|points| PathElement::new(points, BLACK.stroke_width(1))))
        .map_err(render_err)?;

    chart
        .draw_series(boxes.iter().flat_map(|(x, _, s)| {
            s.outliers.iter().map(move |v| Circle::new((*x, *v), 3, BLACK.stroke_width(1)))
        }))
        .map_err(render_err)?;

    root.present().map_err(render_err)?;
    Ok(())
}

pub fn complexity_scatter(scatter: &ComplexityScatter, path: &Path) -> Result<(), ArtifactError> {
    let ((n_min, n_max), (c_min, c_max)) = scatter
        .bounds()
        .ok_or(ArtifactError::NoData("no positive complexity values"))?;

    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Time Complexity Comparison: Genetic Algorithm vs Tournament Solver", (FONT, 20))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(80)
        .build_cartesian_2d(
            (n_min as f64 - 1.0)..(n_max as f64 + 1.0),
            (c_min / 2.0..c_max * 2.0).log_scale(),
        )
        .map_err(render_err)?;

    chart
        .configure_mesh()
        .x_desc("Problem Size (N)")
        .y_desc("Time Complexity (log scale)")
        .y_label_formatter(&|y| format!("{:.0e}", y))
        .draw()
        .map_err(render_err)?;

    for algorithm in AlgorithmType::ALL {
        let color = algorithm_color(algorithm);
        chart
            .draw_series(
                scatter
                    .points
                    .iter()
                    .filter(|p| p.algorithm == algorithm)
                    .map(|p| Circle::new((p.n_queens as f64, p.complexity), 4, color.mix(0.7).filled())),
            )
            .map_err(render_err)?
            .label(algorithm.label())
            .legend(move |(x, y)| Circle::new((x, y), 4, color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(render_err)?;

    root.present().map_err(render_err)?;
    Ok(())
}

pub fn failure_rate_bars(rates: &[FailureRate], path: &Path) -> Result<(), ArtifactError> {
    if rates.is_empty() {
        return Err(ArtifactError::NoData("no algorithm groups"));
    }
    let names: Vec<String> = rates.iter().map(|r| r.algorithm.to_string()).collect();

    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Failure Rate Comparison: Genetic Algorithm vs Tournament Solver", (FONT, 20))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(category_range(rates.len()), 0f64..1f64)
        .map_err(render_err)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(rates.len() + 1)
        .x_label_formatter(&|x| category_label(&names, *x))
        .y_label_formatter(&|y| format!("{:.0}%", y * 100.0))
        .x_desc("Algorithm Type")
        .y_desc("Failure Rate (%)")
        .draw()
        .map_err(render_err)?;

    chart
        .draw_series(rates.iter().enumerate().filter_map(|(i, r)| {
            let x = i as f64;
            r.rate.map(|rate| {
                Rectangle::new([(x - 0.35, 0.0), (x + 0.35, rate)], algorithm_color(r.algorithm).filled())
            })
        }))
        .map_err(render_err)?;

    // Groups without runs get a marker instead of a zero-height bar.
    chart
        .draw_series(rates.iter().enumerate().filter(|(_, r)| r.rate.is_none()).map(|(i, _)| {
            Text::new("no runs".to_string(), (i as f64, 0.02), centered(14, VPos::Bottom))
        }))
        .map_err(render_err)?;

    root.present().map_err(render_err)?;
    Ok(())
}

/// Blue through light grey to red, for correlations in [-1, 1].
fn heat_color(value: f64) -> RGBColor {
    const COLD: (f64, f64, f64) = (59.0, 76.0, 192.0);
    const NEUTRAL: (f64, f64, f64) = (221.0, 221.0, 221.0);
    const HOT: (f64, f64, f64) = (180.0, 4.0, 38.0);

    let t = value.clamp(-1.0, 1.0);
    let (from, to, w) = if t < 0.0 { (COLD, NEUTRAL, t + 1.0) } else { (NEUTRAL, HOT, t) };
    let lerp = |a: f64, b: f64| (a + (b - a) * w).round() as u8;
    RGBColor(lerp(from.0, to.0), lerp(from.1, to.1), lerp(from.2, to.2))
}

pub fn correlation_heatmap(matrix: &CorrelationMatrix, path: &Path) -> Result<(), ArtifactError> {
    let n = matrix.fields.len();
    if n == 0 {
        return Err(ArtifactError::NoData("no numeric columns"));
    }
    let names: Vec<String> = matrix.fields.iter().map(|f| f.header().to_string()).collect();
    // Row 0 is drawn at the top.
    let row_names: Vec<String> = names.iter().rev().cloned().collect();

    let root = SVGBackend::new(path, HEATMAP_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Correlation Heatmap of Performance Parameters", (FONT, 20))
        .margin(15)
        .x_label_area_size(200)
        .y_label_area_size(230)
        .build_cartesian_2d(category_range(n), category_range(n))
        .map_err(render_err)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(n + 1)
        .y_labels(n + 1)
        .x_label_formatter(&|x| category_label(&names, *x))
        .y_label_formatter(&|y| category_label(&row_names, *y))
        .x_label_style((FONT, 12).into_font().transform(FontTransform::Rotate90))
        .y_label_style((FONT, 12))
        .draw()
        .map_err(render_err)?;

    let cells: Vec<(f64, f64, Option<f64>)> = (0..n)
        .flat_map(|i| (0..n).map(move |j| (j as f64, (n - 1 - i) as f64, i, j)))
        .map(|(x, y, i, j)| (x, y, matrix.values[i][j]))
        .collect();

    chart
        .draw_series(cells.iter().map(|&(x, y, v)| {
            let color = v.map(heat_color).unwrap_or(WHITE);
            Rectangle::new([(x - 0.5, y - 0.5), (x + 0.5, y + 0.5)], color.filled())
        }))
        .map_err(render_err)?;

    chart
        .draw_series(cells.iter().map(|&(x, y, v)| {
            let label = v.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "n/a".to_string());
            Text::new(label, (x, y), centered(11, VPos::Center))
        }))
        .map_err(render_err)?;

    root.present().map_err(render_err)?;
    Ok(())
}

pub fn valid_elapsed_bars(groups: &[ValidElapsed], path: &Path) -> Result<(), ArtifactError> {
    let y_max = groups
        .iter()
        .filter_map(|g| g.mean_elapsed)
        .fold(f64::NAN, f64::max);
    if !y_max.is_finite() {
        return Err(ArtifactError::NoData("no valid runs with an elapsed time"));
    }
    let names: Vec<String> = groups.iter().map(|g| g.algorithm.to_string()).collect();

    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Average Elapsed Time (Valid Solutions Only)", (FONT, 20))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(category_range(groups.len()), 0f64..(y_max * 1.25).max(1e-9))
        .map_err(render_err)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(groups.len() + 1)
        .x_label_formatter(&|x| category_label(&names, *x))
        .x_desc("Algorithm Type")
        .y_desc("Average Elapsed Time (Seconds)")
        .draw()
        .map_err(render_err)?;

    chart
        .draw_series(groups.iter().enumerate().filter_map(|(i, g)| {
            let x = i as f64;
            g.mean_elapsed.map(|mean| {
                Rectangle::new([(x - 0.35, 0.0), (x + 0.35, mean)], algorithm_color(g.algorithm).filled())
            })
        }))
        .map_err(render_err)?;

    chart
        .draw_series(groups.iter().enumerate().map(|(i, g)| {
            Text::new(
                failure_rate_caption(g.failure_rate),
                (i as f64, g.mean_elapsed.unwrap_or(0.0)),
                centered(13, VPos::Bottom),
            )
        }))
        .map_err(render_err)?;

    root.present().map_err(render_err)?;
    Ok(())
}

pub fn failure_rate_caption(rate: Option<f64>) -> String {
    match rate {
        Some(rate) => format!("Failure Rate: {:.1}%", rate * 100.0),
        None => "Failure Rate: n/a".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_labels_only_on_integer_ticks() {
        let names = vec!["Genetic".to_string(), "Tournament".to_string()];
        assert_eq!(category_label(&names, 0.0), "Genetic");
        assert_eq!(category_label(&names, 1.0000000001), "Tournament");
        assert_eq!(category_label(&names, 0.5), "");
        assert_eq!(category_label(&names, -0.5), "");
        assert_eq!(category_label(&names, 2.0), "");
    }

    #[test]
    fn heat_colors_span_cold_to_hot() {
        assert_eq!(heat_color(-1.0), RGBColor(59, 76, 192));
        assert_eq!(heat_color(0.0), RGBColor(221, 221, 221));
        assert_eq!(heat_color(1.0), RGBColor(180, 4, 38));
        assert_eq!(heat_color(7.0), heat_color(1.0));
    }

    #[test]
    fn caption_formats_percent_with_one_decimal() {
        assert_eq!(failure_rate_caption(Some(1.0 / 3.0)), "Failure Rate: 33.3%");
        assert_eq!(failure_rate_caption(None), "Failure Rate: n/a");
    }

    #[test]
    fn empty_inputs_are_reported_not_drawn() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.svg");
        let err = complexity_scatter(&ComplexityScatter::default(), &path).unwrap_err();
        assert!(matches!(err, ArtifactError::NoData(_)));
        let matrix = CorrelationMatrix {
            fields: vec![],
            values: vec![],
        };
        assert!(matches!(correlation_heatmap(&matrix, &path), Err(ArtifactError::NoData(_))));
        assert!(!path.exists());
    }
}
