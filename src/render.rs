//! Four stacked panels of the order book metrics against the raw timestamp,
//! written to png.

use crate::error::{MetricsError, Result};
use crate::{
    format_timestamp_ist, min_and_max, MetricsTable, COL_MID_PRICE, COL_OFI_DEPTH, COL_OFI_TOP,
    COL_SPREAD, COL_TIMESTAMP_RAW,
};
use log::debug;
use plotters::coord::ranged1d::Ranged;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::ops::Range;
use std::path::Path;

/// figure size in inches, the pixel size follows from the dpi
pub const FIGSIZE: (f64, f64) = (12., 10.);
pub const MIDPRICE_YLIM: (f64, f64) = (420., 500.);
/// fraction of the data span added on each side of an auto range
pub const AXIS_MARGIN: f64 = 0.05;
pub const GRID_ALPHA: f64 = 0.6;
pub const GRID_COLOR: RGBColor = RGBColor(176, 176, 176);
pub const X_LABEL: &str = "Raw Timestamp (nanoseconds)";

const X_TICKS: usize = 8;
const Y_TICKS: usize = 5;
const DASHES_PER_LINE: usize = 80;
const DASH_DUTY: f64 = 0.6;

/// How the x tick labels are written, the x data is always the raw timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum XLabels {
    RawNanos,
    IstClock,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FigureStyle {
    pub dpi: u32,
    pub x_labels: XLabels,
}

impl FigureStyle {
    pub fn new(dpi: u32, x_labels: XLabels) -> FigureStyle {
        FigureStyle { dpi, x_labels }
    }

    pub fn size_px(&self) -> (u32, u32) {
        let dpi = self.dpi as f64;
        ((FIGSIZE.0 * dpi).round() as u32, (FIGSIZE.1 * dpi).round() as u32)
    }

    /// typographic points to pixels
    fn pt(&self, points: f64) -> u32 {
        ((points * self.dpi as f64 / 72.).round() as u32).max(1)
    }
}

/// One panel of the figure: which column against the raw timestamp, and how it looks.
#[derive(Debug, Clone, Copy)]
pub struct PanelSpec {
    pub column: &'static str,
    pub title: &'static str,
    pub y_label: &'static str,
    pub x_label: Option<&'static str>,
    pub y_limits: Option<(f64, f64)>,
    pub color: RGBColor,
}

/// top to bottom
pub static PANELS: [PanelSpec; 4] = [
    PanelSpec {
        column: COL_MID_PRICE,
        title: "Mid Price vs Raw Timestamp",
        y_label: "Mid Price (INR)",
        x_label: None,
        y_limits: Some(MIDPRICE_YLIM),
        color: RGBColor(0, 0, 255),
    },
    PanelSpec {
        column: COL_SPREAD,
        title: "Spread vs Raw Timestamp",
        y_label: "Spread (INR)",
        x_label: None,
        y_limits: None,
        color: RGBColor(255, 165, 0),
    },
    PanelSpec {
        column: COL_OFI_TOP,
        title: "Order Flow Imbalance (Top) vs Raw Timestamp",
        y_label: "OFI_Top",
        x_label: None,
        y_limits: None,
        color: RGBColor(0, 128, 0),
    },
    PanelSpec {
        column: COL_OFI_DEPTH,
        title: "Order Flow Imbalance (Depth) vs Raw Timestamp",
        y_label: "OFI_Depth",
        x_label: Some(X_LABEL),
        y_limits: None,
        color: RGBColor(128, 0, 128),
    },
];

fn plot_err<E: std::fmt::Display>(e: E) -> MetricsError {
    MetricsError::Plot(e.to_string())
}

/// plots the four panels to png,
/// all the columns are looked up before the file is created
pub fn plot_metrics(table: &MetricsTable, fout: &Path, style: &FigureStyle) -> Result<()> {
    let x = table.numeric(COL_TIMESTAMP_RAW)?;
    let series = PANELS
        .iter()
        .map(|spec| Ok((spec, table.numeric(spec.column)?)))
        .collect::<Result<Vec<(&PanelSpec, &[f64])>>>()?;
    check_output_dir(fout)?;

    let x_range = padded_range(min_and_max(x));
    let (width, height) = style.size_px();
    debug!("figure {}x{} px, x range {:?}", width, height, x_range);
    let root = BitMapBackend::new(fout, (width, height)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;
    let rows = root.split_evenly((PANELS.len(), 1));
    for (area, (spec, y)) in rows.iter().zip(series) {
        draw_panel(area, spec, x, y, x_range.clone(), style)?;
    }
    root.present().map_err(plot_err)?;
    Ok(())
}

fn check_output_dir(fout: &Path) -> Result<()> {
    match fout.parent() {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.is_dir() => {
            Err(MetricsError::OutputDirMissing(dir.to_path_buf()))
        }
        _ => Ok(()),
    }
}

fn draw_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    spec: &PanelSpec,
    x: &[f64],
    y: &[f64],
    x_range: Range<f64>,
    style: &FigureStyle,
) -> Result<()> {
    let mut runs = finite_runs(x, y);
    let y_range = match spec.y_limits {
        Some((lo, hi)) => {
            runs = runs
                .iter()
                .flat_map(|run| clip_to_band(run, lo, hi))
                .collect();
            lo..hi
        }
        None => {
            let ys: Vec<f64> = runs.iter().flatten().map(|p| p.1).collect();
            padded_range(min_and_max(&ys))
        }
    };
    debug!(
        "{}: {} line segments, y range {:?}",
        spec.column,
        runs.len(),
        y_range
    );

    let label_px = style.pt(10.);
    let x_label_area = if spec.x_label.is_some() {
        style.pt(34.)
    } else {
        style.pt(18.)
    };
    let mut chart = ChartBuilder::on(area)
        .caption(spec.title, ("sans-serif", style.pt(12.)))
        .margin(style.pt(6.))
        .x_label_area_size(x_label_area)
        .y_label_area_size(style.pt(64.))
        .build_cartesian_2d(x_range.clone(), y_range.clone())
        .map_err(plot_err)?;

    let x_fmt = |v: &f64| format_x_label(*v, style.x_labels);
    let y_fmt = |v: &f64| trim_float(*v, 3);
    let mut mesh = chart.configure_mesh();
    mesh.disable_mesh()
        .x_labels(X_TICKS)
        .y_labels(Y_TICKS)
        .set_all_tick_mark_size(style.pt(3.))
        .label_style(("sans-serif", label_px))
        .axis_desc_style(("sans-serif", label_px))
        .y_desc(spec.y_label)
        .x_label_formatter(&x_fmt)
        .y_label_formatter(&y_fmt);
    if let Some(x_desc) = spec.x_label {
        mesh.x_desc(x_desc);
    }
    mesh.draw().map_err(plot_err)?;

    // dashed grid at the tick positions
    let grid = GRID_COLOR.mix(GRID_ALPHA).stroke_width(1);
    let mut dashes = Vec::new();
    for xt in RangedCoordf64::from(x_range.clone()).key_points(X_TICKS) {
        dashes.extend(dash_segments(
            (xt, y_range.start),
            (xt, y_range.end),
            DASHES_PER_LINE,
            DASH_DUTY,
        ));
    }
    for yt in RangedCoordf64::from(y_range.clone()).key_points(Y_TICKS) {
        dashes.extend(dash_segments(
            (x_range.start, yt),
            (x_range.end, yt),
            DASHES_PER_LINE,
            DASH_DUTY,
        ));
    }
    chart
        .draw_series(dashes.into_iter().map(|d| PathElement::new(d, grid)))
        .map_err(plot_err)?;

    let line = spec.color.stroke_width(style.pt(1.5));
    for run in runs {
        chart
            .draw_series(LineSeries::new(run, line))
            .map_err(plot_err)?;
    }
    Ok(())
}

/// splits the series into runs of points with finite x and y,
/// a missing value on either axis breaks the line
pub fn finite_runs(x: &[f64], y: &[f64]) -> Vec<Vec<(f64, f64)>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for (&xv, &yv) in x.iter().zip(y.iter()) {
        if xv.is_finite() && yv.is_finite() {
            current.push((xv, yv));
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

/// cuts a run to the part inside lo <= y <= hi,
/// interpolating the points where the line crosses the band edges
pub fn clip_to_band(run: &[(f64, f64)], lo: f64, hi: f64) -> Vec<Vec<(f64, f64)>> {
    let mut clipped = Vec::new();
    let mut current: Vec<(f64, f64)> = Vec::new();
    if run.len() == 1 && lo <= run[0].1 && run[0].1 <= hi {
        clipped.push(run.to_vec());
        return clipped;
    }
    for pair in run.windows(2) {
        let (p, q) = (pair[0], pair[1]);
        match clip_segment(p, q, lo, hi) {
            Some((a, b)) => {
                if current.last() != Some(&a) && !current.is_empty() {
                    clipped.push(std::mem::take(&mut current));
                }
                if current.is_empty() {
                    current.push(a);
                }
                current.push(b);
                if b != q {
                    clipped.push(std::mem::take(&mut current));
                }
            }
            None => {
                if !current.is_empty() {
                    clipped.push(std::mem::take(&mut current));
                }
            }
        }
    }
    if !current.is_empty() {
        clipped.push(current);
    }
    clipped
}

fn clip_segment(
    p: (f64, f64),
    q: (f64, f64),
    lo: f64,
    hi: f64,
) -> Option<((f64, f64), (f64, f64))> {
    let dy = q.1 - p.1;
    if dy == 0. {
        return if lo <= p.1 && p.1 <= hi {
            Some((p, q))
        } else {
            None
        };
    }
    let t_lo = (lo - p.1) / dy;
    let t_hi = (hi - p.1) / dy;
    let (t_in, y_in, t_out, y_out) = if t_lo <= t_hi {
        (t_lo, lo, t_hi, hi)
    } else {
        (t_hi, hi, t_lo, lo)
    };
    if t_in.max(0.) > t_out.min(1.) {
        return None;
    }
    let x_at = |t: f64| p.0 + (q.0 - p.0) * t;
    // crossings sit exactly on the band edge
    let a = if t_in <= 0. { p } else { (x_at(t_in), y_in) };
    let b = if t_out >= 1. { q } else { (x_at(t_out), y_out) };
    Some((a, b))
}

/// min..max widened by AXIS_MARGIN on each side,
/// a flat series is padded and no data gives 0..1
pub fn padded_range(bounds: Option<(f64, f64)>) -> Range<f64> {
    match bounds {
        None => 0.0..1.0,
        Some((min, max)) if max > min => {
            let pad = (max - min) * AXIS_MARGIN;
            (min - pad)..(max + pad)
        }
        Some((v, _)) => {
            let pad = if v == 0. { 0.5 } else { v.abs() * AXIS_MARGIN };
            (v - pad)..(v + pad)
        }
    }
}

/// count dashes evenly spaced along from..to, each covering duty of its slot
pub fn dash_segments(
    from: (f64, f64),
    to: (f64, f64),
    count: usize,
    duty: f64,
) -> Vec<Vec<(f64, f64)>> {
    let at = |t: f64| (from.0 + (to.0 - from.0) * t, from.1 + (to.1 - from.1) * t);
    (0..count)
        .map(|i| {
            let start = i as f64 / count as f64;
            let end = (i as f64 + duty) / count as f64;
            vec![at(start), at(end)]
        })
        .collect()
}

pub fn format_x_label(v: f64, mode: XLabels) -> String {
    match mode {
        XLabels::IstClock if v.is_finite() && v >= 0. => format_timestamp_ist(v as u64),
        _ if v.abs() >= 1e6 => format!("{:.4e}", v),
        _ => trim_float(v, 3),
    }
}

/// fixed decimals without the trailing zeros
pub fn trim_float(v: f64, decimals: usize) -> String {
    let s = format!("{:.*}", decimals, v);
    if s.contains('.') {
        let s = s.trim_end_matches('0').trim_end_matches('.');
        if s == "-0" {
            "0".to_string()
        } else {
            s.to_string()
        }
    } else {
        s
    }
}
