//! Chart rendering.
//!
//! A [`ChartSpec`] describes what to draw; a [`ChartRenderer`] turns it into a
//! file. [`SvgChartRenderer`] writes self-contained SVG and never fails on
//! empty input: a spec without points renders a captioned placeholder.

// Allow format string pushing for readability when assembling markup
#![allow(clippy::format_push_string)]

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::Result;

/// Series colors, cycled by index.
pub const PALETTE: [&str; 6] = ["#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b"];

/// How a series is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesStyle {
    /// Connected line through the points in order.
    Line,
    /// Individual markers.
    Points,
    /// Cross markers, used to overlay flagged rows.
    Crosses,
}

/// A named sequence of `(x, y)` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    /// Legend label.
    pub label: String,
    /// Data points; non-finite values are skipped when drawing.
    pub points: Vec<(f64, f64)>,
    /// Drawing style.
    pub style: SeriesStyle,
    /// CSS color.
    pub color: String,
}

impl Series {
    /// Creates a line series.
    #[must_use]
    pub fn line(label: impl Into<String>, points: Vec<(f64, f64)>, color: &str) -> Self {
        Self {
            label: label.into(),
            points,
            style: SeriesStyle::Line,
            color: color.to_string(),
        }
    }

    /// Creates a marker series.
    #[must_use]
    pub fn points(label: impl Into<String>, points: Vec<(f64, f64)>, color: &str) -> Self {
        Self {
            style: SeriesStyle::Points,
            ..Self::line(label, points, color)
        }
    }

    /// Creates a cross-marker overlay series.
    #[must_use]
    pub fn crosses(label: impl Into<String>, points: Vec<(f64, f64)>, color: &str) -> Self {
        Self {
            style: SeriesStyle::Crosses,
            ..Self::line(label, points, color)
        }
    }

    fn finite_points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.points
            .iter()
            .copied()
            .filter(|(x, y)| x.is_finite() && y.is_finite())
    }
}

/// Everything needed to draw one chart.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChartSpec {
    /// Chart title.
    pub title: String,
    /// X axis caption.
    pub x_label: String,
    /// Y axis caption.
    pub y_label: String,
    /// Series drawn in order; later series are on top.
    pub series: Vec<Series>,
}

impl ChartSpec {
    /// Creates an empty chart with a title.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Sets the axis captions.
    #[must_use]
    pub fn with_axes(mut self, x_label: impl Into<String>, y_label: impl Into<String>) -> Self {
        self.x_label = x_label.into();
        self.y_label = y_label.into();
        self
    }

    /// Adds a series.
    #[must_use]
    pub fn with_series(mut self, series: Series) -> Self {
        self.series.push(series);
        self
    }

    /// Returns true if no series has a drawable point.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.iter().all(|s| s.finite_points().next().is_none())
    }
}

/// Turns chart specs into image files.
pub trait ChartRenderer: Send + Sync + std::fmt::Debug {
    /// Writes `spec` to `path`, creating parent directories.
    ///
    /// Must succeed for empty specs by producing a placeholder image.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file cannot be written.
    fn render(&self, spec: &ChartSpec, path: &Path) -> Result<()>;

    /// File extension of the produced images, without the dot.
    fn extension(&self) -> &'static str;
}

/// Renders charts as standalone SVG documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SvgChartRenderer {
    width: u32,
    height: u32,
}

impl Default for SvgChartRenderer {
    fn default() -> Self {
        Self {
            width: 800,
            height: 360,
        }
    }
}

const MARGIN_LEFT: f64 = 64.0;
const MARGIN_RIGHT: f64 = 24.0;
const MARGIN_TOP: f64 = 44.0;
const MARGIN_BOTTOM: f64 = 52.0;
const TICKS: usize = 5;

/// Data-to-pixel mapping for one chart.
struct Frame {
    x0: f64,
    x1: f64,
    y0: f64,
    y1: f64,
    left: f64,
    top: f64,
    plot_w: f64,
    plot_h: f64,
}

impl Frame {
    fn px(&self, x: f64) -> f64 {
        self.left + (x - self.x0) / (self.x1 - self.x0) * self.plot_w
    }

    fn py(&self, y: f64) -> f64 {
        self.top + self.plot_h - (y - self.y0) / (self.y1 - self.y0) * self.plot_h
    }
}

/// Widens a degenerate range so it can be divided by.
fn padded(lo: f64, hi: f64) -> (f64, f64) {
    if hi > lo {
        (lo, hi)
    } else {
        let pad = if lo.abs() > 1.0 { lo.abs() * 0.05 } else { 0.5 };
        (lo - pad, hi + pad)
    }
}

fn format_tick(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude >= 100.0 {
        format!("{value:.0}")
    } else if magnitude >= 1.0 {
        format!("{value:.1}")
    } else {
        format!("{value:.2}")
    }
}

/// Escapes text for inclusion in XML or HTML.
#[must_use]
pub fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

impl SvgChartRenderer {
    /// Creates a renderer producing images of the given pixel size.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Renders `spec` to an SVG string.
    #[must_use]
    pub fn to_svg(&self, spec: &ChartSpec) -> String {
        let (w, h) = (f64::from(self.width), f64::from(self.height));
        let mut svg = String::new();
        svg.push_str(&format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\" viewBox=\"0 0 {} {}\" font-family=\"Arial, sans-serif\" font-size=\"12\">\n",
            self.width, self.height, self.width, self.height
        ));
        svg.push_str("<rect width=\"100%\" height=\"100%\" fill=\"#ffffff\"/>\n");
        svg.push_str(&format!(
            "<text x=\"{:.1}\" y=\"24\" text-anchor=\"middle\" font-size=\"15\" font-weight=\"bold\">{}</text>\n",
            w / 2.0,
            escape_markup(&spec.title)
        ));

        if spec.is_empty() {
            svg.push_str(&format!(
                "<rect x=\"{MARGIN_LEFT}\" y=\"{MARGIN_TOP}\" width=\"{:.1}\" height=\"{:.1}\" fill=\"#fafafa\" stroke=\"#cccccc\" stroke-dasharray=\"4 4\"/>\n",
                w - MARGIN_LEFT - MARGIN_RIGHT,
                h - MARGIN_TOP - MARGIN_BOTTOM
            ));
            svg.push_str(&format!(
                "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\" fill=\"#888888\">not enough data</text>\n",
                w / 2.0,
                h / 2.0
            ));
            svg.push_str("</svg>\n");
            return svg;
        }

        let frame = self.frame(spec);
        self.draw_axes(&mut svg, spec, &frame);
        for series in &spec.series {
            draw_series(&mut svg, series, &frame);
        }
        draw_legend(&mut svg, spec, w);
        svg.push_str("</svg>\n");
        svg
    }

    fn frame(&self, spec: &ChartSpec) -> Frame {
        let (mut x0, mut x1, mut y0, mut y1) = (
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
        );
        for (x, y) in spec.series.iter().flat_map(Series::finite_points) {
            x0 = x0.min(x);
            x1 = x1.max(x);
            y0 = y0.min(y);
            y1 = y1.max(y);
        }
        let (x0, x1) = padded(x0, x1);
        let (y0, y1) = padded(y0, y1);
        Frame {
            x0,
            x1,
            y0,
            y1,
            left: MARGIN_LEFT,
            top: MARGIN_TOP,
            plot_w: f64::from(self.width) - MARGIN_LEFT - MARGIN_RIGHT,
            plot_h: f64::from(self.height) - MARGIN_TOP - MARGIN_BOTTOM,
        }
    }

    fn draw_axes(&self, svg: &mut String, spec: &ChartSpec, f: &Frame) {
        let bottom = f.top + f.plot_h;
        let right = f.left + f.plot_w;
        for i in 0..=TICKS {
            let frac = i as f64 / TICKS as f64;
            let yv = f.y0 + (f.y1 - f.y0) * frac;
            let xv = f.x0 + (f.x1 - f.x0) * frac;
            let (py, px) = (f.py(yv), f.px(xv));
            let _ = writeln!(
                svg,
                "<line x1=\"{:.1}\" y1=\"{py:.1}\" x2=\"{right:.1}\" y2=\"{py:.1}\" stroke=\"#eeeeee\"/>",
                f.left
            );
            let _ = writeln!(
                svg,
                "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"end\">{}</text>",
                f.left - 6.0,
                py + 4.0,
                format_tick(yv)
            );
            let _ = writeln!(
                svg,
                "<text x=\"{px:.1}\" y=\"{:.1}\" text-anchor=\"middle\">{}</text>",
                bottom + 16.0,
                format_tick(xv)
            );
        }
        let _ = writeln!(
            svg,
            "<rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" fill=\"none\" stroke=\"#444444\"/>",
            f.left, f.top, f.plot_w, f.plot_h
        );
        let _ = writeln!(
            svg,
            "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\">{}</text>",
            f.left + f.plot_w / 2.0,
            f64::from(self.height) - 10.0,
            escape_markup(&spec.x_label)
        );
        let _ = writeln!(
            svg,
            "<text x=\"16\" y=\"{:.1}\" text-anchor=\"middle\" transform=\"rotate(-90 16 {:.1})\">{}</text>",
            f.top + f.plot_h / 2.0,
            f.top + f.plot_h / 2.0,
            escape_markup(&spec.y_label)
        );
    }
}

fn draw_series(svg: &mut String, series: &Series, f: &Frame) {
    let color = escape_markup(&series.color);
    match series.style {
        SeriesStyle::Line => {
            let coords: Vec<String> = series
                .finite_points()
                .map(|(x, y)| format!("{:.1},{:.1}", f.px(x), f.py(y)))
                .collect();
            let _ = writeln!(
                svg,
                "<polyline fill=\"none\" stroke=\"{color}\" stroke-width=\"1.5\" points=\"{}\"/>",
                coords.join(" ")
            );
        }
        SeriesStyle::Points => {
            for (x, y) in series.finite_points() {
                let _ = writeln!(
                    svg,
                    "<circle cx=\"{:.1}\" cy=\"{:.1}\" r=\"3\" fill=\"{color}\" fill-opacity=\"0.8\"/>",
                    f.px(x),
                    f.py(y)
                );
            }
        }
        SeriesStyle::Crosses => {
            for (x, y) in series.finite_points() {
                let (cx, cy) = (f.px(x), f.py(y));
                let _ = writeln!(
                    svg,
                    "<path d=\"M{:.1},{:.1}L{:.1},{:.1}M{:.1},{:.1}L{:.1},{:.1}\" stroke=\"{color}\" stroke-width=\"2\"/>",
                    cx - 4.0,
                    cy - 4.0,
                    cx + 4.0,
                    cy + 4.0,
                    cx - 4.0,
                    cy + 4.0,
                    cx + 4.0,
                    cy - 4.0
                );
            }
        }
    }
}

fn draw_legend(svg: &mut String, spec: &ChartSpec, width: f64) {
    let x = width - MARGIN_RIGHT - 150.0;
    for (i, series) in spec.series.iter().enumerate() {
        let y = MARGIN_TOP + 14.0 + i as f64 * 16.0;
        let _ = writeln!(
            svg,
            "<rect x=\"{x:.1}\" y=\"{:.1}\" width=\"10\" height=\"10\" fill=\"{}\"/>",
            y - 9.0,
            escape_markup(&series.color)
        );
        let _ = writeln!(
            svg,
            "<text x=\"{:.1}\" y=\"{y:.1}\">{}</text>",
            x + 16.0,
            escape_markup(&series.label)
        );
    }
}

impl ChartRenderer for SvgChartRenderer {
    fn render(&self, spec: &ChartSpec, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let svg = self.to_svg(spec);
        let tmp = path.with_extension("svg.tmp");
        fs::write(&tmp, svg.as_bytes())?;
        fs::rename(&tmp, path)?;
        debug!(
            path = %path.display(),
            series = spec.series.len(),
            placeholder = spec.is_empty(),
            "rendered chart"
        );
        Ok(())
    }

    fn extension(&self) -> &'static str {
        "svg"
    }
}
