// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Self-contained HTML charts
//!
//! Geometry is computed here and the page is rendered through a minijinja
//! template as inline SVG, so the output needs no scripts or network access.

use anyhow::Result;
use minijinja::{context, Environment};
use retailpivot_core::ResultTable;
use retailpivot_query::resolve_dimension;
use serde::Serialize;
use std::f64::consts::PI;

use crate::validation::ChartType;

const TEMPLATE_NAME: &str = "chart.html";
const TEMPLATE: &str = include_str!("../../templates/chart.html");

const WIDTH: f64 = 960.0;
const HEIGHT: f64 = 480.0;
const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 20.0;
const MARGIN_BOTTOM: f64 = 100.0;
const PIE_RADIUS: f64 = 180.0;
const TICKS: usize = 5;

const PALETTE: [&str; 8] = [
    "#4e79a7", "#f28e2b", "#e15759", "#76b7b2", "#59a14f", "#edc948", "#b07aa1", "#ff9da7",
];

/// Label used when the table has no dimension columns
pub const TOTAL_LABEL: &str = "Total";

/// Separator between dimension values in a flattened label
pub const LABEL_SEPARATOR: &str = " - ";

pub const HTML_CONTENT_TYPE: &str = "text/html";

#[derive(Debug, Clone, PartialEq)]
struct Series {
    name: String,
    values: Vec<f64>,
}

/// Category labels with one numeric series per metric column
#[derive(Debug, Clone, PartialEq)]
struct ChartData {
    labels: Vec<String>,
    series: Vec<Series>,
}

impl ChartData {
    fn from_table(table: &ResultTable) -> Self {
        let (dimensions, metrics): (Vec<&String>, Vec<&String>) = table
            .columns()
            .iter()
            .partition(|c| resolve_dimension(c).is_some());

        let labels = table
            .iter()
            .map(|row| {
                if dimensions.is_empty() {
                    return TOTAL_LABEL.to_string();
                }
                dimensions
                    .iter()
                    .map(|d| row.get(d).map(|v| v.to_string()).unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join(LABEL_SEPARATOR)
            })
            .collect();

        let series = metrics
            .iter()
            .map(|m| Series {
                name: m.to_string(),
                values: table
                    .iter()
                    .map(|row| row.get(m).and_then(|v| v.as_f64()).unwrap_or(0.0))
                    .collect(),
            })
            .collect();

        Self { labels, series }
    }
}

#[derive(Debug, Serialize)]
struct Rect {
    x: String,
    y: String,
    width: String,
    height: String,
    color: &'static str,
    title: String,
}

#[derive(Debug, Serialize)]
struct Marker {
    x: String,
    y: String,
    title: String,
}

#[derive(Debug, Serialize)]
struct Polyline {
    points: String,
    color: &'static str,
    name: String,
    markers: Vec<Marker>,
}

#[derive(Debug, Serialize)]
struct Slice {
    path: String,
    color: &'static str,
    title: String,
}

#[derive(Debug, Serialize)]
struct Label {
    x: String,
    y: String,
    text: String,
}

#[derive(Debug, Serialize)]
struct LegendItem {
    name: String,
    color: &'static str,
}

#[derive(Debug, Serialize)]
struct Axis {
    zero: String,
}

#[derive(Debug, Default, Serialize)]
struct Geometry {
    ticks: Vec<Label>,
    axis: Option<Axis>,
    bars: Vec<Rect>,
    lines: Vec<Polyline>,
    slices: Vec<Slice>,
    labels: Vec<Label>,
    legend: Vec<LegendItem>,
}

fn num(v: f64) -> String {
    format!("{:.2}", v)
}

fn color(index: usize) -> &'static str {
    PALETTE[index % PALETTE.len()]
}

/// Vertical value scale shared by bar and line charts
struct Scale {
    lo: f64,
    hi: f64,
}

impl Scale {
    fn new(data: &ChartData) -> Self {
        let values = data.series.iter().flat_map(|s| s.values.iter().copied());
        let (lo, hi) = values.fold((0.0_f64, 0.0_f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let hi = if hi == lo { lo + 1.0 } else { hi };
        Self { lo, hi }
    }

    fn y(&self, value: f64) -> f64 {
        let plot_height = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
        MARGIN_TOP + (self.hi - value) / (self.hi - self.lo) * plot_height
    }

    fn ticks(&self) -> Vec<Label> {
        (0..TICKS)
            .map(|k| {
                let value = self.lo + (self.hi - self.lo) * k as f64 / (TICKS - 1) as f64;
                Label {
                    x: num(MARGIN_LEFT - 8.0),
                    y: num(self.y(value)),
                    text: num(value),
                }
            })
            .collect()
    }
}

fn slot_width(data: &ChartData) -> f64 {
    (WIDTH - MARGIN_LEFT - MARGIN_RIGHT) / data.labels.len().max(1) as f64
}

fn category_labels(data: &ChartData) -> Vec<Label> {
    let slot = slot_width(data);
    data.labels
        .iter()
        .enumerate()
        .map(|(i, text)| Label {
            x: num(MARGIN_LEFT + slot * (i as f64 + 0.5)),
            y: num(HEIGHT - MARGIN_BOTTOM + 16.0),
            text: text.clone(),
        })
        .collect()
}

fn series_legend(data: &ChartData) -> Vec<LegendItem> {
    data.series
        .iter()
        .enumerate()
        .map(|(i, s)| LegendItem {
            name: s.name.clone(),
            color: color(i),
        })
        .collect()
}

fn bar_geometry(data: &ChartData) -> Geometry {
    let scale = Scale::new(data);
    let slot = slot_width(data);
    let bar_width = slot * 0.8 / data.series.len().max(1) as f64;

    let mut bars = Vec::new();
    for (s, series) in data.series.iter().enumerate() {
        for (i, value) in series.values.iter().copied().enumerate() {
            let top = scale.y(value.max(0.0));
            let bottom = scale.y(value.min(0.0));
            bars.push(Rect {
                x: num(MARGIN_LEFT + slot * i as f64 + slot * 0.1 + bar_width * s as f64),
                y: num(top),
                width: num(bar_width),
                height: num(bottom - top),
                color: color(s),
                title: format!("{}: {} = {}", data.labels[i], series.name, num(value)),
            });
        }
    }

    Geometry {
        ticks: scale.ticks(),
        axis: Some(Axis { zero: num(scale.y(0.0)) }),
        bars,
        labels: category_labels(data),
        legend: series_legend(data),
        ..Geometry::default()
    }
}

fn line_geometry(data: &ChartData) -> Geometry {
    let scale = Scale::new(data);
    let slot = slot_width(data);

    let lines = data
        .series
        .iter()
        .enumerate()
        .map(|(s, series)| {
            let markers: Vec<Marker> = series
                .values
                .iter()
                .enumerate()
                .map(|(i, value)| Marker {
                    x: num(MARGIN_LEFT + slot * (i as f64 + 0.5)),
                    y: num(scale.y(*value)),
                    title: format!("{}: {} = {}", data.labels[i], series.name, num(*value)),
                })
                .collect();
            Polyline {
                points: markers
                    .iter()
                    .map(|m| format!("{},{}", m.x, m.y))
                    .collect::<Vec<_>>()
                    .join(" "),
                color: color(s),
                name: series.name.clone(),
                markers,
            }
        })
        .collect();

    Geometry {
        ticks: scale.ticks(),
        axis: Some(Axis { zero: num(scale.y(0.0)) }),
        lines,
        labels: category_labels(data),
        legend: series_legend(data),
        ..Geometry::default()
    }
}

/// Pie over the first metric; non-positive values get no slice
fn pie_geometry(data: &ChartData) -> Geometry {
    let Some(series) = data.series.first() else {
        return Geometry::default();
    };
    let total: f64 = series.values.iter().filter(|v| **v > 0.0).sum();
    if total <= 0.0 {
        return Geometry::default();
    }

    let (cx, cy) = (WIDTH / 2.0, HEIGHT / 2.0);
    let point = |angle: f64| (cx + PIE_RADIUS * angle.cos(), cy + PIE_RADIUS * angle.sin());

    let mut slices = Vec::new();
    let mut legend = Vec::new();
    let mut start = -PI / 2.0;
    for (i, value) in series.values.iter().copied().enumerate() {
        if value <= 0.0 {
            continue;
        }
        let sweep = value / total * 2.0 * PI;
        let path = if sweep >= 2.0 * PI - 1e-9 {
            format!(
                "M {x},{top} A {r},{r} 0 1 1 {x},{bottom} A {r},{r} 0 1 1 {x},{top} Z",
                x = num(cx),
                top = num(cy - PIE_RADIUS),
                bottom = num(cy + PIE_RADIUS),
                r = num(PIE_RADIUS),
            )
        } else {
            let (x0, y0) = point(start);
            let (x1, y1) = point(start + sweep);
            format!(
                "M {},{} L {},{} A {r},{r} 0 {} 1 {},{} Z",
                num(cx),
                num(cy),
                num(x0),
                num(y0),
                u8::from(sweep > PI),
                num(x1),
                num(y1),
                r = num(PIE_RADIUS),
            )
        };
        let percent = value / total * 100.0;
        slices.push(Slice {
            path,
            color: color(i),
            title: format!("{}: {} ({:.1}%)", data.labels[i], num(value), percent),
        });
        legend.push(LegendItem {
            name: data.labels[i].clone(),
            color: color(i),
        });
        start += sweep;
    }

    Geometry {
        slices,
        legend,
        ..Geometry::default()
    }
}

/// Render a result table as an HTML page
///
/// Multiple dimensions are flattened into one category label; a table
/// without dimension columns is labelled `Total`. A pie chart uses only the
/// first metric column. An empty table renders a "no data" page.
pub fn render_chart(table: &ResultTable, chart_type: ChartType) -> Result<String> {
    let data = ChartData::from_table(table);

    let geometry = if data.labels.is_empty() || data.series.is_empty() {
        Geometry::default()
    } else {
        match chart_type {
            ChartType::Bar => bar_geometry(&data),
            ChartType::Line => line_geometry(&data),
            ChartType::Pie => pie_geometry(&data),
        }
    };
    let empty = geometry.bars.is_empty() && geometry.lines.is_empty() && geometry.slices.is_empty();

    let metric_names: Vec<&str> = data.series.iter().map(|s| s.name.as_str()).collect();
    let subtitle = match chart_type {
        ChartType::Pie => metric_names.first().copied().unwrap_or_default().to_string(),
        _ => metric_names.join(", "),
    };

    let mut env = Environment::new();
    env.add_template(TEMPLATE_NAME, TEMPLATE)?;
    let html = env.get_template(TEMPLATE_NAME)?.render(context! {
        title => format!("Analytics report ({})", chart_type),
        subtitle => subtitle,
        empty => empty,
        width => WIDTH,
        height => HEIGHT,
        plot_left => num(MARGIN_LEFT),
        plot_right => num(WIDTH - MARGIN_RIGHT),
        ticks => geometry.ticks,
        axis => geometry.axis,
        bars => geometry.bars,
        lines => geometry.lines,
        slices => geometry.slices,
        labels => geometry.labels,
        legend => geometry.legend,
    })?;
    Ok(html)
}
