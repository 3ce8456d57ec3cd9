mod glyphs;

use std::io::Cursor;

use anyhow::Context;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use time::{OffsetDateTime, macros::format_description};

use glyphs::{draw_text, text_height, text_width};

pub const CHART_WIDTH: u32 = 1000;
pub const CHART_HEIGHT: u32 = 600;

pub const LINE_COLOR: Rgb<u8> = Rgb([0x2e, 0xcc, 0x71]);
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS_COLOR: Rgb<u8> = Rgb([40, 40, 40]);
const GRID_COLOR: Rgb<u8> = Rgb([210, 210, 210]);

const MARGIN_LEFT: f32 = 90.0;
const MARGIN_RIGHT: f32 = 30.0;
const MARGIN_TOP: f32 = 30.0;
const MARGIN_BOTTOM: f32 = 60.0;

const Y_TICKS: usize = 5;
const MAX_X_TICKS: usize = 6;
const LABEL_SCALE: u32 = 2;
const MARKER_RADIUS: i32 = 5;
const DAY_SECONDS: f64 = 86_400.0;

/// One confirmed reading on the chart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartPoint {
    pub at: OffsetDateTime,
    pub value: f64,
}

/// Maps data space onto the plot rectangle.
struct Frame {
    t_min: f64,
    t_max: f64,
    v_min: f64,
    v_max: f64,
    left: f32,
    right: f32,
    top: f32,
    bottom: f32,
}

impl Frame {
    fn new(points: &[ChartPoint]) -> Self {
        let times = points.iter().map(|p| p.at.unix_timestamp() as f64);
        let values = points.iter().map(|p| p.value);

        let (mut t_min, mut t_max) = min_max(times);
        let (mut v_min, mut v_max) = min_max(values);

        if t_max - t_min < 1.0 {
            t_min -= DAY_SECONDS;
            t_max += DAY_SECONDS;
        }
        let pad = ((v_max - v_min) * 0.05).max(0.5);
        v_min -= pad;
        v_max += pad;

        Self {
            t_min,
            t_max,
            v_min,
            v_max,
            left: MARGIN_LEFT,
            right: CHART_WIDTH as f32 - MARGIN_RIGHT,
            top: MARGIN_TOP,
            bottom: CHART_HEIGHT as f32 - MARGIN_BOTTOM,
        }
    }

    fn x(&self, t: f64) -> f32 {
        self.left + ((t - self.t_min) / (self.t_max - self.t_min)) as f32 * (self.right - self.left)
    }

    fn y(&self, v: f64) -> f32 {
        self.bottom - ((v - self.v_min) / (self.v_max - self.v_min)) as f32 * (self.bottom - self.top)
    }
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

/// Render the weight line chart as PNG bytes. `points` must be ordered oldest first.
pub fn render_weight_chart(points: &[ChartPoint]) -> anyhow::Result<Vec<u8>> {
    if points.is_empty() {
        anyhow::bail!("No points to chart");
    }

    let frame = Frame::new(points);
    let mut img = RgbImage::from_pixel(CHART_WIDTH, CHART_HEIGHT, BACKGROUND);

    draw_value_grid(&mut img, &frame);
    draw_time_grid(&mut img, &frame, points);

    // axes
    draw_line_segment_mut(&mut img, (frame.left, frame.top), (frame.left, frame.bottom), AXIS_COLOR);
    draw_line_segment_mut(&mut img, (frame.left, frame.bottom), (frame.right, frame.bottom), AXIS_COLOR);

    let coords: Vec<(f32, f32)> = points
        .iter()
        .map(|p| (frame.x(p.at.unix_timestamp() as f64), frame.y(p.value)))
        .collect();

    for pair in coords.windows(2) {
        draw_thick_segment(&mut img, pair[0], pair[1], LINE_COLOR);
    }
    for &(x, y) in &coords {
        draw_filled_circle_mut(&mut img, (x.round() as i32, y.round() as i32), MARKER_RADIUS, LINE_COLOR);
    }

    let mut png = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .context("Failed to encode chart as PNG")?;
    Ok(png)
}

fn draw_value_grid(img: &mut RgbImage, frame: &Frame) {
    let label_h = text_height(LABEL_SCALE) as f32;
    for i in 0..Y_TICKS {
        let v = frame.v_min + (frame.v_max - frame.v_min) * i as f64 / (Y_TICKS - 1) as f64;
        let y = frame.y(v);
        draw_dashed_segment(img, (frame.left, y), (frame.right, y), GRID_COLOR);

        let label = format!("{:.1}", v);
        let x = frame.left - 10.0 - text_width(&label, LABEL_SCALE) as f32;
        draw_text(img, x as i32, (y - label_h / 2.0) as i32, &label, LABEL_SCALE, AXIS_COLOR);
    }
}

fn draw_time_grid(img: &mut RgbImage, frame: &Frame, points: &[ChartPoint]) {
    let fmt = format_description!("[day]/[month]");
    let ticks = points.len().clamp(2, MAX_X_TICKS);
    let offset = points[0].at.offset();

    for i in 0..ticks {
        let t = frame.t_min + (frame.t_max - frame.t_min) * i as f64 / (ticks - 1) as f64;
        let x = frame.x(t);
        draw_dashed_segment(img, (x, frame.top), (x, frame.bottom), GRID_COLOR);

        let Ok(at) = OffsetDateTime::from_unix_timestamp(t as i64) else {
            continue;
        };
        let Ok(label) = at.to_offset(offset).format(&fmt) else {
            continue;
        };
        let label_x = x - text_width(&label, LABEL_SCALE) as f32 / 2.0;
        draw_text(img, label_x as i32, (frame.bottom + 12.0) as i32, &label, LABEL_SCALE, AXIS_COLOR);
    }
}

fn draw_thick_segment(img: &mut RgbImage, from: (f32, f32), to: (f32, f32), color: Rgb<u8>) {
    for d in [-1.0, 0.0, 1.0] {
        draw_line_segment_mut(img, (from.0, from.1 + d), (to.0, to.1 + d), color);
        draw_line_segment_mut(img, (from.0 + d, from.1), (to.0 + d, to.1), color);
    }
}

fn draw_dashed_segment(img: &mut RgbImage, from: (f32, f32), to: (f32, f32), color: Rgb<u8>) {
    const DASH: f32 = 6.0;
    const GAP: f32 = 4.0;

    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let len = (dx * dx + dy * dy).sqrt();
    if len == 0.0 {
        return;
    }
    let (ux, uy) = (dx / len, dy / len);

    let mut pos = 0.0;
    while pos < len {
        let end = (pos + DASH).min(len);
        draw_line_segment_mut(
            img,
            (from.0 + ux * pos, from.1 + uy * pos),
            (from.0 + ux * end, from.1 + uy * end),
            color,
        );
        pos += DASH + GAP;
    }
}
