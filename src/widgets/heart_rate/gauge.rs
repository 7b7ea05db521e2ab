//! Semicircle gauge for the dashboard view.

use std::f64::consts::PI;

use ratatui::{
    layout::Rect,
    style::{Color, Stylize},
    symbols::Marker,
    widgets::{
        canvas::{Canvas, Context, Line as CanvasLine},
        Block,
    },
    Frame,
};

pub const GAUGE_MIN: f64 = 0.0;
pub const GAUGE_MAX: f64 = 200.0;
const ARC_SEGMENTS: usize = 90;
const TRACK_COLOR: Color = Color::Rgb(70, 70, 70);
const MARKER_COLOR: Color = Color::Rgb(255, 100, 100);

/// Angle on the semicircle in radians, `PI` at the minimum and 0 at the maximum.
pub fn gauge_angle(value: f64) -> f64 {
    let ratio = (value.clamp(GAUGE_MIN, GAUGE_MAX) - GAUGE_MIN) / (GAUGE_MAX - GAUGE_MIN);
    PI * (1.0 - ratio)
}

/// Blue at the bottom of the scale through yellow to red at the top.
pub fn gauge_color(value: f64) -> Color {
    let ratio = (value.clamp(GAUGE_MIN, GAUGE_MAX) - GAUGE_MIN) / (GAUGE_MAX - GAUGE_MIN);
    let lerp = |a: u8, b: u8, t: f64| (f64::from(a) + (f64::from(b) - f64::from(a)) * t).round() as u8;
    if ratio < 0.5 {
        let t = ratio * 2.0;
        Color::Rgb(lerp(0, 255, t), lerp(180, 255, t), lerp(255, 0, t))
    } else {
        let t = (ratio - 0.5) * 2.0;
        Color::Rgb(255, lerp(255, 80, t), lerp(0, 80, t))
    }
}

fn arc(ctx: &mut Context, radius: f64, from: f64, to: f64, color: impl Fn(f64) -> Color) {
    let segments = ((from - to) / PI * ARC_SEGMENTS as f64).ceil().max(1.0) as usize;
    let step = (from - to) / segments as f64;
    for i in 0..segments {
        let a = from - step * i as f64;
        let b = a - step;
        ctx.draw(&CanvasLine::new(
            radius * a.cos(),
            radius * a.sin(),
            radius * b.cos(),
            radius * b.sin(),
            color(a),
        ));
    }
}

fn angle_to_value(angle: f64) -> f64 {
    GAUGE_MIN + (1.0 - angle / PI) * (GAUGE_MAX - GAUGE_MIN)
}

pub fn render_gauge(f: &mut Frame, area: Rect, bpm: Option<u16>, average: f64) {
    let value = bpm.map(f64::from);
    let canvas = Canvas::default()
        .block(Block::bordered().title("Dashboard".red().bold()))
        .marker(Marker::Braille)
        .x_bounds([-1.3, 1.3])
        .y_bounds([-0.4, 1.3])
        .paint(move |ctx| {
            arc(ctx, 1.0, PI, 0.0, |_| TRACK_COLOR);
            arc(ctx, 0.95, PI, 0.0, |_| TRACK_COLOR);
            ctx.layer();
            if let Some(value) = value {
                let end = gauge_angle(value);
                arc(ctx, 1.0, PI, end, |a| gauge_color(angle_to_value(a)));
                arc(ctx, 0.95, PI, end, |a| gauge_color(angle_to_value(a)));
            }
            if average > 0.0 {
                // Marker just outside the track, pointing at the centre
                let a = gauge_angle(average);
                ctx.draw(&CanvasLine::new(
                    1.08 * a.cos(),
                    1.08 * a.sin(),
                    1.2 * a.cos(),
                    1.2 * a.sin(),
                    MARKER_COLOR,
                ));
            }
            ctx.layer();
            let text = value.map_or_else(|| "--".to_owned(), |v| format!("{v}"));
            ctx.print(-0.05 * text.len() as f64, 0.25, text.bold());
            ctx.print(-0.08, 0.0, "BPM".gray());
            if average > 0.0 {
                ctx.print(-0.2, -0.25, format!("avg {}", average.round_ties_even()).dark_gray());
            }
        });
    f.render_widget(canvas, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angle_spans_semicircle() {
        assert_eq!(gauge_angle(0.0), PI);
        assert_eq!(gauge_angle(200.0), 0.0);
        assert!((gauge_angle(100.0) - PI / 2.0).abs() < 1e-12);
        assert_eq!(gauge_angle(260.0), 0.0);
        assert_eq!(gauge_angle(-5.0), PI);
    }

    #[test]
    fn color_runs_blue_to_red() {
        assert_eq!(gauge_color(0.0), Color::Rgb(0, 180, 255));
        assert_eq!(gauge_color(100.0), Color::Rgb(255, 255, 0));
        assert_eq!(gauge_color(200.0), Color::Rgb(255, 80, 80));
    }
}
