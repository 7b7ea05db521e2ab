//! Paints chart [`DrawCommand`]s onto a braille canvas.

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

use crate::chart::{DrawCommand, Point, ScrollingChart, Stroke, TrendChart};

// Braille packs 2x4 dots into a cell
const DOTS_PER_COLUMN: f64 = 2.0;
const DOTS_PER_ROW: f64 = 4.0;
/// Chart-space width of one printed character.
pub const GLYPH_WIDTH: f64 = DOTS_PER_COLUMN;

const GRID_COLOR: Color = Color::Rgb(60, 60, 60);
const FILL_COLOR: Color = Color::Rgb(120, 50, 50);
const LINE_COLOR: Color = Color::Rgb(220, 9, 9);
const AVERAGE_COLOR: Color = Color::Rgb(70, 130, 220);

/// Drawable chart-space size of a terminal area.
pub fn chart_space(area: Rect) -> (f64, f64) {
    (
        f64::from(area.width) * DOTS_PER_COLUMN,
        f64::from(area.height) * DOTS_PER_ROW,
    )
}

/// One sample per whole dot column under `outline`, linearly interpolated.
pub fn fill_columns(outline: &[Point]) -> Vec<Point> {
    let mut columns = Vec::new();
    for pair in outline.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if b.x <= a.x {
            continue;
        }
        let mut x = a.x.ceil();
        while x < b.x {
            let t = (x - a.x) / (b.x - a.x);
            columns.push(Point::new(x, a.y + t * (b.y - a.y)));
            x += 1.0;
        }
    }
    if let Some(last) = outline.last() {
        columns.push(*last);
    }
    columns
}

// Chart space grows downwards, the canvas upwards
fn line(ctx: &mut Context, height: f64, from: &Point, to: &Point, color: Color) {
    ctx.draw(&CanvasLine::new(
        from.x,
        height - from.y,
        to.x,
        height - to.y,
        color,
    ));
}

fn paint(ctx: &mut Context, commands: &[DrawCommand], height: f64) {
    for command in commands {
        if let DrawCommand::Line {
            from,
            to,
            stroke: Stroke::Grid,
        } = command
        {
            line(ctx, height, from, to, GRID_COLOR);
        }
    }
    ctx.layer();

    for command in commands {
        if let DrawCommand::Fill { outline, baseline } = command {
            for column in fill_columns(outline) {
                line(ctx, height, &column, &Point::new(column.x, *baseline), FILL_COLOR);
            }
        }
    }
    ctx.layer();

    for command in commands {
        match command {
            DrawCommand::Polyline(points) => {
                for pair in points.windows(2) {
                    line(ctx, height, &pair[0], &pair[1], LINE_COLOR);
                }
            }
            DrawCommand::Line {
                from,
                to,
                stroke: Stroke::Average,
            } => line(ctx, height, from, to, AVERAGE_COLOR),
            _ => {}
        }
    }
    ctx.layer();

    for command in commands {
        if let DrawCommand::Label { at, text } = command {
            ctx.print(at.x.max(0.0), (height - at.y).max(0.0), text.clone().fg(AVERAGE_COLOR));
        }
    }
}

fn render_commands(f: &mut Frame, area: Rect, block: Block, commands: &[DrawCommand]) {
    let (width, height) = chart_space(block.inner(area));
    let canvas = Canvas::default()
        .block(block)
        .marker(Marker::Braille)
        .x_bounds([0.0, width])
        .y_bounds([0.0, height])
        .paint(|ctx| paint(ctx, commands, height));
    f.render_widget(canvas, area);
}

pub fn render_scrolling_chart(f: &mut Frame, area: Rect, chart: &mut ScrollingChart, block: Block) {
    let (width, height) = chart_space(block.inner(area));
    chart.fit(width, height);
    let commands = chart.draw(GLYPH_WIDTH);
    render_commands(f, area, block, &commands);
}

pub fn render_trend_chart(f: &mut Frame, area: Rect, chart: &mut TrendChart, block: Block) {
    let (width, height) = chart_space(block.inner(area));
    chart.fit(width, height);
    let commands = chart.draw(GLYPH_WIDTH);
    render_commands(f, area, block, &commands);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn braille_resolution() {
        assert_eq!(chart_space(Rect::new(0, 0, 40, 10)), (80.0, 40.0));
    }

    #[test]
    fn fill_covers_every_column() {
        let outline = [Point::new(0.0, 10.0), Point::new(4.0, 2.0)];
        let columns = fill_columns(&outline);
        let xs: Vec<f64> = columns.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(columns[2].y, 6.0);
    }
}
