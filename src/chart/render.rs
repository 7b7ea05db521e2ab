use super::series::Point;
use super::{normalize, GRID_SPACE, MOVE_STEP};

/// Distance between the average label and the chart's right edge and its line.
const LABEL_MARGIN: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stroke {
    Grid,
    Average,
}

/// One primitive, in chart space (origin top-left, y down).
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Line {
        from: Point,
        to: Point,
        stroke: Stroke,
    },
    /// Area between `outline` and the horizontal `baseline`.
    Fill { outline: Vec<Point>, baseline: f64 },
    Polyline(Vec<Point>),
    Label { at: Point, text: String },
}

/// What a chart hands over to be drawn.
#[derive(Debug, Clone, Copy)]
pub struct ChartFrame<'a> {
    pub points: &'a [Point],
    pub max: f64,
    /// 0 hides the average line.
    pub average: f64,
    /// `None` draws no grid at all.
    pub grid_offset: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartRenderer {
    width: f64,
    height: f64,
    glyph_width: f64,
}

impl ChartRenderer {
    /// `glyph_width` is how much horizontal chart space one label character takes.
    pub fn new(width: f64, height: f64, glyph_width: f64) -> Self {
        Self {
            width,
            height,
            glyph_width,
        }
    }

    pub fn render(&self, frame: &ChartFrame) -> Vec<DrawCommand> {
        let mut commands = Vec::new();
        if let Some(offset) = frame.grid_offset {
            self.grid(offset, &mut commands);
        }
        if frame.points.len() >= 2 {
            commands.push(DrawCommand::Fill {
                outline: frame.points.to_vec(),
                baseline: self.height,
            });
            commands.push(DrawCommand::Polyline(frame.points.to_vec()));
        }
        if frame.average > 0.0 {
            self.average(frame.average, frame.max, &mut commands);
        }
        commands
    }

    fn grid(&self, offset: u32, commands: &mut Vec<DrawCommand>) {
        let columns = (self.width / GRID_SPACE).ceil() as usize + 1;
        let shift = f64::from(offset) * MOVE_STEP;
        for i in 0..columns {
            let x = GRID_SPACE * i as f64 - shift;
            commands.push(DrawCommand::Line {
                from: Point::new(x, 0.0),
                to: Point::new(x, self.height),
                stroke: Stroke::Grid,
            });
        }
        let rows = (self.height / GRID_SPACE).floor() as usize + 1;
        for i in 0..rows {
            let y = GRID_SPACE * i as f64;
            commands.push(DrawCommand::Line {
                from: Point::new(0.0, y),
                to: Point::new(self.width, y),
                stroke: Stroke::Grid,
            });
        }
    }

    fn average(&self, average: f64, max: f64, commands: &mut Vec<DrawCommand>) {
        let y = normalize(average, max, self.height);
        commands.push(DrawCommand::Line {
            from: Point::new(0.0, y),
            to: Point::new(self.width, y),
            stroke: Stroke::Average,
        });
        let text = format!("avg {}", average.round_ties_even());
        let text_width = text.chars().count() as f64 * self.glyph_width;
        commands.push(DrawCommand::Label {
            at: Point::new(self.width - text_width - LABEL_MARGIN, y - LABEL_MARGIN),
            text,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(commands: &[DrawCommand], wanted: Stroke) -> Vec<(Point, Point)> {
        commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Line { from, to, stroke } if *stroke == wanted => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn grid_scrolls_with_offset() {
        let renderer = ChartRenderer::new(25.0, 20.0, 1.0);
        let frame = ChartFrame {
            points: &[],
            max: 200.0,
            average: 0.0,
            grid_offset: Some(3),
        };
        let commands = renderer.render(&frame);
        let grid = lines(&commands, Stroke::Grid);
        let verticals: Vec<f64> = grid
            .iter()
            .filter(|(from, to)| from.x == to.x)
            .map(|(from, _)| from.x)
            .collect();
        assert_eq!(verticals, vec![-3.0, 7.0, 17.0, 27.0]);
        let horizontals = grid.iter().filter(|(from, to)| from.y == to.y).count();
        assert_eq!(horizontals, 3);
        assert!(lines(&commands, Stroke::Average).is_empty());
    }

    #[test]
    fn average_line_and_label_placement() {
        let renderer = ChartRenderer::new(100.0, 100.0, 2.0);
        let points = [Point::new(0.0, 60.0), Point::new(100.0, 40.0)];
        let frame = ChartFrame {
            points: &points,
            max: 200.0,
            average: 73.4,
            grid_offset: None,
        };
        let commands = renderer.render(&frame);
        assert!(lines(&commands, Stroke::Grid).is_empty());
        assert!(matches!(&commands[0], DrawCommand::Fill { baseline, .. } if *baseline == 100.0));
        assert!(matches!(&commands[1], DrawCommand::Polyline(p) if p.len() == 2));

        // 73.4 / 200 * 100 = 36.7 -> 37
        let average = lines(&commands, Stroke::Average);
        assert_eq!(average, vec![(Point::new(0.0, 63.0), Point::new(100.0, 63.0))]);
        let label = commands.iter().find_map(|c| match c {
            DrawCommand::Label { at, text } => Some((*at, text.as_str())),
            _ => None,
        });
        // "avg 73" is 6 glyphs wide
        assert_eq!(label, Some((Point::new(83.0, 58.0), "avg 73")));
    }

    #[test]
    fn single_point_draws_no_line() {
        let renderer = ChartRenderer::new(10.0, 10.0, 1.0);
        let points = [Point::new(5.0, 5.0)];
        let frame = ChartFrame {
            points: &points,
            max: 200.0,
            average: 0.0,
            grid_offset: None,
        };
        assert!(renderer.render(&frame).is_empty());
    }
}
