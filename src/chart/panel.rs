//! Complete chart instances. Each one owns its statistics, axis and buffer, and
//! reads device/session info through an injected [`SessionView`].

use super::render::{ChartFrame, ChartRenderer, DrawCommand};
use super::series::{ScrollingSeries, TrendSeries};
use super::stats::RollingStats;
use super::{AutoRangingAxis, AVERAGE_WINDOW, RANGING_WINDOW};
use crate::heart_rate::session::{ConnectionState, SessionView};

pub struct ScrollingChart {
    session: SessionView,
    ranging: RollingStats,
    averaging: RollingStats,
    axis: AutoRangingAxis,
    series: ScrollingSeries,
}

impl ScrollingChart {
    pub fn new(session: SessionView, width: f64, height: f64) -> Self {
        Self {
            session,
            ranging: RollingStats::new(RANGING_WINDOW),
            averaging: RollingStats::new(AVERAGE_WINDOW),
            axis: AutoRangingAxis::new(),
            series: ScrollingSeries::new(width, height),
        }
    }

    pub fn add_value(&mut self, bpm: u16) {
        self.ranging.push(bpm);
        self.averaging.push(bpm);
        self.series.push(bpm);
    }

    /// One redraw step: ease the axis, then scroll.
    pub fn tick(&mut self) {
        if self.axis.update(&self.ranging) {
            self.series.relayout(self.axis.current());
        }
        self.series.advance(self.axis.current());
    }

    /// Resets the buffer if the drawable area changed.
    pub fn fit(&mut self, width: f64, height: f64) {
        if self.series.size() != (width, height) {
            self.series.resize(width, height);
        }
    }

    pub fn draw(&self, glyph_width: f64) -> Vec<DrawCommand> {
        let (width, height) = self.series.size();
        ChartRenderer::new(width, height, glyph_width).render(&ChartFrame {
            points: self.series.points(),
            max: self.axis.current(),
            average: self.averaging.average(),
            grid_offset: Some(self.series.grid_offset()),
        })
    }

    pub fn set_auto_range(&mut self, enabled: bool) {
        self.axis.set_enabled(enabled);
    }

    pub fn auto_range(&self) -> bool {
        self.axis.is_enabled()
    }

    pub fn axis_max(&self) -> f64 {
        self.axis.current()
    }

    pub fn average(&self) -> f64 {
        self.averaging.average()
    }

    pub fn series(&self) -> &ScrollingSeries {
        &self.series
    }

    pub fn reset(&mut self) {
        let (width, height) = self.series.size();
        self.ranging.reset();
        self.averaging.reset();
        let enabled = self.axis.is_enabled();
        self.axis = AutoRangingAxis::new();
        self.axis.set_enabled(enabled);
        self.series = ScrollingSeries::new(width, height);
    }

    pub fn device_name(&self) -> Option<String> {
        self.session.device_name()
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }
}

pub struct TrendChart {
    session: SessionView,
    averaging: RollingStats,
    axis: AutoRangingAxis,
    series: TrendSeries,
}

impl TrendChart {
    pub fn new(session: SessionView, width: f64, height: f64) -> Self {
        Self {
            session,
            averaging: RollingStats::new(AVERAGE_WINDOW),
            axis: AutoRangingAxis::new(),
            series: TrendSeries::new(width, height),
        }
    }

    pub fn add_value(&mut self, bpm: u16) {
        self.averaging.push(bpm);
        self.series.push(bpm);
    }

    pub fn tick(&mut self) {
        // The rolling average needs a few samples, fall back to the session mean until then
        let average = match self.averaging.average() {
            avg if avg > 0.0 => avg,
            _ => self.series.mean().unwrap_or(0.0),
        };
        self.axis
            .snap_trend(average, self.series.peak(), self.series.samples());
        self.series.relayout(self.axis.current());
    }

    pub fn fit(&mut self, width: f64, height: f64) {
        if self.series.size() != (width, height) {
            self.series.resize(width, height);
            self.series.relayout(self.axis.current());
        }
    }

    pub fn draw(&self, glyph_width: f64) -> Vec<DrawCommand> {
        let (width, height) = self.series.size();
        ChartRenderer::new(width, height, glyph_width).render(&ChartFrame {
            points: self.series.points(),
            max: self.axis.current(),
            average: self.averaging.average(),
            grid_offset: None,
        })
    }

    pub fn set_auto_range(&mut self, enabled: bool) {
        self.axis.set_enabled(enabled);
    }

    pub fn axis_max(&self) -> f64 {
        self.axis.current()
    }

    pub fn series(&self) -> &TrendSeries {
        &self.series
    }

    pub fn reset(&mut self) {
        let (width, height) = self.series.size();
        self.averaging.reset();
        self.series = TrendSeries::new(width, height);
        let enabled = self.axis.is_enabled();
        self.axis = AutoRangingAxis::new();
        self.axis.set_enabled(enabled);
    }

    pub fn device_name(&self) -> Option<String> {
        self.session.device_name()
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }
}
