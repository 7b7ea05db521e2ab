pub mod big_number;
pub mod chart_canvas;
pub mod gauge;
