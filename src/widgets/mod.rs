pub mod action_bar;
pub mod device_table;
pub mod heart_rate;
