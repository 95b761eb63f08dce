pub mod calibration;
pub mod deembed;
