pub mod config;
pub mod emotion;
pub mod frame;
