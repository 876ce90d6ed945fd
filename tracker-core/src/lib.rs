#![no_std]

pub mod alerts;
pub mod audio;
pub mod commands;
pub mod config;
pub mod drivers;
pub mod gps;
pub mod input;
pub mod mode;
pub mod sleep;
pub mod state;
pub mod telemetry;
pub mod time;
