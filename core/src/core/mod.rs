//! Core infrastructure: simulated time

pub mod time;
