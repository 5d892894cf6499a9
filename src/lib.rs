pub mod average;
pub mod comms;
pub mod config;
pub mod core;
pub mod engine;
pub mod observability;
pub mod recording;
