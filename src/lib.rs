pub mod api;
pub mod artifact;
pub mod config;
pub mod course;
pub mod engine;
pub mod enrollment;
pub mod error;
pub mod progress;
pub mod step;
pub mod student;
pub mod utils;
