pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod outcome;
pub mod pipeline;
pub mod report;
pub mod sampler;
pub mod services;
pub mod util;
