pub mod commands;
pub mod config;
pub mod error;
pub mod http;
pub mod runtime;
pub mod task;

pub use error::{ClientError, ErrorKind};
pub use task::{AutoMlClient, TrainingService};
