pub mod config;
pub mod detectors;
pub mod epoch;
pub mod error;
pub mod filter;
pub mod io;
pub mod pipeline;
pub mod signal;
pub mod synth;

pub use config::*;
pub use epoch::*;
pub use error::PipelineError;
pub use signal::*;
