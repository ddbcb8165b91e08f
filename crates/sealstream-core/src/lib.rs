pub mod config;
pub mod error;

pub use config::SealstreamConfig;
pub use error::{SealstreamError, SealstreamResult, StreamError, StreamResult};
