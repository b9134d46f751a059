pub mod config;
pub mod error;

pub use config::FilecryptConfig;
pub use error::{FilecryptError, FilecryptResult};
