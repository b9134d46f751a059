//! filecryptd: upload-and-encrypt HTTP server
//!
//! ```text
//!   POST /api/encrypt (multipart: file, password)
//!        │  stream body → <data_dir>/temp/<millis>-<id>-<name>
//!        ▼
//!   spawn_blocking: Argon2id(password, salt) → AES-256-CBC
//!        │  salt || iv || ciphertext → <data_dir>/uploads/<name>.enc
//!        ▼
//!   { message, downloadUrl }     GET /api/downloads/{name}
//! ```

pub mod error;
pub mod metrics;
pub mod server;
pub mod upload;

pub use error::{ApiError, ApiResult};
pub use server::{router, serve, AppState};
