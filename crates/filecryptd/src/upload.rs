//! Upload staging and the blocking encryption job.
//!
//! Raw uploads land in `<data_dir>/temp/` under a collision-free name and are
//! removed once the request is done with them, whatever the outcome. The
//! encrypted artifact goes to `<data_dir>/uploads/<temp name>.enc`.

use filecrypt_core::{FilecryptError, FilecryptResult};
use filecrypt_crypto::{encrypt_with_password, KdfParams, ProcessorOptions};
use secrecy::SecretString;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const MAX_NAME_LEN: usize = 100;

/// A staged upload in the temp directory. Removed on `release` or drop.
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
    name: String,
    released: bool,
}

impl TempUpload {
    /// Create an empty staging file for an upload called `original_name`.
    pub async fn create(temp_dir: &Path, original_name: &str) -> FilecryptResult<(Self, tokio::fs::File)> {
        tokio::fs::create_dir_all(temp_dir).await?;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let id = uuid::Uuid::new_v4().simple().to_string();
        let name = format!("{millis}-{}-{}", &id[..12], sanitize_file_name(original_name));
        let path = temp_dir.join(&name);
        let file = tokio::fs::File::create(&path).await?;
        debug!(path = %path.display(), "staging upload");
        Ok((
            TempUpload {
                path,
                name,
                released: false,
            },
            file,
        ))
    }

    /// Append one body chunk to the staging file.
    pub async fn write_chunk(file: &mut tokio::fs::File, bytes: &[u8]) -> FilecryptResult<()> {
        file.write_all(bytes).await?;
        Ok(())
    }

    /// Flush and close the staging file before it is read back.
    pub async fn finish_writes(mut file: tokio::fs::File) -> FilecryptResult<()> {
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Delete the staging file now, logging instead of failing.
    pub async fn release(mut self) {
        self.released = true;
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            log_cleanup_failure(&self.path, e);
        }
    }
}

// Fallback for cancelled or panicking handlers; error paths call `release`.
impl Drop for TempUpload {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = std::fs::remove_file(&self.path) {
                log_cleanup_failure(&self.path, e);
            }
        }
    }
}

fn log_cleanup_failure(path: &Path, e: std::io::Error) {
    if e.kind() == std::io::ErrorKind::NotFound {
        return;
    }
    let err = FilecryptError::ResourceCleanupFailure(format!("{}: {e}", path.display()));
    warn!("{err}");
}

/// Keep `[A-Za-z0-9._-]`, replace the rest, and never start with a dot.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LEN)
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Encrypt `input` into the container file `output`.
///
/// Runs on a blocking thread. A partially written `output` is removed on
/// failure; the caller still owns the staged input.
pub fn encrypt_file(
    input: &Path,
    output: &Path,
    password: &SecretString,
    kdf: &KdfParams,
    options: ProcessorOptions,
) -> FilecryptResult<u64> {
    let result = write_container(input, output, password, kdf, options);
    if result.is_err() {
        if let Err(e) = std::fs::remove_file(output) {
            log_cleanup_failure(output, e);
        }
    }
    result
}

fn write_container(
    input: &Path,
    output: &Path,
    password: &SecretString,
    kdf: &KdfParams,
    options: ProcessorOptions,
) -> FilecryptResult<u64> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let source = File::open(input)?;
    let total_len = source.metadata()?.len();
    let mut writer = BufWriter::new(File::create(output)?);

    let written = encrypt_with_password(
        BufReader::new(source),
        &mut writer,
        total_len,
        password,
        kdf,
        options,
        |pct| debug!(progress = pct, file = %output.display(), "encrypting"),
    )?;

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| FilecryptError::Io(e.into_error()))?;
    file.sync_all()?;
    Ok(written)
}
