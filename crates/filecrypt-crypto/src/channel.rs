//! Off-thread client-path operations with a progress event stream
//!
//! A [`StreamChannel`] runs one encrypt or decrypt on the tokio blocking pool
//! and reports back over a bounded mpsc channel:
//!
//! ```text
//! Progress(n)* → Success { data } | Failure { error }
//! ```
//!
//! Exactly one terminal event is delivered per channel. After it, `recv`
//! returns `None` and the background task has already been joined, so a
//! fresh channel is needed for every operation.

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::keys::Key;
use crate::pipeline::{decrypt_with_key, encrypt_with_key};
use crate::processor::ProcessorOptions;

const EVENT_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Encrypt,
    Decrypt,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Encrypt => f.write_str("encrypt"),
            Operation::Decrypt => f.write_str("decrypt"),
        }
    }
}

/// One-shot work item handed to the background context.
#[derive(Debug)]
pub struct ChannelRequest {
    pub operation: Operation,
    /// Carried through to the terminal event for history collaborators
    pub file_name: Option<String>,
    pub input: Vec<u8>,
    pub key: Key,
}

/// Messages emitted by a [`StreamChannel`].
///
/// Serializes to the browser-worker message shapes:
/// `{ isProgressUpdate, progress }`, `{ success: true, data, progress: 100 }`
/// and `{ success: false, error }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Progress(u8),
    Success {
        operation: Operation,
        file_name: Option<String>,
        data: Vec<u8>,
    },
    Failure {
        operation: Operation,
        file_name: Option<String>,
        error: String,
    },
}

impl ChannelEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChannelEvent::Progress(_))
    }
}

impl Serialize for ChannelEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ChannelEvent::Progress(progress) => {
                let mut s = serializer.serialize_struct("ProgressEvent", 2)?;
                s.serialize_field("isProgressUpdate", &true)?;
                s.serialize_field("progress", progress)?;
                s.end()
            }
            ChannelEvent::Success {
                operation,
                file_name,
                data,
            } => {
                let mut s = serializer.serialize_struct("SuccessEvent", 5)?;
                s.serialize_field("success", &true)?;
                s.serialize_field("data", data)?;
                s.serialize_field("progress", &100u8)?;
                s.serialize_field("operation", operation)?;
                s.serialize_field("fileName", file_name)?;
                s.end()
            }
            ChannelEvent::Failure {
                operation,
                file_name,
                error,
            } => {
                let mut s = serializer.serialize_struct("FailureEvent", 4)?;
                s.serialize_field("success", &false)?;
                s.serialize_field("error", error)?;
                s.serialize_field("operation", operation)?;
                s.serialize_field("fileName", file_name)?;
                s.end()
            }
        }
    }
}

/// Handle to one in-flight operation.
pub struct StreamChannel {
    operation: Operation,
    file_name: Option<String>,
    rx: mpsc::Receiver<ChannelEvent>,
    task: Option<JoinHandle<()>>,
    done: bool,
}

impl StreamChannel {
    /// Start `request` on the blocking pool. Must be called within a tokio runtime.
    pub fn spawn(request: ChannelRequest, options: ProcessorOptions) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let operation = request.operation;
        let file_name = request.file_name.clone();

        let task = tokio::task::spawn_blocking(move || {
            let terminal = execute(request, options, &tx);
            if tx.blocking_send(terminal).is_err() {
                debug!("channel receiver dropped before terminal event");
            }
        });

        Self {
            operation,
            file_name,
            rx,
            task: Some(task),
            done: false,
        }
    }

    /// Next event, or `None` once the terminal event has been delivered.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        if self.done {
            return None;
        }
        match self.rx.recv().await {
            Some(event) => {
                if event.is_terminal() {
                    self.done = true;
                    self.join().await;
                }
                Some(event)
            }
            None => {
                // Sender dropped without a terminal event: the worker panicked
                self.done = true;
                self.join().await;
                Some(ChannelEvent::Failure {
                    operation: self.operation,
                    file_name: self.file_name.clone(),
                    error: "background task terminated unexpectedly".into(),
                })
            }
        }
    }

    /// Consume the channel as a `Stream` with the same guarantees as `recv`:
    /// exactly one terminal event, last. Must be called within a tokio runtime.
    pub fn into_stream(mut self) -> ReceiverStream<ChannelEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(async move {
            while let Some(event) = self.recv().await {
                if tx.send(event).await.is_err() {
                    debug!("event stream dropped before terminal event");
                    break;
                }
            }
        });
        ReceiverStream::new(rx)
    }

    /// Drive the channel to completion, forwarding progress to `on_progress`.
    pub async fn finish<F>(mut self, mut on_progress: F) -> Result<Vec<u8>, String>
    where
        F: FnMut(u8),
    {
        while let Some(event) = self.recv().await {
            match event {
                ChannelEvent::Progress(p) => on_progress(p),
                ChannelEvent::Success { data, .. } => {
                    on_progress(100);
                    return Ok(data);
                }
                ChannelEvent::Failure { error, .. } => return Err(error),
            }
        }
        Err("channel closed without a result".into())
    }

    async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(operation = %self.operation, "channel task failed: {e}");
            }
        }
    }
}

fn execute(
    request: ChannelRequest,
    options: ProcessorOptions,
    tx: &mpsc::Sender<ChannelEvent>,
) -> ChannelEvent {
    let ChannelRequest {
        operation,
        file_name,
        input,
        key,
    } = request;

    // 100 is carried by the terminal event itself
    let progress = |p: u8| {
        if p < 100 {
            let _ = tx.blocking_send(ChannelEvent::Progress(p));
        }
    };

    let result = match operation {
        Operation::Encrypt => encrypt_with_key(&input, &key, options, progress),
        Operation::Decrypt => decrypt_with_key(&input, &key, options, progress),
    };

    match result {
        Ok(data) => {
            info!(
                %operation,
                file = file_name.as_deref().unwrap_or("-"),
                bytes_in = input.len(),
                bytes_out = data.len(),
                "operation complete"
            );
            ChannelEvent::Success {
                operation,
                file_name,
                data,
            }
        }
        Err(e) => {
            warn!(
                %operation,
                file = file_name.as_deref().unwrap_or("-"),
                error = %e,
                "operation failed"
            );
            ChannelEvent::Failure {
                operation,
                file_name,
                error: e.to_string(),
            }
        }
    }
}
