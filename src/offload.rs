//! Background parsing with an inline fallback.
//!
//! Large uploads are handed to a dedicated worker thread. The request, and
//! with it the byte buffer, is moved through a channel rather than copied;
//! everything after that flows back as [`Envelope`]s on a second channel:
//! `ready`, any number of `progress`, then exactly one `result` or `error`.
//!
//! Small inputs, `inline_only` configs and failed spawns run the same
//! pipeline on the calling thread and push the same message sequence into
//! the same kind of channel, so a [`ParseHandle`] behaves identically either
//! way. The inline path reports one progress event per stage only.
//!
//! There is no cancellation. Callers that restart an upload should drop
//! messages whose request id fails [`ParseOffloader::is_current`].

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::{self, Receiver, Sender},
    },
    thread::{self, JoinHandle},
};

use log::{debug, info, warn};

use crate::{
    config::PipelineConfig,
    decode::FileKind,
    error::{PipelineError, PipelineResult},
    pipeline::{self, Ingested, Progress},
    schema::DataSchema,
};

const WORKER_THREAD_NAME: &str = "parse-worker";

#[derive(Debug, Clone)]
pub struct ParseRequest {
    pub file_bytes: Vec<u8>,
    pub file_name: String,
    pub file_kind: FileKind,
    /// Externally supplied schema; skips inference when present.
    pub schema: Option<DataSchema>,
}

impl ParseRequest {
    /// Resolves the file kind up front so unsupported input is rejected
    /// before anything is dispatched.
    pub fn from_upload(file_bytes: Vec<u8>, file_name: &str, mime: Option<&str>) -> PipelineResult<Self> {
        let file_kind = FileKind::detect(file_name, mime).ok_or_else(|| PipelineError::UnsupportedInput {
            file_name: file_name.to_string(),
        })?;
        Ok(Self {
            file_bytes,
            file_name: file_name.to_string(),
            file_kind,
            schema: None,
        })
    }

    pub fn with_schema(mut self, schema: Option<DataSchema>) -> Self {
        self.schema = schema;
        self
    }
}

#[derive(Debug)]
pub enum WorkerMessage {
    Ready,
    Progress(Progress),
    Result(Box<Ingested>),
    Error { message: String, stack: Option<String> },
}

#[derive(Debug)]
pub struct Envelope {
    pub request_id: u64,
    pub message: WorkerMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Worker,
    Inline,
}

#[derive(Debug, Default)]
pub struct ParseOffloader {
    config: PipelineConfig,
    latest: AtomicU64,
}

impl ParseOffloader {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            latest: AtomicU64::new(0),
        }
    }

    /// True while `request_id` belongs to the most recent dispatch.
    pub fn is_current(&self, request_id: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == request_id
    }

    pub fn dispatch(&self, request: ParseRequest) -> ParseHandle {
        let request_id = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let size = request.file_bytes.len();
        let offload = !self.config.offload.inline_only && size >= self.config.offload.threshold_bytes;
        if !offload {
            debug!("Parsing request {request_id} ({size} byte(s)) inline");
            return self.run_inline(request_id, request);
        }

        match spawn_worker(request_id, self.config.clone()) {
            Ok((requests, receiver, worker)) => {
                info!("Parsing request {request_id} ({size} byte(s)) on a worker thread");
                match requests.send(request) {
                    Ok(()) => ParseHandle {
                        request_id,
                        mode: ExecutionMode::Worker,
                        receiver,
                        worker: Some(worker),
                    },
                    Err(mpsc::SendError(request)) => {
                        warn!("Parse worker exited before accepting request {request_id}; parsing inline");
                        self.run_inline(request_id, request)
                    }
                }
            }
            Err(err) => {
                warn!("Unable to spawn parse worker ({err}); parsing inline");
                self.run_inline(request_id, request)
            }
        }
    }

    fn run_inline(&self, request_id: u64, request: ParseRequest) -> ParseHandle {
        let (sender, receiver) = mpsc::channel();
        let _ = sender.send(Envelope {
            request_id,
            message: WorkerMessage::Ready,
        });
        let mut last_stage = None;
        run_request(request_id, &self.config, request, &sender, |progress| {
            if last_stage == Some(progress.stage) {
                return false;
            }
            last_stage = Some(progress.stage);
            true
        });
        ParseHandle {
            request_id,
            mode: ExecutionMode::Inline,
            receiver,
            worker: None,
        }
    }
}

type WorkerChannels = (Sender<ParseRequest>, Receiver<Envelope>, JoinHandle<()>);

fn spawn_worker(request_id: u64, config: PipelineConfig) -> std::io::Result<WorkerChannels> {
    let (request_tx, request_rx) = mpsc::channel::<ParseRequest>();
    let (envelope_tx, envelope_rx) = mpsc::channel();
    let worker = thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || {
            let _ = envelope_tx.send(Envelope {
                request_id,
                message: WorkerMessage::Ready,
            });
            // One request per worker; the thread ends after posting its outcome.
            if let Ok(request) = request_rx.recv() {
                run_request(request_id, &config, request, &envelope_tx, |_| true);
            }
        })?;
    Ok((request_tx, envelope_rx, worker))
}

/// Emits the filtered progress events and the final outcome. Panics inside
/// the pipeline become an `error` message.
fn run_request<F>(
    request_id: u64,
    config: &PipelineConfig,
    request: ParseRequest,
    sender: &Sender<Envelope>,
    mut keep_progress: F,
) where
    F: FnMut(&Progress) -> bool,
{
    let post = |message| {
        if sender.send(Envelope { request_id, message }).is_err() {
            debug!("Dropping message for request {request_id}: receiver is gone");
        }
    };
    let ParseRequest {
        file_bytes,
        file_name,
        file_kind,
        schema,
    } = request;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        pipeline::ingest_as(
            file_kind,
            &file_bytes,
            &file_name,
            schema.as_ref(),
            config,
            |progress| {
                if keep_progress(&progress) {
                    post(WorkerMessage::Progress(progress));
                }
            },
        )
    }));

    let message = match outcome {
        Ok(Ok(ingested)) => WorkerMessage::Result(Box::new(ingested)),
        Ok(Err(err)) => WorkerMessage::Error {
            message: err.to_string(),
            stack: None,
        },
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!("Parsing '{file_name}' panicked: {message}");
            WorkerMessage::Error {
                message,
                stack: Some(format!("panicked while parsing '{file_name}' as {file_kind}")),
            }
        }
    };
    post(message);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "parse worker panicked".to_string()
    }
}

/// Receiving end of one dispatch.
#[derive(Debug)]
pub struct ParseHandle {
    request_id: u64,
    mode: ExecutionMode,
    receiver: Receiver<Envelope>,
    worker: Option<JoinHandle<()>>,
}

impl ParseHandle {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Blocks for the next message; `None` once the sender side has gone.
    pub fn recv(&self) -> Option<Envelope> {
        self.receiver.recv().ok()
    }

    /// Drains the channel until the outcome arrives, forwarding progress.
    pub fn wait<F>(mut self, mut on_progress: F) -> PipelineResult<Ingested>
    where
        F: FnMut(&Progress),
    {
        let outcome = loop {
            let Some(envelope) = self.recv() else {
                break Err(PipelineError::WorkerDisconnected);
            };
            match envelope.message {
                WorkerMessage::Ready => debug!("Request {} ready", envelope.request_id),
                WorkerMessage::Progress(progress) => {
                    debug!("Request {} {}: {}%", envelope.request_id, progress.stage, progress.percent);
                    on_progress(&progress);
                }
                WorkerMessage::Result(ingested) => break Ok(*ingested),
                WorkerMessage::Error { message, stack } => {
                    break Err(PipelineError::WorkerCrashed { message, stack });
                }
            }
        };
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("Parse worker for request {} did not exit cleanly", self.request_id);
        }
        outcome
    }
}
