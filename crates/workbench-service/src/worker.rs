//! Background request worker and the framed stream server.
//!
//! ```text
//!  reader ──► MessageCodec ──► Worker::submit ──┬─ Interrupt ──► LanguageService::interrupt
//!                                               │                (caller thread, no queue)
//!                                               └─ queue ──► worker thread ──► handle
//!                                                                                │
//!  writer ◄── MessageCodec ◄── writer thread ◄── responses ◄─────────────────────┘
//! ```
//!
//! Requests run one at a time in arrival order. Interrupts skip the queue so a long parse can
//! be stopped while later requests wait behind it. An interrupt also drops the `Process` and
//! `CodeComplete` requests of its endpoint that were queued before it.

use crate::codec::{CodecError, MessageCodec};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use workbench_core::{
    EndPointIdentity, LanguageService, LanguageServiceRequest, LanguageServiceResponse,
    ResponseSink,
};

/// Stack size of the worker thread. Parses recurse once per nested grammar rule.
const WORKER_STACK_SIZE: usize = 8 * 1024 * 1024;

/// Errors submitting work.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The worker thread is gone.
    #[error("worker has stopped")]
    Stopped,
}

/// Interrupt counts per endpoint.
///
/// A queued request remembers the count of its endpoint at submit time; a later interrupt
/// raises the count and so marks the request stale.
#[derive(Debug, Default)]
struct Interrupts {
    counts: Mutex<HashMap<EndPointIdentity, u64>>,
}

impl Interrupts {
    fn current(&self, endpoint: &EndPointIdentity) -> u64 {
        self.counts.lock().get(endpoint).copied().unwrap_or(0)
    }

    fn record(&self, endpoint: &EndPointIdentity) {
        *self.counts.lock().entry(endpoint.clone()).or_insert(0) += 1;
    }
}

/// A request waiting for the worker thread.
struct Queued {
    request: LanguageServiceRequest,
    /// Interrupt count of the request's endpoint when it was submitted.
    interrupts: u64,
}

impl Queued {
    /// Whether an interrupt for the endpoint arrived after this request was submitted.
    fn is_superseded(&self, interrupts: &Interrupts) -> bool {
        matches!(
            self.request,
            LanguageServiceRequest::Process { .. } | LanguageServiceRequest::CodeComplete { .. }
        ) && interrupts.current(self.request.endpoint()) > self.interrupts
    }
}

/// Runs [`LanguageService`] requests on a dedicated thread.
///
/// Every endpoint that sends a request gets the worker's outbound sink as its response
/// listener, so all responses arrive on the one channel given to [`Worker::spawn`].
pub struct Worker {
    service: Arc<LanguageService>,
    interrupts: Arc<Interrupts>,
    queue: Option<Sender<Queued>>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    /// Start the worker thread.
    pub fn spawn(service: LanguageService, responses: Sender<LanguageServiceResponse>) -> Self {
        let service = Arc::new(service);
        let interrupts = Arc::new(Interrupts::default());
        let (queue, requests) = mpsc::channel();
        let sink: Arc<dyn ResponseSink> = Arc::new(responses);
        let thread = {
            let service = service.clone();
            let interrupts = interrupts.clone();
            thread::Builder::new()
                .name("workbench-worker".to_string())
                .stack_size(WORKER_STACK_SIZE)
                .spawn(move || run(&service, &interrupts, requests, sink))
        };
        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::error!(error = %err, "failed to start worker thread");
                None
            }
        };
        Self {
            service,
            interrupts,
            queue: thread.as_ref().map(|_| queue),
            thread,
        }
    }

    /// The service requests run against.
    pub fn service(&self) -> &Arc<LanguageService> {
        &self.service
    }

    /// Queue a request. Interrupts are applied immediately on the calling thread.
    pub fn submit(&self, request: LanguageServiceRequest) -> Result<(), WorkerError> {
        if let LanguageServiceRequest::Interrupt {
            endpoint, reason, ..
        } = &request
        {
            self.interrupts.record(endpoint);
            let cancelled = self.service.interrupt(endpoint, reason);
            tracing::debug!(endpoint = %endpoint, %reason, cancelled, "interrupt");
            return Ok(());
        }
        let queued = Queued {
            interrupts: self.interrupts.current(request.endpoint()),
            request,
        };
        self.queue
            .as_ref()
            .ok_or(WorkerError::Stopped)?
            .send(queued)
            .map_err(|_| WorkerError::Stopped)
    }

    /// Finish every queued request and stop the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.queue = None;
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::error!("worker thread panicked");
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    service: &LanguageService,
    interrupts: &Interrupts,
    requests: Receiver<Queued>,
    sink: Arc<dyn ResponseSink>,
) {
    for queued in requests {
        if queued.is_superseded(interrupts) {
            tracing::debug!(
                endpoint = %queued.request.endpoint(),
                "dropping request queued before an interrupt"
            );
            continue;
        }
        let request = queued.request;
        let endpoint = request.endpoint().clone();
        let deleting = matches!(request, LanguageServiceRequest::ProcessorDelete { .. });
        if !deleting && service.sessions().get(&endpoint).is_none() {
            service.add_response_listener(&endpoint, sink.clone());
        }
        tracing::trace!(endpoint = %endpoint, "handling request");
        service.handle(request);
    }
    tracing::debug!("request queue closed");
}

/// Serve framed requests from `reader`, writing framed responses to `writer`.
///
/// Returns when `reader` ends (after every queued request has been answered) or when the
/// stream can no longer be read or written. Bodies that are not valid requests are logged and
/// skipped.
pub fn serve<R, W>(
    service: LanguageService,
    codec: &MessageCodec,
    mut reader: R,
    writer: &mut W,
) -> Result<(), CodecError>
where
    R: BufRead,
    W: Write + Send,
{
    let (responses, outbound) = mpsc::channel::<LanguageServiceResponse>();

    thread::scope(|scope| {
        let written = scope.spawn(move || -> Result<(), CodecError> {
            for response in outbound {
                codec.write(writer, &response)?;
            }
            Ok(())
        });

        let worker = Worker::spawn(service, responses);
        let read = read_requests(codec, &mut reader, &worker);
        // Dropping the worker drops the service and with it every sender.
        worker.shutdown();

        let written = match written.join() {
            Ok(result) => result,
            Err(_) => Err(CodecError::Framing("writer thread panicked".to_string())),
        };
        read.and(written)
    })
}

fn read_requests<R: BufRead>(
    codec: &MessageCodec,
    reader: &mut R,
    worker: &Worker,
) -> Result<(), CodecError> {
    loop {
        match codec.read::<_, LanguageServiceRequest>(reader) {
            Ok(Some(request)) => {
                if worker.submit(request).is_err() {
                    tracing::error!("worker stopped, closing stream");
                    return Ok(());
                }
            }
            Ok(None) => {
                tracing::debug!("input closed");
                return Ok(());
            }
            Err(err) if err.is_recoverable() => {
                tracing::warn!(error = %err, "skipping invalid request");
            }
            Err(err) => {
                tracing::error!(error = %err, "cannot read requests");
                return Err(err);
            }
        }
    }
}
