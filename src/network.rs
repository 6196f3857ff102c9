//! Asynchronous network dispatch over a fixed worker pool, grounded on the
//! original implementation's `networking/network_thread.py`: a bounded pool
//! of workers pulls jobs off a shared queue so page loads, stylesheet and
//! script fetches, and XHRs never block the tab's main thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::BrowserError;
use crate::http::Response;
use crate::services::Services;
use crate::url::Url;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestType {
    PageLoad,
    Stylesheet,
    Script,
    Xhr,
    Image,
}

pub struct NetworkResponse {
    pub request_id: u64,
    pub request_type: RequestType,
    pub url: Url,
    pub result: Result<Response, String>,
}

type Job = Box<dyn FnOnce() + Send>;

/// Fixed-size worker pool plus a request-id counter.
pub struct NetworkDispatcher {
    job_tx: Sender<Job>,
    next_id: AtomicU64,
    workers: Vec<thread::JoinHandle<()>>,
}

impl NetworkDispatcher {
    pub fn new(worker_count: usize) -> Self {
        let (job_tx, job_rx): (Sender<Job>, Receiver<Job>) = unbounded();
        let mut workers = Vec::with_capacity(worker_count.max(1));

        for idx in 0..worker_count.max(1) {
            let job_rx = job_rx.clone();
            let handle = thread::Builder::new()
                .name(format!("net-worker-{idx}"))
                .spawn(move || {
                    for job in job_rx.iter() {
                        job();
                    }
                })
                .expect("spawn network worker");
            workers.push(handle);
        }

        Self { job_tx, next_id: AtomicU64::new(1), workers }
    }

    pub fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Queues a fetch; `request_type` is carried through for the caller's
    /// own bookkeeping (stylesheet vs. script vs. XHR completions are all
    /// routed back through the same `NetworkResponse` shape).
    pub fn dispatch(
        self: &Arc<Self>,
        services: &Arc<Services>,
        url: Url,
        request_type: RequestType,
        referrer: Option<Url>,
        payload: Option<String>,
    ) -> Receiver<NetworkResponse> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let request_id = self.next_request_id();
        let services = services.clone();

        let job: Job = Box::new(move || {
            let _span = tracing::info_span!("network_fetch", %url, ?request_type).entered();
            let result = url.request(&services, referrer.as_ref(), payload.as_deref()).map_err(|e| e.to_string());
            let _ = tx.send(NetworkResponse { request_id, request_type, url, result });
        });
        let _ = self.job_tx.send(job);
        rx
    }

    /// Blocking convenience wrapper used for the initial synchronous page
    /// load, mirroring `request_sync` in the original implementation.
    pub fn request_sync(
        self: &Arc<Self>,
        services: &Arc<Services>,
        url: Url,
        request_type: RequestType,
        referrer: Option<Url>,
        payload: Option<String>,
    ) -> Result<Response, BrowserError> {
        let rx = self.dispatch(services, url, request_type, referrer, payload);
        let response = rx.recv().map_err(|_| BrowserError::Network("network worker dropped reply channel".into()))?;
        response.result.map_err(BrowserError::Network)
    }

    pub fn shutdown(&self) {
        for _ in &self.workers {
            let _ = self.job_tx.send(Box::new(|| {}));
        }
    }
}
