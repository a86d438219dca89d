//! Background renderer
//!
//! Runs the renderer on its own thread so a slow server never blocks the
//! frame loop. Requests carry increasing ids; when several queue up only
//! the newest is rendered, and results older than the newest request are
//! dropped on receipt.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use super::{RenderError, Renderer};

struct RenderRequest {
    id: u64,
    source: String,
}

/// Outcome of one render request
#[derive(Debug, Clone)]
pub struct RenderResult {
    pub id: u64,
    pub svg: Result<Vec<u8>, RenderError>,
}

pub struct RenderWorker {
    /// Handle to the background thread
    thread_handle: Option<JoinHandle<()>>,
    /// Closing this channel stops the thread
    request_tx: Option<mpsc::Sender<RenderRequest>>,
    result_rx: mpsc::Receiver<RenderResult>,
    next_id: u64,
}

impl RenderWorker {
    /// Create and start a new worker around `renderer`
    pub fn spawn<R: Renderer>(renderer: R) -> Self {
        let (request_tx, request_rx) = mpsc::channel();
        let (result_tx, result_rx) = mpsc::channel();

        let thread_handle = thread::spawn(move || worker_thread(renderer, request_rx, result_tx));

        Self {
            thread_handle: Some(thread_handle),
            request_tx: Some(request_tx),
            result_rx,
            next_id: 0,
        }
    }

    /// Queues `source` for rendering and returns the request id
    pub fn request(&mut self, source: String) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        let sent = self
            .request_tx
            .as_ref()
            .map(|tx| tx.send(RenderRequest { id, source }).is_ok())
            .unwrap_or(false);
        if !sent {
            log::warn!("Render worker is gone; request {} dropped", id);
        }
        id
    }

    /// Newest finished result that is not stale, if any arrived
    pub fn poll(&self) -> Option<RenderResult> {
        let mut newest = None;
        while let Ok(result) = self.result_rx.try_recv() {
            newest = Some(result);
        }
        newest.filter(|r| r.id == self.next_id)
    }

    /// Blocks until the current request finishes; used by tests and the CLI
    pub fn wait(&self) -> RenderResult {
        loop {
            match self.result_rx.recv() {
                Ok(result) if result.id == self.next_id => return result,
                Ok(_) => continue,
                Err(_) => {
                    return RenderResult {
                        id: self.next_id,
                        svg: Err(RenderError::Stopped),
                    }
                }
            }
        }
    }
}

impl Drop for RenderWorker {
    fn drop(&mut self) {
        // Closing the channel ends the thread's receive loop
        self.request_tx.take();
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

fn worker_thread<R: Renderer>(
    renderer: R,
    request_rx: mpsc::Receiver<RenderRequest>,
    result_tx: mpsc::Sender<RenderResult>,
) {
    while let Ok(mut request) = request_rx.recv() {
        // Skip to the newest queued request
        while let Ok(newer) = request_rx.try_recv() {
            request = newer;
        }

        let svg = renderer.render_svg(&request.source);
        if let Err(e) = &svg {
            log::warn!("Render request {} failed: {}", request.id, e);
        }
        if result_tx
            .send(RenderResult {
                id: request.id,
                svg,
            })
            .is_err()
        {
            return;
        }
    }
    log::debug!("Render worker stopped");
}
