//! The two worker pools behind every mount.
//!
//! Decode work runs on a small fixed IO pool whose threads keep their own
//! decoder handles alive between jobs (seeking a container is cheap once
//! the handle exists). Rendering runs on a shared rayon pool sized to the
//! machine.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of IO worker threads fed from one queue.
pub struct IoPool {
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl IoPool {
    pub fn new(workers: usize) -> IoPool {
        assert!(workers > 0, "IO pool needs at least one worker");

        let (tx, rx) = channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..workers)
            .map(|i| {
                let rx = Arc::clone(&rx);
                std::thread::Builder::new()
                    .name(format!("io-worker-{i}"))
                    .spawn(move || worker_loop(rx))
                    .expect("spawn IO worker")
            })
            .collect();

        IoPool {
            tx: Some(tx),
            workers,
        }
    }

    /// Queue a job; it runs on whichever worker frees up first.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        if let Some(tx) = &self.tx {
            // Send only fails when the pool is shutting down; jobs arriving
            // then are dropped with the queue
            let _ = tx.send(Box::new(job));
        }
    }
}

fn worker_loop(rx: Arc<Mutex<Receiver<Job>>>) {
    loop {
        let job = {
            let guard = rx.lock();
            guard.recv()
        };
        match job {
            Ok(job) => job(),
            Err(_) => break,
        }
    }
    debug!("IO worker exiting");
}

impl Drop for IoPool {
    fn drop(&mut self) {
        self.tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

/// The pools plus the shared cache, handed to every ingest.
#[derive(Clone)]
pub struct MountEnv {
    pub io: Arc<IoPool>,
    pub processing: Arc<rayon::ThreadPool>,
    pub cache: Arc<crate::cache::FrameCache>,
    /// Include the `desktop.ini` shell-support entry in listings.
    pub desktop_ini: bool,
}
