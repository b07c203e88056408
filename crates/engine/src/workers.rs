//! Background worker threads: one drains the immutable memtable queue to
//! L0, the other runs compaction passes. Both are woken by a
//! [`WorkerMsg::Wake`] sent whenever there's new work (a roll, a flush) and
//! stop on [`WorkerMsg::Shutdown`] or when their channel disconnects.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;
use tracing::{error, warn};

use crate::{compaction, flush, Shared};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerMsg {
    Wake,
    Shutdown,
}

pub(crate) struct Workers {
    pub(crate) flush: JoinHandle<()>,
    pub(crate) compaction: JoinHandle<()>,
}

impl Workers {
    pub(crate) fn join(self) {
        if self.flush.join().is_err() {
            error!("flush worker thread panicked");
        }
        if self.compaction.join().is_err() {
            error!("compaction worker thread panicked");
        }
    }
}

pub(crate) fn spawn_flush_worker(shared: Arc<Shared>, rx: Receiver<WorkerMsg>) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("riptidekv-flush".into())
        .spawn(move || loop {
            match rx.recv() {
                Ok(WorkerMsg::Wake) => {
                    if let Err(e) = flush::drain_immutable_queue(&shared) {
                        warn!(error = %e, "flush worker pass failed, will retry on next wake");
                    }
                }
                Ok(WorkerMsg::Shutdown) | Err(_) => break,
            }
        })
        .expect("failed to spawn flush worker thread")
}

pub(crate) fn spawn_compaction_worker(shared: Arc<Shared>, rx: Receiver<WorkerMsg>) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("riptidekv-compaction".into())
        .spawn(move || loop {
            match rx.recv() {
                Ok(WorkerMsg::Wake) => {
                    if let Err(e) = compaction::drain(&shared) {
                        warn!(error = %e, "compaction worker pass failed, will retry on next wake");
                    }
                }
                Ok(WorkerMsg::Shutdown) | Err(_) => break,
            }
        })
        .expect("failed to spawn compaction worker thread")
}
