//! Download progress sources.
//!
//! The lifecycle manager polls a [`ProgressSource`] once per tick and never
//! cares whether the bytes are real. [`SimulatedTransfers`] advances by a
//! fixed step; [`ChannelTransfers`] relays whatever a real transfer task
//! sends.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// One observation of a transfer.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressPoll {
    /// Percent complete so far.
    Progress(f32),
    Done,
    Failed(String),
}

/// A single in-flight transfer.
pub trait ProgressSource: Send {
    fn poll(&mut self) -> ProgressPoll;
}

/// Opens a fresh progress source for each download.
pub trait ProgressSourceFactory: Send + Sync {
    fn open(&self, model_id: &str) -> Box<dyn ProgressSource>;
}

/// Fake transfer advancing by `step` percent per poll.
pub struct SimulatedTransfer {
    progress: f32,
    step: f32,
    fail_at: Option<f32>,
}

impl SimulatedTransfer {
    pub fn new(step: f32) -> Self {
        Self {
            progress: 0.0,
            step,
            fail_at: None,
        }
    }

    /// Make the transfer fail once it reaches `percent`.
    pub fn failing_at(mut self, percent: f32) -> Self {
        self.fail_at = Some(percent);
        self
    }
}

impl ProgressSource for SimulatedTransfer {
    fn poll(&mut self) -> ProgressPoll {
        if self.progress >= 100.0 {
            return ProgressPoll::Done;
        }
        self.progress = (self.progress + self.step).min(100.0);
        match self.fail_at {
            Some(at) if self.progress >= at => {
                ProgressPoll::Failed(format!("Transfer interrupted at {:.0}%", self.progress))
            }
            _ => ProgressPoll::Progress(self.progress),
        }
    }
}

/// Factory for simulated transfers, with optional per-model failures.
pub struct SimulatedTransfers {
    step: f32,
    failures: Mutex<HashMap<String, f32>>,
}

impl SimulatedTransfers {
    pub fn new(step: f32) -> Self {
        Self {
            step,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// The next download of `model_id` fails at `percent`.
    pub fn fail_next(&self, model_id: &str, percent: f32) {
        self.failures.lock().insert(model_id.to_string(), percent);
    }
}

impl ProgressSourceFactory for SimulatedTransfers {
    fn open(&self, model_id: &str) -> Box<dyn ProgressSource> {
        let transfer = SimulatedTransfer::new(self.step);
        match self.failures.lock().remove(model_id) {
            Some(at) => Box::new(transfer.failing_at(at)),
            None => Box::new(transfer),
        }
    }
}

/// Progress relayed over a channel from an external transfer task.
pub struct ChannelTransfer {
    rx: mpsc::UnboundedReceiver<ProgressPoll>,
    last: f32,
}

impl ProgressSource for ChannelTransfer {
    fn poll(&mut self) -> ProgressPoll {
        match self.rx.try_recv() {
            Ok(ProgressPoll::Progress(p)) => {
                self.last = p;
                ProgressPoll::Progress(p)
            }
            Ok(terminal) => terminal,
            Err(mpsc::error::TryRecvError::Empty) => ProgressPoll::Progress(self.last),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                ProgressPoll::Failed("Transfer ended without completing".to_string())
            }
        }
    }
}

/// Factory handing out channel-backed sources.
///
/// Register a model before starting its download and drive the returned
/// sender from the real transfer.
#[derive(Default)]
pub struct ChannelTransfers {
    pending: Mutex<HashMap<String, mpsc::UnboundedReceiver<ProgressPoll>>>,
}

impl ChannelTransfers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, model_id: &str) -> mpsc::UnboundedSender<ProgressPoll> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.pending.lock().insert(model_id.to_string(), rx);
        tx
    }
}

impl ProgressSourceFactory for ChannelTransfers {
    fn open(&self, model_id: &str) -> Box<dyn ProgressSource> {
        let rx = match self.pending.lock().remove(model_id) {
            Some(rx) => rx,
            None => {
                // Nothing registered: a closed channel fails on first poll.
                let (_, rx) = mpsc::unbounded_channel();
                rx
            }
        };
        Box::new(ChannelTransfer { rx, last: 0.0 })
    }
}
