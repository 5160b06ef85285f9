use std::sync::mpsc;

use super::state::{Phase, ResultCode};

/// Events emitted by the processing thread, in emission order.
///
/// They only signal that something happened; receivers re-read the
/// worker state for the authoritative values.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    /// A phase began; its step counter is 0.
    PhaseStarted { phase: Phase },
    /// A step of `phase` completed.
    Step { phase: Phase, step: usize },
    /// Quality scores were stored in the job.
    QualityDataReady,
    /// The thread is suspended until reference points are supplied.
    AwaitingReferencePoints,
    /// The thread has finished (completed, failed or aborted).
    Finished { result: ResultCode },
}

/// Sink for worker notifications; called from the processing thread.
pub trait ProgressNotifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Forwards notifications over an mpsc channel to the controlling thread.
pub struct ChannelNotifier {
    tx: mpsc::Sender<Notification>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::Sender<Notification>) -> Self {
        Self { tx }
    }

    /// Notifier plus the receiving end for the controller.
    pub fn channel() -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel();
        (Self::new(tx), rx)
    }
}

impl ProgressNotifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        // A dropped receiver means nobody is listening any more.
        let _ = self.tx.send(notification);
    }
}
