use std::{future::Future, sync::Arc};

use tokio::sync::watch;

/// Cooperative cancellation signal, shared by every suspension point of the relayer.
#[derive(Debug, Clone)]
pub struct Shutdown {
    receiver: watch::Receiver<bool>,
    // Only set by `never`, so that the channel stays open.
    _sender: Option<Arc<watch::Sender<bool>>>,
}

/// Handle used to request a [Shutdown].
#[derive(Debug)]
pub struct ShutdownTrigger {
    sender: watch::Sender<bool>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (sender, receiver) = watch::channel(false);
    (
        ShutdownTrigger { sender },
        Shutdown {
            receiver,
            _sender: None,
        },
    )
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // Nobody listening means nobody left to stop.
        let _ = self.sender.send(true);
    }
}

impl Shutdown {
    /// A signal which never fires.
    pub fn never() -> Self {
        let (sender, receiver) = watch::channel(false);
        Shutdown {
            receiver,
            _sender: Some(Arc::new(sender)),
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once shutdown has been requested. Also resolves if the trigger was dropped.
    pub async fn triggered(&mut self) {
        let _ = self.receiver.wait_for(|stop| *stop).await;
    }

    /// Drive `fut` to completion unless shutdown is requested first, in which case `fut` is dropped
    /// and `None` is returned.
    pub async fn run_until<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        if self.is_triggered() {
            return None;
        }
        tokio::select! {
            output = fut => Some(output),
            _ = self.triggered() => None,
        }
    }
}
