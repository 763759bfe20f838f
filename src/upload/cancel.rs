use tokio::sync::watch;

/// Owner side of a cooperative cancellation flag.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

/// Observer side, cloned into every flow that should stop on cancel.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    receiver: Option<watch::Receiver<bool>>,
}

impl CancelHandle {
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (sender, receiver) = watch::channel(false);
        (
            CancelHandle { sender },
            CancelSignal {
                receiver: Some(receiver),
            },
        )
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        CancelSignal { receiver: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.receiver.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once cancelled. Dropping the handle counts as cancelling:
    /// whoever owned the upload is gone.
    pub async fn cancelled(&self) {
        match &self.receiver {
            Some(receiver) => {
                let mut receiver = receiver.clone();
                let _ = receiver.wait_for(|cancelled| *cancelled).await;
            }
            None => futures::future::pending::<()>().await,
        }
    }
}
