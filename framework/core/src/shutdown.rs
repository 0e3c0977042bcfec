use futures::future::select_all;
use std::sync::Arc;
use tokio::sync::watch::{self, Receiver, Sender};

/// A handle that can be used to signal a shutdown to any number of listeners.
///
/// The signal is latched. Once [ShutdownHandle::shutdown] has been called, every listener created
/// before or after that point reports that it should shut down.
///
/// A handle can have a parent, see [ShutdownHandle::new_child]. Listeners of the child are
/// signalled when either the child or any of its ancestors is shut down.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<Sender<bool>>,
    parent: Option<Box<ShutdownHandle>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: Arc::new(watch::channel(false).0),
            parent: None,
        }
    }

    /// Create a handle that is shut down together with this one, but which can also be shut down
    /// on its own without affecting this handle.
    pub fn new_child(&self) -> Self {
        Self {
            sender: Arc::new(watch::channel(false).0),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn shutdown(&self) {
        let was_shutdown = self.sender.send_replace(true);
        if !was_shutdown {
            log::trace!("Shutdown signal sent");
        }
    }

    /// Whether this handle, or any of its ancestors, has been shut down.
    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow() || self.parent.as_ref().is_some_and(|p| p.is_shutdown())
    }

    pub fn new_listener(&self) -> DelegatedShutdownListener {
        let mut receivers = Vec::new();
        let mut current = Some(self);
        while let Some(handle) = current {
            receivers.push(handle.sender.subscribe());
            current = handle.parent.as_deref();
        }

        DelegatedShutdownListener::new(receivers)
    }
}

#[derive(Clone, Debug)]
pub struct DelegatedShutdownListener {
    receivers: Vec<Receiver<bool>>,
}

impl DelegatedShutdownListener {
    pub(crate) fn new(receivers: Vec<Receiver<bool>>) -> Self {
        Self { receivers }
    }

    /// Point in time check if the shutdown signal has been received. If this returns true then work
    /// should be stopped so that the scenario can shut down.
    pub fn should_shutdown(&self) -> bool {
        self.receivers.iter().any(|r| *r.borrow())
    }

    /// Wait for the shutdown signal to be received. It is safe to race this with another future
    /// so that the shutdown signal can be used to cancel other work in progress.
    pub async fn wait_for_shutdown(&mut self) {
        loop {
            if self.should_shutdown() {
                return;
            }

            let (changed, _, _) =
                select_all(self.receivers.iter_mut().map(|r| Box::pin(r.changed()))).await;

            // A closed channel means its handle is gone, nothing can signal it anymore except by
            // dropping, which is treated as a shutdown.
            if changed.is_err() {
                return;
            }
        }
    }
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct ShutdownSignalError {
    msg: String,
}

impl Default for ShutdownSignalError {
    fn default() -> Self {
        Self {
            msg: "Execution cancelled by shutdown signal".to_string(),
        }
    }
}
