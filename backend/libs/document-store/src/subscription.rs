use crate::Document;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Handle to a live query.
///
/// Yields full result sets. Dropping the handle stops the background
/// listener.
pub struct Subscription {
    receiver: mpsc::Receiver<Vec<Document>>,
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Result sets buffered before the listener applies backpressure
    pub const BUFFER: usize = 16;

    pub(crate) fn new(receiver: mpsc::Receiver<Vec<Document>>, handle: JoinHandle<()>) -> Self {
        Self { receiver, handle }
    }

    /// Next full result set, or `None` once the listener has stopped
    pub async fn next(&mut self) -> Option<Vec<Document>> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}
