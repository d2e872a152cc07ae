use tokio::sync::mpsc;

use super::QuerySnapshot;

/// Handle a store returns so a subscription can unregister its listener.
pub trait ListenerRegistration: Send + Sync {
    fn remove(&self);
}

/// A live query. Snapshots arrive on an internal channel; cancelling (or
/// dropping) the subscription unregisters the listener and closes the
/// channel, after which `next` drains what was buffered and returns None.
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<QuerySnapshot>,
    registration: Option<Box<dyn ListenerRegistration>>,
}

impl Subscription {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<QuerySnapshot>,
        registration: Box<dyn ListenerRegistration>,
    ) -> Self {
        Self {
            receiver,
            registration: Some(registration),
        }
    }

    /// Wait for the next snapshot
    pub async fn next(&mut self) -> Option<QuerySnapshot> {
        self.receiver.recv().await
    }

    pub fn cancel(&mut self) {
        if let Some(registration) = self.registration.take() {
            registration.remove();
        }
        self.receiver.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.registration.is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
