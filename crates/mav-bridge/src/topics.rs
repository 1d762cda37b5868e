use tokio::sync::watch;

/// A named publish channel that keeps its last value for late subscribers.
pub struct LatchedTopic<T> {
    name: String,
    tx: watch::Sender<Option<T>>,
}

impl<T: Clone> LatchedTopic<T> {
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            name: name.into(),
            tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Publish `value`, replacing whatever was latched. Works with zero subscribers.
    pub fn publish(&self, value: T) {
        self.tx.send_replace(Some(value));
    }

    /// Receiver that immediately sees the latched value, if any.
    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> Option<T> {
        self.tx.borrow().clone()
    }
}
