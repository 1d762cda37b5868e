use crate::{Framing, Link, LinkError, LinkInfo, ReceivedFrame, Result, Timestamp, WireMessage};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Default)]
struct MockState {
    inbound: VecDeque<ReceivedFrame>,
    sent: Vec<WireMessage>,
    closed: bool,
}

/// A simple in-process loopback link. Each link instance is independent.
///
/// Inbound frames are queued through a [`MockLinkHandle`]; everything passed to
/// [`Link::send`] is recorded and can be drained from the same handle.
pub struct MockLink {
    name: String,
    state: Arc<Mutex<MockState>>,
}

/// Test-side view of a [`MockLink`].
#[derive(Clone)]
pub struct MockLinkHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    pub fn handle(&self) -> MockLinkHandle {
        MockLinkHandle {
            state: Arc::clone(&self.state),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl MockLinkHandle {
    /// Queue a frame that the link will return from its next `recv`.
    pub fn inject(&self, message: WireMessage, framing: Framing) {
        let mut frame = ReceivedFrame::new(message, framing);
        frame.timestamp = Some(Timestamp(OffsetDateTime::now_utc()));
        self.state.lock().inbound.push_back(frame);
    }

    /// Take everything sent so far.
    pub fn take_sent(&self) -> Vec<WireMessage> {
        std::mem::take(&mut self.state.lock().sent)
    }

    pub fn pending(&self) -> usize {
        self.state.lock().inbound.len()
    }

    /// Make subsequent `recv`/`send` calls fail with [`LinkError::Closed`].
    pub fn close(&self) {
        self.state.lock().closed = true;
    }
}

impl Link for MockLink {
    fn open(name: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(MockState::default())),
        })
    }

    fn list() -> Result<Vec<LinkInfo>> {
        Ok(vec![LinkInfo {
            name: "mock0".to_string(),
            driver: "mock".to_string(),
        }])
    }

    fn recv(&mut self, _timeout_ms: Option<u64>) -> Result<ReceivedFrame> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(LinkError::Closed);
        }
        // An empty queue behaves like a quiet link
        state.inbound.pop_front().ok_or(LinkError::Timeout)
    }

    fn send(&mut self, msg: &WireMessage) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(LinkError::Closed);
        }
        tracing::trace!(link = %self.name, kind = %msg.kind, len = msg.len(), "mock send");
        state.sent.push(msg.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KindId;
    use anyhow::Context;

    #[test]
    fn test_recv_returns_injected_frames_in_order() -> anyhow::Result<()> {
        let mut link = MockLink::open("mock0")?;
        let handle = link.handle();
        let first = WireMessage::new(KindId::new(191), &[1, 2, 3]).context("payload too long")?;
        let second = WireMessage::new(KindId::new(192), &[4]).context("payload too long")?;
        handle.inject(first.clone(), Framing::Ok);
        handle.inject(second.clone(), Framing::BadCrc);
        assert_eq!(handle.pending(), 2);

        let f1 = link.recv(Some(10))?;
        assert_eq!(f1.message, first);
        assert!(f1.framing.is_ok());
        assert!(f1.timestamp.is_some());

        let f2 = link.recv(Some(10))?;
        assert_eq!(f2.message, second);
        assert_eq!(f2.framing, Framing::BadCrc);

        assert!(matches!(link.recv(Some(10)), Err(LinkError::Timeout)));
        Ok(())
    }

    #[test]
    fn test_send_is_recorded_until_closed() -> anyhow::Result<()> {
        let mut link = MockLink::open("mock0")?;
        let handle = link.handle();
        let msg = WireMessage::new(KindId::new(84), &[0u8; 53]).context("payload too long")?;
        link.send(&msg)?;
        assert_eq!(handle.take_sent(), vec![msg.clone()]);
        assert!(handle.take_sent().is_empty());

        handle.close();
        assert!(matches!(link.send(&msg), Err(LinkError::Closed)));
        assert!(matches!(link.recv(None), Err(LinkError::Closed)));
        Ok(())
    }

    #[test]
    fn test_list_reports_mock_endpoint() -> anyhow::Result<()> {
        let links = MockLink::list()?;
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].driver, "mock");
        Ok(())
    }
}
