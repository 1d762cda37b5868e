use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct BridgeMetrics {
    pub rx_messages: IntCounter,
    pub tx_messages: IntCounter,
    pub unhandled_messages: IntCounter,
    pub handler_skips: IntCounter,
    pub handler_failures: IntCounter,
    pub link_errors: IntCounter,
    pub plugins_loaded: IntGauge,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub bridge: BridgeMetrics,
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let counter = |name: &str, help: &str| {
            IntCounter::new(name, help).map_err(|e| format!("metrics init error: {e}"))
        };
        let rx_messages = counter("mavbridge_rx_messages", "Total messages dispatched")?;
        let tx_messages = counter("mavbridge_tx_messages", "Total messages sent to the link")?;
        let unhandled_messages = counter(
            "mavbridge_unhandled_messages",
            "Messages with no registered handler",
        )?;
        let handler_skips = counter(
            "mavbridge_handler_skips",
            "Handler invocations skipped on framing or decode failure",
        )?;
        let handler_failures = counter(
            "mavbridge_handler_failures",
            "Handler invocations that returned an error or panicked",
        )?;
        let link_errors = counter(
            "mavbridge_link_errors",
            "Frames the link could not deliver, skipped by the poll loop",
        )?;
        let plugins_loaded = IntGauge::new("mavbridge_plugins_loaded", "Number of plugins loaded")
            .map_err(|e| format!("metrics init error: {e}"))?;
        let bridge = BridgeMetrics {
            rx_messages,
            tx_messages,
            unhandled_messages,
            handler_skips,
            handler_failures,
            link_errors,
            plugins_loaded,
        };
        let registry = Registry::new();
        let _ = registry.register(Box::new(bridge.rx_messages.clone()));
        let _ = registry.register(Box::new(bridge.tx_messages.clone()));
        let _ = registry.register(Box::new(bridge.unhandled_messages.clone()));
        let _ = registry.register(Box::new(bridge.handler_skips.clone()));
        let _ = registry.register(Box::new(bridge.handler_failures.clone()));
        let _ = registry.register(Box::new(bridge.link_errors.clone()));
        let _ = registry.register(Box::new(bridge.plugins_loaded.clone()));
        Ok(Self { registry, bridge })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_show_up_in_text_output() {
        let hub = MetricsHub::new().unwrap();
        hub.bridge.rx_messages.inc();
        hub.bridge.handler_skips.inc_by(2);
        hub.bridge.link_errors.inc();
        let text = hub.encode_text();
        assert!(text.contains("mavbridge_rx_messages 1"));
        assert!(text.contains("mavbridge_handler_skips 2"));
        assert!(text.contains("mavbridge_link_errors 1"));
    }
}
