//! Inbound topic routing
//!
//! Maps an inbound MQTT topic to the registered lamp it commands. Matching
//! is a registry scan comparing the topic against each lamp's command topic
//! by prefix, so client stacks that append to the subscribed filter still
//! match. The first matching slot wins.

use tracing::warn;

use crate::config::BROADCAST_ADDR;
use crate::error::{BridgeError, Result};
use crate::publisher::{set_topic, state_topic};
use crate::registry::LampRegistry;

/// A resolved command target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Lamp name
    pub name: String,
    /// Numeric mesh destination address
    pub address: u16,
    /// The lamp's state topic, for reporting the outcome
    pub state_topic: String,
}

/// Routes inbound command topics to lamps
#[derive(Clone)]
pub struct TopicRouter {
    registry: LampRegistry,
    prefix: String,
    broadcast_fallback: bool,
}

impl TopicRouter {
    /// Create a router
    pub fn new(registry: LampRegistry, prefix: impl Into<String>, broadcast_fallback: bool) -> Self {
        Self {
            registry,
            prefix: prefix.into(),
            broadcast_fallback,
        }
    }

    /// Resolve an inbound topic to a command target
    ///
    /// A topic matching no registered lamp is [`BridgeError::UnknownTopic`]
    /// (benign). A matching lamp whose stored address fails to parse is
    /// skipped, or targeted at the broadcast address when the fallback is
    /// enabled.
    pub async fn resolve(&self, topic: &str) -> Result<ResolvedTarget> {
        for (index, lamp) in self.registry.entries().await {
            let set = set_topic(&self.prefix, &lamp.name);
            if !topic.starts_with(set.as_str()) {
                continue;
            }
            let address = match lamp.resolved_address() {
                Ok(address) => address,
                Err(e) if self.broadcast_fallback => {
                    warn!(index, error = %e, "Unparseable lamp address, broadcasting");
                    BROADCAST_ADDR
                }
                Err(e) => {
                    warn!(index, error = %e, "Unparseable lamp address, skipping match");
                    continue;
                }
            };
            return Ok(ResolvedTarget {
                state_topic: state_topic(&self.prefix, &lamp.name),
                name: lamp.name,
                address,
            });
        }
        Err(BridgeError::UnknownTopic(topic.to_string()))
    }
}
