//! Data shapes for the `/health`, `/health/ready`, and `/health/channels`
//! contract (spec §6). Serving these over HTTP is out of scope for this
//! crate; what's in scope is producing the exact data an HTTP layer built on
//! top of this crate would serialize.

use crate::dispatcher::SinkHealthSnapshot;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelHealth {
    pub name: String,
    pub enabled: bool,
    pub circuit_breaker_open: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_until: Option<i64>,
}

impl From<SinkHealthSnapshot> for ChannelHealth {
    fn from(snapshot: SinkHealthSnapshot) -> Self {
        Self {
            name: snapshot.name,
            enabled: snapshot.enabled,
            circuit_breaker_open: snapshot.circuit_breaker_open,
            disabled_until: snapshot.disabled_until_millis,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsHealth {
    pub channels: Vec<ChannelHealth>,
}

impl ChannelsHealth {
    pub fn from_snapshots(snapshots: Vec<SinkHealthSnapshot>) -> Self {
        Self { channels: snapshots.into_iter().map(ChannelHealth::from).collect() }
    }

    /// `/health/channels` is 200 only if every enabled sink has a closed breaker.
    pub fn is_healthy(&self) -> bool {
        self.channels.iter().all(|c| !c.enabled || !c.circuit_breaker_open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(name: &str, enabled: bool, open: bool) -> SinkHealthSnapshot {
        SinkHealthSnapshot {
            name: name.to_string(),
            enabled,
            circuit_breaker_open: open,
            disabled_until_millis: open.then_some(1_000),
        }
    }

    #[test]
    fn healthy_when_all_enabled_sinks_are_closed() {
        let health = ChannelsHealth::from_snapshots(vec![snapshot("discord", true, false), snapshot("slack", false, true)]);
        assert!(health.is_healthy());
    }

    #[test]
    fn unhealthy_when_an_enabled_sink_is_open() {
        let health = ChannelsHealth::from_snapshots(vec![snapshot("discord", true, true)]);
        assert!(!health.is_healthy());
    }

    #[test]
    fn disabled_until_omitted_when_not_set() {
        let health = ChannelsHealth::from_snapshots(vec![snapshot("discord", true, false)]);
        let json = serde_json::to_string(&health).unwrap();
        assert!(!json.contains("disabled_until"));
    }
}
