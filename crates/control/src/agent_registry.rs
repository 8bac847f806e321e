//! Agent registry (C6): an in-memory `instance_uid -> last-seen state` map,
//! safe under concurrent `process` calls from many shards' collectors
//! (§4.6, §5).
//!
//! Backed by [`moka`], the same cache the teacher reaches for elsewhere for
//! concurrent, TTL-bounded in-memory state. Idle entries age out via
//! `time_to_idle`; [`AgentRegistry::sweep`] additionally drives moka's
//! pending-task queue on a timer so eviction is observable promptly rather
//! than only on next access (SPEC_FULL §C.4).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::Serialize;
use tokio::sync::Mutex;

use ingest_proto::opamp::AgentToServer;
use ingest_proto::{AgentDescription, agent_capabilities};

/// Mirrors §4.8's state machine, minus the implicit `UNKNOWN` state (an
/// entry simply doesn't exist in the map until the first heartbeat).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentLifecycleState {
	Registered,
	Configured,
	ConfigChanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentState {
	#[serde(with = "hex_bytes")]
	pub instance_uid: Vec<u8>,
	pub identifying_attributes: Vec<(String, String)>,
	pub capabilities: u64,
	#[serde(with = "hex_bytes_opt")]
	pub last_config_hash: Option<Vec<u8>>,
	pub lifecycle: AgentLifecycleState,
	pub last_seen_at: DateTime<Utc>,
}

mod hex_bytes {
	pub fn serialize<S: serde::Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
		s.serialize_str(&hex::encode(bytes))
	}
}

mod hex_bytes_opt {
	pub fn serialize<S: serde::Serializer>(
		bytes: &Option<Vec<u8>>,
		s: S,
	) -> Result<S::Ok, S::Error> {
		match bytes {
			Some(b) => s.serialize_str(&hex::encode(b)),
			None => s.serialize_none(),
		}
	}
}

impl AgentState {
	pub fn accepts_remote_config(&self) -> bool {
		self.capabilities & agent_capabilities::ACCEPTS_REMOTE_CONFIG != 0
	}

	fn identifying_attr(&self, key: &str) -> Option<&str> {
		self.identifying_attributes
			.iter()
			.find(|(k, _)| k == key)
			.map(|(_, v)| v.as_str())
	}

	pub fn shard_id(&self) -> Option<&str> {
		self.identifying_attr("hdx.shard_id")
	}
}

fn flatten_attrs(desc: &AgentDescription) -> Vec<(String, String)> {
	desc.identifying_attributes
		.iter()
		.filter_map(|kv| {
			kv.value.as_ref().and_then(|v| match &v.value {
				Some(ingest_proto::AnyValueKind::StringValue(s)) => {
					Some((kv.key.clone(), s.clone()))
				}
				_ => None,
			})
		})
		.collect()
}

#[derive(Clone)]
pub struct AgentRegistry {
	entries: Cache<Vec<u8>, Arc<Mutex<AgentState>>>,
}

impl AgentRegistry {
	pub fn new(ttl: Duration) -> Self {
		Self {
			entries: Cache::builder().time_to_idle(ttl).build(),
		}
	}

	/// Merges an incoming `AgentToServer` heartbeat into the stored state
	/// for its `instance_uid`, creating the entry on first contact (§4.6).
	/// `last_config_hash` is left untouched here — only
	/// [`AgentRegistry::record_delivered_config`] (called once C7/C8 know
	/// what was actually sent) advances the lifecycle past `Registered`.
	pub async fn process(&self, message: &AgentToServer) -> AgentState {
		let key = message.instance_uid.clone();
		let attrs = message
			.agent_description
			.as_ref()
			.map(flatten_attrs)
			.unwrap_or_default();

		let slot = self
			.entries
			.get_with(key.clone(), async {
				Arc::new(Mutex::new(AgentState {
					instance_uid: key.clone(),
					identifying_attributes: Vec::new(),
					capabilities: 0,
					last_config_hash: None,
					lifecycle: AgentLifecycleState::Registered,
					last_seen_at: Utc::now(),
				}))
			})
			.await;

		let mut state = slot.lock().await;
		if !attrs.is_empty() {
			state.identifying_attributes = attrs;
		}
		state.capabilities = message.capabilities;
		state.last_seen_at = Utc::now();
		state.clone()
	}

	/// Advances the lifecycle after C7/C8 deliver a config: `Registered` or
	/// `Configured` -> `Configured` if the hash is unchanged from last
	/// delivery, or -> `ConfigChanged` if it differs (§4.8).
	pub async fn record_delivered_config(&self, instance_uid: &[u8], config_hash: Vec<u8>) {
		if let Some(slot) = self.entries.get(instance_uid).await {
			let mut state = slot.lock().await;
			state.lifecycle = match &state.last_config_hash {
				Some(prev) if prev != &config_hash => AgentLifecycleState::ConfigChanged,
				_ => AgentLifecycleState::Configured,
			};
			state.last_config_hash = Some(config_hash);
		}
	}

	pub async fn get(&self, instance_uid: &[u8]) -> Option<AgentState> {
		match self.entries.get(instance_uid).await {
			Some(slot) => Some(slot.lock().await.clone()),
			None => None,
		}
	}

	/// Snapshot of every currently-live entry, for the debug endpoint
	/// (SPEC_FULL §C.5).
	pub async fn snapshot(&self) -> Vec<AgentState> {
		let mut out = Vec::new();
		for (_, slot) in self.entries.iter() {
			out.push(slot.lock().await.clone());
		}
		out
	}

	/// Drives moka's internal maintenance so idle entries are actually
	/// dropped rather than merely eligible for eviction on next access.
	/// Intended to be called on a timer from `main` (SPEC_FULL §C.4).
	pub async fn sweep(&self) {
		self.entries.run_pending_tasks().await;
	}

	pub fn len(&self) -> u64 {
		self.entries.entry_count()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ingest_proto::KeyValue;
	use ingest_proto::opamp::AgentDescription;

	fn msg(instance_uid: &[u8], shard: &str, capabilities: u64) -> AgentToServer {
		AgentToServer {
			instance_uid: instance_uid.to_vec(),
			sequence_num: 1,
			agent_description: Some(AgentDescription {
				identifying_attributes: vec![KeyValue::string("hdx.shard_id", shard)],
				non_identifying_attributes: vec![],
			}),
			capabilities,
			effective_config: None,
		}
	}

	#[tokio::test]
	async fn first_heartbeat_registers() {
		let registry = AgentRegistry::new(Duration::from_secs(150));
		let state = registry.process(&msg(b"agent-1", "shard-0", 0)).await;
		assert_eq!(state.lifecycle, AgentLifecycleState::Registered);
		assert_eq!(state.shard_id(), Some("shard-0"));
	}

	#[tokio::test]
	async fn delivered_config_advances_lifecycle_then_detects_change() {
		let registry = AgentRegistry::new(Duration::from_secs(150));
		registry.process(&msg(b"agent-1", "shard-0", 2)).await;
		registry
			.record_delivered_config(b"agent-1", vec![1, 2, 3])
			.await;
		let state = registry.get(b"agent-1").await.unwrap();
		assert_eq!(state.lifecycle, AgentLifecycleState::Configured);

		registry
			.record_delivered_config(b"agent-1", vec![9, 9, 9])
			.await;
		let state = registry.get(b"agent-1").await.unwrap();
		assert_eq!(state.lifecycle, AgentLifecycleState::ConfigChanged);
	}

	#[tokio::test]
	async fn accepts_remote_config_reads_the_capability_bit() {
		let registry = AgentRegistry::new(Duration::from_secs(150));
		let state = registry
			.process(&msg(
				b"agent-2",
				"shard-1",
				agent_capabilities::ACCEPTS_REMOTE_CONFIG,
			))
			.await;
		assert!(state.accepts_remote_config());
	}

	#[tokio::test]
	async fn concurrent_process_calls_do_not_lose_updates() {
		let registry = AgentRegistry::new(Duration::from_secs(150));
		let mut handles = Vec::new();
		for i in 0..50 {
			let registry = registry.clone();
			handles.push(tokio::spawn(async move {
				registry.process(&msg(b"agent-shared", "shard-0", i)).await;
			}));
		}
		for h in handles {
			h.await.unwrap();
		}
		registry.sweep().await;
		assert_eq!(registry.len(), 1);
	}
}
