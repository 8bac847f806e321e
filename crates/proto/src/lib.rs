//! Generated OpAMP wire types plus the small amount of hand-written glue
//! the control plane needs on top of them (capability bits, content-type
//! constants, config hashing).

pub mod opamp {
	include!(concat!(env!("OUT_DIR"), "/opamp.proto.rs"));
}

pub use opamp::any_value::Value as AnyValueKind;
pub use opamp::{
	AgentConfigFile, AgentConfigMap, AgentDescription, AgentRemoteConfig, AgentToServer, AnyValue,
	EffectiveConfig, KeyValue, ServerToAgent,
};

/// Bit flags mirroring `opamp.proto.AgentCapabilities`. Declared separately
/// from the generated enum because the wire field is a plain `uint64`
/// bitmask, not a single enum value.
pub mod agent_capabilities {
	pub const REPORTS_STATUS: u64 = 0x0000_0001;
	pub const ACCEPTS_REMOTE_CONFIG: u64 = 0x0000_0002;
	pub const REPORTS_EFFECTIVE_CONFIG: u64 = 0x0000_0004;
}

pub mod server_capabilities {
	pub const ACCEPTS_STATUS: u64 = 0x0000_0001;
	pub const OFFERS_REMOTE_CONFIG: u64 = 0x0000_0002;
}

pub const OPAMP_CONTENT_TYPE: &str = "application/x-protobuf";

impl AgentDescription {
	/// Look up an identifying attribute by key, returning its string value.
	/// OpAMP attribute values are typed (`AnyValue`); this control plane
	/// only ever needs the string case.
	pub fn identifying_attr(&self, key: &str) -> Option<&str> {
		self.identifying_attributes
			.iter()
			.find(|kv| kv.key == key)
			.and_then(|kv| kv.value.as_ref())
			.and_then(|v| match &v.value {
				Some(AnyValueKind::StringValue(s)) => Some(s.as_str()),
				_ => None,
			})
	}
}

impl KeyValue {
	pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			key: key.into(),
			value: Some(AnyValue {
				value: Some(AnyValueKind::StringValue(value.into())),
			}),
		}
	}
}

/// SHA-256 over the serialized `AgentConfigMap`, the `config_hash` OpAMP
/// agents compare to decide whether a delivered config actually changed.
pub fn config_hash(config: &AgentConfigMap) -> Vec<u8> {
	use prost::Message;
	use sha2::{Digest, Sha256};
	let mut buf = Vec::with_capacity(config.encoded_len());
	config
		.encode(&mut buf)
		.expect("buffer sized by encoded_len");
	Sha256::digest(&buf).to_vec()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identifying_attr_round_trip() {
		let desc = AgentDescription {
			identifying_attributes: vec![KeyValue::string("hdx.shard_id", "shard-3")],
			non_identifying_attributes: vec![],
		};
		assert_eq!(desc.identifying_attr("hdx.shard_id"), Some("shard-3"));
		assert_eq!(desc.identifying_attr("missing"), None);
	}

	#[test]
	fn config_hash_is_deterministic() {
		let mut map = std::collections::HashMap::new();
		map.insert(
			"".to_string(),
			AgentConfigFile {
				body: b"receivers: {}".to_vec(),
				content_type: "application/json".to_string(),
			},
		);
		let config = AgentConfigMap { config_map: map };
		assert_eq!(config_hash(&config), config_hash(&config));
	}
}
