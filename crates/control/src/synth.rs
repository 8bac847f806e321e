//! Collector-config synthesizer (C7): a pure function from `(shard_id,
//! token-registry snapshot, managed-connection record)` to a pipeline
//! config (§4.7).
//!
//! Modeled as a tagged variant (§9) — [`SynthesizedConfig::Nop`] or
//! [`SynthesizedConfig::Tenant`] — rather than a dynamic map, so
//! determinism (P5) and schema drift are both compile-time properties
//! instead of runtime ones.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Value, json};
use sqlx::types::Uuid;

use ingest_core::AppResult;

use crate::provision::tenant_identifiers;
use crate::registry::TokenRegistry;
use crate::team::ManagedConnectionStore;

const OTLP_GRPC_ENDPOINT: &str = "0.0.0.0:4317";
const OTLP_HTTP_ENDPOINT: &str = "0.0.0.0:4318";

#[derive(Debug, Clone, PartialEq)]
pub enum SynthesizedConfig {
	Nop,
	Tenant {
		team_id: Uuid,
		database: String,
		username: String,
		password: String,
	},
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Pipeline {
	receivers: Vec<String>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	processors: Vec<String>,
	exporters: Vec<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ServiceConfig {
	extensions: Vec<String>,
	pipelines: BTreeMap<String, Pipeline>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct CollectorConfig {
	extensions: Value,
	receivers: Value,
	processors: Value,
	exporters: Value,
	service: ServiceConfig,
}

impl SynthesizedConfig {
	/// Whether this config routes telemetry anywhere other than a `nop`
	/// exporter. Used by P7 ("nop safety") tests.
	pub fn is_nop(&self) -> bool {
		matches!(self, SynthesizedConfig::Nop)
	}

	pub fn to_collector_config(&self) -> CollectorConfig {
		let extensions = json!({"health_check": {}});

		let receivers = match self {
			SynthesizedConfig::Nop => json!({
				"otlp/hyperdx": {
					"protocols": {
						"grpc": {"endpoint": OTLP_GRPC_ENDPOINT},
						"http": {"endpoint": OTLP_HTTP_ENDPOINT}
					}
				}
			}),
			SynthesizedConfig::Tenant { .. } => json!({
				"otlp/hyperdx": {
					"protocols": {
						"grpc": {"endpoint": OTLP_GRPC_ENDPOINT, "include_metadata": true},
						"http": {
							"endpoint": OTLP_HTTP_ENDPOINT,
							"include_metadata": true,
							"cors": {"allowed_origins": ["*"]}
						}
					}
				}
			}),
		};

		let processors = match self {
			SynthesizedConfig::Nop => json!({}),
			SynthesizedConfig::Tenant { .. } => json!({
				"memory_limiter": {
					"check_interval": "1s",
					"limit_percentage": 80,
					"spike_limit_percentage": 20
				},
				"batch": {"timeout": "5s", "send_batch_size": 10000}
			}),
		};

		let (exporters, pipelines) = match self {
			SynthesizedConfig::Nop => {
				let exporters = json!({"nop": {}});
				let pipelines = ["logs", "traces", "metrics"]
					.into_iter()
					.map(|signal| {
						(
							format!("{signal}/nop"),
							Pipeline {
								receivers: vec!["otlp/hyperdx".to_string()],
								processors: vec![],
								exporters: vec!["nop".to_string()],
							},
						)
					})
					.collect();
				(exporters, pipelines)
			}
			SynthesizedConfig::Tenant {
				database,
				username,
				password,
				..
			} => {
				let exporters = json!({
					"clickhouse": {
						"endpoint": "${env:CLICKHOUSE_ENDPOINT}",
						"database": database,
						"username": username,
						"password": password,
						"ttl": "720h",
						"retry_on_failure": {
							"enabled": true,
							"initial_interval": "5s",
							"max_interval": "30s",
							"max_elapsed_time": "300s"
						}
					}
				});
				let pipelines = ["logs", "traces", "metrics"]
					.into_iter()
					.map(|signal| {
						(
							signal.to_string(),
							Pipeline {
								receivers: vec!["otlp/hyperdx".to_string()],
								processors: vec!["memory_limiter".to_string(), "batch".to_string()],
								exporters: vec!["clickhouse".to_string()],
							},
						)
					})
					.collect();
				(exporters, pipelines)
			}
		};

		CollectorConfig {
			extensions,
			receivers,
			processors,
			exporters,
			service: ServiceConfig {
				extensions: vec!["health_check".to_string()],
				pipelines,
			},
		}
	}

	/// Deterministic serialization: the same variant with the same fields
	/// always produces the same bytes (P5).
	pub fn to_json_bytes(&self) -> Vec<u8> {
		serde_json::to_vec(&self.to_collector_config()).expect("collector config always serializes")
	}
}

/// Synthesizes the config for `shard_id` (§4.7 steps 1-4). Never raises on
/// the "no tenant bound" or "tenant bound but unprovisioned" paths — those
/// degrade to a nop config, logged — only a registry/store I/O failure
/// propagates as an error.
pub async fn synthesize(
	shard_id: &str,
	registry: &TokenRegistry,
	connections: &ManagedConnectionStore,
) -> AppResult<SynthesizedConfig> {
	let teams = registry.teams_on_shard(shard_id).await?;

	let team_id = match teams.len() {
		0 => return Ok(SynthesizedConfig::Nop),
		1 => teams[0],
		_ => {
			tracing::warn!(
				target = "audit",
				action = "synth.multiple_teams_on_shard",
				outcome = "policy_violation",
				shard_id = %shard_id,
				team_count = teams.len(),
				"policy violation of I3: multiple teams bound to one shard; using the lexicographically smallest team id"
			);
			teams[0]
		}
	};

	match connections.find_with_password(team_id).await? {
		Some(conn) if conn.is_managed => {
			let (database, _) = tenant_identifiers(team_id);
			Ok(SynthesizedConfig::Tenant {
				team_id,
				database,
				username: conn.username,
				password: conn.password,
			})
		}
		_ => {
			tracing::error!(
				target = "audit",
				action = "synth.missing_managed_connection",
				shard_id = %shard_id,
				team_id = %team_id,
				"team bound to shard has no managed connection; emitting nop config"
			);
			Ok(SynthesizedConfig::Nop)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn nop_config_has_one_pipeline_per_signal_and_no_clickhouse_exporter() {
		let config = SynthesizedConfig::Nop.to_collector_config();
		assert_eq!(config.service.pipelines.len(), 3);
		assert!(config.service.pipelines.contains_key("logs/nop"));
		assert!(config.service.pipelines.contains_key("traces/nop"));
		assert!(config.service.pipelines.contains_key("metrics/nop"));
		assert!(!config.exporters.to_string().contains("clickhouse"));
	}

	#[test]
	fn tenant_config_routes_every_signal_through_clickhouse() {
		let config = SynthesizedConfig::Tenant {
			team_id: Uuid::nil(),
			database: "tenant_x".to_string(),
			username: "tenant_x".to_string(),
			password: "secret".to_string(),
		}
		.to_collector_config();
		assert_eq!(config.service.pipelines.len(), 3);
		for pipeline in config.service.pipelines.values() {
			assert_eq!(pipeline.exporters, vec!["clickhouse".to_string()]);
		}
		assert!(config.exporters.to_string().contains("tenant_x"));
	}

	#[test]
	fn serialization_is_byte_identical_across_calls() {
		let config = SynthesizedConfig::Tenant {
			team_id: Uuid::nil(),
			database: "tenant_x".to_string(),
			username: "tenant_x".to_string(),
			password: "secret".to_string(),
		};
		assert_eq!(config.to_json_bytes(), config.to_json_bytes());
	}

	#[test]
	fn nop_config_password_never_appears_anywhere() {
		let config = SynthesizedConfig::Nop;
		let bytes = config.to_json_bytes();
		assert!(!String::from_utf8(bytes).unwrap().contains("password"));
	}

	proptest::proptest! {
		/// P5 (config determinism): for any tenant field values, two
		/// serializations of the same logical config are byte-identical.
		#[test]
		fn tenant_config_serialization_is_deterministic(
			database in "[a-z_]{1,20}",
			username in "[a-z_]{1,20}",
			password in "[a-f0-9]{1,48}",
		) {
			let config = SynthesizedConfig::Tenant {
				team_id: Uuid::nil(),
				database,
				username,
				password,
			};
			proptest::prop_assert_eq!(config.to_json_bytes(), config.to_json_bytes());
		}

		/// P7 (nop safety): whatever the nop config looks like, it never
		/// contains a clickhouse exporter and always has one pipeline per
		/// signal.
		#[test]
		fn nop_is_always_safe(_unused in 0u8..1) {
			let config = SynthesizedConfig::Nop.to_collector_config();
			proptest::prop_assert_eq!(config.service.pipelines.len(), 3);
			proptest::prop_assert!(!config.exporters.to_string().contains("clickhouse"));
		}
	}
}
