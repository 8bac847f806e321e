//! OpAMP HTTP endpoint (C8): decode an `AgentToServer` frame, feed it to
//! the agent registry (C6), synthesize a pipeline config when the agent
//! accepts one (C7), and return a signed `ServerToAgent` frame (§4.8).

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use prost::Message;
use sha2::{Digest, Sha256};

use ingest_proto::opamp::{
	AgentConfigFile, AgentConfigMap, AgentRemoteConfig, AgentToServer, ServerToAgent,
};
use ingest_proto::{OPAMP_CONTENT_TYPE, server_capabilities};

use crate::AppState;
use crate::synth::synthesize;

const SIGNATURE_HEADER: &str = "x-hdx-signature";

pub async fn handle(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
	let content_type = headers
		.get(header::CONTENT_TYPE)
		.and_then(|v| v.to_str().ok())
		.unwrap_or_default();
	if content_type != OPAMP_CONTENT_TYPE {
		return StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response();
	}

	let message = match AgentToServer::decode(body) {
		Ok(message) => message,
		Err(error) => {
			tracing::warn!(target = "audit", action = "opamp.decode", %error, "failed to decode AgentToServer");
			return StatusCode::BAD_REQUEST.into_response();
		}
	};

	let instance_uid = message.instance_uid.clone();
	let agent = state.agents.process(&message).await;

	let remote_config = if agent.accepts_remote_config() {
		let shard_id = match agent.shard_id() {
			Some(shard_id) => shard_id.to_string(),
			None => {
				tracing::error!(
					target = "audit",
					action = "opamp.agent_misconfigured",
					instance_uid = %hex::encode(&instance_uid),
					"agent missing the hdx.shard_id identifying attribute; operator must set OTEL_RESOURCE_ATTRIBUTES"
				);
				return StatusCode::INTERNAL_SERVER_ERROR.into_response();
			}
		};

		let synthesized = match synthesize(&shard_id, &state.registry, &state.connections).await {
			Ok(synthesized) => synthesized,
			Err(error) => {
				tracing::error!(target = "audit", action = "opamp.synthesize", shard_id = %shard_id, %error, "failed to synthesize collector config");
				return StatusCode::INTERNAL_SERVER_ERROR.into_response();
			}
		};

		let config_body = synthesized.to_json_bytes();
		let config_hash = Sha256::digest(&config_body).to_vec();
		state
			.agents
			.record_delivered_config(&instance_uid, config_hash.clone())
			.await;

		let mut config_map = HashMap::new();
		config_map.insert(
			String::new(),
			AgentConfigFile {
				body: config_body,
				content_type: "application/json".to_string(),
			},
		);
		Some(AgentRemoteConfig {
			config: Some(AgentConfigMap { config_map }),
			config_hash,
		})
	} else {
		None
	};

	let response = ServerToAgent {
		instance_uid,
		remote_config,
		capabilities: server_capabilities::ACCEPTS_STATUS
			| server_capabilities::OFFERS_REMOTE_CONFIG,
	};

	let mut buf = Vec::with_capacity(response.encoded_len());
	response
		.encode(&mut buf)
		.expect("buffer sized by encoded_len");
	let signature = state.signer.sign(&buf);

	let mut headers = HeaderMap::new();
	headers.insert(
		header::CONTENT_TYPE,
		HeaderValue::from_static(OPAMP_CONTENT_TYPE),
	);
	if let Ok(value) = HeaderValue::from_str(&signature) {
		headers.insert(SIGNATURE_HEADER, value);
	}
	(StatusCode::OK, headers, buf).into_response()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn signature_header_name_is_lowercase_and_ascii() {
		assert!(
			SIGNATURE_HEADER
				.chars()
				.all(|c| c.is_ascii_lowercase() || c == '-')
		);
	}
}
