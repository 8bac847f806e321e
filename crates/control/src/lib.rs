//! The ingestion control plane: token codec, shard allocator, token
//! registry, tenant storage provisioner, bootstrap orchestrator, agent
//! registry, collector-config synthesizer, and the two HTTP surfaces
//! (tenant API + OpAMP) built on top of them.

pub mod agent_registry;
pub mod api;
pub mod bootstrap;
pub mod config;
pub mod opamp;
pub mod provision;
pub mod registry;
pub mod shard;
pub mod sign;
pub mod synth;
pub mod team;
pub mod token;

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use agent_registry::AgentRegistry;
use config::Config;
use provision::Provisioner;
use registry::TokenRegistry;
use sign::ResponseSigner;
use team::{ManagedConnectionStore, SourceStore, TeamStore};

/// Everything a request handler needs, cloned cheaply (every field is
/// itself a handle: a connection pool, an `Arc`, or a `moka` cache).
#[derive(Clone)]
pub struct AppState {
	pub config: Arc<Config>,
	pub registry: TokenRegistry,
	pub teams: TeamStore,
	pub sources: SourceStore,
	pub connections: ManagedConnectionStore,
	pub provisioner: Provisioner,
	pub agents: AgentRegistry,
	pub signer: ResponseSigner,
}

/// The tenant-facing HTTP API (`/ingestion-tokens`, `/teams`, `/sources`).
pub fn api_router(state: AppState) -> Router {
	api::router()
		.route("/debug/build_info", get(debug_build_info))
		.with_state(state)
}

/// The OpAMP HTTP endpoint plus a read-only debug endpoint exposing the
/// agent registry's lifecycle state (SPEC_FULL §C.5).
pub fn opamp_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/opamp", axum::routing::post(opamp::handle))
		.route("/debug/agents", get(debug_agents))
		.with_state(state)
}

async fn debug_agents(State(state): State<AppState>) -> impl IntoResponse {
	Json(state.agents.snapshot().await)
}

async fn debug_build_info() -> impl IntoResponse {
	Json(ingest_core::version::BuildInfo::new())
}
