//! Tenant-facing HTTP API: ingestion-token CRUD, team creation, and the
//! source listing/deletion surface (§6, SPEC_FULL §C.1-3).
//!
//! Authentication/session login is out of scope (§1 Non-goals); every
//! handler here trusts an upstream-populated `x-hdx-team-id` header, which
//! SPEC_FULL §D models as the boundary of what this crate is responsible
//! for.

use axum::Router;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::routing::{delete, get, patch, post};
use axum::{Json, response::IntoResponse};
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;

use ingest_core::{AppError, AppResult};

use crate::AppState;
use crate::bootstrap::bootstrap_team;
use crate::registry::IngestionTokenRecord;
use crate::team::Source;

/// Extracts the caller's team id from `x-hdx-team-id`. Stands in for a
/// real session/cookie authentication layer (§1 Non-goals); see
/// SPEC_FULL §D.
pub struct TeamId(pub Uuid);

impl<S> FromRequestParts<S> for TeamId
where
	S: Send + Sync,
{
	type Rejection = AppError;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		let raw = parts
			.headers
			.get("x-hdx-team-id")
			.ok_or_else(|| AppError::Invalid("missing x-hdx-team-id header".to_string()))?
			.to_str()
			.map_err(|_| AppError::Invalid("x-hdx-team-id is not valid utf-8".to_string()))?;
		let team_id = Uuid::parse_str(raw)
			.map_err(|_| AppError::Invalid("x-hdx-team-id is not a valid uuid".to_string()))?;
		Ok(TeamId(team_id))
	}
}

pub fn router() -> Router<AppState> {
	Router::new()
		.route("/ingestion-tokens", get(list_tokens).post(create_token))
		.route(
			"/ingestion-tokens/{id}",
			get(get_token).delete(revoke_token),
		)
		.route("/ingestion-tokens/{id}/rotate", post(rotate_token))
		.route("/ingestion-tokens/{id}/shard", patch(assign_shard))
		.route("/teams", post(create_team))
		.route("/sources", get(list_sources))
		.route("/sources/{id}", delete(delete_source))
}

#[derive(Serialize)]
struct TokenListResponse {
	data: Vec<IngestionTokenRecord>,
}

async fn list_tokens(
	State(state): State<AppState>,
	TeamId(team_id): TeamId,
) -> AppResult<impl IntoResponse> {
	let data = state.registry.list(team_id).await?;
	Ok(Json(TokenListResponse { data }))
}

async fn get_token(
	State(state): State<AppState>,
	TeamId(team_id): TeamId,
	Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
	let record = state.registry.get(team_id, id).await?;
	Ok(Json(record))
}

#[derive(Deserialize)]
struct CreateTokenRequest {
	description: Option<String>,
}

#[derive(Serialize)]
struct IssuedTokenResponse {
	token: String,
	token_record: IngestionTokenRecord,
}

async fn create_token(
	State(state): State<AppState>,
	TeamId(team_id): TeamId,
	Json(body): Json<CreateTokenRequest>,
) -> AppResult<impl IntoResponse> {
	let issued = state
		.registry
		.create(team_id, body.description.as_deref())
		.await?;
	Ok(Json(IssuedTokenResponse {
		token: issued.token,
		token_record: issued.record,
	}))
}

async fn rotate_token(
	State(state): State<AppState>,
	TeamId(team_id): TeamId,
	Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
	let issued = state.registry.rotate(team_id, id).await?;
	Ok(Json(IssuedTokenResponse {
		token: issued.token,
		token_record: issued.record,
	}))
}

async fn revoke_token(
	State(state): State<AppState>,
	TeamId(team_id): TeamId,
	Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
	state.registry.revoke(team_id, id).await?;
	Ok(axum::http::StatusCode::OK)
}

#[derive(Deserialize)]
struct AssignShardRequest {
	assigned_shard: String,
}

#[derive(Serialize)]
struct AssignShardResponse {
	id: Uuid,
	assigned_shard: String,
}

async fn assign_shard(
	State(state): State<AppState>,
	TeamId(team_id): TeamId,
	Path(id): Path<Uuid>,
	Json(body): Json<AssignShardRequest>,
) -> AppResult<impl IntoResponse> {
	let record = state
		.registry
		.assign_shard(team_id, id, &body.assigned_shard)
		.await?;
	Ok(Json(AssignShardResponse {
		id: record.id,
		assigned_shard: record.assigned_shard.unwrap_or_default(),
	}))
}

#[derive(Deserialize)]
struct CreateTeamRequest {
	name: String,
}

#[derive(Serialize)]
struct CreateTeamResponse {
	id: Uuid,
	name: String,
	storage_provisioned: bool,
}

async fn create_team(
	State(state): State<AppState>,
	Json(body): Json<CreateTeamRequest>,
) -> AppResult<impl IntoResponse> {
	let team = state.teams.create(&body.name).await?;
	let outcome = bootstrap_team(
		team.id,
		state.config.provisioning_enabled,
		&state.provisioner,
		&state.connections,
		&state.sources,
		&state.config.query_host,
	)
	.await;
	Ok(Json(CreateTeamResponse {
		id: team.id,
		name: team.name,
		storage_provisioned: outcome.storage_provisioned,
	}))
}

#[derive(Serialize)]
struct SourceListResponse {
	data: Vec<Source>,
}

async fn list_sources(
	State(state): State<AppState>,
	TeamId(team_id): TeamId,
) -> AppResult<impl IntoResponse> {
	let data = state.sources.list_for_team(team_id).await?;
	Ok(Json(SourceListResponse { data }))
}

async fn delete_source(
	State(state): State<AppState>,
	TeamId(team_id): TeamId,
	Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
	state.sources.soft_delete(team_id, id).await?;
	Ok(axum::http::StatusCode::OK)
}
