//! Team, ManagedConnection and Source: the entities a tenant's storage and
//! query-time routing are built out of (§3). CRUD here is intentionally
//! thin — the interesting behavior lives in [`crate::bootstrap`] and
//! [`crate::provision`], which call into these stores.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use sqlx::types::Uuid;

use ingest_core::AppResult;

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct Team {
	pub id: Uuid,
	pub name: String,
	pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct TeamStore {
	pool: PgPool,
}

impl TeamStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	pub async fn create(&self, name: &str) -> AppResult<Team> {
		let team = sqlx::query_as::<_, Team>(
			"INSERT INTO teams (name) VALUES ($1) RETURNING id, name, created_at",
		)
		.bind(name)
		.fetch_one(&self.pool)
		.await?;
		tracing::info!(target = "audit", action = "team.create", team_id = %team.id, "team created");
		Ok(team)
	}

	pub async fn find(&self, team_id: Uuid) -> AppResult<Option<Team>> {
		Ok(
			sqlx::query_as::<_, Team>("SELECT id, name, created_at FROM teams WHERE id = $1")
				.bind(team_id)
				.fetch_optional(&self.pool)
				.await?,
		)
	}
}

/// The control plane's record of a tenant's per-team analytical-store
/// endpoint and write credential (§3). The password is select-off by
/// default; only [`ManagedConnectionStore::find_with_password`] reads it,
/// and only the config synthesizer (C7) is meant to call that.
#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct ManagedConnection {
	pub team_id: Uuid,
	pub host: String,
	pub username: String,
	#[serde(skip)]
	pub password: String,
	pub is_managed: bool,
}

#[derive(Clone, Debug)]
pub struct ManagedConnectionStore {
	pool: PgPool,
}

impl ManagedConnectionStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	pub async fn upsert(
		&self,
		team_id: Uuid,
		host: &str,
		username: &str,
		password: &str,
	) -> AppResult<ManagedConnection> {
		Ok(sqlx::query_as::<_, ManagedConnection>(
			r#"INSERT INTO managed_connections (team_id, host, username, password, is_managed)
               VALUES ($1, $2, $3, $4, true)
               ON CONFLICT (team_id) DO UPDATE SET host = EXCLUDED.host
               RETURNING team_id, host, username, password, is_managed"#,
		)
		.bind(team_id)
		.bind(host)
		.bind(username)
		.bind(password)
		.fetch_one(&self.pool)
		.await?)
	}

	/// Selects the connection without its password — the default read
	/// path, used anywhere the caller only needs to know *that* a team is
	/// managed (e.g. deciding whether to emit a nop config).
	pub async fn find(&self, team_id: Uuid) -> AppResult<Option<ManagedConnection>> {
		Ok(sqlx::query_as::<_, ManagedConnection>(
			"SELECT team_id, host, username, '' AS password, is_managed FROM managed_connections WHERE team_id = $1",
		)
		.bind(team_id)
		.fetch_optional(&self.pool)
		.await?)
	}

	/// Explicit opt-in read of the password. Only the synthesizer (C7)
	/// should call this, and only to build an exporter config that is
	/// never logged.
	pub async fn find_with_password(&self, team_id: Uuid) -> AppResult<Option<ManagedConnection>> {
		Ok(sqlx::query_as::<_, ManagedConnection>(
			"SELECT team_id, host, username, password, is_managed FROM managed_connections WHERE team_id = $1",
		)
		.bind(team_id)
		.fetch_optional(&self.pool)
		.await?)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
	Log,
	Trace,
	Metric,
	Session,
}

impl SourceKind {
	pub const ALL: [SourceKind; 4] = [
		SourceKind::Log,
		SourceKind::Trace,
		SourceKind::Metric,
		SourceKind::Session,
	];

	/// Canonical table name materialized for this kind (§4.4). Metric
	/// sources reference all three metric tables at query time, so the
	/// "table name" here is the logical grouping name, not a single table.
	pub fn canonical_table(&self) -> &'static str {
		match self {
			SourceKind::Log => "otel_logs",
			SourceKind::Trace => "otel_traces",
			SourceKind::Metric => "otel_metrics",
			SourceKind::Session => "hyperdx_sessions",
		}
	}
}

#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct Source {
	pub id: Uuid,
	pub team_id: Uuid,
	pub kind: SourceKind,
	pub database_name: String,
	pub table_name: String,
	pub log_source_id: Option<Uuid>,
	pub trace_source_id: Option<Uuid>,
	pub metric_source_id: Option<Uuid>,
	pub session_source_id: Option<Uuid>,
	pub deleted_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct SourceStore {
	pool: PgPool,
}

impl SourceStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	pub async fn find_by_kind(&self, team_id: Uuid, kind: SourceKind) -> AppResult<Option<Source>> {
		Ok(sqlx::query_as::<_, Source>(
			r#"SELECT id, team_id, kind, database_name, table_name, log_source_id, trace_source_id,
                      metric_source_id, session_source_id, deleted_at, created_at
               FROM sources WHERE team_id = $1 AND kind = $2"#,
		)
		.bind(team_id)
		.bind(kind)
		.fetch_optional(&self.pool)
		.await?)
	}

	pub async fn create(
		&self,
		team_id: Uuid,
		kind: SourceKind,
		database_name: &str,
	) -> AppResult<Source> {
		Ok(sqlx::query_as::<_, Source>(
			r#"INSERT INTO sources (team_id, kind, database_name, table_name)
               VALUES ($1, $2, $3, $4)
               RETURNING id, team_id, kind, database_name, table_name, log_source_id, trace_source_id,
                         metric_source_id, session_source_id, deleted_at, created_at"#,
		)
		.bind(team_id)
		.bind(kind)
		.bind(database_name)
		.bind(kind.canonical_table())
		.fetch_one(&self.pool)
		.await?)
	}

	/// Fills in the cross-links (§9): every source references the other
	/// three by id, forming a complete graph. Called once all four exist.
	pub async fn link(
		&self,
		id: Uuid,
		log_id: Uuid,
		trace_id: Uuid,
		metric_id: Uuid,
		session_id: Uuid,
	) -> AppResult<()> {
		sqlx::query(
			r#"UPDATE sources SET log_source_id = $2, trace_source_id = $3,
               metric_source_id = $4, session_source_id = $5 WHERE id = $1"#,
		)
		.bind(id)
		.bind(log_id)
		.bind(trace_id)
		.bind(metric_id)
		.bind(session_id)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	pub async fn list_for_team(&self, team_id: Uuid) -> AppResult<Vec<Source>> {
		Ok(sqlx::query_as::<_, Source>(
			r#"SELECT id, team_id, kind, database_name, table_name, log_source_id, trace_source_id,
                      metric_source_id, session_source_id, deleted_at, created_at
               FROM sources WHERE team_id = $1 AND deleted_at IS NULL ORDER BY kind"#,
		)
		.bind(team_id)
		.fetch_all(&self.pool)
		.await?)
	}

	/// Soft-deletes a source, scoped to `team_id`. Cross-tenant calls
	/// affect zero rows and still return `Ok(())` (E3): the caller cannot
	/// distinguish "not mine" from "not found" through this API, which is
	/// the point.
	pub async fn soft_delete(&self, team_id: Uuid, id: Uuid) -> AppResult<()> {
		sqlx::query(
			"UPDATE sources SET deleted_at = now() WHERE id = $1 AND team_id = $2 AND deleted_at IS NULL",
		)
		.bind(id)
		.bind(team_id)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	/// Server-side lookup that ignores tenant scoping, used only by tests
	/// to confirm a cross-tenant delete left the record intact (E3).
	#[cfg(any(test, feature = "test-support"))]
	pub async fn find_by_id_unscoped(&self, id: Uuid) -> AppResult<Option<Source>> {
		Ok(sqlx::query_as::<_, Source>(
			r#"SELECT id, team_id, kind, database_name, table_name, log_source_id, trace_source_id,
                      metric_source_id, session_source_id, deleted_at, created_at
               FROM sources WHERE id = $1"#,
		)
		.bind(id)
		.fetch_optional(&self.pool)
		.await?)
	}
}
