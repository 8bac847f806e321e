//! Ingestion token registry (C3): the durable record of
//! `(team, hashed token, shard, status)` and the only place token CRUD
//! happens. Shard selection at create-time and atomicity at rotate-time are
//! the two subtle parts (§4.3); everything else is ordinary CRUD.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Uuid;
use sqlx::{PgPool, Postgres, Transaction};

use ingest_core::{AppError, AppResult};

use crate::shard;
use crate::token;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
	Active,
	Revoked,
}

/// The canonical durable entity (§3). The plaintext token is never a field
/// here — see [`IssuedToken`] for the one-time exception at issuance.
#[derive(sqlx::FromRow, Serialize, Clone, Debug)]
pub struct IngestionTokenRecord {
	pub id: Uuid,
	pub team_id: Uuid,
	#[serde(skip)]
	pub token_hash: String,
	pub token_prefix: String,
	pub status: TokenStatus,
	pub assigned_shard: Option<String>,
	pub description: Option<String>,
	pub last_used_at: Option<DateTime<Utc>>,
	pub revoked_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// Returned once, at creation or rotation. `token` is the plaintext; after
/// this response is sent, it exists nowhere durable (I5).
#[derive(Serialize, Debug)]
pub struct IssuedToken {
	pub token: String,
	pub record: IngestionTokenRecord,
}

/// What [`TokenRegistry::resolve`] returns for an active token: the minimum
/// needed to route an OTLP request to the right tenant and shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedToken {
	pub token_id: Uuid,
	pub team_id: Uuid,
	pub assigned_shard: String,
}

#[derive(Clone, Debug)]
pub struct TokenRegistry {
	pool: PgPool,
	shard_count: u32,
}

impl TokenRegistry {
	pub fn new(pool: PgPool, shard_count: u32) -> Self {
		Self { pool, shard_count }
	}

	/// Current shard occupied by `team_id`'s active tokens, if any (I4:
	/// every active token of a team shares one shard, so the first row is
	/// representative).
	async fn team_shard(
		tx: &mut Transaction<'_, Postgres>,
		team_id: Uuid,
	) -> AppResult<Option<String>> {
		Ok(sqlx::query_scalar::<_, String>(
			"SELECT assigned_shard FROM ingestion_tokens WHERE team_id = $1 AND status = 'active' AND assigned_shard IS NOT NULL LIMIT 1",
		)
		.bind(team_id)
		.fetch_optional(&mut **tx)
		.await?)
	}

	async fn occupied_shards(
		tx: &mut Transaction<'_, Postgres>,
		excluding_team: Uuid,
	) -> AppResult<HashSet<String>> {
		let rows: Vec<String> = sqlx::query_scalar(
			"SELECT DISTINCT assigned_shard FROM ingestion_tokens WHERE status = 'active' AND assigned_shard IS NOT NULL AND team_id <> $1",
		)
		.bind(excluding_team)
		.fetch_all(&mut **tx)
		.await?;
		Ok(rows.into_iter().collect())
	}

	/// Creates a new active token for `team_id`. If the team already has an
	/// active token, the new one inherits its shard (I4); otherwise the
	/// shard allocator (C2) picks the lowest free index across every
	/// *other* team's occupancy.
	pub async fn create(&self, team_id: Uuid, description: Option<&str>) -> AppResult<IssuedToken> {
		let mut tx = self.pool.begin().await?;
		let shard = match Self::team_shard(&mut tx, team_id).await? {
			Some(existing) => existing,
			None => {
				let occupied = Self::occupied_shards(&mut tx, team_id).await?;
				shard::allocate(self.shard_count, &occupied)?
			}
		};
		let plaintext = token::generate();
		let record = sqlx::query_as::<_, IngestionTokenRecord>(
			r#"INSERT INTO ingestion_tokens (team_id, token_hash, token_prefix, status, assigned_shard, description)
               VALUES ($1, $2, $3, 'active', $4, $5)
               RETURNING id, team_id, token_hash, token_prefix, status, assigned_shard, description,
                         last_used_at, revoked_at, created_at, updated_at"#,
		)
		.bind(team_id)
		.bind(token::hash(&plaintext))
		.bind(token::prefix(&plaintext))
		.bind(&shard)
		.bind(description)
		.fetch_one(&mut *tx)
		.await?;
		tx.commit().await?;
		tracing::info!(target = "audit", action = "token.create", team_id = %team_id, token_id = %record.id, shard = %shard, "ingestion token created");
		Ok(IssuedToken {
			token: plaintext,
			record,
		})
	}

	pub async fn list(&self, team_id: Uuid) -> AppResult<Vec<IngestionTokenRecord>> {
		Ok(sqlx::query_as::<_, IngestionTokenRecord>(
			r#"SELECT id, team_id, token_hash, token_prefix, status, assigned_shard, description,
                      last_used_at, revoked_at, created_at, updated_at
               FROM ingestion_tokens WHERE team_id = $1 ORDER BY created_at DESC"#,
		)
		.bind(team_id)
		.fetch_all(&self.pool)
		.await?)
	}

	pub async fn get(&self, team_id: Uuid, token_id: Uuid) -> AppResult<IngestionTokenRecord> {
		sqlx::query_as::<_, IngestionTokenRecord>(
			r#"SELECT id, team_id, token_hash, token_prefix, status, assigned_shard, description,
                      last_used_at, revoked_at, created_at, updated_at
               FROM ingestion_tokens WHERE id = $1 AND team_id = $2"#,
		)
		.bind(token_id)
		.bind(team_id)
		.fetch_optional(&self.pool)
		.await?
		.ok_or(AppError::NotFound)
	}

	/// Rotates `token_id`: a new active token on the same shard becomes
	/// resolvable and the old one stops being resolvable, both within one
	/// transaction, so no concurrent `resolve` ever sees both or neither
	/// (P3).
	pub async fn rotate(&self, team_id: Uuid, token_id: Uuid) -> AppResult<IssuedToken> {
		let mut tx = self.pool.begin().await?;
		let old = sqlx::query_as::<_, IngestionTokenRecord>(
			r#"SELECT id, team_id, token_hash, token_prefix, status, assigned_shard, description,
                      last_used_at, revoked_at, created_at, updated_at
               FROM ingestion_tokens WHERE id = $1 AND team_id = $2 AND status = 'active' FOR UPDATE"#,
		)
		.bind(token_id)
		.bind(team_id)
		.fetch_optional(&mut *tx)
		.await?
		.ok_or(AppError::NotFound)?;

		let plaintext = token::generate();
		let new_record = sqlx::query_as::<_, IngestionTokenRecord>(
			r#"INSERT INTO ingestion_tokens (team_id, token_hash, token_prefix, status, assigned_shard, description)
               VALUES ($1, $2, $3, 'active', $4, $5)
               RETURNING id, team_id, token_hash, token_prefix, status, assigned_shard, description,
                         last_used_at, revoked_at, created_at, updated_at"#,
		)
		.bind(team_id)
		.bind(token::hash(&plaintext))
		.bind(token::prefix(&plaintext))
		.bind(&old.assigned_shard)
		.bind(&old.description)
		.fetch_one(&mut *tx)
		.await?;

		sqlx::query("UPDATE ingestion_tokens SET status = 'revoked', revoked_at = now(), updated_at = now() WHERE id = $1")
			.bind(old.id)
			.execute(&mut *tx)
			.await?;

		tx.commit().await?;
		tracing::info!(target = "audit", action = "token.rotate", team_id = %team_id, old_token_id = %old.id, new_token_id = %new_record.id, "ingestion token rotated");
		Ok(IssuedToken {
			token: plaintext,
			record: new_record,
		})
	}

	pub async fn revoke(&self, team_id: Uuid, token_id: Uuid) -> AppResult<IngestionTokenRecord> {
		let record = sqlx::query_as::<_, IngestionTokenRecord>(
			r#"UPDATE ingestion_tokens SET status = 'revoked', revoked_at = now(), updated_at = now()
               WHERE id = $1 AND team_id = $2 AND status = 'active'
               RETURNING id, team_id, token_hash, token_prefix, status, assigned_shard, description,
                         last_used_at, revoked_at, created_at, updated_at"#,
		)
		.bind(token_id)
		.bind(team_id)
		.fetch_optional(&self.pool)
		.await?
		.ok_or(AppError::NotFound)?;
		tracing::info!(target = "audit", action = "token.revoke", team_id = %team_id, token_id = %record.id, "ingestion token revoked");
		Ok(record)
	}

	/// Resolves a plaintext ingestion token to its owning team and shard.
	/// Never raises: an unknown or revoked token simply resolves to
	/// `None`, which is how OTLP auth middleware tells "reject" from
	/// "error".
	pub async fn resolve(&self, plaintext: &str) -> AppResult<Option<ResolvedToken>> {
		let hash = token::hash(plaintext);
		let row = sqlx::query_as::<_, (Uuid, Uuid, Option<String>)>(
			"SELECT id, team_id, assigned_shard FROM ingestion_tokens WHERE token_hash = $1 AND status = 'active'",
		)
		.bind(&hash)
		.fetch_optional(&self.pool)
		.await?;
		Ok(row.and_then(|(token_id, team_id, shard)| {
			shard.map(|assigned_shard| ResolvedToken {
				token_id,
				team_id,
				assigned_shard,
			})
		}))
	}

	/// Updates `last_used_at`. Errors are logged and swallowed: a failure
	/// here must never fail the OTLP request that triggered it.
	pub async fn mark_used(&self, token_id: Uuid) {
		if let Err(error) =
			sqlx::query("UPDATE ingestion_tokens SET last_used_at = now() WHERE id = $1")
				.bind(token_id)
				.execute(&self.pool)
				.await
		{
			tracing::warn!(target = "audit", action = "token.mark_used", token_id = %token_id, %error, "failed to record token usage");
		}
	}

	/// Administrative shard reassignment. Permitted even when it would
	/// violate I3 (one tenant per shard) — that's an operator override,
	/// not a bug — but it is logged as a policy-violation warning so it is
	/// visible in audit logs.
	pub async fn assign_shard(
		&self,
		team_id: Uuid,
		token_id: Uuid,
		shard: &str,
	) -> AppResult<IngestionTokenRecord> {
		let conflicting: Option<Uuid> = sqlx::query_scalar(
			"SELECT team_id FROM ingestion_tokens WHERE assigned_shard = $1 AND status = 'active' AND team_id <> $2 LIMIT 1",
		)
		.bind(shard)
		.bind(team_id)
		.fetch_optional(&self.pool)
		.await?;
		if let Some(other_team) = conflicting {
			tracing::warn!(
				target = "audit",
				action = "token.assign_shard",
				outcome = "policy_violation",
				shard = %shard,
				team_id = %team_id,
				other_team_id = %other_team,
				"assign_shard violates I3 (one tenant per shard); proceeding as an operator override"
			);
		}
		let record = sqlx::query_as::<_, IngestionTokenRecord>(
			r#"UPDATE ingestion_tokens SET assigned_shard = $1, updated_at = now()
               WHERE id = $2 AND team_id = $3 AND status = 'active'
               RETURNING id, team_id, token_hash, token_prefix, status, assigned_shard, description,
                         last_used_at, revoked_at, created_at, updated_at"#,
		)
		.bind(shard)
		.bind(token_id)
		.bind(team_id)
		.fetch_optional(&self.pool)
		.await?
		.ok_or(AppError::NotFound)?;
		Ok(record)
	}

	/// Distinct team ids with an active token on `shard_id`, used by the
	/// config synthesizer (C7). Ordered so the caller can deterministically
	/// pick the lexicographically smallest when more than one team is
	/// (incorrectly) bound to the same shard.
	pub async fn teams_on_shard(&self, shard_id: &str) -> AppResult<Vec<Uuid>> {
		Ok(sqlx::query_scalar(
			"SELECT DISTINCT team_id FROM ingestion_tokens WHERE assigned_shard = $1 AND status = 'active' ORDER BY team_id",
		)
		.bind(shard_id)
		.fetch_all(&self.pool)
		.await?)
	}
}
