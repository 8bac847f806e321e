//! Tenant storage provisioner (C4): the idempotent DDL sequence that
//! materializes a tenant's database, user, grants, and canonical tables
//! against the analytical store (§4.4).
//!
//! Every statement is `IF NOT EXISTS`/`OR REPLACE`-shaped, so running the
//! whole sequence twice for the same team is a no-op the second time (P6).
//! Statements are collected into an ordered log before they're (optionally)
//! executed, which is what lets tests exercise the exact DDL without a live
//! ClickHouse server (`dry_run`).

use rand::Rng;

use ingest_core::{AppError, AppResult};

/// Wraps an identifier in backticks, the analytical store's quoting
/// character, stripping any embedded backtick first so a malicious or
/// malformed team id can't break out of the identifier position.
fn quote_ident(raw: &str) -> String {
	format!("`{}`", raw.replace('`', ""))
}

/// Single-quotes a string literal, escaping embedded single quotes by
/// doubling them.
fn quote_literal(raw: &str) -> String {
	format!("'{}'", raw.replace('\'', "''"))
}

/// Generates a 48 hex character password from a cryptographically strong
/// RNG (§4.4 step 2).
fn generate_password() -> String {
	let mut bytes = [0u8; 24];
	rand::rng().fill_bytes(&mut bytes);
	hex::encode(bytes)
}

/// Derives the `tenant_<team_id>` database/username pair. Hyphens in the
/// UUID are replaced with underscores since ClickHouse identifiers can't
/// contain them unquoted and we want these names usable un-quoted in
/// operator tooling.
pub fn tenant_identifiers(team_id: uuid::Uuid) -> (String, String) {
	let slug = team_id.simple().to_string();
	(format!("tenant_{slug}"), format!("tenant_{slug}"))
}

/// Credentials returned from provisioning, exactly once (§3, I5-adjacent:
/// the password is never re-derivable, only re-selectable by an explicit
/// opt-in read of the `ManagedConnection` row).
#[derive(Debug, Clone)]
pub struct ProvisionedStorage {
	pub database: String,
	pub username: String,
	pub password: String,
	/// The ordered DDL statements executed (or, in `dry_run` mode, that
	/// would have been executed). Supports P6 without a live store.
	pub statements: Vec<String>,
}

fn canonical_table_statements(database: &str) -> Vec<String> {
	let db = quote_ident(database);
	vec![
		format!(
			r#"CREATE TABLE IF NOT EXISTS {db}.otel_logs (
    Timestamp DateTime64(9) CODEC(Delta, ZSTD(1)),
    TraceId String,
    SpanId String,
    SeverityText LowCardinality(String),
    SeverityNumber Int32,
    ServiceName LowCardinality(String),
    Body String CODEC(ZSTD(1)),
    ResourceAttributes Map(LowCardinality(String), String),
    LogAttributes Map(LowCardinality(String), String),
    INDEX idx_body Body TYPE tokenbf_v1(30720, 3, 0) GRANULARITY 1,
    INDEX idx_res_attr_key mapKeys(ResourceAttributes) TYPE bloom_filter GRANULARITY 1,
    INDEX idx_res_attr_val mapValues(ResourceAttributes) TYPE bloom_filter GRANULARITY 1,
    INDEX idx_log_attr_key mapKeys(LogAttributes) TYPE bloom_filter GRANULARITY 1,
    INDEX idx_log_attr_val mapValues(LogAttributes) TYPE bloom_filter GRANULARITY 1
) ENGINE = MergeTree
PARTITION BY toDate(Timestamp)
ORDER BY (ServiceName, Timestamp)
TTL toDateTime(Timestamp) + INTERVAL 30 DAY"#
		),
		format!(
			r#"CREATE TABLE IF NOT EXISTS {db}.otel_traces (
    Timestamp DateTime64(9) CODEC(Delta, ZSTD(1)),
    TraceId String,
    SpanId String,
    ParentSpanId String,
    SpanName LowCardinality(String),
    ServiceName LowCardinality(String),
    Duration Int64 CODEC(ZSTD(1)),
    StatusCode LowCardinality(String),
    ResourceAttributes Map(LowCardinality(String), String),
    SpanAttributes Map(LowCardinality(String), String),
    Events.Timestamp Array(DateTime64(9)),
    Events.Name Array(LowCardinality(String)),
    Events.Attributes Array(Map(LowCardinality(String), String)),
    INDEX idx_duration Duration TYPE minmax GRANULARITY 1
) ENGINE = MergeTree
PARTITION BY toDate(Timestamp)
ORDER BY (ServiceName, SpanName, Timestamp)
TTL toDateTime(Timestamp) + INTERVAL 30 DAY"#
		),
		format!(
			r#"CREATE TABLE IF NOT EXISTS {db}.hyperdx_sessions (
    Timestamp DateTime64(9) CODEC(Delta, ZSTD(1)),
    TraceId String,
    SpanId String,
    SeverityText LowCardinality(String),
    SeverityNumber Int32,
    ServiceName LowCardinality(String),
    Body String CODEC(ZSTD(1)),
    SessionId String MATERIALIZED ResourceAttributes['rum.sessionId'],
    ResourceAttributes Map(LowCardinality(String), String),
    LogAttributes Map(LowCardinality(String), String)
) ENGINE = MergeTree
PARTITION BY toDate(Timestamp)
ORDER BY (ServiceName, SessionId, Timestamp)
TTL toDateTime(Timestamp) + INTERVAL 30 DAY"#
		),
		format!(
			r#"CREATE TABLE IF NOT EXISTS {db}.otel_metrics_gauge (
    TimeUnix DateTime64(9) CODEC(Delta, ZSTD(1)),
    MetricName LowCardinality(String),
    ServiceName LowCardinality(String),
    Value Float64,
    Attributes Map(LowCardinality(String), String)
) ENGINE = MergeTree
PARTITION BY toDate(TimeUnix)
ORDER BY (MetricName, ServiceName, TimeUnix)"#
		),
		format!(
			r#"CREATE TABLE IF NOT EXISTS {db}.otel_metrics_sum (
    TimeUnix DateTime64(9) CODEC(Delta, ZSTD(1)),
    MetricName LowCardinality(String),
    ServiceName LowCardinality(String),
    Value Float64,
    IsMonotonic Bool,
    Attributes Map(LowCardinality(String), String)
) ENGINE = MergeTree
PARTITION BY toDate(TimeUnix)
ORDER BY (MetricName, ServiceName, TimeUnix)"#
		),
		format!(
			r#"CREATE TABLE IF NOT EXISTS {db}.otel_metrics_histogram (
    TimeUnix DateTime64(9) CODEC(Delta, ZSTD(1)),
    MetricName LowCardinality(String),
    ServiceName LowCardinality(String),
    Count UInt64,
    Sum Float64,
    BucketCounts Array(UInt64),
    ExplicitBounds Array(Float64),
    Attributes Map(LowCardinality(String), String)
) ENGINE = MergeTree
PARTITION BY toDate(TimeUnix)
ORDER BY (MetricName, ServiceName, TimeUnix)"#
		),
	]
}

/// Builds the ordered DDL statement sequence for `team_id` (§4.4 steps
/// 1-3), without executing anything. Pure and deterministic given a
/// pre-generated password, which is what makes the dry-run path usable in
/// tests that need to assert on exact statement text.
fn build_statements(database: &str, username: &str, password: &str) -> Vec<String> {
	let db = quote_ident(database);
	let user = quote_ident(username);
	let mut statements = vec![
		format!("CREATE DATABASE IF NOT EXISTS {db}"),
		format!(
			"CREATE USER IF NOT EXISTS {user} IDENTIFIED BY {}",
			quote_literal(password)
		),
		format!("GRANT SELECT, INSERT, ALTER, CREATE, DROP, TRUNCATE ON {db}.* TO {user}"),
	];
	statements.extend(canonical_table_statements(database));
	statements
}

#[derive(Clone)]
pub struct Provisioner {
	client: clickhouse::Client,
	dry_run: bool,
}

impl std::fmt::Debug for Provisioner {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Provisioner")
			.field("dry_run", &self.dry_run)
			.finish_non_exhaustive()
	}
}

impl Provisioner {
	pub fn new(admin_host: &str, admin_user: &str, admin_password: &str) -> Self {
		let client = clickhouse::Client::default()
			.with_url(format!("http://{admin_host}"))
			.with_user(admin_user)
			.with_password(admin_password);
		Self {
			client,
			dry_run: false,
		}
	}

	/// A provisioner that records statements without ever calling out to an
	/// analytical store, for tests (SPEC_FULL §C.7) and for
	/// `PROVISIONING_ENABLED=false` deployments.
	pub fn dry_run() -> Self {
		Self {
			client: clickhouse::Client::default(),
			dry_run: true,
		}
	}

	/// Runs the full idempotent DDL sequence for `team_id` (§4.4). Safe to
	/// call repeatedly: every statement is `IF NOT EXISTS`-guarded, so a
	/// second call is a no-op against the store (P6) and simply
	/// re-generates (and discards) a password that's never persisted by
	/// this function — the caller only persists the `ManagedConnection`
	/// from the *first* successful call.
	pub async fn ensure_tenant_storage(
		&self,
		team_id: uuid::Uuid,
	) -> AppResult<ProvisionedStorage> {
		let (database, username) = tenant_identifiers(team_id);
		let password = generate_password();
		let statements = build_statements(&database, &username, &password);

		if !self.dry_run {
			for statement in &statements {
				self.client
					.query(statement)
					.execute()
					.await
					.map_err(|error| AppError::ProvisioningFailed(error.to_string()))?;
			}
		}

		tracing::info!(
			target = "audit",
			action = "provision.ensure_tenant_storage",
			team_id = %team_id,
			database = %database,
			statement_count = statements.len(),
			dry_run = self.dry_run,
			"tenant storage provisioned"
		);

		Ok(ProvisionedStorage {
			database,
			username,
			password,
			statements,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn quoting_strips_embedded_backticks() {
		assert_eq!(quote_ident("te`nant"), "`tenant`");
	}

	#[test]
	fn literal_escapes_embedded_quotes() {
		assert_eq!(quote_literal("a'b"), "'a''b'");
	}

	#[test]
	fn statement_sequence_is_idempotent_shaped() {
		let statements = build_statements("tenant_x", "tenant_x", "deadbeef");
		assert!(statements[0].starts_with("CREATE DATABASE IF NOT EXISTS"));
		assert!(statements[1].starts_with("CREATE USER IF NOT EXISTS"));
		assert!(statements[2].starts_with("GRANT"));
		assert_eq!(statements.len(), 3 + 6);
		assert!(
			statements
				.iter()
				.skip(3)
				.all(|s| s.contains("IF NOT EXISTS"))
		);
	}

	#[tokio::test]
	async fn dry_run_never_touches_the_network_and_records_statements() {
		let provisioner = Provisioner::dry_run();
		let team_id = uuid::Uuid::new_v4();
		let result = provisioner.ensure_tenant_storage(team_id).await.unwrap();
		assert_eq!(result.statements.len(), 9);
		assert!(result.database.starts_with("tenant_"));
		assert_eq!(result.password.len(), 48);
	}

	#[tokio::test]
	async fn running_twice_is_deterministic_in_shape() {
		let provisioner = Provisioner::dry_run();
		let team_id = uuid::Uuid::new_v4();
		let first = provisioner.ensure_tenant_storage(team_id).await.unwrap();
		let second = provisioner.ensure_tenant_storage(team_id).await.unwrap();
		assert_eq!(first.database, second.database);
		assert_eq!(first.statements.len(), second.statements.len());
	}
}
