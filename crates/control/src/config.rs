use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Everything the control plane needs at startup. Loaded once in `main` via
/// [`Config::load`]; every other module takes an `Arc<Config>` (or the
/// specific fields it needs) rather than re-reading the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	/// Postgres connection string backing the token registry, team and
	/// source tables.
	pub database_url: String,

	/// Number of ingestion shards available for assignment. `shard-0` ..
	/// `shard-(N-1)`.
	pub shard_count: u32,

	/// Whether `POST /teams` provisions a real analytical-store database
	/// for the new tenant. Disabled in tests and in single-tenant
	/// deployments that manage storage out of band.
	pub provisioning_enabled: bool,

	/// Admin endpoint of the analytical store (ClickHouse), used only by
	/// the provisioner to run DDL.
	pub admin_host: String,
	pub admin_user: String,
	pub admin_password: String,

	/// Host collectors' exporters are configured to write to; distinct from
	/// `admin_host` because query/write traffic may be load-balanced
	/// separately from DDL.
	pub query_host: String,

	pub opamp_port: u16,
	pub api_port: u16,

	/// `text` (human-readable, for local dev) or `json` (structured, for
	/// production).
	pub log_format: String,

	/// Key used to HMAC-sign every `ServerToAgent` frame; rotate by
	/// restarting the process with a new value. Agents that don't verify
	/// the signature are unaffected, it exists for agents/proxies that do.
	pub opamp_signing_key: String,

	/// Inactivity TTL before an agent registry entry is evicted, in
	/// seconds. Defaults to 5x the assumed 30s heartbeat interval.
	pub agent_ttl_secs: u64,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			database_url: "postgres://localhost/ingest_control".to_string(),
			shard_count: 1,
			provisioning_enabled: true,
			admin_host: "localhost:8123".to_string(),
			admin_user: "default".to_string(),
			admin_password: String::new(),
			query_host: "localhost:8123".to_string(),
			opamp_port: 4320,
			api_port: 8080,
			log_format: "text".to_string(),
			opamp_signing_key: "dev-only-signing-key".to_string(),
			agent_ttl_secs: 150,
		}
	}
}

impl Config {
	/// Merges, in increasing precedence: compiled-in defaults, an optional
	/// `ingest-control.toml` in the working directory, then environment
	/// variables (unprefixed, matching the names in the design: e.g.
	/// `SHARD_COUNT`, `PROVISIONING_ENABLED`, `OPAMP_PORT`).
	pub fn load() -> figment::Result<Self> {
		Self::load_from(None)
	}

	/// Same as [`Config::load`] but with an explicit config file path
	/// (`--config`), overriding the default `ingest-control.toml` lookup.
	pub fn load_from(path: Option<&std::path::Path>) -> figment::Result<Self> {
		let toml_path = path
			.map(|p| p.to_path_buf())
			.unwrap_or_else(|| std::path::PathBuf::from("ingest-control.toml"));
		Figment::new()
			.merge(Serialized::defaults(Config::default()))
			.merge(Toml::file(toml_path))
			.merge(Env::raw().only(&[
				"DATABASE_URL",
				"SHARD_COUNT",
				"PROVISIONING_ENABLED",
				"ADMIN_HOST",
				"ADMIN_USER",
				"ADMIN_PASSWORD",
				"QUERY_HOST",
				"OPAMP_PORT",
				"API_PORT",
				"LOG_FORMAT",
				"OPAMP_SIGNING_KEY",
				"AGENT_TTL_SECS",
			]))
			.extract()
	}
}
