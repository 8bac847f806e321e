use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use ingest_control::agent_registry::AgentRegistry;
use ingest_control::config::Config;
use ingest_control::provision::Provisioner;
use ingest_control::registry::TokenRegistry;
use ingest_control::sign::ResponseSigner;
use ingest_control::team::{ManagedConnectionStore, SourceStore, TeamStore};
use ingest_control::{AppState, api_router, opamp_router};
use sqlx::postgres::PgPoolOptions;

/// The multi-tenant OpenTelemetry ingestion control plane: ingestion-token
/// lifecycle, shard allocation, tenant storage provisioning, and the OpAMP
/// endpoint that configures each shard's collector.
#[derive(Parser, Debug)]
#[command(name = "ingest-control")]
struct Cli {
	/// Path to a TOML config file, overriding the default
	/// `ingest-control.toml` lookup in the working directory.
	#[arg(long)]
	config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	let config = Config::load_from(cli.config.as_deref()).context("loading configuration")?;
	ingest_core::telemetry::init(config.log_format == "json");

	tracing::info!(
		target = "audit",
		action = "startup",
		shard_count = config.shard_count,
		"ingestion control plane starting"
	);

	let pool = PgPoolOptions::new()
		.max_connections(10)
		.connect(&config.database_url)
		.await
		.context("connecting to control-plane database")?;
	sqlx::migrate!("./migrations")
		.run(&pool)
		.await
		.context("running database migrations")?;

	let provisioner = if config.provisioning_enabled {
		Provisioner::new(
			&config.admin_host,
			&config.admin_user,
			&config.admin_password,
		)
	} else {
		Provisioner::dry_run()
	};

	let state = AppState {
		registry: TokenRegistry::new(pool.clone(), config.shard_count),
		teams: TeamStore::new(pool.clone()),
		sources: SourceStore::new(pool.clone()),
		connections: ManagedConnectionStore::new(pool.clone()),
		provisioner,
		agents: AgentRegistry::new(Duration::from_secs(config.agent_ttl_secs)),
		signer: ResponseSigner::new(&config.opamp_signing_key),
		config: Arc::new(config.clone()),
	};

	let sweep_agents = state.agents.clone();
	tokio::spawn(async move {
		let mut interval = tokio::time::interval(Duration::from_secs(30));
		loop {
			interval.tick().await;
			sweep_agents.sweep().await;
		}
	});

	let api_listener = tokio::net::TcpListener::bind(("0.0.0.0", config.api_port))
		.await
		.with_context(|| format!("binding tenant API to port {}", config.api_port))?;
	let opamp_listener = tokio::net::TcpListener::bind(("0.0.0.0", config.opamp_port))
		.await
		.with_context(|| format!("binding OpAMP endpoint to port {}", config.opamp_port))?;

	tracing::info!(
		target = "audit",
		action = "listening",
		api_port = config.api_port,
		opamp_port = config.opamp_port,
		"control plane ready"
	);

	let api_server = axum::serve(api_listener, api_router(state.clone()))
		.with_graceful_shutdown(ingest_core::signal::shutdown());
	let opamp_server = axum::serve(opamp_listener, opamp_router(state))
		.with_graceful_shutdown(ingest_core::signal::shutdown());

	tokio::try_join!(api_server, opamp_server).context("serving HTTP")?;
	Ok(())
}
