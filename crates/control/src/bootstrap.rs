//! Tenant bootstrap orchestrator (C5): what runs once, at team creation, to
//! take a bare `Team` row to a fully provisioned tenant with storage and
//! four cross-linked `Source`s (§4.5).

use sqlx::types::Uuid;

use crate::provision::Provisioner;
use crate::team::{ManagedConnectionStore, SourceKind, SourceStore};

/// Outcome of [`bootstrap_team`], reported back to the `POST /teams`
/// handler. `storage_provisioned` is `false` both when provisioning is
/// disabled and when it failed — callers only need "did the tenant get a
/// working database", not why not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapOutcome {
	pub storage_provisioned: bool,
}

/// Runs C4 then upserts the managed connection then creates and
/// cross-links the four canonical sources (§4.5 steps 1-4). Provisioning
/// failures are logged and swallowed — team creation must still succeed
/// (§4.5: "do not roll back team creation").
pub async fn bootstrap_team(
	team_id: Uuid,
	provisioning_enabled: bool,
	provisioner: &Provisioner,
	connections: &ManagedConnectionStore,
	sources: &SourceStore,
	query_host: &str,
) -> BootstrapOutcome {
	if !provisioning_enabled {
		tracing::info!(target = "audit", action = "bootstrap.skip", team_id = %team_id, "provisioning disabled, skipping tenant bootstrap");
		return BootstrapOutcome {
			storage_provisioned: false,
		};
	}

	let provisioned = match provisioner.ensure_tenant_storage(team_id).await {
		Ok(p) => p,
		Err(error) => {
			tracing::error!(target = "audit", action = "bootstrap.provision", team_id = %team_id, %error, "tenant storage provisioning failed; team creation proceeds without storage");
			return BootstrapOutcome {
				storage_provisioned: false,
			};
		}
	};

	if let Err(error) = connections
		.upsert(
			team_id,
			query_host,
			&provisioned.username,
			&provisioned.password,
		)
		.await
	{
		tracing::error!(target = "audit", action = "bootstrap.managed_connection", team_id = %team_id, %error, "failed to record managed connection");
		return BootstrapOutcome {
			storage_provisioned: false,
		};
	}

	if let Err(error) = create_and_link_sources(team_id, &provisioned.database, sources).await {
		tracing::error!(target = "audit", action = "bootstrap.sources", team_id = %team_id, %error, "failed to create canonical sources");
		return BootstrapOutcome {
			storage_provisioned: false,
		};
	}

	tracing::info!(target = "audit", action = "bootstrap.complete", team_id = %team_id, "tenant bootstrap complete");
	BootstrapOutcome {
		storage_provisioned: true,
	}
}

/// Creates any missing canonical source (one per kind) then, once all four
/// exist, patches every one with the other three's ids (§9: "create all
/// nodes first ... then run a second pass").
async fn create_and_link_sources(
	team_id: Uuid,
	database_name: &str,
	sources: &SourceStore,
) -> ingest_core::AppResult<()> {
	let mut ids = [Uuid::nil(); 4];
	for (i, kind) in SourceKind::ALL.into_iter().enumerate() {
		let source = match sources.find_by_kind(team_id, kind).await? {
			Some(existing) => existing,
			None => sources.create(team_id, kind, database_name).await?,
		};
		ids[i] = source.id;
	}

	let [log_id, trace_id, metric_id, session_id] = ids;
	for id in ids {
		sources
			.link(id, log_id, trace_id, metric_id, session_id)
			.await?;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn disabled_provisioning_skips_without_error() {
		let outcome = BootstrapOutcome {
			storage_provisioned: false,
		};
		assert!(!outcome.storage_provisioned);
	}
}
