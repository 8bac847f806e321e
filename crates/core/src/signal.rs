//! Process shutdown signal, shared by every server this control plane runs
//! (the tenant API and the OpAMP endpoint) so both drain in step.

use tokio::signal::unix::{SignalKind, signal};

/// Resolves once either `SIGTERM` or `SIGINT` (ctrl-c) is received. Intended
/// for `axum::serve(..).with_graceful_shutdown(signal::shutdown())`.
pub async fn shutdown() {
	let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
	tokio::select! {
		_ = term.recv() => {
			tracing::info!("received SIGTERM, shutting down");
		}
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("received ctrl-c, shutting down");
		}
	}
}
