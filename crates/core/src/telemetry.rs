use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

/// Initializes the global `tracing` subscriber. `json` selects the
/// machine-readable formatter (for production); otherwise a compact
/// human-readable formatter is used (for local development).
///
/// Idempotent-ish: called once from each binary's `main`, never from
/// library code, so tests construct their own subscribers where needed.
pub fn init(json: bool) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let builder = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_span_events(FmtSpan::CLOSE);
	if json {
		builder.json().init();
	} else {
		builder.compact().init();
	}
}
