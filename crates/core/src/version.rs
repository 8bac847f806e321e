use serde::Serialize;

/// Build metadata surfaced on the admin/debug endpoints. Filled in from
/// `CARGO_PKG_VERSION` at compile time; nothing here is dynamic.
#[derive(Serialize, Debug, Clone)]
pub struct BuildInfo {
	pub version: &'static str,
	pub rust_version: &'static str,
}

impl BuildInfo {
	pub fn new() -> Self {
		Self {
			version: env!("CARGO_PKG_VERSION"),
			rust_version: option_env!("CARGO_PKG_RUST_VERSION").unwrap_or("unknown"),
		}
	}
}

impl Default for BuildInfo {
	fn default() -> Self {
		Self::new()
	}
}
