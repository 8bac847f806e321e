use axum::Json;
use axum::response::IntoResponse;
use http::StatusCode;
use serde::Serialize;
use tracing::error;

/// The error taxonomy from the control plane's design: every failure a
/// request handler can produce maps to exactly one of these kinds, which in
/// turn maps to exactly one HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
	#[error("not found")]
	NotFound,

	#[error("forbidden")]
	Forbidden,

	#[error("invalid request: {0}")]
	Invalid(String),

	#[error("no free shard available")]
	ShardsExhausted,

	#[error("tenant storage provisioning failed: {0}")]
	ProvisioningFailed(String),

	#[error("opamp agent is misconfigured: {0}")]
	AgentMisconfigured(String),

	#[error("database error")]
	Sqlx(#[from] sqlx::Error),

	#[error("analytical store error")]
	Clickhouse(#[from] clickhouse::error::Error),

	#[error(transparent)]
	Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Serialize)]
struct ErrorBody {
	error: String,
	message: String,
}

impl IntoResponse for AppError {
	fn into_response(self) -> axum::response::Response {
		let status = match &self {
			AppError::NotFound => StatusCode::NOT_FOUND,
			AppError::Forbidden => StatusCode::FORBIDDEN,
			AppError::Invalid(_) => StatusCode::BAD_REQUEST,
			AppError::ShardsExhausted => StatusCode::CONFLICT,
			AppError::ProvisioningFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
			AppError::AgentMisconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
			AppError::Sqlx(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
			AppError::Sqlx(_) => StatusCode::INTERNAL_SERVER_ERROR,
			AppError::Clickhouse(_) => StatusCode::INTERNAL_SERVER_ERROR,
			AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
		};

		if status.is_server_error() {
			error!(target = "audit", error = %self, "request failed");
		}

		let kind = match &self {
			AppError::NotFound => "NOT_FOUND",
			AppError::Forbidden => "FORBIDDEN",
			AppError::Invalid(_) => "INVALID",
			AppError::ShardsExhausted => "SHARDS_EXHAUSTED",
			AppError::ProvisioningFailed(_) => "PROVISIONING_FAILED",
			AppError::AgentMisconfigured(_) => "AGENT_MISCONFIGURED",
			_ => "INTERNAL",
		};

		let body = ErrorBody {
			error: kind.to_string(),
			message: self.to_string(),
		};
		(status, Json(body)).into_response()
	}
}
