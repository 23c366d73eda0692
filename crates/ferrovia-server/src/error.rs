//! Error types for the provisioning server

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

/// Failures while serving kickstart/postconfig or running the coordinator
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("no host registered for {0}")]
    HostNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Boot(#[from] ferrovia_boot::BootError),

    #[error(transparent)]
    Model(#[from] ferrovia_common::Error),

    #[error("failed to decrypt group password: {0}")]
    Secret(#[source] anyhow::Error),

    #[error("no secret key configured to decrypt the group password")]
    NoSecretKey,

    #[error("callback client: {0}")]
    Http(#[from] reqwest::Error),
}

impl IntoResponse for ProvisionError {
    fn into_response(self) -> Response {
        error!(error = %self, "Request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

/// Failures starting or running the network services
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Tftp(#[from] ferrovia_tftp::TftpError),

    #[error("failed to bind HTTP listener on {addr}: {source}")]
    HttpBind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid secret key: {0}")]
    Secret(#[source] anyhow::Error),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error("service task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn test_error_response_is_json_500() {
        let response = ProvisionError::HostNotFound("10.0.0.99".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "no host registered for 10.0.0.99");
    }
}
