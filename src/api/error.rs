use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

pub const INTERNAL_SERVER_ERROR: &str = "Internal server error";

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub detail: Option<String>,
}

/// JSON body shared by every failure the entry layer produces itself.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            detail: None,
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    /// Generic 500. `detail` is only rendered when `expose` is set.
    pub fn internal(detail: impl Into<String>, expose: bool) -> Self {
        let mut error = Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_SERVER_ERROR);
        if expose {
            error.detail = Some(detail.into());
        }
        error
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            success: false,
            message: self.message,
            error: self.detail,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_string(response: Response) -> String {
        match to_bytes(response.into_body(), usize::MAX).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) => panic!("failed to read body: {err}"),
        }
    }

    #[tokio::test]
    async fn forbidden_has_no_detail() {
        let response = ApiError::forbidden("Not allowed by CORS").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_string(response).await,
            r#"{"success":false,"message":"Not allowed by CORS"}"#
        );
    }

    #[tokio::test]
    async fn internal_hides_detail_unless_exposed() {
        let hidden = ApiError::internal("JWT secret is not configured", false).into_response();
        assert_eq!(hidden.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_string(hidden).await,
            r#"{"success":false,"message":"Internal server error"}"#
        );

        let exposed = ApiError::internal("JWT secret is not configured", true).into_response();
        assert_eq!(
            body_string(exposed).await,
            r#"{"success":false,"message":"Internal server error","error":"JWT secret is not configured"}"#
        );
    }
}
