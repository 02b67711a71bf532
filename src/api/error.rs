use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::MarketplaceError;

impl MarketplaceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::PricingUnavailable(_)
            | Self::CampaignInactive
            | Self::CampaignIneligible(_)
            | Self::AffiliateCodeInvalid(_)
            | Self::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidTransition { .. } | Self::InsufficientStock(_) | Self::ConcurrentUpdate(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Payment(_) => StatusCode::BAD_GATEWAY,
            Self::CheckoutReconciliationFailure { .. } | Self::Storage(_) | Self::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for MarketplaceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        }
        let body = serde_json::json!({ "error": self.kind(), "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for MarketplaceError {
    fn from(e: validator::ValidationErrors) -> Self { Self::InvalidRequest(e.to_string()) }
}
