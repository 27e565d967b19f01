//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            // Success
            Self::Success => StatusCode::OK,

            // 404 Not Found
            Self::NotFound
            | Self::VendorNotFound
            | Self::OrderNotFound
            | Self::ProductNotFound
            | Self::UnknownPaymentToken => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::AlreadyExists
            | Self::KeywordExists
            | Self::InvalidTransition
            | Self::OrderAlreadySettled => StatusCode::CONFLICT,

            // 401 Unauthorized
            Self::WebhookUnauthenticated => StatusCode::UNAUTHORIZED,

            // 422 Unprocessable Entity — business-rule rejections
            Self::InsufficientStock
            | Self::ProductInactive
            | Self::StockBelowReserved
            | Self::AmountMismatch
            | Self::LateOrPaidElsewhere => StatusCode::UNPROCESSABLE_ENTITY,

            // 400 Bad Request
            Self::ValidationFailed | Self::InvalidRequest => StatusCode::BAD_REQUEST,

            // 500 Internal Server Error
            Self::Unknown | Self::InternalError | Self::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ErrorCode::ProductNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::InsufficientStock.http_status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ErrorCode::WebhookUnauthenticated.http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ErrorCode::DatabaseError.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
