//! Retry classification for failed exchanges.

use reqwest::StatusCode;

use crate::response::ErrorDetail;

/// Default number of attempts per call.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default delay between attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1000;

/// Error codes the gateway uses to signal throttling (spike arrest).
pub const RETRYABLE_ERROR_CODES: &[&str] = &["PB-APIM-ERR-1003"];

/// Whether a failed exchange should be attempted again.
///
/// Only throttling is transient; every other failure is terminal on first
/// occurrence, whatever its status.
pub fn should_retry(_status: StatusCode, errors: &[ErrorDetail]) -> bool {
    errors
        .iter()
        .any(|e| RETRYABLE_ERROR_CODES.contains(&e.code.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_retry_throttled() {
        let errors = vec![ErrorDetail::new("PB-APIM-ERR-1003", "Spike arrest violation")];
        assert!(should_retry(StatusCode::TOO_MANY_REQUESTS, &errors));
    }

    #[test]
    fn test_should_retry_throttled_among_others() {
        let errors = vec![
            ErrorDetail::new("1001", "Invalid postal code"),
            ErrorDetail::new("PB-APIM-ERR-1003", "Spike arrest violation"),
        ];
        assert!(should_retry(StatusCode::BAD_REQUEST, &errors));
    }

    #[test]
    fn test_should_not_retry_other_errors() {
        let errors = vec![ErrorDetail::new("1001", "Invalid postal code")];
        assert!(!should_retry(StatusCode::BAD_REQUEST, &errors));

        let errors = vec![ErrorDetail::new("PB-APIM-ERR-1001", "Invalid API key")];
        assert!(!should_retry(StatusCode::UNAUTHORIZED, &errors));
    }

    #[test]
    fn test_should_not_retry_on_status_alone() {
        assert!(!should_retry(StatusCode::TOO_MANY_REQUESTS, &[]));
        assert!(!should_retry(StatusCode::SERVICE_UNAVAILABLE, &[]));
    }
}
