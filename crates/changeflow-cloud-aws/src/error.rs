//! AWS WAF provider error types and error-code classification

use changeflow_cloud::CodeClassifier;
use thiserror::Error;

/// Error codes returned by the WAF Classic and WAF Regional APIs
pub mod codes {
    pub const STALE_DATA: &str = "WAFStaleDataException";
    pub const NONEXISTENT_ITEM: &str = "WAFNonexistentItemException";
    pub const INTERNAL_ERROR: &str = "WAFInternalErrorException";
    pub const UNAVAILABLE_ENTITY: &str = "WAFUnavailableEntityException";
    pub const INVALID_PARAMETER: &str = "WAFInvalidParameterException";
    pub const LIMITS_EXCEEDED: &str = "WAFLimitsExceededException";
    pub const DISALLOWED_NAME: &str = "WAFDisallowedNameException";
    pub const THROTTLING: &str = "ThrottlingException";
    pub const TOO_MANY_REQUESTS: &str = "TooManyRequestsException";
    pub const REQUEST_LIMIT_EXCEEDED: &str = "RequestLimitExceeded";
    pub const SERVICE_UNAVAILABLE: &str = "ServiceUnavailable";
    pub const ACCESS_DENIED: &str = "AccessDeniedException";

    /// Raised locally when a token is requested for a scope with no endpoint
    pub const UNKNOWN_SCOPE: &str = "ChangeFlowUnknownScope";
    /// Raised locally when the SDK response lacks a required field
    pub const MALFORMED_RESPONSE: &str = "ChangeFlowMalformedResponse";
}

/// Classifier for WAF error codes
pub fn waf_classifier() -> CodeClassifier {
    CodeClassifier::new()
        .stale([codes::STALE_DATA])
        .busy([
            codes::THROTTLING,
            codes::TOO_MANY_REQUESTS,
            codes::REQUEST_LIMIT_EXCEEDED,
            codes::SERVICE_UNAVAILABLE,
            codes::INTERNAL_ERROR,
            codes::UNAVAILABLE_ENTITY,
        ])
        .not_found([codes::NONEXISTENT_ITEM])
}

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("Regional endpoint not configured for {0}")]
    RegionNotConfigured(String),

    #[error("Config error: {0}")]
    Config(#[from] changeflow_config::ConfigError),

    #[error("Cloud error: {0}")]
    Cloud(#[from] changeflow_cloud::CloudError),
}

pub type Result<T> = std::result::Result<T, AwsError>;
