use thiserror::Error;

/// Error types returned by every credential operation.
///
/// Each variant is one failure *kind*; the payload is a human-readable
/// message that is safe to show to the caller. Kinds map one-to-one onto
/// HTTP status codes through [`AuthError::status_code`], so a transport
/// adapter never has to inspect messages.
///
/// # Error Categories
///
/// - **Caller errors**: `BadRequest`, `Invalid`, `Gone`, `TooManyRequests`
/// - **Credential errors**: `Unauthorized`
/// - **System errors**: `Unexpected`
///
/// # Example
///
/// ```rust
/// use phone_auth::{AuthConfig, AuthError, CredentialService};
///
/// # async fn example() -> Result<(), AuthError> {
/// let service = CredentialService::builder(AuthConfig::testing())
///     .build_and_init()
///     .await?;
///
/// match service.confirm_challenge("+15551234567", "000000", None).await {
///     Ok(pair) => println!("logged in on device {}", pair.device_id),
///     Err(AuthError::Gone(_)) => println!("no code was requested, or it expired"),
///     Err(AuthError::Invalid(_)) => println!("wrong code"),
///     Err(AuthError::TooManyRequests(_)) => println!("locked out for now"),
///     Err(e) => println!("other error: {e}"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The input is malformed: a phone number that does not look like one,
    /// a code of the wrong shape, an empty token.
    #[error("{0}")]
    BadRequest(String),

    /// The input is well-formed but semantically wrong, such as an OTP code
    /// that does not match the outstanding challenge.
    #[error("{0}")]
    Invalid(String),

    /// The resource the caller refers to no longer exists. Returned when an
    /// OTP is redeemed after its window elapsed or after it was consumed.
    #[error("{0}")]
    Gone(String),

    /// A throttle limit or the OTP attempt cap was exceeded.
    #[error("{0}")]
    TooManyRequests(String),

    /// A token or session check failed.
    ///
    /// Plain invalid tokens and detected refresh-token reuse produce the same
    /// message so that a caller cannot probe session state.
    #[error("{0}")]
    Unauthorized(String),

    /// A store, clock or crypto operation failed.
    ///
    /// The core never retries these; retry policy belongs to the store client.
    #[error("{0}")]
    Unexpected(String),
}

impl AuthError {
    /// Builds an `Unexpected` error from a storage backend failure message.
    pub fn from_storage_message(message: impl Into<String>) -> Self {
        AuthError::Unexpected(message.into())
    }

    /// HTTP status code for this failure kind.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::BadRequest(_) => 400,
            AuthError::Invalid(_) => 422,
            AuthError::Gone(_) => 410,
            AuthError::TooManyRequests(_) => 429,
            AuthError::Unauthorized(_) => 401,
            AuthError::Unexpected(_) => 500,
        }
    }

    /// Stable snake_case name of the failure kind, for logs and JSON bodies.
    pub fn kind_name(&self) -> &'static str {
        match self {
            AuthError::BadRequest(_) => "bad_request",
            AuthError::Invalid(_) => "invalid",
            AuthError::Gone(_) => "gone",
            AuthError::TooManyRequests(_) => "too_many_requests",
            AuthError::Unauthorized(_) => "unauthorized",
            AuthError::Unexpected(_) => "unexpected",
        }
    }

    /// Returns true for failures caused by the store or the runtime rather
    /// than by the caller.
    pub fn is_internal(&self) -> bool {
        matches!(self, AuthError::Unexpected(_))
    }
}
