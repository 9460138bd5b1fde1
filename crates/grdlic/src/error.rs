use Error::*;

/// The result of a call that produces nothing but a status.
pub type Status = Result<(), Error>;

/// A non-OK status returned by the licensing backend.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("INVALID_ARG")]
    InvalidArg,
    #[error("NO_SERVICE")]
    NoService,
    #[error("DONGLE_NOT_FOUND")]
    DongleNotFound,
    #[error("FEATURE_NOT_FOUND")]
    FeatureNotFound,
    #[error("INVALID_VENDOR_CODES")]
    InvalidVendorCodes,
    #[error("NOT_LOGGED_IN")]
    NotLoggedIn,
    #[error("ALREADY_LOGGED_IN")]
    AlreadyLoggedIn,
    #[error("COUNTER_EXHAUSTED")]
    CounterExhausted,
    #[error("FEATURE_EXPIRED")]
    FeatureExpired,
    #[error("POLICY_VIOLATION")]
    PolicyViolation,
    #[error("COMMUNICATION_ERROR")]
    Communication,
}

impl Error {
    /// The numeric status the vendor tooling reports for this error; `0` is reserved for OK.
    pub fn code(self) -> i32 {
        match self {
            InvalidArg => 1,
            NoService => 2,
            DongleNotFound => 3,
            FeatureNotFound => 4,
            InvalidVendorCodes => 5,
            NotLoggedIn => 6,
            AlreadyLoggedIn => 7,
            CounterExhausted => 8,
            FeatureExpired => 9,
            PolicyViolation => 10,
            Communication => 11,
        }
    }
}

/// Render the status of a call the way the vendor tooling prints it.
pub fn status_text<T>(result: &Result<T, Error>) -> String {
    match result {
        Ok(_) => "OK".to_string(),
        Err(e) => e.to_string(),
    }
}
