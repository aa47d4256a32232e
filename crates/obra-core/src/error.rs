use thiserror::Error;

/// Why an exchange with the assistant endpoint did not produce a reply.
///
/// Every variant is shown to the user as the same fixed error message; the
/// detail only ever reaches the log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    /// The request never completed (connection refused, DNS, timeout...).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The endpoint answered with a non-2xx status.
    #[error("endpoint returned status {status}{}", .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    Status { status: u16, detail: Option<String> },

    /// A 2xx response whose body was not the expected JSON.
    #[error("could not decode endpoint response: {0}")]
    Decode(String),
}
