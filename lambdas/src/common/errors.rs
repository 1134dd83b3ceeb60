use lambda_http::{Error as LambdaError, Response};
use thiserror::Error;

/// Outcome of a failed request.
///
/// `HttpError` carries a response that is sent to the client as is. `LambdaError`
/// is handed back to the runtime.
#[derive(Debug)]
pub enum Error {
    HttpError(Response<String>),
    LambdaError(LambdaError),
}

impl<T: Into<LambdaError>> From<T> for Error {
    fn from(value: T) -> Self {
        Error::LambdaError(value.into())
    }
}

impl Error {
    pub fn into_lambda_result(
        result: Result<Response<String>, Error>,
    ) -> Result<Response<String>, LambdaError> {
        match result {
            Ok(val) => Ok(val),
            Err(Error::HttpError(val)) => Ok(val),
            Err(Error::LambdaError(err)) => Err(err),
        }
    }
}

#[derive(Debug, Error)]
#[error("failed to publish to {destination}: {reason}")]
pub struct PublishError {
    pub destination: String,
    pub reason: String,
}

impl PublishError {
    pub fn new(destination: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            destination: destination.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error)]
#[error("malformed message: {0}")]
pub struct MalformedMessageError(#[from] serde_json::Error);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store misconfigured: {0}")]
    Misconfigured(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}
