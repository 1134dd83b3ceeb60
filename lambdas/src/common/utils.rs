use lambda_http::http::{Method, StatusCode};
use lambda_http::{Request, RequestExt, Response};

use crate::common::errors::Error;

pub const NAME_PARAMETER: &str = "name";

const PUBLISH_FAILED_ERROR: &str = "Failed to enqueue request";

/// Value of the `name` query parameter. Absent and empty values are both `None`.
pub fn name_parameter(request: &Request) -> Option<String> {
    request
        .query_string_parameters()
        .first(NAME_PARAMETER)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
}

pub fn ensure_method(request: &Request) -> Result<(), Error> {
    if request.method() == Method::GET || request.method() == Method::POST {
        return Ok(());
    }

    Err(Error::HttpError(empty_response(StatusCode::METHOD_NOT_ALLOWED)?))
}

pub fn text_response(status: StatusCode, body: String) -> Result<Response<String>, Error> {
    let response = Response::builder()
        .status(status)
        .header("content-type", "text/plain")
        .body(body)?;

    Ok(response)
}

pub fn empty_response(status: StatusCode) -> Result<Response<String>, Error> {
    let response = Response::builder().status(status).body(String::new())?;
    Ok(response)
}

pub fn publish_failed() -> Error {
    match text_response(StatusCode::INTERNAL_SERVER_ERROR, PUBLISH_FAILED_ERROR.into()) {
        Ok(response) => Error::HttpError(response),
        Err(err) => err,
    }
}

#[cfg(test)]
pub(crate) fn test_request(method: &str, name: Option<&str>) -> Request {
    use std::collections::HashMap;

    let mut parameters = HashMap::new();
    if let Some(name) = name {
        parameters.insert(NAME_PARAMETER.to_string(), name.to_string());
    }

    lambda_http::http::Request::builder()
        .method(method)
        .uri("/api/MyFirstServerlessApp2")
        .body(lambda_http::Body::Empty)
        .unwrap()
        .with_query_string_parameters(parameters)
}
