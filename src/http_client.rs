use crate::error::{Error, Result};
use reqwest::{
    Client, Response,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};

/// Create a pooled HTTP client with the access token bound as a default
/// bearer header. One client per session; a new session gets a new client.
pub fn bearer_client(access_token: &str) -> Result<Client> {
    let mut value = HeaderValue::from_str(&format!("Bearer {access_token}")).map_err(|e| {
        Error::Authorization(format!("access token is not a valid header value: {e}"))
    })?;
    value.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, value);

    Client::builder()
        .default_headers(headers)
        .build()
        .map_err(|e| Error::transport("create http client", e))
}

/// Handle an HTTP response by checking status and extracting the body.
///
/// # Returns
/// * `Ok(String)` - The response body if the status is successful
/// * `Err` - [`Error::ExternalService`] carrying status and body otherwise
pub async fn handle_http_response(res: Response, operation: &'static str) -> Result<String> {
    let status = res.status();
    let body = res
        .text()
        .await
        .map_err(|e| Error::transport(operation, e))?;

    if !status.is_success() {
        return Err(Error::service(operation, status.as_u16(), body));
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_client_accepts_plain_token() {
        assert!(bearer_client("valid-token-value").is_ok());
    }

    #[test]
    fn bearer_client_rejects_control_characters() {
        let result = bearer_client("broken\ntoken");
        assert!(matches!(result, Err(Error::Authorization(_))));
    }
}
