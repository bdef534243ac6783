use crate::error::TransportError;
use reqwest::{StatusCode, Url, blocking::Client, header::HeaderMap};
use std::time::Duration;

/// A completed request/response exchange.
pub struct Response {
    /// Final url after redirects.
    pub url: Url,
    pub status: StatusCode,
    pub body: Vec<u8>,
}

/// Plain request/response fetches used for keys, segments and playlists.
///
/// Implementations must be safe to call from many worker threads at once.
pub trait Transport: Send + Sync {
    fn get(&self, url: &Url, headers: &HeaderMap, timeout: Duration)
    -> Result<Response, TransportError>;
}

/// [`Transport`] backed by a blocking reqwest client.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn get(
        &self,
        url: &Url,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .headers(headers.clone())
            .timeout(timeout)
            .send()
            .map_err(check_reqwest_error)?;

        let url = response.url().to_owned();
        let status = response.status();
        let body = response.bytes().map_err(check_reqwest_error)?.to_vec();

        Ok(Response { url, status, body })
    }
}

fn check_reqwest_error(error: reqwest::Error) -> TransportError {
    let url = error
        .url()
        .map(|x| x.to_string())
        .unwrap_or_else(|| "unknown url".to_owned());

    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_connect() {
        TransportError::Connect(url)
    } else {
        TransportError::Other(format!("{url} ({error})"))
    }
}
