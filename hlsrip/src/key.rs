use crate::{
    config::PipelineConfig,
    error::KeyFetchError,
    manifest::KeyRef,
    transport::Transport,
    utils,
};
use log::debug;
use reqwest::header::HeaderMap;
use std::{fmt, sync::Arc, time::Duration};

/// AES-128 key and the IV derived from it.
#[derive(Clone)]
pub struct KeyMaterial {
    key: [u8; 16],
    iv: [u8; 16],
}

impl KeyMaterial {
    /// Fixed IV policy, the IV is a copy of the key.
    pub fn new(key: [u8; 16]) -> Self {
        Self { key, iv: key }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyFetchError> {
        let key = <[u8; 16]>::try_from(bytes)
            .map_err(|_| KeyFetchError::InvalidLength(bytes.len()))?;
        Ok(Self::new(key))
    }

    pub fn key(&self) -> &[u8; 16] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; 16] {
        &self.iv
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial { .. }")
    }
}

/// Fetches key bytes referenced by a playlist.
pub struct KeyResolver {
    transport: Arc<dyn Transport>,
    headers: HeaderMap,
    timeout: Duration,
}

impl KeyResolver {
    pub fn new(transport: Arc<dyn Transport>, config: &PipelineConfig) -> Self {
        Self {
            transport,
            headers: config.headers.clone(),
            timeout: config.timeout,
        }
    }

    /// Single attempt, a key which failed once is not expected to succeed later.
    pub fn resolve(&self, key: &KeyRef) -> Result<KeyMaterial, KeyFetchError> {
        let bytes = if key.uri.scheme() == "data" {
            debug!("Decoding inline key");
            decode_data_uri(key.uri.path())?
        } else {
            debug!("Fetching key {}", key.uri);
            let response = self.transport.get(&key.uri, &self.headers, self.timeout)?;

            if !response.status.is_success() {
                return Err(KeyFetchError::Status {
                    url: key.uri.to_string(),
                    status: response.status,
                });
            }

            response.body
        };

        if bytes.is_empty() {
            return Err(KeyFetchError::Empty {
                url: key.uri.to_string(),
            });
        }

        KeyMaterial::from_bytes(&bytes)
    }
}

fn decode_data_uri(path: &str) -> Result<Vec<u8>, KeyFetchError> {
    let (media_type, data) = path.split_once(',').ok_or(KeyFetchError::DataUri)?;

    if media_type.ends_with(";base64") {
        utils::decode_base64(data).map_err(|_| KeyFetchError::DataUri)
    } else {
        Ok(data.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::TransportError, transport::Response};
    use reqwest::{StatusCode, Url};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        status: StatusCode,
        body: Vec<u8>,
        calls: AtomicUsize,
    }

    impl Transport for Fixed {
        fn get(
            &self,
            url: &Url,
            _: &HeaderMap,
            _: Duration,
        ) -> Result<Response, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Response {
                url: url.clone(),
                status: self.status,
                body: self.body.clone(),
            })
        }
    }

    fn resolver(status: StatusCode, body: &[u8]) -> (Arc<Fixed>, KeyResolver) {
        let transport = Arc::new(Fixed {
            status,
            body: body.to_vec(),
            calls: AtomicUsize::new(0),
        });
        let resolver = KeyResolver::new(transport.clone(), &PipelineConfig::default());
        (transport, resolver)
    }

    fn key_ref(uri: &str) -> KeyRef {
        KeyRef {
            uri: uri.parse().unwrap(),
            iv: None,
        }
    }

    #[test]
    fn iv_mirrors_key() {
        let (transport, resolver) = resolver(StatusCode::OK, b"0123456789abcdef");
        let key = resolver.resolve(&key_ref("https://example.com/key")).unwrap();

        assert_eq!(key.key(), b"0123456789abcdef");
        assert_eq!(key.iv(), b"0123456789abcdef");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn not_found_is_not_retried() {
        let (transport, resolver) = resolver(StatusCode::NOT_FOUND, b"");
        let error = resolver
            .resolve(&key_ref("https://example.com/key"))
            .unwrap_err();

        assert!(matches!(error, KeyFetchError::Status { status, .. } if status == StatusCode::NOT_FOUND));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_body() {
        let (_, resolver) = resolver(StatusCode::OK, b"");
        assert!(matches!(
            resolver.resolve(&key_ref("https://example.com/key")),
            Err(KeyFetchError::Empty { .. })
        ));
    }

    #[test]
    fn wrong_length() {
        let (_, resolver) = resolver(StatusCode::OK, b"short");
        assert!(matches!(
            resolver.resolve(&key_ref("https://example.com/key")),
            Err(KeyFetchError::InvalidLength(5))
        ));
    }

    #[test]
    fn data_uri_skips_network() {
        let (transport, resolver) = resolver(StatusCode::OK, b"");
        let key = resolver
            .resolve(&key_ref(
                "data:application/octet-stream;base64,MDEyMzQ1Njc4OWFiY2RlZg==",
            ))
            .unwrap();

        assert_eq!(key.key(), b"0123456789abcdef");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn debug_is_redacted() {
        let key = KeyMaterial::new(*b"0123456789abcdef");
        assert!(!format!("{:?}", key).contains("0123"));
    }
}
