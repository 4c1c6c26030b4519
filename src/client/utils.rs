use secrecy::{ExposeSecret, SecretString};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;

use crate::client::consts::{API_KEY_HEADER, API_VERSION, REALTIME_PATH};
use crate::config::Endpoint;

/// Everything needed to open the socket again after a drop.
#[derive(Debug)]
pub(crate) struct Target {
    url: String,
    api_key: Option<SecretString>,
}

impl Target {
    pub(crate) fn url(&self) -> &str {
        &self.url
    }
}

pub(crate) fn target(endpoint: &Endpoint) -> Target {
    match endpoint {
        Endpoint::Relay(url) => Target {
            url: url.clone(),
            api_key: None,
        },
        Endpoint::Direct {
            endpoint,
            api_key,
            deployment,
        } => Target {
            url: direct_url(endpoint, deployment),
            api_key: Some(SecretString::from(api_key.expose_secret().to_string())),
        },
    }
}

fn direct_url(endpoint: &str, deployment: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}/{REALTIME_PATH}?deployment={deployment}&api-version={API_VERSION}")
}

pub(crate) fn build_request(target: &Target) -> tokio_tungstenite::tungstenite::Result<Request> {
    let mut request = target.url.as_str().into_client_request()?;
    if let Some(api_key) = &target.api_key {
        request
            .headers_mut()
            .insert(API_KEY_HEADER, api_key.expose_secret().parse()?);
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn direct_endpoint_uses_secure_socket_and_key_header() {
        let config = Config::builder()
            .with_direct_endpoint("https://voice.example.com/", "k3y", "gpt-4o-realtime")
            .build();
        let target = target(config.endpoint());
        assert_eq!(
            target.url(),
            "wss://voice.example.com/openai/realtime?deployment=gpt-4o-realtime&api-version=2024-10-01-preview"
        );

        let request = build_request(&target).unwrap();
        assert_eq!(request.headers().get(API_KEY_HEADER).unwrap(), "k3y");
    }

    #[test]
    fn relay_has_no_credentials() {
        let config = Config::builder().build();
        let request = build_request(&target(config.endpoint())).unwrap();
        assert_eq!(request.uri().to_string(), "ws://localhost:8765/realtime");
        assert!(request.headers().get(API_KEY_HEADER).is_none());
    }
}
