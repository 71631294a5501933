//! Reqwest-backed [`Transport`].
//!
//! Owns only transport details: URL assembly, the `Retry-After` header and
//! reading the body. The client is built without a request timeout; the
//! gateway's total budget is the only deadline.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::{
    Client,
    header::{HeaderMap, RETRY_AFTER},
};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use url::Url;

use crate::gateway::{GatewayFailure, ProviderRequest, RawOutcome, RawResponse, Transport};

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    base_url: Url,
    http: Client,
}

impl ReqwestTransport {
    pub fn new(base_url: Url, user_agent: &str) -> Result<Self> {
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("Provider base URL '{base_url}' cannot be used as a base"));
        }

        let http = Client::builder().user_agent(user_agent).build()?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for `request`; query values are percent-encoded here.
    pub fn url_for(&self, request: &ProviderRequest) -> Result<Url, url::ParseError> {
        let mut url = self.base_url.join(&request.path)?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }

    async fn fetch(&self, url: Url) -> reqwest::Result<RawResponse> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let retry_after_seconds = parse_retry_after(response.headers());
        let body = response.bytes().await?;

        Ok(RawResponse {
            status,
            retry_after_seconds,
            body: body.to_vec(),
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ProviderRequest, cancel: &CancellationToken) -> RawOutcome {
        let url = self.url_for(request).map_err(|error| {
            warn!(%error, path = %request.path, "could not build weather provider URL");
            GatewayFailure::InvalidRequest
        })?;

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(GatewayFailure::Cancelled),
            fetched = self.fetch(url) => fetched.map_err(|error| {
                warn!(
                    timeout = error.is_timeout(),
                    connect = error.is_connect(),
                    "weather provider transport failure"
                );
                GatewayFailure::TransientNetworkError
            }),
        }
    }
}

/// `Retry-After` in its delta-seconds form. HTTP-date values are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<u32> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u32>()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gateway::TotalTimeout,
        test_support::{canned_server, http_reply, refused_url},
    };
    use reqwest::{StatusCode, header::HeaderValue};
    use rstest::rstest;
    use std::time::Duration;

    fn transport() -> ReqwestTransport {
        ReqwestTransport::new(
            Url::parse("https://api.open-meteo.com/").unwrap(),
            "weather-test/1.0",
        )
        .unwrap()
    }

    #[test]
    fn joins_path_and_escapes_query() {
        let request = ProviderRequest {
            path: "v1/forecast".into(),
            query: vec![
                ("latitude".into(), "50.45".into()),
                ("timezone".into(), "America/Argentina/Buenos Aires".into()),
            ],
        };

        let url = transport().url_for(&request).unwrap();

        assert_eq!(url.path(), "/v1/forecast");
        assert_eq!(
            url.query(),
            Some("latitude=50.45&timezone=America%2FArgentina%2FBuenos+Aires")
        );
        let decoded: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(decoded, request.query);
    }

    #[test]
    fn rejects_non_base_urls() {
        let url = Url::parse("mailto:weather@example.com").unwrap();
        assert!(ReqwestTransport::new(url, "ua").is_err());
    }

    #[rstest]
    #[case(Some("120"), Some(120))]
    #[case(Some(" 7 "), Some(7))]
    #[case(Some("Wed, 21 Oct 2015 07:28:00 GMT"), None)]
    #[case(Some("-5"), None)]
    #[case(None, None)]
    fn parses_retry_after_seconds(#[case] raw: Option<&str>, #[case] expected: Option<u32>) {
        let mut headers = HeaderMap::new();
        if let Some(raw) = raw {
            headers.insert(RETRY_AFTER, HeaderValue::from_str(raw).unwrap());
        }
        assert_eq!(parse_retry_after(&headers), expected);
    }

    fn forecast() -> ProviderRequest {
        ProviderRequest {
            path: "v1/forecast".into(),
            query: vec![("latitude".into(), "50.45".into())],
        }
    }

    fn local(base_url: Url) -> ReqwestTransport {
        ReqwestTransport::new(base_url, "weather-test/1.0").unwrap()
    }

    #[tokio::test]
    async fn reads_status_retry_after_and_body_from_the_wire() {
        let base = canned_server(Some(http_reply(
            "429 Too Many Requests",
            &[("Retry-After", "120")],
            "slow down",
        )))
        .await;

        let response = local(base)
            .send(&forecast(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.retry_after_seconds, Some(120));
        assert_eq!(response.body, b"slow down");
    }

    #[tokio::test]
    async fn reads_success_body_from_the_wire() {
        let body = r#"{"daily":{"time":["2024-01-01"]}}"#;
        let base = canned_server(Some(http_reply(
            "200 OK",
            &[("Content-Type", "application/json")],
            body,
        )))
        .await;

        let response = local(base)
            .send(&forecast(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.retry_after_seconds, None);
        assert_eq!(response.body, body.as_bytes());
    }

    #[tokio::test]
    async fn refused_connection_is_transient() {
        let outcome = local(refused_url())
            .send(&forecast(), &CancellationToken::new())
            .await;

        assert_eq!(outcome.unwrap_err(), GatewayFailure::TransientNetworkError);
    }

    #[tokio::test]
    async fn silent_server_runs_into_the_total_timeout() {
        let transport = local(canned_server(None).await);
        let bounded = TotalTimeout::new(&transport, Duration::from_millis(300));
        let cancel = CancellationToken::new();

        let outcome = bounded.send(&forecast(), &cancel).await;

        assert_eq!(outcome.unwrap_err(), GatewayFailure::TimeoutElapsed);
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn unbuildable_url_is_not_a_network_failure() {
        let request = ProviderRequest {
            path: "http://[".into(),
            query: Vec::new(),
        };

        let outcome = transport()
            .send(&request, &CancellationToken::new())
            .await;

        assert_eq!(outcome.unwrap_err(), GatewayFailure::InvalidRequest);
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_network() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = transport()
            .send(
                &ProviderRequest {
                    path: "v1/forecast".into(),
                    query: Vec::new(),
                },
                &cancel,
            )
            .await;

        assert_eq!(outcome.unwrap_err(), GatewayFailure::Cancelled);
    }
}
