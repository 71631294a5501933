//! Fakes shared by the unit tests.

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    error::Result,
    gateway::{GatewayFailure, ProviderRequest, RawOutcome, RawResponse, Transport},
    model::{TodayWeatherResult, WeatherRequest},
    provider::ForecastProvider,
};

pub fn response(status: u16, body: &[u8]) -> RawResponse {
    RawResponse {
        status: StatusCode::from_u16(status).unwrap(),
        retry_after_seconds: None,
        body: body.to_vec(),
    }
}

pub fn forecast_request() -> ProviderRequest {
    ProviderRequest {
        path: "v1/forecast".into(),
        query: vec![("latitude".into(), "50.45".into())],
    }
}

/// Replays scripted outcomes in order; the last one repeats forever.
#[derive(Debug)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<RawOutcome>>,
    latency: Option<Duration>,
    calls: AtomicUsize,
    seen: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedTransport {
    pub fn sequence(outcomes: Vec<RawOutcome>) -> Self {
        assert!(!outcomes.is_empty(), "script needs at least one outcome");
        Self {
            script: Mutex::new(outcomes.into()),
            latency: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn always(outcome: RawOutcome) -> Self {
        Self::sequence(vec![outcome])
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.seen.lock().unwrap().last().cloned()
    }

    fn next_outcome(&self) -> RawOutcome {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap()
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ProviderRequest, cancel: &CancellationToken) -> RawOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.clone());

        if let Some(latency) = self.latency {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(GatewayFailure::Cancelled),
                () = tokio::time::sleep(latency) => {}
            }
        }

        self.next_outcome()
    }
}

/// Provider that counts calls and always returns the same answer.
#[derive(Debug)]
pub struct CountingProvider {
    answer: Result<TodayWeatherResult>,
    calls: AtomicUsize,
}

impl CountingProvider {
    pub fn new(answer: Result<TodayWeatherResult>) -> Self {
        Self {
            answer,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ForecastProvider for CountingProvider {
    async fn get_today(
        &self,
        _request: &WeatherRequest,
        _cancel: &CancellationToken,
    ) -> Result<TodayWeatherResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}

/// A complete HTTP/1.1 response with the given status line, extra headers and body.
pub fn http_reply(status_line: &str, headers: &[(&str, &str)], body: &str) -> String {
    let mut reply = format!("HTTP/1.1 {status_line}\r\n");
    for (name, value) in headers {
        reply.push_str(&format!("{name}: {value}\r\n"));
    }
    reply.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    ));
    reply
}

/// Loopback server answering every connection with `reply`. With `None` it
/// accepts and reads the request, then never answers.
pub async fn canned_server(reply: Option<String>) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let reply = reply.clone();
            tokio::spawn(async move {
                read_request_head(&mut socket).await;
                match reply {
                    Some(reply) => {
                        let _ = socket.write_all(reply.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            });
        }
    });

    Url::parse(&format!("http://{addr}/")).unwrap()
}

/// A loopback URL nothing listens on.
pub fn refused_url() -> Url {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{addr}/")).unwrap()
}

async fn read_request_head(socket: &mut TcpStream) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
}

pub fn sample_result() -> TodayWeatherResult {
    TodayWeatherResult {
        date: "2024-01-01".into(),
        temperature_min_c: Some(-1.0),
        temperature_max_c: Some(5.0),
        precipitation_sum_mm: Some(0.2),
        wind_speed_max_kmh: Some(12.5),
        timezone: Some("Europe/Kyiv".into()),
    }
}
