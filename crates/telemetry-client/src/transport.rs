// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ships flushed buffers to the collector.
//!
//! Two transports exist and one is picked when the client is built:
//!
//! - [`DatagramTransport`] writes the non-aggregated lines as a single UDP datagram.
//!   Aggregated buckets cannot be expressed on this transport and are dropped.
//! - [`RequestTransport`] issues one `PUT` per non-empty buffer, routing aggregated
//!   buckets to a path naming their function and frequency.
//!
//! Sends run as spawned tasks and are never retried; failures only produce log lines.

use std::io::Write;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE, USER_AGENT};
use reqwest::{Response, StatusCode, Url};
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::buffer::FlushPayload;
use crate::config::{ClientConfig, TransportKind};
use crate::constants::{self, AUTH_TOKEN_HEADER, METRICS_PATH};
use crate::errors::Creation;
use crate::metric::AggregationKey;

#[derive(Debug)]
pub enum ShippingError {
    Payload(String),
    Destination(Option<StatusCode>, String),
}

#[derive(Clone)]
pub enum Transport {
    Datagram(DatagramTransport),
    Request(RequestTransport),
}

impl Transport {
    pub async fn from_config(config: &ClientConfig) -> Result<Self, Creation> {
        match config.transport {
            TransportKind::Udp => Ok(Self::Datagram(
                DatagramTransport::connect(&config.host, config.port()).await?,
            )),
            TransportKind::Api => {
                let token = config.token.as_deref().ok_or(Creation::MissingToken)?;
                Ok(Self::Request(RequestTransport::new(
                    &config.host,
                    config.port(),
                    token,
                    config.timeout(),
                    config.compression,
                )?))
            }
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Datagram(_) => TransportKind::Udp,
            Self::Request(_) => TransportKind::Api,
        }
    }

    /// Spawns the sends for `payload` on `runtime` and returns without waiting for them.
    pub fn dispatch(&self, payload: FlushPayload, runtime: &Handle) -> Vec<JoinHandle<()>> {
        match self {
            Self::Datagram(datagram) => {
                if !payload.aggregated.is_empty() {
                    warn!(
                        "Cannot flush aggregated metrics via this transport, dropping {} lines",
                        payload.aggregated_count()
                    );
                }
                if payload.non_aggregated.is_empty() {
                    return Vec::new();
                }
                let datagram = datagram.clone();
                let content = payload.non_aggregated.into_content();
                vec![runtime.spawn(async move { datagram.send(content.as_bytes()).await })]
            }
            Self::Request(request) => {
                let mut handles = Vec::with_capacity(payload.aggregated.len() + 1);
                if !payload.non_aggregated.is_empty() {
                    let request = request.clone();
                    let content = payload.non_aggregated.into_content();
                    handles.push(runtime.spawn(async move {
                        log_outcome(request.ship(None, &content).await).await;
                    }));
                }
                for (key, buffer) in payload.aggregated {
                    let request = request.clone();
                    let content = buffer.into_content();
                    handles.push(runtime.spawn(async move {
                        log_outcome(request.ship(Some(&key), &content).await).await;
                    }));
                }
                handles
            }
        }
    }
}

#[derive(Clone)]
pub struct DatagramTransport {
    socket: Arc<UdpSocket>,
}

impl DatagramTransport {
    pub async fn connect(host: &str, port: u16) -> Result<Self, Creation> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.connect((host, port)).await?;
        debug!("Datagram transport connected to {}:{}", host, port);
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    pub async fn send(&self, payload: &[u8]) {
        match self.socket.send(payload).await {
            Ok(sent) => debug!("Sent {} bytes of metrics", sent),
            Err(e) => error!("Failed to send metrics datagram: {}", e),
        }
    }
}

#[derive(Clone)]
pub struct RequestTransport {
    client: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
    timeout: Duration,
    compression: bool,
}

impl RequestTransport {
    pub fn new(
        host: &str,
        port: u16,
        token: &str,
        timeout: Duration,
        compression: bool,
    ) -> Result<Self, Creation> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Creation::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url(host, port)?,
            headers: build_headers(token, compression)?,
            timeout,
            compression,
        })
    }

    pub fn url_for(&self, key: Option<&AggregationKey>) -> String {
        match key {
            None => format!("{}{}", self.base_url, METRICS_PATH),
            Some(key) => format!(
                "{}{}/aggregation/{}/frequency/{}",
                self.base_url, METRICS_PATH, key.function, key.frequency
            ),
        }
    }

    pub async fn ship(
        &self,
        key: Option<&AggregationKey>,
        content: &str,
    ) -> Result<Response, ShippingError> {
        let body = encode_body(content, self.compression)?;
        let url = self.url_for(key);
        debug!("Shipping {} bytes to {}", body.len(), url);

        self.client
            .put(&url)
            .timeout(self.timeout)
            .headers(self.headers.clone())
            .body(body)
            .send()
            .await
            .map_err(|e| {
                ShippingError::Destination(e.status(), format!("Failed to send request: {e}"))
            })
    }
}

/// Gzips `content` when `compression` is set, otherwise returns its bytes as-is.
pub fn encode_body(content: &str, compression: bool) -> Result<Vec<u8>, ShippingError> {
    if !compression {
        return Ok(content.as_bytes().to_vec());
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(content.as_bytes())
        .map_err(|e| ShippingError::Payload(format!("Failed to compress data: {e}")))?;
    encoder
        .finish()
        .map_err(|e| ShippingError::Payload(format!("Failed to compress data: {e}")))
}

fn base_url(host: &str, port: u16) -> Result<String, Creation> {
    let host = host.trim();
    let with_scheme = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };
    let mut url = Url::parse(&with_scheme)
        .map_err(|e| Creation::InvalidConfig(format!("invalid host '{host}': {e}")))?;
    url.set_port(Some(port))
        .map_err(|()| Creation::InvalidConfig(format!("host '{host}' cannot carry a port")))?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn build_headers(token: &str, compression: bool) -> Result<HeaderMap, Creation> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(USER_AGENT, HeaderValue::from_static(constants::USER_AGENT));
    headers.insert(
        AUTH_TOKEN_HEADER,
        HeaderValue::from_str(token).map_err(|_| Creation::InvalidHeader(AUTH_TOKEN_HEADER))?,
    );
    if compression {
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    }
    Ok(headers)
}

async fn log_outcome(resp: Result<Response, ShippingError>) {
    match resp {
        Ok(resp) => match resp.status() {
            StatusCode::CREATED => debug!("Metrics accepted by {}", resp.url()),
            unexpected_status_code => {
                let url = resp.url().clone();
                error!(
                    "{}: Failed to push metrics to {}: {:?}",
                    unexpected_status_code,
                    url,
                    resp.text().await.unwrap_or_default()
                );
            }
        },
        Err(ShippingError::Payload(msg)) => {
            error!("Failed to prepare payload. Data dropped: {}", msg);
        }
        Err(ShippingError::Destination(sc, msg)) => {
            error!("Error shipping data: {:?} {}", sc, msg);
        }
    }
}
