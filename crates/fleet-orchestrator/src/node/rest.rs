//! Node control over the LND REST gateway

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use bytes::{Bytes, BytesMut};
use futures::stream::{BoxStream, Stream, StreamExt};
use reqwest::{Certificate, Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use fleet_core::config::ConnectConfig;
use fleet_core::error::{ConnectionError, RpcError};
use fleet_core::traits::{
    NodeConnector, NodeControl, OpenChannelParams, OpenStatusStream, OpenStatusUpdate,
};
use fleet_core::{FundingReference, Instance, InstanceId};

use crate::connection::ExponentialBackoff;

const MACAROON_HEADER: &str = "Grpc-Metadata-macaroon";

/// Control client for one node's REST listener
pub struct RestNodeClient {
    instance: InstanceId,
    base_url: String,
    http: Client,
    macaroon: Option<String>,
    request_timeout: Duration,
}

impl RestNodeClient {
    /// Build a client trusting the node's self-signed certificate
    pub fn new(
        instance: &Instance,
        cert_pem: &[u8],
        macaroon: Option<&[u8]>,
        request_timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        let cert =
            Certificate::from_pem(cert_pem).map_err(|e| ConnectionError::Tls(e.to_string()))?;
        let http = Client::builder()
            .add_root_certificate(cert)
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| ConnectionError::Tls(e.to_string()))?;

        Ok(Self {
            instance: instance.id.clone(),
            base_url: instance.control_url(),
            http,
            macaroon: macaroon.map(hex::encode),
            request_timeout,
        })
    }

    /// Instance this client talks to
    pub fn instance(&self) -> &InstanceId {
        &self.instance
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(macaroon) = &self.macaroon {
            req = req.header(MACAROON_HEADER, macaroon);
        }
        req
    }

    async fn call(&self, req: RequestBuilder) -> Result<Value, RpcError> {
        let resp = req
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(error_from_body(status, &body));
        }
        if body.is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_slice(&body).map_err(|e| RpcError::Decode(e.to_string()))
    }

    async fn get(&self, path: &str) -> Result<Value, RpcError> {
        tracing::trace!(instance = %self.instance, path, "GET");
        self.call(self.request(Method::GET, path)).await
    }
}

#[async_trait]
impl NodeControl for RestNodeClient {
    async fn get_info(&self) -> Result<Value, RpcError> {
        self.get("/v1/getinfo").await
    }

    async fn list_peers(&self) -> Result<Value, RpcError> {
        self.get("/v1/peers?latest_error=true").await
    }

    async fn wallet_balance(&self) -> Result<Value, RpcError> {
        self.get("/v1/balance/blockchain").await
    }

    async fn channel_balance(&self) -> Result<Value, RpcError> {
        self.get("/v1/balance/channels").await
    }

    async fn list_channels(&self) -> Result<Value, RpcError> {
        self.get("/v1/channels").await
    }

    async fn open_channel(&self, params: OpenChannelParams) -> Result<OpenStatusStream, RpcError> {
        let body = OpenChannelBody {
            node_pubkey: STANDARD.encode(&params.peer_pubkey),
            local_funding_amount: params.local_amount.to_string(),
            push_sat: params.push_amount.to_string(),
        };

        // No overall timeout: the stream stays open until the channel confirms.
        let resp = self
            .request(Method::POST, "/v1/channels/stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.bytes().await.unwrap_or_default();
            return Err(error_from_body(status, &body));
        }

        let updates = ndjson_lines(resp.bytes_stream())
            .filter_map(|line| async move {
                match line {
                    Ok(line) => parse_open_update(&line),
                    Err(e) => Some(Err(e)),
                }
            })
            .boxed();
        Ok(updates)
    }

    async fn close_channel(&self, funding: &FundingReference) -> Result<(), RpcError> {
        let path = format!("/v1/channels/{}/{}", funding.txid, funding.output_index);
        let resp = self
            .request(Method::DELETE, &path)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.bytes().await.unwrap_or_default();
            return Err(error_from_body(status, &body));
        }

        // The close is a stream too; its first frame says whether it was accepted.
        let mut lines = ndjson_lines(resp.bytes_stream());
        match lines.next().await {
            Some(Ok(line)) => match serde_json::from_slice::<StreamFrame<Value>>(&line) {
                Ok(StreamFrame {
                    error: Some(err), ..
                }) => Err(err.into()),
                Ok(_) => Ok(()),
                Err(e) => Err(RpcError::Decode(e.to_string())),
            },
            Some(Err(e)) => Err(e),
            None => Ok(()),
        }
    }

    async fn connect_peer(&self, pubkey: &str, host: &str) -> Result<(), RpcError> {
        let body = json!({
            "addr": { "pubkey": pubkey, "host": host },
            "perm": true,
            "timeout": "5",
        });
        self.call(self.request(Method::POST, "/v1/peers").json(&body))
            .await
            .map(|_| ())
    }

    async fn disconnect_peer(&self, pubkey: &str) -> Result<(), RpcError> {
        let path = format!("/v1/peers/{}", pubkey);
        self.call(self.request(Method::DELETE, &path))
            .await
            .map(|_| ())
    }

    async fn new_address(&self) -> Result<String, RpcError> {
        let value = self.get("/v1/newaddress?type=TAPROOT_PUBKEY").await?;
        value
            .get("address")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RpcError::Decode("response has no address".to_string()))
    }

    async fn stop(&self) -> Result<(), RpcError> {
        self.call(self.request(Method::POST, "/v1/stop").json(&json!({})))
            .await
            .map(|_| ())
    }
}

/// Connects to nodes over REST, waiting for freshly launched nodes to come up
pub struct RestConnector {
    config: ConnectConfig,
}

impl RestConnector {
    pub fn new(config: ConnectConfig) -> Self {
        Self { config }
    }

    async fn try_connect(&self, instance: &Instance) -> Result<RestNodeClient, ConnectionError> {
        let cert_path = &instance.credentials.tls_cert;
        let cert = tokio::fs::read(cert_path)
            .await
            .map_err(|source| ConnectionError::Credentials {
                path: cert_path.clone(),
                source,
            })?;

        let macaroon_path = &instance.credentials.macaroon;
        let macaroon = match tokio::fs::read(macaroon_path).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(ConnectionError::Credentials {
                    path: macaroon_path.clone(),
                    source,
                })
            }
        };

        let client = RestNodeClient::new(
            instance,
            &cert,
            macaroon.as_deref(),
            self.config.request_timeout,
        )?;
        client
            .get_info()
            .await
            .map_err(|e| ConnectionError::Refused(e.to_string()))?;
        Ok(client)
    }
}

#[async_trait]
impl NodeConnector for RestConnector {
    async fn connect(&self, instance: &Instance) -> Result<Arc<dyn NodeControl>, ConnectionError> {
        let deadline = Instant::now() + self.config.timeout;
        let mut backoff = ExponentialBackoff::from_config(&self.config.backoff);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let last_error = match tokio::time::timeout(remaining, self.try_connect(instance)).await
            {
                Ok(Ok(client)) => {
                    tracing::debug!(instance = %instance.id, attempts, "Node answered");
                    return Ok(Arc::new(client));
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => "connect attempt timed out".to_string(),
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ConnectionError::Timeout {
                    instance: instance.id.clone(),
                    last_error,
                });
            }

            tracing::trace!(instance = %instance.id, attempts, error = %last_error, "Node not ready");
            tokio::time::sleep(backoff.next_delay().min(remaining)).await;
        }
    }
}

#[derive(Serialize)]
struct OpenChannelBody {
    node_pubkey: String,
    local_funding_amount: String,
    push_sat: String,
}

#[derive(Deserialize)]
struct StreamFrame<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<GatewayError>,
}

#[derive(Deserialize)]
struct GatewayError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

impl From<GatewayError> for RpcError {
    fn from(err: GatewayError) -> Self {
        RpcError::Status {
            code: err.code,
            message: err.message,
        }
    }
}

#[derive(Deserialize, Default)]
struct OpenUpdate {
    #[serde(default)]
    chan_pending: Option<PendingUpdate>,
    #[serde(default)]
    chan_open: Option<ChannelOpenUpdate>,
    #[serde(default)]
    psbt_fund: Option<Value>,
}

#[derive(Deserialize)]
struct PendingUpdate {
    #[serde(default)]
    txid: String,
    #[serde(default)]
    output_index: u32,
}

#[derive(Deserialize)]
struct ChannelOpenUpdate {
    channel_point: ChannelPoint,
}

#[derive(Deserialize)]
struct ChannelPoint {
    #[serde(default)]
    funding_txid_bytes: Option<String>,
    #[serde(default)]
    funding_txid_str: Option<String>,
    #[serde(default)]
    output_index: u32,
}

impl ChannelPoint {
    fn funding(&self) -> Result<FundingReference, RpcError> {
        let txid = match (&self.funding_txid_str, &self.funding_txid_bytes) {
            (Some(txid), _) => txid.clone(),
            (None, Some(bytes)) => txid_from_wire(bytes)?,
            (None, None) => {
                return Err(RpcError::Decode(
                    "channel point has no funding txid".to_string(),
                ))
            }
        };
        Ok(FundingReference::new(txid, self.output_index))
    }
}

/// Turn a base64 txid in internal byte order into display-order hex
fn txid_from_wire(encoded: &str) -> Result<String, RpcError> {
    let mut bytes = STANDARD
        .decode(encoded)
        .or_else(|_| URL_SAFE.decode(encoded))
        .map_err(|e| RpcError::Decode(format!("bad txid encoding: {}", e)))?;
    bytes.reverse();
    Ok(hex::encode(bytes))
}

/// Decode one line of the open-channel stream; `None` for frames that carry
/// nothing the orchestrator acts on
fn parse_open_update(line: &[u8]) -> Option<Result<OpenStatusUpdate, RpcError>> {
    let frame: StreamFrame<OpenUpdate> = match serde_json::from_slice(line) {
        Ok(frame) => frame,
        Err(e) => return Some(Err(RpcError::Decode(e.to_string()))),
    };

    if let Some(err) = frame.error {
        return Some(Err(err.into()));
    }

    let update = frame.result.unwrap_or_default();
    if let Some(open) = update.chan_open {
        return Some(
            open.channel_point
                .funding()
                .map(|funding| OpenStatusUpdate::Open { funding }),
        );
    }
    if let Some(pending) = update.chan_pending {
        return Some(txid_from_wire(&pending.txid).map(|txid| OpenStatusUpdate::Pending {
            funding: FundingReference::new(txid, pending.output_index),
        }));
    }
    if update.psbt_fund.is_some() {
        return Some(Ok(OpenStatusUpdate::PsbtFund));
    }
    None
}

fn error_from_body(status: StatusCode, body: &[u8]) -> RpcError {
    match serde_json::from_slice::<GatewayError>(body) {
        Ok(err) if !err.message.is_empty() => err.into(),
        _ => RpcError::Status {
            code: Some(i64::from(status.as_u16())),
            message: String::from_utf8_lossy(body).trim().to_string(),
        },
    }
}

/// Split a chunked body into newline-delimited frames, dropping blank lines
fn ndjson_lines<S, E>(body: S) -> BoxStream<'static, Result<Bytes, RpcError>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    futures::stream::unfold(
        (body.boxed(), BytesMut::new(), false),
        |(mut body, mut buf, mut done)| async move {
            loop {
                if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let line = buf.split_to(pos + 1).freeze().slice(..pos);
                    return Some((Ok(line), (body, buf, done)));
                }
                if done {
                    if buf.is_empty() {
                        return None;
                    }
                    let line = buf.split().freeze();
                    return Some((Ok(line), (body, buf, done)));
                }
                match body.next().await {
                    Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        buf.clear();
                        let err = RpcError::Transport(e.to_string());
                        return Some((Err(err), (body, buf, true)));
                    }
                    None => done = true,
                }
            }
        },
    )
    .filter(|line| {
        let blank = matches!(line, Ok(l) if l.iter().all(u8::is_ascii_whitespace));
        futures::future::ready(!blank)
    })
    .boxed()
}
