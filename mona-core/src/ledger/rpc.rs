//! Ethereum JSON-RPC ledger client.

use super::LedgerError;
use crate::events::LogPosition;
use alloy_primitives::{Address, B256, Bytes, U64};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Range-filtered log query for a single contract and event topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub topic0: B256,
    /// Inclusive.
    pub from_block: u64,
    /// Inclusive.
    pub to_block: u64,
}

impl LogFilter {
    fn to_params(&self) -> serde_json::Value {
        serde_json::json!([{
            "address": self.address,
            "fromBlock": U64::from(self.from_block),
            "toBlock": U64::from(self.to_block),
            "topics": [self.topic0],
        }])
    }
}

/// A log entry as returned by `eth_getLogs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    #[serde(default)]
    pub address: Address,
    #[serde(default)]
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub log_index: Option<U64>,
    #[serde(default)]
    pub transaction_hash: Option<B256>,
    /// Set when the log was dropped by a chain reorganisation.
    #[serde(default)]
    pub removed: bool,
}

impl RawLog {
    /// `None` for pending logs.
    pub fn position(&self) -> Option<LogPosition> {
        Some(LogPosition {
            block_number: self.block_number?.to::<u64>(),
            log_index: self.log_index?.to::<u64>(),
        })
    }
}

/// Read access to the remote ledger.
///
/// Implemented over JSON-RPC by [`JsonRpcLedgerClient`]; tests use an
/// in-memory ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current chain height.
    async fn block_number(&self) -> Result<u64, LedgerError>;

    /// All logs matching `filter`.
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, LedgerError>;
}

#[async_trait]
impl<T: LedgerClient + ?Sized> LedgerClient for Arc<T> {
    async fn block_number(&self) -> Result<u64, LedgerError> {
        (**self).block_number().await
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, LedgerError> {
        (**self).get_logs(filter).await
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// [`LedgerClient`] over Ethereum JSON-RPC 2.0 (HTTP).
#[derive(Debug)]
pub struct JsonRpcLedgerClient {
    endpoint: Url,
    http_client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcLedgerClient {
    /// Create a client; every request is bounded by `request_timeout`.
    pub fn new(endpoint: Url, request_timeout: Duration) -> Self {
        Self {
            endpoint,
            http_client: reqwest::Client::builder()
                .timeout(request_timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            next_id: AtomicU64::new(1),
        }
    }

    async fn call<P, T>(&self, method: &'static str, params: P) -> Result<T, LedgerError>
    where
        P: Serialize + Send,
        T: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "Sending JSON-RPC request");

        let response = self
            .http_client
            .post(self.endpoint.clone())
            .json(&RpcRequest {
                jsonrpc: "2.0",
                id,
                method,
                params,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::Status {
                status: status.as_u16(),
            });
        }

        let body: RpcResponse<T> = response.json().await?;
        if let Some(error) = body.error {
            return Err(LedgerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        body.result.ok_or(LedgerError::MissingResult { method })
    }
}

#[async_trait]
impl LedgerClient for JsonRpcLedgerClient {
    async fn block_number(&self) -> Result<u64, LedgerError> {
        let height: U64 = self.call("eth_blockNumber", serde_json::json!([])).await?;
        Ok(height.to::<u64>())
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, LedgerError> {
        self.call("eth_getLogs", filter.to_params()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serve a single HTTP request with `body` and hand back the request body.
    async fn serve_once(body: &'static str) -> (Url, oneshot::Receiver<serde_json::Value>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            let request_body = loop {
                let n = stream.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let headers = text[..split].to_ascii_lowercase();
                    let length: usize = headers
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .map(|v| v.trim().parse().unwrap())
                        .unwrap_or(0);
                    if buf.len() >= split + 4 + length {
                        break buf[split + 4..split + 4 + length].to_vec();
                    }
                }
                if n == 0 {
                    break Vec::new();
                }
            };
            let _ = tx.send(serde_json::from_slice(&request_body).unwrap());

            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        });

        (format!("http://{addr}/").parse().unwrap(), rx)
    }

    fn client(url: Url) -> JsonRpcLedgerClient {
        JsonRpcLedgerClient::new(url, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_block_number() {
        let (url, request) = serve_once(r#"{"jsonrpc":"2.0","id":1,"result":"0x8e1bc9"}"#).await;
        assert_eq!(client(url).block_number().await.unwrap(), 9_313_225);

        let request = request.await.unwrap();
        assert_eq!(request["jsonrpc"], "2.0");
        assert_eq!(request["method"], "eth_blockNumber");
        assert_eq!(request["params"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_get_logs_request_and_response() {
        let (url, request) = serve_once(
            concat!(
                r#"{"jsonrpc":"2.0","id":1,"result":[{"#,
                r#""address":"0x7c3dc63d5ba4046f57680b24a1362f4052535378","#,
                r#""topics":["0xabababababababababababababababababababababababababababababababab"],"#,
                r#""data":"0x0102","blockNumber":"0xb","logIndex":"0x2","#,
                r#""transactionHash":"0x00000000000000000000000000000000000000000000000000000000000000ff","#,
                r#""removed":false}]}"#
            ),
        )
        .await;
        let filter = LogFilter {
            address: "0x7C3dc63D5Ba4046F57680b24A1362f4052535378".parse().unwrap(),
            topic0: B256::repeat_byte(0xab),
            from_block: 11,
            to_block: 20,
        };

        let logs = client(url).get_logs(&filter).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].topics, vec![B256::repeat_byte(0xab)]);
        assert_eq!(logs[0].data.to_vec(), vec![0x01, 0x02]);
        assert_eq!(logs[0].transaction_hash, Some(B256::with_last_byte(0xff)));
        assert_eq!(
            logs[0].position(),
            Some(LogPosition {
                block_number: 11,
                log_index: 2
            })
        );

        let request = request.await.unwrap();
        assert_eq!(request["method"], "eth_getLogs");
        let params = &request["params"][0];
        assert_eq!(
            params["address"].as_str().unwrap().to_lowercase(),
            "0x7c3dc63d5ba4046f57680b24a1362f4052535378"
        );
        assert_eq!(params["fromBlock"], "0xb");
        assert_eq!(params["toBlock"], "0x14");
        assert_eq!(params["topics"][0], format!("0x{}", "ab".repeat(32)));
    }

    #[tokio::test]
    async fn test_rpc_error_object() {
        let (url, _request) = serve_once(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32005,"message":"query returned more than 10000 results"}}"#,
        )
        .await;
        match client(url).block_number().await {
            Err(LedgerError::Rpc { code, message }) => {
                assert_eq!(code, -32005);
                assert!(message.contains("10000"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_result() {
        let (url, _request) = serve_once(r#"{"jsonrpc":"2.0","id":1}"#).await;
        assert!(matches!(
            client(url).block_number().await,
            Err(LedgerError::MissingResult {
                method: "eth_blockNumber"
            })
        ));
    }
}
