use crate::error::AppError;
use crate::market::types::normalize_symbol;
use reqwest::{Client, Response};
use serde::Serialize;
use simd_json::OwnedValue;
use tracing::{info, warn};

const SET_CRYPTO: &str = "set-crypto";
const CLEAR_CRYPTO: &str = "clear-crypto";
const START_SERVICE: &str = "start-service";
const STOP_SERVICE: &str = "stop-service";
const SERVICE_STATUS: &str = "status";
const GET_CRYPTO: &str = "get-crypto";

const MAX_REASON_CHARS: usize = 200;

#[derive(Debug, Serialize)]
struct SetSymbolBody<'a> {
    symbol: &'a str,
}

/// Request/response client for one exchange's trading service. Holds no
/// state between calls.
#[derive(Debug, Clone)]
pub struct ControlClient {
    http: Client,
    base_url: String,
}

impl ControlClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, operation: &str) -> String {
        format!("{}/{operation}", self.base_url.trim_end_matches('/'))
    }

    /// Returns the normalized symbol that was sent.
    pub async fn set_active_symbol(&self, raw_symbol: &str) -> Result<String, AppError> {
        let symbol = normalize_symbol(raw_symbol)
            .ok_or_else(|| AppError::InvalidArgument("symbol must not be empty".to_string()))?;

        let response = self
            .http
            .post(self.endpoint(SET_CRYPTO))
            .json(&SetSymbolBody { symbol: &symbol })
            .send()
            .await?;
        ensure_accepted(SET_CRYPTO, response).await?;

        info!(base_url = %self.base_url, symbol = %symbol, "active symbol set");
        Ok(symbol)
    }

    pub async fn clear_active_symbol(&self) -> Result<(), AppError> {
        let response = self.http.delete(self.endpoint(CLEAR_CRYPTO)).send().await?;
        ensure_accepted(CLEAR_CRYPTO, response).await?;
        info!(base_url = %self.base_url, "active symbol cleared");
        Ok(())
    }

    pub async fn start_service(&self) -> Result<(), AppError> {
        let response = self.http.post(self.endpoint(START_SERVICE)).send().await?;
        ensure_accepted(START_SERVICE, response).await?;
        info!(base_url = %self.base_url, "remote service started");
        Ok(())
    }

    pub async fn stop_service(&self) -> Result<(), AppError> {
        let response = self.http.post(self.endpoint(STOP_SERVICE)).send().await?;
        ensure_accepted(STOP_SERVICE, response).await?;
        info!(base_url = %self.base_url, "remote service stopped");
        Ok(())
    }

    pub async fn service_status(&self) -> Result<OwnedValue, AppError> {
        self.fetch_document(SERVICE_STATUS).await
    }

    pub async fn active_symbol(&self) -> Result<OwnedValue, AppError> {
        self.fetch_document(GET_CRYPTO).await
    }

    async fn fetch_document(&self, operation: &'static str) -> Result<OwnedValue, AppError> {
        let response = self.http.get(self.endpoint(operation)).send().await?;
        let response = ensure_accepted(operation, response).await?;
        let body = response.bytes().await?;
        Ok(parse_document(&body))
    }
}

/// Bodies are not contractually JSON; anything else comes back as a string.
fn parse_document(body: &[u8]) -> OwnedValue {
    let mut owned = body.to_vec();
    match simd_json::to_owned_value(&mut owned) {
        Ok(value) => value,
        Err(_) => OwnedValue::from(String::from_utf8_lossy(body).trim().to_string()),
    }
}

async fn ensure_accepted(operation: &'static str, response: Response) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let trimmed = body.trim();
    let reason = if trimmed.is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        trimmed.chars().take(MAX_REASON_CHARS).collect()
    };

    warn!(operation, status = status.as_u16(), reason = %reason, "control call rejected");
    Err(AppError::ControlRejected {
        operation,
        status: status.as_u16(),
        reason,
    })
}

/// The active trading symbol as seen by the caller. Only a successful control
/// call moves `selected`.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSymbolState {
    pub selected: Option<String>,
    pub last_error: Option<String>,
}

impl ActiveSymbolState {
    pub async fn select(
        &mut self,
        control: &ControlClient,
        raw_symbol: &str,
    ) -> Result<String, AppError> {
        match control.set_active_symbol(raw_symbol).await {
            Ok(symbol) => {
                self.selected = Some(symbol.clone());
                self.last_error = None;
                Ok(symbol)
            }
            Err(error) => {
                self.last_error = Some(error.to_string());
                Err(error)
            }
        }
    }

    pub async fn clear(&mut self, control: &ControlClient) -> Result<(), AppError> {
        match control.clear_active_symbol().await {
            Ok(()) => {
                self.selected = None;
                self.last_error = None;
                Ok(())
            }
            Err(error) => {
                self.last_error = Some(error.to_string());
                Err(error)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    #[derive(Debug)]
    pub(crate) struct RecordedRequest {
        pub method: String,
        pub path: String,
        pub body: String,
    }

    /// Answers exactly one HTTP request with the given status line and body.
    pub(crate) async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, JoinHandle<RecordedRequest>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("test listener should bind");
        let address = listener.local_addr().expect("listener has an address");

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("client should connect");
            let mut buffer = Vec::new();
            let mut chunk = [0_u8; 1024];

            let header_end = loop {
                let read = socket.read(&mut chunk).await.expect("request should be readable");
                assert!(read > 0, "client closed before sending headers");
                buffer.extend_from_slice(&chunk[..read]);
                if let Some(position) = find_header_end(&buffer) {
                    break position;
                }
            };

            let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
            let content_length = head
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);

            let body_start = header_end + 4;
            while buffer.len() < body_start + content_length {
                let read = socket.read(&mut chunk).await.expect("body should be readable");
                assert!(read > 0, "client closed before sending body");
                buffer.extend_from_slice(&chunk[..read]);
            }

            let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
            let method = request_line.next().unwrap_or_default().to_string();
            let path = request_line.next().unwrap_or_default().to_string();
            let request_body =
                String::from_utf8_lossy(&buffer[body_start..body_start + content_length]).to_string();

            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket
                .write_all(response.as_bytes())
                .await
                .expect("response should be written");
            let _ = socket.shutdown().await;

            RecordedRequest {
                method,
                path,
                body: request_body,
            }
        });

        (format!("http://{address}/delta-exchange/"), handle)
    }

    fn find_header_end(buffer: &[u8]) -> Option<usize> {
        buffer.windows(4).position(|window| window == b"\r\n\r\n")
    }

    #[tokio::test]
    async fn set_active_symbol_sends_uppercase_symbol() {
        let (base_url, server) = serve_once("200 OK", r#"{"ok":true}"#).await;
        let control = ControlClient::new(Client::new(), base_url);
        let mut state = ActiveSymbolState::default();

        let symbol = state
            .select(&control, "btcusdt")
            .await
            .expect("set-crypto should succeed");

        let request = server.await.expect("server task should finish");
        assert_eq!(symbol, "BTCUSDT");
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/delta-exchange/set-crypto");
        assert_eq!(request.body, r#"{"symbol":"BTCUSDT"}"#);
        assert_eq!(state.selected.as_deref(), Some("BTCUSDT"));
        assert_eq!(state.last_error, None);
    }

    #[tokio::test]
    async fn rejected_set_leaves_selection_untouched() {
        let (base_url, server) = serve_once("500 Internal Server Error", "").await;
        let control = ControlClient::new(Client::new(), base_url);
        let mut state = ActiveSymbolState {
            selected: Some("ETHUSDT".to_string()),
            last_error: None,
        };

        let result = state.select(&control, "btcusdt").await;

        let request = server.await.expect("server task should finish");
        assert_eq!(request.body, r#"{"symbol":"BTCUSDT"}"#);
        match result {
            Err(AppError::ControlRejected {
                operation,
                status,
                reason,
            }) => {
                assert_eq!(operation, "set-crypto");
                assert_eq!(status, 500);
                assert_eq!(reason, "Internal Server Error");
            }
            other => panic!("expected ControlRejected, got {other:?}"),
        }
        assert_eq!(state.selected.as_deref(), Some("ETHUSDT"));
        assert!(state.last_error.is_some());
    }

    #[tokio::test]
    async fn empty_symbol_is_rejected_before_any_request() {
        let control = ControlClient::new(Client::new(), "http://127.0.0.1:9/delta-exchange/");
        let mut state = ActiveSymbolState::default();

        let result = state.select(&control, "   ").await;

        assert!(matches!(result, Err(AppError::InvalidArgument(_))));
        assert_eq!(state.selected, None);
    }

    #[tokio::test]
    async fn clear_uses_delete_and_empties_selection() {
        let (base_url, server) = serve_once("204 No Content", "").await;
        let control = ControlClient::new(Client::new(), base_url);
        let mut state = ActiveSymbolState {
            selected: Some("BTCUSDT".to_string()),
            last_error: Some("stale".to_string()),
        };

        state.clear(&control).await.expect("clear-crypto should succeed");

        let request = server.await.expect("server task should finish");
        assert_eq!(request.method, "DELETE");
        assert_eq!(request.path, "/delta-exchange/clear-crypto");
        assert_eq!(state, ActiveSymbolState::default());
    }

    #[tokio::test]
    async fn start_and_stop_service_post_to_their_paths() {
        let (base_url, server) = serve_once("200 OK", "started").await;
        ControlClient::new(Client::new(), base_url)
            .start_service()
            .await
            .expect("start-service should succeed");
        let request = server.await.expect("server task should finish");
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/delta-exchange/start-service");

        let (base_url, server) = serve_once("200 OK", "stopped").await;
        ControlClient::new(Client::new(), base_url)
            .stop_service()
            .await
            .expect("stop-service should succeed");
        let request = server.await.expect("server task should finish");
        assert_eq!(request.path, "/delta-exchange/stop-service");
    }

    #[tokio::test]
    async fn status_body_is_parsed_as_json_when_possible() {
        let (base_url, server) = serve_once("200 OK", r#"{"running":true,"symbol":"BTCUSDT"}"#).await;
        let document = ControlClient::new(Client::new(), base_url)
            .service_status()
            .await
            .expect("status should succeed");
        let request = server.await.expect("server task should finish");

        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/delta-exchange/status");
        assert_eq!(
            document,
            simd_json::json!({"running": true, "symbol": "BTCUSDT"})
        );
    }

    #[tokio::test]
    async fn non_json_active_symbol_body_becomes_string() {
        let (base_url, server) = serve_once("200 OK", "BTCUSDT").await;
        let document = ControlClient::new(Client::new(), base_url)
            .active_symbol()
            .await
            .expect("get-crypto should succeed");
        let request = server.await.expect("server task should finish");

        assert_eq!(request.path, "/delta-exchange/get-crypto");
        assert_eq!(document, OwnedValue::from("BTCUSDT".to_string()));
    }
}
