use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use snafu::{ResultExt, ensure};

use crate::error::{
    ApiResult, BuildClientSnafu, DecodeToolListSnafu, HttpStatusSnafu, ReadBodySnafu,
    SendRequestSnafu,
};
use crate::settings::ClientSettings;
use crate::tools::{ToolDescriptor, ToolListPayload};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type ByteStream = Pin<Box<dyn Stream<Item = ApiResult<Bytes>> + Send + 'static>>;

/// Network seam between the chat core and the assistant service.
pub trait ChatTransport: Send + Sync {
    /// Sends one user message and returns the raw response body once the
    /// service has answered with a success status.
    fn stream_chat<'a>(&'a self, message: &'a str) -> BoxFuture<'a, ApiResult<ByteStream>>;

    /// Fetches the tool list, accepting either response shape.
    fn fetch_tools<'a>(&'a self) -> BoxFuture<'a, ApiResult<Vec<ToolDescriptor>>>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

/// HTTP implementation of [`ChatTransport`].
#[derive(Debug, Clone)]
pub struct ChatApi {
    client: reqwest::Client,
    endpoint: String,
}

impl ChatApi {
    /// Creates a client for the normalized endpoint in `settings`.
    pub fn new(settings: &ClientSettings) -> ApiResult<Self> {
        let settings = settings.clone().normalized();
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout())
            .build()
            .context(BuildClientSnafu {
                stage: "build-client",
            })?;

        Ok(Self {
            client,
            endpoint: settings.endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    async fn open_chat_stream(&self, message: &str) -> ApiResult<ByteStream> {
        let url = self.url("chat");
        let response = self
            .client
            .post(&url)
            .json(&ChatRequest { message })
            .send()
            .await
            .context(SendRequestSnafu {
                stage: "send-chat-request",
                url: url.clone(),
            })?;

        let status = response.status();
        ensure!(
            status.is_success(),
            HttpStatusSnafu {
                stage: "chat-http-status",
                status: status.as_u16(),
            }
        );

        tracing::debug!(url = %url, status = status.as_u16(), "chat stream opened");

        let body = response.bytes_stream().map(|chunk| {
            chunk.context(ReadBodySnafu {
                stage: "read-chat-chunk",
            })
        });
        Ok(Box::pin(body))
    }

    async fn request_tools(&self) -> ApiResult<Vec<ToolDescriptor>> {
        let url = self.url("tools");
        let response = self.client.get(&url).send().await.context(SendRequestSnafu {
            stage: "send-tools-request",
            url: url.clone(),
        })?;

        let status = response.status();
        ensure!(
            status.is_success(),
            HttpStatusSnafu {
                stage: "tools-http-status",
                status: status.as_u16(),
            }
        );

        let body = response.bytes().await.context(ReadBodySnafu {
            stage: "read-tools-response",
        })?;
        let payload: ToolListPayload =
            serde_json::from_slice(&body).context(DecodeToolListSnafu {
                stage: "parse-tools-response",
            })?;

        Ok(payload.into_tools())
    }
}

impl ChatTransport for ChatApi {
    fn stream_chat<'a>(&'a self, message: &'a str) -> BoxFuture<'a, ApiResult<ByteStream>> {
        Box::pin(self.open_chat_stream(message))
    }

    fn fetch_tools<'a>(&'a self) -> BoxFuture<'a, ApiResult<Vec<ToolDescriptor>>> {
        Box::pin(self.request_tools())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::ndjson::decode_records;
    use crate::record::{RecordKind, StreamRecord};
    use crate::test_support::serve_once;

    fn api_for(endpoint: String) -> ChatApi {
        ChatApi::new(&ClientSettings::with_endpoint(endpoint)).expect("client should build")
    }

    #[tokio::test]
    async fn streams_ndjson_body() {
        let endpoint = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/x-ndjson\r\nConnection: close\r\n\r\n\
             {\"type\":\"text\",\"content\":\"Hello \",\"timestamp\":\"t1\"}\n\
             {\"type\":\"text\",\"content\":\"world\",\"timestamp\":\"t2\"}\n",
        )
        .await;

        let body = api_for(endpoint)
            .stream_chat("hi")
            .await
            .expect("stream should open");
        let records = decode_records::<StreamRecord, _, _, _>(body)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .expect("body should read cleanly");

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|record| record.kind == RecordKind::Text));
        assert_eq!(records[1].content, "world");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let endpoint = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        let result = api_for(endpoint).stream_chat("hi").await;
        match result {
            Err(error @ ApiError::HttpStatus { status: 503, .. }) => {
                assert_eq!(error.to_string(), "HTTP error! status: 503");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("503 must not open a stream"),
        }
    }

    #[tokio::test]
    async fn fetches_wrapped_tool_list() {
        let body = r#"{"tools":[{"name":"weather","description":"Forecasts"}]}"#;
        let endpoint = serve_once(format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        ))
        .await;

        let tools = api_for(endpoint)
            .fetch_tools()
            .await
            .expect("tools should load");
        assert_eq!(tools, vec![ToolDescriptor::new("weather", "Forecasts")]);
    }

    #[tokio::test]
    async fn malformed_tool_list_is_a_decode_error() {
        let endpoint = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 8\r\nConnection: close\r\n\r\nnot json",
        )
        .await;

        let result = api_for(endpoint).fetch_tools().await;
        assert!(matches!(result, Err(ApiError::DecodeToolList { .. })));
    }
}
