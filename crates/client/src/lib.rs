#![deny(unsafe_code)]

/// HTTP transport for the chat service.
pub mod api;
pub mod error;
/// Newline-delimited JSON decoding for streamed response bodies.
pub mod ndjson;
/// Wire records of the `/chat` stream.
pub mod record;
pub mod settings;
/// Tool descriptors and the session tool registry.
pub mod tools;

#[cfg(test)]
mod test_support;

pub use api::{BoxFuture, ByteStream, ChatApi, ChatTransport};
pub use error::{ApiError, ApiResult};
pub use ndjson::{NdjsonDecoder, decode_records};
pub use record::{RecordKind, StreamRecord, ToolStatus, ToolUpdate};
pub use settings::{ClientSettings, DEFAULT_ENDPOINT, SettingsError};
pub use tools::{
    ToolCatalog, ToolCatalogSource, ToolDescriptor, ToolRegistry, default_tools, fetch_catalog,
};
