use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::api::ChatTransport;

/// One tool the assistant may invoke.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl ToolDescriptor {
    /// Creates a descriptor from its name and description.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Accepted shapes of the `/tools` response body.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ToolListPayload {
    Bare(Vec<ToolDescriptor>),
    Wrapped { tools: Vec<ToolDescriptor> },
}

impl ToolListPayload {
    pub(crate) fn into_tools(self) -> Vec<ToolDescriptor> {
        match self {
            Self::Bare(tools) | Self::Wrapped { tools } => tools,
        }
    }
}

/// Built-in descriptors served when the registry cannot be fetched.
pub fn default_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new("weather", "Get current weather information for a location"),
        ToolDescriptor::new("calculator", "Evaluate mathematical expressions"),
        ToolDescriptor::new("image_generator", "Generate images from text descriptions"),
        ToolDescriptor::new("database_query", "Query records from the database"),
        ToolDescriptor::new("file_operations", "Read, write, and manage files"),
    ]
}

/// Where a [`ToolCatalog`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCatalogSource {
    Remote,
    StaticFallback,
}

/// Tools available to the session, tagged with their source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCatalog {
    pub tools: Vec<ToolDescriptor>,
    pub source: ToolCatalogSource,
    pub warning: Option<String>,
}

impl ToolCatalog {
    /// Wraps a list returned by the service.
    pub fn from_remote(tools: Vec<ToolDescriptor>) -> Self {
        Self {
            tools,
            source: ToolCatalogSource::Remote,
            warning: None,
        }
    }

    /// Built-in defaults, recording why the remote list was not used.
    pub fn from_static_fallback(warning: String) -> Self {
        Self {
            tools: default_tools(),
            source: ToolCatalogSource::StaticFallback,
            warning: Some(warning),
        }
    }

    /// Looks up a tool by its identifier.
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|tool| tool.name == name)
    }
}

/// Fetches the tool list once; any failure degrades to [`default_tools`].
pub async fn fetch_catalog(transport: &dyn ChatTransport) -> ToolCatalog {
    match transport.fetch_tools().await {
        Ok(tools) => {
            tracing::debug!(tool_count = tools.len(), "loaded tool registry");
            ToolCatalog::from_remote(tools)
        }
        Err(error) => {
            tracing::warn!(
                error = %error,
                "tool registry fetch failed; serving built-in defaults"
            );
            ToolCatalog::from_static_fallback(error.to_string())
        }
    }
}

/// Session-scoped cache over [`fetch_catalog`].
pub struct ToolRegistry {
    transport: Arc<dyn ChatTransport>,
    catalog: OnceCell<Arc<ToolCatalog>>,
}

impl ToolRegistry {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            transport,
            catalog: OnceCell::new(),
        }
    }

    /// Returns the cached catalog, fetching it on first use only.
    pub async fn load(&self) -> Arc<ToolCatalog> {
        self.catalog
            .get_or_init(|| async { Arc::new(fetch_catalog(self.transport.as_ref()).await) })
            .await
            .clone()
    }

    /// Catalog loaded so far, without fetching.
    pub fn cached(&self) -> Option<Arc<ToolCatalog>> {
        self.catalog.get().cloned()
    }
}
