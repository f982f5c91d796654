//! MCP server over pmcp.
//!
//! Exposes the digest tools to MCP clients over stdio or streamable HTTP.

use crate::mcp::tools::ToolRegistry;
use crate::service::DigestService;
use async_trait::async_trait;
use pmcp::{
    server::streamable_http_server::{StreamableHttpServer, StreamableHttpServerConfig},
    Error, RequestHandlerExtra, Server, ServerCapabilities, ToolHandler, ToolInfo,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// MCP server for the bloodless medicine digest
#[derive(Debug, Clone)]
pub struct McpServer {
    server: Arc<Mutex<Server>>,
    tool_names: Vec<String>,
}

impl McpServer {
    /// Create a server whose tools are bound to `service`
    pub fn new(service: Arc<DigestService>) -> Result<Self, pmcp::Error> {
        let tools = ToolRegistry::from_service(service);
        let tool_names = tools.all().iter().map(|t| t.name.clone()).collect();
        let server = Self::build_server(tools)?;
        Ok(Self {
            server: Arc::new(Mutex::new(server)),
            tool_names,
        })
    }

    /// Names of the registered tools
    pub fn tool_names(&self) -> &[String] {
        &self.tool_names
    }

    fn build_server(tools: ToolRegistry) -> Result<Server, pmcp::Error> {
        let mut builder = Server::builder()
            .name("bloodless-digest")
            .version(env!("CARGO_PKG_VERSION"))
            .capabilities(ServerCapabilities::default());

        for tool in tools.all() {
            let wrapper = ToolWrapper {
                name: tool.name.clone(),
                description: Some(tool.description.clone()),
                input_schema: tool.input_schema.clone(),
                handler: tool.handler.clone(),
            };
            builder = builder.tool(wrapper.name.clone(), wrapper);
        }

        builder.build()
    }

    /// Serve over stdio until the client disconnects
    pub async fn run(self) -> Result<(), pmcp::Error> {
        tracing::info!(tools = self.tool_names.len(), "Starting MCP server in stdio mode");

        // run_stdio() takes the server by value
        let server = Arc::try_unwrap(self.server)
            .map_err(|_| Error::internal("MCP server is shared; cannot serve stdio"))?
            .into_inner();

        server.run_stdio().await
    }

    /// Serve over streamable HTTP on `addr`
    pub async fn run_http(&self, addr: &str) -> Result<(SocketAddr, JoinHandle<()>), pmcp::Error> {
        tracing::info!("Starting MCP server in HTTP mode on {}", addr);
        let socket_addr = parse_addr(addr)?;
        StreamableHttpServer::new(socket_addr, self.server.clone())
            .start()
            .await
    }

    /// Serve over streamable HTTP with a custom transport configuration
    pub async fn run_http_with_config(
        &self,
        addr: &str,
        config: StreamableHttpServerConfig,
    ) -> Result<(SocketAddr, JoinHandle<()>), pmcp::Error> {
        tracing::info!("Starting MCP server in HTTP mode on {} (custom config)", addr);
        let socket_addr = parse_addr(addr)?;
        StreamableHttpServer::with_config(socket_addr, self.server.clone(), config)
            .start()
            .await
    }
}

fn parse_addr(addr: &str) -> Result<SocketAddr, pmcp::Error> {
    addr.parse()
        .map_err(|e| Error::invalid_params(format!("Invalid address '{}': {}", addr, e)))
}

/// Adapts a registry tool to pmcp's ToolHandler
#[derive(Clone)]
struct ToolWrapper {
    name: String,
    description: Option<String>,
    input_schema: Value,
    handler: Arc<dyn crate::mcp::tools::ToolHandler>,
}

#[async_trait]
impl ToolHandler for ToolWrapper {
    async fn handle(&self, args: Value, _extra: RequestHandlerExtra) -> Result<Value, Error> {
        self.handler
            .execute(args)
            .await
            .map_err(|e| Error::internal(&e))
    }

    fn metadata(&self) -> Option<ToolInfo> {
        Some(ToolInfo::new(
            self.name.clone(),
            self.description.clone(),
            self.input_schema.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_addr() {
        assert!(parse_addr("127.0.0.1:3000").is_ok());
        assert!(parse_addr("localhost").is_err());
    }
}
