//! Tool handlers bound to the digest service.

use std::sync::Arc;

use serde_json::Value;

use super::tools::ToolHandler;
use crate::service::{DigestService, Trigger};

/// Optional array-of-strings argument
fn string_list(args: &Value, key: &str) -> Result<Option<Vec<String>>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(|s| s.to_string())
                    .ok_or_else(|| format!("'{}' must contain only strings", key))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(Value::String(single)) => Ok(Some(vec![single.clone()])),
        Some(_) => Err(format!("'{}' must be an array of strings", key)),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| format!("Failed to serialize result: {}", e))
}

#[derive(Debug)]
pub struct RunSearchHandler {
    pub service: Arc<DigestService>,
}

#[async_trait::async_trait]
impl ToolHandler for RunSearchHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let queries = string_list(&args, "queries")?.unwrap_or_default();
        let outcome = self.service.search_with(&queries, Trigger::Manual).await;
        to_json(&outcome)
    }
}

#[derive(Debug)]
pub struct SearchStatusHandler {
    pub service: Arc<DigestService>,
}

#[async_trait::async_trait]
impl ToolHandler for SearchStatusHandler {
    async fn execute(&self, _args: Value) -> Result<Value, String> {
        to_json(&self.service.status())
    }
}

#[derive(Debug)]
pub struct SendReportHandler {
    pub service: Arc<DigestService>,
}

#[async_trait::async_trait]
impl ToolHandler for SendReportHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let recipients = string_list(&args, "recipients")?;
        let report = self.service.send_report(recipients.as_deref()).await;
        to_json(&report)
    }
}

#[derive(Debug)]
pub struct ListSourcesHandler {
    pub service: Arc<DigestService>,
}

#[async_trait::async_trait]
impl ToolHandler for ListSourcesHandler {
    async fn execute(&self, _args: Value) -> Result<Value, String> {
        let sources: Vec<Value> = self
            .service
            .aggregator()
            .registry()
            .all()
            .enumerate()
            .map(|(priority, source)| {
                serde_json::json!({
                    "priority": priority + 1,
                    "id": source.id(),
                    "name": source.name(),
                    "capabilities": source.capabilities().labels(),
                })
            })
            .collect();
        Ok(serde_json::json!({ "sources": sources }))
    }
}
