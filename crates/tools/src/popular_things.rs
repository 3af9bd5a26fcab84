//! Popular-things tool — the most-mentioned composers, instruments or performers.

use async_trait::async_trait;
use maestro_core::catalog::{Mention, MentionType};
use maestro_core::error::{StoreError, ToolError};
use maestro_core::record::RecordStore;
use maestro_core::tool::{Tool, ToolResult};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_TOP_K: usize = 5;

/// The `top_k` mentions of `kind`, highest count first.
///
/// Ties keep the store's order.
pub async fn popular_things(
    store: &dyn RecordStore<Mention>,
    kind: MentionType,
    top_k: usize,
) -> Result<Vec<Mention>, StoreError> {
    let mut mentions: Vec<Mention> = store
        .find_all()
        .await?
        .into_iter()
        .filter(|m| m.kind == kind)
        .collect();
    mentions.sort_by(|a, b| b.count.cmp(&a.count));
    mentions.truncate(top_k);
    Ok(mentions)
}

#[derive(Debug, Deserialize)]
struct Arguments {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    top_k: Option<usize>,
}

/// Exposes [`popular_things`] to the model.
pub struct ListPopularThingsTool {
    mentions: Arc<dyn RecordStore<Mention>>,
}

impl ListPopularThingsTool {
    pub fn new(mentions: Arc<dyn RecordStore<Mention>>) -> Self {
        Self { mentions }
    }
}

#[async_trait]
impl Tool for ListPopularThingsTool {
    fn name(&self) -> &str {
        "list_popular_things"
    }

    fn description(&self) -> &str {
        "List the most popular composers, instruments or performers, ranked by how often users mention them."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "type": {
                    "type": "string",
                    "enum": ["Composer", "Instrument", "Performer"],
                    "description": "What kind of thing to rank"
                },
                "top_k": {
                    "type": "integer",
                    "description": "How many results to return (default 5)",
                    "default": DEFAULT_TOP_K
                }
            },
            "required": ["type"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: Arguments = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        let kind: MentionType = args.kind.parse().map_err(ToolError::InvalidArguments)?;
        let top_k = args.top_k.unwrap_or(DEFAULT_TOP_K);

        let ranked = popular_things(self.mentions.as_ref(), kind, top_k)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().to_string(),
                reason: e.to_string(),
            })?;
        debug!(%kind, top_k, found = ranked.len(), "Listed popular things");

        let data = serde_json::to_value(&ranked).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: e.to_string(),
        })?;

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: data.to_string(),
            data: Some(data),
        })
    }
}
