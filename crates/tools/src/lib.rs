//! Tools the primary model may call while answering.
//!
//! The model decides when to call a tool; the chain's terminal step runs
//! the call and feeds the result back.

pub mod popular_things;

pub use popular_things::{ListPopularThingsTool, popular_things};

use maestro_core::catalog::Mention;
use maestro_core::record::RecordStore;
use maestro_core::tool::ToolRegistry;
use std::sync::Arc;

/// Create the tool registry offered to the primary model.
pub fn default_registry(mentions: Arc<dyn RecordStore<Mention>>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ListPopularThingsTool::new(mentions)));
    registry
}
