//! What the side-call advisors look at.

use crate::advisor::AdvisedRequest;
use std::sync::Arc;

/// Picks the text an advisor classifies or extracts from.
pub type BasisExtractor = Arc<dyn Fn(&AdvisedRequest) -> String + Send + Sync>;

/// The user's own words: everything before the first blank line.
///
/// Context appended earlier in the chain (retrieved notes) comes after a
/// blank line and is dropped.
pub fn user_content(request: &AdvisedRequest) -> String {
    let text = request.user_text();
    text.split_once("\n\n").map_or(text, |(head, _)| head).to_string()
}

pub fn default_extractor() -> BasisExtractor {
    Arc::new(user_content)
}
