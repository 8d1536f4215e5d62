//! LLM-driven curation: the chat client, the annotator built on it, the
//! query planner and the loop that ties them to a literature source.

pub mod annotator;
pub mod chat;
pub mod curation_loop;
pub mod planner;
pub mod response;

#[cfg(test)]
pub(crate) mod testing;

pub use annotator::{LlmAnnotator, Taxonomy};
pub use chat::{ChatClient, LlmProvider};
pub use planner::{PlannerDecision, QueryPlanner};
