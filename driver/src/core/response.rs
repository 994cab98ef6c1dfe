//! Parsing of the agent response artifact.
//!
//! Parsing never fails: unrecognised content is read as a successful
//! completion carrying the full text as its approach.

use crate::core::types::AgentResponse;

const DONE: &str = "DONE";
const DONE_PREFIX: &str = "DONE:";
const STUCK_PREFIX: &str = "STUCK:";

/// Interpret raw response content. Blank content means no response yet.
pub fn parse_response(raw: &str) -> Option<AgentResponse> {
    let content = raw.trim();
    if content.is_empty() {
        return None;
    }
    if content == DONE {
        return Some(AgentResponse::Done { approach: None });
    }
    if let Some(rest) = content.strip_prefix(DONE_PREFIX) {
        let approach = rest.trim();
        return Some(AgentResponse::Done {
            approach: (!approach.is_empty()).then(|| approach.to_string()),
        });
    }
    if let Some(rest) = content.strip_prefix(STUCK_PREFIX) {
        return Some(AgentResponse::Stuck {
            reason: rest.trim().to_string(),
        });
    }
    Some(AgentResponse::Done {
        approach: Some(content.to_string()),
    })
}
