//! Events pushed at the editor by the bridge.
use serde::{Deserialize, Serialize};

use crate::types::ThreadId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "body", rename_all = "camelCase")]
#[non_exhaustive]
pub enum Event {
    /// The bridge is ready to receive configuration requests.
    Initialized,
    /// The runtime reported a halt; details in the body.
    Stopped(StoppedEventBody),
    /// The session is over, no further requests are serviced.
    Terminated,
}

/// Why execution halted. Runtimes only report halts at breakpoints (a
/// completed step surfaces as a STOP at the new location the same way), so
/// a single reason covers every stop the bridge emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoppedReason {
    Breakpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
    pub reason: StoppedReason,
    pub thread_id: ThreadId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_stopped_event() {
        let event = Event::Stopped(StoppedEventBody {
            reason: StoppedReason::Breakpoint,
            thread_id: 1,
            description: None,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"stopped""#));
        assert!(json.contains(r#""reason":"breakpoint""#));
        assert!(json.contains(r#""threadId":1"#));
    }
}
