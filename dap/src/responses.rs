//! Responses returned to the editor for [`crate::requests`].
use serde::{Deserialize, Serialize};

use crate::types::{self, Scope, StackFrame, Thread, Variable};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    #[serde(rename = "request_seq")]
    pub request_seq: types::Seq,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub body: Option<ResponseBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", content = "body", rename_all = "camelCase")]
#[non_exhaustive]
pub enum ResponseBody {
    Initialize(Capabilities),
    Attach,
    SetBreakpoints(SetBreakpointsResponse),
    Threads(ThreadsResponse),
    StackTrace(StackTraceResponse),
    Scopes(ScopesResponse),
    Variables(VariablesResponse),
    Next,
    StepIn,
    Continue(ContinueResponse),
    Disconnect,
}

/// Capability flags advertised on initialize.
///
/// These mirror what the original adapter claims; only breakpoints,
/// step/continue, stack traces and variables are exercised by the bridge.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub supports_configuration_done_request: Option<bool>,
    pub supports_evaluate_for_hovers: Option<bool>,
    pub supports_step_back: Option<bool>,
    pub supports_data_breakpoints: Option<bool>,
    pub supports_completions_request: Option<bool>,
    pub completion_trigger_characters: Option<Vec<String>>,
    pub supports_cancel_request: Option<bool>,
    pub supports_breakpoint_locations_request: Option<bool>,
    pub supports_step_in_targets_request: Option<bool>,
    pub support_suspend_debuggee: Option<bool>,
    pub support_terminate_debuggee: Option<bool>,
    pub supports_function_breakpoints: Option<bool>,
    pub supports_delayed_stack_trace_loading: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsResponse {
    pub breakpoints: Vec<types::Breakpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadsResponse {
    pub threads: Vec<Thread>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceResponse {
    pub stack_frames: Vec<StackFrame>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesResponse {
    pub scopes: Vec<Scope>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesResponse {
    pub variables: Vec<Variable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_threads_continued: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_initialize_response() {
        let response = Response {
            request_seq: 1,
            success: true,
            message: None,
            body: Some(ResponseBody::Initialize(Capabilities {
                supports_configuration_done_request: Some(true),
                completion_trigger_characters: Some(vec![".".to_string(), "[".to_string()]),
                ..Default::default()
            })),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""command":"initialize""#));
        assert!(json.contains(r#""supportsConfigurationDoneRequest":true"#));
    }
}
