use crate::error::Error;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// DAP request envelope.
#[derive(Debug, Deserialize)]
pub struct DapRequest {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: String,
    pub command: String,
    #[serde(default)]
    pub arguments: Value,
}

/// DAP response envelope, `body` is left out when there is none.
#[derive(Debug, Serialize)]
pub struct DapResponse {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// DAP event envelope.
#[derive(Debug, Serialize)]
pub struct DapEvent {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitializeArguments {
    #[serde(rename = "adapterID")]
    pub adapter_id: Option<String>,
    pub lines_start_at1: bool,
}

impl Default for InitializeArguments {
    fn default() -> Self {
        Self {
            adapter_id: None,
            lines_start_at1: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LaunchArguments {
    pub program: Option<PathBuf>,
    pub stop_on_entry: bool,
    pub trace: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceArgument {
    pub name: Option<String>,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceBreakpoint {
    pub line: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SetBreakpointsArguments {
    pub source: SourceArgument,
    pub breakpoints: Option<Vec<SourceBreakpoint>>,
    /// Deprecated form, used when `breakpoints` is absent.
    pub lines: Option<Vec<i64>>,
}

impl SetBreakpointsArguments {
    /// Requested client lines, in request order.
    pub fn client_lines(&self) -> Vec<i64> {
        match (&self.breakpoints, &self.lines) {
            (Some(bps), _) => bps.iter().map(|bp| bp.line).collect(),
            (None, Some(lines)) => lines.clone(),
            (None, None) => vec![],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StackTraceArguments {
    pub thread_id: i64,
    pub start_frame: Option<usize>,
    pub levels: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScopesArguments {
    pub frame_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariablesArguments {
    pub variables_reference: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvaluateArguments {
    pub expression: String,
    pub frame_id: Option<i64>,
    pub context: Option<String>,
}

/// Every request kind the adapter understands.
#[derive(Debug, Clone)]
pub enum Command {
    Initialize(InitializeArguments),
    Launch(LaunchArguments),
    SetBreakpoints(SetBreakpointsArguments),
    ConfigurationDone,
    Threads,
    StackTrace(StackTraceArguments),
    Scopes(ScopesArguments),
    Variables(VariablesArguments),
    Continue,
    ReverseContinue,
    Next,
    StepBack,
    Evaluate(EvaluateArguments),
    Terminate,
    Disconnect,
}

fn arguments<T: DeserializeOwned + Default>(value: &Value) -> Result<T, Error> {
    if value.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(value.clone())?)
}

impl Command {
    pub fn parse(req: &DapRequest) -> Result<Self, Error> {
        let args = &req.arguments;
        let cmd = match req.command.as_str() {
            "initialize" => Command::Initialize(arguments(args)?),
            "launch" => Command::Launch(arguments(args)?),
            "setBreakpoints" => Command::SetBreakpoints(arguments(args)?),
            "configurationDone" => Command::ConfigurationDone,
            "threads" => Command::Threads,
            "stackTrace" => Command::StackTrace(arguments(args)?),
            "scopes" => Command::Scopes(arguments(args)?),
            "variables" => Command::Variables(arguments(args)?),
            "continue" => Command::Continue,
            "reverseContinue" => Command::ReverseContinue,
            "next" => Command::Next,
            "stepBack" => Command::StepBack,
            "evaluate" => Command::Evaluate(arguments(args)?),
            "terminate" => Command::Terminate,
            "disconnect" => Command::Disconnect,
            other => return Err(Error::UnknownCommand(other.to_string())),
        };
        Ok(cmd)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn request(command: &str, arguments: Value) -> DapRequest {
        serde_json::from_value(json!({
            "seq": 1,
            "type": "request",
            "command": command,
            "arguments": arguments,
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_launch() {
        let req = request(
            "launch",
            json!({"program": "/tmp/prog.tab", "stopOnEntry": true}),
        );
        let Command::Launch(args) = Command::parse(&req).unwrap() else {
            panic!("launch expected");
        };
        assert_eq!(args.program, Some(PathBuf::from("/tmp/prog.tab")));
        assert!(args.stop_on_entry);
        assert!(!args.trace);
    }

    #[test]
    fn test_parse_missing_arguments() {
        let req: DapRequest =
            serde_json::from_value(json!({"seq": 3, "type": "request", "command": "initialize"}))
                .unwrap();
        let Command::Initialize(args) = Command::parse(&req).unwrap() else {
            panic!("initialize expected");
        };
        assert!(args.lines_start_at1);
    }

    #[test]
    fn test_breakpoint_lines_forms() {
        let req = request(
            "setBreakpoints",
            json!({"source": {"path": "a.tab"}, "breakpoints": [{"line": 3}, {"line": 1}]}),
        );
        let Command::SetBreakpoints(args) = Command::parse(&req).unwrap() else {
            panic!("setBreakpoints expected");
        };
        assert_eq!(args.client_lines(), vec![3, 1]);

        let req = request(
            "setBreakpoints",
            json!({"source": {"path": "a.tab"}, "lines": [7]}),
        );
        let Command::SetBreakpoints(args) = Command::parse(&req).unwrap() else {
            panic!("setBreakpoints expected");
        };
        assert_eq!(args.client_lines(), vec![7]);
    }

    #[test]
    fn test_unknown_command() {
        let req = request("pause", json!({}));
        let err = Command::parse(&req).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported DAP command: pause");
    }
}
