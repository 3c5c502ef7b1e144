use crate::dap::breakpoint::{BreakpointHit, BreakpointTable};
use crate::dap::cursor::{Cursor, Direction};
use crate::dap::handles::VariableHandles;
use crate::dap::protocol::{
    Command, DapEvent, DapRequest, DapResponse, EvaluateArguments, InitializeArguments,
    LaunchArguments, ScopesArguments, SetBreakpointsArguments, StackTraceArguments,
    VariablesArguments,
};
use crate::dap::source::{source_key, LineBase, SourceLines};
use crate::dap::transport::DapTransport;
use crate::error::Error;
use crate::link::{LinkEvent, TabServer};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::Display;
use std::net::ToSocketAddrs;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use strum_macros::Display;

/// The only thread a program ever has.
pub const THREAD_ID: i64 = 1;

/// A line containing this text raises a simulated exception when run.
const EXCEPTION_MARKER: &str = "exception";
/// Label of the handle behind the compound variable.
const OBJECT_LABEL: &str = "object_";
/// Label of the handle attached to every output line.
const ARGS_LABEL: &str = "args";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum StopReason {
    Entry,
    Step,
    Breakpoint,
    Exception,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Running,
    Stopped(StopReason),
    Terminated,
    Disconnected,
}

/// Which lines a scan stops at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    /// Breakpoints and exceptions (`continue`, `reverseContinue`).
    Events,
    /// Any non-empty line (`next`, `stepBack`).
    Step,
}

enum Halt {
    Breakpoint(BreakpointHit),
    Exception,
    Step,
}

/// First and last (exclusive) frame of a stack trace page.
pub fn frame_window(total: usize, start: Option<usize>, levels: Option<usize>) -> Range<usize> {
    let start = start.unwrap_or(0).min(total);
    let end = match levels {
        Some(levels) if levels > 0 => start.saturating_add(levels).min(total),
        _ => total,
    };
    start..end
}

/// Debug session state for a single client.
pub struct DebugSession<T: DapTransport> {
    io: T,
    server_seq: i64,
    state: SessionState,
    lines: LineBase,
    program: Option<PathBuf>,
    source: SourceLines,
    cursor: Cursor,
    breakpoints: BreakpointTable,
    handles: VariableHandles,
    link: Option<TabServer>,
    link_events: Option<Receiver<LinkEvent>>,
}

impl<T: DapTransport> DebugSession<T> {
    pub fn new(io: T) -> Self {
        Self {
            io,
            server_seq: 1,
            state: SessionState::Uninitialized,
            lines: LineBase::default(),
            program: None,
            source: SourceLines::default(),
            cursor: Cursor::default(),
            breakpoints: BreakpointTable::default(),
            handles: VariableHandles::default(),
            link: None,
            link_events: None,
        }
    }

    /// Create a session together with its tab server. A tab server that
    /// cannot be opened is logged and the session goes on without it.
    pub fn with_link(io: T, addr: impl ToSocketAddrs + Display) -> Self {
        let mut session = Self::new(io);
        match TabServer::bind(&addr) {
            Ok((server, events)) => {
                session.link = Some(server);
                session.link_events = Some(events);
            }
            Err(err) => warn!(target: "link", "tab server on {addr} unavailable: {err:#}"),
        }
        session
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor.line()
    }

    pub fn link(&self) -> Option<&TabServer> {
        self.link.as_ref()
    }

    fn next_seq(&mut self) -> i64 {
        let s = self.server_seq;
        self.server_seq += 1;
        s
    }

    fn send_success(&mut self, req: &DapRequest) -> anyhow::Result<()> {
        self.send_response_raw(req, true, None, None)
    }

    fn send_success_body<B: Serialize>(&mut self, req: &DapRequest, body: B) -> anyhow::Result<()> {
        let body = serde_json::to_value(body)?;
        self.send_response_raw(req, true, None, Some(body))
    }

    fn send_err(&mut self, req: &DapRequest, message: impl ToString) -> anyhow::Result<()> {
        self.send_response_raw(req, false, Some(message.to_string()), None)
    }

    fn send_response_raw(
        &mut self,
        req: &DapRequest,
        success: bool,
        message: Option<String>,
        body: Option<Value>,
    ) -> anyhow::Result<()> {
        let rsp = DapResponse {
            seq: self.next_seq(),
            r#type: "response",
            request_seq: req.seq,
            success,
            command: req.command.clone(),
            message,
            body,
        };
        self.io.write_message(&serde_json::to_value(rsp)?)
    }

    fn send_event(&mut self, name: &'static str) -> anyhow::Result<()> {
        self.send_event_raw(name, None)
    }

    fn send_event_body<B: Serialize>(&mut self, name: &'static str, body: B) -> anyhow::Result<()> {
        let body = serde_json::to_value(body)?;
        self.send_event_raw(name, Some(body))
    }

    fn send_event_raw(&mut self, name: &'static str, body: Option<Value>) -> anyhow::Result<()> {
        let ev = DapEvent {
            seq: self.next_seq(),
            r#type: "event",
            event: name,
            body,
        };
        self.io.write_message(&serde_json::to_value(ev)?)
    }

    /// Surface a log line to the client. The line carries a fresh `args`
    /// handle the client may expand.
    fn log_line(&mut self, text: &str) -> anyhow::Result<()> {
        debug!(target: "dap", "{text}");
        let handle = self.handles.create(ARGS_LABEL);
        self.send_event_body(
            "output",
            json!({
                "category": "console",
                "output": format!("{text}\n"),
                "variablesReference": handle,
            }),
        )
    }

    fn move_cursor(&mut self, line: usize) -> anyhow::Result<()> {
        self.cursor.set(line);
        self.log_line(&format!("line: {line}"))
    }

    fn stop(&mut self, reason: StopReason, hit_breakpoint: Option<i64>) -> anyhow::Result<()> {
        self.state = SessionState::Stopped(reason);
        let mut body = json!({
            "reason": reason.to_string(),
            "threadId": THREAD_ID,
            "allThreadsStopped": true,
        });
        if let Some(id) = hit_breakpoint {
            body["hitBreakpointIds"] = json!([id]);
        }
        self.send_event_body("stopped", body)
    }

    fn terminate(&mut self) -> anyhow::Result<()> {
        self.state = SessionState::Terminated;
        self.send_event("terminated")
    }

    fn require_running(&self) -> Result<(), Error> {
        match self.state {
            SessionState::Running | SessionState::Stopped(_) => Ok(()),
            SessionState::Terminated => Err(Error::Terminated),
            _ => Err(Error::NotLaunched),
        }
    }

    fn probe(&mut self, line: usize, probe: Probe) -> Option<Halt> {
        let text = self.source.get(line)?;
        match probe {
            Probe::Step => (!text.trim().is_empty()).then_some(Halt::Step),
            Probe::Events => {
                let exception = text.contains(EXCEPTION_MARKER);
                let client_line = self.lines.to_client(line);
                let hit = self
                    .program
                    .as_deref()
                    .and_then(|program| self.breakpoints.hit(program, client_line));
                match hit {
                    Some(hit) => Some(Halt::Breakpoint(hit)),
                    None => exception.then_some(Halt::Exception),
                }
            }
        }
    }

    /// Move the cursor line by line in `direction` until `probe` stops it.
    ///
    /// Running off the end terminates the program, running off the start
    /// rewinds to the first line.
    fn resume(&mut self, req: &DapRequest, direction: Direction, probe: Probe) -> anyhow::Result<()> {
        self.state = SessionState::Running;

        let cursor = self.cursor;
        for line in cursor.candidates(direction, self.source.len()) {
            let Some(halt) = self.probe(line, probe) else {
                continue;
            };

            self.move_cursor(line)?;
            self.send_success(req)?;
            return match halt {
                Halt::Breakpoint(hit) => {
                    self.stop(StopReason::Breakpoint, Some(hit.id))?;
                    match hit.verified_now {
                        Some(bp) => self.send_event_body(
                            "breakpoint",
                            json!({"reason": "changed", "breakpoint": bp}),
                        ),
                        None => Ok(()),
                    }
                }
                Halt::Exception => self.stop(StopReason::Exception, None),
                Halt::Step => self.stop(StopReason::Step, None),
            };
        }

        match direction {
            Direction::Forward => {
                self.send_success(req)?;
                self.terminate()
            }
            Direction::Backward => {
                self.move_cursor(0)?;
                self.send_success(req)?;
                self.stop(StopReason::Entry, None)
            }
        }
    }

    fn handle_initialize(&mut self, req: &DapRequest, args: &InitializeArguments) -> anyhow::Result<()> {
        self.lines = LineBase::new(args.lines_start_at1);
        if self.state == SessionState::Uninitialized {
            self.state = SessionState::Initialized;
        }
        if let Some(adapter) = &args.adapter_id {
            info!(target: "dap", "initialize from {adapter}");
        }

        // `initialized` must reach the client before the initialize response.
        self.send_event("initialized")?;
        let body = json!({
            "supportsConfigurationDoneRequest": true,
            "supportsEvaluateForHovers": true,
            "supportsStepBack": true,
            "supportsTerminateRequest": true,
        });
        self.send_success_body(req, body)
    }

    fn handle_launch(&mut self, req: &DapRequest, args: &LaunchArguments) -> anyhow::Result<()> {
        let program = args
            .program
            .as_deref()
            .ok_or(Error::MissingArgument("launch", "program"))?;
        let source = SourceLines::load(program)?;
        info!(target: "dap", "launch {} ({} lines)", program.display(), source.len());

        if args.trace {
            self.io.set_trace(true);
        }
        self.program = Some(source_key(program));
        self.source = source;
        self.cursor.reset();
        self.state = SessionState::Running;

        if args.stop_on_entry {
            self.move_cursor(0)?;
            self.send_success(req)?;
            self.stop(StopReason::Entry, None)
        } else {
            self.resume(req, Direction::Forward, Probe::Events)
        }
    }

    fn handle_set_breakpoints(&mut self, req: &DapRequest, args: &SetBreakpointsArguments) -> anyhow::Result<()> {
        let path = args
            .source
            .path
            .as_deref()
            .ok_or(Error::MissingArgument("setBreakpoints", "source.path"))?;
        let lines = SourceLines::load(path)?;

        let breakpoints =
            self.breakpoints
                .set(source_key(path), &lines, &args.client_lines(), self.lines);
        self.send_success_body(req, json!({"breakpoints": breakpoints}))
    }

    fn handle_threads(&mut self, req: &DapRequest) -> anyhow::Result<()> {
        self.send_success_body(
            req,
            json!({"threads": [{"id": THREAD_ID, "name": format!("thread {THREAD_ID}")}]}),
        )
    }

    /// One frame per whitespace separated word of the current line.
    fn handle_stack_trace(&mut self, req: &DapRequest, args: &StackTraceArguments) -> anyhow::Result<()> {
        let program = self.program.clone().ok_or(Error::NotLaunched)?;
        let line = self.cursor.line().unwrap_or(0);
        let words: Vec<&str> = self
            .source
            .get(line)
            .unwrap_or_default()
            .split_whitespace()
            .collect();
        let total = words.len();

        let source = json!({
            "name": program.file_name().map(|name| name.to_string_lossy()),
            "path": program,
        });
        let client_line = self.lines.to_client(line);
        let frames: Vec<Value> = frame_window(total, args.start_frame, args.levels)
            .map(|i| {
                json!({
                    "id": i,
                    "name": format!("{}({i})", words[i]),
                    "source": source,
                    "line": client_line,
                    "column": 0,
                })
            })
            .collect();

        self.send_success_body(
            req,
            json!({"stackFrames": frames, "totalFrames": total}),
        )
    }

    fn handle_scopes(&mut self, req: &DapRequest, args: &ScopesArguments) -> anyhow::Result<()> {
        let frame_id = args.frame_id;
        let scopes: Vec<Value> = [("Local", false), ("Closure", false), ("Global", true)]
            .into_iter()
            .map(|(name, expensive)| {
                let handle = self
                    .handles
                    .create(format!("{}_{frame_id}", name.to_lowercase()));
                json!({"name": name, "variablesReference": handle, "expensive": expensive})
            })
            .collect();
        self.send_success_body(req, json!({"scopes": scopes}))
    }

    fn handle_variables(&mut self, req: &DapRequest, args: &VariablesArguments) -> anyhow::Result<()> {
        let label = self
            .handles
            .get(args.variables_reference)
            .filter(|label| !label.starts_with(OBJECT_LABEL))
            .map(ToString::to_string);

        let variables = match label {
            Some(label) => {
                let object_ref = self.handles.create(OBJECT_LABEL);
                vec![
                    json!({"name": format!("{label}_i"), "type": "integer", "value": "123", "variablesReference": 0}),
                    json!({"name": format!("{label}_f"), "type": "float", "value": "3.14", "variablesReference": 0}),
                    json!({"name": format!("{label}_s"), "type": "string", "value": "hello world", "variablesReference": 0}),
                    json!({"name": format!("{label}_o"), "type": "object", "value": "Object", "variablesReference": object_ref}),
                ]
            }
            None => vec![],
        };
        self.send_success_body(req, json!({"variables": variables}))
    }

    fn handle_step(&mut self, req: &DapRequest, direction: Direction, probe: Probe) -> anyhow::Result<()> {
        self.require_running()?;
        self.resume(req, direction, probe)
    }

    fn handle_evaluate(&mut self, req: &DapRequest, args: &EvaluateArguments) -> anyhow::Result<()> {
        let result = format!(
            "evaluate(context: '{}', '{}')",
            args.context.as_deref().unwrap_or_default(),
            args.expression
        );
        self.send_success_body(req, json!({"result": result, "variablesReference": 0}))
    }

    fn handle_terminate(&mut self, req: &DapRequest) -> anyhow::Result<()> {
        self.send_success(req)?;
        match self.state {
            SessionState::Running | SessionState::Stopped(_) => self.terminate(),
            _ => Ok(()),
        }
    }

    fn handle_disconnect(&mut self, req: &DapRequest) -> anyhow::Result<()> {
        if let Some(link) = self.link.as_mut() {
            link.close();
        }
        self.state = SessionState::Disconnected;
        self.send_success(req)
    }

    /// Report everything that happened on the tab server since the last call.
    fn drain_link_events(&mut self) -> anyhow::Result<()> {
        let Some(events) = &self.link_events else {
            return Ok(());
        };
        let drained: Vec<LinkEvent> = events.try_iter().collect();
        for event in drained {
            let line = match event {
                LinkEvent::Connected { id, peer } => format!("player {peer} connected ({id})"),
                LinkEvent::Disconnected { id } => format!("player disconnected ({id})"),
                LinkEvent::Message { id, message } => {
                    format!("player message `{}` ({id}): {}", message.kind, message.data)
                }
            };
            self.log_line(&line)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, req: &DapRequest) -> anyhow::Result<bool> {
        match Command::parse(req)? {
            Command::Initialize(args) => self.handle_initialize(req, &args)?,
            Command::Launch(args) => self.handle_launch(req, &args)?,
            Command::SetBreakpoints(args) => self.handle_set_breakpoints(req, &args)?,
            Command::ConfigurationDone => self.send_success(req)?,
            Command::Threads => self.handle_threads(req)?,
            Command::StackTrace(args) => self.handle_stack_trace(req, &args)?,
            Command::Scopes(args) => self.handle_scopes(req, &args)?,
            Command::Variables(args) => self.handle_variables(req, &args)?,
            Command::Continue => self.handle_step(req, Direction::Forward, Probe::Events)?,
            Command::ReverseContinue => self.handle_step(req, Direction::Backward, Probe::Events)?,
            Command::Next => self.handle_step(req, Direction::Forward, Probe::Step)?,
            Command::StepBack => self.handle_step(req, Direction::Backward, Probe::Step)?,
            Command::Evaluate(args) => self.handle_evaluate(req, &args)?,
            Command::Terminate => self.handle_terminate(req)?,
            Command::Disconnect => {
                self.handle_disconnect(req)?;
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Process one request. A failing request is answered with an error
    /// response, the session itself goes on.
    fn handle(&mut self, req: &DapRequest) -> anyhow::Result<bool> {
        match self.dispatch(req) {
            Ok(cont) => Ok(cont),
            Err(e) => {
                warn!(target: "dap", "{} failed: {e:#}", req.command);
                self.send_err(req, format!("{e:#}"))?;
                Ok(true)
            }
        }
    }

    /// Read and process the next inbound message. Return `false` once the
    /// client disconnected.
    fn serve_next(&mut self) -> anyhow::Result<bool> {
        self.drain_link_events()?;
        let msg = self.io.read_message()?;
        if msg.get("type").and_then(Value::as_str) != Some("request") {
            return Ok(true);
        }
        let req: DapRequest = match serde_json::from_value(msg) {
            Ok(req) => req,
            Err(err) => {
                warn!(target: "dap", "skip malformed request: {err}");
                return Ok(true);
            }
        };
        let cont = self.handle(&req)?;
        // Player traffic that came in while the request was read or handled.
        self.drain_link_events()?;
        Ok(cont)
    }

    pub fn run(mut self) -> anyhow::Result<()> {
        while self.serve_next()? {}
        Ok(())
    }
}
