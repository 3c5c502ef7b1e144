//! DAP transport abstraction layer.
//! Supports both stdio (for embedded mode) and TCP (for server mode).

use crate::dap::tracer::{FileTracer, Flow};
use anyhow::anyhow;
use serde_json::Value;
use std::io::{BufRead, BufReader, Stdin, Stdout, Write};
use std::net::TcpStream;

/// Trait for DAP message transport (stdio or TCP).
pub trait DapTransport {
    /// Read a single DAP message (with Content-Length framing).
    fn read_message(&mut self) -> anyhow::Result<Value>;

    /// Write a single DAP message (with Content-Length framing).
    fn write_message(&mut self, message: &Value) -> anyhow::Result<()>;

    /// Switch raw traffic tracing on or off.
    fn set_trace(&mut self, _trace: bool) {}
}

/// Content-Length framing over any reader/writer pair.
pub struct DapIo<R, W> {
    reader: R,
    writer: W,
    tracer: Option<FileTracer>,
    trace: bool,
}

impl DapIo<BufReader<TcpStream>, TcpStream> {
    pub fn tcp(stream: TcpStream, tracer: Option<FileTracer>, trace: bool) -> anyhow::Result<Self> {
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self::new(reader, stream, tracer, trace))
    }
}

impl DapIo<BufReader<Stdin>, Stdout> {
    pub fn stdio(tracer: Option<FileTracer>, trace: bool) -> Self {
        Self::new(
            BufReader::new(std::io::stdin()),
            std::io::stdout(),
            tracer,
            trace,
        )
    }
}

impl<R: BufRead, W: Write> DapIo<R, W> {
    pub fn new(reader: R, writer: W, tracer: Option<FileTracer>, trace: bool) -> Self {
        Self {
            reader,
            writer,
            tracer,
            trace,
        }
    }

    fn trace(&self, flow: Flow, msg: &Value) {
        if !self.trace {
            return;
        }
        match &self.tracer {
            Some(tracer) => tracer.message(flow, msg),
            None => log::trace!(target: "dap", "{flow} {msg}"),
        }
    }
}

impl<R: BufRead, W: Write> DapTransport for DapIo<R, W> {
    fn read_message(&mut self) -> anyhow::Result<Value> {
        let mut content_length: Option<usize> = None;
        loop {
            let mut line = String::new();
            let read_n = self.reader.read_line(&mut line)?;
            if read_n == 0 {
                return Err(anyhow!("DAP connection closed"));
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                break;
            }
            if let Some(v) = line.strip_prefix("Content-Length:") {
                content_length = Some(v.trim().parse()?);
            }
        }

        let len = content_length.ok_or_else(|| anyhow!("Missing Content-Length header"))?;
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf)?;
        let msg: Value = serde_json::from_slice(&buf)?;
        self.trace(Flow::Inbound, &msg);
        Ok(msg)
    }

    fn write_message(&mut self, message: &Value) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(message)?;
        self.trace(Flow::Outbound, message);
        write!(self.writer, "Content-Length: {}\r\n\r\n", payload.len())?;
        self.writer.write_all(&payload)?;
        self.writer.flush()?;
        Ok(())
    }

    fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }
}
