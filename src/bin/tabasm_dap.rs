//! tabasm-dap - line-stepping debug adapter for tab assembly sources.
//!
//! Serves the Debug Adapter Protocol over TCP (one client after another)
//! or over stdin/stdout for a single embedded session.

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use std::net::{SocketAddr, TcpListener};

use tabasm::dap::args::Args;
use tabasm::dap::session::DebugSession;
use tabasm::dap::tracer::FileTracer;
use tabasm::dap::transport::{DapIo, DapTransport};

fn serve<T: DapTransport>(io: T, args: &Args, tracer: Option<&FileTracer>) {
    let session = DebugSession::with_link(io, format!("127.0.0.1:{}", args.link_port));
    match session.run() {
        Ok(()) => {
            if let Some(t) = tracer {
                t.note("session finished OK");
            }
        }
        Err(err) => {
            warn!(target: "dap", "session ended with error: {err:#}");
            if let Some(t) = tracer {
                t.note(&format!("session error: {err:#}"));
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    tabasm::log::init();
    let args = Args::parse();

    let tracer = match &args.log_file {
        Some(path) => Some(FileTracer::open(path)?),
        None => None,
    };
    if args.trace_dap && tracer.is_none() {
        warn!(target: "dap", "--trace-dap requires --log-file; tracing disabled");
    }

    if args.stdio {
        info!(target: "dap", "serving a single session over stdio");
        serve(DapIo::stdio(tracer.clone(), args.trace_dap), &args, tracer.as_ref());
        return Ok(());
    }

    let addr: SocketAddr = args.listen.parse().context("Invalid listen address")?;
    let listener = TcpListener::bind(addr).with_context(|| format!("bind {addr}"))?;
    info!(target: "dap", "tabasm-dap listening on {addr}");

    // One client == one debug session, clients are served one after another.
    loop {
        let (stream, peer) = match listener.accept() {
            Ok(v) => v,
            Err(err) => {
                warn!(target: "dap", "accept failed: {err:#}");
                continue;
            }
        };
        info!(target: "dap", "DAP client connected: {peer}");
        if let Some(t) = &tracer {
            t.note(&format!("client connected: {peer}"));
        }

        match DapIo::tcp(stream, tracer.clone(), args.trace_dap) {
            Ok(io) => serve(io, &args, tracer.as_ref()),
            Err(err) => warn!(target: "dap", "failed to init DAP I/O: {err:#}"),
        }

        if args.oneshot {
            break;
        }
    }
    Ok(())
}
