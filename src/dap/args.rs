use crate::link::TAB_SERVER_PORT;
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to listen on (default: 127.0.0.1:4711)
    #[clap(long, default_value = "127.0.0.1:4711")]
    pub listen: String,

    /// Serve a single debug session over stdin/stdout instead of TCP.
    #[clap(long)]
    pub stdio: bool,

    /// Exit after the first debug session ends (single-client mode).
    #[clap(long)]
    pub oneshot: bool,

    /// Optional log file for adapter diagnostics (no output to stdout).
    #[clap(long)]
    pub log_file: Option<std::path::PathBuf>,

    /// Trace DAP traffic (requests/responses/events) into the log file.
    /// Requires --log-file.
    #[clap(long)]
    pub trace_dap: bool,

    /// Port of the tab server the player connects to (0 picks a free port).
    #[clap(long, env = "TABASM_LINK_PORT", default_value_t = TAB_SERVER_PORT)]
    pub link_port: u16,
}
