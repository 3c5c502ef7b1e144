//! tabasm-lsp - language server for tab assembly sources, over stdio.

use log::info;
use tabasm::lsp::settings::Settings;
use tabasm::lsp::Backend;
use tower_lsp::{LspService, Server};

#[tokio::main]
async fn main() {
    tabasm::log::init();

    let settings = Settings::load();
    info!(target: "lsp", "starting with {settings:?}");

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(|client| Backend::new(client, settings));
    Server::new(stdin, stdout, socket).serve(service).await;
}
