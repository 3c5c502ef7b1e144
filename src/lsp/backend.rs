use crate::asm::{Assembler, LineAssembler};
use crate::lsp::settings::{Settings, TraceLevel, SECTION};
use crate::lsp::tooling::{self, Document};
use dashmap::DashMap;
use log::{debug, info};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

/// The tab assembly language server backend.
pub struct Backend {
    client: Client,
    assembler: Arc<dyn Assembler>,
    settings: RwLock<Settings>,
    /// Open documents, assembled on every change.
    documents: DashMap<Url, Document>,
}

impl Backend {
    pub fn new(client: Client, settings: Settings) -> Self {
        Self::with_assembler(client, settings, Arc::new(LineAssembler))
    }

    pub fn with_assembler(client: Client, settings: Settings, assembler: Arc<dyn Assembler>) -> Self {
        Self {
            client,
            assembler,
            settings: RwLock::new(settings),
            documents: DashMap::new(),
        }
    }

    /// Log locally and, unless tracing is off, to the client as well.
    async fn trace(&self, message: String) {
        debug!(target: "lsp", "{message}");
        if self.settings.read().await.trace != TraceLevel::Off {
            self.client.log_message(MessageType::LOG, message).await;
        }
    }

    /// Assemble a document and publish diagnostics.
    async fn assemble_and_publish(&self, uri: Url, text: &str, version: Option<i32>) {
        let doc = Document::new(text, self.assembler.as_ref());
        let diagnostics = tooling::diagnostics(&doc, &*self.settings.read().await);
        self.documents.insert(uri.clone(), doc);

        self.trace(format!("{uri}: {} diagnostics", diagnostics.len()))
            .await;
        self.client
            .publish_diagnostics(uri, diagnostics, version)
            .await;
    }

    /// Re-publish diagnostics of every open document.
    async fn republish_all(&self) {
        let settings = self.settings.read().await.clone();
        let batches: Vec<(Url, Vec<Diagnostic>)> = self
            .documents
            .iter()
            .map(|entry| (entry.key().clone(), tooling::diagnostics(entry.value(), &settings)))
            .collect();

        for (uri, diagnostics) in batches {
            self.client.publish_diagnostics(uri, diagnostics, None).await;
        }
    }

    fn document(&self, uri: &Url) -> Option<Document> {
        self.documents.get(uri).map(|doc| doc.clone())
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, _: InitializeParams) -> Result<InitializeResult> {
        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                completion_provider: Some(CompletionOptions {
                    resolve_provider: Some(true),
                    ..Default::default()
                }),
                definition_provider: Some(OneOf::Left(true)),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "tabasm-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        info!(target: "lsp", "language server initialized");
        self.client
            .log_message(MessageType::INFO, "tabasm language server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        self.assemble_and_publish(doc.uri, &doc.text, Some(doc.version))
            .await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;

        // FULL sync, the last change carries the whole text
        if let Some(change) = params.content_changes.into_iter().last() {
            self.assemble_and_publish(uri, &change.text, Some(version))
                .await;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.documents.remove(&uri);
        self.client.publish_diagnostics(uri, vec![], None).await;
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        self.settings.write().await.apply_client(&params.settings);
        let settings = self.settings.read().await.clone();
        self.trace(format!(
            "{SECTION} settings changed: preferUppercase={:?} trace={}",
            settings.prefer_uppercase, settings.trace
        ))
        .await;
        self.republish_all().await;
    }

    async fn completion(&self, _: CompletionParams) -> Result<Option<CompletionResponse>> {
        Ok(Some(CompletionResponse::Array(tooling::completion_items())))
    }

    async fn completion_resolve(&self, item: CompletionItem) -> Result<CompletionItem> {
        Ok(tooling::resolve_completion(item))
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let position = params.text_document_position_params;
        let Some(doc) = self.document(&position.text_document.uri) else {
            return Ok(None);
        };
        Ok(tooling::hover(&doc, position.position))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let position = params.text_document_position_params;
        let uri = &position.text_document.uri;
        let Some(doc) = self.document(uri) else {
            return Ok(None);
        };
        Ok(tooling::definition(uri, &doc, position.position).map(GotoDefinitionResponse::Scalar))
    }
}
