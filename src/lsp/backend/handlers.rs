use tower_lsp::LanguageServer;
use tower_lsp::jsonrpc;
use tower_lsp::lsp_types::{
    CompletionOptions, CompletionOptionsCompletionItem, CompletionParams, CompletionResponse,
    DidChangeTextDocumentParams, DidChangeWorkspaceFoldersParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, GotoDefinitionParams, GotoDefinitionResponse, Hover, HoverParams,
    HoverProviderCapability, InitializeParams, InitializeResult, InitializedParams, Location,
    MessageType, OneOf, PrepareRenameResponse, ReferenceParams, RenameOptions, RenameParams,
    SemanticTokens, SemanticTokensFullOptions, SemanticTokensOptions, SemanticTokensParams,
    SemanticTokensResult, SemanticTokensServerCapabilities, ServerCapabilities, ServerInfo,
    TextDocumentPositionParams, TextDocumentSyncCapability, TextDocumentSyncKind, WorkDoneProgressOptions,
    WorkspaceEdit, WorkspaceFoldersServerCapabilities, WorkspaceServerCapabilities,
};

use tracing::{debug, info, trace, warn};

use super::state::AnchorBackend;
use crate::config::AnchorSettings;
use crate::lsp::document::{DocumentProvider, line_prefix};
use crate::lsp::features::{completion, definition, hover, references, rename, semantic_tokens};

#[tower_lsp::async_trait]
impl LanguageServer for AnchorBackend {
    /// Handles the LSP initialize request: applies settings from the
    /// initialization options and runs the first bulk scan.
    async fn initialize(&self, params: InitializeParams) -> jsonrpc::Result<InitializeResult> {
        info!("Received initialize from {:?}", params.client_info.as_ref().map(|c| &c.name));

        if let Some(client_pid) = params.process_id {
            {
                let mut locked_pid = self.client_process_id.lock().await;
                if let Some(cmdline_pid) = *locked_pid {
                    if cmdline_pid != client_pid {
                        warn!("Client PID mismatch: command line ({}) vs LSP ({})", cmdline_pid, client_pid);
                    }
                }
                *locked_pid = Some(client_pid);
            } // Drop the lock here before next await

            if let Err(e) = self.pid_channel.send(client_pid).await {
                warn!("Failed to send client PID to the monitor: {}", e);
            }
        }

        let settings = match AnchorSettings::from_json(params.initialization_options.clone()) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Rejected initialization options: {}", e);
                *self.startup_error.lock().await = Some(e.to_string());
                self.engine.settings()
            }
        };
        let trigger_characters = settings.completion_trigger_characters.clone();
        let folders = Self::workspace_folders(&params);
        info!("Workspace folders: {:?}", folders.iter().map(|f| f.as_str()).collect::<Vec<_>>());

        if let Err(e) = self.engine.init(settings, folders).await {
            let mut startup_error = self.startup_error.lock().await;
            if startup_error.is_none() {
                *startup_error = Some(e.to_string());
            }
        }
        self.sync_debounce_latency();

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::INCREMENTAL)),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                references_provider: Some(OneOf::Left(true)),
                rename_provider: Some(OneOf::Right(RenameOptions {
                    prepare_provider: Some(true),
                    work_done_progress_options: WorkDoneProgressOptions::default(),
                })),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(trigger_characters),
                    all_commit_characters: None,
                    resolve_provider: Some(false),
                    completion_item: Some(CompletionOptionsCompletionItem {
                        label_details_support: Some(true),
                    }),
                    work_done_progress_options: Default::default(),
                }),
                semantic_tokens_provider: Some(SemanticTokensServerCapabilities::SemanticTokensOptions(
                    SemanticTokensOptions {
                        legend: semantic_tokens::legend(),
                        full: Some(SemanticTokensFullOptions::Bool(true)),
                        range: None,
                        ..Default::default()
                    },
                )),
                workspace: Some(WorkspaceServerCapabilities {
                    workspace_folders: Some(WorkspaceFoldersServerCapabilities {
                        supported: Some(true),
                        change_notifications: Some(OneOf::Left(true)),
                    }),
                    file_operations: None,
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    /// Handles the LSP initialized notification: reports a rejected
    /// configuration and pushes the initial state.
    async fn initialized(&self, _: InitializedParams) {
        if let Some(message) = self.startup_error.lock().await.take() {
            self.client
                .show_message(MessageType::ERROR, format!("Anchor settings rejected: {}", message))
                .await;
        }
        self.update_client().await;
        info!("Initialized with {} search", self.engine.search_backend());
    }

    /// Handles the LSP shutdown request.
    async fn shutdown(&self) -> jsonrpc::Result<()> {
        info!("Received shutdown request");
        let _ = self.shutdown_tx.send(());
        self.engine.teardown().await;
        Ok(())
    }

    /// Handles opening a text document. The buffer is tracked and queued for
    /// a re-scan so that unsaved content (or files the bulk scan could not
    /// reach) are indexed.
    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        debug!("Opening document: URI={}, version={}", doc.uri, doc.version);
        self.documents.open(doc.uri.clone(), &doc.text, doc.version);
        self.queue_document_change(doc.uri, doc.version, doc.text).await;
    }

    /// Handles incremental changes to an open document.
    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;
        trace!("Change to {} (version {}): {} edit(s)", uri, version, params.content_changes.len());
        if let Some(text) = self.documents.change(&uri, &params.content_changes, version) {
            self.queue_document_change(uri, version, text).await;
        }
    }

    /// Handles closing a document. Its anchors stay indexed: the file still
    /// exists on disk.
    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        debug!("Closing document: {}", params.text_document.uri);
        self.documents.close(&params.text_document.uri);
    }

    /// Handles workspace folder changes with a full rebuild.
    async fn did_change_workspace_folders(&self, params: DidChangeWorkspaceFoldersParams) {
        let mut folders = self.engine.folders();
        folders.retain(|f| !params.event.removed.iter().any(|r| &r.uri == f));
        folders.extend(params.event.added.into_iter().map(|a| a.uri));
        info!("Workspace folders changed, now {}", folders.len());
        self.engine.set_folders(folders);
        self.engine.refresh_with(&*self.documents).await;
        self.update_client().await;
    }

    async fn hover(&self, params: HoverParams) -> jsonrpc::Result<Option<Hover>> {
        let TextDocumentPositionParams { text_document, position } = params.text_document_position_params;
        let folders = self.engine.folders();
        let index = self.engine.index().await;
        Ok(hover::hover(&index, &text_document.uri, position, &folders))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> jsonrpc::Result<Option<GotoDefinitionResponse>> {
        let TextDocumentPositionParams { text_document, position } = params.text_document_position_params;
        let index = self.engine.index().await;
        Ok(definition::goto_definition(&index, &text_document.uri, position)
            .map(GotoDefinitionResponse::Scalar))
    }

    async fn references(&self, params: ReferenceParams) -> jsonrpc::Result<Option<Vec<Location>>> {
        let TextDocumentPositionParams { text_document, position } = params.text_document_position;
        let index = self.engine.index().await;
        Ok(references::find_references(&index, &text_document.uri, position))
    }

    /// Handles completion: reads the live line up to the cursor and offers
    /// every definition name matching what was typed after the prefix.
    async fn completion(&self, params: CompletionParams) -> jsonrpc::Result<Option<CompletionResponse>> {
        let TextDocumentPositionParams { text_document, position } = params.text_document_position;
        let Some(patterns) = self.engine.patterns() else {
            return Ok(None);
        };
        let Some(line) = self.documents.line(&text_document.uri, position.line).await else {
            return Ok(None);
        };
        let prefix = line_prefix(&line, position.character);
        let folders = self.engine.folders();
        let index = self.engine.index().await;
        let items = completion::completion_items(&index, prefix, &patterns.completion_prefix, &folders);
        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn semantic_tokens_full(
        &self,
        params: SemanticTokensParams,
    ) -> jsonrpc::Result<Option<SemanticTokensResult>> {
        let index = self.engine.index().await;
        let data = semantic_tokens::semantic_tokens(&index, &params.text_document.uri);
        Ok(Some(SemanticTokensResult::Tokens(SemanticTokens {
            result_id: None,
            data,
        })))
    }

    async fn prepare_rename(
        &self,
        params: TextDocumentPositionParams,
    ) -> jsonrpc::Result<Option<PrepareRenameResponse>> {
        let Some(patterns) = self.engine.patterns() else {
            return Ok(None);
        };
        let position = params.position;
        let Some(line) = self.documents.line(&params.text_document.uri, position.line).await else {
            return Ok(None);
        };
        Ok(rename::prepare_rename(&line, position.line, &patterns, position))
    }

    async fn rename(&self, params: RenameParams) -> jsonrpc::Result<Option<WorkspaceEdit>> {
        let TextDocumentPositionParams { text_document, position } = params.text_document_position;
        if !rename::is_valid_name(&params.new_name) {
            return Err(jsonrpc::Error::invalid_params(format!(
                "Invalid anchor name: {:?}",
                params.new_name
            )));
        }

        let edit = self
            .engine
            .rename(&text_document.uri, position, &params.new_name, &*self.documents)
            .await;
        if edit.is_none() {
            debug!("Nothing to rename at {:?} in {}", position, text_document.uri);
        } else {
            self.update_client().await;
        }
        Ok(edit)
    }
}
