//! Hover, definition, completion and diagnostics as plain functions of a
//! document and its assembly result.

use crate::asm::{self, AssemblyResult, Assembler, Severity, Span, TokenClass};
use crate::dap::source::SourceLines;
use crate::lsp::settings::Settings;
use serde_json::json;
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, Diagnostic, DiagnosticSeverity, Documentation, Hover,
    HoverContents, Location, MarkupContent, MarkupKind, Position, Range, Url,
};

/// `source` of every diagnostic published by the server.
pub const DIAGNOSTIC_SOURCE: &str = "tabasm";

const LDA_DATA: i64 = 1;

/// An open document together with what the assembler made of it.
#[derive(Debug, Clone)]
pub struct Document {
    pub lines: SourceLines,
    pub result: AssemblyResult,
}

impl Document {
    pub fn new(text: &str, assembler: &dyn Assembler) -> Self {
        Self {
            lines: SourceLines::from_text(text),
            result: assembler.assemble(text),
        }
    }

    fn token_at(&self, position: Position) -> Option<&asm::Token> {
        self.result
            .token_at(position.line as usize, position.character as usize)
    }
}

fn range(span: Span) -> Range {
    Range::new(
        Position::new(span.line as u32, span.start as u32),
        Position::new(span.line as u32, span.end as u32),
    )
}

/// Assembler diagnostics plus a warning for every token of a class the
/// settings want in uppercase that is not.
pub fn diagnostics(doc: &Document, settings: &Settings) -> Vec<Diagnostic> {
    let assembler = doc.result.diagnostics.iter().map(|d| Diagnostic {
        range: range(d.span),
        severity: Some(match d.severity {
            Severity::Error => DiagnosticSeverity::ERROR,
            Severity::Warning => DiagnosticSeverity::WARNING,
        }),
        source: Some(DIAGNOSTIC_SOURCE.to_string()),
        message: d.message.clone(),
        ..Default::default()
    });

    let case = doc
        .result
        .tokens
        .iter()
        .filter(|t| settings.prefers_uppercase(t.class) && t.text != t.text.to_uppercase())
        .map(|t| Diagnostic {
            range: range(t.span),
            severity: Some(DiagnosticSeverity::WARNING),
            source: Some(DIAGNOSTIC_SOURCE.to_string()),
            message: format!("{} `{}` should be uppercase", t.class, t.text),
            ..Default::default()
        });

    assembler.chain(case).collect()
}

fn markdown(value: String) -> HoverContents {
    HoverContents::Markup(MarkupContent {
        kind: MarkupKind::Markdown,
        value,
    })
}

pub fn hover(doc: &Document, position: Position) -> Option<Hover> {
    let token = doc.token_at(position)?;
    let value = match token.class {
        TokenClass::Label | TokenClass::Symbol => {
            let def = doc.result.definition_of(&token.text)?;
            let text = doc.lines.trimmed(def.span.line).unwrap_or_default();
            format!(
                "**{}** ({})\n\nDefined on line {}:\n```tabasm\n{text}\n```",
                token.text,
                token.class,
                def.span.line + 1
            )
        }
        TokenClass::Mnemonic | TokenClass::Directive => {
            format!("`{}` ({})", token.text.to_uppercase(), token.class)
        }
        TokenClass::Register | TokenClass::Number => return None,
    };

    Some(Hover {
        contents: markdown(value),
        range: Some(range(token.span)),
    })
}

pub fn definition(uri: &Url, doc: &Document, position: Position) -> Option<Location> {
    let name = doc.token_at(position)?.symbol_name()?;
    let def = doc.result.definition_of(name)?;
    Some(Location::new(uri.clone(), range(def.span)))
}

pub fn completion_items() -> Vec<CompletionItem> {
    vec![CompletionItem {
        label: "LDA".to_string(),
        kind: Some(CompletionItemKind::KEYWORD),
        data: Some(json!(LDA_DATA)),
        ..Default::default()
    }]
}

pub fn resolve_completion(mut item: CompletionItem) -> CompletionItem {
    if item.data.as_ref().and_then(|d| d.as_i64()) == Some(LDA_DATA) {
        item.detail = Some("Load accumulator".to_string());
        item.documentation = Some(Documentation::String(
            "Loads a byte of memory into the accumulator.".to_string(),
        ));
    }
    item
}
