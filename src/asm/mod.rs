//! Assembler interface consumed by the editor tooling.
//!
//! The tooling only ever sees an [`AssemblyResult`]: diagnostics plus the
//! classified tokens and symbol definitions of a source text. How that
//! result is produced is up to the [`Assembler`] implementation,
//! [`LineAssembler`] is the one shipped with this crate.

mod line;

pub use line::LineAssembler;

use std::collections::HashMap;
use strum_macros::{Display, EnumString, IntoStaticStr};

/// Turns source text into an [`AssemblyResult`].
pub trait Assembler: Send + Sync {
    fn assemble(&self, text: &str) -> AssemblyResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Position of a token or a diagnostic, all values are zero-based and
/// `end` is exclusive. Columns count chars, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub line: usize,
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn contains(&self, line: usize, column: usize) -> bool {
        self.line == line && self.start <= column && column <= self.end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub span: Span,
    pub severity: Severity,
    pub message: String,
}

/// Token classes, their string form is what the `preferUppercase`
/// preference refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum TokenClass {
    Label,
    Mnemonic,
    Directive,
    Register,
    Symbol,
    Number,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub span: Span,
    pub text: String,
    pub class: TokenClass,
}

impl Token {
    /// Symbol name this token defines or refers to.
    pub fn symbol_name(&self) -> Option<&str> {
        match self.class {
            TokenClass::Label | TokenClass::Symbol => Some(&self.text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssemblyResult {
    pub diagnostics: Vec<Diagnostic>,
    pub tokens: Vec<Token>,
    /// Label name -> index of the defining token in `tokens`.
    definitions: HashMap<String, usize>,
}

impl AssemblyResult {
    pub fn new(diagnostics: Vec<Diagnostic>, tokens: Vec<Token>) -> Self {
        let mut definitions = HashMap::new();
        for (idx, token) in tokens.iter().enumerate() {
            if token.class == TokenClass::Label {
                definitions.entry(token.text.clone()).or_insert(idx);
            }
        }
        Self {
            diagnostics,
            tokens,
            definitions,
        }
    }

    /// Return the label token that defines `name` (first definition wins).
    pub fn definition_of(&self, name: &str) -> Option<&Token> {
        self.definitions.get(name).map(|&idx| &self.tokens[idx])
    }

    /// Return the token under a zero-based `line`/`column` position.
    pub fn token_at(&self, line: usize, column: usize) -> Option<&Token> {
        self.tokens
            .iter()
            .find(|token| token.span.contains(line, column))
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }
}
