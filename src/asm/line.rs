use crate::asm::{Assembler, AssemblyResult, Diagnostic, Severity, Span, Token, TokenClass};
use std::collections::HashSet;

const COMMENT: char = ';';
const REGISTERS: [&str; 3] = ["a", "x", "y"];

/// Line oriented assembler front end.
///
/// Each line reads `[label:] [mnemonic|.directive] [operand[, operand]...] [; comment]`.
/// It does not encode instructions, it only classifies tokens and checks
/// that every referenced symbol is defined exactly once.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineAssembler;

impl Assembler for LineAssembler {
    fn assemble(&self, text: &str) -> AssemblyResult {
        let mut diagnostics = vec![];
        let mut tokens = vec![];

        for (line_no, line) in text.lines().enumerate() {
            scan_line(line_no, line, &mut tokens, &mut diagnostics);
        }

        let mut defined = HashSet::new();
        for token in tokens.iter().filter(|t| t.class == TokenClass::Label) {
            if !defined.insert(token.text.as_str()) {
                diagnostics.push(Diagnostic {
                    span: token.span,
                    severity: Severity::Error,
                    message: format!("duplicate label `{}`", token.text),
                });
            }
        }

        for token in tokens.iter().filter(|t| t.class == TokenClass::Symbol) {
            if !defined.contains(token.text.as_str()) {
                diagnostics.push(Diagnostic {
                    span: token.span,
                    severity: Severity::Error,
                    message: format!("undefined symbol `{}`", token.text),
                });
            }
        }

        diagnostics.sort_by_key(|d| (d.span.line, d.span.start));
        AssemblyResult::new(diagnostics, tokens)
    }
}

/// Split a line into words separated by whitespace or commas, stopping at a
/// comment. Yields the char column of each word alongside it.
fn words(line: &str) -> Vec<(usize, &str)> {
    let mut out = vec![];
    let mut start: Option<(usize, usize)> = None;
    let mut in_string = false;

    for (column, (byte, c)) in line.char_indices().enumerate() {
        if c == '"' {
            in_string = !in_string;
        }
        let separator = !in_string && (c.is_whitespace() || c == ',' || c == COMMENT);
        match (separator, start) {
            (true, Some((col, from))) => {
                out.push((col, &line[from..byte]));
                start = None;
            }
            (false, None) => start = Some((column, byte)),
            _ => {}
        }
        if !in_string && c == COMMENT {
            return out;
        }
    }
    if let Some((col, from)) = start {
        out.push((col, &line[from..]));
    }
    out
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn token(line: usize, column: usize, text: &str, class: TokenClass) -> Token {
    Token {
        span: Span {
            line,
            start: column,
            end: column + text.chars().count(),
        },
        text: text.to_string(),
        class,
    }
}

fn scan_line(line_no: usize, line: &str, tokens: &mut Vec<Token>, diags: &mut Vec<Diagnostic>) {
    let mut words = words(line).into_iter().peekable();

    if let Some(&(column, word)) = words.peek() {
        if let Some(name) = word.strip_suffix(':') {
            words.next();
            if is_ident(name) {
                tokens.push(token(line_no, column, name, TokenClass::Label));
            } else {
                diags.push(Diagnostic {
                    span: Span {
                        line: line_no,
                        start: column,
                        end: column + word.chars().count(),
                    },
                    severity: Severity::Error,
                    message: if name.is_empty() {
                        "label without a name".to_string()
                    } else {
                        format!("invalid label name `{name}`")
                    },
                });
            }
        }
    }

    if let Some((column, word)) = words.next() {
        let class = if word.starts_with('.') {
            TokenClass::Directive
        } else {
            TokenClass::Mnemonic
        };
        tokens.push(token(line_no, column, word, class));
    }

    for (column, word) in words {
        if word.starts_with('"') {
            continue;
        }
        let prefix = word
            .char_indices()
            .take_while(|(_, c)| matches!(c, '#' | '<' | '>' | '('))
            .count();
        let operand = &word[prefix..];
        let operand = operand
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '%')))
            .map(|end| &operand[..end])
            .unwrap_or(operand);
        if operand.is_empty() {
            continue;
        }

        let column = column + prefix;
        let first = operand.chars().next().unwrap_or_default();
        if first.is_ascii_digit() || first == '$' || first == '%' {
            tokens.push(token(line_no, column, operand, TokenClass::Number));
        } else if REGISTERS.contains(&operand.to_ascii_lowercase().as_str()) {
            tokens.push(token(line_no, column, operand, TokenClass::Register));
        } else if is_ident(operand) {
            tokens.push(token(line_no, column, operand, TokenClass::Symbol));
        }
    }
}
