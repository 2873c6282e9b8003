//! Debug pretty-printer.
//!
//! Walks the raw token stream and renders one line per atom: brackets
//! on their own lines with indentation, length tags inline (wide forms
//! annotated as `M(200)`), string payloads quoted unless they sit in a
//! multi-dimensional array, and binary payloads as truncated hex.

use std::io::Read;
use std::io::Seek;

use tagpack::Result;
use tagpack::Scanner;
use tagpack::Tag;
use tagpack::Term;
use tagpack::Token;

/// Rendering limits for `debug_dump`.
#[derive(Debug, Clone, Copy)]
pub struct DumpOptions {
    /// Spaces per nesting level.
    pub indent: usize,
    /// Indentation stops growing past this depth.
    pub max_depth: usize,
    /// At most this many payload bytes are shown per element.
    pub max_bytes: usize,
}

impl Default for DumpOptions {
    fn default() -> Self {
        DumpOptions { indent: 2, max_depth: 10, max_bytes: 15 }
    }
}

pub(crate) fn dump<R: Read + Seek>(scan: &mut Scanner<R>, opts: DumpOptions) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    let mut level = 0usize;
    // Symbols with no payload of their own accumulate until a payload
    // tag or bracket flushes them onto a line.
    let mut run = String::new();
    let mut lengths = 0usize;

    let pad = |level: usize| " ".repeat(level.min(opts.max_depth) * opts.indent);

    while let Some(token) = scan.next_token()? {
        match token {
            Token::Term(term) => {
                let symbol = term.as_byte() as char;
                match term {
                    Term::ListOpen | Term::MapOpen => {
                        if !run.is_empty() {
                            lines.push(format!("{}{}", pad(level), run));
                            run.clear();
                        }
                        lines.push(format!("{}{}", pad(level), symbol));
                        level += 1;
                    }
                    Term::ListClose | Term::MapClose => {
                        if !run.is_empty() {
                            lines.push(format!("{}{}", pad(level), run));
                            run.clear();
                        }
                        level = level.saturating_sub(1);
                        lines.push(format!("{}{}", pad(level), symbol));
                    }
                    Term::True | Term::False | Term::Null | Term::Footnote => {
                        run.push(symbol);
                    }
                }
            }
            Token::Length { tag, value } => {
                if tag.is_ascii_digit() {
                    run.push(tag as char);
                } else {
                    run.push_str(&format!("{}({})", tag as char, value));
                }
                lengths += 1;
            }
            Token::Type { tag, payload } => {
                run.push(tag as u8 as char);
                let shown = if payload > 0 {
                    scan.read_payload_limit(opts.max_bytes)?
                } else {
                    Vec::new()
                };
                let body = if tag == Tag::Utf8 && lengths <= 1 {
                    format!("\"{}\"", String::from_utf8_lossy(&shown))
                } else {
                    let mut hex = shown
                        .iter()
                        .map(|b| format!("{:02x}", b))
                        .collect::<Vec<_>>()
                        .join(" ");
                    if (shown.len() as u64) < payload {
                        hex.push_str(&format!(" ... ({} bytes total)", payload));
                    }
                    hex
                };
                lines.push(format!("{}{}: {}", pad(level), run, body));
                run.clear();
                lengths = 0;
            }
        }
    }
    if !run.is_empty() {
        lines.push(format!("{}{}", pad(level), run));
    }
    Ok(lines)
}
