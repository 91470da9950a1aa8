use serde::Serialize;

/// Blank runs and full-line comments, re-attached to the next statement so
/// backends can round-trip them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trivia {
    Blank { count: usize },
    Comment { text: String },
}

/// One statement's worth of source text. Physical lines joined by bracket
/// continuation, triple-quoted strings, or a trailing backslash are merged
/// with their newlines kept, so token spans still land on the right physical
/// line.
#[derive(Debug, Clone)]
pub struct LogicalLine {
    pub start_line: usize,
    pub indent: usize,
    pub text: String,
    pub trivia: Vec<Trivia>,
}

#[derive(Default)]
struct ScanState {
    depth: usize,
    quote: Option<QuoteState>,
    continuation: bool,
}

struct QuoteState {
    ch: char,
    triple: bool,
    raw: bool,
}

impl ScanState {
    fn merging(&self) -> bool {
        self.depth > 0 || self.quote.as_ref().is_some_and(|q| q.triple) || self.continuation
    }
}

/// Split source into logical lines plus any trivia left after the last
/// statement.
pub fn merge(source: &str) -> (Vec<LogicalLine>, Vec<Trivia>) {
    let mut out: Vec<LogicalLine> = Vec::new();
    let mut pending_trivia: Vec<Trivia> = Vec::new();
    let mut state = ScanState::default();
    let mut current: Option<LogicalLine> = None;

    for (idx, raw_line) in source.lines().enumerate() {
        let lineno = idx + 1;

        if current.is_none() {
            let stripped = raw_line.trim();
            if stripped.is_empty() {
                push_blank(&mut pending_trivia);
                continue;
            }
            if stripped.starts_with('#') {
                pending_trivia.push(Trivia::Comment {
                    text: stripped.to_string(),
                });
                continue;
            }
            let indent = raw_line.len() - raw_line.trim_start().len();
            current = Some(LogicalLine {
                start_line: lineno,
                indent,
                text: String::new(),
                trivia: std::mem::take(&mut pending_trivia),
            });
        }

        let line = current.as_mut().unwrap();
        if !line.text.is_empty() {
            line.text.push('\n');
        }
        state.continuation = false;
        let cleaned = scan_line(raw_line, &mut state);
        line.text.push_str(&cleaned);

        if !state.merging() {
            // A single-line quote left open is a lexer error, not a merge
            // continuation.
            state.quote = None;
            let mut done = current.take().unwrap();
            done.text = done.text.trim_end().to_string();
            out.push(done);
        }
    }

    if let Some(mut done) = current.take() {
        done.text = done.text.trim_end().to_string();
        out.push(done);
    }

    (out, pending_trivia)
}

fn push_blank(trivia: &mut Vec<Trivia>) {
    if let Some(Trivia::Blank { count }) = trivia.last_mut() {
        *count += 1;
    } else {
        trivia.push(Trivia::Blank { count: 1 });
    }
}

/// Scan one physical line, updating bracket/quote state. Strips inline
/// comments outside strings and the final backslash of a continuation.
fn scan_line(raw: &str, state: &mut ScanState) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];

        if let Some(quote) = &state.quote {
            if ch == '\\' && !quote.raw {
                out.push(ch);
                if i + 1 < chars.len() {
                    out.push(chars[i + 1]);
                    i += 2;
                } else {
                    i += 1;
                }
                continue;
            }
            if ch == quote.ch {
                if quote.triple {
                    if chars.get(i + 1) == Some(&quote.ch) && chars.get(i + 2) == Some(&quote.ch) {
                        out.push(ch);
                        out.push(ch);
                        out.push(ch);
                        i += 3;
                        state.quote = None;
                        continue;
                    }
                } else {
                    out.push(ch);
                    i += 1;
                    state.quote = None;
                    continue;
                }
            }
            out.push(ch);
            i += 1;
            continue;
        }

        match ch {
            '#' => break,
            '(' | '[' | '{' => {
                state.depth += 1;
                out.push(ch);
                i += 1;
            }
            ')' | ']' | '}' => {
                state.depth = state.depth.saturating_sub(1);
                out.push(ch);
                i += 1;
            }
            '"' | '\'' => {
                let raw_prefix = has_raw_prefix(&out);
                let triple = chars.get(i + 1) == Some(&ch) && chars.get(i + 2) == Some(&ch);
                state.quote = Some(QuoteState {
                    ch,
                    triple,
                    raw: raw_prefix,
                });
                out.push(ch);
                i += 1;
                if triple {
                    out.push(ch);
                    out.push(ch);
                    i += 2;
                }
            }
            _ => {
                out.push(ch);
                i += 1;
            }
        }
    }

    if state.quote.is_none() {
        let trailing = out.chars().rev().take_while(|&c| c == '\\').count();
        if trailing % 2 == 1 {
            out.pop();
            state.continuation = true;
        }
    }

    out
}

/// True when the text ends with a short identifier run containing `r`/`R`
/// (a raw-string prefix directly before the quote).
fn has_raw_prefix(before: &str) -> bool {
    let run: String = before
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if run.is_empty() || run.len() > 3 {
        return false;
    }
    run.chars().all(|c| matches!(c, 'r' | 'R' | 'b' | 'B' | 'u' | 'U' | 'f' | 'F'))
        && run.chars().any(|c| c == 'r' || c == 'R')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_stay_separate() {
        let (lines, _) = merge("a = 1\nb = 2\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "a = 1");
        assert_eq!(lines[1].start_line, 2);
    }

    #[test]
    fn bracket_continuation_merges() {
        let (lines, _) = merge("x = [1,\n     2,\n     3]\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].start_line, 1);
        assert!(lines[0].text.contains('\n'));
        assert!(lines[0].text.ends_with("3]"));
    }

    #[test]
    fn backslash_continuation_merges() {
        let (lines, _) = merge("total = 1 + \\\n    2\n");
        assert_eq!(lines.len(), 1);
        assert!(!lines[0].text.contains('\\'));
        assert!(lines[0].text.ends_with('2'));
    }

    #[test]
    fn triple_string_merges_and_keeps_newlines() {
        let (lines, _) = merge("s = \"\"\"a\nb\"\"\"\nc = 1\n");
        assert_eq!(lines.len(), 2);
        assert!(lines[0].text.contains("a\nb"));
    }

    #[test]
    fn inline_comment_is_stripped() {
        let (lines, _) = merge("x = 1  # note\n");
        assert_eq!(lines[0].text, "x = 1");
    }

    #[test]
    fn hash_inside_string_is_kept() {
        let (lines, _) = merge("x = \"a # b\"\n");
        assert_eq!(lines[0].text, "x = \"a # b\"");
    }

    #[test]
    fn trivia_attaches_to_next_statement() {
        let (lines, rest) = merge("# header\n\n\nx = 1\n# trailing\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines[0].trivia,
            vec![
                Trivia::Comment {
                    text: "# header".to_string()
                },
                Trivia::Blank { count: 2 },
            ]
        );
        assert_eq!(
            rest,
            vec![Trivia::Comment {
                text: "# trailing".to_string()
            }]
        );
    }

    #[test]
    fn indent_is_measured_on_first_line() {
        let (lines, _) = merge("if x:\n    y = 1\n");
        assert_eq!(lines[0].indent, 0);
        assert_eq!(lines[1].indent, 4);
    }
}
