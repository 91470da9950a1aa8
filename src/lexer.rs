use crate::errors::{BuildError, Result};
use crate::token::{Span, Token, TokenKind};

/// Byte-level scanner for one logical line of source.
///
/// Comments and line continuations are already gone by the time text reaches
/// here (see `lines::merge`); newlines only survive inside triple-quoted
/// strings.
pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, start_line: usize) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: start_line,
            col: 1,
        }
    }

    /// Scan the whole line into a token list terminated by `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_ahead(&self, n: usize) -> Option<u8> {
        self.bytes.get(self.pos + n).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == b' ' || ch == b'\t' || ch == b'\r' || ch == b'\n' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn here(&self) -> (usize, usize) {
        (self.line, self.col)
    }

    fn span_from(&self, start: (usize, usize)) -> Span {
        Span::new(start.0, start.1, self.line, self.col)
    }

    fn scan_identifier(&mut self, start_pos: usize) -> Token {
        let start = self.here();
        self.advance();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == b'_' {
                self.advance();
            } else {
                break;
            }
        }
        let literal = &self.source[start_pos..self.pos];
        let kind = TokenKind::from_keyword(literal).unwrap_or(TokenKind::Ident);
        Token::new(
            kind,
            self.span_from(start),
            literal.to_string(),
            start_pos,
            self.pos,
        )
    }

    fn scan_number(&mut self, start_pos: usize) -> Token {
        let start = self.here();
        let mut is_float = false;

        if self.peek() == Some(b'0')
            && matches!(
                self.peek_ahead(1),
                Some(b'x') | Some(b'X') | Some(b'o') | Some(b'O') | Some(b'b') | Some(b'B')
            )
        {
            self.advance();
            self.advance();
            while let Some(ch) = self.peek() {
                if ch.is_ascii_alphanumeric() || ch == b'_' {
                    self.advance();
                } else {
                    break;
                }
            }
        } else {
            while let Some(ch) = self.peek() {
                if ch.is_ascii_digit() || ch == b'_' {
                    self.advance();
                } else {
                    break;
                }
            }
            if self.peek() == Some(b'.') && self.peek_ahead(1).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.advance();
                while let Some(ch) = self.peek() {
                    if ch.is_ascii_digit() || ch == b'_' {
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
            if matches!(self.peek(), Some(b'e') | Some(b'E')) {
                let mut lookahead = 1;
                if matches!(self.peek_ahead(1), Some(b'+') | Some(b'-')) {
                    lookahead = 2;
                }
                if self.peek_ahead(lookahead).is_some_and(|c| c.is_ascii_digit()) {
                    is_float = true;
                    self.advance();
                    if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                        self.advance();
                    }
                    while let Some(ch) = self.peek() {
                        if ch.is_ascii_digit() || ch == b'_' {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
            }
        }

        let literal = &self.source[start_pos..self.pos];
        let kind = if is_float {
            TokenKind::FloatLit
        } else {
            TokenKind::IntLit
        };
        Token::new(
            kind,
            self.span_from(start),
            literal.to_string(),
            start_pos,
            self.pos,
        )
    }

    /// String prefix letters before an opening quote: any mix of r/b/u/f.
    fn string_prefix_len(&self) -> Option<usize> {
        let mut n = 0;
        while n < 3 {
            match self.peek_ahead(n) {
                Some(b'r') | Some(b'R') | Some(b'b') | Some(b'B') | Some(b'u') | Some(b'U')
                | Some(b'f') | Some(b'F') => n += 1,
                Some(b'"') | Some(b'\'') if n > 0 => return Some(n),
                _ => return None,
            }
        }
        if matches!(self.peek_ahead(n), Some(b'"') | Some(b'\'')) {
            Some(n)
        } else {
            None
        }
    }

    fn scan_string(&mut self, start_pos: usize, prefix_len: usize) -> Result<Token> {
        let start = self.here();
        for _ in 0..prefix_len {
            self.advance();
        }
        let prefix = &self.source[start_pos..self.pos];
        let raw = prefix.contains('r') || prefix.contains('R');

        let quote = match self.advance() {
            Some(q) => q,
            None => {
                return Err(unterminated(self.span_from(start)));
            }
        };

        let triple = self.peek() == Some(quote) && self.peek_ahead(1) == Some(quote);
        if triple {
            self.advance();
            self.advance();
            loop {
                match self.peek() {
                    None => return Err(unterminated(self.span_from(start))),
                    Some(ch) if ch == quote => {
                        if self.peek_ahead(1) == Some(quote) && self.peek_ahead(2) == Some(quote) {
                            self.advance();
                            self.advance();
                            self.advance();
                            break;
                        }
                        self.advance();
                    }
                    Some(b'\\') if !raw => {
                        self.advance();
                        self.advance();
                    }
                    Some(_) => {
                        self.advance();
                    }
                }
            }
        } else {
            loop {
                match self.peek() {
                    None | Some(b'\n') => return Err(unterminated(self.span_from(start))),
                    Some(ch) if ch == quote => {
                        self.advance();
                        break;
                    }
                    Some(b'\\') if !raw => {
                        self.advance();
                        self.advance();
                    }
                    Some(_) => {
                        self.advance();
                    }
                }
            }
        }

        let literal = &self.source[start_pos..self.pos];
        Ok(Token::new(
            TokenKind::StringLit,
            self.span_from(start),
            literal.to_string(),
            start_pos,
            self.pos,
        ))
    }

    fn op(&mut self, kind: TokenKind, start: (usize, usize), start_pos: usize, len: usize) -> Token {
        for _ in 0..len {
            self.advance();
        }
        Token::new(
            kind,
            self.span_from(start),
            self.source[start_pos..self.pos].to_string(),
            start_pos,
            self.pos,
        )
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();

        let start = self.here();
        let start_pos = self.pos;

        let Some(ch) = self.peek() else {
            return Ok(Token::new(
                TokenKind::Eof,
                self.span_from(start),
                String::new(),
                start_pos,
                start_pos,
            ));
        };

        let token = match ch {
            b'"' | b'\'' => self.scan_string(start_pos, 0)?,
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                if let Some(prefix_len) = self.string_prefix_len() {
                    self.scan_string(start_pos, prefix_len)?
                } else {
                    self.scan_identifier(start_pos)
                }
            }
            b'0'..=b'9' => self.scan_number(start_pos),
            b'+' => {
                if self.peek_ahead(1) == Some(b'=') {
                    self.op(TokenKind::PlusEq, start, start_pos, 2)
                } else {
                    self.op(TokenKind::Plus, start, start_pos, 1)
                }
            }
            b'-' => match self.peek_ahead(1) {
                Some(b'=') => self.op(TokenKind::MinusEq, start, start_pos, 2),
                Some(b'>') => self.op(TokenKind::Arrow, start, start_pos, 2),
                _ => self.op(TokenKind::Minus, start, start_pos, 1),
            },
            b'*' => match self.peek_ahead(1) {
                Some(b'*') => self.op(TokenKind::StarStar, start, start_pos, 2),
                Some(b'=') => self.op(TokenKind::StarEq, start, start_pos, 2),
                _ => self.op(TokenKind::Star, start, start_pos, 1),
            },
            b'/' => match self.peek_ahead(1) {
                Some(b'/') => {
                    if self.peek_ahead(2) == Some(b'=') {
                        self.op(TokenKind::SlashSlashEq, start, start_pos, 3)
                    } else {
                        self.op(TokenKind::SlashSlash, start, start_pos, 2)
                    }
                }
                Some(b'=') => self.op(TokenKind::SlashEq, start, start_pos, 2),
                _ => self.op(TokenKind::Slash, start, start_pos, 1),
            },
            b'%' => {
                if self.peek_ahead(1) == Some(b'=') {
                    self.op(TokenKind::PercentEq, start, start_pos, 2)
                } else {
                    self.op(TokenKind::Percent, start, start_pos, 1)
                }
            }
            b'&' => {
                if self.peek_ahead(1) == Some(b'=') {
                    self.op(TokenKind::AmpEq, start, start_pos, 2)
                } else {
                    self.op(TokenKind::Amp, start, start_pos, 1)
                }
            }
            b'|' => {
                if self.peek_ahead(1) == Some(b'=') {
                    self.op(TokenKind::PipeEq, start, start_pos, 2)
                } else {
                    self.op(TokenKind::Pipe, start, start_pos, 1)
                }
            }
            b'^' => {
                if self.peek_ahead(1) == Some(b'=') {
                    self.op(TokenKind::CaretEq, start, start_pos, 2)
                } else {
                    self.op(TokenKind::Caret, start, start_pos, 1)
                }
            }
            b'~' => self.op(TokenKind::Tilde, start, start_pos, 1),
            b'<' => match self.peek_ahead(1) {
                Some(b'<') => {
                    if self.peek_ahead(2) == Some(b'=') {
                        self.op(TokenKind::ShlEq, start, start_pos, 3)
                    } else {
                        self.op(TokenKind::Shl, start, start_pos, 2)
                    }
                }
                Some(b'=') => self.op(TokenKind::LtEq, start, start_pos, 2),
                _ => self.op(TokenKind::Lt, start, start_pos, 1),
            },
            b'>' => match self.peek_ahead(1) {
                Some(b'>') => {
                    if self.peek_ahead(2) == Some(b'=') {
                        self.op(TokenKind::ShrEq, start, start_pos, 3)
                    } else {
                        self.op(TokenKind::Shr, start, start_pos, 2)
                    }
                }
                Some(b'=') => self.op(TokenKind::GtEq, start, start_pos, 2),
                _ => self.op(TokenKind::Gt, start, start_pos, 1),
            },
            b'=' => {
                if self.peek_ahead(1) == Some(b'=') {
                    self.op(TokenKind::EqEq, start, start_pos, 2)
                } else {
                    self.op(TokenKind::Eq, start, start_pos, 1)
                }
            }
            b'!' => {
                if self.peek_ahead(1) == Some(b'=') {
                    self.op(TokenKind::NotEq, start, start_pos, 2)
                } else {
                    return Err(BuildError::unsupported(
                        "unexpected character '!'".to_string(),
                        Some(Span::point(start.0, start.1)),
                        "Use 'not' for boolean negation.",
                    ));
                }
            }
            b'@' => self.op(TokenKind::At, start, start_pos, 1),
            b'(' => self.op(TokenKind::LParen, start, start_pos, 1),
            b')' => self.op(TokenKind::RParen, start, start_pos, 1),
            b'[' => self.op(TokenKind::LBrack, start, start_pos, 1),
            b']' => self.op(TokenKind::RBrack, start, start_pos, 1),
            b'{' => self.op(TokenKind::LBrace, start, start_pos, 1),
            b'}' => self.op(TokenKind::RBrace, start, start_pos, 1),
            b',' => self.op(TokenKind::Comma, start, start_pos, 1),
            b'.' => self.op(TokenKind::Dot, start, start_pos, 1),
            b':' => self.op(TokenKind::Colon, start, start_pos, 1),
            b';' => self.op(TokenKind::Semi, start, start_pos, 1),
            other => {
                return Err(BuildError::unsupported(
                    format!("unexpected character '{}'", other as char),
                    Some(Span::point(start.0, start.1)),
                    "Remove the character or rewrite the statement with supported syntax.",
                ));
            }
        };

        Ok(token)
    }
}

fn unterminated(span: Span) -> BuildError {
    BuildError::unsupported(
        "unterminated string literal".to_string(),
        Some(span),
        "Close the string before the end of the line.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(text: &str) -> Vec<Token> {
        Lexer::new(text, 1).tokenize().unwrap()
    }

    fn kinds(text: &str) -> Vec<TokenKind> {
        lex(text).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            kinds("def foo(x)"),
            vec![
                TokenKind::Def,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::Ident,
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn two_char_operators() {
        assert_eq!(
            kinds("a // b ** c <= d >> e"),
            vec![
                TokenKind::Ident,
                TokenKind::SlashSlash,
                TokenKind::Ident,
                TokenKind::StarStar,
                TokenKind::Ident,
                TokenKind::LtEq,
                TokenKind::Ident,
                TokenKind::Shr,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn augmented_assign_operators() {
        assert_eq!(
            kinds("x //= 2")[1],
            TokenKind::SlashSlashEq
        );
        assert_eq!(kinds("x <<= 2")[1], TokenKind::ShlEq);
    }

    #[test]
    fn number_literals() {
        let toks = lex("10 0xff 0b101 0o17 1.5 2e3 1_000");
        assert_eq!(toks[0].kind, TokenKind::IntLit);
        assert_eq!(toks[1].literal, "0xff");
        assert_eq!(toks[2].literal, "0b101");
        assert_eq!(toks[3].literal, "0o17");
        assert_eq!(toks[4].kind, TokenKind::FloatLit);
        assert_eq!(toks[5].kind, TokenKind::FloatLit);
        assert_eq!(toks[6].literal, "1_000");
    }

    #[test]
    fn string_prefixes() {
        let toks = lex(r#"f"x={x}" rb'\d+' "plain""#);
        assert_eq!(toks[0].kind, TokenKind::StringLit);
        assert_eq!(toks[0].literal, "f\"x={x}\"");
        assert_eq!(toks[1].literal, r"rb'\d+'");
        assert_eq!(toks[2].literal, "\"plain\"");
    }

    #[test]
    fn triple_quoted_string() {
        let toks = lex("\"\"\"doc\nstring\"\"\"");
        assert_eq!(toks[0].kind, TokenKind::StringLit);
        assert_eq!(toks[0].span.end_lineno, 2);
    }

    #[test]
    fn unterminated_string_is_rejected() {
        let err = Lexer::new("\"oops", 3).tokenize().unwrap_err();
        assert_eq!(err.kind.as_str(), "unsupported_syntax");
        assert_eq!(err.source_span.unwrap().lineno, 3);
    }

    #[test]
    fn unknown_character_is_rejected() {
        let err = Lexer::new("a ? b", 1).tokenize().unwrap_err();
        assert_eq!(err.kind.as_str(), "unsupported_syntax");
    }

    #[test]
    fn spans_are_one_based() {
        let toks = lex("x + y");
        assert_eq!(toks[0].span.col, 1);
        assert_eq!(toks[1].span.col, 3);
        assert_eq!(toks[2].span.col, 5);
    }
}
