// src/core/lexer.rs

use std::iter::Peekable;
use std::str::CharIndices;

/// Location of a token in the source text. Lines and columns start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset just past the last character.
    pub end: usize,
    /// Line of the first character.
    pub line: usize,
    /// Column of the first character, counted in characters.
    pub column: usize,
}

/// Token categories. Malformed input becomes an [`TokenKind::Error`] token
/// instead of stopping the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `:`
    Colon,
    /// `,`
    Comma,
    /// `=`
    Equals,
    /// `.`
    Dot,
    /// A name made of letters, digits and `_`.
    Ident(String),
    /// Raw text between the quotes. Escapes are resolved by the parser,
    /// which needs the raw form to tell literal braces from interpolations.
    Str(String),
    /// A decimal number.
    Number(f64),
    /// A `#rrggbb` or named color literal, including the `#`.
    Color(String),
    /// The trimmed contents of a `{{ ... }}` block.
    Expr(String),
    /// Text that could not be tokenized, with the reason.
    Error(String),
    /// End of input. Always the last token.
    Eof,
}

impl TokenKind {
    /// How the token reads in an error message.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::LBrace => "'{'".to_string(),
            TokenKind::RBrace => "'}'".to_string(),
            TokenKind::LBracket => "'['".to_string(),
            TokenKind::RBracket => "']'".to_string(),
            TokenKind::Colon => "':'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Equals => "'='".to_string(),
            TokenKind::Dot => "'.'".to_string(),
            TokenKind::Ident(name) => format!("identifier '{}'", name),
            TokenKind::Str(_) => "string".to_string(),
            TokenKind::Number(n) => format!("number {}", n),
            TokenKind::Color(c) => format!("color {}", c),
            TokenKind::Expr(_) => "expression".to_string(),
            TokenKind::Error(msg) => msg.clone(),
            TokenKind::Eof => "end of input".to_string(),
        }
    }
}

/// A token and where it was found.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// What was found.
    pub kind: TokenKind,
    /// Where it was found.
    pub span: Span,
}

/// Tokenizer for CVU definition text.
pub struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: usize,
    column: usize,
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// A lexer positioned at the start of `source`.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            line: 1,
            column: 1,
            pos: 0,
        }
    }

    /// Tokenizes the entire source. The result always ends with `Eof`; an
    /// unrecoverable scan error produces an `Error` token followed by `Eof`.
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token();
            let stop = matches!(token.kind, TokenKind::Eof);
            tokens.push(token);
            if stop {
                break;
            }
        }

        tokens
    }

    fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        let start_pos = self.pos;
        let start_line = self.line;
        let start_col = self.column;

        let kind = match self.peek_char() {
            None => TokenKind::Eof,
            Some(c) => match c {
                '{' => {
                    if self.peek_next_char() == Some('{') {
                        self.scan_bare_expression()
                    } else {
                        self.advance();
                        TokenKind::LBrace
                    }
                }
                '}' => {
                    self.advance();
                    TokenKind::RBrace
                }
                '[' => {
                    self.advance();
                    TokenKind::LBracket
                }
                ']' => {
                    self.advance();
                    TokenKind::RBracket
                }
                ':' => {
                    self.advance();
                    TokenKind::Colon
                }
                ',' | ';' => {
                    self.advance();
                    TokenKind::Comma
                }
                '=' => {
                    self.advance();
                    TokenKind::Equals
                }
                '.' => {
                    self.advance();
                    TokenKind::Dot
                }
                '"' | '\'' => self.scan_string(c),
                '#' => self.scan_color(),
                '-' => {
                    if self.peek_next_char().is_some_and(|n| n.is_ascii_digit()) {
                        self.advance();
                        self.scan_number(start_pos)
                    } else {
                        self.advance();
                        TokenKind::Error("Unexpected character '-'".to_string())
                    }
                }
                c if c.is_ascii_digit() => self.scan_number(start_pos),
                c if c.is_alphabetic() || c == '_' => self.scan_identifier(),
                other => {
                    self.advance();
                    TokenKind::Error(format!("Unexpected character '{}'", other))
                }
            },
        };

        Token {
            kind,
            span: Span {
                start: start_pos,
                end: self.pos,
                line: start_line,
                column: start_col,
            },
        }
    }

    fn scan_identifier(&mut self) -> TokenKind {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        TokenKind::Ident(self.text_from(start).to_string())
    }

    /// Scans a quoted string and returns its raw body. Escape pairs are kept
    /// intact so that `\"` does not terminate the string.
    fn scan_string(&mut self, quote: char) -> TokenKind {
        self.advance();
        let start = self.pos;

        loop {
            match self.peek_char() {
                None => return TokenKind::Error("Unterminated string".to_string()),
                Some('\\') => {
                    self.advance();
                    self.advance();
                }
                Some(c) if c == quote => {
                    let raw = self.text_from(start).to_string();
                    self.advance();
                    return TokenKind::Str(raw);
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    fn scan_color(&mut self) -> TokenKind {
        let start = self.pos;
        self.advance();
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        if self.pos - start == 1 {
            return TokenKind::Error("Empty color literal".to_string());
        }
        TokenKind::Color(self.text_from(start).to_string())
    }

    /// Scans digits with an optional fraction. A trailing `.` that is not
    /// followed by a digit is left for the next token.
    fn scan_number(&mut self, start: usize) -> TokenKind {
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.advance();
            } else if c == '.' && self.peek_next_char().is_some_and(|n| n.is_ascii_digit()) {
                self.advance();
            } else {
                break;
            }
        }

        let text = self.text_from(start);
        match text.parse::<f64>() {
            Ok(n) => TokenKind::Number(n),
            Err(_) => TokenKind::Error(format!("Invalid number: {}", text)),
        }
    }

    /// Scans `{{ ... }}`. Quoted text inside the block may contain braces.
    fn scan_bare_expression(&mut self) -> TokenKind {
        self.advance();
        self.advance();
        let start = self.pos;
        let mut quote: Option<char> = None;

        loop {
            match self.peek_char() {
                None => return TokenKind::Error("Unterminated expression block".to_string()),
                Some('\\') if quote.is_some() => {
                    self.advance();
                    self.advance();
                }
                Some(c) if quote == Some(c) => {
                    quote = None;
                    self.advance();
                }
                Some(c @ ('"' | '\'')) if quote.is_none() => {
                    quote = Some(c);
                    self.advance();
                }
                Some('}') if quote.is_none() && self.peek_next_char() == Some('}') => {
                    let body = self.text_from(start).trim().to_string();
                    self.advance();
                    self.advance();
                    return TokenKind::Expr(body);
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') => {
                    let next = self.peek_next_char();
                    if next == Some('/') {
                        while let Some(c) = self.peek_char() {
                            if c == '\n' {
                                break;
                            }
                            self.advance();
                        }
                    } else if next == Some('*') {
                        self.advance();
                        self.advance();
                        loop {
                            match self.peek_char() {
                                None => break,
                                Some('*') if self.peek_next_char() == Some('/') => {
                                    self.advance();
                                    self.advance();
                                    break;
                                }
                                _ => {
                                    self.advance();
                                }
                            }
                        }
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
    }

    /// Source text from `start` up to the current position.
    fn text_from(&self, start: usize) -> &'a str {
        self.source.get(start..self.pos).unwrap_or_default()
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_next_char(&self) -> Option<char> {
        let mut iter = self.source.get(self.pos..).unwrap_or_default().chars();
        iter.next();
        iter.next()
    }

    fn advance(&mut self) -> Option<char> {
        let (i, c) = self.chars.next()?;
        self.pos = i + c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source).tokenize().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_selector_tokens() {
        assert_eq!(
            kinds("Person[] { }"),
            vec![
                TokenKind::Ident("Person".into()),
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_keeps_raw_escapes() {
        assert_eq!(
            kinds(r#""a \"b\" \{c\}""#),
            vec![TokenKind::Str(r#"a \"b\" \{c\}"#.into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_bare_expression_block() {
        assert_eq!(
            kinds("{{ .name == '}}' }}"),
            vec![TokenKind::Expr(".name == '}}'".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_comments_numbers_and_colors() {
        let tokens = kinds("// line\n/* block\n */ -1.5 #fff 3.");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Number(-1.5),
                TokenKind::Color("#fff".into()),
                TokenKind::Number(3.0),
                TokenKind::Dot,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_line_and_column_tracking() {
        let tokens = Lexer::new("a\n  b").tokenize();
        assert_eq!(tokens[1].span.line, 2);
        assert_eq!(tokens[1].span.column, 3);
    }

    #[test]
    fn test_unterminated_string_is_error() {
        let tokens = kinds("\"abc");
        assert!(matches!(tokens[0], TokenKind::Error(_)));
        assert_eq!(tokens.last(), Some(&TokenKind::Eof));
    }
}
