//! Tokenizer for the MySQL statements the in-memory store understands.

/// A byte range in the statement text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Start byte offset (inclusive).
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
}

/// Token kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Unquoted word: keyword or bare identifier.
    Word(String),
    /// Backtick-quoted identifier.
    Quoted(String),
    /// String literal.
    Str(String),
    /// Integer literal.
    Integer(i64),
    /// Float literal.
    Float(f64),
    /// `?` placeholder.
    Question,
    LeftParen,
    RightParen,
    Comma,
    Eq,
    Star,
    Dot,
    Minus,
    Semicolon,
    /// Any other single character.
    Other(char),
    /// Lexing failed.
    Error(String),
    Eof,
}

/// A token with its location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    /// Returns true if this is the unquoted keyword `keyword`.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.kind, TokenKind::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

/// Splits statement text into tokens.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    start: usize,
}

impl<'a> Lexer<'a> {
    pub const fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            start: 0,
        }
    }

    /// Tokenizes the whole input, ending with `Eof`.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = matches!(token.kind, TokenKind::Eof | TokenKind::Error(_));
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.advance();
            }

            let line_comment = (self.peek() == Some('-') && self.peek_second() == Some('-'))
                || self.peek() == Some('#');
            if line_comment {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.advance();
                }
                continue;
            }

            if self.peek() == Some('/') && self.peek_second() == Some('*') {
                self.advance();
                self.advance();
                loop {
                    match self.advance() {
                        Some('*') if self.peek() == Some('/') => {
                            self.advance();
                            break;
                        }
                        None => break,
                        _ => {}
                    }
                }
                continue;
            }

            break;
        }
    }

    fn emit(&self, kind: TokenKind) -> Token {
        Token {
            kind,
            span: Span {
                start: self.start,
                end: self.pos,
            },
        }
    }

    fn scan_word(&mut self) -> Token {
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$')
        {
            self.advance();
        }
        let text = &self.input[self.start..self.pos];
        self.emit(TokenKind::Word(text.to_string()))
    }

    fn scan_quoted_identifier(&mut self) -> Token {
        let mut name = String::new();
        loop {
            match self.advance() {
                Some('`') if self.peek() == Some('`') => {
                    self.advance();
                    name.push('`');
                }
                Some('`') => return self.emit(TokenKind::Quoted(name)),
                Some(c) => name.push(c),
                None => {
                    return self.emit(TokenKind::Error(String::from(
                        "Unterminated quoted identifier",
                    )));
                }
            }
        }
    }

    fn quoted(&mut self, quote: char) -> Token {
        let mut value = String::new();
        loop {
            match self.advance() {
                Some('\\') => match self.advance() {
                    Some('0') => value.push('\0'),
                    Some('n') => value.push('\n'),
                    Some('r') => value.push('\r'),
                    Some('t') => value.push('\t'),
                    Some('Z') => value.push('\x1a'),
                    Some(c) => value.push(c),
                    None => break,
                },
                Some(c) if c == quote => {
                    if self.peek() == Some(quote) {
                        self.advance();
                        value.push(quote);
                    } else {
                        return self.emit(TokenKind::Str(value));
                    }
                }
                Some(c) => value.push(c),
                None => break,
            }
        }
        self.emit(TokenKind::Error(String::from(
            "Unterminated string literal",
        )))
    }

    fn number(&mut self) -> Token {
        let mut is_float = false;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        // Identifiers may start with digits (e.g. `1col`).
        if self.peek().is_some_and(|c| c.is_alphabetic() || c == '_') {
            return self.scan_word();
        }

        let text = &self.input[self.start..self.pos];
        if is_float {
            match text.parse::<f64>() {
                Ok(f) => self.emit(TokenKind::Float(f)),
                Err(e) => self.emit(TokenKind::Error(format!("Invalid float: {e}"))),
            }
        } else {
            match text.parse::<i64>() {
                Ok(i) => self.emit(TokenKind::Integer(i)),
                Err(e) => self.emit(TokenKind::Error(format!("Invalid integer: {e}"))),
            }
        }
    }

    fn next_token(&mut self) -> Token {
        self.skip_trivia();
        self.start = self.pos;

        let Some(c) = self.advance() else {
            return self.emit(TokenKind::Eof);
        };

        match c {
            '(' => self.emit(TokenKind::LeftParen),
            ')' => self.emit(TokenKind::RightParen),
            ',' => self.emit(TokenKind::Comma),
            '=' => self.emit(TokenKind::Eq),
            '*' => self.emit(TokenKind::Star),
            '.' => self.emit(TokenKind::Dot),
            '-' => self.emit(TokenKind::Minus),
            ';' => self.emit(TokenKind::Semicolon),
            '?' => self.emit(TokenKind::Question),
            '`' => self.scan_quoted_identifier(),
            '\'' | '"' => self.quoted(c),
            c if c.is_ascii_digit() => self.number(),
            c if c.is_alphabetic() || c == '_' => self.scan_word(),
            other => self.emit(TokenKind::Other(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<TokenKind> {
        Lexer::new(sql).tokenize().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_identifiers_and_keywords() {
        assert_eq!(
            kinds("DROP TABLE `my``table`"),
            vec![
                TokenKind::Word("DROP".into()),
                TokenKind::Word("TABLE".into()),
                TokenKind::Quoted("my`table".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_strings_with_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "a""b" 'x''y'"#),
            vec![
                TokenKind::Str("it's".into()),
                TokenKind::Str("a\"b".into()),
                TokenKind::Str("x'y".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers_and_placeholders() {
        assert_eq!(
            kinds("VALUES (5, -1.5, ?)"),
            vec![
                TokenKind::Word("VALUES".into()),
                TokenKind::LeftParen,
                TokenKind::Integer(5),
                TokenKind::Comma,
                TokenKind::Minus,
                TokenKind::Float(1.5),
                TokenKind::Comma,
                TokenKind::Question,
                TokenKind::RightParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_spans_cover_source() {
        let sql = "INT(10) DEFAULT 0";
        let tokens = Lexer::new(sql).tokenize();
        assert_eq!(&sql[tokens[0].span.start..tokens[3].span.end], "INT(10)");
    }

    #[test]
    fn test_unterminated_string() {
        let tokens = Lexer::new("'abc").tokenize();
        assert!(matches!(tokens.last().unwrap().kind, TokenKind::Error(_)));
    }
}
