//! Hand-written lexer producing a flat token stream with byte-offset spans.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Str(String),
    // keywords
    Select,
    From,
    Where,
    Group,
    By,
    Order,
    Limit,
    Offset,
    Join,
    On,
    As,
    Insert,
    Into,
    Values,
    Update,
    Set,
    Delete,
    Create,
    Drop,
    Table,
    Primary,
    Key,
    Not,
    Null,
    And,
    Or,
    Is,
    Explain,
    Int_,
    Bool,
    Text,
    True,
    False,
    Asc,
    Desc,
    // punctuation/operators
    Comma,
    Semicolon,
    LParen,
    RParen,
    Star,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Slash,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, off: usize) -> Option<u8> {
        self.bytes.get(self.pos + off).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
                self.pos += 1;
            }
            if self.peek() == Some(b'-') && self.peek_at(1) == Some(b'-') {
                while self.peek().is_some() && self.peek() != Some(b'\n') {
                    self.pos += 1;
                }
                continue;
            }
            break;
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, (String, Span)> {
        let mut out = Vec::new();
        loop {
            self.skip_ws_and_comments();
            let start = self.pos;
            let Some(c) = self.peek() else {
                out.push(Token {
                    kind: TokenKind::Eof,
                    span: Span::new(start, start),
                });
                break;
            };
            let kind = match c {
                b',' => {
                    self.bump();
                    TokenKind::Comma
                }
                b';' => {
                    self.bump();
                    TokenKind::Semicolon
                }
                b'(' => {
                    self.bump();
                    TokenKind::LParen
                }
                b')' => {
                    self.bump();
                    TokenKind::RParen
                }
                b'*' => {
                    self.bump();
                    TokenKind::Star
                }
                b'+' => {
                    self.bump();
                    TokenKind::Plus
                }
                b'-' => {
                    self.bump();
                    TokenKind::Minus
                }
                b'/' => {
                    self.bump();
                    TokenKind::Slash
                }
                b'=' => {
                    self.bump();
                    TokenKind::Eq
                }
                b'!' if self.peek_at(1) == Some(b'=') => {
                    self.bump();
                    self.bump();
                    TokenKind::NotEq
                }
                b'<' if self.peek_at(1) == Some(b'>') => {
                    self.bump();
                    self.bump();
                    TokenKind::NotEq
                }
                b'<' if self.peek_at(1) == Some(b'=') => {
                    self.bump();
                    self.bump();
                    TokenKind::LtEq
                }
                b'<' => {
                    self.bump();
                    TokenKind::Lt
                }
                b'>' if self.peek_at(1) == Some(b'=') => {
                    self.bump();
                    self.bump();
                    TokenKind::GtEq
                }
                b'>' => {
                    self.bump();
                    TokenKind::Gt
                }
                b'\'' | b'"' => {
                    let quote = c;
                    self.bump();
                    let mut s = String::new();
                    loop {
                        match self.bump() {
                            Some(b) if b == quote => break,
                            Some(b) => s.push(b as char),
                            None => return Err(("unterminated string literal".into(), Span::new(start, self.pos))),
                        }
                    }
                    TokenKind::Str(s)
                }
                b'0'..=b'9' => {
                    while matches!(self.peek(), Some(b'0'..=b'9')) {
                        self.pos += 1;
                    }
                    let text = &self.src[start..self.pos];
                    let n: i64 = text
                        .parse()
                        .map_err(|_| ("invalid integer literal".to_string(), Span::new(start, self.pos)))?;
                    TokenKind::Int(n)
                }
                c if c.is_ascii_alphabetic() || c == b'_' => {
                    while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
                        self.pos += 1;
                    }
                    let text = &self.src[start..self.pos];
                    keyword_or_ident(text)
                }
                other => {
                    return Err((format!("unexpected character `{}`", other as char), Span::new(start, start + 1)));
                }
            };
            out.push(Token {
                kind,
                span: Span::new(start, self.pos),
            });
        }
        Ok(out)
    }
}

fn keyword_or_ident(text: &str) -> TokenKind {
    match text.to_ascii_uppercase().as_str() {
        "SELECT" => TokenKind::Select,
        "FROM" => TokenKind::From,
        "WHERE" => TokenKind::Where,
        "GROUP" => TokenKind::Group,
        "BY" => TokenKind::By,
        "ORDER" => TokenKind::Order,
        "LIMIT" => TokenKind::Limit,
        "OFFSET" => TokenKind::Offset,
        "JOIN" => TokenKind::Join,
        "ON" => TokenKind::On,
        "AS" => TokenKind::As,
        "INSERT" => TokenKind::Insert,
        "INTO" => TokenKind::Into,
        "VALUES" => TokenKind::Values,
        "UPDATE" => TokenKind::Update,
        "SET" => TokenKind::Set,
        "DELETE" => TokenKind::Delete,
        "CREATE" => TokenKind::Create,
        "DROP" => TokenKind::Drop,
        "TABLE" => TokenKind::Table,
        "PRIMARY" => TokenKind::Primary,
        "KEY" => TokenKind::Key,
        "NOT" => TokenKind::Not,
        "NULL" => TokenKind::Null,
        "AND" => TokenKind::And,
        "OR" => TokenKind::Or,
        "IS" => TokenKind::Is,
        "EXPLAIN" => TokenKind::Explain,
        "INT" => TokenKind::Int_,
        "BOOL" | "BOOLEAN" => TokenKind::Bool,
        "TEXT" => TokenKind::Text,
        "TRUE" => TokenKind::True,
        "FALSE" => TokenKind::False,
        "ASC" => TokenKind::Asc,
        "DESC" => TokenKind::Desc,
        _ => TokenKind::Ident(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_a_simple_select() {
        let toks = Lexer::new("SELECT a, b FROM t WHERE a = 1;").tokenize().unwrap();
        let kinds: Vec<&TokenKind> = toks.iter().map(|t| &t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                &TokenKind::Select,
                &TokenKind::Ident("a".into()),
                &TokenKind::Comma,
                &TokenKind::Ident("b".into()),
                &TokenKind::From,
                &TokenKind::Ident("t".into()),
                &TokenKind::Where,
                &TokenKind::Ident("a".into()),
                &TokenKind::Eq,
                &TokenKind::Int(1),
                &TokenKind::Semicolon,
                &TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn rejects_unterminated_string() {
        assert!(Lexer::new("SELECT 'oops").tokenize().is_err());
    }
}
