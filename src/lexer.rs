use crate::error::{KestrelError, Position, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    // Punctuation
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Semicolon,
    Dot,
    Dollar,
    Pipe,
    Arrow,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    And,
    Or,
    Equal,
    BangEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals
    Identifier,
    Number,
    Boolean,
    Char,
    String,

    // Keywords
    If,
    Else,
    Func,
    Lambda,
    Datatype,
    New,
    Return,
    Isa,

    // Discarded before parsing
    Whitespace,
    Comment,

    Eof,
}

impl TokenType {
    fn is_trivia(self) -> bool {
        matches!(self, TokenType::Whitespace | TokenType::Comment)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub span: Span,
    pub position: Position,
}

impl Token {
    pub fn new(token_type: TokenType, lexeme: String, span: Span, position: Position) -> Self {
        Self {
            token_type,
            lexeme,
            span,
            position,
        }
    }
}

/// Result of a single matcher: the token type and the number of bytes consumed.
type Match = Option<(TokenType, usize)>;

type Matcher = fn(&str) -> Result<Match, &'static str>;

const KEYWORDS: &[(&str, TokenType)] = &[
    ("if", TokenType::If),
    ("else", TokenType::Else),
    ("func", TokenType::Func),
    ("lambda", TokenType::Lambda),
    ("datatype", TokenType::Datatype),
    ("new", TokenType::New),
    ("return", TokenType::Return),
    ("isa", TokenType::Isa),
    ("true", TokenType::Boolean),
    ("false", TokenType::Boolean),
];

const OPERATORS: &[(&str, TokenType)] = &[
    ("&&", TokenType::And),
    ("||", TokenType::Or),
    ("<=", TokenType::LessEqual),
    (">=", TokenType::GreaterEqual),
    ("!=", TokenType::BangEqual),
    ("->", TokenType::Arrow),
    ("(", TokenType::LeftParen),
    (")", TokenType::RightParen),
    ("{", TokenType::LeftBrace),
    ("}", TokenType::RightBrace),
    ("[", TokenType::LeftBracket),
    ("]", TokenType::RightBracket),
    (",", TokenType::Comma),
    (";", TokenType::Semicolon),
    (".", TokenType::Dot),
    ("$", TokenType::Dollar),
    ("|", TokenType::Pipe),
    ("+", TokenType::Plus),
    ("-", TokenType::Minus),
    ("*", TokenType::Star),
    ("/", TokenType::Slash),
    ("^", TokenType::Caret),
    ("=", TokenType::Equal),
    ("<", TokenType::Less),
    (">", TokenType::Greater),
];

/// Matchers in priority order. When two matchers consume the same number of
/// bytes the earlier one wins, so keywords shadow identifiers of equal length.
const MATCHERS: &[Matcher] = &[
    match_whitespace,
    match_comment,
    match_number,
    match_keyword,
    match_char,
    match_string,
    match_identifier,
    match_operator,
];

fn match_whitespace(rest: &str) -> Result<Match, &'static str> {
    let len = rest
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    Ok((len > 0).then_some((TokenType::Whitespace, len)))
}

fn match_comment(rest: &str) -> Result<Match, &'static str> {
    if rest.starts_with("//") {
        let len = rest.find('\n').unwrap_or(rest.len());
        Ok(Some((TokenType::Comment, len)))
    } else if rest.starts_with("/*") {
        match rest[2..].find("*/") {
            Some(end) => Ok(Some((TokenType::Comment, end + 4))),
            None => Err("Unterminated block comment"),
        }
    } else {
        Ok(None)
    }
}

fn match_number(rest: &str) -> Result<Match, &'static str> {
    let digits = |s: &str| s.bytes().take_while(u8::is_ascii_digit).count();

    let int_len = digits(rest);
    if int_len == 0 {
        return Ok(None);
    }
    let after = &rest[int_len..];
    if after.starts_with('.') {
        let frac_len = digits(&after[1..]);
        if frac_len > 0 {
            return Ok(Some((TokenType::Number, int_len + 1 + frac_len)));
        }
    }
    Ok(Some((TokenType::Number, int_len)))
}

fn match_keyword(rest: &str) -> Result<Match, &'static str> {
    Ok(KEYWORDS
        .iter()
        .filter(|(word, _)| rest.starts_with(word))
        .map(|(word, token_type)| (*token_type, word.len()))
        .max_by_key(|(_, len)| *len))
}

fn match_identifier(rest: &str) -> Result<Match, &'static str> {
    let mut chars = rest.char_indices();
    match chars.next() {
        Some((_, c)) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return Ok(None),
    }
    let len = chars
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    Ok(Some((TokenType::Identifier, len)))
}

/// Length in bytes of a quoted literal starting at `rest[0] == quote`,
/// including both quotes. Backslash escapes the following character.
fn quoted_len(rest: &str, quote: char) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in rest.char_indices().skip(1) {
        if c == '\n' {
            return None;
        }
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Some(i + c.len_utf8());
        }
    }
    None
}

fn match_char(rest: &str) -> Result<Match, &'static str> {
    if !rest.starts_with('\'') {
        return Ok(None);
    }
    match quoted_len(rest, '\'') {
        Some(len) => Ok(Some((TokenType::Char, len))),
        None => Err("Unterminated character literal"),
    }
}

fn match_string(rest: &str) -> Result<Match, &'static str> {
    if !rest.starts_with('"') {
        return Ok(None);
    }
    match quoted_len(rest, '"') {
        Some(len) => Ok(Some((TokenType::String, len))),
        None => Err("Unterminated string"),
    }
}

fn match_operator(rest: &str) -> Result<Match, &'static str> {
    Ok(OPERATORS
        .iter()
        .filter(|(op, _)| rest.starts_with(op))
        .map(|(op, token_type)| (*token_type, op.len()))
        .max_by_key(|(_, len)| *len))
}

/// Decodes the escapes inside a quoted literal body.
pub fn unescape(body: &str) -> Result<String, String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some(other) => return Err(format!("Unknown escape sequence '\\{}'", other)),
            None => return Err("Dangling '\\' in literal".to_string()),
        }
    }
    Ok(out)
}

pub struct Lexer {
    source: String,
    current: usize,
    line: usize,
    line_start: usize,
}

impl Lexer {
    pub fn new(source: String) -> Self {
        Self {
            source,
            current: 0,
            line: 1,
            line_start: 0,
        }
    }

    /// Tokenizes the whole source. Whitespace and comments are dropped and a
    /// trailing `Eof` token is appended.
    pub fn scan_tokens(&mut self) -> Result<Vec<Token>, KestrelError> {
        let mut tokens = Vec::new();

        while !self.is_at_end() {
            let token = self.scan_token()?;
            if !token.token_type.is_trivia() {
                tokens.push(token);
            }
        }

        tokens.push(Token::new(
            TokenType::Eof,
            String::new(),
            Span::single(self.current),
            self.position(),
        ));

        tracing::trace!(count = tokens.len(), "scanned tokens");
        Ok(tokens)
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.source[self.line_start..self.current].chars().count() + 1,
        }
    }

    fn scan_token(&mut self) -> Result<Token, KestrelError> {
        let rest = &self.source[self.current..];
        let mut best: Match = None;

        for matcher in MATCHERS {
            let candidate = matcher(rest).map_err(|message| {
                KestrelError::lex_error(
                    Span::new(self.current, self.source.len()),
                    self.position(),
                    message.to_string(),
                )
            })?;
            if let Some((token_type, len)) = candidate {
                if best.map_or(true, |(_, best_len)| len > best_len) {
                    best = Some((token_type, len));
                }
            }
        }

        let (token_type, len) = match best {
            Some(found) => found,
            None => {
                let c = rest.chars().next().unwrap_or('\0');
                return Err(KestrelError::lex_error(
                    Span::new(self.current, self.current + c.len_utf8()),
                    self.position(),
                    format!("Unexpected character: '{}'", c),
                ));
            }
        };

        let start = self.current;
        let position = self.position();
        let lexeme = self.source[start..start + len].to_string();
        self.advance_over(len);

        Ok(Token::new(token_type, lexeme, Span::new(start, self.current), position))
    }

    /// Moves past `len` bytes, keeping the line counter and the offset of the
    /// last newline current.
    fn advance_over(&mut self, len: usize) {
        let consumed = &self.source[self.current..self.current + len];
        for (i, c) in consumed.char_indices() {
            if c == '\n' {
                self.line += 1;
                self.line_start = self.current + i + 1;
            }
        }
        self.current += len;
    }
}
