use ariadne::{Color, Fmt, Label, Report, ReportKind, Source};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn single(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos + 1,
        }
    }

    pub fn to(&self, other: &Span) -> Span {
        Span::new(self.start, other.end)
    }
}

/// Human-readable source position, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    LexError,
    ParseError,
    ContextError,
    /// An operator was applied to a pair of value kinds that does not define it.
    MismatchedMethod {
        operator: String,
        left: &'static str,
        right: &'static str,
    },
    ArithmeticError,
    IndexError,
    RecursionLimitExceeded,
}

impl ErrorKind {
    fn label(&self) -> &'static str {
        match self {
            ErrorKind::LexError => "Lexical Error",
            ErrorKind::ParseError => "Parse Error",
            ErrorKind::ContextError => "Context Error",
            ErrorKind::MismatchedMethod { .. } => "Type Error",
            ErrorKind::ArithmeticError => "Arithmetic Error",
            ErrorKind::IndexError => "Index Error",
            ErrorKind::RecursionLimitExceeded => "Recursion Limit Exceeded",
        }
    }

    fn color(&self) -> Color {
        match self {
            ErrorKind::LexError => Color::Red,
            ErrorKind::ParseError => Color::Yellow,
            ErrorKind::ContextError => Color::Blue,
            ErrorKind::MismatchedMethod { .. } => Color::Magenta,
            ErrorKind::ArithmeticError | ErrorKind::IndexError => Color::Magenta,
            ErrorKind::RecursionLimitExceeded => Color::Red,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KestrelError {
    pub kind: ErrorKind,
    pub span: Span,
    pub message: String,
    pub help: Option<String>,
    pub position: Option<Position>,
}

impl KestrelError {
    pub fn new(kind: ErrorKind, span: Span, message: String) -> Self {
        Self {
            kind,
            span,
            message,
            help: None,
            position: None,
        }
    }

    pub fn new_with_help(kind: ErrorKind, span: Span, message: String, help: String) -> Self {
        Self {
            kind,
            span,
            message,
            help: Some(help),
            position: None,
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn lex_error(span: Span, position: Position, message: String) -> Self {
        Self::new(ErrorKind::LexError, span, message).at(position)
    }

    pub fn parse_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::ParseError, span, message)
    }

    pub fn parse_error_with_help(span: Span, message: String, help: String) -> Self {
        Self::new_with_help(ErrorKind::ParseError, span, message, help)
    }

    pub fn context_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::ContextError, span, message)
    }

    pub fn context_error_with_help(span: Span, message: String, help: String) -> Self {
        Self::new_with_help(ErrorKind::ContextError, span, message, help)
    }

    pub fn mismatched_method(
        span: Span,
        operator: &str,
        left: &'static str,
        right: &'static str,
    ) -> Self {
        Self::new(
            ErrorKind::MismatchedMethod {
                operator: operator.to_string(),
                left,
                right,
            },
            span,
            format!("Operator '{}' is not defined for {} and {}", operator, left, right),
        )
    }

    pub fn arithmetic_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::ArithmeticError, span, message)
    }

    pub fn index_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::IndexError, span, message)
    }

    pub fn recursion_limit(span: Span, limit: usize) -> Self {
        Self::new_with_help(
            ErrorKind::RecursionLimitExceeded,
            span,
            format!("Maximum call depth of {} exceeded", limit),
            "Check that every recursive function has a reachable base case.".to_string(),
        )
    }

    pub fn is_fatal(&self) -> bool {
        self.kind == ErrorKind::RecursionLimitExceeded
    }

    pub fn report(&self, source: &str, filename: Option<&str>) {
        let filename = filename.unwrap_or("<repl>");
        let color = self.kind.color();

        let mut report_builder = Report::build(ReportKind::Error, filename, self.span.start)
            .with_message(format!("{}: {}", self.kind.label().fg(color), self.message))
            .with_label(
                Label::new((filename, self.span.start..self.span.end))
                    .with_message(&self.message)
                    .with_color(color),
            );

        if let Some(ref help_text) = self.help {
            report_builder = report_builder.with_note(format!("{}: {}", "help".fg(Color::Cyan), help_text));
        }

        // Diagnostics go to stderr; a failed write there has nowhere better to go.
        let _ = report_builder
            .finish()
            .eprint((filename, Source::from(source)));
    }
}

impl fmt::Display for KestrelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.position {
            Some(position) => write!(f, "{} at {}", self.message, position),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for KestrelError {}
