//! Splits template strings into literal text and path expressions.

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// One piece of a parsed template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece<'a> {
    /// Literal text, copied through unchanged.
    Text(&'a str),
    /// A `{{ .a.b }}` expression with its path segments.
    Expr(Vec<&'a str>),
}

/// Parses a template string.
///
/// Brace pairs whose contents are not a dotted path stay in the output as
/// literal text.
#[must_use]
pub fn parse(input: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut rest = input;
    let mut text_start = 0;
    let mut offset = 0;

    while let Some(open) = rest.find(OPEN) {
        let after_open = &rest[open + OPEN.len()..];
        let Some(close) = after_open.find(CLOSE) else {
            break;
        };
        let inner = &after_open[..close];
        let consumed = open + OPEN.len() + close + CLOSE.len();

        // A rejected span is skipped only up to its opening braces, so a
        // stray `{{` cannot hide an expression that follows it.
        let advance = match parse_path(inner.trim()) {
            Some(path) => {
                let expr_start = offset + open;
                if expr_start > text_start {
                    pieces.push(Piece::Text(&input[text_start..expr_start]));
                }
                pieces.push(Piece::Expr(path));
                text_start = offset + consumed;
                consumed
            }
            None => open + OPEN.len(),
        };

        offset += advance;
        rest = &rest[advance..];
    }

    if text_start < input.len() {
        pieces.push(Piece::Text(&input[text_start..]));
    }
    pieces
}

fn parse_path(inner: &str) -> Option<Vec<&str>> {
    let body = inner.strip_prefix('.')?;
    let segments: Vec<&str> = body.split('.').collect();
    segments
        .iter()
        .all(|segment| !segment.is_empty() && segment.chars().all(is_segment_char))
        .then_some(segments)
}

fn is_segment_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}
