//! Delimiter splitting shared by template placeholders and input references.
//!
//! A string is cut into literal runs and delimited markers. Literal runs are
//! kept byte for byte, so joining the segments back with their delimiters
//! reproduces the input.

/// Part of a split string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Text outside any marker
    Literal(String),
    /// Content between an opening and closing delimiter
    Marker(String),
}

/// How the content of a marker is scanned for its closing delimiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nesting {
    /// The first closing delimiter ends the marker
    Flat,
    /// Parentheses, brackets and quotes inside the marker are balanced first
    Balanced,
}

/// Split failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SplitError {
    /// Opening delimiter without a closing one
    #[error("unterminated marker starting at byte {start}")]
    Unterminated {
        /// Byte offset of the opening delimiter
        start: usize,
    },

    /// Opening delimiter inside an unfinished marker
    #[error("marker starting at byte {start} contains another opening delimiter at byte {at}")]
    Nested {
        /// Byte offset of the outer opening delimiter
        start: usize,
        /// Byte offset of the inner opening delimiter
        at: usize,
    },
}

impl Segment {
    /// Text of the segment as it appeared in the source
    #[must_use]
    pub fn source(&self, open: &str, close: &str) -> String {
        match self {
            Self::Literal(s) => s.clone(),
            Self::Marker(s) => format!("{}{}{}", open, s, close),
        }
    }
}

/// Split `s` into literal and marker segments.
///
/// Empty literal runs are omitted. An empty marker (`open` directly followed
/// by `close`) yields `Marker("")`, rejecting it is up to the caller.
///
/// # Errors
///
/// Returns error if a marker is never closed, or if a marker contains
/// another opening delimiter
pub fn split_delimited(
    s: &str,
    open: &str,
    close: &str,
    nesting: Nesting,
) -> Result<Vec<Segment>, SplitError> {
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut cursor = 0;

    while let Some(rel) = s[cursor..].find(open) {
        let start = cursor + rel;
        let body_start = start + open.len();
        let end = match nesting {
            Nesting::Flat => find_close_flat(s, start, body_start, open, close)?,
            Nesting::Balanced => find_close_balanced(s, start, body_start, open, close)?,
        };

        if start > literal_start {
            segments.push(Segment::Literal(s[literal_start..start].to_string()));
        }
        segments.push(Segment::Marker(s[body_start..end].to_string()));

        cursor = end + close.len();
        literal_start = cursor;
    }

    if literal_start < s.len() {
        segments.push(Segment::Literal(s[literal_start..].to_string()));
    }

    Ok(segments)
}

fn find_close_flat(
    s: &str,
    start: usize,
    body_start: usize,
    open: &str,
    close: &str,
) -> Result<usize, SplitError> {
    let rest = &s[body_start..];
    let close_at = rest.find(close).ok_or(SplitError::Unterminated { start })?;
    if let Some(open_at) = rest.find(open) {
        if open_at < close_at {
            return Err(SplitError::Nested {
                start,
                at: body_start + open_at,
            });
        }
    }
    Ok(body_start + close_at)
}

fn find_close_balanced(
    s: &str,
    start: usize,
    body_start: usize,
    open: &str,
    close: &str,
) -> Result<usize, SplitError> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for (offset, c) in s[body_start..].char_indices() {
        let pos = body_start + offset;

        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }

        if s[pos..].starts_with(open) {
            return Err(SplitError::Nested { start, at: pos });
        }
        if depth == 0 && s[pos..].starts_with(close) {
            return Ok(pos);
        }

        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    Err(SplitError::Unterminated { start })
}
