//! Source positions and nom error conversion
//!
//! Parsers work on byte offsets; everything reported to callers is a 1-based
//! line/column pair counted in characters.

use nom::error::{VerboseError, VerboseErrorKind};

use crate::error::{ParseError, SourceLocation};

/// Convert a byte offset to a 1-based (line, column) pair.
pub fn byte_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1usize;
    let mut col = 1usize;

    for (i, c) in source.char_indices() {
        if i >= offset {
            break;
        }
        if c == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }

    (line, col)
}

/// Precomputed line starts so node locations stay cheap on long documents.
#[derive(Debug, Clone)]
pub(crate) struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            source,
            line_starts,
        }
    }

    /// Byte offset of `rest`, which must be a suffix of the indexed source.
    pub(crate) fn offset_of(&self, rest: &str) -> usize {
        self.source.len().saturating_sub(rest.len())
    }

    pub(crate) fn location(&self, offset: usize) -> SourceLocation {
        let offset = offset.min(self.source.len());
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let line_start = self
            .line_starts
            .get(line.saturating_sub(1))
            .copied()
            .unwrap_or(0);
        let column = self
            .source
            .get(line_start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(0)
            + 1;
        SourceLocation::new(line.max(1), column, offset)
    }

    /// Location of the first character of `rest`.
    pub(crate) fn locate(&self, rest: &str) -> SourceLocation {
        self.location(self.offset_of(rest))
    }
}

/// Describe what sits at the failure point, for "found ..." messages.
pub(crate) fn describe_found(rest: &str) -> String {
    match rest.chars().next() {
        None => "end of input".to_string(),
        Some(c) if c.is_whitespace() => "whitespace".to_string(),
        Some(c) => format!("'{}'", c),
    }
}

/// Turn a nom failure into a positioned `ParseError`.
///
/// The first entry of a `VerboseError` is where matching actually failed; the
/// first `Context` entry names the construct that was expected there.
pub(crate) fn convert_error(index: &LineIndex<'_>, error: &VerboseError<&str>) -> ParseError {
    let Some((at, kind)) = error.errors.first() else {
        return ParseError::new(1, 1, "unknown parse failure");
    };

    let location = index.locate(at);
    let found = describe_found(at);
    let expected = error.errors.iter().find_map(|(_, k)| match k {
        VerboseErrorKind::Context(ctx) => Some(*ctx),
        _ => None,
    });

    let message = match (expected, kind) {
        (Some(ctx), _) => format!("expected {}, found {}", ctx, found),
        (None, VerboseErrorKind::Char(c)) => format!("expected '{}', found {}", c, found),
        (None, VerboseErrorKind::Nom(kind)) => {
            format!("unexpected {} ({})", found, kind.description())
        }
        (None, VerboseErrorKind::Context(ctx)) => format!("expected {}, found {}", ctx, found),
    };

    ParseError::new(location.line, location.column, message)
}
