//! Locating the config block inside free-form source text.

/// Tag that must directly follow the opening quote marker.
pub const BLOCK_TAG: &str = "backtest";

/// Block-quote marker style. The closing marker must match the opening one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Marker {
    /// `'''` (canonical)
    #[default]
    Single,
    /// `"""`
    Double,
}

impl Marker {
    pub fn as_str(self) -> &'static str {
        match self {
            Marker::Single => "'''",
            Marker::Double => "\"\"\"",
        }
    }

    fn at(rest: &str) -> Option<Self> {
        if rest.starts_with("'''") {
            Some(Marker::Single)
        } else if rest.starts_with("\"\"\"") {
            Some(Marker::Double)
        } else {
            None
        }
    }
}

/// Byte offsets of a located block.
///
/// `start..end` covers the whole block including both markers;
/// `body_start..body_end` is the `key: value` region between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    pub start: usize,
    pub end: usize,
    pub body_start: usize,
    pub body_end: usize,
    pub marker: Marker,
}

impl BlockSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn body<'a>(&self, text: &'a str) -> &'a str {
        &text[self.body_start..self.body_end]
    }
}

/// Find the first config block in `text`.
///
/// An opener is a marker, the tag, then a line break (`\n` or `\r\n`). The
/// block ends at the next occurrence of the same marker. An opener with no
/// closer is skipped and scanning continues after it.
pub fn locate(text: &str) -> Option<BlockSpan> {
    let bytes = text.as_bytes();

    for (pos, &b) in bytes.iter().enumerate() {
        if b != b'\'' && b != b'"' {
            continue;
        }
        // Quote bytes are ASCII, so `pos` is a char boundary.
        let rest = &text[pos..];
        let Some(marker) = Marker::at(rest) else {
            continue;
        };
        let Some(after_tag) = rest[3..].strip_prefix(BLOCK_TAG) else {
            continue;
        };
        let newline = if after_tag.starts_with('\n') {
            1
        } else if after_tag.starts_with("\r\n") {
            2
        } else {
            continue;
        };

        let body_start = pos + 3 + BLOCK_TAG.len() + newline;
        let Some(close) = text[body_start..].find(marker.as_str()) else {
            continue;
        };
        let body_end = body_start + close;

        return Some(BlockSpan {
            start: pos,
            end: body_end + 3,
            body_start,
            body_end,
            marker,
        });
    }

    None
}
