//! Wraps a snippet for parsing the same way `capability-analyzer` does (bare `await`/`return`/
//! statement sequences need an enclosing function tree-sitter can parse), while keeping track of
//! the byte offset so spans can be translated back to the caller's original, unwrapped source.

pub struct Wrapped {
    pub text: String,
    pub offset: usize,
}

pub fn wrap(source: &str) -> Wrapped {
    let prefix = "(async function () {\n";
    let suffix = "\n});";
    Wrapped {
        text: format!("{prefix}{source}{suffix}"),
        offset: prefix.len(),
    }
}

/// Translates a byte position in wrapped text back to the original source, clamping at zero for
/// any position that falls inside the wrapper prefix itself (never produced for nodes inside the
/// body block, but defensive against a future caller passing the root node's own span).
pub fn to_original(byte: usize, offset: usize) -> usize {
    byte.saturating_sub(offset)
}
