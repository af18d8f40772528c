//! Applies a batch of independent text edits against the original source in one pass (spec
//! §4.3: "reverse-order splicing to preserve offsets"). Edits must describe disjoint byte
//! ranges; applying them back-to-front means an earlier edit's replacement never shifts the
//! still-pending byte offsets of the ones that come before it in the source.

pub struct Edit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

pub fn apply_edits(source: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by(|a, b| b.start.cmp(&a.start));
    let mut result = source.to_string();
    for edit in edits {
        if edit.start <= edit.end && edit.end <= result.len() && result.is_char_boundary(edit.start) && result.is_char_boundary(edit.end) {
            result.replace_range(edit.start..edit.end, &edit.replacement);
        }
    }
    result
}
