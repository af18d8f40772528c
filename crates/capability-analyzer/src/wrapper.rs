//! Normalizes a free-form snippet into something `tree-sitter-javascript` can always parse as
//! a single program (spec §4.1: analyzed snippets are bodies, not necessarily full programs —
//! bare `await`, a trailing `return`, or a sequence of statements with no enclosing function are
//! all valid input).

/// Wraps `source` in an async IIFE unless it already looks like a complete expression/program
/// tree-sitter can parse on its own. Wrapping is purely a parse aid: the wrapped prefix/suffix
/// never appears in any produced `Node`, since node identity comes from AST structure, not byte
/// offsets into the original text.
pub fn wrap_for_parsing(source: &str) -> String {
    format!("(async function () {{\n{source}\n}});")
}
