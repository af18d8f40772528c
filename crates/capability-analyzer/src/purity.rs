//! Forbidden-pattern validator for inline `code` bodies attached to pure-operation pseudo-tool
//! nodes (spec §4.1 "Pure-operation pseudo-tools": "reject snippets containing `await`, `this`,
//! module access, or I/O-shaped calls").

const FORBIDDEN_SUBSTRINGS: &[&str] = &[
    "await ",
    "async ",
    "this.",
    "import ",
    "require(",
    "process.",
    "fetch(",
    "new Promise",
    ".then(",
    "fs.",
    "child_process",
    "eval(",
    "Function(",
    "XMLHttpRequest",
    "document.",
    "window.",
];

/// `true` when `code` contains none of the forbidden patterns, i.e. it is safe to treat as a
/// pure, synchronous, side-effect-free expression.
pub fn is_pure(code: &str) -> bool {
    !FORBIDDEN_SUBSTRINGS.iter().any(|pat| code.contains(pat))
}

/// Returns the first forbidden pattern found, for diagnostics.
pub fn first_violation(code: &str) -> Option<&'static str> {
    FORBIDDEN_SUBSTRINGS.iter().find(|pat| code.contains(*pat)).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_arithmetic_is_pure() {
        assert!(is_pure("a + b * 2"));
    }

    #[test]
    fn await_is_rejected() {
        assert!(!is_pure("await fetchThing()"));
        assert_eq!(first_violation("await fetchThing()"), Some("await "));
    }

    #[test]
    fn this_access_is_rejected() {
        assert!(!is_pure("this.total"));
    }
}
