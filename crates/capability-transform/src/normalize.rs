//! Variable-name normalization (spec §4.3): using the analyzed graph's `variableBindings`,
//! every occurrence of a tracked name is renamed to `_<nodeId>` so the semantic hash is
//! invariant to the author's choice of variable names (spec §8 "Semantic-hash invariance").

use capability_core::types::NodeId;
use regex::Regex;
use std::cmp::Reverse;
use std::collections::HashMap;

/// Renames every tracked binding in `source`, longest name first (spec §4.3: "to avoid partial
/// replacements" -- e.g. renaming `user` before `userRecord` would corrupt `userRecord`).
pub fn normalize(source: &str, variable_bindings: &HashMap<String, NodeId>) -> String {
    let mut names: Vec<&String> = variable_bindings.keys().collect();
    names.sort_by_key(|name| Reverse(name.len()));

    let mut result = source.to_string();
    for name in names {
        let node_id = &variable_bindings[name];
        let Ok(pattern) = Regex::new(&format!(r"\b{}\b", regex::escape(name))) else {
            continue;
        };
        result = replace_word_not_after_dot(&result, &pattern, &format!("_{}", node_id.0));
    }
    result
}

/// Applies a `\bname\b` match, skipping any occurrence immediately preceded by `.` (spec §4.3:
/// "negative look-behind on `.` to avoid property accesses"). The `regex` crate has no
/// look-behind support, so the check is done manually against the byte just before each match.
fn replace_word_not_after_dot(source: &str, pattern: &Regex, replacement: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut last_end = 0;
    for m in pattern.find_iter(source) {
        out.push_str(&source[last_end..m.start()]);
        if source[..m.start()].ends_with('.') {
            out.push_str(m.as_str());
        } else {
            out.push_str(replacement);
        }
        last_end = m.end();
    }
    out.push_str(&source[last_end..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renames_a_tracked_variable_but_not_its_property_accesses() {
        let mut bindings = HashMap::new();
        bindings.insert("user".to_string(), NodeId("n1".to_string()));
        let source = "const user = await mcp.users.fetch({}); notify(user.email);";
        let renamed = normalize(source, &bindings);
        assert!(renamed.contains("const _n1 ="));
        assert!(renamed.contains("notify(_n1.email)"));
        assert!(renamed.contains(".users.fetch"));
    }

    #[test]
    fn processes_longest_names_first_to_avoid_partial_replacement() {
        let mut bindings = HashMap::new();
        bindings.insert("user".to_string(), NodeId("n1".to_string()));
        bindings.insert("userRecord".to_string(), NodeId("n2".to_string()));
        let source = "const userRecord = user;";
        let renamed = normalize(source, &bindings);
        assert_eq!(renamed, "const _n2 = _n1;");
    }
}
