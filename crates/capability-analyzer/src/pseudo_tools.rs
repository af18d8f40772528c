//! The closed, versioned `code:<op>` pseudo-tool namespace (spec §4.1 "Pure-operation
//! pseudo-tools", §6 "Pseudo-tool namespace").

/// Array methods that become `code:<method>` pseudo-tools.
pub const ARRAY_METHODS: &[&str] = &[
    "filter", "map", "reduce", "flatMap", "find", "findIndex", "some", "every", "sort", "reverse",
    "slice", "concat", "join", "includes", "indexOf", "lastIndexOf",
];

/// String methods that become `code:<method>` pseudo-tools.
pub const STRING_METHODS: &[&str] = &[
    "split",
    "replace",
    "replaceAll",
    "trim",
    "trimStart",
    "trimEnd",
    "toLowerCase",
    "toUpperCase",
    "substring",
    "substr",
    "match",
    "matchAll",
];

/// `Object.<method>` static calls that become `code:<method>` pseudo-tools.
pub const OBJECT_STATIC_METHODS: &[&str] = &["keys", "values", "entries", "fromEntries", "assign"];

/// `Math.<method>` static calls that become `code:<method>` pseudo-tools.
pub const MATH_STATIC_METHODS: &[&str] = &["max", "min", "abs", "floor", "ceil", "round"];

/// `JSON.<method>` static calls that become `code:<method>` pseudo-tools.
pub const JSON_STATIC_METHODS: &[&str] = &["parse", "stringify"];

/// Binary operator token -> pseudo-tool operation name (spec §6: "`add`, `subtract`, ...,
/// `unsignedRightShift`").
pub fn binary_operator_name(op: &str) -> Option<&'static str> {
    Some(match op {
        "+" => "add",
        "-" => "subtract",
        "*" => "multiply",
        "/" => "divide",
        "%" => "modulo",
        "**" => "exponentiate",
        "==" => "looseEquals",
        "===" => "strictEquals",
        "!=" => "looseNotEquals",
        "!==" => "strictNotEquals",
        "<" => "lessThan",
        "<=" => "lessThanOrEqual",
        ">" => "greaterThan",
        ">=" => "greaterThanOrEqual",
        "&&" => "logicalAnd",
        "||" => "logicalOr",
        "&" => "bitwiseAnd",
        "|" => "bitwiseOr",
        "^" => "bitwiseXor",
        "<<" => "leftShift",
        ">>" => "rightShift",
        ">>>" => "unsignedRightShift",
        _ => return None,
    })
}

pub fn is_array_method(name: &str) -> bool {
    ARRAY_METHODS.contains(&name)
}

pub fn is_string_method(name: &str) -> bool {
    STRING_METHODS.contains(&name)
}

/// Resolves `Object.x` / `Math.x` / `JSON.x` into a `code:x` pseudo-tool id, if `x` is one of
/// the recognized static methods for that namespace.
pub fn static_namespace_method(namespace: &str, method: &str) -> Option<String> {
    let recognized = match namespace {
        "Object" => OBJECT_STATIC_METHODS.contains(&method),
        "Math" => MATH_STATIC_METHODS.contains(&method),
        "JSON" => JSON_STATIC_METHODS.contains(&method),
        _ => false,
    };
    recognized.then(|| format!("code:{method}"))
}

pub fn pseudo_tool_id(op: &str) -> String {
    format!("code:{op}")
}
