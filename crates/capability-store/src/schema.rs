//! Parameter-schema synthesis from a structure's operand positions (spec §4.4 step 2: "merge the
//! resulting parameter schema with any schema inferred from tool input-positions during
//! analysis"). The literal-lifting side of that merge lives in `capability_transform::literal`;
//! this module supplies the other half for parameters the observed snippet already referenced
//! directly (`args.x`) without ever going through literal lifting.

use capability_core::types::{NodeKind, StaticStructure};
use serde_json::{json, Map, Value};

/// Every `args.x` / `params.x` / `input.x` property name a task node's arguments reference
/// directly, each typed `string` (the analyzer does not infer JSON types from bare identifier
/// access) and marked required: the capability cannot run without a value at that call site.
pub fn schema_from_parameter_positions(structure: &StaticStructure) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for node in &structure.nodes {
        let NodeKind::Task { arguments: Some(args), .. } = &node.kind else {
            continue;
        };
        for value in args.values() {
            if let capability_core::types::ArgValue::Parameter { name } = value {
                if name.is_empty() {
                    continue;
                }
                let root = name.split(['.', '[']).next().unwrap_or(name);
                if !properties.contains_key(root) {
                    properties.insert(root.to_string(), json!({"type": "string"}));
                    required.push(root.to_string());
                }
            }
        }
    }
    json!({"type": "object", "properties": Value::Object(properties), "required": required})
}

/// Merges a literal-derived schema (from `capability_transform::literal::parameterize`) with one
/// inferred from operand positions (spec §4.4 step 2): "literal-derived properties and their
/// required status take precedence" -- a property's required-ness is decided entirely by
/// whichever schema defines the property, with the literal schema winning ties.
pub fn merge_parameter_schemas(literal_schema: &Value, positional_schema: &Value) -> Value {
    let mut properties = positional_schema["properties"].as_object().cloned().unwrap_or_default();
    let mut required: Vec<String> = positional_schema["required"]
        .as_array()
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    if let Some(literal_properties) = literal_schema["properties"].as_object() {
        for (name, schema) in literal_properties {
            properties.insert(name.clone(), schema.clone());
            required.retain(|r| r != name);
        }
        if let Some(literal_required) = literal_schema["required"].as_array() {
            for name in literal_required.iter().filter_map(|v| v.as_str()) {
                if !required.contains(&name.to_string()) {
                    required.push(name.to_string());
                }
            }
        }
    }

    json!({"type": "object", "properties": Value::Object(properties), "required": required})
}
