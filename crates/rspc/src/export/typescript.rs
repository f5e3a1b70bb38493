//! Renders a [`ProceduresDef`] as a TypeScript module.
//!
//! Only the subset of JSON Schema that `schemars` emits for Rust types is
//! understood; anything else becomes `any`.

use std::fmt::Write;

use serde_json::Value;

use crate::model::{JsonObject, ProcedureDef, ProceduresDef};

pub const GENERATED_NOTICE: &str =
    "// This file was generated by rspc. Do not edit this file manually.";

pub fn render(procedures: &ProceduresDef, header: Option<&str>) -> String {
    let mut out = String::new();
    out.push_str(GENERATED_NOTICE);
    out.push('\n');
    if let Some(header) = header {
        out.push_str(header);
        out.push('\n');
    }
    out.push('\n');

    out.push_str("export type Procedures = {\n");
    for (name, defs) in [
        ("queries", &procedures.queries),
        ("mutations", &procedures.mutations),
        ("subscriptions", &procedures.subscriptions),
    ] {
        let _ = writeln!(out, "    {name}: {},", procedure_union(defs));
    }
    out.push_str("};\n");

    for (name, schema) in &procedures.definitions {
        out.push('\n');
        if let Some(description) = schema.get("description").and_then(Value::as_str) {
            let _ = writeln!(out, "/** {} */", description.replace("*/", "*\\/"));
        }
        let _ = writeln!(out, "export type {} = {};", identifier(name), to_type(schema));
    }
    out
}

fn procedure_union(defs: &[ProcedureDef]) -> String {
    if defs.is_empty() {
        return "never".to_owned();
    }
    defs.iter()
        .map(|def| {
            let input = if is_null_schema(&def.input) {
                "never".to_owned()
            } else {
                to_type(&def.input)
            };
            format!(
                "{{ key: {}, input: {}, result: {} }}",
                literal(&Value::String(def.key.clone())),
                input,
                to_type(&def.result)
            )
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Procedures taking `()` are called without an input.
fn is_null_schema(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("null")
}

/// Converts one JSON Schema into a TypeScript type expression.
pub fn to_type(schema: &Value) -> String {
    match schema {
        Value::Bool(true) => "any".to_owned(),
        Value::Bool(false) => "never".to_owned(),
        Value::Object(object) => object_to_type(object),
        _ => "any".to_owned(),
    }
}

fn object_to_type(schema: &JsonObject) -> String {
    if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
        let name = reference.rsplit('/').next().unwrap_or(reference);
        return identifier(name);
    }
    if let Some(value) = schema.get("const") {
        return literal(value);
    }
    if let Some(Value::Array(values)) = schema.get("enum") {
        return union(values.iter().map(literal));
    }
    if let Some(combined) = combinator_type(schema) {
        // flattened enums put their variants next to the struct's own fields
        return if has_own_fields(schema) {
            format!("{} & {}", object_type(schema), grouped(combined))
        } else {
            combined
        };
    }
    match schema.get("type") {
        Some(Value::String(ty)) => typed(ty, schema),
        Some(Value::Array(types)) => union(
            types
                .iter()
                .filter_map(Value::as_str)
                .map(|ty| typed(ty, schema)),
        ),
        _ if schema.contains_key("properties") => typed("object", schema),
        _ => "any".to_owned(),
    }
}

fn combinator_type(schema: &JsonObject) -> Option<String> {
    if let Some(Value::Array(variants)) = schema.get("oneOf").or_else(|| schema.get("anyOf")) {
        return Some(union(variants.iter().map(to_type)));
    }
    match schema.get("allOf") {
        Some(Value::Array(parts)) => Some(intersection(parts.iter().map(to_type))),
        _ => None,
    }
}

fn has_own_fields(schema: &JsonObject) -> bool {
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .is_some_and(|properties| !properties.is_empty());
    let additional = !matches!(
        schema.get("additionalProperties"),
        None | Some(Value::Bool(false))
    );
    properties || additional
}

fn typed(ty: &str, schema: &JsonObject) -> String {
    match ty {
        "string" => "string".to_owned(),
        "number" | "integer" => "number".to_owned(),
        "boolean" => "boolean".to_owned(),
        "null" => "null".to_owned(),
        "array" => array_type(schema),
        "object" => object_type(schema),
        _ => "any".to_owned(),
    }
}

fn array_type(schema: &JsonObject) -> String {
    if let Some(Value::Array(items)) = schema.get("prefixItems") {
        let items = items.iter().map(to_type).collect::<Vec<_>>();
        return format!("[{}]", items.join(", "));
    }
    match schema.get("items") {
        Some(items) => format!("{}[]", grouped(to_type(items))),
        None => "any[]".to_owned(),
    }
}

fn object_type(schema: &JsonObject) -> String {
    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|required| required.iter().filter_map(Value::as_str).collect::<Vec<_>>())
        .unwrap_or_default();
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .filter(|properties| !properties.is_empty());
    let additional = match schema.get("additionalProperties") {
        Some(Value::Bool(false)) | None => None,
        Some(additional) => Some(to_type(additional)),
    };

    let fields = properties.map(|properties| {
        let fields = properties
            .iter()
            .map(|(name, property)| {
                let optional = if required.contains(&name.as_str()) { "" } else { "?" };
                format!("{}{optional}: {}", property_name(name), to_type(property))
            })
            .collect::<Vec<_>>();
        format!("{{ {} }}", fields.join("; "))
    });
    let record = additional.map(|value| format!("{{ [key in string]: {value} }}"));

    match (fields, record) {
        (Some(fields), Some(record)) => format!("{fields} & {record}"),
        (Some(fields), None) => fields,
        (None, Some(record)) => record,
        (None, None) => "Record<string, any>".to_owned(),
    }
}

fn union(members: impl Iterator<Item = String>) -> String {
    let mut seen = Vec::new();
    for member in members {
        if !seen.contains(&member) {
            seen.push(member);
        }
    }
    match seen.len() {
        0 => "never".to_owned(),
        _ => seen.join(" | "),
    }
}

fn intersection(members: impl Iterator<Item = String>) -> String {
    let members = members.map(grouped).collect::<Vec<_>>();
    match members.len() {
        0 => "any".to_owned(),
        _ => members.join(" & "),
    }
}

/// Wraps compound types so postfix `[]` and `&` bind to the whole type.
fn grouped(ty: String) -> String {
    if ty.contains(" | ") || ty.contains(" & ") {
        format!("({ty})")
    } else {
        ty
    }
}

fn literal(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "any".to_owned())
}

fn property_name(name: &str) -> String {
    if is_identifier(name) {
        name.to_owned()
    } else {
        literal(&Value::String(name.to_owned()))
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Definition names such as `Paginated_for_User` are already valid; anything
/// else has its offending characters replaced.
pub fn identifier(name: &str) -> String {
    let mut ident: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '$' { c } else { '_' })
        .collect();
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::model::ProcedureKind;

    #[test]
    fn test_primitives() {
        assert_eq!(to_type(&json!({ "type": "string" })), "string");
        assert_eq!(to_type(&json!({ "type": "integer", "format": "uint32" })), "number");
        assert_eq!(to_type(&json!({ "type": "boolean" })), "boolean");
        assert_eq!(to_type(&json!({ "type": "null" })), "null");
        assert_eq!(to_type(&json!(true)), "any");
        assert_eq!(to_type(&json!({})), "any");
    }

    #[test]
    fn test_nullable_and_arrays() {
        assert_eq!(to_type(&json!({ "type": ["string", "null"] })), "string | null");
        assert_eq!(
            to_type(&json!({ "type": "array", "items": { "type": ["integer", "null"] } })),
            "(number | null)[]"
        );
        assert_eq!(
            to_type(&json!({
                "type": "array",
                "prefixItems": [{ "type": "string" }, { "type": "integer" }],
                "minItems": 2,
                "maxItems": 2
            })),
            "[string, number]"
        );
    }

    #[test]
    fn test_objects() {
        let schema = json!({
            "type": "object",
            "properties": {
                "display-name": { "type": "string" },
                "id": { "type": "integer" },
                "nickname": { "type": ["string", "null"] }
            },
            "required": ["id", "display-name"]
        });
        assert_eq!(
            to_type(&schema),
            "{ \"display-name\": string; id: number; nickname?: string | null }"
        );
        assert_eq!(
            to_type(&json!({ "type": "object", "additionalProperties": { "type": "integer" } })),
            "{ [key in string]: number }"
        );
        assert_eq!(to_type(&json!({ "type": "object" })), "Record<string, any>");
    }

    #[test]
    fn test_references_and_enums() {
        assert_eq!(to_type(&json!({ "$ref": "#/$defs/User" })), "User");
        assert_eq!(
            to_type(&json!({ "type": "string", "enum": ["Admin", "Member"] })),
            "\"Admin\" | \"Member\""
        );
        assert_eq!(
            to_type(&json!({
                "oneOf": [
                    { "type": "string", "const": "Idle" },
                    { "type": "object", "properties": { "Busy": { "type": "integer" } }, "required": ["Busy"] }
                ]
            })),
            "\"Idle\" | { Busy: number }"
        );
        assert_eq!(
            to_type(&json!({ "anyOf": [{ "$ref": "#/$defs/User" }, { "type": "null" }] })),
            "User | null"
        );
    }

    #[test]
    fn test_fields_next_to_variants() {
        let schema = json!({
            "type": "object",
            "properties": { "id": { "type": "integer", "format": "uint32" } },
            "required": ["id"],
            "oneOf": [
                {
                    "type": "object",
                    "properties": { "r": { "type": "number" }, "type": { "type": "string", "const": "Circle" } },
                    "required": ["type", "r"]
                },
                {
                    "type": "object",
                    "properties": { "side": { "type": "number" }, "type": { "type": "string", "const": "Square" } },
                    "required": ["type", "side"]
                }
            ]
        });
        assert_eq!(
            to_type(&schema),
            "{ id: number } & ({ r: number; type: \"Circle\" } | { side: number; type: \"Square\" })"
        );
        assert_eq!(
            to_type(&json!({
                "properties": { "id": { "type": "integer" } },
                "required": ["id"],
                "allOf": [{ "$ref": "#/$defs/Audit" }]
            })),
            "{ id: number } & Audit"
        );
    }

    #[test]
    fn test_identifier() {
        assert_eq!(identifier("Paginated_for_User"), "Paginated_for_User");
        assert_eq!(identifier("Wrapper<T>"), "Wrapper_T_");
        assert_eq!(identifier("3d"), "_3d");
    }

    #[test]
    fn test_render() {
        let procedures = ProceduresDef {
            queries: vec![
                ProcedureDef {
                    key: "getUser".into(),
                    kind: ProcedureKind::Query,
                    input: json!({ "type": "integer" }),
                    result: json!({ "$ref": "#/$defs/User" }),
                },
                ProcedureDef {
                    key: "version".into(),
                    kind: ProcedureKind::Query,
                    input: json!({ "type": "null" }),
                    result: json!({ "type": "string" }),
                },
            ],
            mutations: vec![],
            subscriptions: vec![],
            definitions: BTreeMap::from([(
                "User".to_owned(),
                json!({
                    "description": "A registered user",
                    "type": "object",
                    "properties": { "name": { "type": "string" } },
                    "required": ["name"]
                }),
            )]),
        };
        let rendered = render(&procedures, Some("// custom header"));
        let expected = "\
// This file was generated by rspc. Do not edit this file manually.
// custom header

export type Procedures = {
    queries: { key: \"getUser\", input: number, result: User } | { key: \"version\", input: never, result: string },
    mutations: never,
    subscriptions: never,
};

/** A registered user */
export type User = { name: string };
";
        assert_eq!(rendered, expected);
    }
}
