//! Field extraction: walks an OpenAPI document and produces the
//! `FieldRecord` inventory used by the Analyzer and by `SpecStore::diff`.
//!
//! Grounded on `original_source/src/core/consistency_analyzer.py`'s
//! `_extract_fields` / `_extract_schema_fields` / `_extract_path_fields`,
//! generalized with `$ref` resolution and a depth bound per the
//! specification's design notes (cyclic schemas are resolved via index
//! lookup against `components.schemas`, guarded by a visited set — never
//! materialised as a shared owning graph).

use std::collections::HashSet;

use serde_json::Value;

use crate::model::FieldRecord;

/// Default bound on traversal depth, preventing pathological documents
/// from exhausting the stack.
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Walks both traversal roots named in the specification and returns the
/// full field inventory for one document.
pub fn extract_fields(content: &Value, service: &str, namespace: &str) -> Vec<FieldRecord> {
    extract_fields_with_depth(content, service, namespace, DEFAULT_MAX_DEPTH)
}

pub fn extract_fields_with_depth(
    content: &Value,
    service: &str,
    namespace: &str,
    max_depth: usize,
) -> Vec<FieldRecord> {
    let mut fields = Vec::new();

    if let Some(schemas) = content
        .pointer("/components/schemas")
        .and_then(Value::as_object)
    {
        for (schema_name, schema_def) in schemas {
            let mut visited = HashSet::new();
            extract_schema_fields(
                schema_def,
                content,
                service,
                namespace,
                &format!("components.schemas.{schema_name}"),
                max_depth,
                &mut visited,
                &mut fields,
            );
        }
    }

    if let Some(paths) = content.pointer("/paths").and_then(Value::as_object) {
        for (path_name, path_def) in paths {
            extract_path_fields(
                path_def,
                content,
                service,
                namespace,
                &format!("paths.{path_name}"),
                max_depth,
                &mut fields,
            );
        }
    }

    fields
}

const HTTP_METHODS: &[&str] = &[
    "get", "put", "post", "delete", "patch", "head", "options", "trace",
];

fn extract_path_fields(
    path_def: &Value,
    root: &Value,
    service: &str,
    namespace: &str,
    path: &str,
    max_depth: usize,
    out: &mut Vec<FieldRecord>,
) {
    let Some(obj) = path_def.as_object() else {
        return;
    };

    for method in HTTP_METHODS {
        let Some(method_def) = obj.get(*method) else {
            continue;
        };

        if let Some(schema) = method_def.pointer("/requestBody/content") {
            walk_content_schemas(
                schema,
                root,
                service,
                namespace,
                &format!("{path}.{method}.requestBody.content"),
                max_depth,
                out,
            );
        }

        if let Some(responses) = method_def.get("responses").and_then(Value::as_object) {
            for (status, response_def) in responses {
                if let Some(content) = response_def.get("content") {
                    walk_content_schemas(
                        content,
                        root,
                        service,
                        namespace,
                        &format!("{path}.{method}.responses.{status}.content"),
                        max_depth,
                        out,
                    );
                }
            }
        }
    }
}

fn walk_content_schemas(
    content: &Value,
    root: &Value,
    service: &str,
    namespace: &str,
    path: &str,
    max_depth: usize,
    out: &mut Vec<FieldRecord>,
) {
    let Some(obj) = content.as_object() else {
        return;
    };
    for (content_type, content_def) in obj {
        if let Some(schema) = content_def.get("schema") {
            let mut visited = HashSet::new();
            extract_schema_fields(
                schema,
                root,
                service,
                namespace,
                &format!("{path}.{content_type}.schema"),
                max_depth,
                &mut visited,
                out,
            );
        }
    }
}

fn extract_schema_fields(
    schema: &Value,
    root: &Value,
    service: &str,
    namespace: &str,
    path: &str,
    depth_remaining: usize,
    visited: &mut HashSet<String>,
    out: &mut Vec<FieldRecord>,
) {
    if depth_remaining == 0 {
        return;
    }

    let schema = match schema.get("$ref").and_then(Value::as_str) {
        Some(ref_path) => {
            if !visited.insert(ref_path.to_string()) {
                return; // cycle: already visited this $ref
            }
            match resolve_ref(root, ref_path) {
                Some(resolved) => resolved,
                None => return,
            }
        }
        None => schema,
    };

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return;
    };

    let required: HashSet<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    for (field_name, field_def) in properties {
        let field_type = field_def
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        out.push(FieldRecord {
            name: field_name.clone(),
            r#type: field_type,
            format: field_def
                .get("format")
                .and_then(Value::as_str)
                .map(String::from),
            required: required.contains(field_name.as_str()),
            description: field_def
                .get("description")
                .and_then(Value::as_str)
                .map(String::from),
            service: service.to_string(),
            namespace: namespace.to_string(),
            location: format!("{path}.properties.{field_name}"),
        });

        // Nested objects descend breadth-first to the depth bound.
        if field_def.get("type").and_then(Value::as_str) == Some("object")
            || field_def.get("properties").is_some()
            || field_def.get("$ref").is_some()
        {
            extract_schema_fields(
                field_def,
                root,
                service,
                namespace,
                &format!("{path}.properties.{field_name}"),
                depth_remaining - 1,
                visited,
                out,
            );
        }
    }
}

/// Resolves a local `$ref` (e.g. `#/components/schemas/Patient`) against
/// the document root. Lazy: only called when a `$ref` is actually
/// encountered during traversal.
fn resolve_ref<'a>(root: &'a Value, ref_path: &str) -> Option<&'a Value> {
    let pointer = ref_path.strip_prefix('#')?;
    root.pointer(pointer)
}
