//! Evaluates template strings against an execution context.

use serde_json::Value;

use super::parser::{parse, Piece};
use crate::context::{Data, ExecutionContext};
use crate::errors::TemplateError;

const STEPS_NAMESPACE: &str = "steps";
const TRIGGER_NAMESPACE: &str = "trigger";

/// Resolves `{{ .path }}` expressions in strings and JSON values.
///
/// The resolver holds no state and is safe to share between runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateResolver;

impl TemplateResolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Resolves every expression in `input` and returns the rendered string.
    ///
    /// Strings without expressions are returned unchanged.
    pub fn resolve(&self, input: &str, ctx: &ExecutionContext) -> Result<String, TemplateError> {
        let pieces = parse(input);
        if !pieces.iter().any(|p| matches!(p, Piece::Expr(_))) {
            return Ok(input.to_string());
        }

        let mut out = String::with_capacity(input.len());
        for piece in pieces {
            match piece {
                Piece::Text(text) => out.push_str(text),
                Piece::Expr(path) => out.push_str(&render(&self.lookup_segments(&path, ctx)?)),
            }
        }
        Ok(out)
    }

    /// Resolves a JSON value.
    ///
    /// A string made of exactly one expression yields the referenced value
    /// with its JSON type intact. Other strings are rendered. Objects and
    /// arrays are resolved recursively and other values are returned as is.
    pub fn resolve_value(
        &self,
        value: &Value,
        ctx: &ExecutionContext,
    ) -> Result<Value, TemplateError> {
        match value {
            Value::String(s) => {
                let mut pieces = parse(s);
                if pieces.len() == 1 {
                    if let Some(Piece::Expr(path)) = pieces.pop() {
                        return self.lookup_segments(&path, ctx);
                    }
                }
                self.resolve(s, ctx).map(Value::String)
            }
            Value::Object(map) => self.resolve_map(map, ctx).map(Value::Object),
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve_value(item, ctx))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    /// Resolves every leaf of a mapping.
    ///
    /// Errors are wrapped with the key they occurred under.
    pub fn resolve_map(&self, map: &Data, ctx: &ExecutionContext) -> Result<Data, TemplateError> {
        map.iter()
            .map(|(key, value)| {
                self.resolve_value(value, ctx)
                    .map(|resolved| (key.clone(), resolved))
                    .map_err(|e| e.in_field(key))
            })
            .collect()
    }

    /// Looks up a dotted path such as `steps.fetch.items`.
    ///
    /// A leading dot is accepted.
    pub fn lookup(&self, path: &str, ctx: &ExecutionContext) -> Result<Value, TemplateError> {
        let trimmed = path.trim();
        let body = trimmed.strip_prefix('.').unwrap_or(trimmed);
        let segments: Vec<&str> = body.split('.').collect();
        self.lookup_segments(&segments, ctx)
    }

    fn lookup_segments(
        &self,
        segments: &[&str],
        ctx: &ExecutionContext,
    ) -> Result<Value, TemplateError> {
        let path = segments.join(".");
        let not_found = |segment: &str| TemplateError::PathNotFound {
            path: path.clone(),
            segment: segment.to_string(),
        };

        let Some((first, rest)) = segments.split_first() else {
            return Err(not_found(""));
        };

        match *first {
            STEPS_NAMESPACE => {
                let Some((step, rest)) = rest.split_first() else {
                    let all: Data = ctx
                        .step_outputs()
                        .iter()
                        .map(|(name, output)| (name.clone(), Value::Object(output.clone())))
                        .collect();
                    return Ok(Value::Object(all));
                };
                let output = ctx.step_output(step).ok_or_else(|| not_found(*step))?;
                descend_map(output, rest, &path)
            }
            TRIGGER_NAMESPACE if !ctx.current().contains_key(TRIGGER_NAMESPACE) => {
                descend_map(ctx.trigger(), rest, &path)
            }
            key => {
                let value = ctx
                    .current()
                    .get(key)
                    .or_else(|| ctx.trigger().get(key))
                    .ok_or_else(|| not_found(key))?;
                descend(value, rest, &path)
            }
        }
    }
}

fn descend_map(map: &Data, segments: &[&str], path: &str) -> Result<Value, TemplateError> {
    let Some((first, rest)) = segments.split_first() else {
        return Ok(Value::Object(map.clone()));
    };
    let value = map.get(*first).ok_or_else(|| TemplateError::PathNotFound {
        path: path.to_string(),
        segment: (*first).to_string(),
    })?;
    descend(value, rest, path)
}

fn descend(value: &Value, segments: &[&str], path: &str) -> Result<Value, TemplateError> {
    match (value, segments.is_empty()) {
        (_, true) => Ok(value.clone()),
        (Value::Object(map), false) => descend_map(map, segments, path),
        (_, false) => Err(TemplateError::NotAMapping {
            path: path.to_string(),
            segment: segments[0].to_string(),
        }),
    }
}

/// Renders a value for string interpolation.
///
/// Strings are inserted raw, `null` renders empty, numbers and booleans use
/// their JSON text, and objects and arrays render as compact JSON.
#[must_use]
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn data(value: Value) -> Data {
        value.as_object().cloned().unwrap()
    }

    fn context() -> ExecutionContext {
        let mut ctx = ExecutionContext::new(data(json!({
            "order_id": "o-1",
            "user": {"name": "ada", "tags": ["a", "b"]},
            "count": 3
        })));
        ctx.merge_step_output(
            "fetch-user",
            data(json!({"id": 42, "items": [1, 2], "profile": {"email": "a@example.com"}})),
        )
        .unwrap();
        ctx.metadata_mut().insert("secret", "hidden");
        ctx
    }

    #[test]
    fn test_literal_strings_pass_through() {
        let ctx = context();
        let resolver = TemplateResolver::new();

        assert_eq!(resolver.resolve("plain", &ctx).unwrap(), "plain");
        assert_eq!(resolver.resolve("{{ not a path }}", &ctx).unwrap(), "{{ not a path }}");
        assert_eq!(resolver.resolve("", &ctx).unwrap(), "");
    }

    #[test]
    fn test_resolve_is_repeatable() {
        let ctx = context();
        let resolver = TemplateResolver::new();

        let first = resolver.resolve("{{.order_id}}", &ctx).unwrap();
        let second = resolver.resolve("{{.order_id}}", &ctx).unwrap();
        assert_eq!(first, "o-1");
        assert_eq!(first, second);
    }

    #[test]
    fn test_tight_and_spaced_delimiters() {
        let ctx = context();
        let resolver = TemplateResolver::new();

        assert_eq!(resolver.resolve("{{.user.name}}", &ctx).unwrap(), "ada");
        assert_eq!(resolver.resolve("{{ .user.name }}", &ctx).unwrap(), "ada");
    }

    #[test]
    fn test_interpolation_renders_scalars_and_json() {
        let ctx = context();
        let resolver = TemplateResolver::new();

        assert_eq!(
            resolver
                .resolve("order {{.order_id}} x{{ .count }} {{.user.tags}}", &ctx)
                .unwrap(),
            r#"order o-1 x3 ["a","b"]"#
        );
        assert_eq!(
            resolver.resolve("id={{ .steps.fetch-user.id }}", &ctx).unwrap(),
            "id=42"
        );
    }

    #[test]
    fn test_namespaces() {
        let mut ctx = context();
        ctx.set("order_id", "o-2");
        let resolver = TemplateResolver::new();

        assert_eq!(resolver.resolve("{{.order_id}}", &ctx).unwrap(), "o-2");
        assert_eq!(resolver.resolve("{{.trigger.order_id}}", &ctx).unwrap(), "o-1");
        assert_eq!(
            resolver.lookup("steps.fetch-user.profile.email", &ctx).unwrap(),
            json!("a@example.com")
        );
        assert!(resolver.lookup(".steps", &ctx).unwrap().get("fetch-user").is_some());
    }

    #[test]
    fn test_metadata_is_not_visible() {
        let ctx = context();
        let err = TemplateResolver::new().resolve("{{.secret}}", &ctx).unwrap_err();
        assert_eq!(
            err,
            TemplateError::PathNotFound {
                path: "secret".to_string(),
                segment: "secret".to_string()
            }
        );
    }

    #[test]
    fn test_missing_step_names_the_path() {
        let ctx = context();
        let err = TemplateResolver::new()
            .resolve("{{.steps.fetch.items}}", &ctx)
            .unwrap_err();

        assert_eq!(err.path(), "steps.fetch.items");
        assert!(err.to_string().contains("steps.fetch.items"));
    }

    #[test]
    fn test_traversal_through_scalar_fails() {
        let ctx = context();
        let err = TemplateResolver::new()
            .resolve("{{.order_id.value}}", &ctx)
            .unwrap_err();

        assert_eq!(
            err,
            TemplateError::NotAMapping {
                path: "order_id.value".to_string(),
                segment: "value".to_string()
            }
        );
    }

    #[test]
    fn test_resolve_value_preserves_types() {
        let ctx = context();
        let resolver = TemplateResolver::new();

        assert_eq!(
            resolver.resolve_value(&json!("{{.steps.fetch-user.items}}"), &ctx).unwrap(),
            json!([1, 2])
        );
        assert_eq!(resolver.resolve_value(&json!("{{ .count }}"), &ctx).unwrap(), json!(3));
        assert_eq!(
            resolver.resolve_value(&json!(" {{ .count }}"), &ctx).unwrap(),
            json!(" 3")
        );
        assert_eq!(resolver.resolve_value(&json!(true), &ctx).unwrap(), json!(true));
    }

    #[test]
    fn test_resolve_map_recurses() {
        let ctx = context();
        let input = data(json!({
            "id": "{{.order_id}}",
            "limit": 10,
            "nested": {"who": "{{ .user.name }}", "list": ["{{.count}}", "x"]}
        }));

        let resolved = TemplateResolver::new().resolve_map(&input, &ctx).unwrap();
        assert_eq!(
            Value::Object(resolved),
            json!({
                "id": "o-1",
                "limit": 10,
                "nested": {"who": "ada", "list": [3, "x"]}
            })
        );
    }

    #[test]
    fn test_resolve_map_error_names_field() {
        let ctx = context();
        let input = data(json!({"outer": {"inner": "{{.missing}}"}}));

        let err = TemplateResolver::new().resolve_map(&input, &ctx).unwrap_err();
        assert!(err.to_string().starts_with("field 'outer': field 'inner':"));
        assert_eq!(err.path(), "missing");
    }

    #[test]
    fn test_render() {
        assert_eq!(render(&json!(null)), "");
        assert_eq!(render(&json!(1.5)), "1.5");
        assert_eq!(render(&json!({"a": 1})), r#"{"a":1}"#);
    }
}
