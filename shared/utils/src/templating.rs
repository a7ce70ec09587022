//! `{{ path.to.value }}` interpolation for workflow action configs and
//! notification bodies ("Syntax `{{ path.to.value }}` with optional
//! helpers (`uppercase`, `lowercase`). Unknown path ⇒ literal
//! passthrough. Malformed template ⇒ error, action fails.").
//!
//! A hand-rolled scanner rather than handlebars: handlebars renders a
//! missing variable as empty string, which disagrees with the "unknown
//! path passes through literally" rule this engine has to honor exactly
//! for the workflow executor's retry/failure semantics to be testable.

use crate::error::{BeaconError, BeaconResult};
use serde_json::Value;

/// Resolves a dotted path (`"incident.severity"`) against a JSON object
/// graph, walking one key per segment. `None` on any missing or
/// non-object segment.
pub fn resolve_path<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

enum Helper {
    None,
    Uppercase,
    Lowercase,
}

fn apply_helper(helper: &Helper, text: String) -> String {
    match helper {
        Helper::None => text,
        Helper::Uppercase => text.to_uppercase(),
        Helper::Lowercase => text.to_lowercase(),
    }
}

/// Renders every `{{ ... }}` placeholder in `template` against
/// `context`. An unbalanced `{{`/`}}` pair is the only malformed-template
/// case ("action fails"); everything else - an unknown path, an unknown
/// helper name - degrades to literal passthrough of the placeholder's
/// own text; only an unbalanced delimiter is treated as non-recoverable.
pub fn render(template: &str, context: &Value) -> BeaconResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    loop {
        let Some(start) = rest.find("{{") else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            return Err(BeaconError::validation("template", format!("unterminated '{{{{' in template: {template}")));
        };
        let inner = after_open[..end].trim();
        rest = &after_open[end + 2..];

        let (helper, path) = match inner.split_once(' ') {
            Some(("uppercase", p)) => (Helper::Uppercase, p.trim()),
            Some(("lowercase", p)) => (Helper::Lowercase, p.trim()),
            _ => (Helper::None, inner),
        };

        match resolve_path(context, path) {
            Some(value) => out.push_str(&apply_helper(&helper, value_as_text(value))),
            None => out.push_str(&format!("{{{{ {inner} }}}}")),
        }
    }

    Ok(out)
}

/// Walks every string leaf of `value` and renders it as a template
/// against `context`, returning a new JSON value with the results
/// substituted in. Used by the workflow engine to resolve an entire
/// node config object in one pass.
pub fn render_json(value: &Value, context: &Value) -> BeaconResult<Value> {
    match value {
        Value::String(s) => Ok(Value::String(render(s, context)?)),
        Value::Array(items) => {
            let rendered: Result<Vec<Value>, _> = items.iter().map(|v| render_json(v, context)).collect();
            Ok(Value::Array(rendered?))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), render_json(v, context)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_simple_placeholder() {
        let context = json!({"incident": {"title": "db down"}});
        let rendered = render("Incident: {{ incident.title }}", &context).unwrap();
        assert_eq!(rendered, "Incident: db down");
    }

    #[test]
    fn renders_nested_json_leaves() {
        let context = json!({"id": "abc"});
        let input = json!({"action": "notify", "target": "{{ id }}", "tags": ["{{ id }}-tag"]});
        let rendered = render_json(&input, &context).unwrap();
        assert_eq!(rendered["target"], "abc");
        assert_eq!(rendered["tags"][0], "abc-tag");
    }

    #[test]
    fn uppercase_and_lowercase_helpers_transform_the_resolved_value() {
        let context = json!({"incident": {"severity": "High"}});
        assert_eq!(render("{{uppercase incident.severity}}", &context).unwrap(), "HIGH");
        assert_eq!(render("{{lowercase incident.severity}}", &context).unwrap(), "high");
    }

    #[test]
    fn unknown_path_passes_through_literally() {
        let context = json!({"incident": {"title": "db down"}});
        let rendered = render("{{ incident.nonexistent }}", &context).unwrap();
        assert_eq!(rendered, "{{ incident.nonexistent }}");
    }

    #[test]
    fn unterminated_placeholder_is_a_malformed_template_error() {
        let context = json!({"incident": {"title": "db down"}});
        assert!(render("Incident: {{ incident.title", &context).is_err());
    }

    #[test]
    fn literal_text_with_no_placeholders_is_returned_unchanged() {
        let context = json!({});
        assert_eq!(render("no placeholders here", &context).unwrap(), "no placeholders here");
    }
}
