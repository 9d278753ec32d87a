//! File-based email body templates rendered with Handlebars
//!
//! Supports:
//! - Variables: `{{name}}` (HTML-escaped)
//! - Conditionals: `{{#if condition}}...{{/if}}`
//! - Loops: `{{#each items}}...{{/each}}`
//! - Raw HTML: `{{{unescaped}}}`
//!
//! Rendering is strict: referencing a variable that is missing from the data
//! is an error rather than an empty string.

use crate::error::TemplateError;
use handlebars::Handlebars;
use serde_json::Value;
use std::path::Path;

const BODY_TEMPLATE: &str = "body";

/// Read the template at `path` and render it against `data`.
pub fn render_template_file(path: &Path, data: &Value) -> Result<String, TemplateError> {
    let display = path.display().to_string();

    let source = std::fs::read_to_string(path).map_err(|source| TemplateError::Read {
        path: display.clone(),
        source,
    })?;

    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    handlebars
        .register_template_string(BODY_TEMPLATE, source)
        .map_err(|e| TemplateError::Parse {
            path: display.clone(),
            source: Box::new(e),
        })?;

    handlebars
        .render(BODY_TEMPLATE, data)
        .map_err(|e| TemplateError::Render {
            path: display,
            source: Box::new(e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn template_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_renders_and_escapes_variables() {
        let file = template_file("<p>Hello {{name}}, you have {{count}} alerts</p>");

        let data = json!({ "name": "<Ann>", "count": 3 });
        let body = render_template_file(file.path(), &data).unwrap();

        assert_eq!(body, "<p>Hello &lt;Ann&gt;, you have 3 alerts</p>");
    }

    #[test]
    fn test_renders_loops() {
        let file = template_file("<ul>{{#each hosts}}<li>{{this}}</li>{{/each}}</ul>");

        let data = json!({ "hosts": ["db-1", "db-2"] });
        let body = render_template_file(file.path(), &data).unwrap();

        assert_eq!(body, "<ul><li>db-1</li><li>db-2</li></ul>");
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = render_template_file(&dir.path().join("absent.html"), &json!({})).unwrap_err();
        assert!(matches!(err, TemplateError::Read { .. }));
        assert!(err.to_string().contains("absent.html"));
    }

    #[test]
    fn test_malformed_template_is_parse_error() {
        let file = template_file("{{#if ready}}never closed");
        let err = render_template_file(file.path(), &json!({ "ready": true })).unwrap_err();
        assert!(matches!(err, TemplateError::Parse { .. }));
    }

    #[test]
    fn test_missing_variable_is_render_error() {
        let file = template_file("Hello {{name}}");
        let err = render_template_file(file.path(), &json!({ "other": 1 })).unwrap_err();
        assert!(matches!(err, TemplateError::Render { .. }));
    }
}
