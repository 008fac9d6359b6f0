use std::fs;
use std::path::Path;

use crate::errors::CommandError;
use tera::{Context, Tera};

/// A template embedded in the binary: its `.j2.` file name and content.
pub struct EmbeddedTemplate {
    pub file_name: &'static str,
    pub content: &'static str,
}

pub struct RenderedTemplate {
    pub file_name: String,
    pub content: String,
}

fn tera_error_message(err: &tera::Error) -> String {
    let mut message = match &err.kind {
        tera::ErrorKind::TemplateNotFound(x) => format!("template not found: {x}"),
        tera::ErrorKind::Msg(x) => format!("tera error: {x}"),
        tera::ErrorKind::FilterNotFound(x) => format!("filter not found: {x}"),
        tera::ErrorKind::TestNotFound(x) => format!("test not found: {x}"),
        tera::ErrorKind::FunctionNotFound(x) => format!("function not found: {x}"),
        tera::ErrorKind::Json(x) => format!("json error: {x:?}"),
        tera::ErrorKind::CallFilter(x) => format!("call filter: {x}"),
        tera::ErrorKind::CallTest(x) => format!("call test: {x}"),
        other => format!("{other:?}"),
    };

    // rendering errors carry the real cause in their source chain
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message = format!("{message}: {cause}");
        source = cause.source();
    }

    message
}

/// Renders every template, `name.j2.ext` becoming `name.ext`.
pub fn render_templates(templates: &[EmbeddedTemplate], context: &Context) -> Result<Vec<RenderedTemplate>, CommandError> {
    let mut tera = Tera::default();
    tera.add_raw_templates(templates.iter().map(|t| (t.file_name, t.content)))
        .map_err(|e| CommandError::new("Invalid template.".to_string(), Some(tera_error_message(&e)), None))?;

    templates
        .iter()
        .map(|t| {
            let content = tera.render(t.file_name, context).map_err(|e| {
                CommandError::new(
                    format!("Cannot render template `{}`.", t.file_name),
                    Some(tera_error_message(&e)),
                    None,
                )
            })?;

            Ok(RenderedTemplate {
                file_name: t.file_name.replace(".j2", ""),
                content,
            })
        })
        .collect()
}

pub fn write_rendered_templates(rendered_templates: &[RenderedTemplate], into: &Path) -> Result<(), CommandError> {
    fs::create_dir_all(into).map_err(|e| {
        CommandError::new(
            "Error while creating template destination directory.".to_string(),
            Some(e.to_string()),
            None,
        )
    })?;

    for rt in rendered_templates {
        fs::write(into.join(&rt.file_name), rt.content.as_bytes()).map_err(|e| {
            CommandError::new(
                format!("Error while writing rendered template `{}`.", rt.file_name),
                Some(e.to_string()),
                None,
            )
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_and_write() {
        let templates = [EmbeddedTemplate {
            file_name: "greeting.j2.txt",
            content: "hello {{ name }}",
        }];
        let mut context = Context::new();
        context.insert("name", "workshop");

        let rendered = render_templates(&templates, &context).expect("rendered");
        assert_eq!(rendered[0].file_name, "greeting.txt");
        assert_eq!(rendered[0].content, "hello workshop");

        let dir = tempfile::tempdir().expect("temp dir");
        write_rendered_templates(&rendered, dir.path()).expect("written");
        assert_eq!(
            fs::read_to_string(dir.path().join("greeting.txt")).expect("readable"),
            "hello workshop"
        );
    }

    #[test]
    fn test_missing_variable_is_an_error() {
        let templates = [EmbeddedTemplate {
            file_name: "greeting.j2.txt",
            content: "hello {{ name }}",
        }];

        let err = render_templates(&templates, &Context::new()).err().expect("render must fail");

        assert_eq!(err.message_safe(), "Cannot render template `greeting.j2.txt`.");
        assert!(err.message_raw().unwrap_or_default().contains("name"));
    }
}
