//! HTML templates.

use std::path::PathBuf;

use minijinja::Environment;

use crate::error::Result;

/// A named collection of HTML templates.
pub trait Templates: Send + Sync {
    /// Renders template `name` with `data` as its context.
    ///
    /// # Errors
    ///
    /// Unknown template or a rendering failure.
    fn render(&self, name: &str, data: &serde_json::Value) -> Result<String>;
}

/// Templates backed by a `minijinja` environment.
///
/// Templates ending in `.html` are auto-escaped.
#[derive(Debug, Default)]
pub struct JinjaTemplates {
    env: Environment<'static>,
}

impl JinjaTemplates {
    /// An empty collection; add sources with [`JinjaTemplates::add_template`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads templates lazily from files under `dir`, by relative path.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        let mut env = Environment::new();
        env.set_loader(minijinja::path_loader(dir.into()));
        Self { env }
    }

    /// Registers an inline template.
    ///
    /// # Errors
    ///
    /// The source does not parse.
    pub fn add_template(&mut self, name: impl Into<String>, source: impl Into<String>) -> Result<()> {
        self.env.add_template_owned(name.into(), source.into())?;
        Ok(())
    }

    /// The underlying environment, for registering filters and functions.
    pub fn environment_mut(&mut self) -> &mut Environment<'static> {
        &mut self.env
    }
}

impl Templates for JinjaTemplates {
    fn render(&self, name: &str, data: &serde_json::Value) -> Result<String> {
        Ok(self.env.get_template(name)?.render(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RouterError;

    #[test]
    fn test_inline_template() {
        let mut templates = JinjaTemplates::new();
        templates
            .add_template("list.html", "{% for s in students %}{{ s }};{% endfor %}")
            .unwrap();
        let out = templates
            .render("list.html", &serde_json::json!({"students": ["trueno", "jack"]}))
            .unwrap();
        assert_eq!(out, "trueno;jack;");
    }

    #[test]
    fn test_unknown_template() {
        let templates = JinjaTemplates::new();
        let err = templates.render("missing.html", &serde_json::Value::Null).unwrap_err();
        assert!(matches!(err, RouterError::Template(_)));
    }

    #[test]
    fn test_custom_function() {
        let mut templates = JinjaTemplates::new();
        templates
            .environment_mut()
            .add_function("shout", |s: String| s.to_uppercase());
        templates.add_template("f.html", "{{ shout(name) }}").unwrap();
        let out = templates
            .render("f.html", &serde_json::json!({"name": "pole"}))
            .unwrap();
        assert_eq!(out, "POLE");
    }

    #[test]
    fn test_directory_loader() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("css.tmpl"), "title={{ title }}").unwrap();
        let templates = JinjaTemplates::from_dir(dir.path());
        let out = templates
            .render("css.tmpl", &serde_json::json!({"title": "pole"}))
            .unwrap();
        assert_eq!(out, "title=pole");
    }
}
