//! Placeholder-expression evaluation.
//!
//! The renderer wraps minijinja behind a narrow interface so the expression
//! syntax stays swappable: render text against a record's field mapping,
//! fail on any unresolved field. Undefined lookups are strict by design --
//! a missing field signals a template/database mismatch that likely affects
//! every record, so it must not silently render as an empty string.

use std::path::Path;

use minijinja::{Environment, UndefinedBehavior};

use crate::database::Record;
use crate::error::{MergeError, Result};

/// Evaluates `{{ ... }}` expressions against a record.
///
/// Purely functional: given the same (template, record, helper namespace),
/// rendering always produces the same output and has no side effects.
#[derive(Debug)]
pub struct Renderer {
    env: Environment<'static>,
}

impl Renderer {
    /// Create a renderer with no user-supplied helpers.
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }

    /// Create a renderer extended with helper definitions from a file.
    ///
    /// The file contains template macro definitions (`{% macro ... %}`).
    /// Each exported macro is injected into the global namespace so
    /// templates can call it without an explicit import.
    pub fn with_helpers(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| MergeError::io(path, e))?;

        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_template_owned("helpers".to_string(), source)
            .map_err(|e| MergeError::Template(format!("{}: {e:#}", path.display())))?;

        // Evaluate the helper template once and lift its exported macros
        // into globals.
        let exports: Vec<(String, minijinja::Value)> = {
            let template = env
                .get_template("helpers")
                .map_err(|e| MergeError::Template(format!("{}: {e:#}", path.display())))?;
            let state = template
                .eval_to_state(minijinja::context! {})
                .map_err(|e| MergeError::Template(format!("{}: {e:#}", path.display())))?;
            state
                .exports()
                .iter()
                .filter_map(|name| state.lookup(name).map(|v| (name.to_string(), v)))
                .collect()
        };
        for (name, value) in exports {
            env.add_global(name, value);
        }

        Ok(Self { env })
    }

    /// Render template text against one record.
    ///
    /// The record's field mapping is the only variable namespace (plus any
    /// helpers loaded at construction).
    pub fn render(&self, template_text: &str, record: &Record) -> Result<String> {
        self.env
            .render_str(template_text, record)
            .map_err(map_render_error)
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

fn map_render_error(err: minijinja::Error) -> MergeError {
    if err.kind() == minijinja::ErrorKind::UndefinedError {
        MergeError::UndefinedField(format!("{err:#}"))
    } else {
        MergeError::Template(format!("{err:#}"))
    }
}
