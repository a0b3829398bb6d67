//! Email template loading and rendering.
//!
//! A template is a UTF-8 text file with a header block (`Name: Value` lines,
//! terminated by the first blank line) followed by a free-text body. Both
//! zones may contain `{{ ... }}` placeholder expressions that are evaluated
//! against one database record at a time.

mod renderer;

pub use renderer::Renderer;

use std::path::{Path, PathBuf};

use crate::error::{MergeError, Result};

/// An immutable email template, loaded once per run.
#[derive(Debug, Clone)]
pub struct Template {
    path: PathBuf,
    dir: PathBuf,
    text: String,
}

impl Template {
    /// Load a template from disk.
    ///
    /// The template's containing directory is remembered: relative
    /// attachment paths resolve against it.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| MergeError::io(path, e))?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self {
            path: path.to_path_buf(),
            dir,
            text,
        })
    }

    /// The raw (unrendered) template text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The template file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The directory containing the template file.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_path_reads_text_and_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "TO: {{{{email}}}}").unwrap();

        let template = Template::from_path(&path).unwrap();
        assert!(template.text().contains("TO: {{email}}"));
        assert_eq!(template.dir(), dir.path());
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = Template::from_path(Path::new("/no/such/template.txt")).unwrap_err();
        assert!(matches!(err, MergeError::Io { .. }));
    }
}
