//! Sample input scaffolding.
//!
//! `--sample` writes a starter template, database, and server config so a
//! new user can run a dry-run immediately. Existing files are never
//! overwritten.

use std::path::Path;

use crate::error::{MergeError, Result};

const SAMPLE_TEMPLATE: &str = "\
TO: {{email}}
SUBJECT: Testing mergemail
FROM: My Self <myself@mydomain.com>

Hi, {{name}},

Your number is {{number}}.
";

const SAMPLE_DATABASE: &str = "\
email,name,number
myself@mydomain.com,\"Myself\",17
bob@bobdomain.com,\"Bob\",42
";

const SAMPLE_CONFIG: &str = "\
# Pro-tip: SSH or VPN into your network first to avoid spam filters and
# server throttling.

# Example: GMail
[server]
host = \"smtp.gmail.com\"
port = 465
security = \"SSL/TLS\"
username = \"YOUR_USERNAME_HERE\"

# Example: STARTTLS
# [server]
# host = \"newman.eecs.umich.edu\"
# port = 25
# security = \"STARTTLS\"
# username = \"YOUR_USERNAME_HERE\"

# Example: no encryption, no authentication
# [server]
# host = \"localhost\"
# port = 25
# security = \"Never\"

# Rate limit example: at most 30 messages per minute
# ratelimit = 30
";

/// Write the three sample files. Fails if any of them already exists.
pub fn create_sample_files(template: &Path, database: &Path, config: &Path) -> Result<()> {
    for path in [template, database, config] {
        if path.exists() {
            return Err(MergeError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "file exists"),
            ));
        }
    }

    std::fs::write(template, SAMPLE_TEMPLATE).map_err(|e| MergeError::io(template, e))?;
    std::fs::write(database, SAMPLE_DATABASE).map_err(|e| MergeError::io(database, e))?;
    std::fs::write(config, SAMPLE_CONFIG).map_err(|e| MergeError::io(config, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_all_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("t.txt");
        let database = dir.path().join("d.csv");
        let config = dir.path().join("s.toml");

        create_sample_files(&template, &database, &config).unwrap();

        assert!(template.exists());
        assert!(database.exists());
        assert!(config.exists());

        // The sample config parses and validates.
        let cfg = crate::config::load_config(&config).unwrap();
        assert_eq!(cfg.host, "smtp.gmail.com");
        assert_eq!(cfg.port, 465);
    }

    #[test]
    fn test_sample_template_and_database_merge() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("t.txt");
        let database = dir.path().join("d.csv");
        let config = dir.path().join("s.toml");
        create_sample_files(&template, &database, &config).unwrap();

        let template = crate::template::Template::from_path(&template).unwrap();
        let renderer = crate::template::Renderer::new();
        let mut rows = crate::database::Database::open(&database).unwrap();
        let record = rows.next().unwrap().unwrap();

        let rendered = renderer.render(template.text(), &record).unwrap();
        let message = crate::message::compile(&rendered, template.dir(), 0).unwrap();
        assert_eq!(message.header("To"), Some("myself@mydomain.com"));
        assert_eq!(message.header("Subject"), Some("Testing mergemail"));
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("t.txt");
        let database = dir.path().join("d.csv");
        let config = dir.path().join("s.toml");
        std::fs::write(&database, "existing").unwrap();

        let err = create_sample_files(&template, &database, &config).unwrap_err();
        assert!(matches!(err, MergeError::Io { .. }));
        // Nothing was written.
        assert!(!template.exists());
        assert_eq!(std::fs::read_to_string(&database).unwrap(), "existing");
    }
}
