//! CSV recipient database.
//!
//! One row per recipient. The header row defines the field names available
//! to template placeholder expressions; every cell value is a string.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::{MergeError, Result};

/// One recipient's field mapping.
pub type Record = BTreeMap<String, String>;

/// Streaming reader over the database rows.
pub struct Database {
    path: PathBuf,
    rows: csv::DeserializeRecordsIntoIter<File, Record>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open a CSV database for row-by-row reading.
    pub fn open(path: &Path) -> Result<Self> {
        let reader = csv::Reader::from_path(path).map_err(|e| MergeError::Database {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            rows: reader.into_deserialize(),
        })
    }
}

impl Iterator for Database {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        Some(row.map_err(|e| MergeError::Database {
            path: self.path.clone(),
            reason: e.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_reads_rows_in_order() {
        let (_dir, path) = write_csv("email,name,number\na@x.com,Alice,17\nb@x.com,Bob,42\n");
        let rows: Vec<Record> = Database::open(&path).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["email"], "a@x.com");
        assert_eq!(rows[0]["name"], "Alice");
        assert_eq!(rows[1]["number"], "42");
    }

    #[test]
    fn test_quoted_fields() {
        let (_dir, path) = write_csv("email,name\na@x.com,\"Last, First\"\n");
        let rows: Vec<Record> = Database::open(&path).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(rows[0]["name"], "Last, First");
    }

    #[test]
    fn test_utf8_values() {
        let (_dir, path) = write_csv("email,name\na@x.com,Renée\n");
        let rows: Vec<Record> = Database::open(&path).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(rows[0]["name"], "Renée");
    }

    #[test]
    fn test_missing_file_is_database_error() {
        let err = Database::open(Path::new("/no/such/database.csv")).unwrap_err();
        assert!(matches!(err, MergeError::Database { .. }));
    }

    #[test]
    fn test_ragged_row_is_error() {
        let (_dir, path) = write_csv("email,name\na@x.com\n");
        let mut rows = Database::open(&path).unwrap();
        let row = rows.next().expect("one row");
        assert!(row.is_err());
    }
}
