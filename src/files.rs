//! Normalizes heterogeneous file inputs into a uniform multipart part list.
//!
//! Accepts filesystem paths (files or directories, expanded recursively),
//! in-memory byte buffers, and pre-shaped parts, and produces a deduplicated,
//! order-preserving `Vec<FilePart>`. See the component design for `FileSet`.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use bytes::Bytes;

use crate::{Result, error::RuntimeError};

/// One file as handed to [`crate::request::RequestCore::files`], before
/// normalization.
#[derive(Debug, Clone)]
pub enum FileInput {
    /// A filesystem path to a single file or a directory (expanded recursively).
    Path(PathBuf),
    /// A pre-shaped named byte buffer.
    Bytes {
        name: String,
        filename: String,
        content_type: Option<String>,
        data: Bytes,
    },
    /// A pre-shaped named path (kept as `FileBody::Path` regardless of `chunked`).
    Named {
        name: String,
        filename: String,
        path: PathBuf,
    },
}

impl From<PathBuf> for FileInput {
    fn from(path: PathBuf) -> Self {
        FileInput::Path(path)
    }
}

impl From<&Path> for FileInput {
    fn from(path: &Path) -> Self {
        FileInput::Path(path.to_path_buf())
    }
}

impl From<&str> for FileInput {
    fn from(path: &str) -> Self {
        FileInput::Path(PathBuf::from(path))
    }
}

impl From<String> for FileInput {
    fn from(path: String) -> Self {
        FileInput::Path(PathBuf::from(path))
    }
}

/// The normalized multipart body source for a [`FilePart`]: either a path
/// kept for streaming (`chunked` mode) or bytes read eagerly.
#[derive(Debug, Clone)]
pub enum FileBody {
    Path(PathBuf),
    Bytes(Bytes),
}

/// One normalized, uniform file record: `{name, filename, bytes-or-path, content_type}`.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub name: String,
    pub filename: String,
    pub content_type: String,
    pub body: FileBody,
}

impl FilePart {
    fn dedup_key(&self) -> String {
        match &self.body {
            FileBody::Path(p) => format!("path:{}", p.display()),
            FileBody::Bytes(_) => format!("named:{}/{}", self.name, self.filename),
        }
    }
}

fn guess_content_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

fn expand_path(path: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    if path.is_dir() {
        let mut entries: Vec<_> = std::fs::read_dir(path)
            .map_err(|source| RuntimeError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .collect::<std::io::Result<_>>()
            .map_err(|source| RuntimeError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        entries.sort_by_key(|e| e.path());
        for entry in entries {
            expand_path(&entry.path(), out)?;
        }
    } else if path.is_file() {
        out.push(path.to_path_buf());
    }
    Ok(())
}

/// Normalizes a collection of [`FileInput`]s into a uniform, deduplicated
/// `Vec<FilePart>`. Idempotent: normalizing the output again yields the same
/// list (order-preserving).
///
/// `chunked` keeps filesystem paths as `FileBody::Path` references for the
/// transport to stream; otherwise bytes are read eagerly.
pub fn normalize(inputs: impl IntoIterator<Item = FileInput>, chunked: bool) -> Result<Vec<FilePart>> {
    let mut parts = Vec::new();

    for input in inputs {
        match input {
            FileInput::Bytes {
                name,
                filename,
                content_type,
                data,
            } => {
                let content_type = content_type.unwrap_or_else(|| guess_content_type(&filename));
                parts.push(FilePart {
                    name,
                    filename,
                    content_type,
                    body: FileBody::Bytes(data),
                });
            }
            FileInput::Named {
                name,
                filename,
                path,
            } => {
                let content_type = guess_content_type(&filename);
                let body = if chunked {
                    FileBody::Path(path)
                } else {
                    let data = std::fs::read(&path).map_err(|source| RuntimeError::Io {
                        path: path.clone(),
                        source,
                    })?;
                    FileBody::Bytes(Bytes::from(data))
                };
                parts.push(FilePart {
                    name,
                    filename,
                    content_type,
                    body,
                });
            }
            FileInput::Path(path) => {
                let mut files = Vec::new();
                expand_path(&path, &mut files)?;
                for file in files {
                    let filename = file
                        .file_name()
                        .map(|f| f.to_string_lossy().to_string())
                        .unwrap_or_default();
                    let name = file
                        .file_stem()
                        .map(|f| f.to_string_lossy().to_string())
                        .unwrap_or_else(|| filename.clone());
                    let content_type = guess_content_type(&filename);
                    let body = if chunked {
                        FileBody::Path(file.clone())
                    } else {
                        let data = std::fs::read(&file).map_err(|source| RuntimeError::Io {
                            path: file.clone(),
                            source,
                        })?;
                        FileBody::Bytes(Bytes::from(data))
                    };
                    parts.push(FilePart {
                        name,
                        filename,
                        content_type,
                        body,
                    });
                }
            }
        }
    }

    let mut seen = HashSet::new();
    parts.retain(|p| seen.insert(p.dedup_key()));

    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn normalizes_in_memory_bytes() {
        let parts = normalize(
            [FileInput::Bytes {
                name: "file".into(),
                filename: "a.txt".into(),
                content_type: None,
                data: Bytes::from_static(b"hello"),
            }],
            false,
        )
        .unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].content_type, "text/plain");
        match &parts[0].body {
            FileBody::Bytes(b) => assert_eq!(&b[..], b"hello"),
            _ => panic!("expected bytes"),
        }
    }

    #[test]
    fn expands_directory_recursively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::File::create(dir.path().join("a.txt"))
            .unwrap()
            .write_all(b"a")
            .unwrap();
        std::fs::File::create(dir.path().join("sub/b.txt"))
            .unwrap()
            .write_all(b"b")
            .unwrap();

        let parts = normalize([FileInput::Path(dir.path().to_path_buf())], false).unwrap();
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn chunked_mode_keeps_path_references() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("a.bin");
        std::fs::write(&file_path, b"data").unwrap();

        let parts = normalize([FileInput::Path(file_path.clone())], true).unwrap();
        assert_eq!(parts.len(), 1);
        match &parts[0].body {
            FileBody::Path(p) => assert_eq!(p, &file_path),
            _ => panic!("expected path reference in chunked mode"),
        }
    }

    #[test]
    fn dedups_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("a.bin");
        std::fs::write(&file_path, b"data").unwrap();

        let parts = normalize(
            [
                FileInput::Path(file_path.clone()),
                FileInput::Path(file_path.clone()),
            ],
            false,
        )
        .unwrap();
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn normalize_is_idempotent() {
        let parts = normalize(
            [FileInput::Bytes {
                name: "f".into(),
                filename: "a.json".into(),
                content_type: None,
                data: Bytes::from_static(b"{}"),
            }],
            false,
        )
        .unwrap();

        let reinput = parts.iter().map(|p| FileInput::Bytes {
            name: p.name.clone(),
            filename: p.filename.clone(),
            content_type: Some(p.content_type.clone()),
            data: match &p.body {
                FileBody::Bytes(b) => b.clone(),
                FileBody::Path(_) => unreachable!(),
            },
        });
        let twice = normalize(reinput, false).unwrap();
        assert_eq!(parts.len(), twice.len());
        assert_eq!(parts[0].name, twice[0].name);
        assert_eq!(parts[0].filename, twice[0].filename);
    }
}
