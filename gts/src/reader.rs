//! The `Reader` trait, the sole input to [`crate::store::Store::load`], and a
//! `FileReader` that adapts a directory tree.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const EXCLUDE_DIRS: &[&str] = &["node_modules", "dist", "build", ".git"];
const VALID_EXTENSIONS: &[&str] = &[".json", ".jsonc", ".gts", ".yaml", ".yml"];

/// A finite stream of `(source_name, document)` pairs. The core never parses
/// bytes itself; it receives already-decoded documents.
pub trait Reader {
    fn next_document(&mut self) -> Option<(String, Value)>;
}

impl<T: Reader + ?Sized> Reader for &mut T {
    fn next_document(&mut self) -> Option<(String, Value)> {
        (**self).next_document()
    }
}

/// Strips `//` line comments from JSONC source, respecting string literals.
fn strip_jsonc_comments(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut chars = src.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        if c == '"' {
            in_string = true;
            out.push(c);
        } else if c == '/' && chars.peek() == Some(&'/') {
            for c in chars.by_ref() {
                if c == '\n' {
                    out.push('\n');
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }

    out
}

fn decode(path: &Path, content: &str) -> Option<Value> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "yaml" | "yml" => serde_saphyr::from_str(content).ok(),
        "jsonc" => serde_json::from_str(&strip_jsonc_comments(content)).ok(),
        _ => serde_json::from_str(content).ok(),
    }
}

/// Adapts a directory tree (or a list of files/directories) into a [`Reader`],
/// walking with `walkdir`, filtering by extension, and expanding `~` in paths.
pub struct FileReader {
    roots: Vec<PathBuf>,
    queue: Vec<PathBuf>,
    initialized: bool,
}

impl FileReader {
    #[must_use]
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let roots = paths
            .into_iter()
            .map(|p| PathBuf::from(shellexpand::tilde(p.as_ref()).to_string()))
            .collect();

        FileReader {
            roots,
            queue: Vec::new(),
            initialized: false,
        }
    }

    fn has_valid_extension(path: &Path) -> bool {
        path.extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .is_some_and(|ext| VALID_EXTENSIONS.contains(&ext.as_str()))
    }

    fn collect(&mut self) {
        let mut seen = std::collections::HashSet::new();
        let mut collected = Vec::new();

        for root in &self.roots {
            let resolved = root.canonicalize().unwrap_or_else(|_| root.clone());

            if resolved.is_file() {
                if Self::has_valid_extension(&resolved) {
                    let key = resolved.to_string_lossy().into_owned();
                    if seen.insert(key) {
                        collected.push(resolved.clone());
                    }
                }
                continue;
            }

            for entry in WalkDir::new(&resolved).follow_links(true).into_iter().flatten() {
                let path = entry.path();
                if path.is_dir()
                    && path
                        .file_name()
                        .is_some_and(|n| EXCLUDE_DIRS.contains(&n.to_string_lossy().as_ref()))
                {
                    continue;
                }
                if path.is_file() && Self::has_valid_extension(path) {
                    let canon = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
                    let key = canon.to_string_lossy().into_owned();
                    if seen.insert(key) {
                        tracing::debug!(?path, "discovered file");
                        collected.push(canon);
                    }
                }
            }
        }

        self.queue = collected;
    }
}

impl Reader for FileReader {
    fn next_document(&mut self) -> Option<(String, Value)> {
        if !self.initialized {
            self.collect();
            self.initialized = true;
        }

        while let Some(path) = self.queue.pop() {
            let source = path.to_string_lossy().into_owned();
            let Ok(content) = fs::read_to_string(&path) else {
                tracing::warn!(%source, "failed to read file");
                continue;
            };
            match decode(&path, &content) {
                Some(value) => return Some((source, value)),
                None => {
                    tracing::warn!(%source, "failed to decode file");
                }
            }
        }

        None
    }
}
