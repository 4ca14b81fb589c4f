use crate::error::{BundleError, Result};
use futures::future::join_all;
use regex::Regex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Filter that drops mirrored stylesheets by name fragment.
///
/// Each fragment `p` matches staged files named `*p.css`.
#[derive(Debug, Default)]
pub struct StylesheetFilter {
    patterns: Vec<Regex>,
}

impl StylesheetFilter {
    /// Create a filter from name fragments
    pub fn new<S: AsRef<str>>(fragments: &[S]) -> Result<Self> {
        let mut patterns = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            let fragment = fragment.as_ref().trim();
            if fragment.is_empty() {
                continue;
            }
            patterns.push(Regex::new(&format!(
                r"(?i)^.*{}\.css$",
                regex::escape(fragment)
            ))?);
        }
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether a staged file name is excluded
    pub fn is_ignored(&self, file_name: &str) -> bool {
        self.patterns.iter().any(|regex| regex.is_match(file_name))
    }

    /// Delete every ignored stylesheet in `dir`, returning the deleted paths.
    ///
    /// All deletions are joined before returning. A missing folder or zero
    /// matches is not an error.
    pub async fn delete_ignored(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BundleError::io("list", dir)(e)),
        };

        let mut targets = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(BundleError::io("list", dir))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.is_ignored(&name) {
                targets.push(entry.path());
            }
        }

        let deletions = targets.into_iter().map(|path| async move {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(Some(path)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(BundleError::io("delete", &path)(e)),
            }
        });

        let mut deleted = Vec::new();
        for result in join_all(deletions).await {
            if let Some(path) = result? {
                ::log::info!("Ignored {} file deleted", path.display());
                deleted.push(path);
            }
        }
        deleted.sort();
        Ok(deleted)
    }
}
