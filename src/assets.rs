use crate::error::{BundleError, Result};
use crate::utils::basename;
use futures::future::join_all;
use regex::Regex;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::LazyLock;

/// `url(...)` references to raster or vector images, quoted or not
static IMAGE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)url\(\s*['"]?([^'")]*?\.(?:png|jpe?g|gif|tiff|svg))(?:[?#][^'")]*)?['"]?\s*\)"#)
        .expect("image url pattern is valid")
});

/// Outcome of copying a set of images
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub copied: Vec<String>,
    /// Images that could not be copied, absent from the mirror or otherwise
    pub missing: Vec<String>,
}

/// Bare file names of every image referenced by `url(...)` in `css`
pub fn css_image_references(css: &str) -> BTreeSet<String> {
    IMAGE_URL
        .captures_iter(css)
        .filter_map(|caps| caps.get(1))
        .map(|m| basename(m.as_str()))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// The images a bundle needs: fragment `img` sources plus reduced-CSS references
pub fn image_set(fragment_images: &BTreeSet<String>, reduced_css: &str) -> BTreeSet<String> {
    let mut images = css_image_references(reduced_css);
    images.extend(fragment_images.iter().cloned());
    images
}

/// Copy each named image from `from` to `to`, concurrently.
///
/// A name that fails to copy is reported as missing and logged, never an
/// error. All copies are joined before returning.
pub async fn copy_images(images: &BTreeSet<String>, from: &Path, to: &Path) -> Result<CopyReport> {
    tokio::fs::create_dir_all(to)
        .await
        .map_err(BundleError::io("create", to))?;

    let copies = images.iter().map(|name| async move {
        let result = tokio::fs::copy(from.join(name), to.join(name)).await;
        (name, result)
    });

    let mut report = CopyReport::default();
    for (name, result) in join_all(copies).await {
        match result {
            Ok(_) => report.copied.push(name.clone()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                ::log::info!("Image {name} not found in mirror, skipped");
                report.missing.push(name.clone());
            }
            Err(e) => {
                ::log::warn!("Image {name} could not be copied, skipped: {e}");
                report.missing.push(name.clone());
            }
        }
    }
    Ok(report)
}

/// Copy every file of `from` into `to`. A missing `from` copies nothing.
pub async fn copy_folder(from: &Path, to: &Path) -> Result<usize> {
    let mut entries = match tokio::fs::read_dir(from).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(BundleError::io("list", from)(e)),
    };

    tokio::fs::create_dir_all(to)
        .await
        .map_err(BundleError::io("create", to))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(BundleError::io("list", from))?
    {
        let is_file = entry
            .file_type()
            .await
            .map_err(BundleError::io("inspect", &entry.path()))?
            .is_file();
        if is_file {
            files.push(entry.file_name());
        }
    }

    let copies = files.iter().map(|name| async move {
        let source = from.join(name);
        tokio::fs::copy(&source, to.join(name))
            .await
            .map_err(BundleError::io("copy", &source))
    });
    for result in join_all(copies).await {
        result?;
    }

    Ok(files.len())
}
