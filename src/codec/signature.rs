//! Entry classification by filename extension.
//!
//! An archive is only browsable when every entry is a recognized raster
//! format; a single foreign entry (including a nested archive) disqualifies
//! the whole container.

use std::collections::HashSet;

use once_cell::sync::Lazy;

static IMAGE_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp", "ico"]
        .into_iter()
        .collect()
});

static NESTED_ARCHIVE_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["zip", "cbz", "rar", "cbr", "7z", "tar", "gz"]
        .into_iter()
        .collect()
});

/// Classification of one archive entry name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Image,
    NestedArchive,
    Other,
}

pub fn classify_entry(name: &str) -> EntryKind {
    let Some(ext) = extension_of(name) else {
        return EntryKind::Other;
    };
    if IMAGE_EXTENSIONS.contains(ext.as_str()) {
        EntryKind::Image
    } else if NESTED_ARCHIVE_EXTENSIONS.contains(ext.as_str()) {
        EntryKind::NestedArchive
    } else {
        EntryKind::Other
    }
}

pub fn is_image_name(name: &str) -> bool {
    classify_entry(name) == EntryKind::Image
}

fn extension_of(name: &str) -> Option<String> {
    if name.is_empty() || name.ends_with('/') {
        return None;
    }
    let stem = name.rsplit('/').next().unwrap_or(name);
    let dot = stem.rfind('.')?;
    if dot + 1 >= stem.len() {
        return None;
    }
    Some(stem[dot + 1..].to_ascii_lowercase())
}
