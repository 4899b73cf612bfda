use crate::model::Id;
use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const STORED_NAME_ENTROPY: usize = 18;
pub const FILE_NAME_MAX_LEN: usize = 255;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct FileMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct File {
    pub id: Id<FileMarker>,
    pub name: String,
    pub url: String,
    pub format: String,
}

/// Whether a file is the single image of its owner or one of its attachments.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Attachment,
}

impl FileKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Attachment => "attachment",
        }
    }
}

/// A file that has been written to storage but not yet recorded.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct NewFile {
    pub name: String,
    pub url: String,
    pub format: String,
}

impl NewFile {
    /// Picks a fresh storage location under `directory` for an upload called `original_name`.
    #[must_use]
    pub fn for_upload(directory: &str, original_name: &str) -> Self {
        let name = display_name(original_name);
        let format = file_format(&name);

        let random: [u8; STORED_NAME_ENTROPY] = rand::random();
        let mut stored = BASE64_URL_SAFE_NO_PAD.encode(random);
        if !format.is_empty() {
            stored.push('.');
            stored.push_str(&format);
        }

        Self {
            url: format!("{directory}/{stored}"),
            name,
            format,
        }
    }
}

/// Last path component of a client supplied name, capped in length.
fn display_name(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if base.is_empty() {
        "file".to_owned()
    } else {
        base.chars().take(FILE_NAME_MAX_LEN).collect()
    }
}

/// Lowercase extension of `name`, empty when it has none.
#[must_use]
pub fn file_format(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|extension| extension.to_str())
        .filter(|extension| extension.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use crate::model::file::{NewFile, file_format};

    #[test]
    fn formats() {
        assert_eq!(file_format("Lecture 1.PDF"), "pdf");
        assert_eq!(file_format("archive.tar.gz"), "gz");
        assert_eq!(file_format("README"), "");
        assert_eq!(file_format("weird.p?f"), "");
    }

    #[test]
    fn uploads_get_unique_locations() {
        let first = NewFile::for_upload("posts", "../../etc/passwd.txt");
        let second = NewFile::for_upload("posts", "../../etc/passwd.txt");

        assert_eq!(first.name, "passwd.txt");
        assert_eq!(first.format, "txt");
        assert!(first.url.starts_with("posts/") && first.url.ends_with(".txt"));
        assert!(!first.url.contains(".."));
        assert_ne!(first.url, second.url);
    }

    #[test]
    fn blank_names_fall_back() {
        let file = NewFile::for_upload("images", "  ");
        assert_eq!(file.name, "file");
        assert!(!file.url.contains('.'));
    }
}
