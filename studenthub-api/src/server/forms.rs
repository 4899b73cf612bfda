//! Multipart bodies of the file carrying routes.

use crate::{server::Result, storage::FileStore};
use axum::{body::Bytes, extract::Multipart};
use studenthub_common::{
    model::{file::NewFile, post::CreatePost},
    validate::{FieldErrors, Validate},
};
use tracing::debug;

pub const IMAGE_FIELD: &str = "image";
pub const ATTACHMENT_FIELD: &str = "files";

/// An uploaded file that has a storage location but is not stored yet.
#[derive(Clone, Debug)]
pub struct Upload {
    pub file: NewFile,
    pub bytes: Bytes,
}

impl Upload {
    fn new(directory: &str, original_name: &str, bytes: Bytes) -> Self {
        Self {
            file: NewFile::for_upload(directory, original_name),
            bytes,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PostForm {
    pub post: CreatePost,
    pub image: Option<Upload>,
    pub attachments: Vec<Upload>,
}

/// Reads `heading`, `text`, an optional `image` and any number of `files`.
pub async fn read_post_form(mut multipart: Multipart, directory: &str) -> Result<PostForm> {
    let mut heading = None;
    let mut text = None;
    let mut image = None;
    let mut attachments = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "heading" => heading = Some(field.text().await?),
            "text" => text = Some(field.text().await?),
            IMAGE_FIELD | ATTACHMENT_FIELD => {
                let original_name = field.file_name().unwrap_or_default().to_owned();
                let bytes = field.bytes().await?;
                if bytes.is_empty() {
                    continue;
                }

                let upload = Upload::new(directory, &original_name, bytes);
                if name == IMAGE_FIELD {
                    image = Some(upload);
                } else {
                    attachments.push(upload);
                }
            }
            _ => debug!(field = %name, "Ignoring unknown multipart field"),
        }
    }

    let mut errors = FieldErrors::new();
    if heading.is_none() {
        errors.add("heading", "Field is required.");
    }
    if text.is_none() {
        errors.add("text", "Field is required.");
    }
    errors.into_result()?;

    let post = CreatePost {
        heading: heading.unwrap_or_default(),
        text: text.unwrap_or_default(),
    };
    post.validate()?;

    Ok(PostForm {
        post,
        image,
        attachments,
    })
}

/// Reads the single `image` field of an image upload.
pub async fn read_image(mut multipart: Multipart, directory: &str) -> Result<Upload> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let original_name = field.file_name().unwrap_or_default().to_owned();
        let bytes = field.bytes().await?;
        if !bytes.is_empty() {
            return Ok(Upload::new(directory, &original_name, bytes));
        }
    }

    Err(FieldErrors::single(IMAGE_FIELD, "An image file is required.").into())
}

/// Writes every upload to storage. On failure the files written so far are removed again.
pub async fn store_uploads(files: &FileStore, uploads: &[&Upload]) -> Result<()> {
    let mut stored: Vec<&str> = Vec::new();

    for upload in uploads {
        if let Err(err) = files.save_file(&upload.bytes, &upload.file.url).await {
            files.delete_files(stored).await;
            return Err(err.into());
        }
        stored.push(&upload.file.url);
    }

    Ok(())
}
