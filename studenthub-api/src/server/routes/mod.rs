use crate::{
    server::{
        Result, ServerRouter,
        forms::{read_image, store_uploads},
    },
    storage::FileStore,
};
use axum::{Router, extract::Multipart};
use studenthub_common::model::file::File;
use studenthub_db::{
    client::DbClient,
    files::{ImageOwner, ImageReplacement},
};
use tracing::info;

mod auth;
mod chat;
mod comments;
mod notifications;
mod posts;
mod universities;
mod users;

pub fn routes() -> ServerRouter {
    Router::new()
        .merge(auth::routes())
        .merge(users::routes())
        .merge(universities::routes())
        .merge(posts::routes())
        .merge(comments::routes())
        .merge(notifications::routes())
        .merge(chat::routes())
}

fn image_directory(owner: ImageOwner) -> &'static str {
    match owner {
        ImageOwner::User(_) => "users",
        ImageOwner::University(_) => "universities",
        ImageOwner::Post(_) => "posts",
        ImageOwner::Comment(_) => "comments",
    }
}

/// Stores the uploaded image and swaps it in for the owner's current one.
///
/// `None` if the owner does not exist. The new file leaves storage again
/// whenever the swap does not go through.
async fn upload_image(
    db: &DbClient,
    files: &FileStore,
    owner: ImageOwner,
    multipart: Multipart,
) -> Result<Option<File>> {
    let upload = read_image(multipart, image_directory(owner)).await?;
    store_uploads(files, &[&upload]).await?;

    match db.replace_image(owner, &upload.file).await {
        Ok(Some(ImageReplacement { file, replaced_url })) => {
            files.delete_files(replaced_url).await;
            info!(?owner, file_id = %file.id, "Uploaded image");
            Ok(Some(file))
        }
        Ok(None) => {
            files.delete_files([&upload.file.url]).await;
            Ok(None)
        }
        Err(err) => {
            files.delete_files([&upload.file.url]).await;
            Err(err.into())
        }
    }
}
