use crate::{
    server::{
        Result, ServerError, ServerRouter,
        auth::AuthenticatedUser,
        extract::{Json, Query, ValidJson},
        routes::upload_image,
    },
    storage::FileStore,
};
use axum::{
    extract::{Multipart, State, multipart::MultipartRejection},
    http::StatusCode,
};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;
use studenthub_common::{
    model::{
        Id,
        file::File,
        university::{
            CreateFaculty, CreateUniversity, Faculty, FacultyMarker, Role, RoleBody, RoleMarker,
            University, UniversityMarker, UpdateFaculty, UpdateUniversity,
        },
    },
    util::{Page, Pagination},
};
use studenthub_db::{client::DbClient, files::ImageOwner};

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_roles)
        .typed_post(create_role)
        .typed_get(get_role)
        .typed_put(update_role)
        .typed_delete(delete_role)
        .typed_get(get_universities)
        .typed_post(create_university)
        .typed_get(get_university)
        .typed_put(update_university)
        .typed_delete(delete_university)
        .typed_put(upload_university_image)
        .typed_get(get_faculties)
        .typed_post(create_faculty)
        .typed_get(get_faculty)
        .typed_put(update_faculty)
        .typed_delete(delete_faculty)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/user_roles", rejection(ServerError))]
struct RolesPath();

async fn get_roles(
    RolesPath(): RolesPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Page<Role>>> {
    Ok(Json(db.fetch_roles(pagination).await?))
}

async fn create_role(
    RolesPath(): RolesPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
    ValidJson(role): ValidJson<RoleBody>,
) -> Result<(StatusCode, Json<Role>)> {
    let role = db.create_role(&role).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/user_role/{id}", rejection(ServerError))]
struct RolePath {
    id: Id<RoleMarker>,
}

async fn get_role(
    RolePath { id }: RolePath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
) -> Result<Json<Role>> {
    let role = db
        .fetch_role(id)
        .await?
        .ok_or(ServerError::RoleByIdNotFound(id))?;

    Ok(Json(role))
}

async fn update_role(
    RolePath { id }: RolePath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
    ValidJson(role): ValidJson<RoleBody>,
) -> Result<Json<Role>> {
    let role = db
        .update_role(id, &role)
        .await?
        .ok_or(ServerError::RoleByIdNotFound(id))?;

    Ok(Json(role))
}

async fn delete_role(
    RolePath { id }: RolePath,
    State(db): State<Arc<DbClient>>,
    State(files): State<Arc<FileStore>>,
    _user: AuthenticatedUser,
) -> Result<StatusCode> {
    let file_urls = db
        .delete_role(id)
        .await?
        .ok_or(ServerError::RoleByIdNotFound(id))?;
    files.delete_files(file_urls).await;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/universities", rejection(ServerError))]
struct UniversitiesPath();

async fn get_universities(
    UniversitiesPath(): UniversitiesPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Page<University>>> {
    Ok(Json(db.fetch_universities(pagination).await?))
}

async fn create_university(
    UniversitiesPath(): UniversitiesPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
    ValidJson(university): ValidJson<CreateUniversity>,
) -> Result<(StatusCode, Json<University>)> {
    let university = db.create_university(&university).await?;
    Ok((StatusCode::CREATED, Json(university)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/university/{id}", rejection(ServerError))]
struct UniversityPath {
    id: Id<UniversityMarker>,
}

async fn get_university(
    UniversityPath { id }: UniversityPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
) -> Result<Json<University>> {
    let university = db
        .fetch_university(id)
        .await?
        .ok_or(ServerError::UniversityByIdNotFound(id))?;

    Ok(Json(university))
}

async fn update_university(
    UniversityPath { id }: UniversityPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
    ValidJson(update): ValidJson<UpdateUniversity>,
) -> Result<Json<University>> {
    let university = db
        .update_university(id, &update)
        .await?
        .ok_or(ServerError::UniversityByIdNotFound(id))?;

    Ok(Json(university))
}

async fn delete_university(
    UniversityPath { id }: UniversityPath,
    State(db): State<Arc<DbClient>>,
    State(files): State<Arc<FileStore>>,
    _user: AuthenticatedUser,
) -> Result<StatusCode> {
    let file_urls = db
        .delete_university(id)
        .await?
        .ok_or(ServerError::UniversityByIdNotFound(id))?;
    files.delete_files(file_urls).await;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/university/{id}/image", rejection(ServerError))]
struct UniversityImagePath {
    id: Id<UniversityMarker>,
}

async fn upload_university_image(
    UniversityImagePath { id }: UniversityImagePath,
    State(db): State<Arc<DbClient>>,
    State(files): State<Arc<FileStore>>,
    _user: AuthenticatedUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<File>> {
    let file = upload_image(&db, &files, ImageOwner::University(id), multipart?)
        .await?
        .ok_or(ServerError::UniversityByIdNotFound(id))?;

    Ok(Json(file))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/faculties", rejection(ServerError))]
struct FacultiesPath();

async fn get_faculties(
    FacultiesPath(): FacultiesPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Page<Faculty>>> {
    Ok(Json(db.fetch_faculties(pagination).await?))
}

async fn create_faculty(
    FacultiesPath(): FacultiesPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
    ValidJson(faculty): ValidJson<CreateFaculty>,
) -> Result<(StatusCode, Json<Faculty>)> {
    let faculty = db.create_faculty(&faculty).await?;
    Ok((StatusCode::CREATED, Json(faculty)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/faculty/{id}", rejection(ServerError))]
struct FacultyPath {
    id: Id<FacultyMarker>,
}

async fn get_faculty(
    FacultyPath { id }: FacultyPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
) -> Result<Json<Faculty>> {
    let faculty = db
        .fetch_faculty(id)
        .await?
        .ok_or(ServerError::FacultyByIdNotFound(id))?;

    Ok(Json(faculty))
}

async fn update_faculty(
    FacultyPath { id }: FacultyPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
    ValidJson(update): ValidJson<UpdateFaculty>,
) -> Result<Json<Faculty>> {
    let faculty = db
        .update_faculty(id, &update)
        .await?
        .ok_or(ServerError::FacultyByIdNotFound(id))?;

    Ok(Json(faculty))
}

async fn delete_faculty(
    FacultyPath { id }: FacultyPath,
    State(db): State<Arc<DbClient>>,
    State(files): State<Arc<FileStore>>,
    _user: AuthenticatedUser,
) -> Result<StatusCode> {
    let file_urls = db
        .delete_faculty(id)
        .await?
        .ok_or(ServerError::FacultyByIdNotFound(id))?;
    files.delete_files(file_urls).await;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::server::tests::{TestApp, json_request};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn role_names_are_bounded() {
        let app = TestApp::new().await;
        let token = app.access_token(1);

        let (status, body) = app
            .send(json_request(
                "POST",
                "/user_roles",
                Some(&token),
                &json!({"name": "x".repeat(51)}),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errors"]["name"].is_array());
    }

    #[tokio::test]
    async fn university_needs_contact_details() {
        let app = TestApp::new().await;
        let token = app.access_token(1);

        let (status, body) = app
            .send(json_request(
                "POST",
                "/universities",
                Some(&token),
                &json!({"name": "KPI", "email": "kpi", "phone": "0800"}),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errors"]["email"].is_array());
        assert!(body["errors"]["phone"].is_array());
    }

    #[tokio::test]
    async fn empty_faculty_update_is_rejected() {
        let app = TestApp::new().await;
        let token = app.access_token(1);

        let (status, _) = app
            .send(json_request("PUT", "/faculty/3", Some(&token), &json!({})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
