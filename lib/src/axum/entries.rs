use axum::extract::Path;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Extension, Json};
use http::header::CONTENT_TYPE;
use http::StatusCode;

use crate::entry::{Entry, EntryId, EntryUpdate};
use crate::{routes, Result};

use super::{ControllerExt, Router};

pub fn router() -> Router {
    Router::new()
        .route(routes::ENTRIES, get(list).post(add).delete(clear))
        .route(routes::ENTRY, put(update).delete(remove))
        .route(routes::ENTRIES_IMPORT, post(import))
        .route(routes::ENTRIES_EXPORT, get(export))
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntry {
    pub email: String,
    pub image_link: String,
    #[serde(default)]
    pub name: Option<String>,
}

pub async fn list(Extension(controller): ControllerExt) -> Json<Vec<Entry>> {
    Json(controller.entries())
}

pub async fn add(
    Extension(controller): ControllerExt,
    Json(new): Json<NewEntry>,
) -> Result<impl IntoResponse> {
    let entry = controller.add_entry(new.email, new.image_link, new.name)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn update(
    Path(id): Path<EntryId>,
    Extension(controller): ControllerExt,
    Json(update): Json<EntryUpdate>,
) -> Result<Json<Entry>> {
    Ok(Json(controller.update_entry(id, update)?))
}

pub async fn remove(
    Path(id): Path<EntryId>,
    Extension(controller): ControllerExt,
) -> Result<Json<Entry>> {
    Ok(Json(controller.remove_entry(id)?))
}

pub async fn clear(Extension(controller): ControllerExt) -> Result<StatusCode> {
    controller.clear()?;
    Ok(StatusCode::NO_CONTENT)
}

/// Appends the rows of a csv body to the batch.
pub async fn import(Extension(controller): ControllerExt, body: String) -> Result<impl IntoResponse> {
    let added = controller.import(body.as_bytes())?;
    Ok(Json(serde_json::json!({ "added": added })))
}

pub async fn export(Extension(controller): ControllerExt) -> Result<impl IntoResponse> {
    let mut out = Vec::new();
    controller.export(&mut out)?;
    Ok(([(CONTENT_TYPE, "text/csv")], out))
}
