use axum::extract::Path;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Extension, Json};
use http::StatusCode;

use crate::email::list::{BatchId, SavedBatch};
use crate::{routes, Result};

use super::{ControllerExt, Router};

pub fn router() -> Router {
    Router::new()
        .route(routes::BATCHES, get(list).post(save))
        .route(routes::BATCH, delete(remove))
        .route(routes::BATCH_LOAD, post(load))
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SaveForm {
    pub name: String,
}

pub async fn list(Extension(controller): ControllerExt) -> Result<Json<Vec<SavedBatch>>> {
    Ok(Json(controller.list_batches()?))
}

/// Saves the working batch under a name.
pub async fn save(
    Extension(controller): ControllerExt,
    Json(form): Json<SaveForm>,
) -> Result<impl IntoResponse> {
    let batch = controller.save_batch(form.name)?;
    Ok((StatusCode::CREATED, Json(batch)))
}

pub async fn load(
    Path(id): Path<BatchId>,
    Extension(controller): ControllerExt,
) -> Result<Json<SavedBatch>> {
    Ok(Json(controller.load_batch(id)?))
}

pub async fn remove(
    Path(id): Path<BatchId>,
    Extension(controller): ControllerExt,
) -> Result<StatusCode> {
    controller.delete_batch(id)?;
    Ok(StatusCode::NO_CONTENT)
}
