//! Run control. Runs are started in the background, so a request never waits
//! for a batch to drain. Clients follow a run through `/progress`.

use std::sync::Arc;

use axum::extract::Path;
use axum::routing::{get, post};
use axum::{Extension, Json};
use http::StatusCode;

use crate::batch::Run;
use crate::dispatch::Progress;
use crate::entry::{EntryId, EntryUpdate};
use crate::history::Record;
use crate::{routes, BatchController, Result};

use super::{ControllerExt, Router};

pub fn router() -> Router {
    Router::new()
        .route(routes::SEND, post(send))
        .route(routes::RETRY, post(retry))
        .route(routes::RETRY_ENTRY, post(retry_entry))
        .route(routes::CANCEL, post(cancel))
        .route(routes::PROGRESS, get(progress))
        .route(routes::HISTORY, get(history))
}

/// Drives a claimed run on its own task. The claim is taken by the handler,
/// so a rejected run is answered as such instead of failing in the
/// background.
fn spawn_run(controller: Arc<BatchController>, run: Run) {
    tokio::spawn(async move {
        if let Err(e) = controller.drive(run).await {
            tracing::warn!(error = %e.kind, "background run failed");
        }
    });
}

pub async fn send(
    Extension(controller): ControllerExt,
) -> Result<(StatusCode, Json<Progress>)> {
    let run = controller.begin_send()?;
    spawn_run(controller.clone(), run);
    Ok((StatusCode::ACCEPTED, Json(controller.progress())))
}

pub async fn retry(
    Extension(controller): ControllerExt,
) -> Result<(StatusCode, Json<Progress>)> {
    let run = controller.begin_retry_failed()?;
    spawn_run(controller.clone(), run);
    Ok((StatusCode::ACCEPTED, Json(controller.progress())))
}

/// Edits a failed entry and sends it again.
pub async fn retry_entry(
    Path(id): Path<EntryId>,
    Extension(controller): ControllerExt,
    update: Option<Json<EntryUpdate>>,
) -> Result<(StatusCode, Json<Progress>)> {
    let update = update.map(|Json(u)| u).unwrap_or_default();
    let run = controller.begin_retry_entry(id, update)?;
    spawn_run(controller.clone(), run);
    Ok((StatusCode::ACCEPTED, Json(controller.progress())))
}

pub async fn cancel(Extension(controller): ControllerExt) -> StatusCode {
    controller.cancel();
    StatusCode::ACCEPTED
}

pub async fn progress(Extension(controller): ControllerExt) -> Json<Progress> {
    Json(controller.progress())
}

pub async fn history(Extension(controller): ControllerExt) -> Result<Json<Vec<Record>>> {
    Ok(Json(controller.history()?.records))
}
