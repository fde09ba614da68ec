use axum::routing::get;
use axum::{Extension, Json};

use crate::email::Template;
use crate::store::Settings;
use crate::{routes, Result};

use super::{ControllerExt, Router};

pub fn router() -> Router {
    Router::new()
        .route(routes::TEMPLATE, get(template).put(set_template))
        .route(routes::SETTINGS, get(settings).put(set_settings))
}

pub async fn template(Extension(controller): ControllerExt) -> Json<Template> {
    Json(controller.template())
}

pub async fn set_template(
    Extension(controller): ControllerExt,
    Json(template): Json<Template>,
) -> Result<Json<Template>> {
    controller.set_template(template.clone())?;
    Ok(Json(template))
}

pub async fn settings(Extension(controller): ControllerExt) -> Json<Settings> {
    Json(controller.settings())
}

pub async fn set_settings(
    Extension(controller): ControllerExt,
    Json(settings): Json<Settings>,
) -> Result<Json<Settings>> {
    controller.set_settings(settings.clone())?;
    Ok(Json(settings))
}
