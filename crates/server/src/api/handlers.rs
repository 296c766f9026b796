use super::{client_error, ApiResult};
use crate::config::AppState;
use crate::ui;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Form,
};
use openpaye_relay_core::payroll::require;
use openpaye_relay_core::Credential;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub client_id: Option<String>,
}

/// Render the credential registration form
pub async fn connect_form(Query(query): Query<ConnectQuery>) -> Html<String> {
    Html(ui::render_connect_form(
        query.client_id.as_deref().unwrap_or_default(),
    ))
}

#[derive(Deserialize)]
pub struct ConnectForm {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub dossier_id: String,
    #[serde(default)]
    pub api_key: String,
}

/// Store the submitted OpenPaye access, replacing any previous one
pub async fn register_credentials(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ConnectForm>,
) -> ApiResult<Response> {
    let client_id = form.client_id.trim();
    let dossier_id = form.dossier_id.trim();
    let api_key = form.api_key.trim();

    for (field, value) in [
        ("client_id", client_id),
        ("dossier_id", dossier_id),
        ("api_key", api_key),
    ] {
        if let Err(e) = require(field, value) {
            return Ok(client_error(StatusCode::BAD_REQUEST, e.to_string()));
        }
    }

    state
        .credentials
        .set(Credential::new(client_id, dossier_id, api_key))
        .await?;

    Ok(Html(ui::render_connected(client_id)).into_response())
}
