use std::{convert::Infallible, fmt};

use axum::{
    body::Body,
    extract::{Form, State, rejection::FormRejection},
    http::{StatusCode, header},
    response::{Html, Response},
};
use futures::StreamExt;
use serde::Deserialize;
use tracing::info;

use smartreg_core::{
    Batch, ConnectionParameters, RegistrationRequest, audit::escape_html,
};

use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

const INDEX_HTML: &str = include_str!("../../templates/index.html");
const TEMPLATE_PLACEHOLDER: &str = "{{configuration_file}}";

/// Fields posted by the submission form.
#[derive(Deserialize)]
pub struct RegistrationForm {
    pub username: String,
    pub password: String,
    /// Licensing server address.
    pub cssm_ip: String,
    pub token: String,
    /// Whitespace separated device addresses.
    pub devices: String,
}

impl fmt::Debug for RegistrationForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationForm")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("cssm_ip", &self.cssm_ip)
            .field("token", &"<redacted>")
            .field("devices", &self.devices)
            .finish()
    }
}

impl RegistrationForm {
    fn into_batch(self) -> AppResult<Batch> {
        let addresses = Batch::parse_addresses(&self.devices);
        if addresses.is_empty() {
            return Err(AppError::bad_request("no devices submitted"));
        }
        for (field, value) in [
            ("username", &self.username),
            ("cssm_ip", &self.cssm_ip),
            ("token", &self.token),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::bad_request(format!(
                    "missing required field `{field}`"
                )));
            }
        }

        let params = ConnectionParameters::new(self.username.trim(), self.password);
        let request =
            RegistrationRequest::new(self.token.trim(), self.cssm_ip.trim());
        Ok(Batch::new(params, addresses, request))
    }
}

/// GET / - submission form with the licensing template shown read-only.
pub async fn index_handler(State(state): State<AppState>) -> Html<String> {
    Html(render_index(state.template.raw()))
}

fn render_index(template: &str) -> String {
    INDEX_HTML.replace(TEMPLATE_PLACEHOLDER, &escape_html(template))
}

/// POST / - runs the batch and streams one line per device as it finishes.
pub async fn submit_handler(
    State(state): State<AppState>,
    form: Result<Form<RegistrationForm>, FormRejection>,
) -> AppResult<Response> {
    let Form(form) = form?;
    let batch = form.into_batch()?;
    info!(
        devices = batch.len(),
        server = %batch.request().licensing_server(),
        "registration batch submitted"
    );

    let mut outcomes = state.orchestrator.run(batch);
    let stream = async_stream::stream! {
        while let Some(outcome) = outcomes.next().await {
            yield Ok::<_, Infallible>(outcome.to_line());
        }
        info!("registration batch finished");
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("x-content-type-options", "nosniff")
        .body(Body::from_stream(stream))
        .map_err(|err| AppError::internal(err.to_string()))
}
