// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Form, Json,
};

use crate::{
    error::ApiError,
    lifecycle::SecretError,
    models::{DepositForm, DepositResponse, RevealResponse},
    state::AppState,
};

#[utoipa::path(
    post,
    path = "/",
    request_body(content = DepositForm, content_type = "application/x-www-form-urlencoded"),
    tag = "Secrets",
    responses(
        (status = 201, description = "Secret stored", body = DepositResponse),
        (status = 400, description = "Secret is empty"),
        (status = 413, description = "Secret exceeds the size limit"),
        (status = 500, description = "Secret could not be stored"),
        (status = 503, description = "Secret store unavailable")
    )
)]
pub async fn deposit_secret(
    State(state): State<AppState>,
    Form(form): Form<DepositForm>,
) -> Result<(StatusCode, Json<DepositResponse>), ApiError> {
    if form.secret.is_empty() {
        return Err(ApiError::bad_request("secret is empty"));
    }

    let deposit = state
        .secrets
        .deposit(form.secret.as_bytes(), form.ttl.as_deref())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(DepositResponse {
            url: deposit.url,
            expires_at: deposit.expires_at,
            ttl_seconds: deposit.ttl.as_secs(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/{token}/{key}",
    params(
        ("token" = String, Path, description = "Storage token from the link"),
        ("key" = String, Path, description = "Hex-encoded decryption key from the link")
    ),
    tag = "Secrets",
    responses(
        (status = 200, description = "Secret revealed and destroyed", body = RevealResponse),
        (status = 404, description = "Secret missing, already read, expired or undecryptable"),
        (status = 503, description = "Secret store unavailable")
    )
)]
pub async fn reveal_secret(
    Path((token, key)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<RevealResponse>, ApiError> {
    let plaintext = state.secrets.reveal_parts(&token, &key).await?;
    // Deposits over HTTP are always UTF-8; anything else is not ours to render.
    let secret = std::str::from_utf8(&plaintext)
        .map(str::to_owned)
        .map_err(|_| SecretError::Corrupt)?;
    Ok(Json(RevealResponse { secret }))
}
