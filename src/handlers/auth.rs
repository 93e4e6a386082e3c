use crate::{
    AppState,
    auth::Auth0Client,
    errors::{Error, Result},
    session::{Session, SessionCookie},
};
use axum::{
    extract::{Form, Query, State},
    response::Redirect,
};
use serde::Deserialize;
use tracing::{info, warn};

/// What the identity provider sends back to `/callback`.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

fn client(state: &AppState) -> Result<&Auth0Client> {
    state.auth.as_ref().ok_or(Error::AuthNotConfigured)
}

fn callback_url(state: &AppState) -> String {
    format!("{}/callback", state.public_url)
}

// =========================Handlers=========================
pub async fn login(
    State(state): State<AppState>,
    mut session: Session,
) -> Result<(SessionCookie, Redirect)> {
    let auth = client(&state)?;
    let (url, pending) = auth.begin_login(&callback_url(&state)).await?;

    session.data.pending_login = Some(pending);
    let cookie = state.sessions.save(session)?;
    Ok((cookie, Redirect::to(url.as_str())))
}

pub async fn callback_get(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<CallbackParams>,
) -> Result<(SessionCookie, Redirect)> {
    complete_login(state, session, params).await
}

/// Providers configured with `response_mode=form_post` answer with a POST.
pub async fn callback_post(
    State(state): State<AppState>,
    session: Session,
    Form(params): Form<CallbackParams>,
) -> Result<(SessionCookie, Redirect)> {
    complete_login(state, session, params).await
}

async fn complete_login(
    state: AppState,
    mut session: Session,
    params: CallbackParams,
) -> Result<(SessionCookie, Redirect)> {
    let auth = client(&state)?;
    let pending = session.data.pending_login.take();

    if let Some(error) = params.error {
        warn!(%error, "identity provider returned an error");
        return Err(Error::OAuthDenied(params.error_description.unwrap_or(error)));
    }
    let pending = match (pending, params.state) {
        (Some(pending), Some(got)) if pending.state == got => pending,
        _ => return Err(Error::OAuthState),
    };
    let code = params
        .code
        .ok_or_else(|| Error::OAuthDenied("no authorization code".into()))?;

    let user = auth
        .finish_login(&code, pending, &callback_url(&state))
        .await?;
    session.data.user = Some(user);
    session.rotate_id();
    let cookie = state.sessions.save(session)?;
    Ok((cookie, Redirect::to("/")))
}

/// Forgets the session locally, then signs out at the provider, which sends
/// the browser back home.
pub async fn logout(
    State(state): State<AppState>,
    mut session: Session,
) -> Result<(SessionCookie, Redirect)> {
    session.clear();
    let cookie = state.sessions.save(session)?;
    info!("session cleared");

    let target = match &state.auth {
        Some(auth) => auth
            .logout_url(&format!("{}/", state.public_url))?
            .to_string(),
        None => "/".to_string(),
    };
    Ok((cookie, Redirect::to(&target)))
}
