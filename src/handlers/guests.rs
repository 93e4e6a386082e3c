use crate::{
    AppState,
    errors::{Error, Result},
    model::{add_guest, list_guests},
    session::{Session, SessionCookie},
    views,
};
use axum::{
    extract::{Form, Path, State},
    response::Html,
};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct GuestForm {
    firstname: String,
    lastname: String,
    phone: String,
}

fn parse_phone(raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| Error::InvalidPhone(raw.to_string()))
}

// =========================Handlers=========================
/// `GET /` and `GET /{name}`. A name in the path is remembered in the
/// session for later visits.
pub async fn hello(
    State(state): State<AppState>,
    mut session: Session,
    name: Option<Path<String>>,
) -> Result<(Option<SessionCookie>, Html<String>)> {
    let changed = name.is_some();
    if let Some(Path(name)) = name {
        session.data.name = Some(name);
    }
    let page = views::hello(session.data.name.as_deref(), session.is_authenticated());

    // Only a new name needs saving.
    let cookie = if changed {
        Some(state.sessions.save(session)?)
    } else {
        None
    };
    Ok((cookie, page))
}

/// `POST /submit_form`: stores the guest, then shows everyone who signed.
pub async fn submit_form(
    State(state): State<AppState>,
    Form(form): Form<GuestForm>,
) -> Result<Html<String>> {
    let phone = parse_phone(&form.phone)?;
    add_guest(&state.pool, &form.firstname, &form.lastname, phone).await?;
    info!(firstname = %form.firstname, "guest book signed");

    let guests = list_guests(&state.pool).await?;
    Ok(views::guest_list(&guests))
}
