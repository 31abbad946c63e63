//! Echoes the authenticated principal.

use axum::Json;
use tollgate_core::Authentication;

use crate::extract::Authenticated;

/// Returns the caller's authentication context; 401 when unauthenticated.
pub async fn whoami(Authenticated(authentication): Authenticated) -> Json<Authentication> {
    Json(authentication)
}
