/// Access guard middleware
///
/// Runs in front of every task route. A request without a usable bearer
/// token never reaches a handler: it gets 401 with `No token provided` or
/// `Invalid token`, and the refusal is written to the activity log. Accepted
/// requests carry an [`AuthContext`] in their extensions.
///
/// ```text
/// GET /tasks
/// Authorization: Bearer eyJ...
/// ```

use crate::{app::AppState, error::ApiError};
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::net::{IpAddr, SocketAddr};
use tasktrail_shared::activity::{ActivityAction, ActivityEntry};
use tasktrail_shared::auth::guard::{authenticate, AuthContext};

/// Verifies the bearer token and injects [`AuthContext`]
pub async fn auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match authenticate(&state.tokens, req.headers()) {
        Ok(auth) => {
            tracing::debug!(user_id = %auth.user_id, "Request authenticated");
            req.extensions_mut().insert::<AuthContext>(auth);
            Ok(next.run(req).await)
        }
        Err(err) => {
            state.activity.record(
                ActivityEntry::new(ActivityAction::AuthRejected)
                    .ip(client_ip(&req))
                    .reason(err.reason()),
            );
            Err(err.into())
        }
    }
}

/// Peer address recorded by the server, when it was started with connect info
pub fn client_ip(req: &Request) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}
