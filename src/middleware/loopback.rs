//! The web binary serves a single operator's session, so only the machine it
//! runs on may talk to it.

use axum::{
    extract::{connect_info::ConnectInfo, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;

use crate::error::AppError;

/// Refuse any peer that is not on a loopback address. Requests without
/// connection info are refused as well.
pub async fn loopback_only(peer: Option<ConnectInfo<SocketAddr>>, request: Request, next: Next) -> Response {
    match peer {
        Some(ConnectInfo(addr)) if addr.ip().is_loopback() => next.run(request).await,
        Some(ConnectInfo(addr)) => {
            tracing::warn!(peer = %addr, path = %request.uri().path(), "Refused non-local client");
            AppError::forbidden("This server only accepts local connections").into_response()
        }
        None => AppError::forbidden("This server only accepts local connections").into_response(),
    }
}
