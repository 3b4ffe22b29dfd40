//! Error reporting for the web layer.
//!
//! Handlers do not render failures themselves. They park an [`ErrorData`]
//! in the session and redirect to the error page, which shows it once.

use axum::{http::StatusCode, response::Redirect};
use std::fmt;
use tracing::debug;
use wg_portal_access::ErrorData;

use crate::session::Session;

/// Path of the error page.
pub const ERROR_PAGE: &str = "/oops";

/// Stores an error in the session and redirects to the error page.
///
/// `path` is the request path the error page links back to; for a 404 the
/// link points at `/` instead.
pub async fn report_error(
    session: &Session,
    path: &str,
    code: StatusCode,
    message: impl fmt::Display,
    details: impl fmt::Display,
) -> Redirect {
    let error = ErrorData::new(
        code.as_u16(),
        message.to_string(),
        details.to_string(),
        path,
    );
    debug!(code = error.code, path = %error.path, message = %error.message, "reporting error");

    let mut data = session.get_data().await;
    data.error = Some(error);
    session.set_data(&data).await;

    Redirect::to(ERROR_PAGE)
}

/// Fatal errors while bringing the server up.
#[derive(Debug)]
pub enum StartupError {
    /// Configuration could not be loaded or is invalid.
    Configuration,
    /// The database is unreachable or its migrations failed.
    Database,
    /// An authentication provider could not be set up.
    Authentication,
    /// The listening socket could not be bound or the server stopped abnormally.
    Serve { address: String },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "failed to load configuration"),
            Self::Database => write!(f, "failed to prepare database"),
            Self::Authentication => write!(f, "failed to setup authentication providers"),
            Self::Serve { address } => write!(f, "failed to serve on {address}"),
        }
    }
}

impl std::error::Error for StartupError {}
