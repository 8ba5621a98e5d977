//! Login hook fired by the host after it authenticates a user.
//!
//! The host owns authentication. It forwards the authenticated username in a
//! trusted header (`X-Authenticated-User` unless configured otherwise), and
//! this endpoint runs the one-time contact migration for that user.

use crate::config::{DEFAULT_USER_HEADER, MigrationConfig};
use crate::error::ApiError;
use crate::migration::SharedLoginHook;
use crate::models::UserContext;
use rocket::request::{FromRequest, Outcome};
use rocket::serde::json::Json;
use rocket::{Request, State};
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use rocket_okapi::request::OpenApiFromRequest;
use serde::{Deserialize, Serialize};

/// Username the host authenticated for this request.
#[derive(Debug, Clone, OpenApiFromRequest)]
pub struct LoginUser(pub UserContext);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for LoginUser {
    type Error = ApiError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let header = request
            .rocket()
            .state::<MigrationConfig>()
            .map(|config| config.user_header.clone())
            .unwrap_or_else(|| DEFAULT_USER_HEADER.to_string());

        let username = request
            .headers()
            .get_one(&header)
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match username {
            Some(username) => Outcome::Success(LoginUser(UserContext::new(username))),
            None => {
                let err = ApiError::Unauthorized(format!("missing {} header", header));
                Outcome::Error((err.status(), err))
            }
        }
    }
}

/// Response for the login hook.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct LoginHookResponse {
    /// False only when the migration aborted before writing anything.
    pub completed: bool,
}

/// Run the contact migration for the authenticated user.
#[openapi(tag = "Hooks")]
#[post("/hooks/login")]
pub async fn login_hook(
    user: Result<LoginUser, ApiError>,
    hook: &State<SharedLoginHook>,
) -> Result<Json<LoginHookResponse>, ApiError> {
    let LoginUser(user) = user?;
    let completed = hook.on_login(&user).await;
    Ok(Json(LoginHookResponse { completed }))
}
