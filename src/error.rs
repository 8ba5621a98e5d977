use crate::contacts::StoreError;
use crate::legacy::LegacyError;
use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::{Request, Response};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::Responses;
use rocket_okapi::response::OpenApiResponderInner;
use serde::Serialize;
use std::io::Cursor;
use thiserror::Error;

/// Failures that abort a migration run.
///
/// Everything else (rejected rows, destination rejects, failed links) is
/// absorbed into the run summary instead of surfacing here.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("legacy store unavailable: {0}")]
    Legacy(#[from] LegacyError),
    #[error("could not read destination address book: {0}")]
    AddressBook(StoreError),
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            ApiError::Unauthorized(_) => Status::Unauthorized,
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        let (error_type, message) = match self {
            ApiError::Unauthorized(msg) => {
                log::debug!("unauthorized: {}", msg);
                ("Unauthorized", msg)
            }
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        let json = serde_json::to_string(&error_response)
            .unwrap_or_else(|_| r#"{"error":"SerializationError","message":"Failed to serialize error"}"#.to_string());

        Response::build()
            .status(status)
            .header(rocket::http::ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json))
            .ok()
    }
}

impl OpenApiResponderInner for ApiError {
    fn responses(_generator: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        Ok(Responses::default())
    }
}
