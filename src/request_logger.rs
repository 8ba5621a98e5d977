use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Data, Request, Response};
use std::time::Instant;

/// Fairing to log one line per HTTP request with timing and the
/// authenticated user, when the host passed one along.
pub struct RequestLogger {
    user_header: String,
}

impl RequestLogger {
    pub fn new(user_header: impl Into<String>) -> Self {
        Self {
            user_header: user_header.into(),
        }
    }
}

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        request.local_cache(Instant::now);
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let duration = request.local_cache(Instant::now).elapsed();
        let user = request
            .headers()
            .get_one(&self.user_header)
            .unwrap_or("-");

        log::info!(
            "{} {} [{}] -> {} ({:.2}ms)",
            request.method(),
            request.uri(),
            user,
            response.status().code,
            duration.as_secs_f64() * 1000.0
        );
    }
}
