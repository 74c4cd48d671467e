use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Data, Request, Response};
use std::time::Instant;

use crate::auth::guards::AuthenticatedSubject;

/// Fairing to log one line per HTTP request with timing and, once a bearer
/// token has been verified, the caller's user id.
pub struct RequestLogger;

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
        let start_time = request.local_cache(Instant::now);
        let duration = start_time.elapsed();
        let subject = request.local_cache(AuthenticatedSubject::default);

        let caller = match subject.0 {
            Some(id) => format!("user {}", id),
            None => "anonymous".to_string(),
        };

        log::info!(
            "{} {} -> {} [{}] ({:.2}ms)",
            request.method(),
            request.uri(),
            response.status().code,
            caller,
            duration.as_secs_f64() * 1000.0
        );
    }
}
