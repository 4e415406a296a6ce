use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};

use rocket::{
    fairing::{Fairing, Info, Kind},
    http::StatusClass,
    request::{FromRequest, Outcome},
    Data, Orbit, Request, Response, Rocket,
};

use crate::ledger::Ledger;

/// Serial number of a request, shared by every log line it produces.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RequestId(usize);

impl RequestId {
    fn of(req: &Request<'_>) -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        *req.local_cache(|| RequestId(NEXT.fetch_add(1, Ordering::Relaxed)))
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequestId {
    type Error = std::convert::Infallible;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(RequestId::of(req))
    }
}

/// One line summing up the ledger, for the start and end of a run.
async fn ledger_summary(ledger: &Ledger) -> String {
    let (entries, head) = ledger.audit_head().await;
    let phase = ledger.phase().await;
    let participation = ledger.participation().await;
    format!(
        "voting {phase}, {} of {} registered voters voted, {entries} audit entries (head {head})",
        participation.total_votes, participation.registered_count,
    )
}

/// Logs every request with its outcome, and the state of the ledger when the
/// server starts and stops.
#[derive(Debug, Copy, Clone)]
pub struct LoggerFairing;

#[rocket::async_trait]
impl Fairing for LoggerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Logger",
            kind: Kind::Liftoff | Kind::Request | Kind::Response | Kind::Shutdown,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let config = rocket.config();
        let scheme = if config.tls_enabled() { "https" } else { "http" };
        info!("Listening on {scheme}://{}:{}", config.address, config.port);

        if let Some(ledger) = rocket.state::<Ledger>() {
            let summary = ledger_summary(ledger).await;
            info!("Ledger online: {summary}");
        }
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        debug!("{} {} {}", RequestId::of(req), req.method(), req.uri());
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let route = req
            .route()
            .and_then(|route| route.name.as_deref())
            .unwrap_or("no route");
        let line = format!(
            "{} {} {} -> {} ({route})",
            RequestId::of(req),
            req.method(),
            req.uri(),
            res.status()
        );
        match res.status().class() {
            StatusClass::ServerError => error!("{line}"),
            StatusClass::ClientError => warn!("{line}"),
            _ => info!("{line}"),
        }
    }

    async fn on_shutdown(&self, rocket: &Rocket<Orbit>) {
        if let Some(ledger) = rocket.state::<Ledger>() {
            let summary = ledger_summary(ledger).await;
            info!("Shutting down: {summary}");
        }
    }
}

#[cfg(test)]
mod tests {
    use rocket::local::blocking::Client;

    use super::*;

    #[test]
    fn request_ids_are_per_request() {
        let client = Client::untracked(rocket::build()).unwrap();
        let first = client.get("/voting/status");
        let second = client.get("/voting/status");

        let id = RequestId::of(first.inner());
        assert_eq!(RequestId::of(first.inner()), id);
        assert_ne!(RequestId::of(second.inner()), id);
        assert!(id.to_string().starts_with("req#"));
    }
}
