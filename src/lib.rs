#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate ledger_test;

use rocket::{figment::Figment, Build, Rocket};

use crate::config::{ConfigFairing, LedgerFairing};
use crate::logging::LoggerFairing;

pub mod api;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod model;

/// Build the server, configured from `Rocket.toml` and `ROCKET_*` environment variables.
pub fn build() -> Rocket<Build> {
    rocket_for_figment(rocket::Config::figment())
}

/// Build the server with an explicit configuration.
pub fn rocket_for_figment(figment: Figment) -> Rocket<Build> {
    rocket::custom(figment)
        .mount("/", api::routes())
        .attach(ConfigFairing)
        .attach(LedgerFairing)
        .attach(LoggerFairing)
}

/// A server with an in-memory audit trail and a single administrator, `admin`.
/// Ignores `Rocket.toml` so tests never touch a real database.
#[cfg(test)]
fn test_rocket() -> Rocket<Build> {
    let figment = Figment::from(rocket::Config::debug_default())
        .merge(("jwt_secret", "test jwt secret"))
        .merge(("hmac_secret", "test hmac secret"))
        .merge(("admins", ["admin"]));
    rocket_for_figment(figment)
}
