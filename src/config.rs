use chrono::Duration;
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::ledger::{AdminRoster, AuditStore, Ledger, MemoryStore, Policy};
use crate::model::{
    id::ActorId,
    mongodb::{ensure_indexes_exist, MongoAuditStore},
    voter::{hash_national_id, DEFAULT_MINIMUM_AGE},
};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // non-secrets
    #[serde(default = "default_min_voting_age")]
    min_voting_age: u32,
    #[serde(default)]
    allow_reopen: bool,
    #[serde(default)]
    admins: Vec<String>,
    #[serde(default = "default_auth_ttl")]
    auth_ttl: u32,
    // secrets
    jwt_secret: String,
    hmac_secret: String,
}

fn default_min_voting_age() -> u32 {
    DEFAULT_MINIMUM_AGE
}

fn default_auth_ttl() -> u32 {
    3600
}

impl Config {
    /// Election rules the ledger is opened with.
    pub fn policy(&self) -> Policy {
        Policy {
            minimum_age: self.min_voting_age,
            allow_reopen: self.allow_reopen,
        }
    }

    /// Identities holding the administrator role.
    pub fn admins(&self) -> AdminRoster {
        AdminRoster::new(self.admins.iter().map(|admin| ActorId::from(admin.as_str())))
    }

    /// Valid lifetime of auth token cookies in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Secret key used to verify JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Secret key used to sign HMACs.
    pub fn hmac_secret(&self) -> &[u8] {
        self.hmac_secret.as_bytes()
    }

    /// Hash a national ID number with the configured secret.
    pub fn hash_national_id(&self, national_id: &str) -> String {
        hash_national_id(national_id, self.hmac_secret())
    }
}


/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        if config.admins.is_empty() {
            warn!("No administrators configured, admin commands will be refused");
        }

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the audit store.
#[derive(Deserialize)]
struct StoreConfig {
    // secrets
    db_uri: Option<String>,
    // non-secrets
    #[serde(default = "default_db_name")]
    db_name: String,
}

fn default_db_name() -> String {
    "ballot_ledger".to_string()
}

/// A fairing that opens the audit store, replays it into a [`Ledger`], and
/// places the ledger into managed state.
///
/// With a `db_uri` the trail lives in MongoDB; without one it is kept in
/// memory and lost on shutdown. Must be attached after [`ConfigFairing`].
pub struct LedgerFairing;

#[rocket::async_trait]
impl Fairing for LedgerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Ledger",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let store_config = match rocket.figment().extract::<StoreConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load audit store config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        let Some(config) = rocket.state::<Config>() else {
            error!("Application config must be loaded before the ledger");
            return Err(rocket);
        };
        let (policy, admins) = (config.policy(), config.admins());

        // Open the store.
        let store: Box<dyn AuditStore> = match store_config.db_uri {
            Some(db_uri) => {
                info!("Loaded database config, connecting...");
                let client = match MongoClient::with_uri_str(db_uri).await {
                    Ok(client) => client,
                    Err(e) => {
                        error!("Failed to connect to database: {e}");
                        return Err(rocket);
                    }
                };
                let db = client.database(&store_config.db_name);

                // Ensure the required indexes exist.
                if let Err(e) = ensure_indexes_exist(&db).await {
                    error!("Failed to create audit trail indexes: {e}");
                    return Err(rocket);
                }
                info!("...database connection online!");
                Box::new(MongoAuditStore::new(&db))
            }
            None => {
                warn!("No `db_uri` configured, the audit trail will only be kept in memory");
                Box::new(MemoryStore::new())
            }
        };

        // Replay the trail.
        let ledger = match Ledger::open(policy, store, Box::new(admins)).await {
            Ok(ledger) => ledger,
            Err(e) => {
                error!("Failed to open ledger: {e}");
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(ledger);
        Ok(rocket)
    }
}
