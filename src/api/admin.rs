use rocket::{serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, LedgerError, Result};
use crate::ledger::{
    tally::{Dashboard, Reconciliation},
    Command, CommandOutput, Ledger,
};
use crate::model::{
    audit::AuditEntry,
    auth::AuthToken,
    id::{ActorId, PartyId},
    party::{NewParty, PartyUpdate},
    voter::{NewVoter, VoterRecord, VoterStatus},
};

pub fn routes() -> Vec<Route> {
    routes![
        register_voter,
        voters,
        voter,
        voter_status,
        add_party,
        update_party,
        remove_party,
        open_voting,
        close_voting,
        audit_trail,
        dashboard,
        reconcile,
    ]
}

/// Voter registration as submitted by an administrator. The national ID is
/// hashed before it reaches the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoterRegistration {
    pub voter_id: ActorId,
    pub display_name: String,
    pub age: u32,
    pub national_id: String,
}

impl VoterRegistration {
    fn into_new_voter(self, config: &Config) -> NewVoter {
        let national_id_hash = if self.national_id.trim().is_empty() {
            String::new()
        } else {
            config.hash_national_id(&self.national_id)
        };
        NewVoter {
            voter_id: self.voter_id,
            display_name: self.display_name,
            age: self.age,
            national_id_hash,
        }
    }
}

/// Queries that only administrators may see.
fn require_admin(ledger: &Ledger, token: &AuthToken) -> Result<()> {
    if ledger.is_administrator(&token.id) {
        Ok(())
    } else {
        Err(LedgerError::Unauthorized(token.id.clone()).into())
    }
}

#[post("/admin/voters", data = "<registration>", format = "json")]
async fn register_voter(
    token: AuthToken,
    registration: Json<VoterRegistration>,
    ledger: &State<Ledger>,
    config: &State<Config>,
) -> Result<Json<CommandOutput>> {
    let voter = registration.0.into_new_voter(config);
    let output = ledger
        .execute(&token.id, Command::RegisterVoter(voter))
        .await?;
    Ok(Json(output))
}

#[get("/admin/voters")]
async fn voters(token: AuthToken, ledger: &State<Ledger>) -> Result<Json<Vec<VoterRecord>>> {
    require_admin(ledger, &token)?;
    Ok(Json(ledger.voters().await))
}

#[get("/admin/voters/<voter_id>")]
async fn voter(
    token: AuthToken,
    voter_id: ActorId,
    ledger: &State<Ledger>,
) -> Result<Json<VoterRecord>> {
    require_admin(ledger, &token)?;
    ledger
        .voter(&voter_id)
        .await
        .map(Json)
        .ok_or_else(|| Error::not_found(format!("Voter {voter_id}")))
}

/// Unlike [`voter`], an unknown voter is reported as unregistered rather than missing.
#[get("/admin/voters/<voter_id>/status")]
async fn voter_status(
    token: AuthToken,
    voter_id: ActorId,
    ledger: &State<Ledger>,
) -> Result<Json<VoterStatus>> {
    require_admin(ledger, &token)?;
    Ok(Json(ledger.voter_status(&voter_id).await))
}

#[post("/admin/parties", data = "<party>", format = "json")]
async fn add_party(
    token: AuthToken,
    party: Json<NewParty>,
    ledger: &State<Ledger>,
) -> Result<Json<CommandOutput>> {
    let output = ledger.execute(&token.id, Command::AddParty(party.0)).await?;
    Ok(Json(output))
}

#[put("/admin/parties/<party_id>", data = "<changes>", format = "json")]
async fn update_party(
    token: AuthToken,
    party_id: PartyId,
    changes: Json<PartyUpdate>,
    ledger: &State<Ledger>,
) -> Result<Json<CommandOutput>> {
    let command = Command::UpdateParty {
        party_id,
        changes: changes.0,
    };
    let output = ledger.execute(&token.id, command).await?;
    Ok(Json(output))
}

#[delete("/admin/parties/<party_id>")]
async fn remove_party(
    token: AuthToken,
    party_id: PartyId,
    ledger: &State<Ledger>,
) -> Result<Json<CommandOutput>> {
    let output = ledger
        .execute(&token.id, Command::RemoveParty { party_id })
        .await?;
    Ok(Json(output))
}

#[post("/admin/voting/open")]
async fn open_voting(token: AuthToken, ledger: &State<Ledger>) -> Result<Json<CommandOutput>> {
    let output = ledger.execute(&token.id, Command::OpenVoting).await?;
    Ok(Json(output))
}

#[post("/admin/voting/close")]
async fn close_voting(token: AuthToken, ledger: &State<Ledger>) -> Result<Json<CommandOutput>> {
    let output = ledger.execute(&token.id, Command::CloseVoting).await?;
    Ok(Json(output))
}

#[get("/admin/audit?<since>")]
async fn audit_trail(
    token: AuthToken,
    since: Option<u64>,
    ledger: &State<Ledger>,
) -> Result<Json<Vec<AuditEntry>>> {
    require_admin(ledger, &token)?;
    Ok(Json(ledger.audit_trail(since.unwrap_or(0)).await))
}

#[get("/admin/dashboard")]
async fn dashboard(token: AuthToken, ledger: &State<Ledger>) -> Result<Json<Dashboard>> {
    require_admin(ledger, &token)?;
    Ok(Json(ledger.dashboard().await))
}

#[get("/admin/reconcile")]
async fn reconcile(token: AuthToken, ledger: &State<Ledger>) -> Result<Json<Reconciliation>> {
    require_admin(ledger, &token)?;
    let report = ledger.reconcile().await;
    if !report.is_consistent() {
        error!("Tally does not reconcile with the ballot box: {report:?}");
    }
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::{serde_json, serde_json::json},
    };

    use super::*;
    use crate::api::test_utils::{admin_cookie, cookie_for};
    use crate::model::{audit::AuditAction, party::PartyRecord};

    impl VoterRegistration {
        pub fn example(id: &str, national_id: &str) -> Self {
            Self {
                voter_id: id.into(),
                display_name: format!("Voter {id}"),
                age: 30,
                national_id: national_id.to_string(),
            }
        }
    }

    #[ledger_test]
    async fn register_voters(client: Client) {
        let response = client
            .post(uri!(register_voter))
            .cookie(admin_cookie(&client))
            .header(ContentType::JSON)
            .body(json!(VoterRegistration::example("v1", "1234567890")).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let voter: VoterRecord =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(voter.registered);
        assert!(!voter.has_voted);

        // The national ID never reaches the ledger in clear.
        let config = client.rocket().state::<Config>().unwrap();
        assert_eq!(voter.national_id_hash, config.hash_national_id("1234567890"));
        assert_ne!(voter.national_id_hash, "1234567890");

        // Same national ID, different voter.
        register_expect_status(
            &client,
            &VoterRegistration::example("v2", " 1234567890 "),
            Status::Conflict,
        )
        .await;

        // Too young.
        let mut young = VoterRegistration::example("v3", "333");
        young.age = 17;
        register_expect_status(&client, &young, Status::BadRequest).await;

        // Missing national ID.
        register_expect_status(&client, &VoterRegistration::example("v4", ""), Status::BadRequest)
            .await;

        let ledger = client.rocket().state::<Ledger>().unwrap();
        assert_eq!(ledger.participation().await.registered_count, 1);
        assert_eq!(ledger.audit_head().await.0, 1);
    }

    #[ledger_test]
    async fn list_voters(client: Client) {
        for (id, national_id) in [("v2", "222"), ("v1", "111"), ("v3", "333")] {
            let registration = VoterRegistration::example(id, national_id);
            register_expect_status(&client, &registration, Status::Ok).await;
        }
        let ledger = client.rocket().state::<Ledger>().unwrap();
        let admin = ActorId::from("admin");
        ledger
            .execute(&admin, Command::AddParty(NewParty::example("Party A")))
            .await
            .unwrap();
        ledger.execute(&admin, Command::OpenVoting).await.unwrap();
        let vote = Command::CastVote {
            voter_id: "v2".into(),
            party_id: PartyId(1),
            reference: "r2".to_string(),
        };
        ledger.execute(&"v2".into(), vote).await.unwrap();

        let response = client
            .get(uri!(voters))
            .cookie(admin_cookie(&client))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let voters: Vec<VoterRecord> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        let listed: Vec<_> = voters
            .iter()
            .map(|voter| (voter.voter_id.as_str(), voter.registered, voter.has_voted))
            .collect();
        assert_eq!(
            listed,
            vec![("v1", true, false), ("v2", true, true), ("v3", true, false)]
        );

        let response = client
            .get(uri!(voter(ActorId::from("v2"))))
            .cookie(admin_cookie(&client))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let voter: VoterRecord =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(voter.display_name, "Voter v2");

        let response = client
            .get(uri!(voter(ActorId::from("v9"))))
            .cookie(admin_cookie(&client))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());

        let statuses = [
            ("v2", true, true),
            ("v3", true, false),
            ("v9", false, false),
        ];
        for (id, registered, has_voted) in statuses {
            let response = client
                .get(uri!(voter_status(ActorId::from(id))))
                .cookie(admin_cookie(&client))
                .dispatch()
                .await;
            assert_eq!(Status::Ok, response.status());
            let status: VoterStatus =
                serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
            assert_eq!(
                status,
                VoterStatus {
                    registered,
                    has_voted
                }
            );
        }

        // Voters cannot see each other.
        let response = client
            .get(uri!(voters))
            .cookie(cookie_for(&client, "v1"))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
        let response = client
            .get(uri!(voter_status(ActorId::from("v2"))))
            .cookie(cookie_for(&client, "v1"))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[ledger_test]
    async fn only_admins_administer(client: Client) {
        // No cookie at all.
        let response = client.post(uri!(open_voting)).dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());

        // A forged cookie.
        let response = client
            .post(uri!(open_voting))
            .cookie(rocket::http::Cookie::new("auth_token", "forged"))
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());

        // A valid identity without the administrator role.
        let voter = cookie_for(&client, "v1");
        let response = client
            .post(uri!(open_voting))
            .cookie(voter.clone())
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
        let response = client.get(uri!(dashboard)).cookie(voter).dispatch().await;
        assert_eq!(Status::Forbidden, response.status());

        let ledger = client.rocket().state::<Ledger>().unwrap();
        assert_eq!(ledger.audit_head().await.0, 0);
    }

    #[ledger_test]
    async fn manage_parties(client: Client) {
        let party = add_party_ok(&client, &NewParty::example("Party A")).await;
        assert_eq!(party.party_id, PartyId(1));
        add_party_ok(&client, &NewParty::example("Party B")).await;

        // Rename.
        let response = client
            .put(uri!(update_party(PartyId(1))))
            .cookie(admin_cookie(&client))
            .header(ContentType::JSON)
            .body(json!({"name": "Party Alpha"}).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let party: PartyRecord =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(party.name, "Party Alpha");
        assert_eq!(party.description, "Description of Party A");

        // An update that changes nothing.
        let response = client
            .put(uri!(update_party(PartyId(1))))
            .cookie(admin_cookie(&client))
            .header(ContentType::JSON)
            .body("{}")
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        // Remove, twice.
        remove_expect_status(&client, PartyId(2), Status::Ok).await;
        remove_expect_status(&client, PartyId(2), Status::Conflict).await;
        remove_expect_status(&client, PartyId(9), Status::NotFound).await;

        // Blank name.
        let response = client
            .post(uri!(add_party))
            .cookie(admin_cookie(&client))
            .header(ContentType::JSON)
            .body(json!({"name": " "}).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        let ledger = client.rocket().state::<Ledger>().unwrap();
        assert_eq!(ledger.parties(false).await.len(), 1);
        assert_eq!(ledger.parties(true).await.len(), 2);
    }

    #[ledger_test]
    async fn voting_window(client: Client) {
        let response = client
            .post(uri!(close_voting))
            .cookie(admin_cookie(&client))
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());

        let response = client
            .post(uri!(open_voting))
            .cookie(admin_cookie(&client))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert_eq!(response.into_string().await.unwrap(), "\"Open\"");

        let response = client
            .post(uri!(open_voting))
            .cookie(admin_cookie(&client))
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());

        let response = client
            .post(uri!(close_voting))
            .cookie(admin_cookie(&client))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
    }

    #[ledger_test]
    async fn audit_trail_and_dashboard(client: Client) {
        add_party_ok(&client, &NewParty::example("Party A")).await;
        add_party_ok(&client, &NewParty::example("Party B")).await;
        register_expect_status(&client, &VoterRegistration::example("v1", "111"), Status::Ok)
            .await;

        let response = client
            .get(uri!(audit_trail(Some(1u64))))
            .cookie(admin_cookie(&client))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let entries: Vec<AuditEntry> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        let actions: Vec<_> = entries.iter().map(|e| (e.sequence, e.action)).collect();
        assert_eq!(
            actions,
            vec![
                (2, AuditAction::PartyAdded),
                (3, AuditAction::VoterRegistered)
            ]
        );
        assert_eq!(entries[0].actor, ActorId::from("admin"));

        let response = client
            .get(uri!(audit_trail(_)))
            .cookie(admin_cookie(&client))
            .dispatch()
            .await;
        let entries: Vec<AuditEntry> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(entries.len(), 3);

        let response = client
            .get(uri!(dashboard))
            .cookie(admin_cookie(&client))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let dashboard: Dashboard =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(dashboard.party_count, 2);
        assert_eq!(dashboard.participation.registered_count, 1);
        assert_eq!(dashboard.recent_activity[0].sequence, 3);
        assert!(dashboard.recent_votes.is_empty());

        let response = client
            .get(uri!(reconcile))
            .cookie(admin_cookie(&client))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let report: Reconciliation =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(report.is_consistent());
    }

    async fn register_expect_status(
        client: &Client,
        registration: &VoterRegistration,
        status: Status,
    ) {
        let response = client
            .post(uri!(register_voter))
            .cookie(admin_cookie(client))
            .header(ContentType::JSON)
            .body(json!(registration).to_string())
            .dispatch()
            .await;
        assert_eq!(status, response.status());
    }

    async fn add_party_ok(client: &Client, party: &NewParty) -> PartyRecord {
        let response = client
            .post(uri!(add_party))
            .cookie(admin_cookie(client))
            .header(ContentType::JSON)
            .body(json!(party).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap()
    }

    async fn remove_expect_status(client: &Client, party_id: PartyId, status: Status) {
        let response = client
            .delete(uri!(remove_party(party_id)))
            .cookie(admin_cookie(client))
            .dispatch()
            .await;
        assert_eq!(status, response.status());
    }
}
