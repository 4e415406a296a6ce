use data_encoding::HEXLOWER;
use rocket::{serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ledger::{tally::VoterReport, Command, CommandOutput, Ledger};
use crate::logging::RequestId;
use crate::model::{auth::AuthToken, ballot::Receipt, id::PartyId};

pub fn routes() -> Vec<Route> {
    routes![cast_vote, voter_status, ballot_by_reference]
}

/// A ballot as submitted by a voter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRequest {
    pub party_id: PartyId,
    /// Lets the voter find out whether a submission landed if they never saw
    /// the response. Generated when absent.
    #[serde(default)]
    pub reference: Option<String>,
}

/// A fresh random ballot reference.
fn random_reference() -> String {
    let bytes: [u8; 16] = rand::random();
    HEXLOWER.encode(&bytes)
}

#[post("/voter/vote", data = "<vote>", format = "json")]
async fn cast_vote(
    token: AuthToken,
    vote: Json<VoteRequest>,
    ledger: &State<Ledger>,
    request_id: RequestId,
) -> Result<Json<CommandOutput>> {
    let VoteRequest {
        party_id,
        reference,
    } = vote.0;
    let reference = reference.unwrap_or_else(random_reference);
    debug!("{request_id} ballot reference {reference}");

    let command = Command::CastVote {
        voter_id: token.id.clone(),
        party_id,
        reference,
    };
    let output = ledger.execute(&token.id, command).await?;
    Ok(Json(output))
}

#[get("/voter/status")]
async fn voter_status(token: AuthToken, ledger: &State<Ledger>) -> Json<VoterReport> {
    Json(ledger.voter_report(&token.id).await)
}

/// Ballots can only be looked up by the voter who cast them, or an administrator.
#[get("/voter/ballots/<reference>")]
async fn ballot_by_reference(
    token: AuthToken,
    reference: &str,
    ledger: &State<Ledger>,
) -> Result<Json<Receipt>> {
    ledger
        .ballot_by_reference(reference)
        .await
        .filter(|receipt| {
            receipt.ballot.voter_id == token.id || ledger.is_administrator(&token.id)
        })
        .map(Json)
        .ok_or_else(|| Error::not_found(format!("Ballot with reference '{reference}'")))
}
