use rocket::{serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ledger::{
    tally::{Participation, PartyTally},
    Ledger,
};
use crate::model::{id::PartyId, party::PartyRecord, phase::VotingPhase};

pub fn routes() -> Vec<Route> {
    routes![parties, party, results, participation, voting_status]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingStatus {
    pub phase: VotingPhase,
    pub open: bool,
}

#[get("/parties?<include_inactive>")]
async fn parties(
    include_inactive: Option<bool>,
    ledger: &State<Ledger>,
) -> Json<Vec<PartyRecord>> {
    Json(ledger.parties(include_inactive.unwrap_or(false)).await)
}

#[get("/parties/<party_id>")]
async fn party(party_id: PartyId, ledger: &State<Ledger>) -> Result<Json<PartyRecord>> {
    Ok(Json(ledger.party(party_id).await?))
}

#[get("/results")]
async fn results(ledger: &State<Ledger>) -> Json<Vec<PartyTally>> {
    Json(ledger.results().await)
}

#[get("/participation")]
async fn participation(ledger: &State<Ledger>) -> Json<Participation> {
    Json(ledger.participation().await)
}

#[get("/voting/status")]
async fn voting_status(ledger: &State<Ledger>) -> Json<VotingStatus> {
    let phase = ledger.phase().await;
    Json(VotingStatus {
        phase,
        open: phase == VotingPhase::Open,
    })
}
