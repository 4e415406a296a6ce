pub mod audit;
pub mod auth;
pub mod ballot;
pub mod id;
pub mod mongodb;
pub mod party;
pub mod phase;
pub mod voter;
