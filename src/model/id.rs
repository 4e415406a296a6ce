use std::fmt::{self, Display, Formatter};
use std::num::ParseIntError;

use rocket::{
    http::{
        impl_from_uri_param_identity,
        uri::fmt::{Path, UriDisplay},
    },
    request::FromParam,
};
use serde::{Deserialize, Serialize};

/// Stable identity of an actor (administrator or voter), as supplied by the
/// external identity layer. A voter's ID is the ID they authenticate with.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Display for ActorId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ActorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ActorId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl<'a> FromParam<'a> for ActorId {
    type Error = &'a str;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        if param.trim().is_empty() {
            Err(param)
        } else {
            Ok(Self::from(param))
        }
    }
}

impl UriDisplay<Path> for ActorId {
    fn fmt(&self, formatter: &mut rocket::http::uri::fmt::Formatter<'_, Path>) -> fmt::Result {
        formatter.write_value(self.as_str())
    }
}

impl_from_uri_param_identity!([Path] ActorId);

/// Sequentially assigned party identifier, starting at 1. Never reused.
#[derive(
    Debug, Default, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PartyId(pub u32);

impl PartyId {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for PartyId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'a> FromParam<'a> for PartyId {
    type Error = ParseIntError;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        param.parse::<u32>().map(PartyId)
    }
}

impl UriDisplay<Path> for PartyId {
    fn fmt(&self, formatter: &mut rocket::http::uri::fmt::Formatter<'_, Path>) -> fmt::Result {
        formatter.write_value(self.0)
    }
}

impl_from_uri_param_identity!([Path] PartyId);
