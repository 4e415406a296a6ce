use std::collections::HashSet;

use crate::model::id::ActorId;

/// Decides whether a caller holds the administrator role.
///
/// Identity itself is established elsewhere; this only maps a verified
/// identity to a role.
pub trait Authorizer: Send + Sync {
    fn is_administrator(&self, caller: &ActorId) -> bool;
}

/// A fixed list of administrator identities, loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct AdminRoster {
    admins: HashSet<ActorId>,
}

impl AdminRoster {
    pub fn new(admins: impl IntoIterator<Item = ActorId>) -> Self {
        Self {
            admins: admins
                .into_iter()
                .filter(|admin| !admin.is_blank())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.admins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.admins.is_empty()
    }
}

impl Authorizer for AdminRoster {
    fn is_administrator(&self, caller: &ActorId) -> bool {
        self.admins.contains(caller)
    }
}
