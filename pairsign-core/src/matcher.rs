//! Session matcher
//!
//! Decides whether an existing session can be reused for a set of required
//! permissions, or whether a new one has to be created.

use crate::protocol::{Permissions, Session};

/// Outcome of planning an open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenPlan {
    /// Adopt this existing session
    Reuse(Session),
    /// Start a new handshake
    Create,
    /// Nothing reusable and only reconnecting was asked for
    Skip,
}

/// First session granting every required chain and method
pub fn find_reusable<'a>(sessions: &'a [Session], required: &Permissions) -> Option<&'a Session> {
    sessions.iter().find(|session| covers(&session.permissions, required))
}

/// Decide how to open given the sessions the client already knows
pub fn plan_open(sessions: &[Session], required: &Permissions, only_reconnect: bool) -> OpenPlan {
    match find_reusable(sessions, required) {
        Some(session) => OpenPlan::Reuse(session.clone()),
        None if only_reconnect => OpenPlan::Skip,
        None => OpenPlan::Create,
    }
}

fn covers(granted: &Permissions, required: &Permissions) -> bool {
    required
        .chains()
        .iter()
        .all(|chain| granted.chains().contains(chain))
        && required
            .methods()
            .iter()
            .all(|method| granted.methods().contains(method))
}
