//! Strongly typed row identifiers.
//!
//! Every entity id is a distinct type so a payout id can never be passed where
//! an account id is expected. [`SpaceId`] is the tenant boundary and is
//! threaded explicitly through every store call.

use serde::Serialize;
use std::fmt;

macro_rules! id_type {
    ($($(#[$meta:meta])* $name:ident),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
            #[serde(transparent)]
            pub struct $name(pub i64);

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )+
    };
}

id_type!(
    /// Tenant (space) identifier.
    SpaceId,
    FirmId,
    AccountId,
    RuleId,
    AssignmentId,
    TradeId,
    PayoutId,
    ViolationId,
);
