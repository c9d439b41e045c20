//! Domain model for orders and disputes.
//!
//! Aggregates, closed status vocabularies, provider webhook payloads and the
//! event-log types shared by both entity kinds.

/// A string that does not name any member of a closed vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// Declares `as_str`, `Display` and `FromStr` for a unit-only enum whose wire
/// form is a fixed lowercase string.
macro_rules! string_enum {
    ($ty:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            /// All members, in declaration order.
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = $crate::domain::UnknownVariant;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err($crate::domain::UnknownVariant::new($label, other)),
                }
            }
        }
    };
}

pub mod dispute;
pub mod events;
pub mod order;

pub use dispute::{
    ChargebackStatus, ChargebackWebhook, Dispute, DisputeError, DisputeEvent, DisputeEventKind,
    DisputeStatus, Evidence, EvidenceFile, EvidenceUpsert, Resolution,
};
pub use events::{Event, EventKind, EventPage, EventQuery, EventQueryBuilder, NewEvent, SortDirection};
pub use order::{
    CaptureRequest, CaptureResponse, HoldAction, HoldReason, HoldRequest, HoldResponse, Order,
    OrderError, OrderEvent, OrderEventKind, OrderStatus, OrdersQuery, OrdersQueryBuilder,
    PaymentWebhook, SortField, SortOrder,
};
