//! Consumer controllers.
//!
//! Bind a broker message to the service operation its envelope names.
//! Duplicate deliveries are acknowledged; semantic failures are wrapped in
//! [`Permanent`] so the retry layer hands them straight to the DLQ.

use serde::de::DeserializeOwned;

use crate::bus::{Envelope, HandlerError, Message, Permanent};

pub mod dispute;
pub mod order;

pub use dispute::DisputeConsumer;
pub use order::OrderConsumer;

/// Decode the envelope and its payload, checking the message type.
fn decode<T: DeserializeOwned>(message: &Message, expected_type: &str) -> Result<T, HandlerError> {
    let envelope = Envelope::decode(&message.value).map_err(Permanent::wrap)?;
    if envelope.message_type != expected_type {
        return Err(Permanent::wrap(format!(
            "unexpected envelope type '{}', want '{expected_type}'",
            envelope.message_type
        )));
    }
    envelope.payload_as().map_err(Permanent::wrap)
}
