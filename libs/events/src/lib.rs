//! # keyprop-events
//!
//! API-key change events for the keyprop control plane.
//!
//! ## Design Principles
//!
//! - Events are immutable once built; the builder is the only constructor
//!   that validates input
//! - A revocation never carries key material, by construction
//! - Key material travels in cleartext to the gateway (which hashes it) but
//!   is redacted from every `Debug` rendering
//! - Building an event never performs I/O
//!
//! ## Wire Shape
//!
//! Transport delivers a [`DeliveryEnvelope`] wrapping one [`ChangeEvent`].
//! Change events are adjacently tagged:
//! `{"event_type": "api_key.revoked", "payload": {...}}`.

mod builder;
mod envelope;
mod error;
mod types;

pub use builder::*;
pub use envelope::*;
pub use error::EventError;
pub use types::*;
