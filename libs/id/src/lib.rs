//! # keyprop-id
//!
//! Identifier types shared by the keyprop control plane.
//!
//! ## Two Kinds of Identifier
//!
//! - **IDs** are minted by keyprop itself. They are ULID-backed and use a
//!   prefixed format: `{prefix}_{ulid}` (for example
//!   `bcast_01HV4Z2WQXKJNM8GPQY6VBKC3D`).
//! - **Labels** are owned by the upstream platform (org IDs, API handles,
//!   gateway IDs, key names). keyprop does not control their shape, so they
//!   are validated strings rather than ULIDs.
//!
//! Both kinds are typed so that a gateway ID can never be passed where a key
//! name is expected.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;

#[doc(hidden)]
pub use serde as __serde;
