//! `restohub-core`: shared primitives for the restaurant directory backend.
//!
//! This crate holds the error taxonomy and record identifiers. It performs no IO.

pub mod error;
pub mod id;

pub use error::{ErrorKind, RestError, RestResult};
pub use id::{InvitationId, PageId, RestaurantId, SessionId, UserId};
