//! `gatekeeper-core`: foundation building blocks shared by every crate.
//!
//! Pure types only (no infrastructure concerns).

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{PrincipalId, TokenId};
