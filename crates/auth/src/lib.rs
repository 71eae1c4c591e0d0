//! `gatekeeper-auth`: pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: it knows how
//! to sign and verify tokens, hash passwords, and make role decisions, but
//! never where principals or token records live.

pub mod authorize;
pub mod claims;
pub mod codec;
pub mod password;
pub mod principal;
pub mod registration;
pub mod roles;
pub mod token;

pub use authorize::{AuthzError, authorize_role};
pub use claims::{TokenClaims, TokenKind, validate_window};
pub use codec::{ParsedToken, TokenCodec, TokenError, TokenTtls};
pub use password::{PasswordError, PasswordHasher};
pub use principal::{AuthenticatedPrincipal, NewPrincipal, Principal};
pub use registration::{Registration, passwords_match, validate_password};
pub use roles::Role;
pub use token::{IssuedToken, bearer_token};

pub use gatekeeper_core::{PrincipalId, TokenId};
