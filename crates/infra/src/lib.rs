//! Infrastructure layer: persistence and orchestration of the auth lifecycle.

pub mod admin;
pub mod bootstrap;
pub mod credentials;
pub mod error;
pub mod notifier;
pub mod session;
pub mod store;
pub mod sweeper;

pub use admin::AccountAdmin;
pub use bootstrap::ensure_admin;
pub use credentials::{CredentialValidator, DEFAULT_MAX_FAILED_ATTEMPTS};
pub use error::{AuthError, StoreError};
pub use notifier::{
    Links, LogNotifier, Notification, NotificationKind, Notifier, NotifierError, RecordingNotifier,
};
pub use session::{AuthPolicy, AuthSessionService, RegisteredAccount, TokenPair};
pub use store::{
    AuthStore, InMemoryAuthStore, LockFilter, PostgresAuthStore, PrincipalStore, TokenStore,
};
pub use sweeper::{ExpirySweeper, SweepReport, SweeperConfig, SweeperHandle, SweeperStats};
