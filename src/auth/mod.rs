pub mod credential_store;
pub mod guard;
pub mod refresher;
pub mod session;

// Re-exports so we can do "use crate::auth::*;"
pub use credential_store::CredentialStore;
pub use guard::{Route, RouteAccess, RouteDecision};
pub use refresher::CredentialRefresher;
pub use session::{AuthState, AuthStatus, SessionContext};
