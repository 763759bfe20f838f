pub mod credential;
pub mod profile;
pub mod receipt;

pub use credential::AccessCredential;
pub use profile::UserProfile;
pub use receipt::*;
