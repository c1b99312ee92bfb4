//! Admin account handling: password hashing and the `users.json` store.

pub mod password;
pub mod users;

pub use password::{PasswordRecord, DEFAULT_ITERATIONS, MIN_PASSWORD_LEN};
pub use users::{valid_username, CredentialStore, StoreError, User};
