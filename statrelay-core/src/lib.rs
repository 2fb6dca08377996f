pub mod config;
pub mod credential;
pub mod error;
pub mod token;

pub use config::RelayConfig;
pub use credential::{Credential, SecretString};
pub use error::{AuthError, ForwardError, RelayError};
pub use token::AccessToken;
