pub mod cache;
pub mod http;
pub mod provider;

pub use cache::CachedTokenProvider;
pub use provider::{ClientCredentialsProvider, TokenProvider};
