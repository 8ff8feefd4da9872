//! stakeindex-mina: Mina daemon GraphQL client and block source.

pub mod client;
pub mod error;
pub mod mapper;
pub mod queries;
pub mod retry;
pub mod source;
pub mod types;

pub use client::{HttpClient, HttpClientConfig, MinaClient};
pub use error::ClientError;
pub use mapper::{decode_memo, BlockMapper};
pub use retry::{RetryConfig, RetryPolicy};
pub use source::{MinaSource, DEFAULT_WINDOW};
