//! Client-side state for Murmur: an authenticated HTTP session, the relay
//! socket, and the personal/channel conversation state a UI renders from.

pub mod api;
pub mod auth;
pub mod chat;
pub mod error;

pub use api::ApiClient;
pub use auth::AuthStore;
pub use chat::{ChatStore, Tab};
pub use error::ClientError;
