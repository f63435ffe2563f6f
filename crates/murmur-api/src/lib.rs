pub mod auth;
pub mod channels;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod routes;
pub mod socket;
pub mod state;
pub mod users;
pub mod validation;

pub use routes::router;
pub use state::{AppState, AppStateInner};
