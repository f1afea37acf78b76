pub mod authorization;
pub mod pkce;
pub mod token;

pub use authorization::{AuthorizationBroker, AuthorizationFlow, RedirectResponse};
pub use token::{Claims, Session};
