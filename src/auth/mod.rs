pub mod claims;
pub mod context;
pub mod jwt;
pub mod middleware;
pub mod password;

pub use claims::Claims;
pub use context::AuthContext;
pub use jwt::TokenIssuer;
pub use middleware::{RequireAuth, RequireManager};
