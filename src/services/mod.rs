//! Service layer modules for external integrations.
//!
//! Redis caching, SMTP mail, payment gateways, the audit writer and the
//! login throttle.

pub mod audit;
pub mod cache;
pub mod login_throttle;
pub mod mailer;
pub mod payments;

pub use cache::RedisCache;
pub use login_throttle::LoginThrottle;
pub use mailer::Mailer;
pub use payments::PaymentGateways;
