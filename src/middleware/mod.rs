pub mod request_id;
pub mod tenant;

pub use request_id::request_id_layer;
pub use tenant::{RequestMeta, Tenant};
