pub mod credentials;
pub mod error;
pub mod schema;

pub use credentials::Credentials;
