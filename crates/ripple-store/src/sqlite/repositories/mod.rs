//! Stateless repositories. Every method takes a `&Connection`.

pub mod connection;
pub mod subscription;

pub use connection::ConnectionRepo;
pub use subscription::SubscriptionRepo;
