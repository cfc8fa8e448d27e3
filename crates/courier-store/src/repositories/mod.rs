//! Stateless repositories. Every method takes `&Connection`.

pub mod messages;
pub mod users;

pub use messages::MessageRepo;
pub use users::UserRepo;
