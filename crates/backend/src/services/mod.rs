//! Domain operations over the [`Gateway`](crate::gateway::Gateway).
//!
//! Services are cheap borrowed views; handlers build one per request from
//! [`AppState`](crate::AppState).

mod businesses;
pub(crate) mod conversations;
mod customers;
pub mod error;
mod messages;
mod team;
mod users;

pub use businesses::BusinessService;
pub use conversations::ConversationService;
pub use customers::CustomerService;
pub use error::ServiceError;
pub use messages::MessageService;
pub use team::TeamService;
pub use users::UserService;
