pub mod sentry;
pub mod slug;
pub mod validation;
