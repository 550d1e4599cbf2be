pub mod chat;
pub mod configure;
pub mod coordinator;
pub mod debounce;

pub use coordinator::SessionCoordinator;
