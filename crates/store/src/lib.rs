pub mod connection;
pub mod market;
pub mod migrations;
pub mod users;

pub use connection::{connect_with_settings, DbPool};
pub use market::SqlMarketStore;
pub use users::SqlConversationStore;
