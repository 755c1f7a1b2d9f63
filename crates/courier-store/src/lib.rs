pub mod database;
pub mod error;
pub mod message_logs;
pub mod row_helpers;
pub mod schema;

pub use database::Database;
pub use error::StoreError;
pub use message_logs::MessageLogRepo;
