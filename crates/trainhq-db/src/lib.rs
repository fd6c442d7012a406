pub use sea_orm;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};

pub mod entities;

pub async fn connect(database_url: &str) -> Result<DatabaseConnection, sea_orm::DbErr> {
    let mut opts = ConnectOptions::new(database_url.to_string());
    // An in-memory SQLite database only exists on the connection that created it.
    if database_url.starts_with("sqlite::memory:") {
        opts.max_connections(1).min_connections(1);
    }
    opts.sqlx_logging(false);
    Database::connect(opts).await
}
