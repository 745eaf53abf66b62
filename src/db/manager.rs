use crate::config::{DatabaseConfig as ConfigDatabaseConfig, DbType as ConfigDbType};
use crate::db::{CategoryStore, DatabaseError, EventStore};
use std::sync::Arc;

#[cfg(feature = "postgres")]
use crate::db::postgres::{PostgresCategoryStore, PostgresEventStore};
#[cfg(feature = "postgres")]
use diesel::RunQueryDsl;
#[cfg(feature = "postgres")]
use diesel::pg::PgConnection;
#[cfg(feature = "postgres")]
use diesel::r2d2::{self, ConnectionManager};

#[cfg(feature = "postgres")]
pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;

#[cfg(feature = "sqlite")]
use crate::db::sqlite::{SqliteCategoryStore, SqliteEventStore, establish_connection};

#[derive(Clone)]
pub struct DatabaseManager {
    #[cfg(feature = "postgres")]
    postgres_pool: Option<Pool>,
    #[cfg(feature = "sqlite")]
    sqlite_path: Option<String>,
    category_store: Arc<dyn CategoryStore>,
    event_store: Arc<dyn EventStore>,
    db_type: DbType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    Sqlite,
}

impl From<ConfigDbType> for DbType {
    fn from(value: ConfigDbType) -> Self {
        match value {
            ConfigDbType::Postgres => DbType::Postgres,
            ConfigDbType::Sqlite => DbType::Sqlite,
        }
    }
}

#[cfg(feature = "postgres")]
const POSTGRES_MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS categories (
        category_id BIGINT PRIMARY KEY,
        name VARCHAR(50) NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id BIGINT PRIMARY KEY,
        start_time TIMESTAMP WITH TIME ZONE NOT NULL,
        end_time TIMESTAMP WITH TIME ZONE NOT NULL,
        start_time_local TIMESTAMP NOT NULL,
        end_time_local TIMESTAMP NOT NULL,
        timezone VARCHAR(50) NOT NULL,
        longitude DOUBLE PRECISION,
        latitude DOUBLE PRECISION,
        title TEXT NOT NULL,
        description_text TEXT,
        description_html TEXT,
        url TEXT,
        logo JSONB,
        capacity INTEGER,
        is_free BOOLEAN NOT NULL DEFAULT FALSE,
        online_event BOOLEAN NOT NULL DEFAULT FALSE,
        category_id BIGINT REFERENCES categories(category_id),
        attendees JSONB NOT NULL DEFAULT '[]'::jsonb
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        given_name VARCHAR(75),
        surname VARCHAR(75),
        avatar VARCHAR(200),
        login_service VARCHAR(50),
        login_uid VARCHAR(75),
        login_secret JSONB,
        login_info JSONB
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_events_start_time ON events(start_time)",
    "CREATE INDEX IF NOT EXISTS idx_events_end_time ON events(end_time)",
    "CREATE INDEX IF NOT EXISTS idx_events_category_id ON events(category_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_login ON users(login_service, login_uid)",
];

#[cfg(feature = "sqlite")]
const SQLITE_MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS categories (
        category_id BIGINT PRIMARY KEY NOT NULL,
        name VARCHAR(50) NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id BIGINT PRIMARY KEY NOT NULL,
        start_time TEXT NOT NULL,
        end_time TEXT NOT NULL,
        start_time_local TEXT NOT NULL,
        end_time_local TEXT NOT NULL,
        timezone VARCHAR(50) NOT NULL,
        longitude DOUBLE,
        latitude DOUBLE,
        title TEXT NOT NULL,
        description_text TEXT,
        description_html TEXT,
        url TEXT,
        logo TEXT,
        capacity INTEGER,
        is_free BOOLEAN NOT NULL DEFAULT 0,
        online_event BOOLEAN NOT NULL DEFAULT 0,
        category_id BIGINT REFERENCES categories(category_id),
        attendees TEXT NOT NULL DEFAULT '[]'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        given_name VARCHAR(75),
        surname VARCHAR(75),
        avatar VARCHAR(200),
        login_service VARCHAR(50),
        login_uid VARCHAR(75),
        login_secret TEXT,
        login_info TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_events_start_time ON events(start_time)",
    "CREATE INDEX IF NOT EXISTS idx_events_end_time ON events(end_time)",
    "CREATE INDEX IF NOT EXISTS idx_events_category_id ON events(category_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_login ON users(login_service, login_uid)",
];

impl DatabaseManager {
    pub async fn new(config: &ConfigDatabaseConfig) -> Result<Self, DatabaseError> {
        let db_type = DbType::from(config.db_type());

        match db_type {
            #[cfg(feature = "postgres")]
            DbType::Postgres => {
                let connection_string = config.connection_string();
                let max_connections = config.max_connections();
                let min_connections = config.min_connections();

                let manager = ConnectionManager::<PgConnection>::new(connection_string);

                let builder = r2d2::Pool::builder()
                    .max_size(max_connections.unwrap_or(10))
                    .min_idle(Some(min_connections.unwrap_or(1)));

                let pool = builder
                    .build(manager)
                    .map_err(|e| DatabaseError::Connection(e.to_string()))?;

                let category_store = Arc::new(PostgresCategoryStore::new(pool.clone()));
                let event_store = Arc::new(PostgresEventStore::new(pool.clone()));

                Ok(Self {
                    postgres_pool: Some(pool),
                    #[cfg(feature = "sqlite")]
                    sqlite_path: None,
                    category_store,
                    event_store,
                    db_type,
                })
            }
            #[cfg(feature = "sqlite")]
            DbType::Sqlite => {
                let path = config.sqlite_path().ok_or_else(|| {
                    DatabaseError::Connection("sqlite database url has no file path".to_string())
                })?;
                let path_arc = Arc::new(path.clone());

                let category_store = Arc::new(SqliteCategoryStore::new(path_arc.clone()));
                let event_store = Arc::new(SqliteEventStore::new(path_arc));

                Ok(Self {
                    #[cfg(feature = "postgres")]
                    postgres_pool: None,
                    sqlite_path: Some(path),
                    category_store,
                    event_store,
                    db_type,
                })
            }
            #[cfg(not(feature = "postgres"))]
            DbType::Postgres => Err(DatabaseError::Connection(
                "PostgreSQL feature not enabled".to_string(),
            )),
            #[cfg(not(feature = "sqlite"))]
            DbType::Sqlite => Err(DatabaseError::Connection(
                "SQLite feature not enabled".to_string(),
            )),
        }
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        match self.db_type {
            #[cfg(feature = "postgres")]
            DbType::Postgres => {
                let pool = self.postgres_pool.as_ref().ok_or_else(|| {
                    DatabaseError::Migration("postgres pool is not initialized".to_string())
                })?;
                Self::migrate_postgres(pool).await
            }
            #[cfg(feature = "sqlite")]
            DbType::Sqlite => {
                let path = self.sqlite_path.as_ref().ok_or_else(|| {
                    DatabaseError::Migration("sqlite path is not initialized".to_string())
                })?;
                Self::migrate_sqlite(path).await
            }
            #[cfg(not(feature = "postgres"))]
            DbType::Postgres => Err(DatabaseError::Migration(
                "PostgreSQL feature not enabled".to_string(),
            )),
            #[cfg(not(feature = "sqlite"))]
            DbType::Sqlite => Err(DatabaseError::Migration(
                "SQLite feature not enabled".to_string(),
            )),
        }
    }

    #[cfg(feature = "postgres")]
    async fn migrate_postgres(pool: &Pool) -> Result<(), DatabaseError> {
        let pool = pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| DatabaseError::Connection(e.to_string()))?;

            for statement in POSTGRES_MIGRATIONS {
                diesel::sql_query(*statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    #[cfg(feature = "sqlite")]
    async fn migrate_sqlite(path: &str) -> Result<(), DatabaseError> {
        use diesel::RunQueryDsl;

        let path = path.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&path)?;

            for statement in SQLITE_MIGRATIONS {
                diesel::sql_query(*statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    pub fn category_store(&self) -> Arc<dyn CategoryStore> {
        self.category_store.clone()
    }

    pub fn event_store(&self) -> Arc<dyn EventStore> {
        self.event_store.clone()
    }

    pub fn db_type(&self) -> DbType {
        self.db_type
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{DatabaseManager, DbType};
    use crate::config::{DatabaseConfig, FailurePolicy};
    use crate::db::Category;
    use crate::db::sqlite::tests::{event_record, sqlite_manager};

    #[tokio::test]
    async fn migrate_is_idempotent_and_data_survives_reopen() {
        let (file, manager) = sqlite_manager().await;
        assert_eq!(manager.db_type(), DbType::Sqlite);

        manager
            .category_store()
            .upsert_categories(&[Category::new(103, "Music")])
            .await
            .expect("insert category");
        let mut record = event_record(42, "Reopened");
        record.category_id = Some(103);
        manager
            .event_store()
            .write_cycle(vec![record], FailurePolicy::FailFast)
            .await
            .expect("insert event");

        let config = DatabaseConfig {
            url: Some(format!("sqlite://{}", file.path().to_string_lossy())),
            max_connections: Some(1),
            min_connections: Some(1),
        };
        let reopened = DatabaseManager::new(&config).await.expect("db manager reopened");
        reopened.migrate().await.expect("migrate reopened");

        let persisted = reopened
            .event_store()
            .get_event(42)
            .await
            .expect("query after reopen")
            .expect("event exists after reopen");
        assert_eq!(persisted.record.title, "Reopened");
        assert_eq!(persisted.record.category_id, Some(103));
        assert_eq!(
            persisted.record.end_time,
            Utc.with_ymd_and_hms(2016, 5, 5, 1, 7, 0).unwrap()
        );
        assert_eq!(
            reopened.category_store().count_categories().await.expect("count"),
            1
        );
    }
}
