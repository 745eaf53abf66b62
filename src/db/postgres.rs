use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::upsert::excluded;
use serde_json::Value;
use tracing::warn;

use crate::config::FailurePolicy;
use crate::db::manager::Pool;
use crate::db::schema::{categories, events};

use super::{
    DatabaseError,
    models::{Category, CycleWrite, EventQuery, EventRecord, GeoPoint, StoredEvent},
};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = events)]
struct DbEvent {
    id: i64,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    start_time_local: NaiveDateTime,
    end_time_local: NaiveDateTime,
    timezone: String,
    longitude: Option<f64>,
    latitude: Option<f64>,
    title: String,
    description_text: Option<String>,
    description_html: Option<String>,
    url: Option<String>,
    logo: Option<Value>,
    capacity: Option<i32>,
    is_free: bool,
    online_event: bool,
    category_id: Option<i64>,
    attendees: Value,
}

impl TryFrom<DbEvent> for StoredEvent {
    type Error = DatabaseError;

    fn try_from(value: DbEvent) -> Result<Self, Self::Error> {
        Ok(Self {
            attendees: serde_json::from_value(value.attendees)?,
            record: EventRecord {
                id: value.id,
                start_time: value.start_time,
                end_time: value.end_time,
                start_time_local: value.start_time_local,
                end_time_local: value.end_time_local,
                timezone: value.timezone,
                location: GeoPoint::from_columns(value.longitude, value.latitude),
                title: value.title,
                description_text: value.description_text,
                description_html: value.description_html,
                url: value.url,
                logo: value.logo,
                capacity: value.capacity,
                is_free: value.is_free,
                online_event: value.online_event,
                category_id: value.category_id,
            },
        })
    }
}

// attendees is excluded; None fields overwrite with NULL.
#[derive(Clone, Copy, Insertable, AsChangeset)]
#[diesel(table_name = events, treat_none_as_null = true)]
struct UpstreamEventColumns<'a> {
    start_time: &'a DateTime<Utc>,
    end_time: &'a DateTime<Utc>,
    start_time_local: &'a NaiveDateTime,
    end_time_local: &'a NaiveDateTime,
    timezone: &'a str,
    longitude: Option<f64>,
    latitude: Option<f64>,
    title: &'a str,
    description_text: Option<&'a str>,
    description_html: Option<&'a str>,
    url: Option<&'a str>,
    logo: Option<&'a Value>,
    capacity: Option<i32>,
    is_free: bool,
    online_event: bool,
    category_id: Option<i64>,
}

impl<'a> UpstreamEventColumns<'a> {
    fn from_record(record: &'a EventRecord) -> Self {
        Self {
            start_time: &record.start_time,
            end_time: &record.end_time,
            start_time_local: &record.start_time_local,
            end_time_local: &record.end_time_local,
            timezone: &record.timezone,
            longitude: record.location.map(|point| point.longitude),
            latitude: record.location.map(|point| point.latitude),
            title: &record.title,
            description_text: record.description_text.as_deref(),
            description_html: record.description_html.as_deref(),
            url: record.url.as_deref(),
            logo: record.logo.as_ref(),
            capacity: record.capacity,
            is_free: record.is_free,
            online_event: record.online_event,
            category_id: record.category_id,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = events)]
struct NewEventRow<'a> {
    id: i64,
    #[diesel(embed)]
    columns: UpstreamEventColumns<'a>,
    attendees: Value,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = categories)]
struct DbCategory {
    category_id: i64,
    name: String,
}

impl From<DbCategory> for Category {
    fn from(value: DbCategory) -> Self {
        Self {
            category_id: value.category_id,
            name: value.name,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = categories)]
struct NewCategory<'a> {
    category_id: i64,
    name: &'a str,
}

async fn with_connection<T, F>(pool: Pool, operation: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&mut PgConnection) -> Result<T, DatabaseError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        operation(&mut conn)
    })
    .await
    .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
}

async fn with_transaction<T, F>(pool: Pool, operation: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&mut PgConnection) -> Result<T, DatabaseError> + Send + 'static,
{
    with_connection(pool, move |conn| conn.transaction(operation)).await
}

fn upsert_event(conn: &mut PgConnection, record: &EventRecord) -> Result<(), DatabaseError> {
    let columns = UpstreamEventColumns::from_record(record);
    let row = NewEventRow {
        id: record.id,
        columns,
        attendees: Value::Array(Vec::new()),
    };

    diesel::insert_into(events::table)
        .values(&row)
        .on_conflict(events::id)
        .do_update()
        .set(columns)
        .execute(conn)?;
    Ok(())
}

fn write_records(
    conn: &mut PgConnection,
    records: &[EventRecord],
    policy: FailurePolicy,
) -> Result<CycleWrite, DatabaseError> {
    let mut outcome = CycleWrite::default();
    for record in records {
        match policy {
            FailurePolicy::FailFast => {
                upsert_event(conn, record)?;
                outcome.written += 1;
            }
            FailurePolicy::Skip => match conn.transaction(|conn| upsert_event(conn, record)) {
                Ok(()) => outcome.written += 1,
                Err(e) => {
                    warn!("skipping event id={} write failed: {}", record.id, e);
                    outcome.skipped += 1;
                }
            },
        }
    }
    Ok(outcome)
}

pub struct PostgresCategoryStore {
    pool: Pool,
}

impl PostgresCategoryStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::CategoryStore for PostgresCategoryStore {
    async fn count_categories(&self) -> Result<i64, DatabaseError> {
        with_connection(self.pool.clone(), |conn| {
            categories::table
                .count()
                .get_result::<i64>(conn)
                .map_err(Into::into)
        })
        .await
    }

    async fn upsert_categories(&self, items: &[Category]) -> Result<usize, DatabaseError> {
        let items = items.to_vec();
        with_transaction(self.pool.clone(), move |conn| {
            for category in &items {
                diesel::insert_into(categories::table)
                    .values(NewCategory {
                        category_id: category.category_id,
                        name: &category.name,
                    })
                    .on_conflict(categories::category_id)
                    .do_update()
                    .set(categories::name.eq(excluded(categories::name)))
                    .execute(conn)?;
            }
            Ok(items.len())
        })
        .await
    }

    async fn list_categories(&self) -> Result<Vec<Category>, DatabaseError> {
        with_connection(self.pool.clone(), |conn| {
            categories::table
                .order(categories::category_id.asc())
                .select(DbCategory::as_select())
                .load::<DbCategory>(conn)
                .map(|rows| rows.into_iter().map(Into::into).collect())
                .map_err(Into::into)
        })
        .await
    }

    async fn find_category_by_name(&self, name: &str) -> Result<Option<Category>, DatabaseError> {
        let name = name.to_string();
        with_connection(self.pool.clone(), move |conn| {
            categories::table
                .filter(categories::name.eq(name))
                .select(DbCategory::as_select())
                .first::<DbCategory>(conn)
                .optional()
                .map(|value| value.map(Into::into))
                .map_err(Into::into)
        })
        .await
    }
}

pub struct PostgresEventStore {
    pool: Pool,
}

impl PostgresEventStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::EventStore for PostgresEventStore {
    async fn write_cycle(
        &self,
        records: Vec<EventRecord>,
        policy: FailurePolicy,
    ) -> Result<CycleWrite, DatabaseError> {
        with_transaction(self.pool.clone(), move |conn| {
            write_records(conn, &records, policy)
        })
        .await
    }

    async fn get_event(&self, event_id: i64) -> Result<Option<StoredEvent>, DatabaseError> {
        with_connection(self.pool.clone(), move |conn| {
            events::table
                .find(event_id)
                .select(DbEvent::as_select())
                .first::<DbEvent>(conn)
                .optional()?
                .map(StoredEvent::try_from)
                .transpose()
        })
        .await
    }

    async fn count_events(&self) -> Result<i64, DatabaseError> {
        with_connection(self.pool.clone(), |conn| {
            events::table
                .count()
                .get_result::<i64>(conn)
                .map_err(Into::into)
        })
        .await
    }

    async fn list_events(&self, query: &EventQuery) -> Result<Vec<StoredEvent>, DatabaseError> {
        let query = query.clone();
        with_connection(self.pool.clone(), move |conn| {
            let mut statement = events::table.select(DbEvent::as_select()).into_boxed();
            if let Some(after) = query.starts_after {
                statement = statement.filter(events::start_time.ge(after));
            }
            if let Some(before) = query.starts_before {
                statement = statement.filter(events::start_time.lt(before));
            }
            if let Some(category) = query.category_id {
                statement = statement.filter(events::category_id.eq(category));
            }

            statement
                .order((events::start_time.asc(), events::id.asc()))
                .limit(query.limit)
                .load::<DbEvent>(conn)?
                .into_iter()
                .map(StoredEvent::try_from)
                .collect()
        })
        .await
    }

    async fn delete_events_ended_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, DatabaseError> {
        with_transaction(self.pool.clone(), move |conn| {
            diesel::delete(events::table.filter(events::end_time.lt(cutoff)))
                .execute(conn)
                .map_err(Into::into)
        })
        .await
    }
}
