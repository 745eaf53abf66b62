use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel::upsert::excluded;
use std::sync::Arc;
use tracing::warn;

use crate::config::FailurePolicy;
use crate::db::schema_sqlite::{categories, events};

use super::{
    DatabaseError,
    models::{Category, CycleWrite, EventQuery, EventRecord, GeoPoint, StoredEvent},
};

const LOCAL_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

// Fixed-width UTC text so that string comparison orders like time does
pub(crate) fn datetime_to_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Query(format!("invalid datetime format: {}", e)))
}

fn naive_to_string(dt: &NaiveDateTime) -> String {
    dt.format(LOCAL_TIME_FORMAT).to_string()
}

fn string_to_naive(s: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(s, LOCAL_TIME_FORMAT)
        .map_err(|e| DatabaseError::Query(format!("invalid local datetime format: {}", e)))
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = events)]
struct DbEvent {
    id: i64,
    start_time: String,
    end_time: String,
    start_time_local: String,
    end_time_local: String,
    timezone: String,
    longitude: Option<f64>,
    latitude: Option<f64>,
    title: String,
    description_text: Option<String>,
    description_html: Option<String>,
    url: Option<String>,
    logo: Option<String>,
    capacity: Option<i32>,
    is_free: bool,
    online_event: bool,
    category_id: Option<i64>,
    attendees: String,
}

impl DbEvent {
    fn to_stored_event(&self) -> Result<StoredEvent, DatabaseError> {
        let logo = self
            .logo
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(StoredEvent {
            record: EventRecord {
                id: self.id,
                start_time: string_to_datetime(&self.start_time)?,
                end_time: string_to_datetime(&self.end_time)?,
                start_time_local: string_to_naive(&self.start_time_local)?,
                end_time_local: string_to_naive(&self.end_time_local)?,
                timezone: self.timezone.clone(),
                location: GeoPoint::from_columns(self.longitude, self.latitude),
                title: self.title.clone(),
                description_text: self.description_text.clone(),
                description_html: self.description_html.clone(),
                url: self.url.clone(),
                logo,
                capacity: self.capacity,
                is_free: self.is_free,
                online_event: self.online_event,
                category_id: self.category_id,
            },
            attendees: serde_json::from_str(&self.attendees)?,
        })
    }
}

// attendees is excluded; None fields overwrite with NULL.
#[derive(Clone, Insertable, AsChangeset)]
#[diesel(table_name = events, treat_none_as_null = true)]
struct UpstreamEventColumns<'a> {
    start_time: String,
    end_time: String,
    start_time_local: String,
    end_time_local: String,
    timezone: &'a str,
    longitude: Option<f64>,
    latitude: Option<f64>,
    title: &'a str,
    description_text: Option<&'a str>,
    description_html: Option<&'a str>,
    url: Option<&'a str>,
    logo: Option<String>,
    capacity: Option<i32>,
    is_free: bool,
    online_event: bool,
    category_id: Option<i64>,
}

impl<'a> UpstreamEventColumns<'a> {
    fn from_record(record: &'a EventRecord) -> Result<Self, DatabaseError> {
        Ok(Self {
            start_time: datetime_to_string(&record.start_time),
            end_time: datetime_to_string(&record.end_time),
            start_time_local: naive_to_string(&record.start_time_local),
            end_time_local: naive_to_string(&record.end_time_local),
            timezone: &record.timezone,
            longitude: record.location.map(|point| point.longitude),
            latitude: record.location.map(|point| point.latitude),
            title: &record.title,
            description_text: record.description_text.as_deref(),
            description_html: record.description_html.as_deref(),
            url: record.url.as_deref(),
            logo: record.logo.as_ref().map(serde_json::to_string).transpose()?,
            capacity: record.capacity,
            is_free: record.is_free,
            online_event: record.online_event,
            category_id: record.category_id,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = events)]
struct NewEventRow<'a> {
    id: i64,
    #[diesel(embed)]
    columns: UpstreamEventColumns<'a>,
    attendees: &'a str,
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

pub(crate) fn establish_connection(path: &str) -> Result<SqliteConnection, DatabaseError> {
    let mut conn = SqliteConnection::establish(path)
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;
    conn.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;
    Ok(conn)
}

async fn with_connection<T, F>(db_path: Arc<String>, operation: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&mut SqliteConnection) -> Result<T, DatabaseError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = establish_connection(&db_path)?;
        operation(&mut conn)
    })
    .await
    .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
}

async fn with_transaction<T, F>(db_path: Arc<String>, operation: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&mut SqliteConnection) -> Result<T, DatabaseError> + Send + 'static,
{
    with_connection(db_path, move |conn| conn.transaction(operation)).await
}

fn upsert_event(conn: &mut SqliteConnection, record: &EventRecord) -> Result<(), DatabaseError> {
    let columns = UpstreamEventColumns::from_record(record)?;
    let row = NewEventRow {
        id: record.id,
        columns: columns.clone(),
        attendees: "[]",
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
    conn: &mut SqliteConnection,
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

pub struct SqliteCategoryStore {
    db_path: Arc<String>,
}

impl SqliteCategoryStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::CategoryStore for SqliteCategoryStore {
    async fn count_categories(&self) -> Result<i64, DatabaseError> {
        with_connection(self.db_path.clone(), |conn| {
            categories::table
                .count()
                .get_result::<i64>(conn)
                .map_err(Into::into)
        })
        .await
    }

    async fn upsert_categories(&self, items: &[Category]) -> Result<usize, DatabaseError> {
        let items = items.to_vec();
        with_transaction(self.db_path.clone(), move |conn| {
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
        with_connection(self.db_path.clone(), |conn| {
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
        with_connection(self.db_path.clone(), move |conn| {
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

pub struct SqliteEventStore {
    db_path: Arc<String>,
}

impl SqliteEventStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::EventStore for SqliteEventStore {
    async fn write_cycle(
        &self,
        records: Vec<EventRecord>,
        policy: FailurePolicy,
    ) -> Result<CycleWrite, DatabaseError> {
        with_transaction(self.db_path.clone(), move |conn| {
            write_records(conn, &records, policy)
        })
        .await
    }

    async fn get_event(&self, event_id: i64) -> Result<Option<StoredEvent>, DatabaseError> {
        with_connection(self.db_path.clone(), move |conn| {
            events::table
                .find(event_id)
                .select(DbEvent::as_select())
                .first::<DbEvent>(conn)
                .optional()?
                .map(|row| row.to_stored_event())
                .transpose()
        })
        .await
    }

    async fn count_events(&self) -> Result<i64, DatabaseError> {
        with_connection(self.db_path.clone(), |conn| {
            events::table
                .count()
                .get_result::<i64>(conn)
                .map_err(Into::into)
        })
        .await
    }

    async fn list_events(&self, query: &EventQuery) -> Result<Vec<StoredEvent>, DatabaseError> {
        let query = query.clone();
        with_connection(self.db_path.clone(), move |conn| {
            let mut statement = events::table.select(DbEvent::as_select()).into_boxed();
            if let Some(after) = query.starts_after {
                statement = statement.filter(events::start_time.ge(datetime_to_string(&after)));
            }
            if let Some(before) = query.starts_before {
                statement = statement.filter(events::start_time.lt(datetime_to_string(&before)));
            }
            if let Some(category) = query.category_id {
                statement = statement.filter(events::category_id.eq(category));
            }

            statement
                .order((events::start_time.asc(), events::id.asc()))
                .limit(query.limit)
                .load::<DbEvent>(conn)?
                .iter()
                .map(DbEvent::to_stored_event)
                .collect()
        })
        .await
    }

    async fn delete_events_ended_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, DatabaseError> {
        with_transaction(self.db_path.clone(), move |conn| {
            diesel::delete(events::table.filter(events::end_time.lt(datetime_to_string(&cutoff))))
                .execute(conn)
                .map_err(Into::into)
        })
        .await
    }
}
