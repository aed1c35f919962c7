use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use common::{Envelope, EventData, GlobalPosition, MessageId, StreamId, StreamVersion};

use crate::error::EventStoreError;
use crate::event::{EventEnvelope, PersistedEvent};
use crate::store::EventStore;
use crate::Result;

/// PostgreSQL-backed event store.
///
/// Streams live in a row-versioned `stream` table; event payloads are stored
/// as opaque `jsonb` in `event`; the `event_sequence` table assigns the
/// global order. Position assignment is serialized on a single-row counter so
/// positions stay gapless and strictly increasing even across concurrent
/// appends to unrelated streams.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_event(row: PgRow) -> Result<PersistedEvent> {
        Ok(PersistedEvent {
            event: Envelope {
                message_id: MessageId::from_uuid(row.try_get::<Uuid, _>("message_id")?),
                correlation_id: row.try_get("correlation_id")?,
                causation_id: row
                    .try_get::<Option<Uuid>, _>("causation_id")?
                    .map(MessageId::from_uuid),
                payload: EventData {
                    event_type: row.try_get("event_type")?,
                    payload: row.try_get("payload")?,
                },
            },
            stream_id: StreamId::from_uuid(row.try_get::<Uuid, _>("stream_id")?),
            version: StreamVersion::new(row.try_get("version")?),
            position: GlobalPosition::new(row.try_get("position")?),
        })
    }

    async fn actual_version(
        tx: &mut sqlx::PgConnection,
        stream_id: StreamId,
    ) -> Result<StreamVersion> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM stream WHERE stream_id = $1")
                .bind(stream_id.as_uuid())
                .fetch_optional(tx)
                .await?;
        Ok(StreamVersion::new(version.unwrap_or(0)))
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn save_events(
        &self,
        stream_id: StreamId,
        new_events: Vec<EventEnvelope>,
        expected_version: StreamVersion,
    ) -> Result<GlobalPosition> {
        let mut tx = self.pool.begin().await?;

        let new_version = expected_version.as_i64() + new_events.len() as i64;
        if expected_version == StreamVersion::BEGINNING {
            let inserted = sqlx::query(
                "INSERT INTO stream (stream_id, version) VALUES ($1, $2) \
                 ON CONFLICT (stream_id) DO NOTHING",
            )
            .bind(stream_id.as_uuid())
            .bind(new_version)
            .execute(&mut *tx)
            .await?;
            if inserted.rows_affected() == 0 {
                let actual = Self::actual_version(&mut tx, stream_id).await?;
                return Err(EventStoreError::ConcurrencyConflict {
                    stream_id,
                    expected: expected_version,
                    actual,
                });
            }
        } else {
            // the row lock on `stream` serializes writers to this stream; a
            // loser wakes up, matches zero rows and reports the conflict
            let updated =
                sqlx::query("UPDATE stream SET version = $2 WHERE stream_id = $1 AND version = $3")
                    .bind(stream_id.as_uuid())
                    .bind(new_version)
                    .bind(expected_version.as_i64())
                    .execute(&mut *tx)
                    .await?;
            if updated.rows_affected() == 0 {
                let actual = Self::actual_version(&mut tx, stream_id).await?;
                return Err(EventStoreError::ConcurrencyConflict {
                    stream_id,
                    expected: expected_version,
                    actual,
                });
            }
        }

        let start: i64 =
            sqlx::query_scalar("SELECT position FROM global_position WHERE id = 1 FOR UPDATE")
                .fetch_one(&mut *tx)
                .await?;

        let mut version = expected_version;
        let mut position = start;
        let appended = new_events.len() as u64;
        for event in &new_events {
            version = version.next();
            position += 1;
            sqlx::query(
                "INSERT INTO event \
                 (stream_id, version, message_id, correlation_id, causation_id, event_type, payload) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(stream_id.as_uuid())
            .bind(version.as_i64())
            .bind(event.message_id.as_uuid())
            .bind(event.correlation_id)
            .bind(event.causation_id.map(|id| id.as_uuid()))
            .bind(&event.payload.event_type)
            .bind(&event.payload.payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("event_pkey")
                {
                    return EventStoreError::ConcurrencyConflict {
                        stream_id,
                        expected: expected_version,
                        actual: version,
                    };
                }
                EventStoreError::Database(e)
            })?;
            sqlx::query("INSERT INTO event_sequence (position, stream_id, version) VALUES ($1, $2, $3)")
                .bind(position)
                .bind(stream_id.as_uuid())
                .bind(version.as_i64())
                .execute(&mut *tx)
                .await?;
            tracing::trace!(
                stream_id = %stream_id,
                version = %version,
                position,
                event_type = %event.payload.event_type,
                "saved event"
            );
        }

        sqlx::query("UPDATE global_position SET position = $1 WHERE id = 1")
            .bind(position)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        metrics::counter!("event_store_events_saved").increment(appended);
        Ok(GlobalPosition::new(position))
    }

    async fn events_for_stream(
        &self,
        stream_id: StreamId,
        since_version: StreamVersion,
    ) -> Result<Vec<PersistedEvent>> {
        let rows = sqlx::query(
            "SELECT e.message_id, e.correlation_id, e.causation_id, e.event_type, e.payload, \
                    e.stream_id, e.version, s.position \
             FROM event e \
             JOIN event_sequence s USING (stream_id, version) \
             WHERE e.stream_id = $1 \
               AND e.version > $2 \
             ORDER BY e.version",
        )
        .bind(stream_id.as_uuid())
        .bind(since_version.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn all_events(&self, since_position: GlobalPosition) -> Result<Vec<PersistedEvent>> {
        let rows = sqlx::query(
            "SELECT e.message_id, e.correlation_id, e.causation_id, e.event_type, e.payload, \
                    e.stream_id, e.version, s.position \
             FROM event e \
             JOIN event_sequence s USING (stream_id, version) \
             WHERE s.position > $1 \
             ORDER BY s.position",
        )
        .bind(since_position.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn current_version(&self, stream_id: StreamId) -> Result<StreamVersion> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM stream WHERE stream_id = $1")
                .bind(stream_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        Ok(StreamVersion::new(version.unwrap_or(0)))
    }

    async fn current_position(&self) -> Result<GlobalPosition> {
        let position: i64 = sqlx::query_scalar("SELECT position FROM global_position WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(GlobalPosition::new(position))
    }
}
