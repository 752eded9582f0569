use crate::models::{Character, CharacterImages, CharacterOrder, CharacterQuery, Outcome};
use crate::services::store::{EntityStore, StoreError, TallyReceipt};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use uuid::Uuid;

/// Postgres error code for a foreign key violation
const FOREIGN_KEY_VIOLATION: &str = "23503";

const CHARACTER_COLUMNS: &str = "character_id, name, image32, image64, image128, image256, image512, \
     race, gender, bloodline, wins, losses, report_count";

/// Row shape of the `characters` table
#[derive(Debug, FromRow)]
struct CharacterRow {
    character_id: String,
    name: String,
    image32: String,
    image64: String,
    image128: String,
    image256: String,
    image512: String,
    race: String,
    gender: String,
    bloodline: String,
    wins: i64,
    losses: i64,
    report_count: i64,
}

impl From<CharacterRow> for Character {
    fn from(row: CharacterRow) -> Self {
        Character {
            id: row.character_id,
            name: row.name,
            images: CharacterImages {
                image32: row.image32,
                image64: row.image64,
                image128: row.image128,
                image256: row.image256,
                image512: row.image512,
            },
            race: row.race,
            gender: row.gender,
            bloodline: row.bloodline,
            wins: row.wins.max(0) as u64,
            losses: row.losses.max(0) as u64,
            report_count: row.report_count.max(0) as u64,
        }
    }
}

/// PostgreSQL-backed entity store
///
/// Tallies are only ever changed with `SET wins = wins + 1` style statements,
/// and every increment first inserts a `(vote_id, character_id)` receipt so a
/// redelivered increment finds the receipt and changes nothing.
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Create a new PostgreSQL client from a connection string
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new PostgreSQL client from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
    ) -> Result<Self, StoreError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }
}

fn order_clause(order: CharacterOrder) -> &'static str {
    match order {
        CharacterOrder::MostWins => "wins DESC, character_id ASC",
        CharacterOrder::MostLosses => "losses DESC, character_id ASC",
    }
}

#[async_trait]
impl EntityStore for PostgresClient {
    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT character_id FROM characters")
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!("Listed {} character ids", ids.len());
        Ok(ids)
    }

    async fn find(&self, id: &str) -> Result<Option<Character>, StoreError> {
        let query = format!(
            "SELECT {} FROM characters WHERE character_id = $1",
            CHARACTER_COLUMNS
        );

        let row = sqlx::query_as::<_, CharacterRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Character::from))
    }

    async fn find_many(&self, ids: &[String]) -> Result<Vec<Character>, StoreError> {
        let query = format!(
            "SELECT {} FROM characters WHERE character_id = ANY($1)",
            CHARACTER_COLUMNS
        );

        let rows = sqlx::query_as::<_, CharacterRow>(&query)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Character::from).collect())
    }

    async fn list(&self, query: &CharacterQuery) -> Result<Vec<Character>, StoreError> {
        // A NULL limit is LIMIT ALL
        let sql = format!(
            r#"
            SELECT {}
            FROM characters
            WHERE ($1::TEXT IS NULL OR race = $1)
              AND ($2::TEXT IS NULL OR bloodline = $2)
            ORDER BY {}
            LIMIT $3
            "#,
            CHARACTER_COLUMNS,
            order_clause(query.order)
        );

        let rows = sqlx::query_as::<_, CharacterRow>(&sql)
            .bind(query.race.as_deref())
            .bind(query.bloodline.as_deref())
            .bind(query.limit.map(|l| l as i64))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Character::from).collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM characters")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    async fn create(&self, character: Character) -> Result<bool, StoreError> {
        let query = format!(
            r#"
            INSERT INTO characters ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (character_id) DO NOTHING
            "#,
            CHARACTER_COLUMNS
        );

        let images = &character.images;
        let result = sqlx::query(&query)
            .bind(&character.id)
            .bind(&character.name)
            .bind(&images.image32)
            .bind(&images.image64)
            .bind(&images.image128)
            .bind(&images.image256)
            .bind(&images.image512)
            .bind(&character.race)
            .bind(&character.gender)
            .bind(&character.bloodline)
            .bind(character.wins as i64)
            .bind(character.losses as i64)
            .bind(character.report_count as i64)
            .execute(&self.pool)
            .await?;

        let created = result.rows_affected() > 0;
        if created {
            tracing::debug!("Created character {}", character.id);
        }
        Ok(created)
    }

    async fn record_outcome(
        &self,
        vote_id: Uuid,
        id: &str,
        outcome: Outcome,
    ) -> Result<TallyReceipt, StoreError> {
        let query = r#"
            WITH receipt AS (
                INSERT INTO tally_receipts (vote_id, character_id, outcome, applied_at)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (vote_id, character_id) DO NOTHING
                RETURNING character_id
            )
            UPDATE characters
            SET wins = wins + CASE WHEN $3 = 'win' THEN 1 ELSE 0 END,
                losses = losses + CASE WHEN $3 = 'loss' THEN 1 ELSE 0 END
            WHERE character_id IN (SELECT character_id FROM receipt)
        "#;

        let result = sqlx::query(query)
            .bind(vote_id)
            .bind(id)
            .bind(outcome.as_str())
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) if done.rows_affected() > 0 => Ok(TallyReceipt::Applied),
            Ok(_) => Ok(TallyReceipt::Duplicate),
            Err(sqlx::Error::Database(db))
                if db.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) =>
            {
                Err(StoreError::NotFound(format!("character {}", id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn increment_reports(&self, id: &str) -> Result<Option<Character>, StoreError> {
        let query = format!(
            r#"
            UPDATE characters
            SET report_count = report_count + 1
            WHERE character_id = $1
            RETURNING {}
            "#,
            CHARACTER_COLUMNS
        );

        let row = sqlx::query_as::<_, CharacterRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Character::from))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM characters WHERE character_id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn prune_receipts(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM tally_receipts WHERE applied_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Health check for the database connection
    async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_conversion_clamps_negative_counters() {
        let row = CharacterRow {
            character_id: "7".to_string(),
            name: "Seven".to_string(),
            image32: "7_32.jpg".to_string(),
            image64: String::new(),
            image128: String::new(),
            image256: String::new(),
            image512: String::new(),
            race: "Gallente".to_string(),
            gender: "female".to_string(),
            bloodline: "Intaki".to_string(),
            wins: 4,
            losses: -1,
            report_count: 2,
        };

        let character = Character::from(row);
        assert_eq!(character.id, "7");
        assert_eq!(character.images.image32, "7_32.jpg");
        assert_eq!(character.wins, 4);
        assert_eq!(character.losses, 0);
        assert_eq!(character.report_count, 2);
    }

    #[test]
    fn test_order_clause() {
        assert!(order_clause(CharacterOrder::MostWins).starts_with("wins DESC"));
        assert!(order_clause(CharacterOrder::MostLosses).starts_with("losses DESC"));
    }
}
