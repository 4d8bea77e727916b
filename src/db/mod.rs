// Bot store: bots, candidate/visited POIs and denormalized tag rows (SQLite via sqlx).

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};

use crate::geo::Coordinate;
use crate::overpass::Poi;

pub const VISIT_MAYBE: &str = "maybe";
pub const VISIT_VISITED: &str = "visited";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bot {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
    /// External id of the POI the bot currently stands on, if it got there by travelling.
    pub poi_id: Option<i64>,
}

impl Bot {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// The fixed set of provider tags we keep. Anything else is dropped on save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PoiTags {
    pub amenity: Option<String>,
    pub name: Option<String>,
    pub name_en: Option<String>,
    pub addr_housenumber: Option<String>,
    pub addr_street: Option<String>,
    pub opening_hours: Option<String>,
    pub phone: Option<String>,
    pub cuisine: Option<String>,
    pub description: Option<String>,
    pub internet_access: Option<String>,
    pub smoking: Option<String>,
    pub wheelchair: Option<String>,
}

impl PoiTags {
    pub fn from_tags(tags: &HashMap<String, String>) -> Self {
        let get = |key: &str| tags.get(key).cloned();
        Self {
            amenity: get("amenity"),
            name: get("name"),
            name_en: get("name:en"),
            addr_housenumber: get("addr:housenumber"),
            addr_street: get("addr:street"),
            opening_hours: get("opening_hours"),
            phone: get("phone"),
            cuisine: get("cuisine"),
            description: get("description"),
            internet_access: get("internet_access"),
            smoking: get("smoking"),
            wheelchair: get("wheelchair"),
        }
    }

    /// Back to provider-style keys, omitting absent tags.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        [
            ("amenity", &self.amenity),
            ("name", &self.name),
            ("name:en", &self.name_en),
            ("addr:housenumber", &self.addr_housenumber),
            ("addr:street", &self.addr_street),
            ("opening_hours", &self.opening_hours),
            ("phone", &self.phone),
            ("cuisine", &self.cuisine),
            ("description", &self.description),
            ("internet_access", &self.internet_access),
            ("smoking", &self.smoking),
            ("wheelchair", &self.wheelchair),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.as_ref().map(|v| (k.to_string(), v.clone())))
        .collect()
    }
}

/// A POI provisionally in range of a bot during the current cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Candidate {
    pub bot_id: i64,
    pub osm_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    #[sqlx(flatten)]
    pub tags: PoiTags,
}

/// One row of a bot's POI history, candidate or visited, with any retained tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct HistoryEntry {
    pub id: i64,
    pub bot_id: i64,
    pub osm_id: Option<i64>,
    pub latitude: f64,
    pub longitude: f64,
    pub visit_type: String,
    pub created_at: String,
    #[sqlx(flatten)]
    pub tags: PoiTags,
}

const BOT_COLUMNS: &str = "id, name, kind, latitude, longitude, radius_meters, poi_id";

const HISTORY_SELECT: &str = r#"
    SELECT p.id, p.bot_id, p.osm_id, p.latitude, p.longitude, p.visit_type, p.created_at,
           t.amenity, t.name, t.name_en, t.addr_housenumber, t.addr_street, t.opening_hours,
           t.phone, t.cuisine, t.description, t.internet_access, t.smoking, t.wheelchair
    FROM bot_pois p
    LEFT JOIN tag_info t ON t.bot_id = p.bot_id AND t.osm_id = p.osm_id
    WHERE p.bot_id = ? AND p.visit_type = ?
    ORDER BY p.id
"#;

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// A private in-memory database. One connection that never expires, since
    /// every new SQLite memory connection would be a fresh, empty database.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                kind TEXT NOT NULL DEFAULT 'travelbot',
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                radius_meters REAL NOT NULL DEFAULT 1000,
                poi_id INTEGER,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bot_pois (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                bot_id INTEGER NOT NULL REFERENCES bots(id) ON DELETE CASCADE,
                osm_id INTEGER,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                visit_type TEXT NOT NULL CHECK (visit_type IN ('maybe', 'visited')),
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        // A POI is a candidate for a given bot at most once.
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_bot_pois_candidate
            ON bot_pois (bot_id, osm_id) WHERE visit_type = 'maybe'
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tag_info (
                bot_id INTEGER NOT NULL REFERENCES bots(id) ON DELETE CASCADE,
                osm_id INTEGER NOT NULL,
                amenity TEXT,
                name TEXT,
                name_en TEXT,
                addr_housenumber TEXT,
                addr_street TEXT,
                opening_hours TEXT,
                phone TEXT,
                cuisine TEXT,
                description TEXT,
                internet_access TEXT,
                smoking TEXT,
                wheelchair TEXT,
                PRIMARY KEY (bot_id, osm_id)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Bots ──────────────────────────────────────────────────────────

    pub async fn create_bot(
        &self,
        name: &str,
        kind: &str,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
    ) -> Result<Bot, sqlx::Error> {
        let sql = format!(
            "INSERT INTO bots (name, kind, latitude, longitude, radius_meters) VALUES (?, ?, ?, ?, ?) RETURNING {BOT_COLUMNS}"
        );
        sqlx::query_as::<_, Bot>(&sql)
            .bind(name)
            .bind(kind)
            .bind(latitude)
            .bind(longitude)
            .bind(radius_meters)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn get_bot(&self, id: i64) -> Result<Option<Bot>, sqlx::Error> {
        let sql = format!("SELECT {BOT_COLUMNS} FROM bots WHERE id = ?");
        sqlx::query_as::<_, Bot>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// All bots of a behavioural kind, ordered by id.
    pub async fn list_bots(&self, kind: &str) -> Result<Vec<Bot>, sqlx::Error> {
        let sql = format!("SELECT {BOT_COLUMNS} FROM bots WHERE kind = ? ORDER BY id");
        sqlx::query_as::<_, Bot>(&sql)
            .bind(kind)
            .fetch_all(&self.pool)
            .await
    }

    /// Insert the three Tbilisi demo bots if no bot of `kind` exists yet.
    /// Returns how many were inserted.
    pub async fn seed_demo_bots(&self, kind: &str) -> Result<usize, sqlx::Error> {
        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bots WHERE kind = ?")
            .bind(kind)
            .fetch_one(&self.pool)
            .await?;
        if existing > 0 {
            return Ok(0);
        }

        let demo = [
            ("mochimochi", 41.718621, 44.795495),
            ("iceicebaby", 41.717785, 44.794949),
            ("whateverbot", 41.718417, 44.797915),
        ];
        for (name, lat, lon) in demo {
            self.create_bot(name, kind, lat, lon, 1000.0).await?;
        }
        Ok(demo.len())
    }

    // ── Candidates ────────────────────────────────────────────────────

    /// Record each POI as a "maybe" for the bot, with its known tags.
    /// Saving the same POI twice within a cycle leaves a single candidate.
    pub async fn save_candidates(&self, bot_id: i64, pois: &[Poi]) -> Result<usize, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for poi in pois {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO bot_pois (bot_id, osm_id, latitude, longitude, visit_type) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(bot_id)
            .bind(poi.external_id)
            .bind(poi.latitude)
            .bind(poi.longitude)
            .bind(VISIT_MAYBE)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;

            upsert_tags(&mut tx, bot_id, poi.external_id, &PoiTags::from_tags(&poi.tags)).await?;
        }
        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn list_candidates(&self, bot_id: i64) -> Result<Vec<Candidate>, sqlx::Error> {
        sqlx::query_as::<_, Candidate>(
            r#"
            SELECT p.bot_id, p.osm_id, p.latitude, p.longitude,
                   t.amenity, t.name, t.name_en, t.addr_housenumber, t.addr_street, t.opening_hours,
                   t.phone, t.cuisine, t.description, t.internet_access, t.smoking, t.wheelchair
            FROM bot_pois p
            LEFT JOIN tag_info t ON t.bot_id = p.bot_id AND t.osm_id = p.osm_id
            WHERE p.bot_id = ? AND p.visit_type = 'maybe'
            ORDER BY p.id
        "#,
        )
        .bind(bot_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Delete "maybe" rows and the tag rows only they referenced, for one bot
    /// or for every bot. Tags of visited POIs and of a bot's current POI stay.
    pub async fn clear_candidates(&self, bot_id: Option<i64>) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let retained_tags = r#"
            NOT EXISTS (
                SELECT 1 FROM bot_pois v
                WHERE v.bot_id = tag_info.bot_id AND v.osm_id = tag_info.osm_id
                  AND v.visit_type = 'visited'
            )
            AND NOT EXISTS (
                SELECT 1 FROM bots b
                WHERE b.id = tag_info.bot_id AND b.poi_id = tag_info.osm_id
            )
        "#;

        let deleted = match bot_id {
            Some(id) => {
                let deleted = sqlx::query("DELETE FROM bot_pois WHERE visit_type = 'maybe' AND bot_id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                sqlx::query(&format!("DELETE FROM tag_info WHERE bot_id = ? AND {retained_tags}"))
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                deleted
            }
            None => {
                let deleted = sqlx::query("DELETE FROM bot_pois WHERE visit_type = 'maybe'")
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                sqlx::query(&format!("DELETE FROM tag_info WHERE {retained_tags}"))
                    .execute(&mut *tx)
                    .await?;
                deleted
            }
        };

        tx.commit().await?;
        Ok(deleted)
    }

    // ── Visits ────────────────────────────────────────────────────────

    /// Log the bot's current position as visited and move it to `destination`
    /// (or keep it in place when `None`), as one transaction.
    /// Returns the bot as persisted afterwards.
    pub async fn commit_visit(
        &self,
        bot: &Bot,
        destination: Option<&Candidate>,
    ) -> Result<Bot, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let (latitude, longitude, poi_id) = match destination {
            Some(c) => (c.latitude, c.longitude, Some(c.osm_id)),
            None => (bot.latitude, bot.longitude, bot.poi_id),
        };
        let sql = format!(
            "UPDATE bots SET latitude = ?, longitude = ?, poi_id = ? WHERE id = ? RETURNING {BOT_COLUMNS}"
        );
        let moved = sqlx::query_as::<_, Bot>(&sql)
            .bind(latitude)
            .bind(longitude)
            .bind(poi_id)
            .bind(bot.id)
            .fetch_optional(&mut *tx)
            .await?;

        // Bot deleted mid-cycle: nothing to log against.
        let Some(moved) = moved else {
            tx.rollback().await?;
            return Err(sqlx::Error::RowNotFound);
        };

        sqlx::query(
            "INSERT INTO bot_pois (bot_id, osm_id, latitude, longitude, visit_type) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(bot.id)
        .bind(bot.poi_id)
        .bind(bot.latitude)
        .bind(bot.longitude)
        .bind(VISIT_VISITED)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(moved)
    }

    pub async fn list_visits(&self, bot_id: i64) -> Result<Vec<HistoryEntry>, sqlx::Error> {
        list_history(&self.pool, bot_id, VISIT_VISITED).await
    }

    pub async fn count_visits(&self, bot_id: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM bot_pois WHERE bot_id = ? AND visit_type = 'visited'")
            .bind(bot_id)
            .fetch_one(&self.pool)
            .await
    }

    /// Begin a transaction for a consistent multi-query read.
    pub(crate) async fn begin_read(&self) -> Result<Transaction<'_, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }
}

async fn upsert_tags(
    tx: &mut Transaction<'_, Sqlite>,
    bot_id: i64,
    osm_id: i64,
    tags: &PoiTags,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO tag_info (
            bot_id, osm_id, amenity, name, name_en, addr_housenumber, addr_street,
            opening_hours, phone, cuisine, description, internet_access, smoking, wheelchair
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#,
    )
    .bind(bot_id)
    .bind(osm_id)
    .bind(&tags.amenity)
    .bind(&tags.name)
    .bind(&tags.name_en)
    .bind(&tags.addr_housenumber)
    .bind(&tags.addr_street)
    .bind(&tags.opening_hours)
    .bind(&tags.phone)
    .bind(&tags.cuisine)
    .bind(&tags.description)
    .bind(&tags.internet_access)
    .bind(&tags.smoking)
    .bind(&tags.wheelchair)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// History rows of one visit type for a bot, on any executor (pool or open transaction).
pub(crate) async fn list_history<'e, E>(
    executor: E,
    bot_id: i64,
    visit_type: &str,
) -> Result<Vec<HistoryEntry>, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, HistoryEntry>(HISTORY_SELECT)
        .bind(bot_id)
        .bind(visit_type)
        .fetch_all(executor)
        .await
}

/// Bots of a kind, on any executor.
pub(crate) async fn list_bots_with<'e, E>(executor: E, kind: &str) -> Result<Vec<Bot>, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {BOT_COLUMNS} FROM bots WHERE kind = ? ORDER BY id");
    sqlx::query_as::<_, Bot>(&sql)
        .bind(kind)
        .fetch_all(executor)
        .await
}
