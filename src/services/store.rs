use async_trait::async_trait;
use sqlx::{types::Json, Connection, PgConnection, PgPool, Postgres, Transaction};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{
    driver::DriverRecord,
    lineup::SeasonLineups,
    reference::ConfirmedRoster,
    standing::{ConstructorStanding, DriverStanding},
    sync::WriteOutcome,
    team::TeamRecord,
};

/// Rows written for one season's lineups.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LineupCounts {
    pub drivers: usize,
    pub constructors: usize,
}

/// Persistence for synced records. Each call is one atomic batch: per-record
/// failures are reported in the outcome, anything else rolls the whole call
/// back and comes out as the error.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Upserts `drivers` by natural key. With `deactivate_outside`, every
    /// active driver whose code is numeric or missing from the roster is
    /// marked inactive afterwards.
    async fn sync_drivers(
        &self,
        drivers: &[DriverRecord],
        deactivate_outside: Option<&ConfirmedRoster>,
    ) -> Result<WriteOutcome, sqlx::Error>;

    async fn sync_teams(&self, teams: &[TeamRecord]) -> Result<WriteOutcome, sqlx::Error>;

    /// Replaces the season's lineups. Empty halves leave the stored row alone.
    async fn replace_lineups(&self, lineups: &SeasonLineups) -> Result<LineupCounts, sqlx::Error>;

    async fn sync_standings(
        &self,
        drivers: &[DriverStanding],
        constructors: &[ConstructorStanding],
    ) -> Result<(WriteOutcome, WriteOutcome), sqlx::Error>;
}

const CLEANUP_DUPLICATE_DRIVERS: &str = r#"
    WITH duplicates AS (
        SELECT code, MAX(updated_at) AS latest_update
        FROM drivers
        WHERE code IS NOT NULL AND LENGTH(code) = 3
        GROUP BY code
        HAVING COUNT(*) > 1
    )
    DELETE FROM drivers d
    USING duplicates dup
    WHERE d.code = dup.code AND d.updated_at < dup.latest_update
"#;

const CLEANUP_NUMERIC_DRIVERS: &str = r#"
    DELETE FROM drivers d1
    WHERE d1.code ~ '^[0-9]+$'
    AND EXISTS (
        SELECT 1 FROM drivers d2
        WHERE d2.forename = d1.forename
        AND d2.surname = d1.surname
        AND d2.code IS NOT NULL
        AND LENGTH(d2.code) = 3
        AND d2.code !~ '^[0-9]+$'
    )
"#;

const CLEANUP_DUPLICATE_CONSTRUCTORS: &str = r#"
    WITH duplicates AS (
        SELECT name, MAX(updated_at) AS latest_update
        FROM constructors
        GROUP BY name
        HAVING COUNT(*) > 1
    )
    DELETE FROM constructors c
    USING duplicates dup
    WHERE c.name = dup.name AND c.updated_at < dup.latest_update
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Runs `sql` in its own savepoint. Failures are logged and otherwise ignored.
async fn best_effort(tx: &mut Transaction<'_, Postgres>, label: &str, sql: &str) {
    let mut savepoint = match Connection::begin(&mut **tx).await {
        Ok(savepoint) => savepoint,
        Err(e) => {
            warn!("Could not {}: {}", label, e);
            return;
        }
    };

    match sqlx::query(sql).execute(&mut *savepoint).await {
        Ok(done) => match savepoint.commit().await {
            Ok(()) if done.rows_affected() > 0 => {
                info!("Cleanup ({}) removed {} row(s)", label, done.rows_affected())
            }
            Ok(()) => {}
            Err(e) => warn!("Could not {}: {}", label, e),
        },
        Err(e) => {
            warn!("Could not {}: {}", label, e);
            if let Err(e) = savepoint.rollback().await {
                warn!("Rollback after failed cleanup failed: {}", e);
            }
        }
    }
}

async fn upsert_driver(conn: &mut PgConnection, driver: &DriverRecord) -> Result<(), sqlx::Error> {
    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM drivers WHERE driver_id = $1")
        .bind(&driver.driver_id)
        .fetch_optional(&mut *conn)
        .await?;

    let duplicates: Vec<(Uuid, String)> =
        sqlx::query_as("SELECT id, driver_id FROM drivers WHERE code = $1 AND driver_id <> $2")
            .bind(&driver.code)
            .bind(&driver.driver_id)
            .fetch_all(&mut *conn)
            .await?;
    for (id, other_driver_id) in duplicates {
        warn!(
            "Found duplicate driver by code {}: existing driver_id={}, new driver_id={}",
            driver.code, other_driver_id, driver.driver_id
        );
        sqlx::query("DELETE FROM drivers WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO drivers (
            id, driver_id, code, forename, surname, nationality, permanent_number,
            driver_championships, constructor_championships, current_team, is_active,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW(), NOW())
        ON CONFLICT (driver_id) DO UPDATE SET
            code = EXCLUDED.code,
            forename = EXCLUDED.forename,
            surname = EXCLUDED.surname,
            nationality = EXCLUDED.nationality,
            permanent_number = EXCLUDED.permanent_number,
            driver_championships = EXCLUDED.driver_championships,
            constructor_championships = EXCLUDED.constructor_championships,
            current_team = EXCLUDED.current_team,
            is_active = EXCLUDED.is_active,
            updated_at = NOW()
        "#,
    )
    .bind(existing.unwrap_or_else(Uuid::new_v4))
    .bind(&driver.driver_id)
    .bind(&driver.code)
    .bind(&driver.forename)
    .bind(&driver.surname)
    .bind(&driver.nationality)
    .bind(driver.permanent_number)
    .bind(driver.driver_championships)
    .bind(driver.constructor_championships)
    .bind(&driver.current_team)
    .bind(driver.is_active)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn upsert_team(conn: &mut PgConnection, team: &TeamRecord) -> Result<(), sqlx::Error> {
    let existing: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM constructors WHERE constructor_id = $1")
            .bind(&team.constructor_id)
            .fetch_optional(&mut *conn)
            .await?;

    sqlx::query(
        r#"
        INSERT INTO constructors (id, constructor_id, name, nationality, created_at, updated_at)
        VALUES ($1, $2, $3, $4, NOW(), NOW())
        ON CONFLICT (constructor_id) DO UPDATE SET
            name = EXCLUDED.name,
            nationality = EXCLUDED.nationality,
            updated_at = NOW()
        "#,
    )
    .bind(existing.unwrap_or_else(Uuid::new_v4))
    .bind(&team.constructor_id)
    .bind(&team.name)
    .bind(&team.nationality)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn upsert_driver_standing(
    conn: &mut PgConnection,
    standing: &DriverStanding,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO driver_standings (id, season, round, driver_id, position, points, wins, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
        ON CONFLICT (season, round, driver_id) DO UPDATE SET
            position = EXCLUDED.position,
            points = EXCLUDED.points,
            wins = EXCLUDED.wins,
            updated_at = NOW()
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(standing.season)
    .bind(standing.round)
    .bind(&standing.driver_id)
    .bind(standing.position)
    .bind(standing.points)
    .bind(standing.wins)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_constructor_standing(
    conn: &mut PgConnection,
    standing: &ConstructorStanding,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO constructor_standings (id, season, round, constructor_id, position, points, wins, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
        ON CONFLICT (season, round, constructor_id) DO UPDATE SET
            position = EXCLUDED.position,
            points = EXCLUDED.points,
            wins = EXCLUDED.wins,
            updated_at = NOW()
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(standing.season)
    .bind(standing.round)
    .bind(&standing.constructor_id)
    .bind(standing.position)
    .bind(standing.points)
    .bind(standing.wins)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[async_trait]
impl SyncStore for PgStore {
    async fn sync_drivers(
        &self,
        drivers: &[DriverRecord],
        deactivate_outside: Option<&ConfirmedRoster>,
    ) -> Result<WriteOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        best_effort(&mut tx, "clean up duplicate drivers", CLEANUP_DUPLICATE_DRIVERS).await;
        best_effort(&mut tx, "clean up numeric code drivers", CLEANUP_NUMERIC_DRIVERS).await;

        let mut outcome = WriteOutcome::default();
        for driver in drivers {
            let mut savepoint = Connection::begin(&mut *tx).await?;
            match upsert_driver(&mut savepoint, driver).await {
                Ok(()) => {
                    savepoint.commit().await?;
                    outcome.synced += 1;
                }
                Err(e) => {
                    savepoint.rollback().await?;
                    let message = format!("Error syncing driver {}: {}", driver.driver_id, e);
                    error!("{}", message);
                    outcome.errors.push(message);
                }
            }
        }

        if let Some(roster) = deactivate_outside {
            let deactivated = sqlx::query(
                r#"
                UPDATE drivers
                SET is_active = false, updated_at = NOW()
                WHERE is_active = true
                AND code IS NOT NULL
                AND (code ~ '^[0-9]+$' OR (LENGTH(code) = 3 AND UPPER(code) <> ALL($1)))
                "#,
            )
            .bind(roster.codes())
            .execute(&mut *tx)
            .await?;
            if deactivated.rows_affected() > 0 {
                info!(
                    "Marked {} drivers as inactive (not in confirmed lineup or invalid format)",
                    deactivated.rows_affected()
                );
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }

    async fn sync_teams(&self, teams: &[TeamRecord]) -> Result<WriteOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        best_effort(&mut tx, "clean up duplicate constructors", CLEANUP_DUPLICATE_CONSTRUCTORS).await;

        let mut outcome = WriteOutcome::default();
        for team in teams {
            let mut savepoint = Connection::begin(&mut *tx).await?;
            match upsert_team(&mut savepoint, team).await {
                Ok(()) => {
                    savepoint.commit().await?;
                    outcome.synced += 1;
                }
                Err(e) => {
                    savepoint.rollback().await?;
                    let message = format!("Error syncing team {}: {}", team.constructor_id, e);
                    error!("{}", message);
                    outcome.errors.push(message);
                }
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }

    async fn replace_lineups(&self, lineups: &SeasonLineups) -> Result<LineupCounts, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut counts = LineupCounts::default();

        if !lineups.drivers.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO driver_season_lineups (id, season, lineup, created_at, updated_at)
                VALUES ($1, $2, $3, NOW(), NOW())
                ON CONFLICT (season) DO UPDATE SET
                    lineup = EXCLUDED.lineup,
                    updated_at = NOW()
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(lineups.season)
            .bind(Json(&lineups.drivers))
            .execute(&mut *tx)
            .await?;
            counts.drivers = lineups.drivers.driver_count();
            info!(
                "Stored driver lineup for season {} with {} teams",
                lineups.season,
                lineups.drivers.teams.len()
            );
        }

        if !lineups.constructors.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO constructor_season_lineups (id, season, constructors, created_at, updated_at)
                VALUES ($1, $2, $3, NOW(), NOW())
                ON CONFLICT (season) DO UPDATE SET
                    constructors = EXCLUDED.constructors,
                    updated_at = NOW()
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(lineups.season)
            .bind(Json(&lineups.constructors))
            .execute(&mut *tx)
            .await?;
            counts.constructors = lineups.constructors.len();
            info!(
                "Stored constructor lineup for season {} with {} constructors",
                lineups.season, counts.constructors
            );
        }

        tx.commit().await?;
        Ok(counts)
    }

    async fn sync_standings(
        &self,
        drivers: &[DriverStanding],
        constructors: &[ConstructorStanding],
    ) -> Result<(WriteOutcome, WriteOutcome), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let mut driver_outcome = WriteOutcome::default();
        for standing in drivers {
            let mut savepoint = Connection::begin(&mut *tx).await?;
            match upsert_driver_standing(&mut savepoint, standing).await {
                Ok(()) => {
                    savepoint.commit().await?;
                    driver_outcome.synced += 1;
                }
                Err(e) => {
                    savepoint.rollback().await?;
                    let message = format!(
                        "Error syncing standing of {} after round {}: {}",
                        standing.driver_id, standing.round, e
                    );
                    error!("{}", message);
                    driver_outcome.errors.push(message);
                }
            }
        }

        let mut constructor_outcome = WriteOutcome::default();
        for standing in constructors {
            let mut savepoint = Connection::begin(&mut *tx).await?;
            match upsert_constructor_standing(&mut savepoint, standing).await {
                Ok(()) => {
                    savepoint.commit().await?;
                    constructor_outcome.synced += 1;
                }
                Err(e) => {
                    savepoint.rollback().await?;
                    let message = format!(
                        "Error syncing standing of {} after round {}: {}",
                        standing.constructor_id, standing.round, e
                    );
                    error!("{}", message);
                    constructor_outcome.errors.push(message);
                }
            }
        }

        tx.commit().await?;
        Ok((driver_outcome, constructor_outcome))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::lineup::{DriverLineup, LineupDriver, LineupTeam};
    use sqlx::postgres::PgPoolOptions;

    fn driver(code: &str, team: &str) -> DriverRecord {
        DriverRecord {
            driver_id: code.to_lowercase(),
            code: code.to_string(),
            forename: format!("{code} forename"),
            surname: format!("{code} surname"),
            nationality: "GBR".to_string(),
            permanent_number: None,
            current_team: Some(team.to_string()),
            is_active: true,
            driver_championships: 0,
            constructor_championships: 0,
        }
    }

    fn roster(codes: &[&str]) -> ConfirmedRoster {
        serde_json::from_value(serde_json::json!(codes)).unwrap()
    }

    async fn maybe_pool() -> Option<PgPool> {
        let database_url = std::env::var("TEST_DATABASE_URL").ok()?;

        PgPoolOptions::new()
            .max_connections(2)
            .connect(&database_url)
            .await
            .ok()
    }

    async fn driver_row(pool: &PgPool, driver_id: &str) -> Option<(Uuid, bool, Option<String>)> {
        sqlx::query_as("SELECT id, is_active, current_team FROM drivers WHERE driver_id = $1")
            .bind(driver_id)
            .fetch_optional(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn memory_store_keeps_ids_and_deactivates_outside_roster() {
        let store = memory::MemoryStore::new();
        let first = store
            .sync_drivers(&[driver("VER", "Red Bull Racing"), driver("MAG", "Haas F1 Team")], None)
            .await
            .unwrap();
        assert_eq!(first.synced, 2);
        let id = store.driver("ver").unwrap().id;

        store
            .sync_drivers(&[driver("VER", "Red Bull Racing")], Some(&roster(&["VER"])))
            .await
            .unwrap();

        assert_eq!(store.driver("ver").unwrap().id, id);
        assert!(store.driver("ver").unwrap().record.is_active);
        assert!(!store.driver("mag").unwrap().record.is_active);
    }

    #[tokio::test]
    async fn memory_store_failed_batch_writes_nothing() {
        let store = memory::MemoryStore::failing_batch();

        let result = store
            .sync_drivers(&[driver("VER", "Red Bull Racing")], Some(&roster(&["VER"])))
            .await;

        assert!(result.is_err());
        assert_eq!(store.driver_count(), 0);
    }

    // One test so the scenarios never race on the shared tables.
    #[tokio::test]
    async fn postgres_store_sync_flow() {
        let Some(pool) = maybe_pool().await else {
            eprintln!("Skipping postgres_store_sync_flow: TEST_DATABASE_URL is not set or database is unreachable.");
            return;
        };

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migrations should run");
        sqlx::query("DROP TRIGGER IF EXISTS reject_deactivation ON drivers")
            .execute(&pool)
            .await
            .expect("leftover trigger should drop");
        sqlx::query(
            "TRUNCATE TABLE drivers, constructors, driver_season_lineups, constructor_season_lineups, driver_standings, constructor_standings",
        )
        .execute(&pool)
        .await
        .expect("truncate should succeed");

        let store = PgStore::new(pool.clone());

        // Legacy rows: a numeric-code twin of HAM and an old id holding NOR.
        let mut legacy_ham = driver("44", "Mercedes");
        legacy_ham.driver_id = "hamilton_44".into();
        legacy_ham.forename = "HAM forename".into();
        legacy_ham.surname = "HAM surname".into();
        let mut legacy_nor = driver("NOR", "McLaren");
        legacy_nor.driver_id = "norris".into();
        store.sync_drivers(&[legacy_ham, legacy_nor], None).await.unwrap();

        let outcome = store
            .sync_drivers(
                &[
                    driver("HAM", "Mercedes"),
                    driver("NOR", "McLaren"),
                    driver("MAG", "Haas F1 Team"),
                ],
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.synced, 3);
        assert!(driver_row(&pool, "norris").await.is_none());
        let (ham_id, ham_active, _) = driver_row(&pool, "ham").await.unwrap();
        assert!(ham_active);

        // The numeric twin goes on the next sync's cleanup pass.
        let outcome = store
            .sync_drivers(
                &[driver("HAM", "Ferrari"), driver("NOR", "McLaren")],
                Some(&roster(&["HAM", "NOR"])),
            )
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome { synced: 2, errors: Vec::new() });
        assert!(driver_row(&pool, "hamilton_44").await.is_none());

        let (id, active, team) = driver_row(&pool, "ham").await.unwrap();
        assert_eq!(id, ham_id);
        assert!(active);
        assert_eq!(team.as_deref(), Some("Ferrari"));
        let (_, mag_active, _) = driver_row(&pool, "mag").await.unwrap();
        assert!(!mag_active);

        // A bad record is reported without taking the rest down.
        let mut bad = driver("BOT", "Audi");
        bad.code = "B0T".into();
        let outcome = store
            .sync_drivers(&[bad, driver("MAG", "Haas F1 Team")], None)
            .await
            .unwrap();
        assert_eq!(outcome.synced, 1);
        assert_eq!(outcome.errors.len(), 1);
        let (_, mag_active, _) = driver_row(&pool, "mag").await.unwrap();
        assert!(mag_active);

        // A failed deactivation takes the whole batch down with it.
        sqlx::query(
            r#"
            CREATE OR REPLACE FUNCTION reject_deactivation() RETURNS trigger AS $$
            BEGIN
                IF OLD.is_active AND NOT NEW.is_active THEN
                    RAISE EXCEPTION 'deactivation rejected';
                END IF;
                RETURN NEW;
            END;
            $$ LANGUAGE plpgsql
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_deactivation BEFORE UPDATE ON drivers FOR EACH ROW EXECUTE FUNCTION reject_deactivation()",
        )
        .execute(&pool)
        .await
        .unwrap();

        let failed = store
            .sync_drivers(&[driver("ALB", "Williams")], Some(&roster(&["ALB"])))
            .await;

        sqlx::query("DROP TRIGGER reject_deactivation ON drivers")
            .execute(&pool)
            .await
            .unwrap();
        assert!(failed.is_err());
        assert!(driver_row(&pool, "alb").await.is_none());
        let (_, mag_active, _) = driver_row(&pool, "mag").await.unwrap();
        assert!(mag_active);

        let teams = [
            TeamRecord {
                constructor_id: "haas".into(),
                name: "Haas F1 Team".into(),
                nationality: "American".into(),
            },
            TeamRecord {
                constructor_id: "brawn_gp".into(),
                name: "Brawn GP".into(),
                nationality: "Unknown".into(),
            },
        ];
        assert_eq!(store.sync_teams(&teams).await.unwrap().synced, 2);
        let haas_id: Uuid = sqlx::query_scalar("SELECT id FROM constructors WHERE constructor_id = 'haas'")
            .fetch_one(&pool)
            .await
            .unwrap();
        store.sync_teams(&teams[..1]).await.unwrap();
        let again: Uuid = sqlx::query_scalar("SELECT id FROM constructors WHERE constructor_id = 'haas'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(again, haas_id);

        let lineup = |driver_id: &str| SeasonLineups {
            season: 2025,
            drivers: DriverLineup {
                teams: vec![LineupTeam {
                    team_name: "McLaren".into(),
                    drivers: vec![LineupDriver {
                        driver_id: driver_id.into(),
                        driver_number: Some(4),
                    }],
                }],
            },
            constructors: vec!["mclaren".into()],
        };
        store.replace_lineups(&lineup("nor")).await.unwrap();
        let counts = store.replace_lineups(&lineup("pia")).await.unwrap();
        assert_eq!(counts, LineupCounts { drivers: 1, constructors: 1 });
        let Json(stored): Json<DriverLineup> =
            sqlx::query_scalar("SELECT lineup FROM driver_season_lineups WHERE season = 2025")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(stored.teams[0].drivers[0].driver_id, "pia");
        assert_eq!(stored.driver_count(), 1);

        let standing = DriverStanding {
            season: 2025,
            round: 1,
            driver_id: "nor".into(),
            position: 1,
            points: 25.0,
            wins: 1,
        };
        let updated = DriverStanding {
            points: 26.0,
            ..standing.clone()
        };
        store.sync_standings(&[standing], &[]).await.unwrap();
        let (drivers, constructors) = store.sync_standings(&[updated], &[]).await.unwrap();
        assert_eq!(drivers.synced, 1);
        assert_eq!(constructors.synced, 0);
        let points: f64 = sqlx::query_scalar(
            "SELECT points FROM driver_standings WHERE season = 2025 AND round = 1 AND driver_id = 'nor'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(points, 26.0);
    }
}
