use crate::submitter::TransactionOutcome;
use chrono::{DateTime, Utc};
use learnchain_zk::types::CircuitType;
use serde::Serialize;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use uuid::Uuid;

pub type Db = Pool<Sqlite>;

pub async fn connect(db_url: &str) -> Result<Db, sqlx::Error> {
    SqlitePoolOptions::new().max_connections(5).connect(db_url).await
}

/// Private in-memory database. One connection, since every SQLite memory connection
/// is its own database.
pub async fn connect_in_memory() -> Result<Db, sqlx::Error> {
    SqlitePoolOptions::new().max_connections(1).connect("sqlite::memory:").await
}

pub async fn init_schema(db: &Db) -> Result<(), sqlx::Error> {
    // Claims are never stored; only public bindings and outcomes.
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS challenges (
  nonce TEXT PRIMARY KEY,
  address TEXT NOT NULL,
  created_at TEXT NOT NULL,
  expires_at INTEGER NOT NULL,
  consumed_at TEXT
);

CREATE TABLE IF NOT EXISTS mints (
  id TEXT PRIMARY KEY,
  created_at TEXT NOT NULL,
  student TEXT NOT NULL,
  circuit TEXT NOT NULL,
  context_id TEXT NOT NULL,
  commitment_hex TEXT NOT NULL,
  metadata_uri TEXT,
  success INTEGER NOT NULL,
  tx_hash TEXT,
  outcome_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS mints_claim ON mints (student, context_id, commitment_hex);
"#,
    )
    .execute(db)
    .await?;

    Ok(())
}

pub async fn insert_challenge(db: &Db, nonce: &str, address: &str, expires_at: DateTime<Utc>) -> Result<(), sqlx::Error> {
    sqlx::query(r#"INSERT INTO challenges (nonce, address, created_at, expires_at) VALUES (?, ?, ?, ?)"#)
        .bind(nonce)
        .bind(address.to_ascii_lowercase())
        .bind(Utc::now().to_rfc3339())
        .bind(expires_at.timestamp())
        .execute(db)
        .await?;
    Ok(())
}

/// Mark a challenge used. `false` when it is unknown, issued to another address,
/// expired, or already consumed.
pub async fn consume_challenge(db: &Db, nonce: &str, address: &str, now: DateTime<Utc>) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE challenges SET consumed_at = ?
           WHERE nonce = ? AND address = ? AND consumed_at IS NULL AND expires_at > ?"#,
    )
    .bind(now.to_rfc3339())
    .bind(nonce)
    .bind(address.to_ascii_lowercase())
    .bind(now.timestamp())
    .execute(db)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Make a consumed challenge usable again, for runs that failed before anything landed.
pub async fn release_challenge(db: &Db, nonce: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(r#"UPDATE challenges SET consumed_at = NULL WHERE nonce = ? AND consumed_at IS NOT NULL"#)
        .bind(nonce)
        .execute(db)
        .await?;
    Ok(result.rows_affected() == 1)
}

#[derive(Clone, Debug, Serialize)]
pub struct MintRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub student: String,
    pub circuit: CircuitType,
    pub context_id: String,
    pub commitment_hash: String,
    pub metadata_uri: Option<String>,
    pub outcome: TransactionOutcome,
}

pub async fn insert_mint(db: &Db, record: &MintRecord) -> Result<(), sqlx::Error> {
    let outcome_json = serde_json::to_string(&record.outcome).map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    let circuit = serde_json::to_value(record.circuit)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| record.circuit.artifact_stem().to_string());

    sqlx::query(
        r#"INSERT INTO mints
           (id, created_at, student, circuit, context_id, commitment_hex, metadata_uri, success, tx_hash, outcome_json)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(record.id.to_string())
    .bind(record.created_at.to_rfc3339())
    .bind(&record.student)
    .bind(circuit)
    .bind(&record.context_id)
    .bind(&record.commitment_hash)
    .bind(&record.metadata_uri)
    .bind(if record.outcome.success { 1i64 } else { 0i64 })
    .bind(record.outcome.tx_hash.map(|h| format!("{h:?}")))
    .bind(outcome_json)
    .execute(db)
    .await?;

    Ok(())
}

pub async fn get_mint(db: &Db, id: Uuid) -> Result<Option<MintRecord>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT created_at, student, circuit, context_id, commitment_hex, metadata_uri, outcome_json
           FROM mints WHERE id = ?"#,
    )
    .bind(id.to_string())
    .fetch_optional(db)
    .await?;

    let Some(row) = row else { return Ok(None) };

    let created_at: String = row.get(0);
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
        .with_timezone(&Utc);
    let circuit: String = row.get(2);
    let circuit: CircuitType =
        serde_json::from_value(serde_json::Value::String(circuit)).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    let outcome_json: String = row.get(6);
    let outcome: TransactionOutcome =
        serde_json::from_str(&outcome_json).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(Some(MintRecord {
        id,
        created_at,
        student: row.get(1),
        circuit,
        context_id: row.get(3),
        commitment_hash: row.get(4),
        metadata_uri: row.get(5),
        outcome,
    }))
}

/// Successful mints recorded for one student, context and commitment.
pub async fn count_confirmed_for_claim(
    db: &Db,
    student: &str,
    context_id: &str,
    commitment_hex: &str,
) -> Result<u64, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT COUNT(*) AS c FROM mints
           WHERE student = ? AND context_id = ? AND commitment_hex = ? AND success = 1"#,
    )
    .bind(student)
    .bind(context_id)
    .bind(commitment_hex)
    .fetch_one(db)
    .await?;
    let c: i64 = row.get("c");
    Ok(c as u64)
}
