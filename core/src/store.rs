//! SQLite-backed snapshot loader and institution resolver.
//!
//! RULE: only store.rs talks to the database.
//! The engine sees it through the SnapshotLoader / InstitutionResolver
//! traits and never executes SQL directly.

use crate::{
    error::{NetResult, NetworkError},
    loader::{InstitutionResolver, SnapshotLoader},
    record::BranchRecord,
    types::{InstitutionId, Year},
};
use rusqlite::{params, Connection, OptionalExtension, Row};

pub struct BranchStore {
    conn: Connection,
}

impl BranchStore {
    /// Open (or create) the branch database at `path`.
    pub fn open(path: &str) -> NetResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> NetResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> NetResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_branch_network.sql"))?;
        Ok(())
    }

    // ── Institution ────────────────────────────────────────────

    pub fn insert_institution(&self, institution_id: &str, name: &str) -> NetResult<()> {
        self.conn.execute(
            "INSERT INTO institution (institution_id, name) VALUES (?1, ?2)
             ON CONFLICT (institution_id) DO UPDATE SET name = excluded.name",
            params![institution_id, name],
        )?;
        Ok(())
    }

    pub fn institution_exists(&self, institution_id: &str) -> NetResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM institution WHERE institution_id = ?1",
                params![institution_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    // ── Branch snapshots ───────────────────────────────────────

    /// Insert records in one transaction. Institutions not yet known are
    /// registered under their id as a placeholder name.
    pub fn insert_branches(&self, records: &[BranchRecord]) -> NetResult<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut ensure_inst = tx.prepare(
                "INSERT OR IGNORE INTO institution (institution_id, name) VALUES (?1, ?1)",
            )?;
            let mut insert = tx.prepare(
                "INSERT INTO branch_snapshot
                 (institution_id, year, unique_branch_id, latitude, longitude,
                  address, city, county, state, zip, metro_area,
                  deposit_amount, service_type, branch_name)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
            )?;
            for r in records {
                ensure_inst.execute(params![r.institution_id])?;
                insert.execute(params![
                    r.institution_id,
                    r.year,
                    r.unique_branch_id,
                    r.latitude,
                    r.longitude,
                    r.address,
                    r.city,
                    r.county,
                    r.state,
                    r.zip,
                    r.metro_area,
                    r.deposit_amount,
                    r.service_type,
                    r.branch_name,
                ])?;
            }
        }
        tx.commit()?;
        log::debug!("Inserted {} branch record(s)", records.len());
        Ok(records.len())
    }

    pub fn branches_for(&self, institution_id: &str, year: Year) -> NetResult<Vec<BranchRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT institution_id, year, unique_branch_id, latitude, longitude,
                    address, city, county, state, zip, metro_area,
                    deposit_amount, service_type, branch_name
             FROM branch_snapshot
             WHERE institution_id = ?1 AND year = ?2
             ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![institution_id, year], map_branch_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn years_for(&self, institution_id: &str) -> NetResult<Vec<Year>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT year FROM branch_snapshot
             WHERE institution_id = ?1 ORDER BY year ASC",
        )?;
        let years = stmt
            .query_map(params![institution_id], |row| row.get::<_, Year>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(years)
    }

    pub fn branch_count(&self, institution_id: &str, year: Year) -> NetResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM branch_snapshot WHERE institution_id = ?1 AND year = ?2",
            params![institution_id, year],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn map_branch_row(row: &Row) -> rusqlite::Result<BranchRecord> {
    Ok(BranchRecord {
        institution_id:   row.get(0)?,
        year:             row.get(1)?,
        unique_branch_id: row.get(2)?,
        latitude:         row.get(3)?,
        longitude:        row.get(4)?,
        address:          row.get(5)?,
        city:             row.get(6)?,
        county:           row.get(7)?,
        state:            row.get(8)?,
        zip:              row.get(9)?,
        metro_area:       row.get(10)?,
        deposit_amount:   row.get(11)?,
        service_type:     row.get(12)?,
        branch_name:      row.get(13)?,
    })
}

impl SnapshotLoader for BranchStore {
    fn get_branches(&self, institution_id: &str, year: Year) -> NetResult<Option<Vec<BranchRecord>>> {
        if !self.institution_exists(institution_id)? {
            return Err(NetworkError::InstitutionNotFound {
                institution_id: institution_id.to_string(),
            });
        }
        let rows = self.branches_for(institution_id, year)?;
        Ok(if rows.is_empty() { None } else { Some(rows) })
    }
}

impl InstitutionResolver for BranchStore {
    fn resolve_institution(&self, name: &str) -> NetResult<Option<InstitutionId>> {
        let id = self
            .conn
            .query_row(
                "SELECT institution_id FROM institution
                 WHERE name = ?1 COLLATE NOCASE
                 ORDER BY institution_id ASC LIMIT 1",
                params![name.trim()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_opens_in_wal_mode_and_round_trips() {
        let path = std::env::temp_dir().join(format!("branchnet-store-{}.db", std::process::id()));
        let path_str = path.to_string_lossy().to_string();
        let _ = std::fs::remove_file(&path);

        let store = BranchStore::open(&path_str).expect("open file store");
        store.migrate().expect("migration");
        let mode: String = store
            .conn
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");

        store.insert_institution("628", "First Example Bank").unwrap();
        let record = BranchRecord::new("628", 2024).with_coordinates(39.96, -83.0);
        assert_eq!(store.insert_branches(&[record.clone()]).unwrap(), 1);
        assert_eq!(store.get_branches("628", 2024).unwrap(), Some(vec![record]));
        assert_eq!(store.get_branches("628", 2023).unwrap(), None);

        drop(store);
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{path_str}{suffix}"));
        }
    }
}
