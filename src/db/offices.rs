//! Office rows: idempotent upsert, bulk delete, count, listing.

use rusqlite::{params, params_from_iter};

use super::{DbError, OfficeDb};
use crate::types::{normalize_phone, OfficeRecord};

/// SQLite's default bound-parameter ceiling is 999; stay well under it.
const DELETE_CHUNK: usize = 500;

const OFFICE_COLUMNS: &str = "office_national_association_id, office_name, office_address1,
     office_address2, office_city, office_state_or_province, office_postal_code,
     office_phone, office_phone_normalized, office_fax, office_email, website_url";

fn map_office_row(row: &rusqlite::Row) -> rusqlite::Result<OfficeRecord> {
    Ok(OfficeRecord {
        national_association_id: row.get(0)?,
        name: row.get(1)?,
        address1: row.get(2)?,
        address2: row.get(3)?,
        city: row.get(4)?,
        state_or_province: row.get(5)?,
        postal_code: row.get(6)?,
        phone: row.get(7)?,
        phone_normalized: row.get(8)?,
        fax: row.get(9)?,
        email: row.get(10)?,
        website_url: row.get(11)?,
    })
}

impl OfficeDb {
    /// Insert or replace offices keyed by national association id.
    ///
    /// The normalized phone is always recomputed from `phone`. All rows are
    /// written in one transaction; returns the number of rows written.
    pub fn upsert_offices(&self, records: &[OfficeRecord]) -> Result<usize, DbError> {
        if records.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO offices
                 (office_national_association_id, office_name, office_address1, office_address2,
                  office_city, office_state_or_province, office_postal_code, office_phone,
                  office_phone_normalized, office_fax, office_email, website_url, synced_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, datetime('now'))",
            )?;

            for office in records {
                let phone_normalized = office
                    .phone
                    .as_deref()
                    .map(normalize_phone)
                    .unwrap_or_default();
                stmt.execute(params![
                    office.national_association_id,
                    office.name,
                    office.address1,
                    office.address2,
                    office.city,
                    office.state_or_province,
                    office.postal_code,
                    office.phone,
                    phone_normalized,
                    office.fax,
                    office.email,
                    office.website_url,
                ])?;
            }
        }
        tx.commit()?;

        Ok(records.len())
    }

    /// Delete offices by id. Unknown ids are ignored; returns rows removed.
    pub fn delete_offices(&self, ids: &[String]) -> Result<usize, DbError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.unchecked_transaction()?;
        let mut removed = 0;
        for chunk in ids.chunks(DELETE_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "DELETE FROM offices WHERE office_national_association_id IN ({})",
                placeholders
            );
            removed += tx.execute(&sql, params_from_iter(chunk.iter()))?;
        }
        tx.commit()?;

        Ok(removed)
    }

    pub fn count_offices(&self) -> Result<usize, DbError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM offices", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    /// All offices ordered by name, then id.
    pub fn list_offices(&self) -> Result<Vec<OfficeRecord>, DbError> {
        let sql = format!(
            "SELECT {} FROM offices ORDER BY office_name COLLATE NOCASE, office_national_association_id",
            OFFICE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], map_office_row)?;

        let mut offices = Vec::new();
        for row in rows {
            offices.push(row?);
        }
        Ok(offices)
    }

    pub fn get_office(&self, id: &str) -> Result<Option<OfficeRecord>, DbError> {
        let sql = format!(
            "SELECT {} FROM offices WHERE office_national_association_id = ?1",
            OFFICE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![id], map_office_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Remove every office row. Watermarks are left untouched.
    pub fn clear_offices(&self) -> Result<usize, DbError> {
        Ok(self.conn.execute("DELETE FROM offices", [])?)
    }
}
