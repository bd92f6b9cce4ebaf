use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::*;
use crate::util::normalize_name;

impl AnalyticsDb {
    // =========================================================================
    // Companies
    // =========================================================================

    /// Insert a company if no row exists for the normalized name.
    /// Returns `(id, created)`. Same insert-if-absent pattern as employees.
    pub fn insert_company_if_absent(
        &self,
        name: &str,
        short_name: Option<&str>,
    ) -> Result<(i64, bool), DbError> {
        let name_norm = normalize_name(name);

        let inserted = self.conn.execute(
            "INSERT INTO companies (name, short_name, name_norm, active, created_at)
             VALUES (?1, ?2, ?3, 1, ?4)
             ON CONFLICT(name_norm) DO NOTHING",
            params![name, short_name, name_norm, Utc::now().to_rfc3339()],
        )?;

        let id: i64 = self.conn.query_row(
            "SELECT id FROM companies WHERE name_norm = ?1",
            params![name_norm],
            |row| row.get(0),
        )?;

        Ok((id, inserted > 0))
    }

    /// Look up a company id by normalized name.
    pub fn find_company_id(&self, name_norm: &str) -> Result<Option<i64>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id FROM companies WHERE name_norm = ?1",
                params![name_norm],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// List companies, optionally restricted to active ones.
    pub fn list_companies(&self, active_only: bool) -> Result<Vec<DbCompany>, DbError> {
        let sql = if active_only {
            "SELECT id, name, short_name, active, created_at
             FROM companies WHERE active = 1 ORDER BY name_norm"
        } else {
            "SELECT id, name, short_name, active, created_at FROM companies ORDER BY name_norm"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(DbCompany {
                id: row.get(0)?,
                name: row.get(1)?,
                short_name: row.get(2)?,
                active: row.get::<_, i64>(3)? != 0,
                created_at: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Soft-deactivate a company.
    pub fn deactivate_company(&self, id: i64) -> Result<(), DbError> {
        self.conn
            .execute("UPDATE companies SET active = 0 WHERE id = ?1", params![id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_company_insert_if_absent() {
        let db = AnalyticsDb::open_in_memory().unwrap();

        let (id1, created1) = db.insert_company_if_absent("Acme S.r.l.", Some("Acme")).unwrap();
        assert!(created1);

        let (id2, created2) = db.insert_company_if_absent("ACME  S.r.l.", None).unwrap();
        assert!(!created2);
        assert_eq!(id1, id2);

        assert_eq!(db.find_company_id("acme s.r.l.").unwrap(), Some(id1));
    }
}
