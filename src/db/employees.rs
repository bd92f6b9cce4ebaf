use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::*;
use crate::util::normalize_name;

impl AnalyticsDb {
    // =========================================================================
    // Employees
    // =========================================================================

    /// Insert an employee if no row exists for the normalized (first, last)
    /// identity. Returns `(id, created)`.
    ///
    /// The unique index on the normalized columns makes this safe against two
    /// concurrent imports resolving the same new name — the second insert is a
    /// no-op and both resolve to the same id.
    pub fn insert_employee_if_absent(
        &self,
        first_name: &str,
        last_name: &str,
        role: &str,
        daily_cost: f64,
        source: Option<&str>,
    ) -> Result<(i64, bool), DbError> {
        let first_norm = normalize_name(first_name);
        let last_norm = normalize_name(last_name);

        let inserted = self.conn.execute(
            "INSERT INTO employees
                (first_name, last_name, first_name_norm, last_name_norm,
                 role, daily_cost, active, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8)
             ON CONFLICT(first_name_norm, last_name_norm) DO NOTHING",
            params![
                first_name,
                last_name,
                first_norm,
                last_norm,
                role,
                daily_cost,
                source,
                Utc::now().to_rfc3339(),
            ],
        )?;

        let id: i64 = self.conn.query_row(
            "SELECT id FROM employees WHERE first_name_norm = ?1 AND last_name_norm = ?2",
            params![first_norm, last_norm],
            |row| row.get(0),
        )?;

        Ok((id, inserted > 0))
    }

    /// Look up an employee id by normalized (first, last) identity.
    pub fn find_employee_id(
        &self,
        first_norm: &str,
        last_norm: &str,
    ) -> Result<Option<i64>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id FROM employees WHERE first_name_norm = ?1 AND last_name_norm = ?2",
                params![first_norm, last_norm],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Get an employee by id.
    pub fn get_employee(&self, id: i64) -> Result<Option<DbEmployee>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, first_name, last_name, role, daily_cost, active, source, created_at
                 FROM employees WHERE id = ?1",
                params![id],
                Self::map_employee_row,
            )
            .optional()?)
    }

    /// List employees, optionally restricted to active ones.
    pub fn list_employees(&self, active_only: bool) -> Result<Vec<DbEmployee>, DbError> {
        let sql = if active_only {
            "SELECT id, first_name, last_name, role, daily_cost, active, source, created_at
             FROM employees WHERE active = 1 ORDER BY last_name_norm, first_name_norm"
        } else {
            "SELECT id, first_name, last_name, role, daily_cost, active, source, created_at
             FROM employees ORDER BY last_name_norm, first_name_norm"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], Self::map_employee_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Count active employees (progress-endpoint denominator).
    pub fn count_active_employees(&self) -> Result<i64, DbError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM employees WHERE active = 1", [], |row| {
                row.get(0)
            })?)
    }

    /// Soft-deactivate an employee. Rows with dependents are never hard-deleted.
    pub fn deactivate_employee(&self, id: i64) -> Result<(), DbError> {
        self.conn
            .execute("UPDATE employees SET active = 0 WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn map_employee_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbEmployee> {
        Ok(DbEmployee {
            id: row.get(0)?,
            first_name: row.get(1)?,
            last_name: row.get(2)?,
            role: row.get(3)?,
            daily_cost: row.get(4)?,
            active: row.get::<_, i64>(5)? != 0,
            source: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    // =========================================================================
    // Aliases
    // =========================================================================

    /// Record a name variant for an employee (INSERT OR IGNORE — the alias_norm
    /// key is unique, so repeated fuzzy matches don't pile up rows).
    pub fn insert_alias(
        &self,
        employee_id: i64,
        alias_first_name: &str,
        alias_last_name: &str,
        source: Option<&str>,
    ) -> Result<bool, DbError> {
        let alias_norm = normalize_name(&format!("{} {}", alias_first_name, alias_last_name));
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO employee_aliases
                (employee_id, alias_first_name, alias_last_name, alias_norm, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                employee_id,
                alias_first_name,
                alias_last_name,
                alias_norm,
                source,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Look up the owning employee of a normalized alias string.
    pub fn find_alias_employee(&self, alias_norm: &str) -> Result<Option<i64>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT employee_id FROM employee_aliases WHERE alias_norm = ?1",
                params![alias_norm],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// All alias rows, used to seed the resolver cache at batch start.
    pub fn list_aliases(&self) -> Result<Vec<DbAlias>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, employee_id, alias_first_name, alias_last_name, alias_norm, source, created_at
             FROM employee_aliases ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(DbAlias {
                id: row.get(0)?,
                employee_id: row.get(1)?,
                alias_first_name: row.get(2)?,
                alias_last_name: row.get(3)?,
                alias_norm: row.get(4)?,
                source: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Count all alias rows.
    pub fn count_aliases(&self) -> Result<i64, DbError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM employee_aliases", [], |row| row.get(0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_if_absent_is_idempotent() {
        let db = AnalyticsDb::open_in_memory().unwrap();

        let (id1, created1) = db
            .insert_employee_if_absent("Franco", "Fiorellino", "technician", 120.0, None)
            .unwrap();
        assert!(created1);

        // Same identity, different casing and spacing
        let (id2, created2) = db
            .insert_employee_if_absent("FRANCO", "  Fiorellino ", "technician", 120.0, None)
            .unwrap();
        assert!(!created2, "second insert must be a no-op");
        assert_eq!(id1, id2);

        let all = db.list_employees(false).unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_deactivate_is_soft() {
        let db = AnalyticsDb::open_in_memory().unwrap();
        let (id, _) = db
            .insert_employee_if_absent("Matteo", "Signo", "technician", 100.0, None)
            .unwrap();

        db.deactivate_employee(id).unwrap();
        let emp = db.get_employee(id).unwrap().expect("row still present");
        assert!(!emp.active);
        assert_eq!(db.count_active_employees().unwrap(), 0);
    }

    #[test]
    fn test_alias_round_trip() {
        let db = AnalyticsDb::open_in_memory().unwrap();
        let (id, _) = db
            .insert_employee_if_absent("Franco", "Fiorellino", "technician", 120.0, None)
            .unwrap();

        assert!(db.insert_alias(id, "F.", "Fiorellino", Some("attivita.csv")).unwrap());
        // Duplicate alias is ignored
        assert!(!db.insert_alias(id, "F.", "Fiorellino", None).unwrap());

        let owner = db.find_alias_employee("f. fiorellino").unwrap();
        assert_eq!(owner, Some(id));
        assert_eq!(db.count_aliases().unwrap(), 1);
    }
}
