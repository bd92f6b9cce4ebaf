use rusqlite::{params, OptionalExtension};

use super::*;
use crate::util::normalize_name;

impl AnalyticsDb {
    // =========================================================================
    // Vehicles
    // =========================================================================
    //
    // The vehicles table exists primarily so the resolver can reject car model
    // names that show up in timesheet name fields. The original data had real
    // employees created for "Punto" and "Ducato".

    /// Insert a vehicle if absent (keyed on normalized name). Returns `(id, created)`.
    pub fn insert_vehicle_if_absent(
        &self,
        name: &str,
        plate: Option<&str>,
        cost_per_km: f64,
    ) -> Result<(i64, bool), DbError> {
        let name_norm = normalize_name(name);

        let inserted = self.conn.execute(
            "INSERT INTO vehicles (name, name_norm, plate, cost_per_km)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name_norm) DO NOTHING",
            params![name, name_norm, plate, cost_per_km],
        )?;

        let id: i64 = self.conn.query_row(
            "SELECT id FROM vehicles WHERE name_norm = ?1",
            params![name_norm],
            |row| row.get(0),
        )?;

        Ok((id, inserted > 0))
    }

    /// True if the normalized name denotes a vehicle.
    pub fn is_vehicle_name(&self, name_norm: &str) -> Result<bool, DbError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM vehicles WHERE name_norm = ?1",
                params![name_norm],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// All normalized vehicle names, used to seed the resolver cache.
    pub fn list_vehicle_names(&self) -> Result<Vec<String>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name_norm FROM vehicles ORDER BY name_norm")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// List all vehicles.
    pub fn list_vehicles(&self) -> Result<Vec<DbVehicle>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, plate, cost_per_km FROM vehicles ORDER BY name_norm")?;
        let rows = stmt.query_map([], |row| {
            Ok(DbVehicle {
                id: row.get(0)?,
                name: row.get(1)?,
                plate: row.get(2)?,
                cost_per_km: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
