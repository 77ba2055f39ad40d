//! Organization, department and user writes

use rusqlite::params;

use super::Database;
use crate::error::Result;
use crate::models::{Department, Organization, User};
use crate::store::WriteMode;

fn insert_verb(mode: WriteMode) -> &'static str {
    match mode {
        WriteMode::Create => "INSERT",
        WriteMode::IfMissing => "INSERT OR IGNORE",
    }
}

impl Database {
    pub fn insert_organization(&self, org: &Organization, mode: WriteMode) -> Result<bool> {
        let conn = self.conn()?;
        let sql = format!(
            "{} INTO organizations (id, name) VALUES (?, ?)",
            insert_verb(mode)
        );
        let changed = conn.execute(&sql, params![org.id, org.name])?;
        Ok(changed > 0)
    }

    pub fn insert_department(&self, dept: &Department, mode: WriteMode) -> Result<bool> {
        let conn = self.conn()?;
        let sql = format!(
            "{} INTO departments (id, name, organization_id) VALUES (?, ?, ?)",
            insert_verb(mode)
        );
        let changed = conn.execute(&sql, params![dept.id, dept.name, dept.organization_id])?;
        Ok(changed > 0)
    }

    pub fn insert_user(&self, user: &User, mode: WriteMode) -> Result<bool> {
        let conn = self.conn()?;
        let sql = format!(
            "{} INTO users (id, email, name, role, organization_id) VALUES (?, ?, ?, ?, ?)",
            insert_verb(mode)
        );
        let changed = conn.execute(
            &sql,
            params![
                user.id,
                user.email,
                user.name,
                user.role.as_str(),
                user.organization_id
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn user_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, email, name, role, organization_id FROM users ORDER BY rowid",
        )?;

        let users = stmt
            .query_map([], |row| {
                let role: String = row.get(3)?;
                Ok(User {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    name: row.get(2)?,
                    role: role.parse().unwrap_or(crate::models::UserRole::User),
                    organization_id: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(users)
    }

    pub fn list_departments(&self) -> Result<Vec<Department>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, name, organization_id FROM departments ORDER BY rowid")?;

        let depts = stmt
            .query_map([], |row| {
                Ok(Department {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    organization_id: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(depts)
    }
}
