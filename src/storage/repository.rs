//! Storage repository for stash.
//!
//! Functions take a `SqliteConnection` so callers can run them on a
//! pooled connection or inside a transaction.

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{Result, StashError};

use super::model::{Member, NewStorage, Storage, StorageUpdate};

const STORAGE_COLUMNS: &str = "id, name, description, owner_id, size, used, access,
    restrict_file_size, max_file_size, restrict_files_count, max_files_count, created_at";

/// Turn a violated unique storage name into a client-facing error.
fn name_conflict(e: sqlx::Error, name: &str) -> StashError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            StashError::InvalidOperation(format!("a storage named {name} already exists"))
        }
        e => e.into(),
    }
}

/// Repository for storage and member records.
pub struct StorageRepository;

impl StorageRepository {
    /// Insert a new storage with the given ID and its initial members.
    pub async fn create(
        conn: &mut SqliteConnection,
        id: &str,
        storage: &NewStorage,
        owner_id: &str,
    ) -> Result<Storage> {
        sqlx::query(
            "INSERT INTO storages (id, name, description, owner_id, size, used, access,
                                   restrict_file_size, max_file_size,
                                   restrict_files_count, max_files_count)
             VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&storage.name)
        .bind(&storage.description)
        .bind(owner_id)
        .bind(storage.size)
        .bind(storage.access.as_str())
        .bind(storage.max_file_size.is_some())
        .bind(storage.max_file_size.unwrap_or(0))
        .bind(storage.max_files_count.is_some())
        .bind(storage.max_files_count.unwrap_or(0))
        .execute(&mut *conn)
        .await
        .map_err(|e| name_conflict(e, &storage.name))?;

        Self::replace_members(conn, id, &storage.members).await?;

        Self::get_by_id(conn, id)
            .await?
            .ok_or_else(|| crate::StashError::NotFound("storage".to_string()))
    }

    /// Get a storage by ID.
    pub async fn get_by_id(conn: &mut SqliteConnection, id: &str) -> Result<Option<Storage>> {
        let storage =
            sqlx::query_as::<_, Storage>(&format!("SELECT {STORAGE_COLUMNS} FROM storages WHERE id = ?"))
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;

        Ok(storage)
    }

    /// Get a storage by its unique name.
    pub async fn get_by_name(conn: &mut SqliteConnection, name: &str) -> Result<Option<Storage>> {
        let storage = sqlx::query_as::<_, Storage>(&format!(
            "SELECT {STORAGE_COLUMNS} FROM storages WHERE name = ?"
        ))
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(storage)
    }

    /// List all storages.
    pub async fn list_all(conn: &mut SqliteConnection) -> Result<Vec<Storage>> {
        let storages =
            sqlx::query_as::<_, Storage>(&format!("SELECT {STORAGE_COLUMNS} FROM storages ORDER BY name"))
                .fetch_all(&mut *conn)
                .await?;

        Ok(storages)
    }

    /// List storages that are public, owned by the user, or have the user as member.
    pub async fn list_visible_to(conn: &mut SqliteConnection, user_id: &str) -> Result<Vec<Storage>> {
        let storages = sqlx::query_as::<_, Storage>(&format!(
            "SELECT {STORAGE_COLUMNS} FROM storages
             WHERE access = 'public'
                OR owner_id = ?
                OR id IN (SELECT storage_id FROM storage_members WHERE user_id = ?)
             ORDER BY name"
        ))
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(storages)
    }

    /// Update a storage. Returns None if the storage does not exist.
    pub async fn update(
        conn: &mut SqliteConnection,
        id: &str,
        update: &StorageUpdate,
    ) -> Result<Option<Storage>> {
        if update.has_column_changes() {
            let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE storages SET ");
            let mut separated = query.separated(", ");

            if let Some(ref name) = update.name {
                separated.push("name = ");
                separated.push_bind_unseparated(name.clone());
            }
            if let Some(ref description) = update.description {
                separated.push("description = ");
                separated.push_bind_unseparated(description.clone());
            }
            if let Some(size) = update.size {
                separated.push("size = ");
                separated.push_bind_unseparated(size);
            }
            if let Some(access) = update.access {
                separated.push("access = ");
                separated.push_bind_unseparated(access.as_str());
            }
            if let Some(max_file_size) = update.max_file_size {
                separated.push("restrict_file_size = ");
                separated.push_bind_unseparated(max_file_size.is_some());
                separated.push("max_file_size = ");
                separated.push_bind_unseparated(max_file_size.unwrap_or(0));
            }
            if let Some(max_files_count) = update.max_files_count {
                separated.push("restrict_files_count = ");
                separated.push_bind_unseparated(max_files_count.is_some());
                separated.push("max_files_count = ");
                separated.push_bind_unseparated(max_files_count.unwrap_or(0));
            }

            query.push(" WHERE id = ");
            query.push_bind(id);

            let result = query
                .build()
                .execute(&mut *conn)
                .await
                .map_err(|e| name_conflict(e, update.name.as_deref().unwrap_or_default()))?;
            if result.rows_affected() == 0 {
                return Ok(None);
            }
        }

        if let Some(ref members) = update.members {
            if Self::get_by_id(conn, id).await?.is_none() {
                return Ok(None);
            }
            Self::replace_members(conn, id, members).await?;
        }

        Self::get_by_id(conn, id).await
    }

    /// Add `delta` bytes to the storage's used counter in one statement.
    ///
    /// The counter never drops below zero.
    pub async fn adjust_used(conn: &mut SqliteConnection, id: &str, delta: i64) -> Result<()> {
        sqlx::query("UPDATE storages SET used = MAX(0, used + ?) WHERE id = ?")
            .bind(delta)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Delete a storage. Members and entities are removed by cascade.
    pub async fn delete(conn: &mut SqliteConnection, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM storages WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List the members of a storage.
    pub async fn members(conn: &mut SqliteConnection, id: &str) -> Result<Vec<Member>> {
        let members = sqlx::query_as::<_, Member>(
            "SELECT user_id, role FROM storage_members WHERE storage_id = ? ORDER BY user_id",
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(members)
    }

    /// Replace the member list of a storage.
    pub async fn replace_members(
        conn: &mut SqliteConnection,
        id: &str,
        members: &[Member],
    ) -> Result<()> {
        sqlx::query("DELETE FROM storage_members WHERE storage_id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if members.is_empty() {
            return Ok(());
        }

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT OR REPLACE INTO storage_members (storage_id, user_id, role) ");
        query.push_values(members, |mut row, member| {
            row.push_bind(id)
                .push_bind(member.user_id.clone())
                .push_bind(member.role.as_str());
        });
        query.build().execute(&mut *conn).await?;

        Ok(())
    }
}
