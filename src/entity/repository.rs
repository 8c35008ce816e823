//! Entity repository for stash.
//!
//! The tree is stored as an adjacency list. Traversals are iterative and
//! bounded by [`MAX_TREE_DEPTH`] so a corrupted parent chain surfaces as an
//! integrity error instead of a hang.

use std::collections::HashSet;

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{Result, StashError};

use super::model::{Breadcrumb, Entity, NewEntity};
use super::MAX_TREE_DEPTH;

const ENTITY_COLUMNS: &str = "id, storage_id, parent_id, entity_type, name, extension,
    fullname, size, uploader_id, uploaded_at";

/// Rows per multi-row insert, kept under SQLite's bind parameter limit.
const INSERT_CHUNK: usize = 80;

/// Repository for entity records.
pub struct EntityRepository;

impl EntityRepository {
    /// Insert a single entity.
    pub async fn create(conn: &mut SqliteConnection, entity: &NewEntity) -> Result<Entity> {
        sqlx::query(
            "INSERT INTO entities (id, storage_id, parent_id, entity_type, name, extension,
                                   fullname, size, uploader_id, uploaded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entity.id)
        .bind(&entity.storage_id)
        .bind(&entity.parent_id)
        .bind(entity.entity_type.as_str())
        .bind(&entity.name)
        .bind(&entity.extension)
        .bind(&entity.fullname)
        .bind(entity.size)
        .bind(&entity.uploader_id)
        .bind(entity.uploaded_at)
        .execute(&mut *conn)
        .await?;

        Ok(entity.clone().into())
    }

    /// Insert many entities.
    ///
    /// Parents must precede their children in `entities`.
    pub async fn bulk_create(conn: &mut SqliteConnection, entities: &[NewEntity]) -> Result<u64> {
        let mut inserted = 0;

        for chunk in entities.chunks(INSERT_CHUNK) {
            let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO entities (id, storage_id, parent_id, entity_type, name, extension,
                                       fullname, size, uploader_id, uploaded_at) ",
            );
            query.push_values(chunk, |mut row, entity| {
                row.push_bind(entity.id.clone())
                    .push_bind(entity.storage_id.clone())
                    .push_bind(entity.parent_id.clone())
                    .push_bind(entity.entity_type.as_str())
                    .push_bind(entity.name.clone())
                    .push_bind(entity.extension.clone())
                    .push_bind(entity.fullname.clone())
                    .push_bind(entity.size)
                    .push_bind(entity.uploader_id.clone())
                    .push_bind(entity.uploaded_at);
            });

            inserted += query.build().execute(&mut *conn).await?.rows_affected();
        }

        Ok(inserted)
    }

    /// Get an entity by ID.
    pub async fn get_by_id(conn: &mut SqliteConnection, id: &str) -> Result<Option<Entity>> {
        let entity =
            sqlx::query_as::<_, Entity>(&format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?"))
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;

        Ok(entity)
    }

    /// Get an entity by ID, only if it belongs to the given storage.
    pub async fn get_in_storage(
        conn: &mut SqliteConnection,
        storage_id: &str,
        id: &str,
    ) -> Result<Option<Entity>> {
        let entity = sqlx::query_as::<_, Entity>(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ? AND storage_id = ?"
        ))
        .bind(id)
        .bind(storage_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(entity)
    }

    /// List the children of a directory, or the root entries when `parent_id` is None.
    ///
    /// Directories come first, then entries are ordered by full name.
    pub async fn list(
        conn: &mut SqliteConnection,
        storage_id: &str,
        parent_id: Option<&str>,
    ) -> Result<Vec<Entity>> {
        let entities = sqlx::query_as::<_, Entity>(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities
             WHERE storage_id = ? AND parent_id IS ?
             ORDER BY entity_type = 'directory' DESC, fullname"
        ))
        .bind(storage_id)
        .bind(parent_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(entities)
    }

    /// Get the direct children of an entity.
    pub async fn children(conn: &mut SqliteConnection, parent_id: &str) -> Result<Vec<Entity>> {
        let entities = sqlx::query_as::<_, Entity>(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE parent_id = ?
             ORDER BY entity_type = 'directory' DESC, fullname"
        ))
        .bind(parent_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(entities)
    }

    /// Find a directory by name under a parent.
    pub async fn find_directory(
        conn: &mut SqliteConnection,
        storage_id: &str,
        parent_id: Option<&str>,
        name: &str,
    ) -> Result<Option<Entity>> {
        let entity = sqlx::query_as::<_, Entity>(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities
             WHERE storage_id = ? AND parent_id IS ? AND name = ? AND entity_type = 'directory'"
        ))
        .bind(storage_id)
        .bind(parent_id)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(entity)
    }

    /// Count the file entities of a storage.
    pub async fn count_files(conn: &mut SqliteConnection, storage_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM entities WHERE storage_id = ? AND entity_type = 'file'",
        )
        .bind(storage_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(count)
    }

    /// Update name and full name. Returns false if the entity does not exist.
    pub async fn rename(
        conn: &mut SqliteConnection,
        id: &str,
        name: &str,
        fullname: &str,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE entities SET name = ?, fullname = ? WHERE id = ?")
            .bind(name)
            .bind(fullname)
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Move an entity under another parent.
    pub async fn set_parent(
        conn: &mut SqliteConnection,
        id: &str,
        parent_id: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE entities SET parent_id = ? WHERE id = ?")
            .bind(parent_id)
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Add `delta` to an entity's size in a single statement.
    pub async fn adjust_size(conn: &mut SqliteConnection, id: &str, delta: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE entities SET size = size + ? WHERE id = ?")
            .bind(delta)
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a single entity. Children must already be gone.
    pub async fn delete(conn: &mut SqliteConnection, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM entities WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every entity of a storage.
    pub async fn delete_by_storage(conn: &mut SqliteConnection, storage_id: &str) -> Result<u64> {
        // Self references would block a plain delete of parents before children.
        sqlx::query("UPDATE entities SET parent_id = NULL WHERE storage_id = ?")
            .bind(storage_id)
            .execute(&mut *conn)
            .await?;

        let result = sqlx::query("DELETE FROM entities WHERE storage_id = ?")
            .bind(storage_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }

    /// Collect an entity and all its descendants.
    ///
    /// Every parent appears before its children.
    pub async fn subtree(conn: &mut SqliteConnection, root: &Entity) -> Result<Vec<Entity>> {
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![root.clone()];

        while let Some(entity) = stack.pop() {
            if !seen.insert(entity.id.clone()) {
                return Err(StashError::Integrity(format!(
                    "entity {} is reachable twice below {}",
                    entity.id, root.id
                )));
            }

            if entity.is_directory() {
                let children = Self::children(conn, &entity.id).await?;
                stack.extend(children.into_iter().rev());
            }
            result.push(entity);
        }

        Ok(result)
    }

    /// IDs on the chain from `id` up to the root, starting with `id` itself.
    pub async fn ancestor_ids(conn: &mut SqliteConnection, id: &str) -> Result<Vec<String>> {
        let mut chain = Vec::new();
        let mut current = Some(id.to_string());

        while let Some(current_id) = current {
            if chain.len() >= MAX_TREE_DEPTH || chain.contains(&current_id) {
                return Err(StashError::Integrity(format!(
                    "parent chain of {id} does not reach the root"
                )));
            }

            let parent: Option<Option<String>> =
                sqlx::query_scalar("SELECT parent_id FROM entities WHERE id = ?")
                    .bind(&current_id)
                    .fetch_optional(&mut *conn)
                    .await?;

            let parent = parent.ok_or_else(|| {
                StashError::Integrity(format!("entity {current_id} on the parent chain is missing"))
            })?;

            chain.push(current_id);
            current = parent;
        }

        Ok(chain)
    }

    /// Path from the root down to `id`, inclusive.
    pub async fn breadcrumbs(conn: &mut SqliteConnection, id: &str) -> Result<Vec<Breadcrumb>> {
        let mut crumbs = Vec::new();
        let mut current = Some(id.to_string());

        while let Some(current_id) = current {
            if crumbs.len() >= MAX_TREE_DEPTH {
                return Err(StashError::Integrity(format!(
                    "parent chain of {id} does not reach the root"
                )));
            }

            let row: Option<(String, Option<String>)> =
                sqlx::query_as("SELECT fullname, parent_id FROM entities WHERE id = ?")
                    .bind(&current_id)
                    .fetch_optional(&mut *conn)
                    .await?;

            let Some((fullname, parent_id)) = row else {
                if crumbs.is_empty() {
                    return Err(StashError::NotFound("entity".to_string()));
                }
                return Err(StashError::Integrity(format!(
                    "entity {current_id} on the parent chain is missing"
                )));
            };

            crumbs.push(Breadcrumb {
                id: current_id,
                fullname,
            });
            current = parent_id;
        }

        crumbs.reverse();
        Ok(crumbs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::entity::EntityType;
    use crate::storage::{NewStorage, StorageRepository};

    async fn setup() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        StorageRepository::create(&mut conn, "s1", &NewStorage::new("main", 1 << 20), "owner")
            .await
            .unwrap();
        db
    }

    fn dir(id: &str, parent: Option<&str>, name: &str) -> NewEntity {
        NewEntity::directory(id, "s1", name, "owner").with_parent(parent.map(str::to_string))
    }

    fn file(id: &str, parent: Option<&str>, name: &str, size: i64) -> NewEntity {
        NewEntity::file(id, "s1", name, size, "owner").with_parent(parent.map(str::to_string))
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let db = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();

        EntityRepository::create(&mut conn, &file("f1", None, "a.txt", 5))
            .await
            .unwrap();

        let entity = EntityRepository::get_by_id(&mut conn, "f1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entity.fullname, "a.txt");
        assert_eq!(entity.extension, "txt");
        assert_eq!(entity.entity_type, EntityType::File);
        assert!(entity.parent_id.is_none());

        assert!(EntityRepository::get_in_storage(&mut conn, "other", "f1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_orders_directories_first() {
        let db = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();

        EntityRepository::bulk_create(
            &mut conn,
            &[
                file("f1", None, "alpha.txt", 1),
                dir("d1", None, "zeta"),
                dir("d2", None, "beta"),
                file("f2", Some("d1"), "inner.txt", 1),
            ],
        )
        .await
        .unwrap();

        let root = EntityRepository::list(&mut conn, "s1", None).await.unwrap();
        let names: Vec<_> = root.iter().map(|e| e.fullname.as_str()).collect();
        assert_eq!(names, vec!["beta", "zeta", "alpha.txt"]);

        let inner = EntityRepository::list(&mut conn, "s1", Some("d1")).await.unwrap();
        assert_eq!(inner.len(), 1);
        assert_eq!(inner[0].id, "f2");
    }

    #[tokio::test]
    async fn test_bulk_create_many_rows() {
        let db = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let files: Vec<_> = (0..200)
            .map(|i| file(&format!("f{i}"), None, &format!("{i}.dat"), 1))
            .collect();
        let inserted = EntityRepository::bulk_create(&mut conn, &files).await.unwrap();

        assert_eq!(inserted, 200);
        assert_eq!(EntityRepository::count_files(&mut conn, "s1").await.unwrap(), 200);
    }

    #[tokio::test]
    async fn test_find_directory() {
        let db = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();

        EntityRepository::bulk_create(
            &mut conn,
            &[dir("d1", None, "docs"), dir("d2", Some("d1"), "docs")],
        )
        .await
        .unwrap();

        let top = EntityRepository::find_directory(&mut conn, "s1", None, "docs")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(top.id, "d1");

        let nested = EntityRepository::find_directory(&mut conn, "s1", Some("d1"), "docs")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(nested.id, "d2");

        assert!(EntityRepository::find_directory(&mut conn, "s1", Some("d2"), "docs")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_adjust_size_and_rename() {
        let db = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();

        EntityRepository::create(&mut conn, &dir("d1", None, "docs"))
            .await
            .unwrap();
        assert!(EntityRepository::adjust_size(&mut conn, "d1", 10).await.unwrap());
        assert!(EntityRepository::adjust_size(&mut conn, "d1", -4).await.unwrap());
        assert!(EntityRepository::rename(&mut conn, "d1", "papers", "papers")
            .await
            .unwrap());

        let d1 = EntityRepository::get_by_id(&mut conn, "d1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(d1.size, 6);
        assert_eq!(d1.name, "papers");

        assert!(!EntityRepository::adjust_size(&mut conn, "missing", 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_subtree_parents_first() {
        let db = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();

        EntityRepository::bulk_create(
            &mut conn,
            &[
                dir("a", None, "a"),
                dir("b", Some("a"), "b"),
                file("f1", Some("b"), "f1.txt", 1),
                file("f2", Some("a"), "f2.txt", 1),
            ],
        )
        .await
        .unwrap();

        let root = EntityRepository::get_by_id(&mut conn, "a").await.unwrap().unwrap();
        let subtree = EntityRepository::subtree(&mut conn, &root).await.unwrap();
        let ids: Vec<_> = subtree.iter().map(|e| e.id.as_str()).collect();

        assert_eq!(ids.len(), 4);
        assert_eq!(ids[0], "a");
        let pos = |id: &str| ids.iter().position(|x| *x == id).unwrap();
        assert!(pos("b") < pos("f1"));
    }

    #[tokio::test]
    async fn test_ancestor_ids_and_breadcrumbs() {
        let db = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();

        EntityRepository::bulk_create(
            &mut conn,
            &[
                dir("a", None, "a"),
                dir("b", Some("a"), "b"),
                file("f", Some("b"), "f.txt", 1),
            ],
        )
        .await
        .unwrap();

        let chain = EntityRepository::ancestor_ids(&mut conn, "f").await.unwrap();
        assert_eq!(chain, vec!["f", "b", "a"]);

        let crumbs = EntityRepository::breadcrumbs(&mut conn, "f").await.unwrap();
        let names: Vec<_> = crumbs.iter().map(|c| c.fullname.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "f.txt"]);

        let err = EntityRepository::breadcrumbs(&mut conn, "nope").await.unwrap_err();
        assert!(matches!(err, StashError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cycle_is_integrity_error() {
        let db = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();

        EntityRepository::bulk_create(&mut conn, &[dir("a", None, "a"), dir("b", Some("a"), "b")])
            .await
            .unwrap();
        EntityRepository::set_parent(&mut conn, "a", Some("b"))
            .await
            .unwrap();

        let err = EntityRepository::ancestor_ids(&mut conn, "b").await.unwrap_err();
        assert!(matches!(err, StashError::Integrity(_)));

        let err = EntityRepository::breadcrumbs(&mut conn, "b").await.unwrap_err();
        assert!(matches!(err, StashError::Integrity(_)));
    }

    #[tokio::test]
    async fn test_delete_by_storage() {
        let db = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();

        EntityRepository::bulk_create(
            &mut conn,
            &[dir("a", None, "a"), file("f", Some("a"), "f.txt", 1)],
        )
        .await
        .unwrap();

        let removed = EntityRepository::delete_by_storage(&mut conn, "s1").await.unwrap();
        assert_eq!(removed, 2);
        assert!(EntityRepository::list(&mut conn, "s1", None).await.unwrap().is_empty());
    }
}
