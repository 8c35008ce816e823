//! Database schema and migrations for stash.
//!
//! Migrations are applied sequentially when the database is first opened
//! or upgraded.

/// Database migrations.
///
/// Each migration is a SQL script executed in order. The schema_version
/// table tracks which migrations have been applied.
pub const MIGRATIONS: &[&str] = &[
    // v1: Storages and their members
    r#"
CREATE TABLE storages (
    id                    TEXT PRIMARY KEY,
    name                  TEXT NOT NULL UNIQUE,
    description           TEXT,
    owner_id              TEXT NOT NULL,
    size                  INTEGER NOT NULL,            -- capacity in bytes
    used                  INTEGER NOT NULL DEFAULT 0,  -- sum of file sizes
    access                TEXT NOT NULL DEFAULT 'private',  -- 'public', 'private'
    restrict_file_size    INTEGER NOT NULL DEFAULT 0,
    max_file_size         INTEGER NOT NULL DEFAULT 0,
    restrict_files_count  INTEGER NOT NULL DEFAULT 0,
    max_files_count       INTEGER NOT NULL DEFAULT 0,
    created_at            TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE storage_members (
    storage_id  TEXT NOT NULL REFERENCES storages(id) ON DELETE CASCADE,
    user_id     TEXT NOT NULL,
    role        TEXT NOT NULL,  -- 'administrator', 'maintainer', 'watcher'
    PRIMARY KEY (storage_id, user_id)
);

CREATE INDEX idx_storage_members_user ON storage_members(user_id);
"#,
    // v2: Entity tree (adjacency list)
    r#"
CREATE TABLE entities (
    id           TEXT PRIMARY KEY,
    storage_id   TEXT NOT NULL REFERENCES storages(id) ON DELETE CASCADE,
    parent_id    TEXT REFERENCES entities(id),
    entity_type  TEXT NOT NULL,  -- 'file', 'directory'
    name         TEXT NOT NULL,
    extension    TEXT NOT NULL DEFAULT '',
    fullname     TEXT NOT NULL,
    size         INTEGER NOT NULL DEFAULT 0,
    uploader_id  TEXT NOT NULL,
    uploaded_at  TEXT NOT NULL
);

CREATE INDEX idx_entities_storage_parent ON entities(storage_id, parent_id);
CREATE INDEX idx_entities_parent ON entities(parent_id);

-- Two directories with the same name cannot coexist under one parent
CREATE UNIQUE INDEX idx_entities_directory_name
    ON entities(storage_id, COALESCE(parent_id, ''), name)
    WHERE entity_type = 'directory';
"#,
];
