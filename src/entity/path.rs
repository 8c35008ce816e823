//! Relative upload paths.
//!
//! An upload may carry a path such as `photos/2024/beach.jpg`. Every
//! directory segment is looked up under the current parent and created
//! when missing, so two files sharing a prefix land in the same directory.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{Result, StashError};

use super::{new_entity_id, validate_entity_name, EntityRepository, NewEntity};

/// Split a relative file path into its directory segments.
///
/// The last segment is the file name and is dropped. Empty and `.`
/// segments are ignored, `..` is rejected.
pub fn parse_relative_path(relative: &str) -> Result<Vec<String>> {
    let mut segments: Vec<&str> = relative
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    segments.pop();

    segments
        .into_iter()
        .map(|segment| {
            if segment == ".." {
                return Err(StashError::Validation(format!(
                    "path '{relative}' may not contain '..'"
                )));
            }
            validate_entity_name(segment)?;
            Ok(segment.to_string())
        })
        .collect()
}

/// Resolves directory segments to a directory ID.
pub struct PathResolver;

impl PathResolver {
    /// Walk `segments` below `parent_id`, creating missing directories.
    ///
    /// Returns the deepest directory, or `parent_id` when there are no
    /// segments. New directories start with size 0.
    pub async fn resolve_or_create(
        conn: &mut SqliteConnection,
        storage_id: &str,
        parent_id: Option<&str>,
        segments: &[String],
        uploader_id: &str,
        uploaded_at: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let mut current = parent_id.map(str::to_string);

        for segment in segments {
            let existing =
                EntityRepository::find_directory(conn, storage_id, current.as_deref(), segment)
                    .await?;

            current = Some(match existing {
                Some(directory) => directory.id,
                None => {
                    let directory =
                        NewEntity::directory(new_entity_id(), storage_id, segment, uploader_id)
                            .with_parent(current.clone())
                            .with_uploaded_at(uploaded_at);
                    EntityRepository::create(conn, &directory).await?.id
                }
            });
        }

        Ok(current)
    }
}
