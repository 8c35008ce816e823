//! Download streaming.
//!
//! A download is resolved into a [`DownloadPlan`] before any byte is
//! written. A single file is streamed raw; anything else becomes a zip
//! archive whose entries are written one blob at a time, so the sink's
//! backpressure bounds memory use.

use std::io;
use std::path::PathBuf;

use async_zip::tokio::write::ZipFileWriter;
use async_zip::{Compression, ZipEntryBuilder};
use sqlx::SqliteConnection;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::compat::TokioAsyncReadCompatExt;
use tracing::{debug, warn};

use crate::blob::BlobStore;
use crate::entity::{Entity, EntityRepository};
use crate::service::{load_requested, outermost};
use crate::{Result, StashError};

/// File name used for zip downloads.
pub const ARCHIVE_NAME: &str = "archive.zip";

/// One file inside a zip download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveItem {
    /// Path inside the archive, e.g. `photos/2024/beach.jpg`.
    pub name: String,
    /// Blob on disk.
    pub path: PathBuf,
}

/// What a download request resolved to.
#[derive(Debug)]
pub enum DownloadPlan {
    /// A single file, streamed as is.
    File {
        /// Name presented to the client.
        fullname: String,
        /// Blob on disk.
        path: PathBuf,
    },
    /// Several entities or a directory, streamed as a zip archive.
    Archive {
        /// Files in archive order.
        items: Vec<ArchiveItem>,
    },
}

impl DownloadPlan {
    /// Resolve the requested entities of a storage.
    ///
    /// One file yields a raw download; its blob must exist. Otherwise every
    /// requested entity is expanded, directories contributing their
    /// descendant files under `dirname/...` paths.
    pub async fn build(
        conn: &mut SqliteConnection,
        blobs: &BlobStore,
        storage_id: &str,
        entity_ids: &[String],
    ) -> Result<Self> {
        let requested = load_requested(conn, storage_id, entity_ids).await?;
        let entities = outermost(conn, requested).await?;

        if let [entity] = entities.as_slice() {
            if entity.is_file() {
                if !blobs.exists(storage_id, &entity.id, &entity.extension).await {
                    warn!(storage_id, entity_id = %entity.id, "blob missing for download");
                    return Err(StashError::NotFound(format!("file {}", entity.fullname)));
                }
                return Ok(DownloadPlan::File {
                    fullname: entity.fullname.clone(),
                    path: blobs.blob_path(storage_id, &entity.id, &entity.extension),
                });
            }
        }

        let mut items = Vec::new();
        for entity in entities {
            Self::collect(conn, blobs, entity, &mut items).await?;
        }
        Ok(DownloadPlan::Archive { items })
    }

    async fn collect(
        conn: &mut SqliteConnection,
        blobs: &BlobStore,
        root: Entity,
        items: &mut Vec<ArchiveItem>,
    ) -> Result<()> {
        let mut stack = vec![(root, String::new())];
        let mut visited = 0;

        while let Some((entity, base)) = stack.pop() {
            visited += 1;
            if visited > 1_000_000 {
                return Err(StashError::Integrity("download tree does not terminate".to_string()));
            }

            if entity.is_file() {
                items.push(ArchiveItem {
                    name: format!("{base}{}", entity.fullname),
                    path: blobs.blob_path(&entity.storage_id, &entity.id, &entity.extension),
                });
                continue;
            }

            let base = format!("{base}{}/", entity.name);
            let children = EntityRepository::children(conn, &entity.id).await?;
            stack.extend(children.into_iter().rev().map(|child| (child, base.clone())));
        }

        Ok(())
    }

    /// Name offered to the client.
    pub fn file_name(&self) -> &str {
        match self {
            DownloadPlan::File { fullname, .. } => fullname,
            DownloadPlan::Archive { .. } => ARCHIVE_NAME,
        }
    }

    /// MIME type of the stream.
    pub fn content_type(&self) -> String {
        match self {
            DownloadPlan::File { fullname, .. } => mime_guess::from_path(fullname)
                .first_or_octet_stream()
                .to_string(),
            DownloadPlan::Archive { .. } => "application/zip".to_string(),
        }
    }

    /// Stream the download into `sink`.
    ///
    /// Blobs that vanished since the plan was built are left out of an
    /// archive with a warning.
    pub async fn write_to<W>(self, mut sink: W) -> Result<W>
    where
        W: AsyncWrite + Unpin,
    {
        match self {
            DownloadPlan::File { fullname, path } => {
                let mut file = match tokio::fs::File::open(&path).await {
                    Ok(file) => file,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        return Err(StashError::NotFound(format!("file {fullname}")));
                    }
                    Err(e) => return Err(e.into()),
                };
                let bytes = tokio::io::copy(&mut file, &mut sink).await?;
                sink.flush().await?;
                debug!(bytes, "raw download finished");
                Ok(sink)
            }
            DownloadPlan::Archive { items } => {
                let mut writer = ZipFileWriter::with_tokio(sink);
                let mut written = 0;

                for item in items {
                    let file = match tokio::fs::File::open(&item.path).await {
                        Ok(file) => file,
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {
                            warn!(entry = %item.name, "blob missing, leaving it out of the archive");
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    };

                    let builder = ZipEntryBuilder::new(item.name.into(), Compression::Deflate);
                    let mut entry = writer.write_entry_stream(builder).await?;
                    futures::io::copy(file.compat(), &mut entry).await?;
                    entry.close().await?;
                    written += 1;
                }

                let mut sink = writer.close().await?.into_inner();
                sink.flush().await?;
                debug!(entries = written, "archive download finished");
                Ok(sink)
            }
        }
    }
}
