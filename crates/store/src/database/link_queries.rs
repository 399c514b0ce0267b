//! Blob rows and the links that attach them to FILE nodes.
//!
//! A blob row exists exactly as long as one link references it. The
//! `link_release_file` trigger drops the row, and every unlink reports in the
//! same statement whether it released the last reference.

use sqlx::SqliteConnection;

use crate::database::models::{Link, NewBlob, Unlinked, VersionedFile};
use crate::error::{Result, StoreError};
use crate::types::{BlobId, NodeId, OwnerId, Timestamp};

const OWNED_FILE_NODE: &str = "EXISTS (
    SELECT 1 FROM tree
    WHERE tree.object_id = ?node AND tree.owner_id = ?owner AND tree.object_type = 'FILE'
)";

fn owned_file(node: &str, owner: &str) -> String {
    OWNED_FILE_NODE
        .replace("?node", node)
        .replace("?owner", owner)
}

/// Insert the blob row `file_id` and link it to `node`.
///
/// Both inserts require `node` to be a FILE owned by `owner`; the first
/// affects zero rows otherwise and the call fails with
/// [`StoreError::InsertFailure`].
pub async fn create_blob_with_link(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    node: &NodeId,
    file_id: &BlobId,
    blob: &NewBlob,
) -> Result<VersionedFile> {
    let file_id = *file_id;
    let now = Timestamp::now();

    let sql = format!(
        r#"
        INSERT INTO file (file_id, checksum, size, owner_id, uploaded_at)
        SELECT ?1, ?2, ?3, ?4, ?5
        WHERE {}
        "#,
        owned_file("?6", "?4")
    );
    let inserted = sqlx::query(&sql)
        .bind(file_id)
        .bind(&blob.checksum)
        .bind(blob.size)
        .bind(owner)
        .bind(now)
        .bind(node)
        .execute(&mut *conn)
        .await?;
    if inserted.rows_affected() != 1 {
        return Err(StoreError::InsertFailure("file"));
    }

    let link = create_link(conn, owner, node, &file_id)
        .await?
        .ok_or(StoreError::InsertFailure("link"))?;

    Ok(VersionedFile {
        object_id: *node,
        file_id,
        checksum: blob.checksum.clone(),
        size: blob.size,
        owner_id: *owner,
        uploaded_at: now,
        linked_at: link.linked_at,
    })
}

/// Link an existing blob of `owner` to `node`. `None` unless `node` is an
/// owned FILE and the blob belongs to the same owner.
pub async fn create_link(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    node: &NodeId,
    file_id: &BlobId,
) -> Result<Option<Link>> {
    let sql = format!(
        r#"
        INSERT INTO link (object_id, file_id, linked_at)
        SELECT ?1, file.file_id, ?3
        FROM file
        WHERE file.file_id = ?2 AND file.owner_id = ?4 AND {}
        ON CONFLICT DO NOTHING
        RETURNING object_id, file_id, linked_at
        "#,
        owned_file("?1", "?4")
    );
    let link = sqlx::query_as::<_, Link>(&sql)
        .bind(node)
        .bind(file_id)
        .bind(Timestamp::now())
        .bind(owner)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(link)
}

/// Remove one link. `None` when no such link exists for this owner.
pub async fn remove_link(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    node: &NodeId,
    file_id: &BlobId,
) -> Result<Option<Unlinked>> {
    let unlinked = sqlx::query_as::<_, Unlinked>(
        r#"
        DELETE FROM link
        WHERE link.object_id = ?1 AND link.file_id = ?2
          AND EXISTS (
            SELECT 1 FROM file WHERE file.file_id = link.file_id AND file.owner_id = ?3
          )
        RETURNING file_id,
            NOT EXISTS (
                SELECT 1 FROM link other
                WHERE other.file_id = link.file_id AND other.object_id <> link.object_id
            ) AS orphaned
        "#,
    )
    .bind(node)
    .bind(file_id)
    .bind(owner)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(unlinked)
}

/// Remove every link from one node, reporting per blob whether that link was
/// its last reference.
///
/// The node row may already be gone; ownership is checked against the blob.
pub async fn remove_all_links_from(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    node: &NodeId,
) -> Result<Vec<Unlinked>> {
    let unlinked = sqlx::query_as::<_, Unlinked>(
        r#"
        DELETE FROM link
        WHERE link.object_id = ?1
          AND EXISTS (
            SELECT 1 FROM file WHERE file.file_id = link.file_id AND file.owner_id = ?2
          )
        RETURNING file_id,
            NOT EXISTS (
                SELECT 1 FROM link other
                WHERE other.file_id = link.file_id AND other.object_id <> link.object_id
            ) AS orphaned
        "#,
    )
    .bind(node)
    .bind(owner)
    .fetch_all(&mut *conn)
    .await?;
    Ok(unlinked)
}

/// Link `dest` to the blob most recently linked to `source`.
pub async fn copy_newest_link(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    source: &NodeId,
    dest: &NodeId,
) -> Result<u64> {
    let sql = format!(
        r#"
        INSERT INTO link (object_id, file_id, linked_at)
        SELECT ?2, v.file_id, ?4
        FROM file_view v
        WHERE v.object_id = ?1 AND v.owner_id = ?3 AND {}
        ORDER BY v.linked_at DESC, v.uploaded_at DESC, v.file_id DESC
        LIMIT 1
        "#,
        owned_file("?2", "?3")
    );
    let result = sqlx::query(&sql)
        .bind(source)
        .bind(dest)
        .bind(owner)
        .bind(Timestamp::now())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Link `dest` to every blob linked to `source`. No payload is duplicated.
pub async fn copy_all_links(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    source: &NodeId,
    dest: &NodeId,
) -> Result<u64> {
    let sql = format!(
        r#"
        INSERT INTO link (object_id, file_id, linked_at)
        SELECT ?2, v.file_id, ?4
        FROM file_view v
        WHERE v.object_id = ?1 AND v.owner_id = ?3 AND {}
        "#,
        owned_file("?2", "?3")
    );
    let result = sqlx::query(&sql)
        .bind(source)
        .bind(dest)
        .bind(owner)
        .bind(Timestamp::now())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// First page of versions of `node`, newest first.
///
/// The order `(linked_at, uploaded_at, file_id)` descending is total, so
/// [`list_after`] can continue from any returned row.
pub async fn list_newest(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    node: &NodeId,
    limit: u32,
) -> Result<Vec<VersionedFile>> {
    let versions = sqlx::query_as::<_, VersionedFile>(
        r#"
        SELECT object_id, file_id, checksum, size, owner_id, uploaded_at, linked_at
        FROM file_view
        WHERE object_id = ?1 AND owner_id = ?2
        ORDER BY linked_at DESC, uploaded_at DESC, file_id DESC
        LIMIT ?3
        "#,
    )
    .bind(node)
    .bind(owner)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;
    Ok(versions)
}

/// Versions strictly after `last_seen` in [`list_newest`] order, on the same
/// node.
pub async fn list_after(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    last_seen: &VersionedFile,
    limit: u32,
) -> Result<Vec<VersionedFile>> {
    let versions = sqlx::query_as::<_, VersionedFile>(
        r#"
        SELECT object_id, file_id, checksum, size, owner_id, uploaded_at, linked_at
        FROM file_view
        WHERE object_id = ?1 AND owner_id = ?2
          AND (linked_at, uploaded_at, file_id) < (?3, ?4, ?5)
        ORDER BY linked_at DESC, uploaded_at DESC, file_id DESC
        LIMIT ?6
        "#,
    )
    .bind(last_seen.object_id)
    .bind(owner)
    .bind(last_seen.linked_at)
    .bind(last_seen.uploaded_at)
    .bind(last_seen.file_id)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;
    Ok(versions)
}

/// One version of `node`, whether or not it is the newest.
pub async fn find_version(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    node: &NodeId,
    file_id: &BlobId,
) -> Result<Option<VersionedFile>> {
    let version = sqlx::query_as::<_, VersionedFile>(
        r#"
        SELECT object_id, file_id, checksum, size, owner_id, uploaded_at, linked_at
        FROM file_view
        WHERE object_id = ?1 AND file_id = ?2 AND owner_id = ?3
        "#,
    )
    .bind(node)
    .bind(file_id)
    .bind(owner)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(version)
}

pub async fn count_versions(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    node: &NodeId,
) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM file_view WHERE object_id = ?1 AND owner_id = ?2",
    )
    .bind(node)
    .bind(owner)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}
