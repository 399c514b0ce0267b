//! Ledger of orphaned payloads awaiting deletion from the blob store.
//!
//! Rows are queued in the transaction that orphaned the blob and cleared only
//! once the object store confirms the delete.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};

use crate::error::Result;
use crate::types::{BlobId, OwnerId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PendingDelete {
    pub owner_id: OwnerId,
    pub file_id: BlobId,
    pub queued_at: Timestamp,
}

pub async fn enqueue(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    file_ids: &[BlobId],
) -> Result<()> {
    let now = Timestamp::now();
    for file_id in file_ids {
        sqlx::query(
            r#"
            INSERT INTO pending_blob_delete (owner_id, file_id, queued_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(owner)
        .bind(file_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn clear(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    file_ids: &[BlobId],
) -> Result<u64> {
    let mut cleared = 0;
    for file_id in file_ids {
        let result =
            sqlx::query("DELETE FROM pending_blob_delete WHERE owner_id = ?1 AND file_id = ?2")
                .bind(owner)
                .bind(file_id)
                .execute(&mut *conn)
                .await?;
        cleared += result.rows_affected();
    }
    Ok(cleared)
}

/// Oldest entries first, across all owners.
pub async fn list_pending(conn: &mut SqliteConnection, limit: u32) -> Result<Vec<PendingDelete>> {
    let pending = sqlx::query_as::<_, PendingDelete>(
        r#"
        SELECT owner_id, file_id, queued_at
        FROM pending_blob_delete
        ORDER BY queued_at, owner_id, file_id
        LIMIT ?1
        "#,
    )
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;
    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::testing;

    #[tokio::test]
    async fn test_enqueue_is_idempotent_and_clear_is_owner_scoped() {
        let db = testing::db().await;
        let alice = OwnerId::new();
        let bob = OwnerId::new();
        let a = BlobId::new();
        let b = BlobId::new();

        let mut conn = db.acquire().await.unwrap();
        enqueue(&mut conn, &alice, &[a, b]).await.unwrap();
        enqueue(&mut conn, &alice, &[a]).await.unwrap();
        assert_eq!(list_pending(&mut conn, 10).await.unwrap().len(), 2);

        assert_eq!(clear(&mut conn, &bob, &[a]).await.unwrap(), 0);
        assert_eq!(clear(&mut conn, &alice, &[a]).await.unwrap(), 1);

        let left = list_pending(&mut conn, 10).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].owner_id, alice);
        assert_eq!(left[0].file_id, b);
    }

    #[tokio::test]
    async fn test_list_pending_respects_limit() {
        let db = testing::db().await;
        let owner = OwnerId::new();
        let ids: Vec<_> = (0..5).map(|_| BlobId::new()).collect();

        let mut conn = db.acquire().await.unwrap();
        enqueue(&mut conn, &owner, &ids).await.unwrap();
        assert_eq!(list_pending(&mut conn, 3).await.unwrap().len(), 3);
    }
}
