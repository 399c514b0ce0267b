//! Path tree maintenance.
//!
//! Every statement is scoped by owner and carries its own type and parent
//! guards in the `WHERE` clause, so a node whose claimed type does not match
//! the stored one affects zero rows instead of raising.

use serde::Serialize;
use sqlx::SqliteConnection;

use crate::database::ancestor_of;
use crate::database::models::{CopiedNode, TreeNode};
use crate::error::{Result, StoreError};
use crate::types::{NodeId, ObjectType, OwnerId, Timestamp, TreePath};

const CONTAINER_AT_PATH: &str = "EXISTS (
    SELECT 1 FROM tree parent
    WHERE parent.owner_id = ?owner AND parent.path = ?parent
      AND parent.object_type IN ('ROOT', 'DIR')
)";

/// Guard that the parent of a destination exists and may hold children.
fn container_at(owner: &str, parent: &str) -> String {
    CONTAINER_AT_PATH
        .replace("?owner", owner)
        .replace("?parent", parent)
}

/// Insert one node, returning it with its generated identity.
///
/// Fails with [`StoreError::InsertFailure`] when zero rows are inserted: the
/// path is taken, the parent is missing or is a file, or a ROOT is requested
/// anywhere but the empty path.
pub async fn create(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    path: &TreePath,
    object_type: ObjectType,
) -> Result<TreeNode> {
    let parent = path.parent();
    let sql = format!(
        r#"
        INSERT INTO tree (object_id, object_type, path, owner_id, created_at)
        SELECT ?1, ?2, ?3, ?4, ?5
        WHERE (?2 = 'ROOT' AND ?3 = '')
           OR (?2 <> 'ROOT' AND {})
        ON CONFLICT DO NOTHING
        RETURNING object_id, object_type, path, owner_id, created_at
        "#,
        container_at("?4", "?6")
    );
    sqlx::query_as::<_, TreeNode>(&sql)
        .bind(NodeId::new())
        .bind(object_type)
        .bind(path)
        .bind(owner)
        .bind(Timestamp::now())
        .bind(parent)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(StoreError::InsertFailure("tree"))
}

pub async fn find_by_path(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    path: &TreePath,
) -> Result<Option<TreeNode>> {
    let node = sqlx::query_as::<_, TreeNode>(
        r#"
        SELECT object_id, object_type, path, owner_id, created_at
        FROM tree
        WHERE owner_id = ?1 AND path = ?2
        "#,
    )
    .bind(owner)
    .bind(path)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(node)
}

pub async fn find_by_id(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    id: &NodeId,
) -> Result<Option<TreeNode>> {
    let node = sqlx::query_as::<_, TreeNode>(
        r#"
        SELECT object_id, object_type, path, owner_id, created_at
        FROM tree
        WHERE owner_id = ?1 AND object_id = ?2
        "#,
    )
    .bind(owner)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(node)
}

/// True only if a node with this id, type and owner exists.
pub async fn is_type(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    id: &NodeId,
    expected: ObjectType,
) -> Result<bool> {
    let (found,): (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM tree
            WHERE object_id = ?1 AND owner_id = ?2 AND object_type = ?3
        )
        "#,
    )
    .bind(id)
    .bind(owner)
    .bind(expected)
    .fetch_one(&mut *conn)
    .await?;
    Ok(found)
}

/// Rewrite the path of a single FILE. `None` when `node` is not a FILE.
pub async fn move_file(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    node: &TreeNode,
    new_path: &TreePath,
) -> Result<Option<u64>> {
    if node.object_type != ObjectType::File {
        return Ok(None);
    }
    let Some(parent) = new_path.parent() else {
        return Ok(Some(0));
    };

    // OR IGNORE turns a taken destination into zero affected rows
    let sql = format!(
        r#"
        UPDATE OR IGNORE tree SET path = ?1
        WHERE object_id = ?2 AND owner_id = ?3 AND object_type = 'FILE' AND {}
        "#,
        container_at("?3", "?4")
    );
    let result = sqlx::query(&sql)
        .bind(new_path)
        .bind(node.object_id)
        .bind(owner)
        .bind(parent)
        .execute(&mut *conn)
        .await?;
    Ok(Some(result.rows_affected()))
}

/// Move a DIR and its whole subtree in one statement. `None` when `node` is
/// not a DIR.
///
/// Every node whose path has the directory as an ancestor keeps its suffix
/// below the directory and gets `new_path` as its new prefix. The destination
/// must not lie inside the subtree and its parent must be a ROOT or DIR.
pub async fn move_dir(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    node: &TreeNode,
    new_path: &TreePath,
) -> Result<Option<u64>> {
    if node.object_type != ObjectType::Dir {
        return Ok(None);
    }
    let Some(parent) = new_path.parent() else {
        return Ok(Some(0));
    };

    // src is materialized before the first row changes, so the suffix is
    // always cut from the pre-move path
    let sql = format!(
        r#"
        WITH src AS MATERIALIZED (
            SELECT path FROM tree
            WHERE object_id = ?2 AND owner_id = ?3 AND object_type = 'DIR'
        )
        UPDATE tree
        SET path = CASE
            WHEN tree.path = (SELECT path FROM src) THEN ?1
            ELSE ?1 || substr(tree.path, length((SELECT path FROM src)) + 1)
        END
        WHERE tree.owner_id = ?3
          AND EXISTS (SELECT 1 FROM src WHERE {})
          AND NOT EXISTS (SELECT 1 FROM src WHERE {})
          AND {}
        "#,
        ancestor_of("src.path", "tree.path"),
        ancestor_of("src.path", "?1"),
        container_at("?3", "?4"),
    );
    let result = sqlx::query(&sql)
        .bind(new_path)
        .bind(node.object_id)
        .bind(owner)
        .bind(parent)
        .execute(&mut *conn)
        .await;

    match result {
        Ok(done) => Ok(Some(done.rows_affected())),
        // the statement is rolled back as a whole, nothing moved
        Err(e) if StoreError::is_unique_violation(&e) => Ok(Some(0)),
        Err(e) => Err(e.into()),
    }
}

/// Copy a single FILE node to `dest`. `None` when `node` is not a FILE or
/// nothing was inserted.
pub async fn copy_file(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    node: &TreeNode,
    dest: &TreePath,
) -> Result<Option<CopiedNode>> {
    if node.object_type != ObjectType::File {
        return Ok(None);
    }
    let Some(parent) = dest.parent() else {
        return Ok(None);
    };

    let sql = format!(
        r#"
        INSERT INTO tree (object_id, object_type, path, owner_id, created_at)
        SELECT ?1, object_type, ?2, owner_id, ?3
        FROM tree
        WHERE object_id = ?4 AND owner_id = ?5 AND object_type = 'FILE' AND {}
        ON CONFLICT DO NOTHING
        RETURNING object_id
        "#,
        container_at("?5", "?6")
    );
    let inserted: Option<(NodeId,)> = sqlx::query_as(&sql)
        .bind(NodeId::new())
        .bind(dest)
        .bind(Timestamp::now())
        .bind(node.object_id)
        .bind(owner)
        .bind(parent)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(inserted.map(|(destination_id,)| CopiedNode {
        source_id: node.object_id,
        destination_id,
        object_type: ObjectType::File,
    }))
}

#[derive(Serialize)]
struct CopyRow<'a> {
    id: NodeId,
    #[serde(rename = "type")]
    object_type: ObjectType,
    path: &'a str,
}

/// Copy a DIR with its whole subtree under `dest`, giving every copy a new
/// identity and creation time. Returns one pair per copied node, including
/// the root of the copy. Empty when `node` is not an owned DIR, when `dest`
/// lies inside the subtree, or when any destination path is taken.
pub async fn copy_dir(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    node: &TreeNode,
    dest: &TreePath,
) -> Result<Vec<CopiedNode>> {
    if node.object_type != ObjectType::Dir {
        return Ok(Vec::new());
    }
    let Some(parent) = dest.parent() else {
        return Ok(Vec::new());
    };

    let sql = format!(
        r#"
        SELECT d.object_id, d.object_type, d.path
        FROM tree d, tree s
        WHERE s.object_id = ?1 AND s.owner_id = ?2 AND s.object_type = 'DIR'
          AND d.owner_id = ?2 AND {}
        ORDER BY d.path
        "#,
        ancestor_of("s.path", "d.path")
    );
    let sources: Vec<(NodeId, ObjectType, TreePath)> = sqlx::query_as(&sql)
        .bind(node.object_id)
        .bind(owner)
        .fetch_all(&mut *conn)
        .await?;

    let Some(source_path) = sources
        .iter()
        .find(|(id, _, _)| *id == node.object_id)
        .map(|(_, _, path)| path.clone())
    else {
        return Ok(Vec::new());
    };
    if source_path.is_ancestor_of(dest) {
        return Ok(Vec::new());
    }

    let mut copies = Vec::with_capacity(sources.len());
    let mut targets = Vec::with_capacity(sources.len());
    for (source_id, object_type, path) in &sources {
        let Some(target) = path.rebase(&source_path, dest) else {
            continue;
        };
        copies.push(CopiedNode {
            source_id: *source_id,
            destination_id: NodeId::new(),
            object_type: *object_type,
        });
        targets.push(target);
    }
    let rows: Vec<CopyRow<'_>> = copies
        .iter()
        .zip(&targets)
        .map(|(copy, target)| CopyRow {
            id: copy.destination_id,
            object_type: copy.object_type,
            path: target.as_encoded(),
        })
        .collect();
    let payload = serde_json::to_string(&rows)?;

    let sql = format!(
        r#"
        INSERT INTO tree (object_id, object_type, path, owner_id, created_at)
        SELECT json_extract(value, '$.id'), json_extract(value, '$.type'),
               json_extract(value, '$.path'), ?2, ?3
        FROM json_each(?1)
        WHERE {}
        "#,
        container_at("?2", "?4")
    );
    let result = sqlx::query(&sql)
        .bind(payload)
        .bind(owner)
        .bind(Timestamp::now())
        .bind(parent)
        .execute(&mut *conn)
        .await;

    match result {
        Ok(done) if done.rows_affected() == copies.len() as u64 => Ok(copies),
        Ok(_) => Ok(Vec::new()),
        Err(e) if StoreError::is_unique_violation(&e) => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Delete `node` only if it has no descendants.
///
/// The guard query counts matches of the inclusive subtree capped at two: 0 means
/// nothing to delete, 1 means exactly the node itself, 2 means it has at
/// least one child. Returns the id when deleted. ROOT nodes are never
/// deleted.
pub async fn delete_leaf(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    node: &TreeNode,
) -> Result<Option<NodeId>> {
    let sql = format!(
        r#"
        DELETE FROM tree
        WHERE object_id = ?1 AND owner_id = ?2 AND object_type <> 'ROOT'
          AND 1 = (
            SELECT COUNT(*) FROM (
                SELECT 1 FROM tree d, tree s
                WHERE s.object_id = ?1 AND s.owner_id = ?2 AND s.object_type <> 'ROOT'
                  AND d.owner_id = ?2 AND {}
                LIMIT 2
            )
          )
        RETURNING object_id
        "#,
        ancestor_of("s.path", "d.path")
    );
    let deleted: Option<(NodeId,)> = sqlx::query_as(&sql)
        .bind(node.object_id)
        .bind(owner)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(deleted.map(|(id,)| id))
}

/// Delete `node` and every descendant, returning all removed ids.
pub async fn delete_subtree(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    node: &TreeNode,
) -> Result<Vec<NodeId>> {
    let sql = format!(
        r#"
        DELETE FROM tree
        WHERE owner_id = ?2 AND object_id IN (
            SELECT d.object_id FROM tree d, tree s
            WHERE s.object_id = ?1 AND s.owner_id = ?2 AND s.object_type <> 'ROOT'
              AND d.owner_id = ?2 AND {}
        )
        RETURNING object_id
        "#,
        ancestor_of("s.path", "d.path")
    );
    let deleted: Vec<(NodeId,)> = sqlx::query_as(&sql)
        .bind(node.object_id)
        .bind(owner)
        .fetch_all(&mut *conn)
        .await?;
    Ok(deleted.into_iter().map(|(id,)| id).collect())
}

/// Direct children of a ROOT or DIR, ordered by path. The parent itself is
/// not included.
pub async fn list_children(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    node: &TreeNode,
) -> Result<Vec<TreeNode>> {
    let sql = format!(
        r#"
        SELECT c.object_id, c.object_type, c.path, c.owner_id, c.created_at
        FROM tree c, tree p
        WHERE p.object_id = ?1 AND p.owner_id = ?2 AND p.object_type IN ('ROOT', 'DIR')
          AND c.owner_id = ?2 AND c.object_id <> p.object_id
          AND {}
          AND instr(
                CASE WHEN p.path = '' THEN c.path
                     ELSE substr(c.path, length(p.path) + 2) END,
                '.') = 0
        ORDER BY c.path
        "#,
        ancestor_of("p.path", "c.path")
    );
    let children = sqlx::query_as::<_, TreeNode>(&sql)
        .bind(node.object_id)
        .bind(owner)
        .fetch_all(&mut *conn)
        .await?;
    Ok(children)
}
