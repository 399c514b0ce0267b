//! Integration tests for node and version removal and blob release

mod common;

use bytes::Bytes;
use doctree_store::StoreError;

#[tokio::test]
async fn test_rm_leaf_refuses_non_empty_dir() {
    let (service, owner) = common::setup_test_env().await;
    let dir = common::mkdir(&service, &owner, "/d").await;
    common::put(&service, &owner, "/d/f", "c0", b"f").await;
    let before = common::all_paths(service.database(), &owner).await;

    let err = service.remove_node(&owner, &dir, false).await.unwrap_err();
    assert!(matches!(err, StoreError::DeleteFailure(_)));
    assert_eq!(common::all_paths(service.database(), &owner).await, before);
}

#[tokio::test]
async fn test_rm_file_releases_payload() {
    let (service, owner) = common::setup_test_env().await;
    let created = common::put(&service, &owner, "/f", "c0", b"payload").await;

    let outcome = service
        .remove_node(&owner, &created.node, false)
        .await
        .unwrap();
    assert_eq!(outcome.removed, vec![created.node.object_id]);
    assert_eq!(outcome.orphaned, vec![created.version.file_id]);
    assert!(outcome.pending.is_empty());

    assert!(!service
        .storage()
        .exists(&owner, &created.version.file_id)
        .await
        .unwrap());
    assert_eq!(common::count(service.database(), "file").await, 0);
    assert_eq!(common::count(service.database(), "link").await, 0);
    assert_eq!(common::count(service.database(), "pending_blob_delete").await, 0);
}

#[tokio::test]
async fn test_rm_recursive_keeps_shared_blobs() {
    let (service, owner) = common::setup_test_env().await;
    let a = common::mkdir(&service, &owner, "/a").await;
    let shared = common::put(&service, &owner, "/a/shared", "c0", b"s").await;
    let private = common::put(&service, &owner, "/a/private", "c1", b"p").await;
    service
        .copy_node(&owner, &shared.node, &common::path("/kept"), false)
        .await
        .unwrap();

    let outcome = service.remove_node(&owner, &a, true).await.unwrap();
    assert_eq!(outcome.removed.len(), 3);
    assert_eq!(outcome.orphaned, vec![private.version.file_id]);

    assert!(service
        .storage()
        .exists(&owner, &shared.version.file_id)
        .await
        .unwrap());
    assert!(!service
        .storage()
        .exists(&owner, &private.version.file_id)
        .await
        .unwrap());
    assert_eq!(common::count(service.database(), "file").await, 1);
    assert_eq!(common::all_paths(service.database(), &owner).await, vec!["/", "/kept"]);
}

#[tokio::test]
async fn test_rm_version() {
    let (service, owner) = common::setup_test_env().await;
    let created = common::put(&service, &owner, "/f", "c0", b"one").await;
    let data = Bytes::from_static(b"two");
    let second = service
        .add_version(
            &owner,
            &created.node,
            common::blob_for("c1", &data),
            common::single_chunk(data),
        )
        .await
        .unwrap();

    let outcome = service
        .remove_version(&owner, &created.node, &created.version.file_id)
        .await
        .unwrap();
    assert!(outcome.removed.is_empty());
    assert_eq!(outcome.orphaned, vec![created.version.file_id]);

    let page = service
        .list_versions_first_page(&owner, &created.node, 10)
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.versions[0].file_id, second.file_id);

    // the same link cannot be removed twice
    let err = service
        .remove_version(&owner, &created.node, &created.version.file_id)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DeleteFailure(_)));
}

#[tokio::test]
async fn test_rm_version_of_shared_blob_is_not_orphaned() {
    let (service, owner) = common::setup_test_env().await;
    let created = common::put(&service, &owner, "/f", "c0", b"one").await;
    service
        .copy_node(&owner, &created.node, &common::path("/g"), true)
        .await
        .unwrap();

    let outcome = service
        .remove_version(&owner, &created.node, &created.version.file_id)
        .await
        .unwrap();
    assert!(outcome.orphaned.is_empty());
    assert!(service
        .storage()
        .exists(&owner, &created.version.file_id)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_failed_blob_delete_stays_pending_until_swept() {
    let (service, owner, store) = common::setup_flaky_env().await;
    let created = common::put(&service, &owner, "/f", "c0", b"payload").await;

    store.set_fail_deletes(true);
    let outcome = service
        .remove_node(&owner, &created.node, false)
        .await
        .unwrap();
    assert_eq!(outcome.pending, vec![created.version.file_id]);
    // relational state is committed regardless
    assert_eq!(common::count(service.database(), "file").await, 0);
    assert_eq!(common::count(service.database(), "pending_blob_delete").await, 1);
    assert!(service
        .storage()
        .exists(&owner, &created.version.file_id)
        .await
        .unwrap());

    let report = service.sweep_pending_deletes(100).await.unwrap();
    assert_eq!(report.failed, vec![created.version.file_id]);

    store.set_fail_deletes(false);
    let report = service.sweep_pending_deletes(100).await.unwrap();
    assert_eq!(report.deleted, vec![created.version.file_id]);
    assert!(report.failed.is_empty());
    assert_eq!(common::count(service.database(), "pending_blob_delete").await, 0);
    assert!(!service
        .storage()
        .exists(&owner, &created.version.file_id)
        .await
        .unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_unlinks_report_only_their_own_blob() {
    let (service, owner, _dir) = common::setup_file_env().await;

    for round in 0..10 {
        let a = common::put(&service, &owner, &format!("/a{round}"), "ca", b"a").await;
        let b = common::put(&service, &owner, &format!("/b{round}"), "cb", b"b").await;

        let (left, right) = tokio::join!(
            service.remove_version(&owner, &a.node, &a.version.file_id),
            service.remove_version(&owner, &b.node, &b.version.file_id),
        );
        assert_eq!(left.unwrap().orphaned, vec![a.version.file_id]);
        assert_eq!(right.unwrap().orphaned, vec![b.version.file_id]);

        let (left, right) = tokio::join!(
            service.remove_node(&owner, &a.node, false),
            service.remove_node(&owner, &b.node, false),
        );
        let (left, right) = (left.unwrap(), right.unwrap());
        assert_eq!(left.removed, vec![a.node.object_id]);
        assert_eq!(right.removed, vec![b.node.object_id]);
        // the versions were already released above
        assert!(left.orphaned.is_empty());
        assert!(right.orphaned.is_empty());
    }

    // last links removed together with their nodes
    let mut created = Vec::new();
    for i in 0..4 {
        created.push(common::put(&service, &owner, &format!("/n{i}"), "cn", b"n").await);
    }
    let tasks: Vec<_> = created
        .iter()
        .map(|c| {
            let (service, node) = (service.clone(), c.node.clone());
            tokio::spawn(async move { service.remove_node(&owner, &node, false).await })
        })
        .collect();
    for (task, c) in tasks.into_iter().zip(&created) {
        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome.orphaned, vec![c.version.file_id]);
        assert!(outcome.pending.is_empty());
    }
    assert_eq!(common::count(service.database(), "file").await, 0);
    assert_eq!(common::count(service.database(), "pending_blob_delete").await, 0);
}
