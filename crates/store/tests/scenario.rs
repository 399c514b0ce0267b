//! End to end lifecycle and tenant isolation

mod common;

use bytes::Bytes;
use doctree_store::{DocumentService, ObjectType, OwnerId, StoreError};

#[tokio::test]
async fn test_move_copy_delete_lifecycle() {
    let (service, owner) = common::setup_test_env().await;
    common::mkdir(&service, &owner, "/a").await;
    let created = common::put(&service, &owner, "/a/f", "c0", b"0123456789").await;
    assert_eq!(created.version.size, 10);
    let c0 = created.version.file_id;

    let a = common::node(&service, &owner, "/a").await;
    service
        .move_node(&owner, &a, &common::path("/b"))
        .await
        .unwrap();
    let bf = common::node(&service, &owner, "/b/f").await;
    assert_eq!(bf.object_type, ObjectType::File);
    let listing = service.list(&owner, &common::path("/b")).await.unwrap();
    assert_eq!(listing[0].newest.as_ref().unwrap().checksum, "c0");

    let b = common::node(&service, &owner, "/b").await;
    service
        .copy_node(&owner, &b, &common::path("/c"), true)
        .await
        .unwrap();
    let cf = common::node(&service, &owner, "/c/f").await;
    let page = service.list_versions_first_page(&owner, &cf, 10).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.versions[0].file_id, c0);

    let outcome = service.remove_node(&owner, &b, true).await.unwrap();
    assert_eq!(outcome.removed.len(), 2);
    assert!(outcome.orphaned.is_empty());
    assert!(service.storage().exists(&owner, &c0).await.unwrap());

    let c = common::node(&service, &owner, "/c").await;
    let outcome = service.remove_node(&owner, &c, true).await.unwrap();
    assert_eq!(outcome.orphaned, vec![c0]);
    assert!(!service.storage().exists(&owner, &c0).await.unwrap());
    assert_eq!(common::all_paths(service.database(), &owner).await, vec!["/"]);
}

#[tokio::test]
async fn test_tenants_never_see_each_other() {
    let service = DocumentService::ephemeral().await.unwrap();
    let alice = OwnerId::new();
    let bob = OwnerId::new();
    service.create_root(&alice).await.unwrap();
    service.create_root(&bob).await.unwrap();

    let secret = common::put(&service, &alice, "/secret", "c0", b"alice").await;
    common::put(&service, &bob, "/secret", "c1", b"bob").await;

    let bob_root = service.list(&bob, &common::path("/")).await.unwrap();
    assert_eq!(bob_root.len(), 1);
    assert_eq!(bob_root[0].newest.as_ref().unwrap().checksum, "c1");

    // bob holding alice's node and version gets nowhere
    assert!(matches!(
        service.get_node(&bob, &secret.node.object_id).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        service.get_version_data(&bob, &secret.version).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(service
        .move_node(&bob, &secret.node, &common::path("/stolen"))
        .await
        .is_err());
    assert!(service
        .copy_node(&bob, &secret.node, &common::path("/stolen"), false)
        .await
        .is_err());
    assert!(matches!(
        service.remove_node(&bob, &secret.node, true).await,
        Err(StoreError::DeleteFailure(_))
    ));
    assert!(matches!(
        service
            .remove_version(&bob, &secret.node, &secret.version.file_id)
            .await,
        Err(StoreError::DeleteFailure(_))
    ));
    let data = Bytes::from_static(b"x");
    assert!(service
        .add_version(&bob, &secret.node, common::blob_for("c9", &data), common::single_chunk(data))
        .await
        .is_err());

    // alice's tree is untouched
    assert_eq!(
        common::read_version(&service, &alice, &secret.version).await,
        &b"alice"[..]
    );
    let page = service
        .list_versions_first_page(&alice, &secret.node, 10)
        .await
        .unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn test_file_backed_service_persists() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("db.sqlite");
    let config = doctree_store::ObjectStoreConfig::Local {
        path: temp_dir.path().join("blobs"),
    };
    let owner = OwnerId::new();

    let version = {
        let service = DocumentService::open(&db_path, config.clone()).await.unwrap();
        service.create_root(&owner).await.unwrap();
        common::put(&service, &owner, "/kept.txt", "c0", b"kept").await.version
    };

    let service = DocumentService::open(&db_path, config).await.unwrap();
    let node = common::node(&service, &owner, "/kept.txt").await;
    assert_eq!(node.object_id, version.object_id);
    assert_eq!(
        common::read_version(&service, &owner, &version).await,
        &b"kept"[..]
    );
}
