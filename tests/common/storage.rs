use std::collections::BTreeSet;
use std::sync::Arc;

use controlplane_store::error::Error;
use controlplane_store::model::{Object, Query};
use controlplane_store::resources::ResourceId;
use controlplane_store::store::{DeleteOptions, SaveOptions, StorageClient};
use serde_json::json;

/// Ids used by the query checks, all below one plane.
pub struct Layout {
    pub plane: String,
    pub group1: String,
    pub group2: String,
    pub resource1: String,
    pub resource2: String,
    pub resource3: String,
    pub nested1: String,
}

impl Layout {
    pub fn new(plane_name: &str) -> Self {
        let plane = format!("/planes/radius/{plane_name}");
        let group1 = format!("{plane}/resourceGroups/group1");
        let group2 = format!("{plane}/resourceGroups/group2");
        let resource1 = format!("{group1}/providers/System.Resources/resourceType1/resource1");
        let resource2 = format!("{group2}/providers/System.Resources/resourceType2/resource2");
        let resource3 = format!("{group1}/providers/System.Resources/resourceType2/resource3");
        let nested1 = format!("{resource1}/nested/nested1");
        Self {
            plane,
            group1,
            group2,
            resource1,
            resource2,
            resource3,
            nested1,
        }
    }
}

fn id(s: &str) -> ResourceId {
    ResourceId::parse(s).unwrap()
}

fn object(s: &str, data: serde_json::Value) -> Object {
    Object::new(id(s), data).with_api_version("2023-10-01-preview")
}

fn ids(items: &[Object]) -> BTreeSet<String> {
    items.iter().map(|o| o.id().normalized().to_string()).collect()
}

fn expect<S: AsRef<str>>(expected: &[S]) -> BTreeSet<String> {
    expected.iter().map(|s| s.as_ref().to_lowercase()).collect()
}

pub async fn get_missing_is_not_found(client: Arc<dyn StorageClient>, plane: &str) {
    let layout = Layout::new(plane);
    let err = client.get(&id(&layout.resource1)).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "got {err:?}");
}

pub async fn save_then_get(client: Arc<dyn StorageClient>, plane: &str) {
    let layout = Layout::new(plane);
    let data = json!({ "name": "resource1", "properties": { "value": 1 } });

    let saved = client
        .save(object(&layout.resource1, data.clone()), &SaveOptions::default())
        .await
        .unwrap();
    let token = saved.etag().expect("save assigns a token").to_string();
    assert!(!token.is_empty());

    let fetched = client.get(&id(&layout.resource1)).await.unwrap();
    assert_eq!(fetched.data, data);
    assert_eq!(fetched.etag(), Some(token.as_str()));
    assert_eq!(fetched.metadata.api_version, "2023-10-01-preview");

    // Lookups ignore case but keep the stored casing.
    let shouted = client.get(&id(&layout.resource1.to_uppercase())).await.unwrap();
    assert_eq!(shouted.id().as_str(), layout.resource1);
}

pub async fn save_ignores_client_token(client: Arc<dyn StorageClient>, plane: &str) {
    let layout = Layout::new(plane);
    let mut obj = object(&layout.resource1, json!({ "v": 1 }));
    obj.metadata.etag = Some("made-up".to_string());

    let saved = client.save(obj, &SaveOptions::default()).await.unwrap();
    assert_ne!(saved.etag(), Some("made-up"));
}

pub async fn stale_token_conflicts(client: Arc<dyn StorageClient>, plane: &str) {
    let layout = Layout::new(plane);
    let first = client
        .save(object(&layout.resource1, json!({ "v": 1 })), &SaveOptions::default())
        .await
        .unwrap();
    let first_token = first.etag().unwrap().to_string();

    let second = client
        .save(
            object(&layout.resource1, json!({ "v": 2 })),
            &SaveOptions::if_match(&first_token),
        )
        .await
        .unwrap();
    let second_token = second.etag().unwrap().to_string();
    assert_ne!(first_token, second_token);

    let err = client
        .save(
            object(&layout.resource1, json!({ "v": 3 })),
            &SaveOptions::if_match(&first_token),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConcurrencyConflict), "got {err:?}");

    let stored = client.get(&id(&layout.resource1)).await.unwrap();
    assert_eq!(stored.data, json!({ "v": 2 }));
    assert_eq!(stored.etag(), Some(second_token.as_str()));
}

pub async fn token_on_missing_record_conflicts(client: Arc<dyn StorageClient>, plane: &str) {
    let layout = Layout::new(plane);
    let err = client
        .save(
            object(&layout.resource1, json!({ "v": 1 })),
            &SaveOptions::if_match("any-token"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConcurrencyConflict), "got {err:?}");
    assert!(matches!(
        client.get(&id(&layout.resource1)).await,
        Err(Error::NotFound(_))
    ));
}

pub async fn delete_semantics(client: Arc<dyn StorageClient>, plane: &str) {
    let layout = Layout::new(plane);
    let target = id(&layout.resource1);

    let err = client.delete(&target, &DeleteOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "got {err:?}");

    let err = client
        .delete(&target, &DeleteOptions::if_match("whatever"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConcurrencyConflict), "got {err:?}");

    let saved = client
        .save(object(&layout.resource1, json!({ "v": 1 })), &SaveOptions::default())
        .await
        .unwrap();

    let err = client
        .delete(&target, &DeleteOptions::if_match("not-the-token"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConcurrencyConflict), "got {err:?}");
    assert!(client.get(&target).await.is_ok());

    client
        .delete(&target, &DeleteOptions::if_match(saved.etag().unwrap()))
        .await
        .unwrap();

    let err = client.delete(&target, &DeleteOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "got {err:?}");
    assert!(matches!(client.get(&target).await, Err(Error::NotFound(_))));
}

pub async fn collections_are_rejected(client: Arc<dyn StorageClient>, plane: &str) {
    let layout = Layout::new(plane);
    let collection = id(&format!(
        "{}/providers/System.Resources/resourceType1",
        layout.group1
    ));
    let err = client.get(&collection).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "got {err:?}");

    let err = client
        .save(Object::new(collection, json!({})), &SaveOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "got {err:?}");
}

pub async fn seed(client: &Arc<dyn StorageClient>, layout: &Layout) {
    let entries = [
        (&layout.plane, json!({ "kind": "plane" })),
        (&layout.group1, json!({ "kind": "group" })),
        (&layout.group2, json!({ "kind": "group" })),
        (
            &layout.resource1,
            json!({ "properties": { "application": "app1" } }),
        ),
        (
            &layout.resource2,
            json!({ "properties": { "application": "app1" } }),
        ),
        (
            &layout.resource3,
            json!({ "properties": { "application": "app2" } }),
        ),
        (&layout.nested1, json!({ "properties": { "parent": "resource1" } })),
    ];
    for (key, data) in entries {
        client
            .save(object(key, data), &SaveOptions::default())
            .await
            .unwrap();
    }
}

pub async fn query_resources(client: Arc<dyn StorageClient>, plane: &str) {
    let layout = Layout::new(plane);
    seed(&client, &layout).await;

    // One scope, every routing depth.
    let found = client.query(&Query::resources(id(&layout.group1))).await.unwrap();
    assert_eq!(
        ids(&found),
        expect(&[&layout.resource1, &layout.resource3, &layout.nested1])
    );

    let found = client
        .query(&Query::resources(id(&layout.group1)).resource_type("System.Resources/resourceType1/nested"))
        .await
        .unwrap();
    assert_eq!(ids(&found), expect(&[&layout.nested1]));

    // Nothing lives directly at the plane.
    let found = client.query(&Query::resources(id(&layout.plane))).await.unwrap();
    assert!(found.is_empty());

    let found = client
        .query(&Query::resources(id(&layout.plane)).recursive())
        .await
        .unwrap();
    assert_eq!(
        ids(&found),
        expect(&[
            &layout.resource1,
            &layout.resource2,
            &layout.resource3,
            &layout.nested1
        ])
    );

    let found = client
        .query(
            &Query::resources(id(&layout.plane))
                .recursive()
                .resource_type("system.resources/RESOURCETYPE2"),
        )
        .await
        .unwrap();
    assert_eq!(ids(&found), expect(&[&layout.resource2, &layout.resource3]));

    let found = client
        .query(
            &Query::resources(id(&layout.group1))
                .routing_scope_prefix("System.Resources/resourceType1/resource1"),
        )
        .await
        .unwrap();
    assert_eq!(ids(&found), expect(&[&layout.resource1, &layout.nested1]));
}

pub async fn query_filters(client: Arc<dyn StorageClient>, plane: &str) {
    let layout = Layout::new(plane);
    seed(&client, &layout).await;

    let found = client
        .query(&Query::resources(id(&layout.group1)).filter("properties.application", "app1"))
        .await
        .unwrap();
    assert_eq!(ids(&found), expect(&[&layout.resource1]));

    let found = client
        .query(
            &Query::resources(id(&layout.plane))
                .recursive()
                .filter("properties.application", "app1"),
        )
        .await
        .unwrap();
    assert_eq!(ids(&found), expect(&[&layout.resource1, &layout.resource2]));

    let found = client
        .query(
            &Query::resources(id(&layout.plane))
                .recursive()
                .filter("properties.application", "app1")
                .resource_type("System.Resources/resourceType2"),
        )
        .await
        .unwrap();
    assert_eq!(ids(&found), expect(&[&layout.resource2]));

    let found = client
        .query(&Query::resources(id(&layout.group1)).filter("properties.application", "nope"))
        .await
        .unwrap();
    assert!(found.is_empty());
}

pub async fn query_scopes(client: Arc<dyn StorageClient>, plane: &str) {
    let layout = Layout::new(plane);
    seed(&client, &layout).await;

    let found = client.query(&Query::scopes(id(&layout.plane))).await.unwrap();
    assert_eq!(ids(&found), expect(&[&layout.group1, &layout.group2]));

    let found = client
        .query(&Query::scopes(id(&layout.plane)).resource_type("resourceGroups"))
        .await
        .unwrap();
    assert_eq!(ids(&found), expect(&[&layout.group1, &layout.group2]));

    let found = client
        .query(&Query::scopes(id(&layout.plane)).resource_type("somethingElse"))
        .await
        .unwrap();
    assert!(found.is_empty());

    let err = client
        .query(&Query::scopes(id(&layout.plane)).routing_scope_prefix("System.Resources"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "got {err:?}");
}

pub async fn query_after_delete(client: Arc<dyn StorageClient>, plane: &str) {
    let layout = Layout::new(plane);
    seed(&client, &layout).await;

    client
        .delete(&id(&layout.resource3), &DeleteOptions::default())
        .await
        .unwrap();

    let found = client.query(&Query::resources(id(&layout.group1))).await.unwrap();
    assert_eq!(ids(&found), expect(&[&layout.resource1, &layout.nested1]));
}

/// Writers racing on one token: exactly one wins.
pub async fn concurrent_conditional_saves(client: Arc<dyn StorageClient>, plane: &str) {
    let layout = Layout::new(plane);
    let base = client
        .save(object(&layout.resource1, json!({ "writer": -1 })), &SaveOptions::default())
        .await
        .unwrap();
    let token = base.etag().unwrap().to_string();

    let mut handles = Vec::new();
    for writer in 0..8 {
        let client = Arc::clone(&client);
        let token = token.clone();
        let target = layout.resource1.clone();
        handles.push(tokio::spawn(async move {
            client
                .save(
                    object(&target, json!({ "writer": writer })),
                    &SaveOptions::if_match(token),
                )
                .await
        }));
    }

    let mut wins = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => wins += 1,
            Err(Error::ConcurrencyConflict) => {}
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }
    assert_eq!(wins, 1);
}

/// Rewriting identical data still moves the token, so a second writer
/// holding the old token loses.
pub async fn unchanged_data_gets_a_new_token(client: Arc<dyn StorageClient>, plane: &str) {
    let layout = Layout::new(plane);
    let base = client
        .save(
            Object::new(id(&layout.resource1), json!({ "v": 1 })).with_api_version("v1"),
            &SaveOptions::default(),
        )
        .await
        .unwrap();
    let token = base.etag().unwrap().to_string();

    let first = client
        .save(
            Object::new(id(&layout.resource1), json!({ "v": 1 })).with_api_version("v2"),
            &SaveOptions::if_match(&token),
        )
        .await
        .unwrap();
    assert_ne!(first.etag(), Some(token.as_str()));

    let err = client
        .save(
            Object::new(id(&layout.resource1), json!({ "v": 1 })).with_api_version("v3"),
            &SaveOptions::if_match(&token),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConcurrencyConflict), "got {err:?}");

    let stored = client.get(&id(&layout.resource1)).await.unwrap();
    assert_eq!(stored.metadata.api_version, "v2");
    assert_eq!(stored.etag(), first.etag());

    let err = client
        .delete(&id(&layout.resource1), &DeleteOptions::if_match(&token))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConcurrencyConflict), "got {err:?}");
}
