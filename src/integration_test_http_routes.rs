#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        extract::{Path, Query, State},
        http::{header, Method, Request, StatusCode},
        Json,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{
        asset_store::memory::InMemoryAssetStore,
        data_model::{
            test_objects::tests::{mock_hero_descriptor, TEST_ASSET_ID, TEST_PLACEHOLDER},
            CollectionSource,
            MediaKind,
        },
        http_objects::{CreateCollection, JsonBody, OrganizeAssets, ProxyParams, TransformRequest},
        proxy::IMMUTABLE_CACHE_CONTROL,
        routes::{self, organize, proxy, registry},
        testing::TestService,
        transform::parse_delivery_url,
    };

    async fn register_hero(test_service: &TestService) {
        registry::update_entry(
            Path(TEST_PLACEHOLDER.to_string()),
            State(test_service.service.route_state.clone()),
            JsonBody(mock_hero_descriptor()),
        )
        .await
        .expect("register hero placeholder");
    }

    #[tokio::test]
    async fn test_placeholder_override_wins_over_defaults() {
        let test_service = TestService::new().await.unwrap();
        register_hero(&test_service).await;

        let transform: TransformRequest = serde_json::from_value(json!({
            "publicId": TEST_PLACEHOLDER,
            "transformations": {"width": 600, "sparkle": true},
        }))
        .unwrap();
        let Json(response) = routes::transform_url(
            State(test_service.service.route_state.clone()),
            JsonBody(transform),
        )
        .await
        .unwrap();

        assert_eq!(response.public_id, TEST_ASSET_ID);
        assert_eq!(response.media_type, MediaKind::Image);
        assert_eq!(
            response.url,
            "https://media.example.test/demo-cloud/image/upload/w_600,q_auto,f_auto/hero/main-img"
        );
        let parsed = parse_delivery_url(&response.url).unwrap();
        assert_eq!(parsed.options, response.transformations);

        let persisted =
            std::fs::read_to_string(test_service.temp_dir.path().join("media-registry.json"))
                .unwrap();
        assert!(persisted.contains("hero/main-img"));
    }

    #[tokio::test]
    async fn test_transform_requires_public_id() {
        let test_service = TestService::new().await.unwrap();
        let transform: TransformRequest =
            serde_json::from_value(json!({"publicId": " "})).unwrap();
        let err = routes::transform_url(
            State(test_service.service.route_state.clone()),
            JsonBody(transform),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_registry_routes_resolve_and_delete() {
        let test_service = TestService::new().await.unwrap();
        let state = test_service.service.route_state.clone();
        register_hero(&test_service).await;

        let Json(entries) = registry::list_entries(State(state.clone())).await;
        assert_eq!(entries.entries.len(), 1);

        let Json(resolved) =
            registry::resolve_entry(Path(TEST_PLACEHOLDER.to_string()), State(state.clone())).await;
        assert!(resolved.registered);
        assert!(resolved.url.ends_with("/w_1200,q_auto,f_auto/hero/main-img"));

        let Json(unknown) =
            registry::resolve_entry(Path("promo/intro.webm".to_string()), State(state.clone()))
                .await;
        assert!(!unknown.registered);
        assert_eq!(unknown.descriptor.kind, MediaKind::Video);
        assert!(unknown.url.contains("/video/upload/q_auto,f_mp4/"));

        let Json(removed) =
            registry::delete_entry(Path(TEST_PLACEHOLDER.to_string()), State(state.clone()))
                .await
                .unwrap();
        assert_eq!(removed, mock_hero_descriptor());

        let err = registry::delete_entry(Path(TEST_PLACEHOLDER.to_string()), State(state))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_descriptor_is_a_bad_request() {
        let test_service = TestService::new().await.unwrap();
        let mut descriptor = mock_hero_descriptor();
        descriptor.id = "   ".to_string();
        let err = registry::update_entry(
            Path(TEST_PLACEHOLDER.to_string()),
            State(test_service.service.route_state.clone()),
            JsonBody(descriptor),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_organize_reports_partial_batch() {
        let store = InMemoryAssetStore::new()
            .with_asset("gallery/one", MediaKind::Image)
            .with_asset("gallery/clip.mp4", MediaKind::Video);
        let test_service = TestService::with_store(store).await.unwrap();

        let payload: OrganizeAssets = serde_json::from_value(json!({
            "publicIds": ["gallery/one", "gallery/clip.mp4", "gallery/ghost"],
            "folder": "site/gallery",
            "tags": ["gallery"],
            "addTags": false,
        }))
        .unwrap();
        let Json(response) = organize::organize_assets(
            State(test_service.service.route_state.clone()),
            JsonBody(payload),
        )
        .await
        .unwrap();

        assert!(response.success);
        assert_eq!(response.message, "Organized 2 of 3 assets");
        assert_eq!(response.results.len(), 3);
        let failed: Vec<_> = response.results.iter().filter(|r| !r.success).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].asset_id, "gallery/ghost");

        let clip = test_service.store.asset("gallery/clip.mp4").unwrap();
        assert_eq!(clip.folder.as_deref(), Some("site/gallery"));
        assert!(clip.tags.contains("gallery"));
    }

    #[tokio::test]
    async fn test_organize_with_no_ids_makes_no_remote_calls() {
        let test_service = TestService::new().await.unwrap();
        let payload: OrganizeAssets = serde_json::from_value(json!({
            "publicIds": [],
            "tags": ["hero"],
        }))
        .unwrap();
        let err = organize::organize_assets(
            State(test_service.service.route_state.clone()),
            JsonBody(payload),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(test_service.store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_collection_upsert_from_folder() {
        let store = InMemoryAssetStore::new().with_asset("team/alex", MediaKind::Image);
        let test_service = TestService::with_store(store).await.unwrap();
        let state = test_service.service.route_state.clone();

        let payload: OrganizeAssets = serde_json::from_value(json!({
            "publicIds": ["team/alex"],
            "folder": "site/team",
        }))
        .unwrap();
        organize::organize_assets(State(state.clone()), JsonBody(payload))
            .await
            .unwrap();

        let request = CreateCollection {
            name: "team".to_string(),
            tag: None,
            folder: Some("site/team".to_string()),
        };
        let Json(created) =
            organize::create_collection(State(state.clone()), JsonBody(request.clone()))
                .await
                .unwrap();
        assert!(created.result.created);
        assert_eq!(
            created.result.source,
            CollectionSource::Folder("site/team".to_string())
        );
        assert_eq!(created.result.asset_ids, vec!["team/alex"]);

        let Json(updated) = organize::create_collection(State(state), JsonBody(request))
            .await
            .unwrap();
        assert!(!updated.result.created);
        assert!(updated.message.contains("updated"));
    }

    #[tokio::test]
    async fn test_folder_tree_marks_failed_nodes() {
        let store = InMemoryAssetStore::new()
            .with_folder("a/b")
            .fail_subfolders_of("a/b");
        let test_service = TestService::with_store(store).await.unwrap();

        let Json(tree) = routes::list_folders(State(test_service.service.route_state.clone()))
            .await
            .unwrap();
        let body = serde_json::to_value(&tree).unwrap();
        assert_eq!(body[0]["path"], "a");
        assert_eq!(body[0]["subfolders"][0]["path"], "a/b");
        assert_eq!(body[0]["subfolders"][0]["subfolders"], json!([]));
        assert!(body[0]["subfolders"][0]["error"].is_string());
        assert!(body[0].get("error").is_none());
    }

    #[tokio::test]
    async fn test_tags_are_merged_and_sorted() {
        let store = InMemoryAssetStore::new()
            .with_tagged_asset("hero/main", MediaKind::Image, &["hero", "banner"])
            .with_tagged_asset("promo/intro.mp4", MediaKind::Video, &["promo", "hero"]);
        let test_service = TestService::with_store(store).await.unwrap();

        let Json(tags) = routes::list_tags(State(test_service.service.route_state.clone()))
            .await
            .unwrap();
        assert_eq!(tags.tags, vec!["banner", "hero", "promo"]);
    }

    #[tokio::test]
    async fn test_proxy_serves_with_immutable_cache_headers() {
        let test_service = TestService::new().await.unwrap();
        register_hero(&test_service).await;

        let response = proxy::proxy_media(
            State(test_service.service.route_state.clone()),
            Query(ProxyParams {
                id: Some(TEST_PLACEHOLDER.to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            IMMUTABLE_CACHE_CONTROL
        );
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"\x89PNG");
        assert_eq!(
            test_service.delivery.requested(),
            vec!["https://media.example.test/demo-cloud/image/upload/hero/main-img"]
        );
    }

    #[tokio::test]
    async fn test_proxy_errors_carry_upstream_status() {
        let test_service = TestService::new().await.unwrap();
        let state = test_service.service.route_state.clone();

        let err = proxy::proxy_media(State(state.clone()), Query(ProxyParams { id: None }))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        test_service.delivery.fail_with(404);
        let err = proxy::proxy_media(
            State(state),
            Query(ProxyParams {
                id: Some("missing/asset".to_string()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(err.message().contains("404"));
    }

    async fn send_json(
        test_service: &TestService,
        method: Method,
        uri: &str,
        body: &str,
    ) -> (StatusCode, Value) {
        let app = routes::create_routes(test_service.service.route_state.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_malformed_bodies_render_error_json() {
        let test_service = TestService::new().await.unwrap();

        let (status, body) =
            send_json(&test_service, Method::POST, "/media/organize", r#"{"tags":["x"]}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("publicIds"));

        let (status, body) =
            send_json(&test_service, Method::POST, "/media/transform", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) = send_json(
            &test_service,
            Method::PUT,
            "/media/registry/hero.main",
            r#"{"id":"hero/main-img"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
        assert_eq!(test_service.store.call_count(), 0);
    }
}
