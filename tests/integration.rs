//! Integration tests for the value model, credential handling, and the
//! HTTP boundary.
//!
//! These tests verify:
//! 1. Value coercion always produces a value of the declared type
//! 2. Bearer credentials classify into session vs API token correctly
//! 3. Store errors map to the documented status codes and error body shape
//! 4. The router rejects unauthenticated requests before touching the store
//! 5. Store-level invariants (uniqueness, toggle idempotence, token
//!    revocation) hold against a live PostgreSQL
//!
//! **Requirements for the store suite:**
//! - PostgreSQL running at DATABASE_URL (e.g. `docker-compose up -d postgres`)
//! - With DATABASE_URL unset, the store tests skip and everything else
//!   runs offline.

mod value_model_tests {
    use featuregate::models::feature::{coerce, default_for, infer_type, ValueType};
    use serde_json::json;

    #[test]
    fn documented_coercions_hold() {
        assert_eq!(coerce(&json!("42"), ValueType::Number), json!(42));
        assert_eq!(coerce(&json!("abc"), ValueType::Number), json!(0));
        assert_eq!(coerce(&json!(1), ValueType::Boolean), json!(true));
        assert_eq!(coerce(&json!(0), ValueType::String), json!("0"));
    }

    #[test]
    fn defaults_match_their_type() {
        for ty in [ValueType::Boolean, ValueType::String, ValueType::Number] {
            assert_eq!(infer_type(&default_for(ty)), ty);
        }
    }

    #[test]
    fn coercion_is_total_over_arbitrary_inputs() {
        let inputs = [
            json!(null),
            json!(true),
            json!(false),
            json!(0),
            json!(-3.5),
            json!(""),
            json!("yes"),
            json!("123"),
            json!([1, 2]),
            json!({"k": "v"}),
        ];
        for ty in [ValueType::Boolean, ValueType::String, ValueType::Number] {
            for v in &inputs {
                let out = coerce(v, ty);
                assert_eq!(infer_type(&out), ty, "coerce({v}, {ty:?}) gave {out}");
            }
        }
    }

    #[test]
    fn value_type_round_trips_through_its_tag() {
        for ty in [ValueType::Boolean, ValueType::String, ValueType::Number] {
            assert_eq!(ValueType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(ValueType::parse("object"), None);
    }
}

mod credential_tests {
    use featuregate::auth::{bearer, Credential, JwtSessionVerifier, SessionVerifier};
    use featuregate::models::token::{generate_secret, hash_secret, verifier_matches};

    #[test]
    fn api_tokens_classify_by_prefix() {
        let (secret, _) = generate_secret();
        assert!(matches!(
            Credential::classify(&secret),
            Credential::ApiToken(_)
        ));
        assert!(matches!(
            Credential::classify("eyJhbGc.eyJzdWIi.sig"),
            Credential::Session(_)
        ));
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(bearer(Some("Bearer fg_secret")), Some("fg_secret"));
        assert_eq!(bearer(Some("bearer fg_secret")), None);
        assert_eq!(bearer(Some("fg_secret")), None);
        assert_eq!(bearer(None), None);
    }

    #[test]
    fn verifier_rejects_near_miss_hashes() {
        let (secret, stored) = generate_secret();
        let mut tampered = secret.clone();
        tampered.pop();
        assert!(verifier_matches(&hash_secret(&secret), &stored));
        assert!(!verifier_matches(&hash_secret(&tampered), &stored));
    }

    #[tokio::test]
    async fn session_verification_without_key_always_fails() {
        let v = JwtSessionVerifier::new(None).unwrap();
        assert!(v.verify("a.b.c").await.is_none());
        assert!(v.verify("").await.is_none());
    }

    #[test]
    fn garbage_pem_is_rejected_at_construction() {
        assert!(JwtSessionVerifier::new(Some("not a pem")).is_err());
    }
}

mod error_mapping_tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use featuregate::errors::AppError;

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn taxonomy_maps_to_documented_status_codes() {
        let cases = [
            (AppError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (AppError::Unauthorized, StatusCode::UNAUTHORIZED),
            (AppError::NotFound("feature"), StatusCode::NOT_FOUND),
            (AppError::Conflict("dup".into()), StatusCode::CONFLICT),
            (AppError::Unavailable, StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[tokio::test]
    async fn error_body_has_structured_shape() {
        let resp = AppError::Conflict("feature 'dark-mode' already exists for 'svc-a'".into())
            .into_response();
        let body = body_json(resp).await;
        assert_eq!(body["error"]["code"], "conflict");
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(
            body["error"]["message"],
            "feature 'dark-mode' already exists for 'svc-a'"
        );
    }

    #[tokio::test]
    async fn internal_errors_never_leak_details() {
        let resp = AppError::Internal(anyhow::anyhow!("pool config /var/secret/db.conf broken"))
            .into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["error"]["message"], "internal server error");
    }

    #[tokio::test]
    async fn unavailable_carries_retry_after() {
        let resp = AppError::Unavailable.into_response();
        assert!(resp.headers().contains_key("retry-after"));
    }
}

mod router_tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use featuregate::auth::JwtSessionVerifier;
    use featuregate::store::postgres::PgStore;
    use featuregate::{api, AppState};

    /// State over a lazy pool: no connection is made unless a handler
    /// actually queries, so auth-rejection paths are testable offline.
    fn test_state() -> Arc<AppState> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/featuregate_test")
            .unwrap();
        Arc::new(AppState {
            db: PgStore::from_pool(pool),
            sessions: Arc::new(JwtSessionVerifier::new(None).unwrap()),
        })
    }

    #[tokio::test]
    async fn missing_credential_is_401() {
        let app = api::app_router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/features")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invalid_session_credential_is_401() {
        let app = api::app_router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/tokens")
                    .header("authorization", "Bearer not-a-valid-session")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn health_needs_no_credential() {
        let app = api::app_router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = api::app_router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}

mod store_tests {
    use featuregate::errors::AppError;
    use featuregate::models::feature::{infer_type, ValueType};
    use featuregate::store::postgres::{FeatureFilter, FeatureUpdate, NewFeature, PgStore};
    use serde_json::json;
    use uuid::Uuid;

    /// Connect and migrate, or skip when no database is configured.
    async fn connect() -> Option<PgStore> {
        let url = match std::env::var("DATABASE_URL") {
            Ok(u) => u,
            Err(_) => {
                eprintln!("skipping store test: DATABASE_URL not set");
                return None;
            }
        };
        let db = PgStore::connect(&url).await.expect("database connection");
        db.migrate().await.expect("migrations");
        Some(db)
    }

    /// Fresh resource id per test so runs never collide.
    fn scratch_resource() -> String {
        format!("svc-{}", Uuid::new_v4())
    }

    fn boolean_flag(name: &str, resource_id: &str) -> NewFeature {
        NewFeature {
            name: name.into(),
            resource_id: resource_id.into(),
            value_type: ValueType::Boolean,
            value: Some(json!(true)),
            active: true,
        }
    }

    #[tokio::test]
    async fn duplicate_name_in_resource_is_conflict() {
        let Some(db) = connect().await else { return };
        let resource = scratch_resource();

        db.create_feature(boolean_flag("dark-mode", &resource))
            .await
            .unwrap();
        let err = db
            .create_feature(boolean_flag("dark-mode", &resource))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)), "got {err:?}");

        // Same name under a different resource is fine.
        db.create_feature(boolean_flag("dark-mode", &scratch_resource()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn renaming_onto_an_existing_name_is_conflict() {
        let Some(db) = connect().await else { return };
        let resource = scratch_resource();

        db.create_feature(boolean_flag("dark-mode", &resource))
            .await
            .unwrap();
        let other = db
            .create_feature(boolean_flag("beta-banner", &resource))
            .await
            .unwrap();

        let err = db
            .update_feature(
                other.id,
                FeatureUpdate {
                    name: "dark-mode".into(),
                    value_type: ValueType::Boolean,
                    value: Some(json!(false)),
                    active: true,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn created_value_round_trips_with_its_declared_type() {
        let Some(db) = connect().await else { return };
        let resource = scratch_resource();

        let cases = [
            (ValueType::Boolean, json!("yes"), json!(true)),
            (ValueType::Number, json!("42"), json!(42)),
            (ValueType::String, json!(7), json!("7")),
        ];
        for (ty, raw, expected) in cases {
            let created = db
                .create_feature(NewFeature {
                    name: format!("flag-{}", ty.as_str()),
                    resource_id: resource.clone(),
                    value_type: ty,
                    value: Some(raw),
                    active: true,
                })
                .await
                .unwrap();

            let got = db.get_feature(created.id).await.unwrap();
            assert_eq!(got.value_type, ty);
            assert_eq!(got.value, expected);
            assert_eq!(infer_type(&got.value), ty);
        }
    }

    #[tokio::test]
    async fn toggle_is_idempotent_and_leaves_value_alone() {
        let Some(db) = connect().await else { return };
        let created = db
            .create_feature(boolean_flag("dark-mode", &scratch_resource()))
            .await
            .unwrap();

        let once = db.set_feature_active(created.id, false).await.unwrap();
        let twice = db.set_feature_active(created.id, false).await.unwrap();

        assert!(!once.active);
        assert!(!twice.active);
        assert_eq!(once.value, twice.value);
        assert_eq!(twice.value, json!(true));
        assert_eq!(twice.name, created.name);
    }

    #[tokio::test]
    async fn delete_is_observable_and_not_idempotent() {
        let Some(db) = connect().await else { return };
        let resource = scratch_resource();
        let created = db
            .create_feature(boolean_flag("dark-mode", &resource))
            .await
            .unwrap();

        let listed = db
            .list_features(FeatureFilter {
                resource_id: Some(resource.clone()),
                resource_id_prefix: None,
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);

        db.delete_feature(created.id).await.unwrap();
        assert!(matches!(
            db.get_feature(created.id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            db.delete_feature(created.id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn deleted_token_secret_stops_verifying() {
        let Some(db) = connect().await else { return };
        let (meta, secret) = db.create_token("ci-bot", "user-1").await.unwrap();

        let verified = db.verify_token(&secret).await.unwrap();
        assert_eq!(verified.token_id, meta.id);
        assert_eq!(verified.created_by_uid, "user-1");

        // Successful use is recorded.
        let listed = db.list_tokens().await.unwrap();
        let ours = listed.iter().find(|t| t.id == meta.id).unwrap();
        assert!(ours.last_used_at.is_some());

        db.delete_token(meta.id).await.unwrap();
        assert!(matches!(
            db.verify_token(&secret).await.unwrap_err(),
            AppError::Unauthorized
        ));
        assert!(matches!(
            db.delete_token(meta.id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }
}
