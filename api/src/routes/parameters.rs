use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::nested::Nested;
use crate::pagination::{Page, PaginateOptions, PaginateQuery};
use crate::types::{Parameter, ParameterRequest};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ItemPath {
    pub id: String,
}

/// GET /api/{parent_type}/:parent_id/parameters
///
/// Lists the parent's parameters, paginated by `page` / `per_page`.
pub async fn index(
    State(state): State<AppState>,
    nested: Nested,
    query: Result<Query<PaginateQuery>, QueryRejection>,
) -> Result<Json<Page<Parameter>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let options = PaginateOptions::from_query(&query, &state.pagination);
    let collection = nested.collection();

    let total = collection.count(&state.store)?;
    let results = collection.page(&state.store, options.per_page, options.offset())?;

    Ok(Json(Page::new(results, total, options)))
}

/// GET /api/{parent_type}/:parent_id/parameters/:id
pub async fn show(
    State(state): State<AppState>,
    nested: Nested,
    Path(path): Path<ItemPath>,
) -> Result<Json<Parameter>, ApiError> {
    let parameter = find_parameter(&state, &nested, &path.id)?;
    Ok(Json(parameter))
}

/// POST /api/{parent_type}/:parent_id/parameters
///
/// Creates a parameter in the parent's collection. Validation failures are
/// reported with 422 and nothing is stored.
pub async fn create(
    State(state): State<AppState>,
    nested: Nested,
    payload: Result<Json<ParameterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Parameter>), ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    match nested.collection().create(&state.store, &req.parameter) {
        Ok(parameter) => {
            info!(
                "Created parameter '{}' (id={}) on {}",
                parameter.name,
                parameter.id,
                nested.describe()
            );
            Ok((StatusCode::CREATED, Json(parameter)))
        }
        Err(e) => {
            warn!("Failed to create parameter on {}: {}", nested.describe(), e);
            Err(e.into())
        }
    }
}

/// PUT /api/{parent_type}/:parent_id/parameters/:id
///
/// Applies only the supplied attributes; the owning parent never changes.
pub async fn update(
    State(state): State<AppState>,
    nested: Nested,
    Path(path): Path<ItemPath>,
    payload: Result<Json<ParameterRequest>, JsonRejection>,
) -> Result<Json<Parameter>, ApiError> {
    let current = find_parameter(&state, &nested, &path.id)?;
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    match nested
        .collection()
        .update(&state.store, current.id, &req.parameter)
    {
        Ok(parameter) => {
            info!(
                "Updated parameter '{}' (id={}) on {}",
                parameter.name,
                parameter.id,
                nested.describe()
            );
            Ok(Json(parameter))
        }
        Err(e) => {
            warn!(
                "Failed to update parameter id={} on {}: {}",
                current.id,
                nested.describe(),
                e
            );
            Err(e.into())
        }
    }
}

/// DELETE /api/{parent_type}/:parent_id/parameters/:id
///
/// Returns the deleted parameter.
pub async fn destroy(
    State(state): State<AppState>,
    nested: Nested,
    Path(path): Path<ItemPath>,
) -> Result<Json<Parameter>, ApiError> {
    let parameter = find_parameter(&state, &nested, &path.id)?;

    if !nested.collection().destroy(&state.store, parameter.id)? {
        // Removed by a concurrent request between lookup and delete
        return Err(not_found(&path.id));
    }

    info!(
        "Deleted parameter '{}' (id={}) from {}",
        parameter.name,
        parameter.id,
        nested.describe()
    );
    Ok(Json(parameter))
}

/// DELETE /api/{parent_type}/:parent_id/parameters
///
/// Deletes every parameter of the parent and returns them.
pub async fn reset(
    State(state): State<AppState>,
    nested: Nested,
) -> Result<Json<Vec<Parameter>>, ApiError> {
    let removed = nested.collection().destroy_all(&state.store)?;
    info!(
        "Reset {} parameter(s) on {}",
        removed.len(),
        nested.describe()
    );
    Ok(Json(removed))
}

fn find_parameter(state: &AppState, nested: &Nested, id: &str) -> Result<Parameter, ApiError> {
    match nested.collection().find(&state.store, id)? {
        Some(parameter) => Ok(parameter),
        None => {
            warn!("Parameter '{}' not found on {}", id, nested.describe());
            Err(not_found(id))
        }
    }
}

fn not_found(id: &str) -> ApiError {
    ApiError::NotFound(format!("Resource parameter not found by id '{id}'"))
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use serde_json::{json, Value};

    use crate::db::ParameterStore;
    use crate::pagination::PaginationSettings;
    use crate::routes::router;
    use crate::types::{ParameterAttrs, ParameterKind, ParentKind, ParentRecord};
    use crate::AppState;

    struct TestApp {
        base: String,
        store: ParameterStore,
        http: reqwest::Client,
    }

    impl TestApp {
        async fn spawn() -> Self {
            let store = ParameterStore::open_in_memory().unwrap();
            let state = AppState {
                store: store.clone(),
                pagination: PaginationSettings {
                    default_per_page: 20,
                    max_per_page: 50,
                },
            };

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, router(state)).await.unwrap();
            });

            Self {
                base: format!("http://{addr}/api"),
                store,
                http: reqwest::Client::new(),
            }
        }

        fn parent(&self, kind: ParentKind, name: &str) -> ParentRecord {
            self.store.insert_parent(kind, name).unwrap()
        }

        fn seed(&self, kind: ParameterKind, owner: i64, name: &str, value: &str) -> i64 {
            self.store
                .create_parameter(
                    kind,
                    owner,
                    &ParameterAttrs {
                        name: Some(name.to_string()),
                        value: Some(value.to_string()),
                    },
                )
                .unwrap()
                .id
        }

        fn url(&self, path: &str) -> String {
            format!("{}{}", self.base, path)
        }

        async fn get(&self, path: &str) -> (StatusCode, Value) {
            let resp = self.http.get(self.url(path)).send().await.unwrap();
            (resp.status(), resp.json().await.unwrap())
        }

        async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
            let resp = self.http.post(self.url(path)).json(&body).send().await.unwrap();
            (resp.status(), resp.json().await.unwrap())
        }

        async fn put(&self, path: &str, body: Value) -> (StatusCode, Value) {
            let resp = self.http.put(self.url(path)).json(&body).send().await.unwrap();
            (resp.status(), resp.json().await.unwrap())
        }

        async fn delete(&self, path: &str) -> (StatusCode, Value) {
            let resp = self.http.delete(self.url(path)).send().await.unwrap();
            (resp.status(), resp.json().await.unwrap())
        }
    }

    fn names(results: &Value) -> Vec<String> {
        results
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::spawn().await;
        let (status, body) = app.get("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], "ok");
        assert_eq!(
            body["resources"],
            json!(["hosts", "hostgroups", "domains", "operatingsystems"])
        );
    }

    #[tokio::test]
    async fn test_index_is_scoped_per_parent_for_every_type() {
        let app = TestApp::spawn().await;

        let cases = [
            (ParentKind::Host, ParameterKind::Host),
            (ParentKind::Hostgroup, ParameterKind::Group),
            (ParentKind::Domain, ParameterKind::Domain),
            (ParentKind::Operatingsystem, ParameterKind::Os),
        ];

        for (parent_kind, parameter_kind) in cases {
            let mine = app.parent(parent_kind, "mine");
            let other = app.parent(parent_kind, "other");
            app.seed(parameter_kind, mine.id, "b", "2");
            app.seed(parameter_kind, mine.id, "a", "1");
            app.seed(parameter_kind, other.id, "z", "9");

            let path = format!("/{}/{}/parameters", parent_kind.path_segment(), mine.id);
            let (status, body) = app.get(&path).await;
            assert_eq!(status, StatusCode::OK, "{parent_kind}");
            assert_eq!(body["total"], 2);
            assert_eq!(names(&body["results"]), vec!["a", "b"], "{parent_kind}");
        }
    }

    #[tokio::test]
    async fn test_index_paginates() {
        let app = TestApp::spawn().await;
        let host = app.parent(ParentKind::Host, "web01");
        for name in ["a", "b", "c", "d", "e"] {
            app.seed(ParameterKind::Host, host.id, name, "x");
        }

        let (_, body) = app
            .get(&format!("/hosts/{}/parameters?page=2&per_page=2", host.id))
            .await;
        assert_eq!(body["total"], 5);
        assert_eq!(body["subtotal"], 5);
        assert_eq!(body["page"], 2);
        assert_eq!(body["per_page"], 2);
        assert_eq!(names(&body["results"]), vec!["c", "d"]);

        // Oversized pages are capped at the configured maximum
        let (_, body) = app
            .get(&format!("/hosts/{}/parameters?per_page=500", host.id))
            .await;
        assert_eq!(body["per_page"], 50);
        assert_eq!(body["results"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_index_rejects_malformed_query() {
        let app = TestApp::spawn().await;
        let host = app.parent(ParentKind::Host, "web01");

        let (status, body) = app
            .get(&format!("/hosts/{}/parameters?page=1&page=2", host.id))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], "bad_request");
        assert!(body["error"]["message"].as_str().unwrap().contains("page"));
    }

    #[tokio::test]
    async fn test_show_by_id_or_name() {
        let app = TestApp::spawn().await;
        let host = app.parent(ParentKind::Host, "web01");
        let id = app.seed(ParameterKind::Host, host.id, "environment", "production");

        let (status, body) = app.get(&format!("/hosts/{}/parameters/{}", host.id, id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "environment");
        assert_eq!(body["value"], "production");

        let (status, body) = app
            .get(&format!("/hosts/{}/parameters/environment", host.id))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], id);

        let (status, body) = app.get(&format!("/hosts/{}/parameters/5", host.id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_zero_id_resolves_by_name_only() {
        let app = TestApp::spawn().await;
        let host = app.parent(ParentKind::Host, "web01");

        let (status, _) = app.get(&format!("/hosts/{}/parameters/0", host.id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        app.seed(ParameterKind::Host, host.id, "0", "zero");
        let (status, body) = app.get(&format!("/hosts/{}/parameters/0", host.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["value"], "zero");
    }

    #[tokio::test]
    async fn test_parent_resolution() {
        let app = TestApp::spawn().await;
        let domain = app.parent(ParentKind::Domain, "example.com");
        app.seed(ParameterKind::Domain, domain.id, "dns", "10.0.0.1");

        let (status, body) = app.get("/domains/example.com/parameters").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);

        let (status, body) = app.get("/domains/missing.org/parameters").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            body["error"]["message"],
            "Resource domain not found by id 'missing.org'"
        );

        let (status, _) = app.get(&format!("/subnets/{}/parameters", domain.id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_scoped_to_parent() {
        let app = TestApp::spawn().await;
        let web = app.parent(ParentKind::Host, "web01");
        let db = app.parent(ParentKind::Host, "db01");
        let body = json!({ "parameter": { "name": "env", "value": "prod" } });

        let (status, created) = app
            .post(&format!("/hosts/{}/parameters", web.id), body.clone())
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["name"], "env");
        assert_eq!(created["value"], "prod");
        assert!(created["id"].as_i64().unwrap() > 0);

        // Same name under another host does not collide
        let (status, _) = app
            .post(&format!("/hosts/{}/parameters", db.id), body.clone())
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, err) = app
            .post(&format!("/hosts/{}/parameters", web.id), body)
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err["error"]["kind"], "validation_failed");
        assert_eq!(err["error"]["errors"]["name"][0], "has already been taken");

        assert_eq!(app.store.count_parameters(ParameterKind::Host, web.id).unwrap(), 1);
        assert_eq!(app.store.count_parameters(ParameterKind::Host, db.id).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_validation_failure_persists_nothing() {
        let app = TestApp::spawn().await;
        let os = app.parent(ParentKind::Operatingsystem, "Debian");

        let (status, err) = app
            .post(
                &format!("/operatingsystems/{}/parameters", os.id),
                json!({ "parameter": { "value": "x" } }),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err["error"]["full_messages"][0], "Name can't be blank");

        let (status, err) = app
            .post(
                &format!("/operatingsystems/{}/parameters", os.id),
                json!({ "parameter": { "name": "has space", "value": "x" } }),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err["error"]["errors"]["name"][0], "can't contain white spaces");

        assert_eq!(app.store.count_parameters(ParameterKind::Os, os.id).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_rejects_malformed_body() {
        let app = TestApp::spawn().await;
        let host = app.parent(ParentKind::Host, "web01");

        let (status, err) = app
            .post(
                &format!("/hosts/{}/parameters", host.id),
                json!({ "name": "env", "value": "prod" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"]["kind"], "bad_request");
    }

    #[tokio::test]
    async fn test_update_changes_only_supplied_fields() {
        let app = TestApp::spawn().await;
        let host = app.parent(ParentKind::Host, "web01");
        let id = app.seed(ParameterKind::Host, host.id, "env", "prod");

        let (status, body) = app
            .put(
                &format!("/hosts/{}/parameters/env", host.id),
                json!({ "parameter": { "value": "staging" } }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], id);
        assert_eq!(body["name"], "env");
        assert_eq!(body["value"], "staging");

        let stored = app
            .store
            .find_parameter_by_id(ParameterKind::Host, host.id, id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.value, "staging");
    }

    #[tokio::test]
    async fn test_invalid_update_keeps_prior_value() {
        let app = TestApp::spawn().await;
        let host = app.parent(ParentKind::Host, "web01");
        let id = app.seed(ParameterKind::Host, host.id, "env", "prod");

        let (status, err) = app
            .put(
                &format!("/hosts/{}/parameters/{}", host.id, id),
                json!({ "parameter": { "value": "" } }),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err["error"]["errors"]["value"][0], "can't be blank");

        let (_, body) = app.get(&format!("/hosts/{}/parameters/{}", host.id, id)).await;
        assert_eq!(body["value"], "prod");
    }

    #[tokio::test]
    async fn test_update_missing_parameter() {
        let app = TestApp::spawn().await;
        let host = app.parent(ParentKind::Host, "web01");

        let (status, _) = app
            .put(
                &format!("/hosts/{}/parameters/nope", host.id),
                json!({ "parameter": { "value": "x" } }),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_destroy() {
        let app = TestApp::spawn().await;
        let domain = app.parent(ParentKind::Domain, "example.com");
        let id = app.seed(ParameterKind::Domain, domain.id, "dns", "10.0.0.1");
        app.seed(ParameterKind::Domain, domain.id, "ntp", "10.0.0.2");

        let (status, body) = app
            .delete(&format!("/domains/{}/parameters/dns", domain.id))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], id);

        let (status, _) = app
            .delete(&format!("/domains/{}/parameters/{}", domain.id, id))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        assert_eq!(
            app.store.count_parameters(ParameterKind::Domain, domain.id).unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_reset_only_touches_one_parent() {
        let app = TestApp::spawn().await;
        let web = app.parent(ParentKind::Host, "web01");
        let db = app.parent(ParentKind::Host, "db01");
        for name in ["a", "b", "c"] {
            app.seed(ParameterKind::Host, web.id, name, "1");
        }
        app.seed(ParameterKind::Host, db.id, "a", "1");

        let (status, body) = app.delete(&format!("/hosts/{}/parameters", web.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(names(&body), vec!["a", "b", "c"]);

        let (_, body) = app.get(&format!("/hosts/{}/parameters", web.id)).await;
        assert_eq!(body["total"], 0);
        let (_, body) = app.get(&format!("/hosts/{}/parameters", db.id)).await;
        assert_eq!(body["total"], 1);
    }

    #[tokio::test]
    async fn test_hostgroup_routes_through_group_parameters() {
        let app = TestApp::spawn().await;
        // Both parents get id 1 in their own tables
        let host = app.parent(ParentKind::Host, "web01");
        let hostgroup = app.parent(ParentKind::Hostgroup, "base");
        assert_eq!(host.id, hostgroup.id);

        let body = json!({ "parameter": { "name": "env", "value": "prod" } });
        let (status, _) = app
            .post(&format!("/hostgroups/{}/parameters", hostgroup.id), body)
            .await;
        assert_eq!(status, StatusCode::CREATED);

        assert_eq!(
            app.store
                .count_parameters(ParameterKind::Group, hostgroup.id)
                .unwrap(),
            1
        );
        assert_eq!(app.store.count_parameters(ParameterKind::Host, host.id).unwrap(), 0);

        let (status, _) = app.get(&format!("/hosts/{}/parameters/env", host.id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = app.delete(&format!("/hostgroups/{}/parameters", hostgroup.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(names(&body), vec!["env"]);
    }
}
