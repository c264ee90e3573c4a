// src/server/mod.rs
pub mod handlers;

use anyhow::{Context, Result};
use serde::Serialize;
use std::{convert::Infallible, net::SocketAddr, sync::Arc};
use tracing::{info, warn};
use warp::{http::StatusCode, reject::Reject, Filter, Rejection, Reply};

use crate::{
    auth::AccessGate,
    config::Config,
    dataset::{DatasetStore, LoadOptions},
};

/// Header carrying the shared access key on every gated route.
pub const ACCESS_HEADER: &str = "x-access-key";

/// Largest accepted `/auth` body.
const MAX_AUTH_BODY: u64 = 16 * 1024;

/// Everything a handler needs.
pub struct AppState {
    pub store: DatasetStore,
    pub gate: AccessGate,
    pub config: Config,
}

/// Failures a handler reports to the client.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl Reject for ApiError {}

impl ApiError {
    pub fn internal(err: impl std::fmt::Display) -> Rejection {
        warp::reject::custom(ApiError::Internal(err.to_string()))
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    details: Option<String>,
}

fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&state))
}

/// Rejects unless the access header matches the configured key.
fn authorized(state: Arc<AppState>) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::header::optional::<String>(ACCESS_HEADER)
        .and(with_state(state))
        .and_then(|key: Option<String>, state: Arc<AppState>| async move {
            match key {
                Some(k) if state.gate.verify(&k) => Ok::<(), Rejection>(()),
                _ => Err(warp::reject::custom(ApiError::Unauthorized)),
            }
        })
        .untuple_one()
}

/// The full route tree, with error recovery.
pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let gate = authorized(Arc::clone(&state));

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(handlers::health);

    let auth = warp::path("auth")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_AUTH_BODY))
        .and(warp::body::json())
        .and(with_state(Arc::clone(&state)))
        .and_then(handlers::auth);

    let schema = warp::path("schema")
        .and(warp::path::end())
        .and(warp::get())
        .and(gate.clone())
        .and(with_state(Arc::clone(&state)))
        .and_then(handlers::schema);

    let records = warp::path("records")
        .and(warp::path::end())
        .and(warp::get())
        .and(gate.clone())
        .and(warp::query::<handlers::SearchParams>())
        .and(with_state(Arc::clone(&state)))
        .and_then(handlers::records);

    let profiles = warp::path("profiles")
        .and(warp::path::end())
        .and(warp::get())
        .and(gate.clone())
        .and(warp::query::<handlers::SearchParams>())
        .and(with_state(Arc::clone(&state)))
        .and_then(handlers::profiles);

    let dossier = warp::path("dossier")
        .and(warp::path::end())
        .and(warp::get())
        .and(gate.clone())
        .and(warp::query::<handlers::DossierParams>())
        .and(with_state(Arc::clone(&state)))
        .and_then(handlers::dossier);

    let analytics = warp::path("analytics")
        .and(warp::path::end())
        .and(warp::get())
        .and(gate.clone())
        .and(with_state(Arc::clone(&state)))
        .and_then(handlers::analytics);

    let map = warp::path("map")
        .and(warp::path::end())
        .and(warp::get())
        .and(gate.clone())
        .and(warp::query::<handlers::SearchParams>())
        .and(with_state(Arc::clone(&state)))
        .and_then(handlers::map);

    let reload = warp::path("reload")
        .and(warp::path::end())
        .and(warp::post())
        .and(gate)
        .and(with_state(state))
        .and_then(handlers::reload);

    health
        .or(auth)
        .or(schema)
        .or(records)
        .or(profiles)
        .or(dossier)
        .or(analytics)
        .or(map)
        .or(reload)
        .recover(handle_rejection)
        .with(warp::trace::request())
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, error, details) = if let Some(api) = err.find::<ApiError>() {
        match api {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized access", None),
            ApiError::BadRequest(d) => (StatusCode::BAD_REQUEST, "bad request", Some(d.clone())),
            ApiError::NotFound(d) => (StatusCode::NOT_FOUND, "not found", Some(d.clone())),
            ApiError::Internal(d) => {
                warn!(details = %d, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error", Some(d.clone()))
            }
        }
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not found", None)
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, "bad request", Some(e.to_string()))
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, "bad request", Some(e.to_string()))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "payload too large", None)
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed", None)
    } else {
        warn!(?err, "unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error", None)
    };

    let body = warp::reply::json(&ErrorResponse {
        error: error.to_string(),
        details,
    });
    Ok(warp::reply::with_status(body, status))
}

/// Load the dataset, check the access key is configured, and serve until killed.
pub async fn serve(config: Config) -> Result<()> {
    let gate = AccessGate::from_config(&config.access)?;
    let source = config.data.source.clone();
    let opts = LoadOptions::from(&config.data);
    let store = tokio::task::spawn_blocking(move || DatasetStore::open(source, opts))
        .await
        .context("dataset loader task panicked")??;
    info!(
        records = store.snapshot().len(),
        source = store.source(),
        "dataset ready"
    );

    let addr = SocketAddr::from((config.server.host, config.server.port));
    let state = Arc::new(AppState {
        store,
        gate,
        config,
    });

    info!("Server starting on {}", addr);
    info!("Health check: http://{}/health", addr);
    warp::serve(routes(state)).run(addr).await;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dataset::{loader::parse_csv, Dataset};
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    pub(crate) const KEY: &str = "letmein";

    pub(crate) const CSV: &str = "\
DIRECTORY,,,,,
Core,,,Enriched Data,,
Firm Name,Emirate,Firm Type,Rating,Harmonized Phone Number,Address of License
Alpha Agents,Dubai,Broker,4,0501234567,Office 1
Beta Brokers,Sharjah,Developer,,,
Gamma Realty,Dubai,Broker,5,00971509998877,Tower 2
";

    pub(crate) fn state_with(source: &str) -> Arc<AppState> {
        let mut config = Config::default();
        config.access.key = Some(KEY.into());
        config.data.source = source.into();
        let opts = LoadOptions::from(&config.data);
        let (schema, taxonomy, records) = parse_csv(Cursor::new(CSV), &opts).unwrap();
        let mut dataset = Dataset::empty(&opts.display_field);
        dataset.schema = schema;
        dataset.taxonomy = taxonomy;
        dataset.records = records;
        Arc::new(AppState {
            store: DatasetStore::with_dataset(source, opts, dataset),
            gate: AccessGate::from_config(&config.access).unwrap(),
            config,
        })
    }

    pub(crate) fn state() -> Arc<AppState> {
        state_with("does-not-exist-*.csv")
    }

    fn json<B: AsRef<[u8]>>(resp: &warp::http::Response<B>) -> serde_json::Value {
        serde_json::from_slice(resp.body().as_ref()).unwrap()
    }

    #[tokio::test]
    async fn health_is_open() {
        let api = routes(state());
        let resp = warp::test::request().path("/health").reply(&api).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn auth_checks_the_key() {
        let api = routes(state());
        let ok = warp::test::request()
            .method("POST")
            .path("/auth")
            .json(&serde_json::json!({ "key": KEY }))
            .reply(&api)
            .await;
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(json(&ok)["authorized"], true);

        let bad = warp::test::request()
            .method("POST")
            .path("/auth")
            .json(&serde_json::json!({ "key": "Kyrix2024" }))
            .reply(&api)
            .await;
        assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn oversized_auth_body_is_refused() {
        let api = routes(state());
        let key = "k".repeat(32 * 1024);
        let resp = warp::test::request()
            .method("POST")
            .path("/auth")
            .json(&serde_json::json!({ "key": key }))
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn gated_routes_need_the_header() {
        let api = routes(state());
        for path in ["/schema", "/records", "/profiles", "/analytics", "/map", "/dossier?name=x"] {
            let resp = warp::test::request().path(path).reply(&api).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{}", path);
            let resp = warp::test::request()
                .path(path)
                .header(ACCESS_HEADER, "wrong")
                .reply(&api)
                .await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{}", path);
        }
        let resp = warp::test::request()
            .method("POST")
            .path("/reload")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn records_filter_by_field_and_all() {
        let api = routes(state());
        let resp = warp::test::request()
            .path("/records?q=dubai&field=Emirate")
            .header(ACCESS_HEADER, KEY)
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json(&resp);
        assert_eq!(body["count"], 2);
        assert_eq!(body["records"][0]["Firm Name"], "Alpha Agents");
        assert_eq!(body["records"][0]["Rating"], "★★★★");

        let resp = warp::test::request()
            .path("/records?q=developer&mode=all")
            .header(ACCESS_HEADER, KEY)
            .reply(&api)
            .await;
        assert_eq!(json(&resp)["count"], 1);

        // default field is the second column (Emirate)
        let resp = warp::test::request()
            .path("/records?q=broker")
            .header(ACCESS_HEADER, KEY)
            .reply(&api)
            .await;
        assert_eq!(json(&resp)["count"], 0);
    }

    #[tokio::test]
    async fn unknown_field_is_bad_request() {
        let api = routes(state());
        let resp = warp::test::request()
            .path("/records?q=x&field=Nope")
            .header(ACCESS_HEADER, KEY)
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(&resp)["error"], "bad request");
    }

    #[tokio::test]
    async fn profiles_and_schema() {
        let api = routes(state());
        let resp = warp::test::request()
            .path("/profiles?q=broker&field=Firm%20Type")
            .header(ACCESS_HEADER, KEY)
            .reply(&api)
            .await;
        assert_eq!(
            json(&resp)["profiles"],
            serde_json::json!(["Alpha Agents", "Gamma Realty"])
        );

        let resp = warp::test::request()
            .path("/schema")
            .header(ACCESS_HEADER, KEY)
            .reply(&api)
            .await;
        let body = json(&resp);
        assert_eq!(body["groups"][0]["name"], "Core");
        assert_eq!(body["groups"][1]["fields"][0], "Rating");
        assert_eq!(body["default_search_field"], "Emirate");
        assert_eq!(body["records"], 3);
    }

    #[tokio::test]
    async fn dossier_downloads() {
        let api = routes(state());
        let resp = warp::test::request()
            .path("/dossier?name=Alpha%20Agents")
            .header(ACCESS_HEADER, KEY)
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()["content-disposition"],
            "attachment; filename=\"Agent_Dossier_Alpha_Agents.txt\""
        );
        let text = String::from_utf8(resp.body().to_vec()).unwrap();
        assert!(text.contains("Harmonized Phone Number: +971501234567"));
        assert!(text.ends_with("END OF DOSSIER"));

        let resp = warp::test::request()
            .path("/dossier?name=Gamma%20Realty&format=pdf")
            .header(ACCESS_HEADER, KEY)
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "application/pdf");
        assert!(resp.body().starts_with(b"%PDF"));

        let resp = warp::test::request()
            .path("/dossier?name=Nobody")
            .header(ACCESS_HEADER, KEY)
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn dossier_json_is_the_card_layout() {
        let api = routes(state());
        let resp = warp::test::request()
            .path("/dossier?name=Alpha%20Agents&format=json")
            .header(ACCESS_HEADER, KEY)
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get("content-disposition").is_none());
        let body = json(&resp);
        assert_eq!(body["profile"], "Alpha Agents");

        let sections = body["sections"].as_array().unwrap();
        let groups: Vec<&str> = sections
            .iter()
            .map(|s| s["group"].as_str().unwrap())
            .collect();
        assert_eq!(groups, vec!["Core", "Enriched Data"]);
        assert_eq!(sections[0]["highlighted"], false);
        assert_eq!(sections[1]["highlighted"], true);

        let entries = sections[1]["entries"].as_array().unwrap();
        let layout: Vec<(&str, &str)> = entries
            .iter()
            .map(|e| (e["field"].as_str().unwrap(), e["kind"].as_str().unwrap()))
            .collect();
        assert_eq!(
            layout,
            vec![
                ("Rating", "plain"),
                ("Address of License", "pinned"),
                ("Harmonized Phone Number", "pinned"),
            ]
        );
        assert_eq!(entries[2]["value"], "+971501234567");
    }

    #[tokio::test]
    async fn analytics_and_map() {
        let api = routes(state());
        let resp = warp::test::request()
            .path("/analytics")
            .header(ACCESS_HEADER, KEY)
            .reply(&api)
            .await;
        let body = json(&resp);
        assert_eq!(body["regions"][0]["label"], "Dubai");
        assert_eq!(body["regions"][0]["count"], 2);
        assert_eq!(body["firm_types"][0]["label"], "Broker");

        let resp = warp::test::request()
            .path("/map?q=sharjah")
            .header(ACCESS_HEADER, KEY)
            .reply(&api)
            .await;
        let body = json(&resp);
        assert_eq!(body["points"].as_array().unwrap().len(), 1);
        assert_eq!(body["points"][0]["name"], "Beta Brokers");
    }

    #[tokio::test]
    async fn reload_picks_up_new_file() -> anyhow::Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"banner\nCore,,Contacts\nFirm Name,Emirate,Phone\nZeta,Ajman,050\n")?;
        let state = state_with(&file.path().to_string_lossy());
        let api = routes(Arc::clone(&state));

        assert_eq!(state.store.snapshot().len(), 3);
        let resp = warp::test::request()
            .method("POST")
            .path("/reload")
            .header(ACCESS_HEADER, KEY)
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json(&resp);
        assert_eq!(body["records"], 1);
        assert_eq!(body["fields"], serde_json::json!(["Firm Name", "Emirate", "Phone"]));
        assert_eq!(state.store.snapshot().display_name(0), "Zeta");
        Ok(())
    }
}
