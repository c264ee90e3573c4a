// src/server/handlers.rs
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use warp::{http::Response, reject, Rejection, Reply};

use super::{ApiError, AppState};
use crate::{
    analytics,
    dataset::{Dataset, Record},
    dossier::{self, Dossier},
    search::{Query, Scope, View},
};

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Field,
    All,
}

/// `?q=&mode=field|all&field=`
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub mode: Option<SearchMode>,
    pub field: Option<String>,
}

impl SearchParams {
    fn query(&self, ds: &Dataset) -> Query {
        let text = self.q.as_deref().unwrap_or("");
        let scope = match (self.mode, &self.field) {
            (Some(SearchMode::All), _) => Scope::AllFields,
            (_, Some(field)) => Scope::Field(field.clone()),
            (_, None) => ds
                .default_search_field()
                .map(|f| Scope::Field(f.to_string()))
                .unwrap_or(Scope::AllFields),
        };
        Query::new(text, scope)
    }

    /// Apply the query to the whole dataset.
    fn view<'a>(&self, ds: &'a Dataset) -> Result<View<'a>, Rejection> {
        View::all(ds)
            .filter(&self.query(ds))
            .map_err(|e| reject::custom(ApiError::BadRequest(e.to_string())))
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Txt,
    Pdf,
    /// The dossier layout itself, for rendering as cards.
    Json,
}

/// `?name=&format=txt|pdf|json`
#[derive(Debug, Deserialize)]
pub struct DossierParams {
    pub name: String,
    #[serde(default)]
    pub format: ExportFormat,
}

#[derive(Deserialize)]
pub struct AuthRequest {
    pub key: String,
}

#[derive(Serialize)]
struct AuthResponse {
    authorized: bool,
}

#[derive(Serialize)]
struct GroupInfo<'a> {
    name: &'a str,
    fields: Vec<&'a str>,
}

#[derive(Serialize)]
struct SchemaResponse<'a> {
    source: Option<String>,
    loaded_at: String,
    records: usize,
    display_field: &'a str,
    default_search_field: Option<&'a str>,
    fields: &'a [String],
    groups: Vec<GroupInfo<'a>>,
}

impl<'a> SchemaResponse<'a> {
    fn of(ds: &'a Dataset) -> Self {
        Self {
            source: ds.source.as_ref().map(|p| p.display().to_string()),
            loaded_at: ds.loaded_at.to_rfc3339(),
            records: ds.len(),
            display_field: &ds.display_field,
            default_search_field: ds.default_search_field(),
            fields: ds.fields(),
            groups: ds
                .taxonomy
                .groups()
                .iter()
                .map(|g| GroupInfo {
                    name: g,
                    fields: ds.taxonomy.fields_in(g).collect(),
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct RecordsResponse<'a> {
    count: usize,
    records: Vec<&'a Record>,
}

#[derive(Serialize)]
struct ProfilesResponse {
    count: usize,
    profiles: Vec<String>,
}

#[derive(Serialize)]
struct MapResponse {
    points: Vec<analytics::MapPoint>,
}

pub async fn health() -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&serde_json::json!({
        "status": "healthy",
        "service": "agentdir"
    })))
}

pub async fn auth(req: AuthRequest, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    if state.gate.verify(&req.key) {
        info!("access granted");
        Ok(warp::reply::json(&AuthResponse { authorized: true }))
    } else {
        warn!("access denied");
        Err(reject::custom(ApiError::Unauthorized))
    }
}

pub async fn schema(state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let ds = state.store.snapshot();
    Ok(warp::reply::json(&SchemaResponse::of(&ds)))
}

pub async fn records(params: SearchParams, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let ds = state.store.snapshot();
    let view = params.view(&ds)?;
    Ok(warp::reply::json(&RecordsResponse {
        count: view.len(),
        records: view.records().collect(),
    }))
}

pub async fn profiles(params: SearchParams, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let ds = state.store.snapshot();
    let profiles = params.view(&ds)?.profiles();
    Ok(warp::reply::json(&ProfilesResponse {
        count: profiles.len(),
        profiles,
    }))
}

pub async fn dossier(
    params: DossierParams,
    state: Arc<AppState>,
) -> Result<warp::reply::Response, Rejection> {
    let ds = state.store.snapshot();
    let record = View::all(&ds).find_profile(&params.name).ok_or_else(|| {
        reject::custom(ApiError::NotFound(format!("no profile named `{}`", params.name)))
    })?;
    let cfg = &state.config.dossier;
    let report = Dossier::build(record, &ds.taxonomy, &params.name, cfg);

    let (body, content_type, ext) = match params.format {
        ExportFormat::Json => return Ok(warp::reply::json(&report).into_response()),
        ExportFormat::Txt => (
            dossier::text::render(&report).into_bytes(),
            "text/plain; charset=utf-8",
            "txt",
        ),
        ExportFormat::Pdf => (
            dossier::pdf::render(&report).map_err(ApiError::internal)?,
            "application/pdf",
            "pdf",
        ),
    };
    let file_name = dossier::file_name(&cfg.file_prefix, &params.name, ext);
    info!(profile = %params.name, file = %file_name, "dossier exported");

    Response::builder()
        .header("content-type", content_type)
        .header(
            "content-disposition",
            format!("attachment; filename=\"{}\"", file_name),
        )
        .body(body)
        .map(Reply::into_response)
        .map_err(ApiError::internal)
}

pub async fn analytics(state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let ds = state.store.snapshot();
    Ok(warp::reply::json(&analytics::summary(
        &ds,
        &state.config.analytics,
    )))
}

pub async fn map(params: SearchParams, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let ds = state.store.snapshot();
    let view = params.view(&ds)?;
    Ok(warp::reply::json(&MapResponse {
        points: analytics::map_points(&view, &ds, &state.config.analytics),
    }))
}

pub async fn reload(state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let worker = Arc::clone(&state);
    let ds = tokio::task::spawn_blocking(move || worker.store.reload())
        .await
        .map_err(ApiError::internal)?
        .map_err(|e| ApiError::internal(format!("{:#}", e)))?;
    Ok(warp::reply::json(&SchemaResponse::of(&ds)))
}
