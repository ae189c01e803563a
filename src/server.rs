// used to share one configuration between handlers
use std::sync::Arc;

// used for timing requests in the logs
use std::time::Instant;

// used for the http surface
use axum::{routing::{get, post}, Router, Json};
use axum::http::StatusCode;
use tower_http::cors::{CorsLayer, Any};

// request and response bodies are json
use serde::{Deserialize, Serialize};

// used for logging
use tracing::{info, warn};

// our own stuff that we need
use crate::aggregate::Buckets;
use crate::brackets::find_unbalanced;
use crate::construct::{Matcher, Operator};
use crate::datatype::Value;
use crate::interface::suggest_settled;
use crate::resolver::{ResolveContext, Suggestions};
use crate::settings::Config;
use crate::validate::validate_matcher;

#[derive(Deserialize)]
pub struct SuggestRequest {
    pub text: String,
    #[serde(default)]
    pub matchers: Vec<Matcher>,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub allow_functions: bool,
}

#[derive(Serialize)]
pub struct TokensView {
    pub operator: Option<Operator>,
    pub comparison: Option<String>,
    pub bracket: Option<&'static str>,
    pub remainder: String,
    pub free_text: bool,
}

#[derive(Serialize)]
pub struct OptionView {
    pub source: String,
    pub value: Value,
    pub text: String,
}

#[derive(Serialize)]
pub struct BucketView {
    pub title: String,
    pub options: Vec<OptionView>,
}

#[derive(Serialize)]
pub struct SuggestResponse {
    pub tokens: TokensView,
    pub buckets: Vec<BucketView>,
    pub total: usize,
}

fn bucket_views(buckets: &Buckets) -> Vec<BucketView> {
    buckets
        .iter()
        .map(|bucket| BucketView {
            title: bucket.title().to_owned(),
            options: bucket
                .options()
                .iter()
                .map(|o| OptionView { source: o.source.clone(), value: o.value.clone(), text: o.text.clone() })
                .collect(),
        })
        .collect()
}

impl From<Suggestions> for SuggestResponse {
    fn from(suggestions: Suggestions) -> Self {
        let tokens = suggestions.tokens;
        SuggestResponse {
            tokens: TokensView {
                operator: tokens.operator,
                comparison: tokens.comparison,
                bracket: tokens.bracket.map(|b| b.symbol()),
                remainder: tokens.remainder,
                free_text: tokens.free_text,
            },
            buckets: bucket_views(&suggestions.buckets),
            total: suggestions.total,
        }
    }
}

#[derive(Deserialize)]
pub struct ValidateRequest {
    pub candidate: Matcher,
    #[serde(default)]
    pub matchers: Vec<Matcher>,
    #[serde(default)]
    pub active_index: Option<usize>,
}

#[derive(Serialize)]
pub struct ValidateResponse {
    pub error: Option<String>,
}

#[derive(Deserialize)]
pub struct BracketsRequest {
    pub comparisons: Vec<String>,
}

#[derive(Serialize)]
pub struct BracketsResponse {
    pub unbalanced: Vec<usize>,
}

#[derive(Serialize)]
pub struct SourceView {
    pub name: String,
    pub title: String,
    pub comparisons: Vec<String>,
    pub selection_limit: Option<usize>,
}

async fn suggest(config: &Config, req: SuggestRequest) -> Result<Json<SuggestResponse>, (StatusCode, String)> {
    let function = req
        .function
        .as_deref()
        .map(|name| {
            config.function(name).ok_or_else(|| {
                warn!(function = name, "unknown function");
                (StatusCode::BAD_REQUEST, format!("unknown function '{name}'"))
            })
        })
        .transpose()?;
    let ctx = ResolveContext {
        config,
        function,
        matchers: &req.matchers,
        allow_functions: req.allow_functions,
    };
    let started = Instant::now();
    let suggestions = suggest_settled(&req.text, &ctx).await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    info!(ms = elapsed_ms, total = suggestions.total, "suggest complete");
    Ok(Json(SuggestResponse::from(suggestions)))
}

pub fn router(config: Arc<Config>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);
    let suggest_config = Arc::clone(&config);
    let validate_config = Arc::clone(&config);
    let sources_config = Arc::clone(&config);
    Router::new()
        .route("/v1/suggest", post(move |Json(req): Json<SuggestRequest>| {
            let config = Arc::clone(&suggest_config);
            async move { suggest(&config, req).await }
        }))
        .route("/v1/validate", post(move |Json(req): Json<ValidateRequest>| {
            let config = Arc::clone(&validate_config);
            async move {
                let error = validate_matcher(
                    &req.candidate,
                    &req.matchers,
                    config.data_sources(),
                    req.active_index,
                    config.operators(),
                    config.limit_policy(),
                );
                if let Some(msg) = &error {
                    info!(%msg, key = req.candidate.key(), "candidate rejected");
                }
                Json(ValidateResponse { error })
            }
        }))
        .route("/v1/brackets", post(|Json(req): Json<BracketsRequest>| async move {
            Json(BracketsResponse { unbalanced: find_unbalanced(&req.comparisons) })
        }))
        .route("/v1/sources", get(move || {
            let config = Arc::clone(&sources_config);
            async move {
                let sources: Vec<SourceView> = config
                    .data_sources()
                    .iter()
                    .map(|ds| SourceView {
                        name: ds.name().to_owned(),
                        title: ds.title().to_owned(),
                        comparisons: ds.comparisons().to_vec(),
                        selection_limit: ds.limit(),
                    })
                    .collect();
                Json(sources)
            }
        }))
        .layer(cors)
}
