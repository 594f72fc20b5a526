//! HTTP surface: homepage, downloads, robots.txt.
//!
//! The extract table is built at startup and swapped wholesale by a
//! periodic rescan. Handlers only take the read lock long enough to clone
//! one entry; file bodies are streamed by `tower_http::services::ServeFile`,
//! which also answers Range and If-Modified-Since requests.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::extract::{list_extracts, Extracts};

const ROBOTS_TXT: &str = "User-Agent: *\nAllow: /\n";

pub struct AppState {
    workdir: PathBuf,
    categories: Vec<String>,
    extracts: RwLock<Extracts>,
}

impl AppState {
    /// Scan `workdir` once. A failing initial scan is an error; later
    /// rescans keep the previous table instead.
    pub async fn load(workdir: PathBuf, categories: Vec<String>) -> Result<Arc<Self>> {
        let extracts = scan(workdir.clone(), categories.clone()).await?;
        info!(workdir = %workdir.display(), files = extracts.len(), "loaded extracts");
        Ok(Arc::new(Self {
            workdir,
            categories,
            extracts: RwLock::new(extracts),
        }))
    }

    /// Rescan the work directory and swap in the new table. Returns the
    /// number of files now served.
    pub async fn refresh(&self) -> Result<usize> {
        let extracts = scan(self.workdir.clone(), self.categories.clone()).await?;
        let count = extracts.len();
        *self.extracts.write().await = extracts;
        Ok(count)
    }

    pub async fn extracts(&self) -> Extracts {
        self.extracts.read().await.clone()
    }
}

async fn scan(workdir: PathBuf, categories: Vec<String>) -> Result<Extracts> {
    tokio::task::spawn_blocking(move || list_extracts(&workdir, &categories)).await?
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(homepage))
        .route("/downloads/{file}", get(download))
        .route("/robots.txt", get(robots_txt))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Rescan every `period` until the returned task is aborted.
pub fn spawn_rescan(state: Arc<AppState>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; the table is already fresh.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match state.refresh().await {
                Ok(files) => debug!(files, "rescanned extracts"),
                Err(e) => warn!(error = %e, "rescan failed, keeping previous extracts"),
            }
        }
    })
}

// ── Handlers ───────────────────────────────────────────────────────

async fn homepage(State(state): State<Arc<AppState>>) -> Html<String> {
    let mut names: Vec<String> = state.extracts.read().await.keys().cloned().collect();
    names.sort();

    let mut page = String::from(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Wikidata Names</title>\n</head>\n<body>\n<h1>Wikidata Names</h1>\n\
         <p>Given names and family names extracted from Wikidata, as gzip-compressed CSV \
         sorted by name. Updated after every Wikidata dump.</p>\n",
    );
    if names.is_empty() {
        page.push_str("<p>No extracts available yet.</p>\n");
    } else {
        page.push_str("<ul>\n");
        for name in &names {
            page.push_str(&format!("<li><a href=\"/downloads/{0}\">{0}</a></li>\n", name));
        }
        page.push_str("</ul>\n");
    }
    page.push_str("</body>\n</html>\n");
    Html(page)
}

async fn download(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
    req: Request,
) -> Response {
    let Some(extract) = state.extracts.read().await.get(&file).cloned() else {
        debug!(file = %file, "unknown download");
        return StatusCode::NOT_FOUND.into_response();
    };

    let etag = HeaderValue::from_str(&format!("\"{}\"", extract.etag)).ok();
    if if_none_match(req.headers(), &extract.etag) {
        let mut response = StatusCode::NOT_MODIFIED.into_response();
        if let Some(etag) = etag {
            response.headers_mut().insert(header::ETAG, etag);
        }
        return response;
    }

    let mut response = match ServeFile::new(&extract.path).oneshot(req).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    };
    let status = response.status();
    if status.is_success() || status == StatusCode::NOT_MODIFIED {
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/csv"));
        if let Some(etag) = etag {
            headers.insert(header::ETAG, etag);
        }
    }
    response
}

async fn robots_txt() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain")], ROBOTS_TXT)
}

/// True if `If-None-Match` lists `etag` (strong or weak) or `*`.
fn if_none_match(headers: &HeaderMap, etag: &str) -> bool {
    let Some(value) = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    value.split(',').map(str::trim).any(|tag| {
        tag == "*" || tag.trim_start_matches("W/").trim_matches('"') == etag
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_if_none_match() {
        assert!(if_none_match(&headers("\"abc=\""), "abc="));
        assert!(if_none_match(&headers("W/\"abc=\""), "abc="));
        assert!(if_none_match(&headers("\"x\", \"abc=\""), "abc="));
        assert!(if_none_match(&headers("*"), "abc="));
        assert!(!if_none_match(&headers("\"abd=\""), "abc="));
        assert!(!if_none_match(&HeaderMap::new(), "abc="));
    }
}
