use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use log::{error, info};
use tokio::task::JoinHandle;

use crate::data::visit_model::VisitEvent;
use crate::service::EventStore;
use crate::AppState;

/// Internal, framework, and API paths that never count as page visits.
const EXCLUDED_PREFIXES: [&str; 4] = ["/api", "/_next", "/static", "/health"];
const EXCLUDED_FRAGMENTS: [&str; 2] = ["favicon.ico", "vercel"];

/// Decides which requests are page visits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisitFilter {
    /// Only the landing path `/` is tracked.
    pub root_only: bool,
}

impl VisitFilter {
    pub fn new(root_only: bool) -> Self {
        Self { root_only }
    }

    pub fn should_track(&self, method: &Method, path: &str) -> bool {
        if *method != Method::GET {
            return false;
        }
        if self.root_only {
            return path == "/";
        }
        if EXCLUDED_PREFIXES
            .iter()
            .any(|prefix| has_path_prefix(path, prefix))
        {
            return false;
        }
        if EXCLUDED_FRAGMENTS.iter().any(|f| path.contains(f)) {
            return false;
        }
        !is_static_asset(path)
    }
}

/// `/api` matches `/api` and `/api/...`, not `/apiary`.
fn has_path_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn is_static_asset(path: &str) -> bool {
    let last = path.rsplit('/').next().unwrap_or_default();
    match last.rsplit_once('.') {
        Some((stem, ext)) => !stem.is_empty() && !ext.eq_ignore_ascii_case("html"),
        None => false,
    }
}

/// Appends `event` on a detached task. Failures are logged and dropped; the
/// caller never waits on or observes the outcome.
pub fn dispatch(store: Arc<dyn EventStore>, event: VisitEvent) -> JoinHandle<()> {
    tokio::spawn(async move {
        match store.append_event(&event).await {
            Ok(()) => info!("Visit logged: {}", event.summary()),
            Err(e) => error!("visit store append failed: {:#}", e),
        }
    })
}

/// Middleware recording one visit per qualifying page request.
pub async fn track_visits(State(s): State<AppState>, req: Request, next: Next) -> Response {
    if s.filter.should_track(req.method(), req.uri().path()) {
        let event = VisitEvent::page_visit(req.uri().path(), req.headers());
        drop(dispatch(s.store.clone(), event));
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracks_pages() {
        let filter = VisitFilter::default();
        assert!(filter.should_track(&Method::GET, "/"));
        assert!(filter.should_track(&Method::GET, "/projects"));
        assert!(filter.should_track(&Method::GET, "/projects/lsp"));
        assert!(filter.should_track(&Method::GET, "/about.html"));
        assert!(filter.should_track(&Method::GET, "/apiary"));
    }

    #[test]
    fn test_skips_internal_paths() {
        let filter = VisitFilter::default();
        for path in [
            "/api",
            "/api/chat",
            "/_next/static/chunk.js",
            "/_next/image",
            "/static/logo",
            "/health",
            "/favicon.ico",
            "/_vercel/insights/view",
            "/vercel.svg",
            "/deploy/vercel",
        ] {
            assert!(!filter.should_track(&Method::GET, path), "{}", path);
        }
    }

    #[test]
    fn test_skips_assets() {
        let filter = VisitFilter::default();
        assert!(!filter.should_track(&Method::GET, "/styles/site.css"));
        assert!(!filter.should_track(&Method::GET, "/portrait.JPG"));
        assert!(!filter.should_track(&Method::GET, "/app.js"));
        // dotfiles have no extension
        assert!(filter.should_track(&Method::GET, "/.well-known"));
    }

    #[test]
    fn test_skips_non_get() {
        let filter = VisitFilter::default();
        assert!(!filter.should_track(&Method::POST, "/"));
        assert!(!filter.should_track(&Method::HEAD, "/"));
    }

    #[test]
    fn test_root_only() {
        let filter = VisitFilter::new(true);
        assert!(filter.should_track(&Method::GET, "/"));
        assert!(!filter.should_track(&Method::GET, "/projects"));
        assert!(!filter.should_track(&Method::GET, "/api/chat"));
    }
}
