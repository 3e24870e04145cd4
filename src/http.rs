// Page HTTP Interface - permalink route registry and the public page router

use axum::{
    extract::{Path as AxumPath, State},
    response::Json,
    routing::get,
    Router,
};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, instrument};

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::infrastructure::traits::RouteRegistrar;

/// Per-locale permalink patterns, compiled once per distinct pattern.
#[derive(Debug, Default)]
pub struct RegexRouteRegistrar {
    routes: RwLock<HashMap<String, (String, Regex)>>,
}

impl RegexRouteRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `permalink` is routable in `locale`. `None` when no pattern
    /// has been registered for the locale.
    pub fn matches(&self, locale: &str, permalink: &str) -> Option<bool> {
        let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
        routes.get(locale).map(|(_, regex)| regex.is_match(permalink))
    }

    pub fn pattern(&self, locale: &str) -> Option<String> {
        let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
        routes.get(locale).map(|(pattern, _)| pattern.clone())
    }
}

impl RouteRegistrar for RegexRouteRegistrar {
    fn register_page_route(&self, locale: &str, pattern: &str) -> AppResult<()> {
        if self.pattern(locale).as_deref() == Some(pattern) {
            return Ok(());
        }

        let regex = Regex::new(&format!("^{}$", pattern)).map_err(|e| {
            AppError::Internal(format!("Invalid page route pattern for {}: {}", locale, e))
        })?;
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        routes.insert(locale.to_string(), (pattern.to_string(), regex));
        Ok(())
    }
}

// HTTP Handlers

#[instrument(skip_all, fields(locale = %locale, permalink = %permalink))]
pub async fn show_page_handler(
    State(state): State<AppState>,
    AxumPath((locale, permalink)): AxumPath<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let service = &state.page_service;
    if !service.supported_locales().contains(&locale) {
        return Err(AppError::NotFound(format!("Unsupported locale {}", locale)));
    }

    service.register_routes(Some(locale.as_str())).await?;
    if state.routes.matches(&locale, &permalink) == Some(false) {
        debug!("No page route for {}/{}", locale, permalink);
        return Err(AppError::NotFound(format!("No page at {}/{}", locale, permalink)));
    }

    let mut page = service
        .find_by_permalink(&permalink, Some(locale.as_str()))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No page at {}/{}", locale, permalink)))?;

    service.load_page_content(&mut page).await?;
    let breadcrumb = service.breadcrumb(&page, &locale).await?;
    let translation = page.translation(&locale);

    Ok(Json(json!({
        "id": page.id,
        "locale": locale,
        "permalink": translation.map(|t| t.permalink.as_str()),
        "title": translation.map(|t| t.title.as_str()),
        "description": translation.and_then(|t| t.description.as_deref()),
        "keywords": translation.and_then(|t| t.keywords.as_deref()),
        "content": translation.and_then(|t| t.content.as_deref()),
        "breadcrumb": breadcrumb,
        "updated_at": page.updated_at,
    })))
}

pub fn create_page_router(state: AppState) -> Router {
    Router::new()
        .route("/{locale}/{*permalink}", get(show_page_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::{AppEnvironment, Config};
    use crate::models::{PageData, TranslationData};

    fn translation(locale: &str, permalink: &str, title: &str) -> TranslationData {
        TranslationData {
            locale: Some(locale.to_string()),
            permalink: Some(permalink.to_string()),
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    async fn serving_state(root: &std::path::Path) -> AppState {
        let mut config = Config::for_testing(root, &["en"]);
        config.environment = AppEnvironment::Production;
        AppState::new(config).await.unwrap()
    }

    async fn get_json(state: &AppState, uri: &str) -> (StatusCode, Value) {
        let response = create_page_router(state.clone())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_registrar_matches_whole_permalink() {
        let registrar = RegexRouteRegistrar::new();
        assert_eq!(registrar.matches("en", "about"), None);

        registrar.register_page_route("en", "(about|services/web)").unwrap();
        assert_eq!(registrar.matches("en", "about"), Some(true));
        assert_eq!(registrar.matches("en", "services/web"), Some(true));
        assert_eq!(registrar.matches("en", "about/more"), Some(false));
        assert_eq!(registrar.matches("fr", "about"), None);
    }

    #[tokio::test]
    async fn test_page_is_served_with_breadcrumb() {
        let dir = tempfile::tempdir().unwrap();
        let state = serving_state(dir.path()).await;
        let service = &state.page_service;

        let mut data = PageData::default();
        data.translation.insert("en".to_string(), translation("en", "about", "About"));
        let parent = service.create(data).await.unwrap();

        let mut data = PageData {
            parent_id: parent.id,
            ..Default::default()
        };
        let mut team = translation("en", "about/team", "Team");
        team.content = Some("<a href=\"%BASE_URL%/en/about\">up</a>".to_string());
        data.translation.insert("en".to_string(), team);
        service.create(data).await.unwrap();

        let (status, body) = get_json(&state, "/en/about/team").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Team");
        assert_eq!(body["content"], "<a href=\"http://localhost/en/about\">up</a>");
        assert_eq!(body["breadcrumb"][0]["permalink"], "about");
        assert_eq!(body["breadcrumb"].as_array().unwrap().len(), 1);
        assert_eq!(
            state.routes.pattern("en").as_deref(),
            Some("(about|about/team)")
        );
    }

    #[tokio::test]
    async fn test_unknown_permalink_and_locale_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = serving_state(dir.path()).await;

        let (status, body) = get_json(&state, "/en/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], 404);

        let (status, _) = get_json(&state, "/de/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
