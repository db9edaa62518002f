#![cfg(feature = "web")]

use axum::{
    Form, Json, Router,
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, Uri},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::Local;
use handlebars::{Handlebars, handlebars_helper};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::catalog::{self, Catalog, LATEST_COUNT};
use crate::config::Config;
use crate::engagement::{self, CounterStore, Counts, VisitorFingerprint};
use crate::error::{AppError, Result};
use crate::idea::Idea;
use crate::mailer::{self, WelcomeMailer};
use crate::search;
use crate::subscribers::{SubscribeOutcome, SubscriberList};

pub const FLASH_COOKIE: &str = "flash";

/// Themes shown on the home page
const HOME_THEME_COUNT: usize = 3;

/// Content-free pages served straight from their template
const STATIC_PAGES: [&str; 5] = ["about", "resources", "contact", "privacy", "download"];

lazy_static! {
    // Local absolute paths only: "/", "/idea/x", never "//host" or "/\host"
    static ref LOCAL_PATH_REGEX: Regex = Regex::new(r"^/([^/\\].*)?$").unwrap();
}

handlebars_helper!(urlencode: |s: str| urlencoding::encode(s).into_owned());

pub struct AppState {
    pub config: Config,
    pub catalog: Catalog,
    pub counters: Arc<dyn CounterStore>,
    pub subscribers: SubscriberList,
    pub mailer: Option<Arc<dyn WelcomeMailer>>,
    templates: Handlebars<'static>,
}

/// A one-shot message carried to the next rendered page in a cookie
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Flash {
    pub level: String,
    pub message: String,
}

#[derive(Deserialize)]
struct MatchForm {
    #[serde(default)]
    problem: String,
}

#[derive(Deserialize)]
struct SubscribeForm {
    #[serde(default)]
    email: String,
    next: Option<String>,
}

impl AppState {
    /// Wire the configured counter backend and mailer
    ///
    /// # Arguments
    /// * `config` - Loaded settings; `counter_backend` picks the engagement store
    ///
    /// # Returns
    /// * `Result<Arc<AppState>>` - Shared state ready for [`router`]
    ///
    /// # Errors
    /// * `AppError::Database` if the SQLite store cannot be opened
    /// * `AppError::TemplateSyntax` if a built-in template fails to parse
    pub fn new(config: Config) -> Result<Arc<Self>> {
        let catalog = Catalog::new(&config.data_dir);
        let counters = engagement::open_store(
            config.counter_backend,
            &catalog.ideas_path(),
            &config.counter_db,
        )?;
        let mailer = mailer::from_config(config.smtp.as_ref());
        Self::with_parts(config, counters, mailer)
    }

    /// Same as [`AppState::new`] with the counter store and mailer supplied by the caller
    pub fn with_parts(
        config: Config,
        counters: Arc<dyn CounterStore>,
        mailer: Option<Arc<dyn WelcomeMailer>>,
    ) -> Result<Arc<Self>> {
        Ok(Arc::new(AppState {
            catalog: Catalog::new(&config.data_dir),
            subscribers: SubscriberList::new(&config.data_dir),
            counters,
            mailer,
            templates: load_templates()?,
            config,
        }))
    }

    /// Render a full page, consuming any pending flash message
    fn page(&self, jar: CookieJar, uri: &Uri, name: &str, mut data: Value) -> Result<(CookieJar, Html<String>)> {
        let (jar, flash) = take_flash(jar);
        if let Value::Object(map) = &mut data {
            map.insert("flash".to_string(), json!(flash));
            map.insert("current_path".to_string(), json!(uri.path()));
        }
        let html = self.templates.render(name, &data)?;
        Ok((jar, Html(html)))
    }

    fn require_idea(&self, idea_id: &str) -> Result<Idea> {
        self.catalog
            .get_idea_by_id(idea_id)?
            .ok_or_else(|| AppError::NotFound("Idea".to_string()))
    }
}

fn load_templates() -> Result<Handlebars<'static>> {
    let mut hb = Handlebars::new();
    hb.register_helper("urlencode", Box::new(urlencode));

    hb.register_partial("header", include_str!("./templates/header.hbs"))?;
    hb.register_partial("footer", include_str!("./templates/footer.hbs"))?;
    hb.register_partial("idea_card", include_str!("./templates/idea_card.hbs"))?;

    let pages = [
        ("index", include_str!("./templates/index.hbs")),
        ("all_ideas", include_str!("./templates/all_ideas.hbs")),
        ("idea", include_str!("./templates/idea.hbs")),
        ("theme", include_str!("./templates/theme.hbs")),
        ("all_themes", include_str!("./templates/all_themes.hbs")),
        ("search_results", include_str!("./templates/search_results.hbs")),
        ("learn_ai", include_str!("./templates/learn_ai.hbs")),
        ("ai_hack", include_str!("./templates/ai_hack.hbs")),
        ("workshop", include_str!("./templates/workshop.hbs")),
        ("about", include_str!("./templates/about.hbs")),
        ("resources", include_str!("./templates/resources.hbs")),
        ("contact", include_str!("./templates/contact.hbs")),
        ("privacy", include_str!("./templates/privacy.hbs")),
        ("download", include_str!("./templates/download.hbs")),
    ];
    for (name, source) in pages {
        hb.register_template_string(name, source)?;
    }

    Ok(hb)
}

/// Build the site's router
///
/// # Arguments
/// * `state` - Shared application state
///
/// # Returns
/// * `Router` - Every page, the engagement API and `/static` files
pub fn router(state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(&state.config.static_dir);

    Router::new()
        .route("/", get(index))
        .route("/all_ideas", get(all_ideas))
        .route("/ideas", get(all_ideas))
        .route("/idea/:idea_id", get(idea_detail))
        .route("/theme/:theme_name", get(theme_page))
        .route("/themes", get(all_themes))
        .route("/match", post(match_problem))
        .route("/subscribe", post(subscribe))
        .route("/api/like/:idea_id", post(like_idea))
        .route("/api/share/:idea_id", post(share_idea))
        .route("/api/stats/:idea_id", get(idea_stats))
        .route("/learn_ai", get(learn_ai))
        .route("/learn_ai/:slug", get(learn_ai_detail))
        .route("/workshop", get(workshop))
        .route("/:page", get(static_page))
        .nest_service("/static", static_files)
        .with_state(state)
}

/// Serve the site until Ctrl+C
///
/// # Arguments
/// * `config` - Loaded settings, including the address to bind
///
/// # Errors
/// * Any error from [`AppState::new`]
/// * `AppError::Io` if the address cannot be bound or the server fails
pub async fn run(config: Config) -> Result<()> {
    let address = config.address();
    let state = AppState::new(config)?;
    let app = router(state);

    let listener = TcpListener::bind(&address).await?;
    log::info!("Listening on http://{}", address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    log::info!("Server shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Received Ctrl+C, shutting down");
}

// Pages

async fn index(State(state): State<Arc<AppState>>, jar: CookieJar, uri: Uri) -> Result<impl IntoResponse> {
    let ideas = state.catalog.load_ideas()?;

    let mut themes = catalog::themes(&ideas);
    themes.truncate(HOME_THEME_COUNT);
    let todays_idea = catalog::todays_idea(&ideas, Local::now().date_naive());

    state.page(
        jar,
        &uri,
        "index",
        json!({
            "ideas": catalog::latest_ideas(&ideas, LATEST_COUNT),
            "themes": themes,
            "todays_idea": todays_idea,
        }),
    )
}

async fn all_ideas(State(state): State<Arc<AppState>>, jar: CookieJar, uri: Uri) -> Result<impl IntoResponse> {
    let ideas = state.catalog.load_ideas()?;
    state.page(jar, &uri, "all_ideas", json!({ "page_title": "All ideas", "ideas": ideas }))
}

async fn idea_detail(
    State(state): State<Arc<AppState>>,
    Path(idea_id): Path<String>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    jar: CookieJar,
    uri: Uri,
) -> Result<impl IntoResponse> {
    let ideas = state.catalog.load_ideas()?;
    let idea = ideas
        .iter()
        .find(|idea| idea.id == idea_id)
        .ok_or_else(|| AppError::NotFound("Idea".to_string()))?;
    let next_idea = catalog::next_in(&ideas, &idea_id);

    let visitor = visitor_fingerprint(&headers, connect_info.map(|ConnectInfo(addr)| addr));
    let today = Local::now().date_naive();
    match state.counters.record_view(&idea.id, &visitor, today) {
        Ok(true) => log::debug!("Counted view of {}", idea.id),
        Ok(false) => {}
        Err(e) => log::warn!("Could not record view of {}: {}", idea.id, e),
    }

    let counts = state.counters.counts(&idea.id).unwrap_or_else(|e| {
        log::warn!("Could not read counters of {}: {}", idea.id, e);
        Counts::default()
    });

    state.page(
        jar,
        &uri,
        "idea",
        json!({
            "page_title": idea.title,
            "idea": idea,
            "next_idea": next_idea,
            "counts": counts,
        }),
    )
}

async fn theme_page(
    State(state): State<Arc<AppState>>,
    Path(theme_name): Path<String>,
    jar: CookieJar,
    uri: Uri,
) -> Result<impl IntoResponse> {
    let ideas = state.catalog.load_ideas()?;
    let filtered = catalog::ideas_in_theme(&ideas, &theme_name);
    state.page(
        jar,
        &uri,
        "theme",
        json!({ "page_title": theme_name, "theme": theme_name, "ideas": filtered }),
    )
}

async fn all_themes(State(state): State<Arc<AppState>>, jar: CookieJar, uri: Uri) -> Result<impl IntoResponse> {
    let ideas = state.catalog.load_ideas()?;
    state.page(
        jar,
        &uri,
        "all_themes",
        json!({ "page_title": "Themes", "themes": catalog::themes(&ideas) }),
    )
}

async fn learn_ai(State(state): State<Arc<AppState>>, jar: CookieJar, uri: Uri) -> Result<impl IntoResponse> {
    let ai_items = state.catalog.load_ai_hacks()?;
    state.page(jar, &uri, "learn_ai", json!({ "page_title": "Learn AI", "ai_items": ai_items }))
}

async fn learn_ai_detail(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    jar: CookieJar,
    uri: Uri,
) -> Result<impl IntoResponse> {
    let hack = state
        .catalog
        .get_ai_hack_by_slug(&slug)?
        .ok_or_else(|| AppError::NotFound("AI hack".to_string()))?;
    let next_hack = state.catalog.next_ai_hack(&slug)?;

    state.page(
        jar,
        &uri,
        "ai_hack",
        json!({ "page_title": hack.title, "hack": hack, "next_hack": next_hack }),
    )
}

async fn workshop(State(state): State<Arc<AppState>>, jar: CookieJar, uri: Uri) -> Result<impl IntoResponse> {
    let key = &state.config.razorpay_key;
    log::debug!(
        "Workshop payment key: length {}, starts with rzp_: {}",
        key.len(),
        key.starts_with("rzp_")
    );
    state.page(jar, &uri, "workshop", json!({ "page_title": "Workshop", "razorpay_key": key }))
}

async fn static_page(
    State(state): State<Arc<AppState>>,
    Path(page): Path<String>,
    jar: CookieJar,
    uri: Uri,
) -> Result<impl IntoResponse> {
    if !STATIC_PAGES.contains(&page.as_str()) {
        return Err(AppError::NotFound("Page".to_string()));
    }
    state.page(jar, &uri, &page, json!({}))
}

// Forms

async fn match_problem(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    uri: Uri,
    Form(form): Form<MatchForm>,
) -> Result<Response> {
    if form.problem.is_empty() {
        return Ok(Redirect::to("/").into_response());
    }

    let query = form.problem.to_lowercase();
    let ideas = state.catalog.load_ideas()?;
    let results: Vec<Idea> = search::match_problem(&ideas, &query)
        .into_iter()
        .map(|scored| scored.idea)
        .collect();
    log::info!("Search '{}' matched {} ideas", query, results.len());

    Ok(state
        .page(
            jar,
            &uri,
            "search_results",
            json!({ "page_title": "Search", "query": query, "ideas": results }),
        )?
        .into_response())
}

async fn subscribe(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<SubscribeForm>,
) -> Result<(CookieJar, Redirect)> {
    let outcome = state.subscribers.subscribe(&form.email)?;

    let (jar, target) = match outcome {
        SubscribeOutcome::Invalid => (
            set_flash(jar, "error", "Please enter a valid email address."),
            "/".to_string(),
        ),
        SubscribeOutcome::AlreadySubscribed => (
            set_flash(
                jar,
                "info",
                "You're already subscribed. If you don't see our emails, check your Spam folder.",
            ),
            "/".to_string(),
        ),
        SubscribeOutcome::Subscribed(email) => {
            mailer::send_welcome_in_background(state.mailer.clone(), email);
            (
                set_flash(
                    jar,
                    "success",
                    "Thanks for subscribing! We've sent you a welcome email. Check your Spam folder if you don't see it.",
                ),
                safe_next(form.next.as_deref()),
            )
        }
    };

    Ok((jar, Redirect::to(&target)))
}

// JSON API

async fn like_idea(State(state): State<Arc<AppState>>, Path(idea_id): Path<String>) -> Result<Json<Value>> {
    let idea = state.require_idea(&idea_id)?;
    let likes = state.counters.record_like(&idea.id)?;
    Ok(Json(json!({ "success": true, "likes": likes })))
}

async fn share_idea(State(state): State<Arc<AppState>>, Path(idea_id): Path<String>) -> Result<Json<Value>> {
    let idea = state.require_idea(&idea_id)?;
    let shares = state.counters.record_share(&idea.id)?;
    Ok(Json(json!({ "success": true, "shares": shares })))
}

async fn idea_stats(State(state): State<Arc<AppState>>, Path(idea_id): Path<String>) -> Result<Json<Value>> {
    let idea = state.require_idea(&idea_id)?;
    let counts = state.counters.counts(&idea.id)?;
    Ok(Json(json!({
        "id": idea.id,
        "views": counts.views,
        "likes": counts.likes,
        "shares": counts.shares,
    })))
}

// Helpers

/// Fingerprint from the first `X-Forwarded-For` hop, falling back to the peer address
pub fn visitor_fingerprint(headers: &HeaderMap, peer: Option<SocketAddr>) -> VisitorFingerprint {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string);

    let ip = forwarded
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string());

    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok());

    VisitorFingerprint::new(&ip, user_agent)
}

/// Redirect target after subscribing; anything but a local path goes home
pub fn safe_next(next: Option<&str>) -> String {
    match next {
        Some(path) if LOCAL_PATH_REGEX.is_match(path) => path.to_string(),
        _ => "/".to_string(),
    }
}

pub fn set_flash(jar: CookieJar, level: &str, message: &str) -> CookieJar {
    let value = urlencoding::encode(&format!("{}|{}", level, message)).into_owned();
    jar.add(Cookie::build((FLASH_COOKIE, value)).path("/"))
}

pub fn take_flash(jar: CookieJar) -> (CookieJar, Option<Flash>) {
    let Some(raw) = jar.get(FLASH_COOKIE).map(|cookie| cookie.value().to_string()) else {
        return (jar, None);
    };

    let flash = urlencoding::decode(&raw)
        .ok()
        .and_then(|raw| {
            raw.split_once('|').map(|(level, message)| Flash {
                level: level.to_string(),
                message: message.to_string(),
            })
        });

    (jar.remove(Cookie::build((FLASH_COOKIE, "")).path("/")), flash)
}
