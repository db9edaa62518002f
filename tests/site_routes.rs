#![cfg(feature = "web")]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use bigpicture::app::{AppState, router};
use bigpicture::catalog::{self, Catalog};
use bigpicture::config::Config;
use bigpicture::engagement::{ContentFileCounters, CounterStore, SqliteCounters};
use bigpicture::error::Result as AppResult;
use bigpicture::mailer::WelcomeMailer;
use chrono::Local;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const IDEAS: &str = include_str!("fixtures/ideas.json");

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<String>>,
}

impl RecordingMailer {
    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl WelcomeMailer for RecordingMailer {
    fn send_welcome(&self, to_email: &str) -> AppResult<()> {
        self.sent.lock().unwrap().push(to_email.to_string());
        Ok(())
    }
}

struct Site {
    dir: TempDir,
    app: Router,
    mailer: Arc<RecordingMailer>,
}

fn site_with(counters: impl FnOnce(&TempDir) -> Arc<dyn CounterStore>) -> Site {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("ideas.json"), IDEAS).unwrap();

    let mailer = Arc::new(RecordingMailer::default());
    let state = AppState::with_parts(
        Config::for_data_dir(dir.path()),
        counters(&dir),
        Some(mailer.clone() as Arc<dyn WelcomeMailer>),
    )
    .unwrap();

    Site {
        app: router(state),
        dir,
        mailer,
    }
}

fn site() -> Site {
    site_with(|_| Arc::new(SqliteCounters::in_memory().unwrap()) as Arc<dyn CounterStore>)
}

impl Site {
    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn post(&self, uri: &str) -> Response {
        self.send(Request::post(uri).body(Body::empty()).unwrap()).await
    }

    async fn post_form(&self, uri: &str, form: &str) -> Response {
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn view(&self, id: &str, ip: &str, user_agent: &str) -> Response {
        self.send(
            Request::get(format!("/idea/{}", id))
                .header("x-forwarded-for", ip)
                .header(header::USER_AGENT, user_agent)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    async fn wait_for_mail(&self, count: usize) -> Vec<String> {
        for _ in 0..100 {
            if self.mailer.sent().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.mailer.sent()
    }
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn location(response: &Response) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

fn flash_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("flash="))
        .map(str::to_string)
}

#[tokio::test]
async fn home_page_features_todays_and_latest_ideas() {
    let site = site();
    let response = site.get("/").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;

    let ideas = Catalog::new(site.dir.path()).load_ideas().unwrap();
    let today = catalog::todays_idea(&ideas, Local::now().date_naive()).unwrap();
    assert!(body.contains(&today.title));

    let inversion = body.find("Inversion").unwrap();
    let deep_work = body.rfind("Deep Work").unwrap();
    let compounding = body.rfind("Compounding").unwrap();
    assert!(inversion < compounding && deep_work < compounding);

    // first three themes only
    assert!(body.contains("/theme/Decisions"));
    assert!(body.contains("/theme/Focus"));
    assert!(body.contains("/theme/Habits"));
    assert!(!body.contains("/theme/Money"));
}

#[tokio::test]
async fn unknown_idea_is_404() {
    let site = site();
    let response = site.get("/idea/nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "Idea not found");
}

#[tokio::test]
async fn idea_page_links_to_next_idea() {
    let site = site();
    let body = body_text(site.get("/idea/inversion").await).await;
    assert!(body.contains("Inversion"));
    assert!(body.contains("Next: Stoic Calm"));
}

#[tokio::test]
async fn views_count_once_per_visitor_per_day() {
    let site = site();

    site.view("stoicism", "1.1.1.1", "Firefox").await;
    site.view("stoicism", "1.1.1.1", "Firefox").await;
    site.view("stoicism", "1.1.1.1", "Safari").await;
    site.view("stoicism", "2.2.2.2", "Firefox").await;

    let stats = body_json(site.get("/api/stats/stoicism").await).await;
    assert_eq!(stats["views"], 3);
    assert_eq!(stats["likes"], 0);
}

#[tokio::test]
async fn likes_and_shares_increase() {
    let site = site();

    let first = body_json(site.post("/api/like/deep-work").await).await;
    let second = body_json(site.post("/api/like/deep-work").await).await;
    let share = body_json(site.post("/api/share/deep-work").await).await;

    assert_eq!(first, serde_json::json!({ "success": true, "likes": 1 }));
    assert_eq!(second["likes"], 2);
    assert_eq!(share, serde_json::json!({ "success": true, "shares": 1 }));
}

#[tokio::test]
async fn engagement_on_unknown_idea_is_404() {
    let site = site();
    assert_eq!(site.post("/api/like/nope").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(site.post("/api/share/nope").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(site.get("/api/stats/nope").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn content_file_backend_writes_counters_into_ideas_json() {
    let site = site_with(|dir| {
        Arc::new(ContentFileCounters::new(dir.path().join("ideas.json"))) as Arc<dyn CounterStore>
    });

    site.post("/api/like/compounding").await;
    site.view("compounding", "3.3.3.3", "ua").await;
    site.view("compounding", "3.3.3.3", "ua").await;

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(site.dir.path().join("ideas.json")).unwrap())
            .unwrap();
    assert_eq!(raw[1]["likes"], 1);
    assert_eq!(raw[1]["views"], 1);
    assert_eq!(raw[0]["image"], "stoa.png");
}

#[tokio::test]
async fn search_ranks_by_relevance() {
    let site = site();
    let response = site.post_form("/match", "problem=FOCUS").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;

    assert!(body.contains("Ideas for \"focus\""));
    let deep_work = body.find("Deep Work").unwrap();
    let stoic = body.find("Stoic Calm").unwrap();
    assert!(deep_work < stoic);
    assert!(!body.contains("Compounding"));
}

#[tokio::test]
async fn empty_search_goes_home() {
    let site = site();
    let response = site.post_form("/match", "problem=").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn subscribing_twice_sends_one_welcome_mail() {
    let site = site();

    let first = site
        .post_form("/subscribe", "email=Reader%40Example.com&next=%2Fidea%2Fstoicism")
        .await;
    assert_eq!(first.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&first), "/idea/stoicism");
    assert!(flash_cookie(&first).unwrap().contains("success"));
    assert_eq!(site.wait_for_mail(1).await, vec!["reader@example.com"]);

    let second = site.post_form("/subscribe", "email=reader%40example.com").await;
    assert_eq!(location(&second), "/");
    assert!(flash_cookie(&second).unwrap().contains("info"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(site.mailer.sent().len(), 1);

    let csv = fs::read_to_string(site.dir.path().join("subscribers.csv")).unwrap();
    assert_eq!(csv.lines().count(), 2);
}

#[tokio::test]
async fn invalid_email_is_rejected() {
    let site = site();
    let response = site.post_form("/subscribe", "email=not-an-email&next=%2Fabout").await;

    assert_eq!(location(&response), "/");
    assert!(flash_cookie(&response).unwrap().contains("error"));
    assert!(!site.dir.path().join("subscribers.csv").exists());
}

#[tokio::test]
async fn addresses_with_row_breaking_characters_are_rejected() {
    let site = site();

    for body in ["email=x%2Cy%40example.com", "email=a%40b.c%0Aevil%2Cx"] {
        for _ in 0..2 {
            let response = site.post_form("/subscribe", body).await;
            assert!(flash_cookie(&response).unwrap().contains("error"));
        }
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(site.mailer.sent().is_empty());
    assert!(!site.dir.path().join("subscribers.csv").exists());
}

#[tokio::test]
async fn subscribe_never_redirects_off_site() {
    let site = site();
    let response = site
        .post_form("/subscribe", "email=a%40b.c&next=https%3A%2F%2Fevil.example")
        .await;
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn flash_message_shows_once() {
    let site = site();
    let response = site
        .send(
            Request::get("/about")
                .header(header::COOKIE, "flash=success%7CThanks%20for%20subscribing")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    let cleared = flash_cookie(&response).unwrap();
    assert!(cleared.starts_with("flash=;"));
    let body = body_text(response).await;
    assert!(body.contains("flash-success"));
    assert!(body.contains("Thanks for subscribing"));
}

#[tokio::test]
async fn theme_pages_filter_by_category() {
    let site = site();
    let body = body_text(site.get("/theme/Mindset").await).await;
    assert!(body.contains("Stoic Calm"));
    assert!(body.contains("Inversion"));
    assert!(!body.contains("Deep Work"));

    let themes = body_text(site.get("/themes").await).await;
    for theme in ["Decisions", "Focus", "Habits", "Mindset", "Money"] {
        assert!(themes.contains(theme));
    }
}

#[tokio::test]
async fn static_pages_render_and_unknown_pages_404() {
    let site = site();
    for page in ["/about", "/resources", "/contact", "/privacy", "/download", "/workshop", "/ideas"] {
        assert_eq!(site.get(page).await.status(), StatusCode::OK, "{}", page);
    }
    assert_eq!(site.get("/nonsense").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn workshop_embeds_payment_key() {
    let site = site();
    let body = body_text(site.get("/workshop").await).await;
    assert!(body.contains("rzp_test_default"));
}

#[tokio::test]
async fn learn_ai_pages() {
    let site = site();
    assert_eq!(site.get("/learn_ai").await.status(), StatusCode::OK);
    assert_eq!(site.get("/learn_ai/missing").await.status(), StatusCode::NOT_FOUND);

    fs::write(
        site.dir.path().join("ai_hacks.json"),
        r#"[{"slug":"prompting","title":"Better Prompts"},{"slug":"agents","title":"Agents"}]"#,
    )
    .unwrap();
    fs::create_dir(site.dir.path().join("ai_hacks")).unwrap();
    fs::write(
        site.dir.path().join("ai_hacks").join("prompting.json"),
        r#"{"slug":"prompting","title":"Better Prompts","steps":["Be specific"]}"#,
    )
    .unwrap();

    let listing = body_text(site.get("/learn_ai").await).await;
    assert!(listing.contains("/learn_ai/prompting"));

    let detail = body_text(site.get("/learn_ai/prompting").await).await;
    assert!(detail.contains("Be specific"));
    assert!(detail.contains("Next: Agents"));
}
