//! In-process fake of the Conduit API for integration tests

#![allow(dead_code)]

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

use conduit_common::HarnessConfig;

#[derive(Debug, Clone)]
struct User {
    username: String,
    email: String,
    password: String,
    token: String,
}

#[derive(Debug, Clone)]
struct Article {
    slug: String,
    title: String,
    description: String,
    body: String,
    tags: Vec<String>,
    author: String,
}

#[derive(Debug, Clone)]
struct Comment {
    id: u64,
    body: String,
    author: String,
}

/// Injected failures
#[derive(Debug, Default, Clone, Copy)]
pub struct Faults {
    /// Article creations allowed before the service answers 422
    pub article_creates_before_failure: Option<usize>,
    /// Deletes answer 500 without deleting
    pub fail_deletes: bool,
}

/// Counters for what the fake has seen
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    pub users_created: usize,
    pub articles_created: usize,
    pub articles_deleted: usize,
    pub deletes_not_found: usize,
    pub articles_updated: usize,
    pub comments_created: usize,
    pub comments_deleted: usize,
}

#[derive(Debug, Default)]
struct FakeState {
    users: HashMap<String, User>,
    articles: HashMap<String, Article>,
    /// follower username -> followed usernames
    follows: HashMap<String, HashSet<String>>,
    comments: HashMap<String, Vec<Comment>>,
    next_id: usize,
    faults: Faults,
    counters: Counters,
}

impl FakeState {
    fn user_by_token(&self, headers: &HeaderMap) -> Option<User> {
        let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
        let token = value.strip_prefix("Token ")?;
        self.users.values().find(|u| u.token == token).cloned()
    }

    fn author_json(&self, username: &str) -> Value {
        let email = self.users.values().find(|u| u.username == username).map(|u| u.email.clone());
        json!({ "username": username, "email": email })
    }

    fn article_fields(&self, article: &Article) -> Value {
        json!({
            "slug": article.slug,
            "title": article.title,
            "description": article.description,
            "body": article.body,
            "tagList": article.tags,
            "author": self.author_json(&article.author),
        })
    }

    fn article_json(&self, article: &Article) -> Value {
        json!({ "article": self.article_fields(article) })
    }

    fn comment_json(&self, comment: &Comment) -> Value {
        json!({ "id": comment.id, "body": comment.body, "author": self.author_json(&comment.author) })
    }

    fn slug_for(&mut self, title: &str) -> String {
        self.next_id += 1;
        let words: Vec<_> = title
            .to_lowercase()
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(String::from)
            .collect();
        format!("{}-{}", words.join("-"), self.next_id)
    }
}

fn tag_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()
        .map(|tags| tags.iter().filter_map(|t| t.as_str().map(String::from)).collect())
}

type Shared = Arc<Mutex<FakeState>>;

fn user_json(user: &User) -> Value {
    json!({ "user": { "username": user.username, "email": user.email, "token": user.token } })
}

fn unprocessable(message: &str) -> Response {
    (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "errors": { "body": [message] } }))).into_response()
}

async fn register(State(state): State<Shared>, Json(payload): Json<Value>) -> Response {
    let user = &payload["user"];
    let (Some(username), Some(email), Some(password)) = (
        user["username"].as_str(),
        user["email"].as_str(),
        user["password"].as_str(),
    ) else {
        return unprocessable("username, email and password are required");
    };

    let mut state = state.lock();
    if state.users.contains_key(email) || state.users.values().any(|u| u.username == username) {
        return unprocessable("has already been taken");
    }
    state.next_id += 1;
    let user = User {
        username: username.to_string(),
        email: email.to_string(),
        password: password.to_string(),
        token: format!("token-{}-{}", state.next_id, username),
    };
    state.users.insert(user.email.clone(), user.clone());
    state.counters.users_created += 1;
    (StatusCode::CREATED, Json(user_json(&user))).into_response()
}

async fn login(State(state): State<Shared>, Json(payload): Json<Value>) -> Response {
    let email = payload["user"]["email"].as_str().unwrap_or_default();
    let password = payload["user"]["password"].as_str().unwrap_or_default();

    let state = state.lock();
    match state.users.get(email) {
        Some(user) if user.password == password => Json(user_json(user)).into_response(),
        _ => unprocessable("email or password is invalid"),
    }
}

async fn current_user(State(state): State<Shared>, headers: HeaderMap) -> Response {
    match state.lock().user_by_token(&headers) {
        Some(user) => Json(user_json(&user)).into_response(),
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn create_article(State(state): State<Shared>, headers: HeaderMap, Json(payload): Json<Value>) -> Response {
    let mut state = state.lock();
    let Some(author) = state.user_by_token(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    if let Some(remaining) = state.faults.article_creates_before_failure.as_mut() {
        if *remaining == 0 {
            return unprocessable("article rejected");
        }
        *remaining -= 1;
    }

    let draft = &payload["article"];
    let title = draft["title"].as_str().unwrap_or_default().to_string();
    let slug = state.slug_for(&title);
    let article = Article {
        slug: slug.clone(),
        title,
        description: draft["description"].as_str().unwrap_or_default().to_string(),
        body: draft["body"].as_str().unwrap_or_default().to_string(),
        tags: tag_list(&draft["tagList"]).unwrap_or_default(),
        author: author.username,
    };

    let body = state.article_json(&article);
    state.articles.insert(slug, article);
    state.counters.articles_created += 1;
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn get_article(State(state): State<Shared>, Path(slug): Path<String>) -> Response {
    let state = state.lock();
    match state.articles.get(&slug) {
        Some(article) => Json(state.article_json(article)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn delete_article(State(state): State<Shared>, headers: HeaderMap, Path(slug): Path<String>) -> Response {
    let mut state = state.lock();
    let Some(caller) = state.user_by_token(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    if state.faults.fail_deletes {
        return (StatusCode::INTERNAL_SERVER_ERROR, "database unavailable").into_response();
    }
    match state.articles.get(&slug) {
        None => {
            state.counters.deletes_not_found += 1;
            StatusCode::NOT_FOUND.into_response()
        }
        Some(article) if article.author != caller.username => StatusCode::FORBIDDEN.into_response(),
        Some(_) => {
            state.articles.remove(&slug);
            state.comments.remove(&slug);
            state.counters.articles_deleted += 1;
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

/// Like Conduit, a changed title moves the article to a new slug
async fn update_article(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    Json(payload): Json<Value>,
) -> Response {
    let mut state = state.lock();
    let Some(caller) = state.user_by_token(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let Some(mut article) = state.articles.get(&slug).cloned() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if article.author != caller.username {
        return StatusCode::FORBIDDEN.into_response();
    }

    let edit = &payload["article"];
    if let Some(title) = edit["title"].as_str() {
        if title != article.title {
            article.title = title.to_string();
            article.slug = state.slug_for(title);
        }
    }
    if let Some(description) = edit["description"].as_str() {
        article.description = description.to_string();
    }
    if let Some(body) = edit["body"].as_str() {
        article.body = body.to_string();
    }
    if let Some(tags) = tag_list(&edit["tagList"]) {
        article.tags = tags;
    }

    state.articles.remove(&slug);
    if let Some(comments) = state.comments.remove(&slug) {
        state.comments.insert(article.slug.clone(), comments);
    }
    let body = state.article_json(&article);
    state.articles.insert(article.slug.clone(), article);
    state.counters.articles_updated += 1;
    Json(body).into_response()
}

async fn follow(State(state): State<Shared>, headers: HeaderMap, Path(username): Path<String>) -> Response {
    let mut state = state.lock();
    let Some(caller) = state.user_by_token(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    if !state.users.values().any(|u| u.username == username) {
        return StatusCode::NOT_FOUND.into_response();
    }
    state.follows.entry(caller.username).or_default().insert(username.clone());
    Json(json!({ "profile": { "username": username, "following": true } })).into_response()
}

async fn feed(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let state = state.lock();
    let Some(caller) = state.user_by_token(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let followed = state.follows.get(&caller.username).cloned().unwrap_or_default();
    let articles: Vec<Value> = state
        .articles
        .values()
        .filter(|a| followed.contains(&a.author))
        .map(|a| state.article_fields(a))
        .collect();
    Json(json!({ "articlesCount": articles.len(), "articles": articles })).into_response()
}

async fn add_comment(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    Json(payload): Json<Value>,
) -> Response {
    let mut state = state.lock();
    let Some(caller) = state.user_by_token(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    if !state.articles.contains_key(&slug) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let Some(body) = payload["comment"]["body"].as_str() else {
        return unprocessable("body is required");
    };

    state.next_id += 1;
    let comment = Comment {
        id: state.next_id as u64,
        body: body.to_string(),
        author: caller.username,
    };
    let json = json!({ "comment": state.comment_json(&comment) });
    state.comments.entry(slug).or_default().push(comment);
    state.counters.comments_created += 1;
    Json(json).into_response()
}

async fn list_comments(State(state): State<Shared>, Path(slug): Path<String>) -> Response {
    let state = state.lock();
    if !state.articles.contains_key(&slug) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let comments: Vec<Value> = state
        .comments
        .get(&slug)
        .map(|list| list.iter().map(|c| state.comment_json(c)).collect())
        .unwrap_or_default();
    Json(json!({ "comments": comments })).into_response()
}

async fn delete_comment(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((slug, id)): Path<(String, u64)>,
) -> Response {
    let mut state = state.lock();
    let Some(caller) = state.user_by_token(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let Some(list) = state.comments.get_mut(&slug) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(pos) = list.iter().position(|c| c.id == id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if list[pos].author != caller.username {
        return StatusCode::FORBIDDEN.into_response();
    }
    list.remove(pos);
    state.counters.comments_deleted += 1;
    StatusCode::OK.into_response()
}

async fn frontend() -> Html<&'static str> {
    Html("<!doctype html><html><body><div id=\"root\">Conduit</div></body></html>")
}

/// A running fake Conduit backend, stopped on drop
pub struct FakeConduit {
    pub addr: SocketAddr,
    state: Shared,
    handle: JoinHandle<()>,
}

impl FakeConduit {
    pub async fn start() -> Self {
        let state: Shared = Arc::default();
        let app = Router::new()
            .route("/api/users", post(register))
            .route("/api/users/login", post(login))
            .route("/api/user", get(current_user))
            .route("/api/articles", post(create_article))
            .route("/api/articles/feed", get(feed))
            .route(
                "/api/articles/:slug",
                get(get_article).put(update_article).delete(delete_article),
            )
            .route("/api/articles/:slug/comments", get(list_comments).post(add_comment))
            .route("/api/articles/:slug/comments/:id", delete(delete_comment))
            .route("/api/profiles/:username/follow", post(follow))
            .fallback(frontend)
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state, handle }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Harness configuration pointing both API and front end at the fake
    pub fn config(&self) -> HarnessConfig {
        HarnessConfig {
            api_url: self.url(),
            base_url: self.url(),
            request_timeout_secs: 5,
            ..HarnessConfig::default()
        }
    }

    pub fn set_faults(&self, faults: Faults) {
        self.state.lock().faults = faults;
    }

    pub fn counters(&self) -> Counters {
        self.state.lock().counters
    }

    pub fn article_count(&self) -> usize {
        self.state.lock().articles.len()
    }

    pub fn has_article(&self, slug: &str) -> bool {
        self.state.lock().articles.contains_key(slug)
    }

    pub fn comment_count(&self, slug: &str) -> usize {
        self.state.lock().comments.get(slug).map_or(0, Vec::len)
    }
}

impl Drop for FakeConduit {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
