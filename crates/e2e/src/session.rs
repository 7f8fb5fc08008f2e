//! Isolated interaction sessions
//!
//! A session stands in for one browser context: its own HTTP client with its
//! own cookie jar, its own key/value storage (where the front end keeps the
//! `jwtToken`), and its own navigation state. Nothing is shared between two
//! sessions, so actor A can never observe actor B's authentication.

use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use conduit_common::{Actor, ContentItem, HarnessConfig, NewContentItem};

use crate::api::{
    authorization, expect_success, AccountResponse, ArticleEnvelope, ArticleList, UserEnvelope, ARTICLES_PATH,
    CURRENT_USER_PATH, FEED_PATH, LOGIN_PATH, PROFILES_PATH,
};
use crate::error::{E2eError, E2eResult};

/// Storage slot the front end reads the auth token from
pub const TOKEN_STORAGE_KEY: &str = "jwtToken";

/// Identity a session is currently authenticated as
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub username: String,
    pub email: String,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// State that outlives the `Session` value so the factory can close it
#[derive(Debug)]
struct SessionState {
    id: String,
    closed: AtomicBool,
    storage: Mutex<HashMap<String, String>>,
}

impl SessionState {
    fn close(&self) -> bool {
        let was_open = !self.closed.swap(true, Ordering::SeqCst);
        self.storage.lock().clear();
        was_open
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Produces independent sessions and remembers them for cleanup
#[derive(Debug, Clone)]
pub struct SessionFactory {
    base_url: String,
    api_url: String,
    timeout: Duration,
    opened: Arc<Mutex<Vec<Arc<SessionState>>>>,
}

impl SessionFactory {
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            timeout: config.request_timeout(),
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Open a session with empty cookie and storage state
    pub fn new_session(&self) -> E2eResult<Session> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(self.timeout)
            .build()?;

        let state = Arc::new(SessionState {
            id: uuid::Uuid::new_v4().to_string(),
            closed: AtomicBool::new(false),
            storage: Mutex::new(HashMap::new()),
        });
        self.opened.lock().push(state.clone());
        debug!("Opened session {}", state.id);

        Ok(Session {
            state,
            http,
            base_url: self.base_url.clone(),
            api_url: self.api_url.clone(),
            current_url: None,
        })
    }

    /// Open a session already signed in as `actor`
    pub async fn session_for(&self, actor: &Actor) -> E2eResult<Session> {
        let mut session = self.new_session()?;
        session.sign_in(&actor.email, &actor.password).await?;
        Ok(session)
    }

    /// Number of sessions opened so far, closed ones included
    pub fn opened_count(&self) -> usize {
        self.opened.lock().len()
    }

    /// Number of sessions still open
    pub fn open_count(&self) -> usize {
        self.opened.lock().iter().filter(|s| !s.is_closed()).count()
    }

    /// Close every session opened after the first `mark` ones, newest first.
    /// Returns how many were still open.
    pub fn close_opened_since(&self, mark: usize) -> usize {
        let opened = self.opened.lock();
        let closed = opened
            .iter()
            .skip(mark)
            .rev()
            .filter(|state| state.close())
            .count();
        if closed > 0 {
            info!("Closed {} session(s)", closed);
        }
        closed
    }

    /// Close every session this factory opened
    pub fn close_all(&self) -> usize {
        self.close_opened_since(0)
    }
}

/// One actor's isolated interaction channel.
///
/// Mutating operations take `&mut self`, so a session's own actions are
/// always issued one after another.
#[derive(Debug)]
pub struct Session {
    state: Arc<SessionState>,
    http: reqwest::Client,
    base_url: String,
    api_url: String,
    current_url: Option<Url>,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.state.id
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    pub fn current_url(&self) -> Option<&Url> {
        self.current_url.as_ref()
    }

    pub fn storage_item(&self, key: &str) -> Option<String> {
        self.state.storage.lock().get(key).cloned()
    }

    pub fn set_storage_item(&mut self, key: &str, value: &str) -> E2eResult<()> {
        self.ensure_open()?;
        self.state.storage.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn ensure_open(&self) -> E2eResult<()> {
        if self.is_closed() {
            return Err(E2eError::SessionClosed(self.state.id.clone()));
        }
        Ok(())
    }

    /// Load a front-end path and return the status code
    pub async fn navigate(&mut self, path: &str) -> E2eResult<u16> {
        self.ensure_open()?;
        let target = Url::parse(&format!("{}/{}", self.base_url, path.trim_start_matches('/')))?;
        debug!("Session {} navigating to {}", self.state.id, target);

        let response = self.http.get(target.clone()).send().await?;
        let status = response.status().as_u16();
        self.current_url = Some(response.url().clone());
        Ok(status)
    }

    /// Sign in with credentials and keep the token in session storage
    pub async fn sign_in(&mut self, email: &str, password: &str) -> E2eResult<SessionUser> {
        self.ensure_open()?;

        let response = self
            .http
            .post(format!("{}{}", self.api_url, LOGIN_PATH))
            .json(&UserEnvelope {
                user: LoginRequest { email, password },
            })
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(E2eError::Authentication {
                email: email.to_string(),
                status: response.status().as_u16(),
            });
        }

        let account: UserEnvelope<AccountResponse> = response.json().await?;
        self.set_storage_item(TOKEN_STORAGE_KEY, &account.user.token)?;
        info!("Session {} signed in as {}", self.state.id, account.user.username);

        Ok(SessionUser {
            username: account.user.username,
            email: account.user.email,
        })
    }

    /// Forget the stored token
    pub fn sign_out(&mut self) -> E2eResult<()> {
        self.ensure_open()?;
        self.state.storage.lock().remove(TOKEN_STORAGE_KEY);
        Ok(())
    }

    /// Ask the service who this session is authenticated as
    pub async fn current_user(&self) -> E2eResult<Option<SessionUser>> {
        self.ensure_open()?;
        let Some(token) = self.storage_item(TOKEN_STORAGE_KEY) else {
            return Ok(None);
        };

        let response = self
            .http
            .get(format!("{}{}", self.api_url, CURRENT_USER_PATH))
            .header(reqwest::header::AUTHORIZATION, authorization(&token))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let account: UserEnvelope<AccountResponse> = response.json().await?;
                Ok(Some(SessionUser {
                    username: account.user.username,
                    email: account.user.email,
                }))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status => Err(E2eError::Authentication {
                email: String::new(),
                status: status.as_u16(),
            }),
        }
    }

    fn token(&self) -> E2eResult<String> {
        self.ensure_open()?;
        self.storage_item(TOKEN_STORAGE_KEY)
            .ok_or_else(|| E2eError::NotSignedIn(self.state.id.clone()))
    }

    /// Follow another author as the signed-in user
    pub async fn follow(&mut self, username: &str) -> E2eResult<()> {
        let token = self.token()?;
        let response = self
            .http
            .post(format!("{}{}/{}/follow", self.api_url, PROFILES_PATH, username))
            .header(reqwest::header::AUTHORIZATION, authorization(&token))
            .send()
            .await?;
        expect_success(response, &format!("follow {}", username)).await?;

        debug!("Session {} follows {}", self.state.id, username);
        Ok(())
    }

    /// Articles by the authors this session's user follows, newest first
    pub async fn feed(&self) -> E2eResult<Vec<ContentItem>> {
        let token = self.token()?;
        let response = self
            .http
            .get(format!("{}{}", self.api_url, FEED_PATH))
            .header(reqwest::header::AUTHORIZATION, authorization(&token))
            .send()
            .await?;
        let response = expect_success(response, "load feed").await?;
        let feed: ArticleList<ContentItem> = response.json().await?;
        Ok(feed.articles)
    }

    /// Publish an article as the signed-in user. The caller owns it.
    pub async fn publish(&mut self, item: &NewContentItem) -> E2eResult<ContentItem> {
        let token = self.token()?;
        let response = self
            .http
            .post(format!("{}{}", self.api_url, ARTICLES_PATH))
            .header(reqwest::header::AUTHORIZATION, authorization(&token))
            .json(&ArticleEnvelope { article: item })
            .send()
            .await?;
        let response = expect_success(response, "publish article").await?;
        let created: ArticleEnvelope<ContentItem> = response.json().await?;

        info!("Session {} published {}", self.state.id, created.article.slug);
        Ok(created.article)
    }

    /// Close the session; later operations fail with `SessionClosed`
    pub fn close(self) {
        if self.state.close() {
            debug!("Closed session {}", self.state.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> SessionFactory {
        SessionFactory::new(&HarnessConfig::default())
    }

    #[test]
    fn test_sessions_have_separate_storage() {
        let factory = factory();
        let mut a = factory.new_session().unwrap();
        let b = factory.new_session().unwrap();

        a.set_storage_item(TOKEN_STORAGE_KEY, "token-a").unwrap();
        assert_eq!(a.storage_item(TOKEN_STORAGE_KEY).as_deref(), Some("token-a"));
        assert_eq!(b.storage_item(TOKEN_STORAGE_KEY), None);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_close_since_mark_only_closes_newer_sessions() {
        let factory = factory();
        let early = factory.new_session().unwrap();
        let mark = factory.opened_count();
        let late = factory.new_session().unwrap();

        assert_eq!(factory.close_opened_since(mark), 1);
        assert!(!early.is_closed());
        assert!(late.is_closed());
        assert_eq!(factory.open_count(), 1);

        assert_eq!(factory.close_all(), 1);
        assert!(early.is_closed());
    }

    #[tokio::test]
    async fn test_closed_session_rejects_operations() {
        let factory = factory();
        let mut session = factory.new_session().unwrap();
        session.set_storage_item(TOKEN_STORAGE_KEY, "t").unwrap();
        factory.close_all();

        assert_eq!(session.storage_item(TOKEN_STORAGE_KEY), None);
        assert!(matches!(session.navigate("/").await, Err(E2eError::SessionClosed(_))));
        assert!(matches!(session.sign_out(), Err(E2eError::SessionClosed(_))));
        assert!(matches!(session.feed().await, Err(E2eError::SessionClosed(_))));
    }

    #[tokio::test]
    async fn test_authenticated_actions_need_sign_in() {
        let mut session = factory().new_session().unwrap();

        assert!(matches!(session.feed().await, Err(E2eError::NotSignedIn(_))));
        assert!(matches!(session.follow("bob").await, Err(E2eError::NotSignedIn(_))));
        let draft = NewContentItem::new("t", "d", "b");
        assert!(matches!(session.publish(&draft).await, Err(E2eError::NotSignedIn(_))));
    }
}
