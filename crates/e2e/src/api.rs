//! Client for the Conduit resource API
//!
//! Stateless wrapper around the create/delete calls fixtures need. Every
//! scenario run builds its own client, so no request context is shared
//! between scenarios running in parallel.

use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use conduit_common::{
    Actor, ActorSpec, Comment, ContentItem, ContentItemUpdate, Credentials, HarnessConfig, NewContentItem,
};

use crate::error::{E2eError, E2eResult};

pub const USERS_PATH: &str = "/api/users";
pub const LOGIN_PATH: &str = "/api/users/login";
pub const CURRENT_USER_PATH: &str = "/api/user";
pub const ARTICLES_PATH: &str = "/api/articles";
pub const FEED_PATH: &str = "/api/articles/feed";
pub const PROFILES_PATH: &str = "/api/profiles";

/// Conduit's bearer-style authorization scheme
pub const AUTH_SCHEME: &str = "Token";

pub(crate) fn authorization(token: &str) -> String {
    format!("{} {}", AUTH_SCHEME, token)
}

#[derive(Serialize, Deserialize)]
pub(crate) struct UserEnvelope<T> {
    pub user: T,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct ArticleEnvelope<T> {
    pub article: T,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct ArticleList<T> {
    pub articles: Vec<T>,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct CommentEnvelope<T> {
    pub comment: T,
}

#[derive(Deserialize)]
struct CommentList {
    comments: Vec<Comment>,
}

#[derive(Serialize)]
struct NewComment<'a> {
    body: &'a str,
}

/// Account as echoed back by registration and login
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AccountResponse {
    pub username: String,
    pub email: String,
    pub token: String,
}

/// Result of a delete call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The item was already gone, typically removed by the scenario body
    AlreadyAbsent,
}

/// Client wrapper for the remote resource API
#[derive(Debug, Clone)]
pub struct ResourceClient {
    http: reqwest::Client,
    api_url: String,
    password_seed: String,
}

impl ResourceClient {
    /// Create a client for the configured API
    pub fn new(config: &HarnessConfig) -> E2eResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            password_seed: config.password_seed.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    // Actor operations

    /// Register a new account; 201 is the only accepted status
    pub async fn create_actor(&self, spec: ActorSpec) -> E2eResult<Actor> {
        let credentials = spec.resolve(&self.password_seed);
        debug!("Creating actor {}", credentials.username);

        let response = self
            .http
            .post(self.endpoint(USERS_PATH))
            .json(&UserEnvelope { user: &credentials })
            .send()
            .await?;
        let response = expect_status(response, StatusCode::CREATED, "create actor").await?;
        let account: UserEnvelope<AccountResponse> = response.json().await?;

        Ok(actor_from(account.user, credentials))
    }

    // Content operations

    /// Publish an article as the owner of `token`; 201 is the only accepted status
    pub async fn create_content_item(&self, token: &str, item: &NewContentItem) -> E2eResult<ContentItem> {
        debug!("Creating article '{}'", item.title);

        let response = self
            .http
            .post(self.endpoint(ARTICLES_PATH))
            .header(reqwest::header::AUTHORIZATION, authorization(token))
            .json(&ArticleEnvelope { article: item })
            .send()
            .await?;
        let response = expect_status(response, StatusCode::CREATED, "create article").await?;
        let created: ArticleEnvelope<ContentItem> = response.json().await?;

        debug!("Created article {}", created.article.slug);
        Ok(created.article)
    }

    /// Delete an article by slug.
    ///
    /// 204 and 404 both count as success; anything else is a teardown error.
    pub async fn delete_content_item(&self, token: &str, slug: &str) -> E2eResult<DeleteOutcome> {
        let response = self
            .http
            .delete(self.endpoint(&article_path(slug)))
            .header(reqwest::header::AUTHORIZATION, authorization(token))
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => {
                debug!("Deleted article {}", slug);
                Ok(DeleteOutcome::Deleted)
            }
            StatusCode::NOT_FOUND => {
                debug!("Article {} already absent", slug);
                Ok(DeleteOutcome::AlreadyAbsent)
            }
            status => Err(E2eError::TeardownRequest {
                operation: format!("delete article {}", slug),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    /// Edit an article the owner of `token` wrote.
    ///
    /// Conduit derives the slug from the title, so a new title usually means
    /// a new slug; callers must delete by the returned slug.
    pub async fn update_content_item(
        &self,
        token: &str,
        slug: &str,
        update: &ContentItemUpdate,
    ) -> E2eResult<ContentItem> {
        debug!("Updating article {}", slug);

        let response = self
            .http
            .put(self.endpoint(&article_path(slug)))
            .header(reqwest::header::AUTHORIZATION, authorization(token))
            .json(&ArticleEnvelope { article: update })
            .send()
            .await?;
        let response = expect_success(response, &format!("update article {}", slug)).await?;
        let updated: ArticleEnvelope<ContentItem> = response.json().await?;

        if updated.article.slug != slug {
            debug!("Article {} is now {}", slug, updated.article.slug);
        }
        Ok(updated.article)
    }

    // Comment operations

    /// Comment on an article as the owner of `token`
    pub async fn create_comment(&self, token: &str, slug: &str, body: &str) -> E2eResult<Comment> {
        let response = self
            .http
            .post(self.endpoint(&format!("{}/comments", article_path(slug))))
            .header(reqwest::header::AUTHORIZATION, authorization(token))
            .json(&CommentEnvelope {
                comment: NewComment { body },
            })
            .send()
            .await?;
        let response = expect_success(response, &format!("comment on {}", slug)).await?;
        let created: CommentEnvelope<Comment> = response.json().await?;

        debug!("Created comment {} on {}", created.comment.id, slug);
        Ok(created.comment)
    }

    pub async fn list_comments(&self, slug: &str) -> E2eResult<Vec<Comment>> {
        let response = self
            .http
            .get(self.endpoint(&format!("{}/comments", article_path(slug))))
            .send()
            .await?;
        let response = expect_success(response, &format!("list comments on {}", slug)).await?;
        let found: CommentList = response.json().await?;
        Ok(found.comments)
    }

    /// Delete a comment; a missing comment counts as already absent
    pub async fn delete_comment(&self, token: &str, slug: &str, id: u64) -> E2eResult<DeleteOutcome> {
        let response = self
            .http
            .delete(self.endpoint(&format!("{}/comments/{}", article_path(slug), id)))
            .header(reqwest::header::AUTHORIZATION, authorization(token))
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(DeleteOutcome::Deleted),
            StatusCode::NOT_FOUND => Ok(DeleteOutcome::AlreadyAbsent),
            status => Err(E2eError::UnexpectedStatus {
                operation: format!("delete comment {} on {}", id, slug),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    /// Look an article up by slug; `None` when the service reports 404
    pub async fn fetch_content_item(&self, slug: &str) -> E2eResult<Option<ContentItem>> {
        let response = self
            .http
            .get(self.endpoint(&article_path(slug)))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = expect_status(response, StatusCode::OK, "fetch article").await?;
        let found: ArticleEnvelope<ContentItem> = response.json().await?;
        Ok(Some(found.article))
    }
}

pub(crate) fn article_path(slug: &str) -> String {
    format!("{}/{}", ARTICLES_PATH, slug)
}

fn actor_from(account: AccountResponse, credentials: Credentials) -> Actor {
    Actor {
        username: account.username,
        email: account.email,
        password: credentials.password,
        token: account.token,
    }
}

/// Pass the response through when it carries `expected`, otherwise turn it
/// into a provisioning error with the body attached
pub(crate) async fn expect_status(
    response: Response,
    expected: StatusCode,
    operation: &str,
) -> E2eResult<Response> {
    if response.status() == expected {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(E2eError::Provisioning {
        operation: operation.to_string(),
        status,
        expected: expected.as_u16(),
        body,
    })
}

/// Pass any 2xx response through; otherwise fail with the body attached
pub(crate) async fn expect_success(response: Response, operation: &str) -> E2eResult<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(E2eError::UnexpectedStatus {
        operation: operation.to_string(),
        status,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_header() {
        assert_eq!(authorization("abc"), "Token abc");
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = HarnessConfig {
            api_url: "http://localhost:8000/".to_string(),
            ..Default::default()
        };
        let client = ResourceClient::new(&config).unwrap();
        assert_eq!(client.endpoint(USERS_PATH), "http://localhost:8000/api/users");
        assert_eq!(
            client.endpoint(&format!("{}/comments/3", article_path("hello-1"))),
            "http://localhost:8000/api/articles/hello-1/comments/3"
        );
    }

    #[test]
    fn test_registration_payload_shape() {
        let credentials = Credentials {
            username: "u".into(),
            email: "u@example.com".into(),
            password: "p".into(),
        };
        let json = serde_json::to_value(UserEnvelope { user: &credentials }).unwrap();
        assert_eq!(json["user"]["email"], "u@example.com");
    }

    #[test]
    fn test_comment_payload_shape() {
        let json = serde_json::to_value(CommentEnvelope {
            comment: NewComment { body: "nice" },
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "comment": { "body": "nice" } }));
    }
}
