//! Core types for Conduit test data
//!
//! These are the values fixtures hand to scenario bodies. They are plain
//! data: once provisioned nothing mutates them, so they can be shared across
//! every requester within a scenario.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::data;

/// A provisioned identity on the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub username: String,
    pub email: String,
    /// Plain-text password, kept so sessions can sign in through the UI flow
    pub password: String,
    pub token: String,
}

/// Hints used when creating an actor. Unset fields are generated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorSpec {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl ActorSpec {
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Fill in the missing hints.
    ///
    /// Usernames default to `user_<nanoid>`, emails to `<username>@example.com`
    /// and passwords to `<seed>_<nanoid>`.
    pub fn resolve(&self, password_seed: &str) -> Credentials {
        let username = self.username.clone().unwrap_or_else(data::unique_username);
        let email = self
            .email
            .clone()
            .unwrap_or_else(|| format!("{}@example.com", username));
        let password = self
            .password
            .clone()
            .unwrap_or_else(|| format!("{}_{}", password_seed, data::nanoid(8)));

        Credentials {
            username,
            email,
            password,
        }
    }
}

/// Fully resolved account credentials, as sent to the registration endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Weak reference to an article author (lookup only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRef {
    pub username: String,
    /// Conduit profiles do not always echo the email back
    #[serde(default)]
    pub email: Option<String>,
}

/// An article as returned by the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub title: String,
    pub description: String,
    pub body: String,
    #[serde(rename = "tagList", default)]
    pub tags: BTreeSet<String>,
    pub author: AuthorRef,
    /// Server-assigned unique identifier, used for deletion
    pub slug: String,
}

/// Payload for creating an article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContentItem {
    pub title: String,
    pub description: String,
    pub body: String,
    #[serde(rename = "tagList")]
    pub tags: Vec<String>,
}

impl NewContentItem {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            body: body.into(),
            tags: Vec::new(),
        }
    }

    /// Randomized article; `label` ends up in the title so leaked records
    /// can be traced back to the fixture that created them.
    pub fn generated(label: &str) -> Self {
        Self {
            title: format!("AT - {} - {} - {}", label, data::sentence(6), data::nanoid(8)),
            description: format!("{} - {}", data::sentence(8), data::nanoid(8)),
            body: format!("{} - {}", data::paragraphs(3), data::nanoid(8)),
            tags: vec!["generated".to_string(), "playwright".to_string()],
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Partial article edit; unset fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItemUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(rename = "tagList", default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl ContentItemUpdate {
    /// Replace every field with the values of `item`
    pub fn replacing_with(item: &NewContentItem) -> Self {
        Self {
            title: Some(item.title.clone()),
            description: Some(item.description.clone()),
            body: Some(item.body.clone()),
            tags: Some(item.tags.clone()),
        }
    }
}

/// A comment on an article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub body: String,
    pub author: AuthorRef,
}

/// An actor together with one article they own
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorWithContent {
    pub actor: Actor,
    pub article: ContentItem,
}

/// Two independent actors, each owning one article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwoActorContext {
    pub first: ActorWithContent,
    pub second: ActorWithContent,
}

impl TwoActorContext {
    /// Both members, first then second
    pub fn members(&self) -> [&ActorWithContent; 2] {
        [&self.first, &self.second]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_spec_defaults() {
        let creds = ActorSpec::default().resolve("seed");
        assert!(creds.username.starts_with("user_"));
        assert_eq!(creds.email, format!("{}@example.com", creds.username));
        assert!(creds.password.starts_with("seed_"));
        assert_eq!(creds.password.len(), "seed_".len() + 8);
    }

    #[test]
    fn test_actor_spec_hints_are_kept() {
        let creds = ActorSpec::default()
            .with_username("alice")
            .with_password("hunter2")
            .resolve("seed");
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.email, "alice@example.com");
        assert_eq!(creds.password, "hunter2");
    }

    #[test]
    fn test_content_item_wire_format() {
        let json = r#"{
            "slug": "hello-1",
            "title": "Hello",
            "description": "d",
            "body": "b",
            "tagList": ["b", "a", "a"],
            "author": { "username": "alice", "bio": null, "following": false }
        }"#;
        let item: ContentItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.slug, "hello-1");
        assert_eq!(item.tags.len(), 2);
        assert_eq!(item.author.email, None);
    }

    #[test]
    fn test_update_sends_only_set_fields() {
        let update = ContentItemUpdate {
            title: Some("Renamed".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({ "title": "Renamed" }));

        let full = ContentItemUpdate::replacing_with(&NewContentItem::new("t", "d", "b").with_tags(["x"]));
        let json = serde_json::to_value(&full).unwrap();
        assert_eq!(json["tagList"], serde_json::json!(["x"]));
    }

    #[test]
    fn test_generated_article() {
        let item = NewContentItem::generated("random");
        assert!(item.title.starts_with("AT - random - "));
        assert_eq!(item.tags, vec!["generated", "playwright"]);

        let json = serde_json::to_value(&item).unwrap();
        assert!(json.get("tagList").is_some());
    }
}
