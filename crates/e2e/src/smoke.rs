//! Smoke scenarios for a live Conduit deployment
//!
//! These exercise the standard fixtures end to end: accounts, articles,
//! comments, and two actors working side by side in separate sessions.

use anyhow::{ensure, Context};

use conduit_common::{data, Actor, ActorSpec, ActorWithContent, ContentItemUpdate, NewContentItem, TwoActorContext};

use crate::api::DeleteOutcome;
use crate::catalog::{NEW_USER, TWO_USERS_SETUP, USER_WITH_RANDOM_ARTICLE};
use crate::error::E2eError;
use crate::runner::Scenario;
use crate::session::TOKEN_STORAGE_KEY;

/// All smoke scenarios, in a stable order
pub fn smoke_scenarios() -> Vec<Scenario> {
    vec![
        sign_up_and_sign_in(),
        invalid_credentials_rejected(),
        log_out(),
        create_article(),
        edit_existing_article(),
        delete_existing_article(),
        comment_on_article(),
        two_actors_stay_isolated(),
        followed_author_in_feed(),
    ]
}

fn sign_up_and_sign_in() -> Scenario {
    Scenario::new("sign up and sign in with a new user", |fixtures| async move {
        let username = format!("AT_user_{}", data::nanoid(10));
        let spec = ActorSpec::default().with_username(username.clone());
        let actor = fixtures.api().create_actor(spec).await?;
        ensure!(actor.username == username, "server renamed {} to {}", username, actor.username);

        let mut session = fixtures.sessions().new_session()?;
        let signed_in = session.sign_in(&actor.email, &actor.password).await?;
        ensure!(signed_in.email == actor.email);

        let current = session
            .current_user()
            .await?
            .context("session lost its identity after sign-in")?;
        ensure!(current.username == username);
        ensure!(current.email == actor.email);
        Ok(())
    })
    .with_tags(["auth"])
}

fn invalid_credentials_rejected() -> Scenario {
    Scenario::new("login with invalid credentials fails", |fixtures| async move {
        let actor = fixtures.get::<Actor>(NEW_USER)?;
        let mut session = fixtures.sessions().new_session()?;

        for (email, password) in [
            ("invalidemail@example.com", actor.password.as_str()),
            (actor.email.as_str(), "wrongpassword"),
        ] {
            match session.sign_in(email, password).await {
                Err(E2eError::Authentication { .. }) => {}
                other => anyhow::bail!("login as {} should be rejected, got {:?}", email, other),
            }
        }
        ensure!(session.storage_item(TOKEN_STORAGE_KEY).is_none());
        Ok(())
    })
    .with_fixtures([NEW_USER])
    .with_tags(["auth"])
}

fn log_out() -> Scenario {
    Scenario::new("log out clears the session", |fixtures| async move {
        let actor = fixtures.get::<Actor>(NEW_USER)?;
        let mut session = fixtures.sessions().session_for(&actor).await?;
        ensure!(session.current_user().await?.is_some());

        session.sign_out()?;
        ensure!(session.current_user().await?.is_none(), "still signed in after logout");
        Ok(())
    })
    .with_fixtures([NEW_USER])
    .with_tags(["auth"])
}

fn create_article() -> Scenario {
    Scenario::new("create a new article", |fixtures| async move {
        let actor = fixtures.get::<Actor>(NEW_USER)?;
        let draft = NewContentItem::generated("created").with_tags(["test", "playwright", "article"]);

        let created = fixtures.api().create_content_item(&actor.token, &draft).await?;
        let fetched = fixtures.api().fetch_content_item(&created.slug).await;

        // The body owns what it creates
        let cleanup = fixtures.api().delete_content_item(&actor.token, &created.slug).await;

        let fetched = fetched?.context("new article is not retrievable")?;
        ensure!(fetched.title == draft.title);
        ensure!(fetched.body == draft.body);
        ensure!(fetched.author.username == actor.username);
        for tag in &draft.tags {
            ensure!(fetched.tags.contains(tag), "tag {} missing", tag);
        }
        cleanup?;
        Ok(())
    })
    .with_fixtures([NEW_USER])
    .with_tags(["articles"])
}

fn edit_existing_article() -> Scenario {
    Scenario::new("edit an existing article", |fixtures| async move {
        let owned = fixtures.get::<ActorWithContent>(USER_WITH_RANDOM_ARTICLE)?;
        let token = &owned.actor.token;
        let revised = NewContentItem::generated("edited").with_tags(["test", "playwright", "edited"]);

        let updated = fixtures
            .api()
            .update_content_item(token, &owned.article.slug, &ContentItemUpdate::replacing_with(&revised))
            .await?;
        let fetched = fixtures.api().fetch_content_item(&updated.slug).await;

        // A new title moves the article to a new slug the fixture does not know
        let cleanup = if updated.slug != owned.article.slug {
            Some(fixtures.api().delete_content_item(token, &updated.slug).await)
        } else {
            None
        };

        let fetched = fetched?.context("edited article is not retrievable")?;
        ensure!(fetched.title == revised.title, "title not updated");
        ensure!(fetched.description == revised.description);
        ensure!(fetched.body == revised.body);
        ensure!(fetched.tags.contains("edited"), "tag edited missing");
        ensure!(fetched.author.username == owned.actor.username);
        cleanup.transpose()?;
        Ok(())
    })
    .with_fixtures([USER_WITH_RANDOM_ARTICLE])
    .with_tags(["articles"])
}

fn delete_existing_article() -> Scenario {
    Scenario::new("delete an existing article", |fixtures| async move {
        let owned = fixtures.get::<ActorWithContent>(USER_WITH_RANDOM_ARTICLE)?;
        let slug = &owned.article.slug;

        let outcome = fixtures.api().delete_content_item(&owned.actor.token, slug).await?;
        ensure!(outcome == DeleteOutcome::Deleted);
        ensure!(
            fixtures.api().fetch_content_item(slug).await?.is_none(),
            "deleted article {} is still served",
            slug
        );
        Ok(())
    })
    .with_fixtures([USER_WITH_RANDOM_ARTICLE])
    .with_tags(["articles"])
}

fn comment_on_article() -> Scenario {
    Scenario::new("add a comment to an article", |fixtures| async move {
        let owned = fixtures.get::<ActorWithContent>(USER_WITH_RANDOM_ARTICLE)?;
        let (token, slug) = (&owned.actor.token, &owned.article.slug);
        let text = format!("{} - {}", data::sentence(8), data::nanoid(8));

        let comment = fixtures.api().create_comment(token, slug, &text).await?;
        ensure!(comment.body == text);
        ensure!(comment.author.username == owned.actor.username);

        let listed = fixtures.api().list_comments(slug).await;
        let removed = fixtures.api().delete_comment(token, slug, comment.id).await;

        ensure!(
            listed?.iter().any(|c| c.id == comment.id && c.body == text),
            "comment not shown on {}",
            slug
        );
        ensure!(removed? == DeleteOutcome::Deleted);
        ensure!(
            fixtures.api().list_comments(slug).await?.iter().all(|c| c.id != comment.id),
            "deleted comment still shown"
        );
        Ok(())
    })
    .with_fixtures([USER_WITH_RANDOM_ARTICLE])
    .with_tags(["articles", "comments"])
}

fn two_actors_stay_isolated() -> Scenario {
    Scenario::new("two actors work in separate sessions", |fixtures| async move {
        let ctx = fixtures.get::<TwoActorContext>(TWO_USERS_SETUP)?;
        let (first, second) = (&ctx.first, &ctx.second);

        let first_session = fixtures.sessions().session_for(&first.actor).await?;
        let second_session = fixtures.sessions().session_for(&second.actor).await?;

        let seen_by_first = first_session.current_user().await?.context("first actor signed out")?;
        let seen_by_second = second_session.current_user().await?.context("second actor signed out")?;
        ensure!(seen_by_first.username == first.actor.username);
        ensure!(seen_by_second.username == second.actor.username);
        ensure!(
            first_session.storage_item(TOKEN_STORAGE_KEY) != second_session.storage_item(TOKEN_STORAGE_KEY),
            "sessions share a token"
        );

        let other = fixtures
            .api()
            .fetch_content_item(&second.article.slug)
            .await?
            .context("second actor's article is not visible")?;
        ensure!(other.author.username == second.actor.username);
        Ok(())
    })
    .with_fixtures([TWO_USERS_SETUP])
    .with_tags(["articles", "multi-actor"])
}

fn followed_author_in_feed() -> Scenario {
    Scenario::new("see articles from followed authors in my feed", |fixtures| async move {
        let ctx = fixtures.get::<TwoActorContext>(TWO_USERS_SETUP)?;
        let (reader, author) = (&ctx.first, &ctx.second);

        let mut reader_session = fixtures.sessions().session_for(&reader.actor).await?;
        let mut author_session = fixtures.sessions().session_for(&author.actor).await?;

        reader_session.follow(&author.actor.username).await?;
        let feed = reader_session.feed().await?;
        ensure!(
            feed.iter().any(|item| item.slug == author.article.slug),
            "followed author's article missing from feed"
        );
        ensure!(
            feed.iter().all(|item| item.author.username == author.actor.username),
            "feed shows authors that are not followed"
        );

        let draft = NewContentItem::generated("feed");
        let published = author_session.publish(&draft).await?;
        let feed = reader_session.feed().await;
        let cleanup = fixtures
            .api()
            .delete_content_item(&author.actor.token, &published.slug)
            .await;

        ensure!(
            feed?.iter().any(|item| item.slug == published.slug && item.title == draft.title),
            "new article by followed author missing from feed"
        );
        ensure!(cleanup? == DeleteOutcome::Deleted);
        Ok(())
    })
    .with_fixtures([TWO_USERS_SETUP])
    .with_tags(["articles", "multi-actor"])
}
