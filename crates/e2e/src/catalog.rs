//! Standard Conduit fixtures
//!
//! | name                       | depends on                    | value               | teardown                 |
//! |----------------------------|-------------------------------|---------------------|--------------------------|
//! | `new_user`                 |                               | `Actor`             |                          |
//! | `user_with_random_article` | `new_user`                    | `ActorWithContent`  | delete the article       |
//! | `first_actor`              |                               | `Actor`             |                          |
//! | `second_actor`             |                               | `Actor`             |                          |
//! | `two_users_setup`          | `first_actor`, `second_actor` | `TwoActorContext`   | delete both articles     |
//!
//! Conduit has no endpoint for deleting accounts, so actors are left behind;
//! their names are random and never collide.

use std::sync::Arc;
use tracing::{debug, warn};

use conduit_common::{Actor, ActorSpec, ActorWithContent, NewContentItem, TwoActorContext};

use crate::api::DeleteOutcome;
use crate::error::E2eResult;
use crate::fixture::{FixtureDefinition, FixtureRegistry, FixtureScope};

pub const NEW_USER: &str = "new_user";
pub const USER_WITH_RANDOM_ARTICLE: &str = "user_with_random_article";
pub const FIRST_ACTOR: &str = "first_actor";
pub const SECOND_ACTOR: &str = "second_actor";
pub const TWO_USERS_SETUP: &str = "two_users_setup";

async fn provision_actor(scope: FixtureScope) -> anyhow::Result<Actor> {
    let actor = scope.api().create_actor(ActorSpec::default()).await?;
    debug!("{}: created actor {}", scope.fixture(), actor.username);
    Ok(actor)
}

async fn with_article(scope: &FixtureScope, actor: &Actor, label: &str) -> E2eResult<ActorWithContent> {
    let article = scope
        .api()
        .create_content_item(&actor.token, &NewContentItem::generated(label))
        .await?;
    debug!("{}: {} owns article {}", scope.fixture(), actor.username, article.slug);
    Ok(ActorWithContent {
        actor: actor.clone(),
        article,
    })
}

async fn delete_article(scope: &FixtureScope, owned: &ActorWithContent) -> E2eResult<()> {
    let outcome = scope
        .api()
        .delete_content_item(&owned.actor.token, &owned.article.slug)
        .await?;
    if outcome == DeleteOutcome::AlreadyAbsent {
        debug!("{}: article {} was already gone", scope.fixture(), owned.article.slug);
    }
    Ok(())
}

fn user_with_random_article() -> FixtureDefinition {
    FixtureDefinition::new(USER_WITH_RANDOM_ARTICLE, |scope: FixtureScope| async move {
        let actor = scope.get::<Actor>(NEW_USER)?;
        Ok(with_article(&scope, &actor, "random").await?)
    })
    .depends_on([NEW_USER])
    .with_teardown(|scope, owned: Arc<ActorWithContent>| async move {
        delete_article(&scope, &owned).await?;
        Ok(())
    })
}

fn two_users_setup() -> FixtureDefinition {
    FixtureDefinition::new(TWO_USERS_SETUP, |scope: FixtureScope| async move {
        let first = scope.get::<Actor>(FIRST_ACTOR)?;
        let second = scope.get::<Actor>(SECOND_ACTOR)?;
        let first = with_article(&scope, &first, "user1").await?;
        // No teardown runs for a fixture whose provisioning failed
        let second = match with_article(&scope, &second, "user2").await {
            Ok(second) => second,
            Err(err) => {
                if let Err(cleanup) = delete_article(&scope, &first).await {
                    warn!("{}: could not remove {}: {}", scope.fixture(), first.article.slug, cleanup);
                }
                return Err(err.into());
            }
        };
        Ok(TwoActorContext { first, second })
    })
    .depends_on([FIRST_ACTOR, SECOND_ACTOR])
    .with_teardown(|scope, ctx: Arc<TwoActorContext>| async move {
        let mut errors = Vec::new();
        for member in ctx.members() {
            if let Err(err) = delete_article(&scope, member).await {
                errors.push(format!("{}: {}", member.article.slug, err));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!(errors.join("; ")))
        }
    })
}

/// Add the standard fixtures to `registry`
pub fn register_standard_fixtures(registry: &mut FixtureRegistry) -> E2eResult<()> {
    registry.register(FixtureDefinition::new(NEW_USER, provision_actor))?;
    registry.register(user_with_random_article())?;
    registry.register(FixtureDefinition::new(FIRST_ACTOR, provision_actor))?;
    registry.register(FixtureDefinition::new(SECOND_ACTOR, provision_actor))?;
    registry.register(two_users_setup())?;
    Ok(())
}

/// Registry holding only the standard fixtures
pub fn standard_registry() -> E2eResult<FixtureRegistry> {
    let mut registry = FixtureRegistry::new();
    register_standard_fixtures(&mut registry)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::E2eError;

    fn order(registry: &FixtureRegistry, requested: &[&str]) -> Vec<String> {
        registry
            .resolve(requested)
            .unwrap()
            .iter()
            .map(|d| d.name().to_string())
            .collect()
    }

    #[test]
    fn test_standard_catalog_shape() {
        let registry = standard_registry().unwrap();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            [NEW_USER, USER_WITH_RANDOM_ARTICLE, FIRST_ACTOR, SECOND_ACTOR, TWO_USERS_SETUP]
        );
        assert!(!registry.get(NEW_USER).unwrap().has_teardown());
        assert!(registry.get(USER_WITH_RANDOM_ARTICLE).unwrap().has_teardown());
        assert!(registry.get(TWO_USERS_SETUP).unwrap().has_teardown());
    }

    #[test]
    fn test_standard_catalog_resolution() {
        let registry = standard_registry().unwrap();
        assert_eq!(
            order(&registry, &[USER_WITH_RANDOM_ARTICLE]),
            [NEW_USER, USER_WITH_RANDOM_ARTICLE]
        );
        assert_eq!(
            order(&registry, &[TWO_USERS_SETUP, NEW_USER]),
            [NEW_USER, FIRST_ACTOR, SECOND_ACTOR, TWO_USERS_SETUP]
        );
    }

    #[test]
    fn test_catalog_registers_once() {
        let mut registry = standard_registry().unwrap();
        assert!(matches!(
            register_standard_fixtures(&mut registry),
            Err(E2eError::DuplicateFixture(ref name)) if name == NEW_USER
        ));
    }
}
