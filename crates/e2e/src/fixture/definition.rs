//! Fixture declarations

use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::{type_name, Any};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::E2eError;
use crate::fixture::scope::FixtureScope;

/// Type-erased provisioned value, shared by every requester in a run
pub type FixtureValue = Arc<dyn Any + Send + Sync>;

type ProvisionFn = dyn Fn(FixtureScope) -> BoxFuture<'static, anyhow::Result<FixtureValue>> + Send + Sync;
type TeardownFn =
    dyn Fn(FixtureScope, FixtureValue) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// A named unit of setup with its dependencies and optional teardown.
///
/// ```ignore
/// let def = FixtureDefinition::new("user_with_random_article", |scope| async move {
///     let actor = scope.get::<Actor>("new_user")?;
///     let article = scope.api().create_content_item(&actor.token, &NewContentItem::generated("random")).await?;
///     Ok(ActorWithContent { actor: (*actor).clone(), article })
/// })
/// .depends_on(["new_user"])
/// .with_teardown(|scope, ctx: Arc<ActorWithContent>| async move {
///     scope.api().delete_content_item(&ctx.actor.token, &ctx.article.slug).await?;
///     Ok(())
/// });
/// ```
pub struct FixtureDefinition {
    name: String,
    dependencies: Vec<String>,
    value_type: &'static str,
    provision: Box<ProvisionFn>,
    teardown: Option<Box<TeardownFn>>,
}

impl FixtureDefinition {
    /// Declare a fixture whose provisioning step produces a `T`
    pub fn new<T, F, Fut>(name: impl Into<String>, provision: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(FixtureScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let provision = move |scope: FixtureScope| {
            provision(scope)
                .map(|result| result.map(|value| Arc::new(value) as FixtureValue))
                .boxed()
        };

        Self {
            name: name.into(),
            dependencies: Vec::new(),
            value_type: type_name::<T>(),
            provision: Box::new(provision),
            teardown: None,
        }
    }

    /// Add dependencies; repeats are ignored, declaration order is kept
    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dep in dependencies {
            let dep = dep.into();
            if !self.dependencies.contains(&dep) {
                self.dependencies.push(dep);
            }
        }
        self
    }

    /// Attach the step that undoes provisioning.
    ///
    /// `T` must be the type the provisioning step produced; a mismatch shows
    /// up as a teardown failure for this fixture.
    pub fn with_teardown<T, F, Fut>(mut self, teardown: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(FixtureScope, Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = self.name.clone();
        let teardown = move |scope: FixtureScope, value: FixtureValue| match value.downcast::<T>() {
            Ok(typed) => teardown(scope, typed).boxed(),
            Err(_) => {
                let err: anyhow::Error = E2eError::FixtureTypeMismatch {
                    name: name.clone(),
                    expected: type_name::<T>(),
                }
                .into();
                futures::future::ready(Err(err)).boxed()
            }
        };
        self.teardown = Some(Box::new(teardown));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Rust type name of the provisioned value
    pub fn value_type(&self) -> &'static str {
        self.value_type
    }

    pub fn has_teardown(&self) -> bool {
        self.teardown.is_some()
    }

    pub(crate) fn provision(&self, scope: FixtureScope) -> BoxFuture<'static, anyhow::Result<FixtureValue>> {
        (self.provision)(scope)
    }

    pub(crate) fn teardown(
        &self,
        scope: FixtureScope,
        value: FixtureValue,
    ) -> Option<BoxFuture<'static, anyhow::Result<()>>> {
        self.teardown.as_ref().map(|teardown| teardown(scope, value))
    }
}

impl fmt::Debug for FixtureDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureDefinition")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("value_type", &self.value_type)
            .field("has_teardown", &self.has_teardown())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependencies_are_deduplicated_in_order() {
        let def = FixtureDefinition::new("c", |_| async { Ok(1u32) })
            .depends_on(["b", "a"])
            .depends_on(vec!["b".to_string(), "d".to_string()]);
        assert_eq!(def.dependencies(), ["b", "a", "d"]);
        assert_eq!(def.value_type(), "u32");
        assert!(!def.has_teardown());
    }
}
