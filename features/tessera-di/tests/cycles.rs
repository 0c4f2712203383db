use std::{sync::Arc, time::Duration};

use tessera_di::{
    dependency_graph::DependencyGraphError, graph::ModuleGraph, injector::Injector, Application,
    ApplicationError, ApplicationOptions, InjectError, Lazy, ModuleDefinition, Preload, Provider,
    ProviderBuilder, ResolveError, Token, STATIC_CONTEXT,
};

struct Cat {
    dog: Lazy<Dog>,
}

struct Dog {
    cat: Arc<Cat>,
}

fn cat_and_dog() -> ModuleDefinition {
    ModuleDefinition::named("Pets")
        .provider(
            Provider::factory(|mut di| async move {
                let dog: Lazy<Dog> = di.resolve()?;
                // Not available while the cycle is still open
                assert!(dog.try_get().is_none());
                Ok::<_, InjectError>(Cat { dog })
            })
            .inject::<Lazy<Dog>>(),
        )
        .provider(
            Provider::factory(|mut di| async move { Ok::<_, InjectError>(Dog { cat: di.resolve()? }) })
                .inject::<Arc<Cat>>(),
        )
}

struct Left;
struct Right;

fn strong_cycle() -> ModuleDefinition {
    ModuleDefinition::named("Root")
        .provider(
            Provider::factory(|_| async { Ok::<_, InjectError>(Left) }).inject_token(Token::of::<Right>()),
        )
        .provider(
            Provider::factory(|_| async { Ok::<_, InjectError>(Right) }).inject_token(Token::of::<Left>()),
        )
}

#[tokio::test]
async fn strong_cycles_are_rejected_at_creation() {
    let error = Application::create(strong_cycle()).await.unwrap_err();
    let report = match error {
        ApplicationError::DependencyGraph(report) => report,
        other => panic!("expected a dependency graph report, got {other}"),
    };
    assert!(report
        .errors
        .iter()
        .any(|error| matches!(error, DependencyGraphError::CircularDependency { .. })));
}

#[tokio::test]
async fn strong_cycles_are_rejected_on_resolution() {
    let graph = ModuleGraph::compile(strong_cycle()).await.unwrap();
    let injector = Injector::new(Arc::new(graph));
    let root = injector.graph().root();

    let error = injector
        .resolve_one(root, &Token::of::<Left>(), &STATIC_CONTEXT, false)
        .await
        .unwrap_err();
    let cycle = match error {
        ResolveError::UndefinedForwardRef { cycle } => cycle,
        other => panic!("expected an undefined forward reference, got {other}"),
    };
    assert_eq!(
        cycle,
        vec![Token::of::<Left>(), Token::of::<Right>(), Token::of::<Left>()]
    );
}

#[tokio::test]
async fn forward_references_close_the_cycle() {
    let app = Application::create(cat_and_dog()).await.unwrap();

    let cat = app.get::<Cat>().await.unwrap();
    let dog = app.get::<Dog>().await.unwrap();

    assert!(Arc::ptr_eq(cat.dog.get(), &dog));
    assert!(Arc::ptr_eq(&dog.cat, &cat));
}

#[tokio::test]
async fn forward_references_close_when_resolved_from_the_other_side() {
    let app = Application::create(cat_and_dog()).await.unwrap();

    let dog = app.get::<Dog>().await.unwrap();
    let dog_of_cat = dog.cat.dog.wait_result().await.unwrap();
    assert!(Arc::ptr_eq(dog_of_cat, &dog));
}

#[tokio::test]
async fn forward_references_survive_preloading() {
    let options = ApplicationOptions::default().preload(Preload::All);
    let app = Application::create_with(cat_and_dog(), options).await.unwrap();

    let cat = app.get::<Cat>().await.unwrap();
    assert!(Arc::ptr_eq(&cat.dog.get().cat, &cat));
}

#[tokio::test]
async fn failing_forward_reference_fails_the_resolution() {
    struct Broken;
    struct Holder {
        broken: Lazy<Broken>,
    }
    impl std::fmt::Debug for Holder {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Holder").finish_non_exhaustive()
        }
    }

    let root = ModuleDefinition::named("Root")
        .provider(
            Provider::factory(|mut di| async move {
                Ok::<_, InjectError>(Holder {
                    broken: di.resolve()?,
                })
            })
            .inject::<Lazy<Broken>>(),
        )
        .provider(Provider::factory(|_| async {
            Err::<Broken, _>(InjectError::Other("broken on purpose".into()))
        }));
    let app = Application::create(root).await.unwrap();

    let error = app.get::<Holder>().await.unwrap_err();
    assert!(matches!(error, ResolveError::FactoryFailed { .. }), "{error}");

    // The holder itself was built and keeps the failure
    let holder = app.get::<Holder>().await.unwrap();
    assert!(matches!(
        holder.broken.try_get(),
        Some(Err(InjectError::Unresolved)) | Some(Err(InjectError::Resolve(_)))
    ));
}

struct Config;
struct Cached {
    config: Lazy<Config>,
}
struct Failing;
struct Request {
    _cached: Arc<Cached>,
    _failing: Arc<Failing>,
}
impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request").finish_non_exhaustive()
    }
}

fn cached() -> ProviderBuilder<Cached> {
    Provider::factory(|mut di| async move {
        Ok::<_, InjectError>(Cached {
            config: di.resolve()?,
        })
    })
    .inject::<Lazy<Config>>()
}

#[tokio::test]
async fn siblings_of_a_failed_resolution_keep_their_forward_references() {
    let root = ModuleDefinition::named("Root")
        .provider(Provider::value(Config))
        .provider(cached())
        .provider(Provider::factory(|_| async {
            Err::<Failing, _>(InjectError::Other("broken on purpose".into()))
        }))
        .provider(
            Provider::factory(|mut di| async move {
                Ok::<_, InjectError>(Request {
                    _cached: di.resolve()?,
                    _failing: di.resolve()?,
                })
            })
            .inject::<Arc<Cached>>()
            .inject::<Arc<Failing>>(),
        );
    let app = Application::create(root).await.unwrap();

    let error = app.get::<Request>().await.unwrap_err();
    assert!(matches!(error, ResolveError::FactoryFailed { .. }), "{error}");

    let cached = app.get::<Cached>().await.unwrap();
    assert!(matches!(cached.config.try_get(), Some(Ok(_))));
}

#[tokio::test]
async fn constructions_outliving_their_resolution_get_their_forward_references() {
    struct Slow;
    struct Late {
        _slow: Arc<Slow>,
        config: Lazy<Config>,
    }
    struct Outer {
        _late: Arc<Late>,
        _failing: Arc<Failing>,
    }

    let root = ModuleDefinition::named("Root")
        .provider(Provider::value(Config))
        .provider(Provider::factory(|_| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, InjectError>(Slow)
        }))
        .provider(
            // The forward reference is only taken once Slow exists
            Provider::factory(|mut di| async move {
                Ok::<_, InjectError>(Late {
                    _slow: di.resolve()?,
                    config: di.property("config")?,
                })
            })
            .inject::<Arc<Slow>>()
            .property::<Lazy<Config>>("config"),
        )
        .provider(Provider::factory(|_| async {
            Err::<Failing, _>(InjectError::Other("broken on purpose".into()))
        }))
        .provider(
            Provider::factory(|mut di| async move {
                Ok::<_, InjectError>(Outer {
                    _late: di.resolve()?,
                    _failing: di.resolve()?,
                })
            })
            .inject::<Arc<Late>>()
            .inject::<Arc<Failing>>(),
        );
    let app = Application::create(root).await.unwrap();

    // Fails while Late is still waiting on Slow
    assert!(app.get::<Outer>().await.is_err());

    let late = app.get::<Late>().await.unwrap();
    let config = late.config.wait_result().await;
    assert!(config.is_ok());
}
