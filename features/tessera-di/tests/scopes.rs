use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use tessera_di::{
    Application, ContextId, ContextIdFactory, InjectError, ModuleDefinition, Provider,
    ProviderBuilder, ResolveError, Scope, Token,
};

#[derive(Debug)]
struct Counter(usize);

#[derive(Debug)]
struct Service {
    counter: Arc<Counter>,
}

fn counter(scope: Scope, built: &Arc<AtomicUsize>) -> ProviderBuilder<Counter> {
    let built = built.clone();
    Provider::factory(move |_| {
        let count = built.fetch_add(1, Ordering::SeqCst);
        async move { Ok::<_, InjectError>(Counter(count)) }
    })
    .scope(scope)
}

fn service() -> ProviderBuilder<Service> {
    Provider::factory(|mut di| async move {
        Ok::<_, InjectError>(Service {
            counter: di.resolve()?,
        })
    })
    .inject::<Arc<Counter>>()
}

async fn app(providers: ModuleDefinition) -> Application {
    Application::create(providers).await.unwrap()
}

#[tokio::test]
async fn singleton_is_unique() {
    let built = Arc::new(AtomicUsize::new(0));
    let app = app(ModuleDefinition::named("Root").provider(counter(Scope::Singleton, &built))).await;

    let first = app.get::<Counter>().await.unwrap();
    let second = app.get::<Counter>().await.unwrap();
    let in_request = app.resolve::<Counter>(&ContextId::new()).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &in_request));
    assert_eq!(built.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transient_is_fresh() {
    let built = Arc::new(AtomicUsize::new(0));
    let app = app(ModuleDefinition::named("Root").provider(counter(Scope::Transient, &built))).await;

    let first = app.get::<Counter>().await.unwrap();
    let second = app.get::<Counter>().await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(built.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn request_scope_is_isolated_per_context() {
    let built = Arc::new(AtomicUsize::new(0));
    let app = app(ModuleDefinition::named("Root").provider(counter(Scope::Request, &built))).await;
    let contexts = ContextIdFactory::new();
    let first_context = contexts.create();
    let second_context = contexts.create();

    let first = app.resolve::<Counter>(&first_context).await.unwrap();
    let again = app.resolve::<Counter>(&first_context).await.unwrap();
    let second = app.resolve::<Counter>(&second_context).await.unwrap();

    assert!(Arc::ptr_eq(&first, &again));
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(built.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn request_scope_is_rejected_in_the_static_context() {
    let built = Arc::new(AtomicUsize::new(0));
    let app = app(ModuleDefinition::named("Root").provider(counter(Scope::Request, &built))).await;

    let error = app.get::<Counter>().await.unwrap_err();
    assert!(matches!(error, ResolveError::InvalidScope { .. }), "{error}");
    assert_eq!(built.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn durable_providers_are_shared_per_discriminant() {
    struct Tenant(&'static str);

    let built = Arc::new(AtomicUsize::new(0));
    let app = app(ModuleDefinition::named("Root").provider(counter(Scope::Request, &built).durable())).await;
    let contexts = ContextIdFactory::new()
        .apply(|ctx: &ContextId| ctx.payload::<Tenant>().map(|tenant| Arc::<str>::from(tenant.0)));

    let acme = app.resolve::<Counter>(&contexts.for_payload(Tenant("acme"))).await.unwrap();
    let acme_again = app.resolve::<Counter>(&contexts.for_payload(Tenant("acme"))).await.unwrap();
    let globex = app.resolve::<Counter>(&contexts.for_payload(Tenant("globex"))).await.unwrap();

    assert!(Arc::ptr_eq(&acme, &acme_again));
    assert!(!Arc::ptr_eq(&acme, &globex));
    assert_eq!(built.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn singletons_depending_on_request_scope_are_cached_per_context() {
    let built = Arc::new(AtomicUsize::new(0));
    let app = app(
        ModuleDefinition::named("Root")
            .provider(counter(Scope::Request, &built))
            .provider(service()),
    )
    .await;
    let first_context = ContextId::new();
    let second_context = ContextId::new();

    let first = app.resolve::<Service>(&first_context).await.unwrap();
    let again = app.resolve::<Service>(&first_context).await.unwrap();
    let second = app.resolve::<Service>(&second_context).await.unwrap();

    assert!(Arc::ptr_eq(&first, &again));
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(!Arc::ptr_eq(&first.counter, &second.counter));

    let error = app.get::<Service>().await.unwrap_err();
    assert!(matches!(error, ResolveError::InvalidScope { .. }), "{error}");
}

#[tokio::test]
async fn durable_trees_stay_durable() {
    let built = Arc::new(AtomicUsize::new(0));
    let app = app(
        ModuleDefinition::named("Root")
            .provider(counter(Scope::Request, &built).durable())
            .provider(service()),
    )
    .await;

    let first = app
        .resolve::<Service>(&ContextId::new().with_durable_key("tenant-1"))
        .await
        .unwrap();
    let second = app
        .resolve::<Service>(&ContextId::new().with_durable_key("tenant-1"))
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn released_contexts_are_rebuilt() {
    let built = Arc::new(AtomicUsize::new(0));
    let app = app(ModuleDefinition::named("Root").provider(counter(Scope::Request, &built))).await;
    let context = ContextId::new();

    let first = app.resolve::<Counter>(&context).await.unwrap();
    assert_eq!(app.release_context(&context), 1);
    let second = app.resolve::<Counter>(&context).await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(built.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn factories_read_their_context() {
    struct Request(&'static str);
    struct Handler(String);

    let app = app(ModuleDefinition::named("Root").provider(
        Provider::factory(|di| async move {
            let path = di.context().payload::<Request>().map(|request| request.0);
            Ok::<_, InjectError>(Handler(path.unwrap_or("none").to_string()))
        })
        .scope(Scope::Request),
    ))
    .await;

    let context = ContextIdFactory::new().for_payload(Request("/users"));
    let handler = app.resolve::<Handler>(&context).await.unwrap();
    assert_eq!(handler.0, "/users");
}

#[tokio::test]
async fn optional_dependencies_default_to_none() {
    struct Cache;
    struct Repo {
        cache: Option<Arc<Cache>>,
    }

    let app = app(ModuleDefinition::named("Root").provider(
        Provider::factory(|mut di| async move {
            Ok::<_, InjectError>(Repo {
                cache: di.resolve()?,
            })
        })
        .inject::<Option<Arc<Cache>>>(),
    ))
    .await;

    assert!(app.get::<Repo>().await.unwrap().cache.is_none());
}

#[tokio::test]
async fn properties_are_injected_by_name() {
    struct Mailer {
        sender: Arc<String>,
        retries: Arc<u32>,
    }

    let app = app(
        ModuleDefinition::named("Root")
            .provider(Provider::value("noreply@example.com".to_string()).provide("SENDER"))
            .provider(Provider::value(3_u32))
            .provider(
                Provider::factory(|mut di| async move {
                    Ok::<_, InjectError>(Mailer {
                        retries: di.property("retries")?,
                        sender: di.property("sender")?,
                    })
                })
                .property_token("sender", "SENDER")
                .property::<Arc<u32>>("retries"),
            ),
    )
    .await;

    let mailer = app.get::<Mailer>().await.unwrap();
    assert_eq!(mailer.sender.as_str(), "noreply@example.com");
    assert_eq!(*mailer.retries, 3);
}

#[tokio::test]
async fn aliases_resolve_to_the_same_instance() {
    let built = Arc::new(AtomicUsize::new(0));
    let app = app(
        ModuleDefinition::named("Root")
            .provider(counter(Scope::Singleton, &built))
            .provider(Provider::existing("COUNTER", Token::of::<Counter>())),
    )
    .await;

    let direct = app.get::<Counter>().await.unwrap();
    let aliased = app.get_token::<Counter>("COUNTER").await.unwrap();
    assert!(Arc::ptr_eq(&direct, &aliased));
}
