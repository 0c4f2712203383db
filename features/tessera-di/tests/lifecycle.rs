use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tessera_di::{
    Application, ApplicationError, ApplicationOptions, ContextId, DynError, Hook, InjectError,
    Lifecycle, ModuleDefinition, Preload, Provider, ProviderBuilder, ResolveError, Scope,
};

type Events = Arc<Mutex<Vec<String>>>;

struct Tracked {
    name: &'static str,
    events: Events,
    fail_on: Option<Hook>,
    _dependency: Option<Arc<Tracked>>,
}
impl Tracked {
    fn record(&self, hook: Hook) -> Result<(), DynError> {
        self.events.lock().push(format!("{hook}:{}", self.name));
        match self.fail_on {
            Some(failing) if failing == hook => Err(format!("{} refused {hook}", self.name).into()),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Lifecycle for Tracked {
    async fn on_module_init(&self) -> Result<(), DynError> {
        self.record(Hook::ModuleInit)
    }

    async fn on_application_bootstrap(&self) -> Result<(), DynError> {
        self.record(Hook::ApplicationBootstrap)
    }

    async fn on_module_destroy(&self) -> Result<(), DynError> {
        self.record(Hook::ModuleDestroy)
    }

    async fn before_application_shutdown(&self, signal: Option<&str>) -> Result<(), DynError> {
        self.events.lock().push(format!("signal:{}", signal.unwrap_or("none")));
        self.record(Hook::BeforeApplicationShutdown)
    }

    async fn on_application_shutdown(&self, _signal: Option<&str>) -> Result<(), DynError> {
        self.record(Hook::ApplicationShutdown)
    }
}

fn tracked(
    name: &'static str,
    depends_on: Option<&'static str>,
    fail_on: Option<Hook>,
    events: &Events,
) -> ProviderBuilder<Tracked> {
    let events = events.clone();
    let builder = Provider::factory(move |mut di| {
        let events = events.clone();
        async move {
            let dependency = match depends_on {
                Some(_) => Some(di.resolve::<Arc<Tracked>>()?),
                None => None,
            };
            Ok::<_, InjectError>(Tracked {
                name,
                events,
                fail_on,
                _dependency: dependency,
            })
        }
    })
    .provide(name)
    .lifecycle();

    match depends_on {
        Some(token) => builder.inject_token(token),
        None => builder,
    }
}

fn events_of(events: &Events, prefix: &str) -> Vec<String> {
    events
        .lock()
        .iter()
        .filter(|event| event.starts_with(prefix))
        .cloned()
        .collect()
}

#[tokio::test]
async fn hooks_run_through_the_whole_life() {
    let events = Events::default();
    let root = ModuleDefinition::named("Root")
        .provider(tracked("A", Some("B"), None, &events))
        .provider(tracked("B", None, None, &events));

    let app = Application::create(root).await.unwrap();
    assert_eq!(events_of(&events, "on_module_init"), ["on_module_init:B", "on_module_init:A"]);
    assert_eq!(
        events_of(&events, "on_application_bootstrap"),
        ["on_application_bootstrap:B", "on_application_bootstrap:A"]
    );

    // Already built, init does not run again
    app.get_token::<Tracked>("A").await.unwrap();
    assert_eq!(events_of(&events, "on_module_init").len(), 2);

    app.close(Some("SIGTERM")).await.unwrap();
    assert_eq!(
        events_of(&events, "on_module_destroy"),
        ["on_module_destroy:A", "on_module_destroy:B"]
    );
    assert_eq!(
        events_of(&events, "on_application_shutdown"),
        ["on_application_shutdown:A", "on_application_shutdown:B"]
    );
    assert_eq!(events_of(&events, "signal"), ["signal:SIGTERM", "signal:SIGTERM"]);

    // Every destroy hook runs before any shutdown hook
    let all = events.lock().clone();
    let last_destroy = all.iter().rposition(|event| event.starts_with("on_module_destroy"));
    let first_shutdown = all.iter().position(|event| event.starts_with("before_application_shutdown"));
    assert!(last_destroy < first_shutdown);
}

#[tokio::test]
async fn closed_applications_refuse_resolution() {
    struct Plain;
    let app = Application::create(ModuleDefinition::named("Root").provider(Provider::value(Plain)))
        .await
        .unwrap();

    app.close(None).await.unwrap();
    assert!(matches!(app.get::<Plain>().await, Err(ResolveError::Closed)));
    // Closing twice is a no-op
    app.close(None).await.unwrap();
}

#[tokio::test]
async fn failing_shutdown_hooks_do_not_stop_the_others() {
    let events = Events::default();
    let root = ModuleDefinition::named("Root")
        .provider(tracked("A", Some("B"), Some(Hook::ModuleDestroy), &events))
        .provider(tracked("B", None, None, &events));
    let app = Application::create(root).await.unwrap();

    let error = app.close(None).await.unwrap_err();
    match error {
        ApplicationError::Hook { hook, .. } => assert_eq!(hook, Hook::ModuleDestroy),
        other => panic!("expected a hook failure, got {other}"),
    }
    assert_eq!(
        events_of(&events, "on_module_destroy"),
        ["on_module_destroy:A", "on_module_destroy:B"]
    );
    assert_eq!(events_of(&events, "on_application_shutdown").len(), 2);
}

#[tokio::test]
async fn failing_init_fails_creation() {
    let events = Events::default();
    let root = ModuleDefinition::named("Root").provider(tracked("A", None, Some(Hook::ModuleInit), &events));

    let error = Application::create(root).await.unwrap_err();
    assert!(
        matches!(
            error,
            ApplicationError::Resolve(ResolveError::LifecycleFailed {
                hook: Hook::ModuleInit,
                ..
            })
        ),
        "{error}"
    );
}

#[tokio::test]
async fn request_scoped_instances_only_run_init() {
    let events = Events::default();
    let root = ModuleDefinition::named("Root").provider(tracked("A", None, None, &events).scope(Scope::Request));
    let app = Application::create(root).await.unwrap();
    assert!(events.lock().is_empty());

    app.resolve_token::<Tracked>("A", &ContextId::new()).await.unwrap();
    app.close(None).await.unwrap();
    assert_eq!(events.lock().clone(), ["on_module_init:A"]);
}

#[tokio::test]
async fn lazy_preloading_skips_plain_providers() {
    let events = Events::default();
    let built = Events::default();
    let record = built.clone();
    let root = ModuleDefinition::named("Root")
        .provider(tracked("A", None, None, &events))
        .provider(Provider::factory(move |_| {
            record.lock().push("plain".to_string());
            async { Ok::<_, InjectError>(1_u8) }
        }));

    let app = Application::create(root).await.unwrap();
    assert_eq!(events_of(&events, "on_module_init"), ["on_module_init:A"]);
    assert!(built.lock().is_empty());

    app.get::<u8>().await.unwrap();
    assert_eq!(built.lock().clone(), ["plain"]);
}

#[tokio::test]
async fn slow_creation_times_out() {
    struct Slow;
    let root = ModuleDefinition::named("Root").provider(Provider::factory(|_| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok::<_, InjectError>(Slow)
    }));
    let options = ApplicationOptions::default()
        .preload(Preload::All)
        .timeout(Duration::from_millis(50));

    let error = Application::create_with(root, options).await.unwrap_err();
    assert!(matches!(error, ApplicationError::Timeout), "{error}");
}

#[tokio::test]
async fn overridden_providers_are_never_built() {
    let events = Events::default();
    let root = ModuleDefinition::named("Root")
        .provider(tracked("A", None, Some(Hook::ModuleInit), &events))
        .provider(tracked("A", None, None, &events));

    let app = Application::create(root).await.unwrap();
    assert_eq!(events_of(&events, "on_module_init"), ["on_module_init:A"]);
    assert!(app.get_token::<Tracked>("A").await.unwrap().fail_on.is_none());

    app.close(None).await.unwrap();
    assert_eq!(events_of(&events, "on_module_destroy"), ["on_module_destroy:A"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn init_runs_once_under_concurrent_resolution() {
    struct Slow {
        inits: Arc<AtomicUsize>,
    }
    #[async_trait]
    impl Lifecycle for Slow {
        async fn on_module_init(&self) -> Result<(), DynError> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let inits = Arc::new(AtomicUsize::new(0));
    let counter = inits.clone();
    let root = ModuleDefinition::named("Root").provider(
        Provider::factory(move |_| {
            let inits = counter.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, InjectError>(Slow { inits })
            }
        })
        .lifecycle(),
    );
    let options = ApplicationOptions::default().preload(Preload::None);
    let app = Application::create_with(root, options).await.unwrap();

    let resolutions = (0..10).map(|_| {
        let app = app.clone();
        tokio::spawn(async move { app.get::<Slow>().await })
    });
    let instances: Vec<Arc<Slow>> = futures::future::join_all(resolutions)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(inits.load(Ordering::SeqCst), 1);
    assert!(instances.iter().all(|instance| Arc::ptr_eq(instance, &instances[0])));
}
