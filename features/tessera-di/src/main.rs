use std::sync::Arc;

use async_trait::async_trait;
use tessera_di::{
    Application, ContextIdFactory, DiHandle, DynError, InjectError, InstanceFactory, Lifecycle,
    ModuleDefinition, Provider, ProviderMetadata, Scope, Token,
};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    let shared = ModuleDefinition::named("Shared")
        .provider(Provider::value("test".to_string()))
        .export(Token::of::<String>());

    let root = ModuleDefinition::named("Root")
        .import(shared)
        .provider(Provider::class(TestFactory).lifecycle())
        .provider(
            Provider::factory(|mut di| async move {
                let request = di.context().id();
                Ok::<_, InjectError>(RequestLog {
                    test: di.resolve()?,
                    request,
                })
            })
            .inject::<Arc<Test>>()
            .scope(Scope::Request),
        );

    futures::executor::block_on(async {
        let app = Application::create(root).await.unwrap();
        println!("{:?}", app);

        let t = app.get::<Test>().await.unwrap();
        println!("{:?}", t);

        let contexts = ContextIdFactory::new();
        let context = contexts.create();
        let log = app.resolve::<RequestLog>(&context).await.unwrap();
        println!("{:?}", log);
        app.release_context(&context);

        app.close(Some("SIGTERM")).await.unwrap();
    });
}

#[derive(Debug)]
struct Test {
    a: Arc<String>,
}
#[async_trait]
impl Lifecycle for Test {
    async fn on_module_init(&self) -> Result<(), DynError> {
        tracing::info!("Test initialized with {}", self.a);
        Ok(())
    }

    async fn on_application_shutdown(&self, signal: Option<&str>) -> Result<(), DynError> {
        tracing::info!("Test shutting down on {signal:?}");
        Ok(())
    }
}

struct TestFactory;
impl InstanceFactory for TestFactory {
    type Provides = Test;

    fn metadata() -> ProviderMetadata {
        ProviderMetadata::new().inject::<Arc<String>>()
    }

    async fn construct(&self, mut di: DiHandle) -> Result<Self::Provides, InjectError> {
        let str = di.resolve::<Arc<String>>()?;
        Ok(Test { a: str })
    }
}

#[derive(Debug)]
#[allow(dead_code)]
struct RequestLog {
    test: Arc<Test>,
    request: u64,
}
