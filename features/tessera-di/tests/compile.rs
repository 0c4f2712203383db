use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use tessera_di::{
    forward_ref, Application, ApplicationError, CompileError, InjectError, Module,
    ModuleDefinition, ModuleImport, ModuleKey, Provider, Token,
};

static DEFINED: AtomicUsize = AtomicUsize::new(0);

struct Clock;

struct CommonModule;
impl Module for CommonModule {
    fn definition() -> ModuleDefinition {
        DEFINED.fetch_add(1, Ordering::SeqCst);
        ModuleDefinition::of::<CommonModule>()
            .provider(Provider::value(Clock))
            .export(Token::of::<Clock>())
    }
}

struct UsersService;
struct OrdersService {
    _users: Arc<UsersService>,
}

struct UsersModule;
impl Module for UsersModule {
    fn definition() -> ModuleDefinition {
        ModuleDefinition::of::<UsersModule>()
            .import_module::<CommonModule>()
            .import(forward_ref(|| Some(ModuleImport::of::<OrdersModule>())))
            .provider(Provider::value(UsersService))
            .export(Token::of::<UsersService>())
    }
}

struct OrdersModule;
impl Module for OrdersModule {
    fn definition() -> ModuleDefinition {
        ModuleDefinition::of::<OrdersModule>()
            .import_module::<CommonModule>()
            .import(forward_ref(|| Some(ModuleImport::of::<UsersModule>())))
            .provider(
                Provider::factory(|mut di| async move {
                    Ok::<_, InjectError>(OrdersService { _users: di.resolve()? })
                })
                .inject::<Arc<UsersService>>(),
            )
            .export(Token::of::<OrdersService>())
    }
}

struct AppModule;
impl Module for AppModule {
    fn definition() -> ModuleDefinition {
        ModuleDefinition::of::<AppModule>()
            .import_module::<UsersModule>()
            .import_module::<OrdersModule>()
            .import_module::<CommonModule>()
    }
}

fn compile_error(error: ApplicationError) -> CompileError {
    match error {
        ApplicationError::Compile(error) => error,
        other => panic!("expected a compile error, got {other}"),
    }
}

#[tokio::test]
async fn module_types_are_defined_once_and_cross_import() {
    let app = Application::create_module::<AppModule>().await.unwrap();

    assert_eq!(DEFINED.load(Ordering::SeqCst), 1);
    assert_eq!(app.graph().modules().len(), 4);
    assert!(app.get::<OrdersService>().await.is_ok());

    let users = app.select_module::<UsersModule>().unwrap();
    assert_eq!(&**users.name(), "UsersModule");
    assert!(users.get::<OrdersService>().await.is_ok());
    assert!(users.get::<Clock>().await.is_ok());
}

#[tokio::test]
async fn undefined_forward_refs_fail_creation() {
    let root = ModuleDefinition::named("Root")
        .import(ModuleDefinition::named("Shared"))
        .import(forward_ref(|| None));

    match compile_error(Application::create(root).await.unwrap_err()) {
        CompileError::UndefinedModule { parent, index } => {
            assert_eq!(&*parent, "Root");
            assert_eq!(index, 1);
        }
        other => panic!("expected an undefined module, got {other}"),
    }
}

#[tokio::test]
async fn forward_refs_to_forward_refs_are_invalid() {
    let root = ModuleDefinition::named("Root").import(forward_ref(|| Some(forward_ref(|| None))));

    let error = compile_error(Application::create(root).await.unwrap_err());
    assert!(matches!(error, CompileError::InvalidModule { index: 0, .. }), "{error}");
}

#[tokio::test]
async fn deferred_imports_join_the_graph() {
    let root = ModuleDefinition::named("Root").import(ModuleImport::deferred(async {
        ModuleDefinition::named("Config")
            .provider(Provider::value("postgres://localhost".to_string()))
            .export(Token::of::<String>())
    }));

    let app = Application::create(root).await.unwrap();
    assert_eq!(app.get::<String>().await.unwrap().as_str(), "postgres://localhost");
    assert!(app.select(ModuleKey::named("Config")).is_ok());
}

#[tokio::test]
async fn exporting_foreign_tokens_fails_creation() {
    let root = ModuleDefinition::named("Root")
        .import(ModuleDefinition::named("Shared").provider(Provider::value(Clock)))
        .export(Token::of::<Clock>());

    match compile_error(Application::create(root).await.unwrap_err()) {
        CompileError::UnknownExport { module, token } => {
            assert_eq!(&*module, "Root");
            assert_eq!(token, Token::of::<Clock>());
        }
        other => panic!("expected an unknown export, got {other}"),
    }
}

#[tokio::test]
async fn later_providers_override_earlier_ones() {
    let root = ModuleDefinition::named("Root")
        .provider(Provider::value("first".to_string()))
        .provider(Provider::value("second".to_string()));

    let app = Application::create(root).await.unwrap();
    assert_eq!(app.get::<String>().await.unwrap().as_str(), "second");
}

#[tokio::test]
async fn overridden_providers_are_not_validated() {
    let root = ModuleDefinition::named("Root")
        .provider(
            Provider::factory(|_| async { Ok::<_, InjectError>(1_u64) }).inject_token("missing"),
        )
        .provider(Provider::value(9_u64));

    let app = Application::create(root).await.unwrap();
    assert_eq!(*app.get::<u64>().await.unwrap(), 9);
    assert_eq!(app.graph().wrappers().len(), 1);
}
