/// Example: Modular service registration using the Module pattern
///
/// Services are grouped into modules that declare which other modules they
/// need. Run with `RUST_LOG=ferrous_registry=debug` to see registry logs.
use ferrous_registry::{
    DiError, DiResult, FailureKind, FnModule, LoggingObserver, ResiliencePolicy, Resolver, ServiceDescriptor,
    ServiceFailure, ServiceModule, ServiceRegistry,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// ===== Shared Configuration =====

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub api_key: String,
    pub max_connections: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost:5432/app".to_string(),
            api_key: "dev-api-key".to_string(),
            max_connections: 10,
        }
    }
}

// ===== Database Module =====

#[derive(Debug)]
pub struct Database {
    pub connection_string: String,
    pub max_connections: usize,
    pub online: bool,
}

impl Database {
    pub fn connect(&self) -> String {
        format!("Connected to {}", self.connection_string)
    }
}

pub struct DatabaseModule;

impl ServiceModule for DatabaseModule {
    fn name(&self) -> &str {
        "database"
    }

    fn configure(&self, registry: &ServiceRegistry) -> DiResult<()> {
        // Fails twice before connecting so the retry policy is visible
        let attempts = Arc::new(AtomicU32::new(0));
        registry.register(
            ServiceDescriptor::singleton("database", move |ctx| {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    return Err(ServiceFailure::new(
                        FailureKind::Unavailable,
                        "database still starting",
                    ));
                }
                let config: Arc<AppConfig> = ctx.require("config")?;
                Ok(Database {
                    connection_string: config.database_url.clone(),
                    max_connections: config.max_connections,
                    online: true,
                })
            })
            .with_dependencies(["config"])
            .with_aliases(["db"])
            .with_tags(["infrastructure"])
            .health_check(|db: &Database, _| {
                Ok::<_, ServiceFailure>((db.online, format!("{} connections", db.max_connections)))
            })
            .critical()
            .resilience(ResiliencePolicy::retry(3)?),
        )
    }

    fn description(&self) -> Option<&str> {
        Some("Connection to the primary database")
    }
}

// ===== User Module =====

#[derive(Debug)]
pub struct UserRepository {
    pub database: Arc<Database>,
    pub request: String,
}

impl UserRepository {
    pub fn find_user(&self, id: u32) -> String {
        format!("User {} from {} ({})", id, self.database.connect(), self.request)
    }
}

#[derive(Debug)]
pub struct UserService {
    pub repository: Arc<UserRepository>,
}

impl UserService {
    pub fn get_user_profile(&self, id: u32) -> String {
        format!("Profile: {}", self.repository.find_user(id))
    }
}

pub struct UserModule;

impl ServiceModule for UserModule {
    fn name(&self) -> &str {
        "users"
    }

    fn configure(&self, registry: &ServiceRegistry) -> DiResult<()> {
        // Repository as scoped (per-request)
        registry.register(
            ServiceDescriptor::scoped("users.repository", |ctx| {
                Ok(UserRepository {
                    database: ctx.require("db")?,
                    request: ctx.scope_name().to_string(),
                })
            })
            .with_dependencies(["db"]),
        )?;

        // Service as transient (new instance every time)
        registry.register(
            ServiceDescriptor::transient("users.service", |ctx| {
                Ok(UserService {
                    repository: ctx.require("users.repository")?,
                })
            })
            .with_dependencies(["users.repository"]),
        )
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["database".to_string()]
    }
}

// ===== API Module =====

#[derive(Debug)]
pub struct ApiClient {
    pub api_key: String,
}

impl ApiClient {
    pub fn call_api(&self) -> String {
        format!("API call with key: {}", self.api_key)
    }
}

// ===== Application Service (uses everything) =====

#[derive(Debug)]
pub struct AppService {
    pub user_service: Arc<UserService>,
    pub api_client: Arc<ApiClient>,
}

impl AppService {
    pub fn process_request(&self, user_id: u32) -> String {
        let user_profile = self.user_service.get_user_profile(user_id);
        let api_result = self.api_client.call_api();
        format!("{} | {}", user_profile, api_result)
    }
}

pub struct AppModule;

impl ServiceModule for AppModule {
    fn name(&self) -> &str {
        "app"
    }

    fn configure(&self, registry: &ServiceRegistry) -> DiResult<()> {
        registry.register(
            ServiceDescriptor::scoped("app", |ctx| {
                Ok(AppService {
                    user_service: ctx.require("users.service")?,
                    api_client: ctx.require("api.client")?,
                })
            })
            .with_dependencies(["users.service", "api.client"]),
        )
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["users".to_string(), "api".to_string()]
    }
}

// ===== Main Function =====

fn main() -> DiResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Ferrous Registry Modular Registration Example ===\n");

    let registry = ServiceRegistry::new();
    registry.add_resolution_observer(Arc::new(LoggingObserver::new()))?;
    let insights = registry.attach_insights()?;
    registry.register_instance(ServiceDescriptor::instance("config", AppConfig::default()))?;

    // 1. Struct modules, installed in dependency order
    println!("1. Installing modules:");
    registry.install_module(&DatabaseModule, false)?;
    registry.install_module(&UserModule, false)?;

    // Closure modules need no type of their own
    let api = FnModule::new("api", |registry| {
        registry.register(
            ServiceDescriptor::singleton("api.client", |ctx| {
                let config: Arc<AppConfig> = ctx.require("config")?;
                Ok(ApiClient {
                    api_key: config.api_key.clone(),
                })
            })
            .with_dependencies(["config"]),
        )
    })
    .with_description("Outbound API client");
    registry.install_module(&api, false)?;
    registry.install_module(&AppModule, false)?;
    println!("   Installed: {:?}\n", registry.installed_modules());

    // 2. Each request runs in its own scope
    println!("2. Handling requests:");
    for (request, user_id) in [("request-a", 123), ("request-b", 456)] {
        let result = registry.with_scope(Some(request), |scope| {
            let app = scope.require::<AppService>("app")?;
            Ok::<_, DiError>(app.process_request(user_id))
        })?;
        println!("   {}: {}", request, result?);
    }
    println!();

    // 3. Diagnostics
    println!("3. Diagnostics:");
    let topology = registry.service_topology();
    println!("   Activation order: {:?}", topology.activation_order);
    println!("   Tagged infrastructure: {:?}", registry.services_with_tag("infrastructure"));
    let database = &registry.service_metrics()["database"];
    println!(
        "   database: {} retries, recovered = {}",
        database.retries, database.last_recovered
    );
    for status in registry.health_snapshot() {
        println!(
            "   health {}: healthy = {}, details = {:?}",
            status.name, status.healthy, status.details
        );
    }
    println!("   Critical services healthy: {}", registry.critical_services_healthy());
    println!("   Recoveries: {:?}\n", insights.insights().recovery_counts);

    registry.shutdown();
    println!("Registry shut down: {}", registry.is_shut_down());
    Ok(())
}
