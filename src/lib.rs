#[macro_use]
extern crate rocket;

pub mod auth;
pub mod db;
pub mod error;
pub mod models;
pub mod request_logger;
pub mod routes;
pub mod upload;

use crate::auth::{AuthConfig, AuthState};
use crate::db::KameroDb;
use crate::request_logger::RequestLogger;
use crate::upload::{UploadConfig, UploadStore};
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::figment::Figment;
use rocket::http::Method;
use rocket::{Build, Rocket, Route};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_db_pools::Database;
use rocket_okapi::{
    openapi_get_routes,
    rapidoc::{GeneralConfig, HideShowConfig, RapiDocConfig, make_rapidoc},
    settings::UrlObject,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};
use std::sync::Once;

static LOGGER: Once = Once::new();

/// Room left in a multipart body for the text fields next to the file.
const FORM_FIELD_ALLOWANCE: u64 = 1024 * 1024;

fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

/// Every routed endpoint. The JSON handlers also publish `/openapi.json`.
pub fn api_routes() -> Vec<Route> {
    let mut api = openapi_get_routes![
        // Health
        routes::health::health_check,
        // Auth
        auth::routes::login,
        auth::routes::register,
        auth::routes::forgot_password,
        auth::routes::reset_password,
        // Admin
        routes::admin::manage_users,
        routes::admin::list_users,
        routes::admin::manage_institutions,
        routes::admin::list_institutions,
        routes::admin::manage_research_topics,
        routes::admin::list_research_topics,
        routes::admin::view_system_analytics,
        // Lecturer
        routes::lecturer::view_assigned_institutions,
        routes::lecturer::review_student_uploads,
        routes::lecturer::view_institution_research,
        // Student
        routes::student::view_available_research,
    ];

    api.extend(routes![
        routes::health::index,
        routes::lecturer::upload_research,
        routes::student::upload_research,
    ]);

    api
}

/// Apply the upload size limits to a Rocket figment.
pub fn with_upload_limits(figment: Figment, config: &UploadConfig) -> Figment {
    figment
        .merge(("limits.file", config.max_file_bytes))
        .merge((
            "limits.data-form",
            config.max_file_bytes + FORM_FIELD_ALLOWANCE,
        ))
}

pub fn rocket() -> Rocket<Build> {
    init_logger();

    log::info!("Starting Kamero Research Base API");

    let upload_config = UploadConfig::from_env();
    let upload_store = UploadStore::new(upload_config.uploads_dir.clone());
    let figment = with_upload_limits(rocket::Config::figment(), &upload_config);

    // Configure CORS
    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![
                Method::Get,
                Method::Post,
                Method::Put,
                Method::Delete,
                Method::Patch,
            ]
            .into_iter()
            .map(From::from)
            .collect(),
        )
        .allow_credentials(true)
        .to_cors()
        .expect("Error creating CORS");

    rocket::custom(figment)
        .attach(RequestLogger)
        .attach(KameroDb::init())
        .attach(cors)
        // Run database migrations on startup
        .attach(AdHoc::try_on_ignite(
            "Run Migrations",
            |rocket| async move {
                match KameroDb::fetch(&rocket) {
                    Some(db) => {
                        let pool = (**db).clone();
                        match db::run_migrations(&pool).await {
                            Ok(_) => {
                                log::info!("database migrations successful");
                                Ok(rocket)
                            }
                            Err(e) => {
                                log::error!("database migrations failed: {}", e);
                                Err(rocket)
                            }
                        }
                    }
                    None => {
                        log::error!("database pool not available for migrations");
                        Err(rocket)
                    }
                }
            },
        ))
        // Clone the pool into managed state and build the auth services on top of it
        .attach(AdHoc::try_on_ignite(
            "Manage DB Pool and Auth",
            |rocket| async move {
                let pool = match KameroDb::fetch(&rocket) {
                    Some(db) => (**db).clone(),
                    None => return Err(rocket),
                };

                let auth_state = match AuthConfig::from_env()
                    .and_then(|config| AuthState::from_config(config, pool.clone()))
                {
                    Ok(state) => state,
                    Err(err) => {
                        log::error!("failed to initialise authentication: {}", err);
                        return Err(rocket);
                    }
                };

                Ok(rocket.manage(pool).manage(auth_state))
            },
        ))
        .attach(AdHoc::try_on_ignite(
            "Prepare Uploads Directory",
            move |rocket| async move {
                match upload_store.ensure_root().await {
                    Ok(()) => {
                        log::info!(
                            "uploads directory initialized at: {}",
                            upload_store.root().display()
                        );
                        Ok(rocket.manage(upload_store))
                    }
                    Err(err) => {
                        log::error!("failed to prepare uploads directory: {}", err);
                        Err(rocket)
                    }
                }
            },
        ))
        .mount("/", api_routes())
        .register("/", error::catchers())
        .mount(
            "/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../../openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .mount(
            "/docs/rapidoc/",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("Kamero API", "../../openapi.json")],
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket, Route};
    use rocket_db_pools::sqlx::{self, PgPool};

    use crate::auth::AuthState;
    use crate::upload::{UploadConfig, UploadStore};

    pub use database::{TestDatabase, TestDatabaseError};

    /// Convenience helpers for seeding accounts and research rows in tests.
    pub struct TestFixtures<'a> {
        pool: &'a PgPool,
    }

    impl<'a> TestFixtures<'a> {
        /// Create a fixture helper bound to the provided pool.
        pub fn new(pool: &'a PgPool) -> Self {
            Self { pool }
        }

        /// Insert an institution, returning its id.
        pub async fn insert_institution(&self, name: &str) -> Result<i32, sqlx::Error> {
            sqlx::query_scalar("INSERT INTO institutions (name) VALUES ($1) RETURNING id")
                .bind(name)
                .fetch_one(self.pool)
                .await
        }

        /// Insert a user row with an already hashed password, returning the new user id.
        pub async fn insert_user(
            &self,
            username: &str,
            email: Option<&str>,
            role: &str,
            institution_id: Option<i32>,
            password_hash: &str,
        ) -> Result<i32, sqlx::Error> {
            sqlx::query_scalar(
                "INSERT INTO users (username, email, password, role, institution_id) VALUES ($1, $2, $3, $4, $5) RETURNING id",
            )
            .bind(username)
            .bind(email)
            .bind(password_hash)
            .bind(role)
            .bind(institution_id)
            .fetch_one(self.pool)
            .await
        }

        /// Insert a pending research material row, returning its id.
        pub async fn insert_research(
            &self,
            title: &str,
            user_id: i32,
            institution_id: Option<i32>,
        ) -> Result<i32, sqlx::Error> {
            sqlx::query_scalar(
                "INSERT INTO research_materials (title, file_url, tags, institution_id, user_id) VALUES ($1, $2, $3, $4, $5) RETURNING id",
            )
            .bind(title)
            .bind(format!("uploads/{}.pdf", title))
            .bind(Vec::<String>::new())
            .bind(institution_id)
            .bind(user_id)
            .fetch_one(self.pool)
            .await
        }
    }

    pub mod database {
        use log::LevelFilter;
        use rocket_db_pools::sqlx::postgres::{PgConnectOptions, PgPoolOptions};
        use rocket_db_pools::sqlx::{self, ConnectOptions, PgPool};
        use testcontainers_modules::postgres::Postgres;
        use testcontainers_modules::testcontainers::{
            ContainerAsync, core::error::TestcontainersError, runners::AsyncRunner,
        };
        use thiserror::Error;
        use tokio::runtime::Handle;
        use uuid::Uuid;

        use crate::db::MIGRATOR;

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("TEST_DATABASE_URL not set")]
            MissingUrl,
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("migration error: {0}")]
            Migration(#[from] sqlx::migrate::MigrateError),
            #[error("container error: {0}")]
            Container(#[from] TestcontainersError),
        }

        /// Ephemeral database factory for integration tests.
        pub struct TestDatabase {
            pool: Option<PgPool>,
            admin_options: PgConnectOptions,
            database_name: String,
            container: Option<ContainerAsync<Postgres>>,
        }

        impl TestDatabase {
            /// Provision a fresh database on the server named by `TEST_DATABASE_URL`.
            pub async fn new_from_env() -> Result<Self, TestDatabaseError> {
                let url = std::env::var("TEST_DATABASE_URL")
                    .map_err(|_| TestDatabaseError::MissingUrl)?;
                Self::provision(&url, None).await
            }

            /// Provision a fresh database inside a disposable Postgres container.
            pub async fn new() -> Result<Self, TestDatabaseError> {
                let container = Postgres::default().start().await?;

                let host = container.get_host().await?.to_string();
                let port = container.get_host_port_ipv4(5432).await?;
                let admin_url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

                Self::provision(&admin_url, Some(container)).await
            }

            async fn provision(
                admin_url: &str,
                container: Option<ContainerAsync<Postgres>>,
            ) -> Result<Self, TestDatabaseError> {
                let base_options: PgConnectOptions =
                    admin_url.parse().map_err(TestDatabaseError::Sqlx)?;
                let base_options = base_options.log_statements(LevelFilter::Off);

                let base_name = base_options
                    .get_database()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "postgres".to_string());

                let admin_options = base_options.clone();
                let admin_pool = PgPoolOptions::new()
                    .max_connections(1)
                    .connect_with(admin_options.clone())
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                let new_db_name = format!("{}_{}", base_name, Uuid::new_v4().simple());
                let create_sql = format!("CREATE DATABASE \"{}\" TEMPLATE template0", new_db_name);
                sqlx::query(&create_sql)
                    .execute(&admin_pool)
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;
                admin_pool.close().await;

                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect_with(base_options.clone().database(&new_db_name))
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                MIGRATOR.run(&pool).await?;

                Ok(Self {
                    pool: Some(pool),
                    admin_options,
                    database_name: new_db_name,
                    container,
                })
            }

            /// Cloneable connection pool for use in tests and Rocket state.
            pub fn pool(&self) -> &PgPool {
                self.pool.as_ref().expect("test database pool is available")
            }

            /// Convenience method returning a clone of the pooled connection handle.
            pub fn pool_clone(&self) -> PgPool {
                self.pool().clone()
            }

            /// Close pool connections and drop the ephemeral database.
            pub async fn close(mut self) -> Result<(), TestDatabaseError> {
                if let Some(pool) = self.pool.take() {
                    pool.close().await;
                }

                drop_database_with_fallback(self.admin_options.clone(), &self.database_name)
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                if let Some(container) = self.container.take() {
                    drop(container);
                }

                Ok(())
            }
        }

        async fn drop_database_with_fallback(
            admin_options: PgConnectOptions,
            database_name: &str,
        ) -> Result<(), sqlx::Error> {
            let admin_pool = PgPoolOptions::new()
                .max_connections(1)
                .connect_with(admin_options)
                .await?;

            let drop_force = format!("DROP DATABASE \"{}\" WITH (FORCE)", database_name);
            match sqlx::query(&drop_force).execute(&admin_pool).await {
                Ok(_) => Ok(()),
                Err(err) if force_drop_unsupported(&err) => {
                    let drop_sql = format!("DROP DATABASE \"{}\"", database_name);
                    sqlx::query(&drop_sql).execute(&admin_pool).await?;
                    Ok(())
                }
                Err(err) => Err(err),
            }
        }

        fn force_drop_unsupported(err: &sqlx::Error) -> bool {
            matches!(
                err,
                sqlx::Error::Database(db_err)
                    if db_err
                        .code()
                        .map(|code| code == "42601" || code == "0A000")
                        .unwrap_or(false)
            )
        }

        impl Drop for TestDatabase {
            fn drop(&mut self) {
                if let Some(pool) = self.pool.take() {
                    let admin_options = self.admin_options.clone();
                    let db_name = self.database_name.clone();
                    if let Ok(handle) = Handle::try_current() {
                        handle.spawn(async move {
                            pool.close().await;
                            let _ =
                                drop_database_with_fallback(admin_options.clone(), &db_name).await;
                        });
                    } else {
                        std::thread::spawn(move || {
                            if let Ok(rt) = tokio::runtime::Runtime::new() {
                                rt.block_on(async move {
                                    pool.close().await;
                                    let _ = drop_database_with_fallback(
                                        admin_options.clone(),
                                        &db_name,
                                    )
                                    .await;
                                });
                            }
                        });
                    }
                }

                if let Some(container) = self.container.take() {
                    drop(container);
                }
            }
        }
    }

    /// Builder for constructing Rocket instances tailored for integration tests.
    #[derive(Default)]
    pub struct TestRocketBuilder {
        figment: Figment,
        mounts: Vec<(String, Vec<Route>)>,
        pg_pool: Option<PgPool>,
        auth_state: Option<AuthState>,
        upload_store: Option<UploadStore>,
    }

    impl TestRocketBuilder {
        /// Start a builder with sensible defaults: random port, logging disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                ..Default::default()
            }
        }

        /// Mount routes at the site root.
        pub fn mount_api_routes(mut self, routes: Vec<Route>) -> Self {
            self.mounts.push(("/".to_string(), routes));
            self
        }

        /// Manage a `PgPool` instance for tests that exercise database-backed routes.
        pub fn manage_pg_pool(mut self, pool: PgPool) -> Self {
            self.pg_pool = Some(pool);
            self
        }

        /// Manage the token, password and reset services used by the guards.
        pub fn manage_auth_state(mut self, state: AuthState) -> Self {
            self.auth_state = Some(state);
            self
        }

        /// Manage an uploads directory and apply its size limits.
        pub fn manage_upload_store(mut self, config: &UploadConfig) -> Self {
            self.figment = crate::with_upload_limits(self.figment, config);
            self.upload_store = Some(UploadStore::new(config.uploads_dir.clone()));
            self
        }

        /// Finish building the Rocket instance.
        pub fn build(self) -> Rocket<Build> {
            let mut rocket = rocket::custom(self.figment).register("/", crate::error::catchers());

            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }

            if let Some(pool) = self.pg_pool {
                rocket = rocket.manage(pool);
            }

            if let Some(state) = self.auth_state {
                rocket = rocket.manage(state);
            }

            if let Some(store) = self.upload_store {
                rocket = rocket.manage(store);
            }

            rocket
        }

        /// Convenience helper to produce a blocking local client.
        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }

        /// Convenience helper to produce an asynchronous local client.
        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}
