//! Shared fixtures for handler tests.

use crate::config::Config;
use crate::content::templates::TemplateRenderer;
use crate::crypto::hash_password;
use crate::database::posts::{BlogPost, PostContent};
use crate::database::storage::BlogDB;
use crate::database::users::{NewUser, User};
use crate::mail::testing::RecordingRelay;
use crate::mail::MailRelay;
use crate::web::routes::configure_routes;
use crate::web::session::{session_key, SESSION_COOKIE_NAME};
use actix_session::storage::CookieSessionStore;
use actix_session::SessionMiddleware;
use actix_web::body::MessageBody;
use actix_web::cookie::Cookie;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::{test, web};
use std::sync::Arc;
use tempfile::TempDir;

pub const TEST_SECRET: &str = "test-secret-that-is-at-least-32-bytes-long";

pub fn test_session_middleware() -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), session_key(TEST_SECRET))
        .cookie_name(SESSION_COOKIE_NAME.to_owned())
        .cookie_secure(false)
        .build()
}

/// Temporary database plus everything the routes need in app data.
pub struct TestContext {
    _dir: TempDir,
    pub config: Config,
    renderer: web::Data<TemplateRenderer>,
    relay: Arc<dyn MailRelay>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_relay(Arc::new(RecordingRelay::default()))
    }

    pub fn with_relay(relay: Arc<dyn MailRelay>) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = Config::default();
        config.server.secret_key = TEST_SECRET.to_string();
        config.paths.database_path = dir.path().join("blog.db");
        config.paths.templates_dir = dir.path().join("templates");
        config.paths.static_dir = dir.path().join("static");
        config.mail.recipient = "owner@example.com".to_string();

        BlogDB::new(&config.paths.database_path).expect("create test db");
        let renderer = web::Data::new(TemplateRenderer::new(&config).expect("templates"));
        Self {
            _dir: dir,
            config,
            renderer,
            relay,
        }
    }

    pub fn db(&self) -> BlogDB {
        BlogDB::open(&self.config.paths.database_path).expect("open test db")
    }

    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::new(self.config.clone()))
            .app_data(self.renderer.clone())
            .app_data(web::Data::from(self.relay.clone()))
            .configure(configure_routes);
    }

    pub fn create_user(&self, name: &str, email: &str, password: &str) -> User {
        let password_hash = hash_password(password).expect("hash");
        self.db()
            .create_user(&NewUser {
                name,
                email,
                password_hash: &password_hash,
            })
            .expect("create user")
    }

    pub fn create_post(&self, author_id: i64, title: &str) -> BlogPost {
        self.db()
            .create_post(
                &PostContent {
                    title: title.to_string(),
                    subtitle: format!("{} subtitle", title),
                    body: format!("<p>{}</p>", title),
                    img_url: "https://example.com/cover.jpg".to_string(),
                },
                author_id,
                "October 16, 2026",
            )
            .expect("create post")
    }
}

/// Build an initialised test service for a `TestContext`.
#[macro_export]
macro_rules! init_test_app {
    ($ctx:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .wrap($crate::web::test_utils::test_session_middleware())
                .configure(|cfg| $ctx.configure(cfg)),
        )
        .await
    };
}

pub fn session_cookie<B>(res: &ServiceResponse<B>) -> Option<Cookie<'static>> {
    res.response()
        .cookies()
        .find(|cookie| cookie.name() == SESSION_COOKIE_NAME)
        .map(|cookie| cookie.into_owned())
}

pub fn location<B>(res: &ServiceResponse<B>) -> Option<String> {
    res.headers()
        .get(actix_web::http::header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

pub async fn body_string<B: MessageBody>(res: ServiceResponse<B>) -> String {
    let bytes = test::read_body(res).await;
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

/// Log in through `POST /login` and return the session cookie.
pub async fn login_cookie<S, B>(app: &S, email: &str, password: &str) -> Cookie<'static>
where
    S: Service<actix_http::Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
{
    let req = test::TestRequest::post()
        .uri("/login")
        .set_form([("email", email), ("password", password)])
        .to_request();
    let res = test::call_service(app, req).await;
    assert_eq!(location(&res).as_deref(), Some("/"), "login should redirect home");
    session_cookie(&res).expect("session cookie after login")
}
