//! Session helpers and request guards.
//!
//! The session cookie stores only the principal's user id. Everything else
//! (whether someone is logged in, whether they are the admin) is derived from
//! that id and the users table, so there is a single source of truth.

use crate::config::Config;
use crate::content::templates::PageState;
use crate::database::users::User;
use crate::error::AppError;
use crate::web::routes::get_storage;
use actix_session::config::PersistentSession;
use actix_session::storage::CookieSessionStore;
use actix_session::{Session, SessionExt, SessionMiddleware};
use actix_web::cookie::{time::Duration, Key};
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use sha2::{Digest, Sha512};

pub(crate) const USER_ID_KEY: &str = "user_id";
const FLASHES_KEY: &str = "_flashes";
pub const SESSION_COOKIE_NAME: &str = "session";

/// Derive the 64-byte cookie key from the configured secret. The secret's
/// strength is checked by `Config::validate` before the server starts.
pub fn session_key(secret: &str) -> Key {
    Key::from(Sha512::digest(secret.as_bytes()).as_slice())
}

pub fn session_middleware(config: &Config) -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(
        CookieSessionStore::default(),
        session_key(&config.server.secret_key),
    )
    .cookie_name(SESSION_COOKIE_NAME.to_string())
    .cookie_secure(false)
    .session_lifecycle(PersistentSession::default().session_ttl(Duration::days(14)))
    .build()
}

/// Newtype wrapper exposing the blog's session operations.
#[derive(Clone)]
pub struct SessionContext(Session);

impl SessionContext {
    pub fn new(session: Session) -> Self {
        Self(session)
    }

    /// Id of the logged in user, if any.
    pub fn principal_id(&self) -> Result<Option<i64>, AppError> {
        Ok(self.0.get::<i64>(USER_ID_KEY)?)
    }

    /// Establish `user_id` as the principal, under a fresh session id.
    pub fn log_in(&self, user_id: i64) -> Result<(), AppError> {
        self.0.renew();
        self.0.insert(USER_ID_KEY, user_id)?;
        Ok(())
    }

    /// Forget the principal. Safe to call without a session.
    pub fn log_out(&self) {
        if self.0.entries().contains_key(USER_ID_KEY) {
            self.0.remove(USER_ID_KEY);
        }
    }

    /// Queue a one-shot notice for the next rendered page.
    pub fn flash(&self, message: impl Into<String>) -> Result<(), AppError> {
        let mut flashes = self.0.get::<Vec<String>>(FLASHES_KEY)?.unwrap_or_default();
        flashes.push(message.into());
        self.0.insert(FLASHES_KEY, flashes)?;
        Ok(())
    }

    pub fn take_flashes(&self) -> Vec<String> {
        // removing marks the session dirty; leave untouched sessions alone
        if !self.0.entries().contains_key(FLASHES_KEY) {
            return Vec::new();
        }
        match self.0.remove_as::<Vec<String>>(FLASHES_KEY) {
            Some(Ok(flashes)) => flashes,
            Some(Err(raw)) => {
                log::warn!("Discarding unreadable flash messages: {}", raw);
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// Navigation state for a page render; drains pending flashes.
    pub fn page_state(&self, viewer: &Viewer) -> PageState {
        PageState {
            logged_in: viewer.logged_in(),
            is_admin: viewer.is_admin(),
            user_name: viewer.user().map(|user| user.name.clone()),
            flashes: self.take_flashes(),
        }
    }
}

impl FromRequest for SessionContext {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Ok(SessionContext::new(req.get_session())))
    }
}

/// Whoever is making the request: a loaded user or nobody.
#[derive(Debug, Clone, Default)]
pub struct Viewer {
    user: Option<User>,
}

impl Viewer {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn logged_in(&self) -> bool {
        self.user.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(|user| user.is_admin)
    }

    fn resolve(req: &HttpRequest) -> Result<Self, AppError> {
        let session = SessionContext::new(req.get_session());
        let Some(user_id) = session.principal_id()? else {
            return Ok(Self::anonymous());
        };

        let config = req
            .app_data::<web::Data<Config>>()
            .ok_or_else(|| AppError::Internal("Config is not registered".to_string()))?;
        let db = get_storage(config)?;

        match db.get_user(user_id)? {
            Some(user) => Ok(Self { user: Some(user) }),
            None => {
                log::warn!("Session refers to missing user {}; treating as anonymous", user_id);
                session.log_out();
                Ok(Self::anonymous())
            }
        }
    }
}

impl FromRequest for Viewer {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Viewer::resolve(req).map_err(Into::into))
    }
}

impl From<&AdminUser> for Viewer {
    fn from(admin: &AdminUser) -> Self {
        Self {
            user: Some(admin.0.clone()),
        }
    }
}

/// Guard for admin-only handlers. Extraction fails with 403 before the
/// handler body runs unless the principal is the admin.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl AdminUser {
    pub fn id(&self) -> i64 {
        self.0.id
    }

    fn resolve(req: &HttpRequest) -> Result<Self, AppError> {
        let viewer = Viewer::resolve(req)?;
        match viewer.user {
            Some(user) if user.is_admin => Ok(Self(user)),
            Some(user) => {
                log::warn!("User {} denied access to {}", user.id, req.path());
                Err(AppError::Forbidden)
            }
            None => {
                log::warn!("Anonymous request denied access to {}", req.path());
                Err(AppError::Forbidden)
            }
        }
    }
}

impl FromRequest for AdminUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(AdminUser::resolve(req).map_err(Into::into))
    }
}
