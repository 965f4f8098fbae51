use crate::config::Config;
use crate::content::templates::TemplateRenderer;
use crate::crypto::{hash_password, needs_rehash, verify_password};
use crate::database::storage::{is_unique_violation, BlogDB};
use crate::database::users::NewUser;
use crate::error::AppResult;
use crate::web::forms::{FormErrors, LoginForm, RegisterForm};
use crate::web::routes::{get_storage, html, redirect};
use crate::web::session::{SessionContext, Viewer};
use actix_web::{web, HttpResponse};

pub const UNKNOWN_EMAIL_NOTICE: &str = "Wrong email. Email is not tied to any account!";
pub const WRONG_PASSWORD_NOTICE: &str = "Error: Incorrect details entered...";

pub async fn register_page(
    viewer: Viewer,
    session: SessionContext,
    renderer: web::Data<TemplateRenderer>,
) -> AppResult<HttpResponse> {
    let state = session.page_state(&viewer);
    Ok(html(renderer.render_form(
        "register.html",
        &state,
        &RegisterForm::default(),
        &FormErrors::default(),
    )?))
}

/// Create an account and log it in. An already registered email never gets
/// a second row; the visitor is sent to the login page instead.
pub async fn register(
    form: web::Form<RegisterForm>,
    viewer: Viewer,
    session: SessionContext,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> AppResult<HttpResponse> {
    let form = form.into_inner();
    if let Err(errors) = form.validate() {
        let state = session.page_state(&viewer);
        return Ok(html(renderer.render_form("register.html", &state, &form, &errors)?));
    }

    let email = form.email.trim().to_string();
    let db = get_storage(&config)?;
    if db.find_user_by_email(&email)?.is_some() {
        session.flash(format!("Log in with {}", email))?;
        return Ok(redirect("/login"));
    }

    let password = form.password;
    let password_hash = web::block(move || hash_password(&password)).await??;

    let created = db.create_user(&NewUser {
        name: form.name.trim(),
        email: &email,
        password_hash: &password_hash,
    });
    let user = match created {
        Ok(user) => user,
        // lost a race with a concurrent registration of the same email
        Err(e) if is_unique_violation(&e) => {
            session.flash(format!("Log in with {}", email))?;
            return Ok(redirect("/login"));
        }
        Err(e) => return Err(e.into()),
    };

    session.log_in(user.id)?;
    log::info!("Registered user {}", user.id);
    Ok(redirect("/"))
}

pub async fn login_page(
    viewer: Viewer,
    session: SessionContext,
    renderer: web::Data<TemplateRenderer>,
) -> AppResult<HttpResponse> {
    let state = session.page_state(&viewer);
    Ok(html(renderer.render_form(
        "login.html",
        &state,
        &LoginForm::default(),
        &FormErrors::default(),
    )?))
}

/// Check credentials. The session is only touched on success.
pub async fn login(
    form: web::Form<LoginForm>,
    viewer: Viewer,
    session: SessionContext,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> AppResult<HttpResponse> {
    let form = form.into_inner();
    if let Err(errors) = form.validate() {
        let state = session.page_state(&viewer);
        return Ok(html(renderer.render_form("login.html", &state, &form, &errors)?));
    }

    let email = form.email.trim().to_string();
    let db = get_storage(&config)?;
    let Some(user) = db.find_user_by_email(&email)? else {
        log::warn!("Login attempt for unknown email");
        session.flash(UNKNOWN_EMAIL_NOTICE)?;
        return Ok(redirect("/login"));
    };

    let password = form.password.clone();
    let stored_hash = user.password.clone();
    let verified = web::block(move || verify_password(&password, &stored_hash)).await?;

    if verified {
        if needs_rehash(&user.password) {
            upgrade_hash(&db, user.id, form.password).await;
        }
        session.log_in(user.id)?;
        log::info!("User {} logged in", user.id);
        return Ok(redirect("/"));
    }

    log::warn!("Wrong password for user {}", user.id);
    let mut state = session.page_state(&viewer);
    state.flashes.push(WRONG_PASSWORD_NOTICE.to_string());
    Ok(html(renderer.render_form(
        "login.html",
        &state,
        &form,
        &FormErrors::default(),
    )?))
}

/// Swap a legacy hash for Argon2 after a successful login. Failure only
/// costs the upgrade, not the login.
async fn upgrade_hash(db: &BlogDB, user_id: i64, password: String) {
    let hashed = match web::block(move || hash_password(&password)).await {
        Ok(Ok(hash)) => hash,
        Ok(Err(e)) => return log::error!("Rehash for user {} failed: {}", user_id, e),
        Err(e) => return log::error!("Rehash task for user {} failed: {}", user_id, e),
    };
    match db.update_password(user_id, &hashed) {
        Ok(_) => log::info!("Upgraded password hash for user {}", user_id),
        Err(e) => log::error!("Storing upgraded hash for user {} failed: {}", user_id, e),
    }
}

/// Always succeeds, logged in or not.
pub async fn logout(session: SessionContext) -> HttpResponse {
    session.log_out();
    redirect("/")
}
