use crate::config::Config;
use crate::content::templates::TemplateRenderer;
use crate::database::storage::BlogDB;
use crate::error::{AppError, AppResult};
use crate::mail::{ContactMessage, MailRelay};
use crate::web::forms::{ContactForm, FormErrors};
use crate::web::session::{SessionContext, Viewer};
use crate::web::{auth, posts};
use actix_web::http::header;
use actix_web::{web, HttpResponse};

/// Open the blog database for this request. The schema is set up once at
/// startup by `BlogDB::new`.
pub fn get_storage(config: &Config) -> Result<BlogDB, AppError> {
    BlogDB::open(&config.paths.database_path).map_err(|e| {
        log::error!("Failed to open blog database: {}", e);
        AppError::Database(e)
    })
}

pub fn html(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

/// 303 so the browser follows up with a GET.
pub fn redirect(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, location))
        .finish()
}

/// Home page: every post.
pub async fn index(
    viewer: Viewer,
    session: SessionContext,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> AppResult<HttpResponse> {
    let db = get_storage(&config)?;
    let posts = db.list_posts()?;
    log::debug!("Loaded {} post(s)", posts.len());

    let state = session.page_state(&viewer);
    Ok(html(renderer.render_index(&state, &posts)?))
}

pub async fn about(
    viewer: Viewer,
    session: SessionContext,
    renderer: web::Data<TemplateRenderer>,
) -> AppResult<HttpResponse> {
    let state = session.page_state(&viewer);
    Ok(html(renderer.render_about(&state)?))
}

pub async fn contact_page(
    viewer: Viewer,
    session: SessionContext,
    renderer: web::Data<TemplateRenderer>,
) -> AppResult<HttpResponse> {
    let state = session.page_state(&viewer);
    Ok(html(renderer.render_contact(
        &state,
        &ContactForm::default(),
        &FormErrors::default(),
        false,
    )?))
}

/// Relay a contact submission. Delivery failures are logged and the page is
/// rendered either way; `msg_sent` tells the template which heading to show.
pub async fn contact(
    form: web::Form<ContactForm>,
    viewer: Viewer,
    session: SessionContext,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
    relay: web::Data<dyn MailRelay>,
) -> AppResult<HttpResponse> {
    let form = form.into_inner();
    let mut msg_sent = false;

    if let Err(errors) = form.validate() {
        let state = session.page_state(&viewer);
        return Ok(html(renderer.render_contact(&state, &form, &errors, msg_sent)?));
    }

    let message = ContactMessage::from_form(&form, &config.mail.recipient);
    let relay = relay.into_inner();
    match web::block(move || relay.send(&message)).await {
        Ok(Ok(())) => {
            msg_sent = true;
            log::info!("Contact message from {} relayed", form.email.trim());
        }
        Ok(Err(e)) => log::error!("Failed to relay contact message: {}", e),
        Err(e) => log::error!("Contact relay task failed: {}", e),
    }

    let state = session.page_state(&viewer);
    let shown = if msg_sent { ContactForm::default() } else { form };
    Ok(html(renderer.render_contact(
        &state,
        &shown,
        &FormErrors::default(),
        msg_sent,
    )?))
}

/// Configure routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/register", web::get().to(auth::register_page))
        .route("/register", web::post().to(auth::register))
        .route("/login", web::get().to(auth::login_page))
        .route("/login", web::post().to(auth::login))
        .route("/logout", web::get().to(auth::logout))
        .route("/post/{post_id}", web::get().to(posts::show_post))
        .route("/post/{post_id}", web::post().to(posts::comment_on_post))
        .route("/new-post", web::get().to(posts::new_post_page))
        .route("/new-post", web::post().to(posts::create_post))
        .route("/edit-post/{post_id}", web::get().to(posts::edit_post_page))
        .route("/edit-post/{post_id}", web::post().to(posts::edit_post))
        .route("/delete/{post_id}", web::get().to(posts::delete_post))
        .route("/about", web::get().to(about))
        .route("/contact", web::get().to(contact_page))
        .route("/contact", web::post().to(contact));
}

/// Serve `paths.static_dir` under `/static` when it exists.
pub fn configure_static(config: &Config) -> impl FnOnce(&mut web::ServiceConfig) + '_ {
    move |cfg| {
        if config.paths.static_dir.is_dir() {
            cfg.service(actix_files::Files::new("/static", &config.paths.static_dir));
        } else {
            log::debug!(
                "Static directory {} not found, /static disabled",
                config.paths.static_dir.display()
            );
        }
    }
}
