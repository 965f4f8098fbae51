use crate::config::{Config, EditAuthorship};
use crate::content::templates::TemplateRenderer;
use crate::database::storage::{is_constraint_violation, is_unique_violation};
use crate::error::{AppError, AppResult};
use crate::web::forms::{CommentForm, FormErrors, PostForm};
use crate::web::routes::{get_storage, html, redirect};
use crate::web::session::{AdminUser, SessionContext, Viewer};
use actix_web::{web, HttpResponse};

pub const DUPLICATE_TITLE: &str = "A post with this title already exists.";
pub const COMMENT_POSTED_NOTICE: &str = "Your comment has been posted";
pub const LOGIN_TO_COMMENT_NOTICE: &str = "You need to log in to comment.";

fn post_not_found(post_id: i64) -> AppError {
    AppError::NotFound(format!("Post {} not found", post_id))
}

/// Date stamp shown under a post, e.g. "October 16, 2026".
fn today() -> String {
    chrono::Local::now().format("%B %d, %Y").to_string()
}

/// Re-render the post form with the title flagged as taken.
fn title_taken(
    renderer: &TemplateRenderer,
    session: &SessionContext,
    viewer: &Viewer,
    form: &PostForm,
    edit_post_id: Option<i64>,
) -> AppResult<HttpResponse> {
    let mut errors = FormErrors::default();
    errors.add("title", DUPLICATE_TITLE);
    let state = session.page_state(viewer);
    Ok(html(renderer.render_make_post(&state, form, &errors, edit_post_id)?))
}

/// Single post with its comments and the comment box.
pub async fn show_post(
    path: web::Path<i64>,
    viewer: Viewer,
    session: SessionContext,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> AppResult<HttpResponse> {
    let post_id = path.into_inner();
    let db = get_storage(&config)?;
    let post = db.get_post(post_id)?.ok_or_else(|| post_not_found(post_id))?;
    let comments = db.get_comments_for_post(post_id)?;

    let state = session.page_state(&viewer);
    Ok(html(renderer.render_post(
        &state,
        &post,
        &comments,
        &CommentForm::default(),
        &FormErrors::default(),
    )?))
}

/// Attach a comment from the logged in user. Anonymous visitors are sent to
/// the login page and nothing is stored.
pub async fn comment_on_post(
    path: web::Path<i64>,
    form: web::Form<CommentForm>,
    viewer: Viewer,
    session: SessionContext,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> AppResult<HttpResponse> {
    let post_id = path.into_inner();
    let db = get_storage(&config)?;
    let post = db.get_post(post_id)?.ok_or_else(|| post_not_found(post_id))?;

    let Some(user) = viewer.user() else {
        session.flash(LOGIN_TO_COMMENT_NOTICE)?;
        return Ok(redirect("/login"));
    };

    let form = form.into_inner();
    if let Err(errors) = form.validate() {
        let comments = db.get_comments_for_post(post_id)?;
        let state = session.page_state(&viewer);
        return Ok(html(renderer.render_post(&state, &post, &comments, &form, &errors)?));
    }

    let comment_id = match db.add_comment(post_id, user.id, &form.comment) {
        Ok(id) => id,
        // post deleted since the lookup above
        Err(e) if is_constraint_violation(&e) => return Err(post_not_found(post_id)),
        Err(e) => return Err(e.into()),
    };
    log::info!("User {} commented on post {} ({})", user.id, post_id, comment_id);

    session.flash(COMMENT_POSTED_NOTICE)?;
    Ok(redirect(&format!("/post/{}", post_id)))
}

pub async fn new_post_page(
    admin: AdminUser,
    session: SessionContext,
    renderer: web::Data<TemplateRenderer>,
) -> AppResult<HttpResponse> {
    let state = session.page_state(&Viewer::from(&admin));
    Ok(html(renderer.render_make_post(
        &state,
        &PostForm::default(),
        &FormErrors::default(),
        None,
    )?))
}

/// Publish a new post authored by the admin, dated today.
pub async fn create_post(
    admin: AdminUser,
    form: web::Form<PostForm>,
    session: SessionContext,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> AppResult<HttpResponse> {
    let viewer = Viewer::from(&admin);
    let form = form.into_inner();
    let db = get_storage(&config)?;

    let content = match form.validate() {
        Ok(content) => content,
        Err(errors) => {
            let state = session.page_state(&viewer);
            return Ok(html(renderer.render_make_post(&state, &form, &errors, None)?));
        }
    };

    if db.find_post_id_by_title(&content.title)?.is_some() {
        return title_taken(&renderer, &session, &viewer, &form, None);
    }

    let post = match db.create_post(&content, admin.id(), &today()) {
        Ok(post) => post,
        Err(e) if is_unique_violation(&e) => {
            return title_taken(&renderer, &session, &viewer, &form, None);
        }
        Err(e) => return Err(e.into()),
    };
    log::info!("Created post {} '{}'", post.id, post.title);
    Ok(redirect("/"))
}

/// Edit form prefilled with the stored post.
pub async fn edit_post_page(
    admin: AdminUser,
    path: web::Path<i64>,
    session: SessionContext,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> AppResult<HttpResponse> {
    let post_id = path.into_inner();
    let db = get_storage(&config)?;
    let post = db.get_post(post_id)?.ok_or_else(|| post_not_found(post_id))?;

    let state = session.page_state(&Viewer::from(&admin));
    Ok(html(renderer.render_make_post(
        &state,
        &PostForm::from(&post),
        &FormErrors::default(),
        Some(post_id),
    )?))
}

/// Overwrite title, subtitle, image and body. The date is kept; the author
/// follows `policy.edit_authorship`.
pub async fn edit_post(
    admin: AdminUser,
    path: web::Path<i64>,
    form: web::Form<PostForm>,
    session: SessionContext,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> AppResult<HttpResponse> {
    let viewer = Viewer::from(&admin);
    let post_id = path.into_inner();
    let db = get_storage(&config)?;
    let post = db.get_post(post_id)?.ok_or_else(|| post_not_found(post_id))?;

    let form = form.into_inner();
    let content = match form.validate() {
        Ok(content) => content,
        Err(errors) => {
            let state = session.page_state(&viewer);
            return Ok(html(renderer.render_make_post(&state, &form, &errors, Some(post_id))?));
        }
    };

    if let Some(other) = db.find_post_id_by_title(&content.title)? {
        if other != post_id {
            return title_taken(&renderer, &session, &viewer, &form, Some(post_id));
        }
    }

    let author_id = match config.policy.edit_authorship {
        EditAuthorship::Reassign => admin.id(),
        EditAuthorship::Preserve => post.author_id,
    };
    match db.update_post(post_id, &content, author_id) {
        Ok(true) => {}
        Ok(false) => return Err(post_not_found(post_id)),
        Err(e) if is_unique_violation(&e) => {
            return title_taken(&renderer, &session, &viewer, &form, Some(post_id));
        }
        Err(e) => return Err(e.into()),
    }

    log::info!("Post {} edited by user {}", post_id, admin.id());
    Ok(redirect(&format!("/post/{}", post_id)))
}

/// Remove a post together with its comments.
pub async fn delete_post(
    admin: AdminUser,
    path: web::Path<i64>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let post_id = path.into_inner();
    let mut db = get_storage(&config)?;
    if !db.delete_post(post_id)? {
        return Err(post_not_found(post_id));
    }

    log::info!("Post {} deleted by user {}", post_id, admin.id());
    Ok(redirect("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::test_utils::{body_string, location, login_cookie, session_cookie, TestContext};
    use actix_web::http::StatusCode;
    use actix_web::test;

    fn post_fields(title: &str) -> [(&'static str, String); 4] {
        [
            ("title", title.to_string()),
            ("subtitle", "A subtitle".to_string()),
            ("img_url", "https://images.example.com/cover.jpg".to_string()),
            ("body", "<p>Post body</p>".to_string()),
        ]
    }

    #[actix_web::test]
    async fn test_show_post_and_missing_post() {
        let ctx = TestContext::new();
        let admin = ctx.create_user("Admin", "admin@x.com", "adminpass1");
        let post = ctx.create_post(admin.id, "Hello");
        let app = crate::init_test_app!(ctx);

        let res = test::call_service(
            &app,
            test::TestRequest::get().uri(&format!("/post/{}", post.id)).to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_string(res).await;
        assert!(body.contains("Hello"));
        assert!(body.contains("<p>Hello</p>"));

        let res = test::call_service(&app, test::TestRequest::get().uri("/post/999").to_request()).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_admin_pages_forbidden_for_anonymous() {
        let ctx = TestContext::new();
        let admin = ctx.create_user("Admin", "admin@x.com", "adminpass1");
        let post = ctx.create_post(admin.id, "Hello");
        let app = crate::init_test_app!(ctx);

        let uris = [
            "/new-post".to_string(),
            format!("/edit-post/{}", post.id),
            format!("/delete/{}", post.id),
            // the guard answers before the lookup would 404
            "/edit-post/999".to_string(),
        ];
        for uri in uris {
            let res = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
            assert_eq!(res.status(), StatusCode::FORBIDDEN, "{}", uri);
        }
        assert!(ctx.db().get_post(post.id).unwrap().is_some());
    }

    #[actix_web::test]
    async fn test_non_admin_cannot_create_edit_or_delete() {
        let ctx = TestContext::new();
        let admin = ctx.create_user("Admin", "admin@x.com", "adminpass1");
        ctx.create_user("Reader", "reader@x.com", "readerpass1");
        let post = ctx.create_post(admin.id, "Hello");
        let app = crate::init_test_app!(ctx);
        let cookie = login_cookie(&app, "reader@x.com", "readerpass1").await;

        let req = test::TestRequest::post()
            .uri("/new-post")
            .cookie(cookie.clone())
            .set_form(post_fields("Sneaky"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::post()
            .uri(&format!("/edit-post/{}", post.id))
            .cookie(cookie.clone())
            .set_form(post_fields("Defaced"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&format!("/delete/{}", post.id))
                .cookie(cookie)
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let db = ctx.db();
        assert_eq!(db.list_posts().unwrap().len(), 1);
        assert!(db.find_post_id_by_title("Sneaky").unwrap().is_none());
        let unchanged = db.get_post(post.id).unwrap().unwrap();
        assert_eq!(unchanged.title, "Hello");
        assert_eq!(unchanged.body, post.body);
        assert_eq!(unchanged.author_id, admin.id);
    }

    #[actix_web::test]
    async fn test_admin_creates_post() {
        let ctx = TestContext::new();
        let admin = ctx.create_user("Admin", "admin@x.com", "adminpass1");
        let app = crate::init_test_app!(ctx);
        let cookie = login_cookie(&app, "admin@x.com", "adminpass1").await;

        let res = test::call_service(
            &app,
            test::TestRequest::get().uri("/new-post").cookie(cookie.clone()).to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_string(res).await;
        assert!(body.contains("Log Out"));
        assert!(body.contains(r#"<span class="principal">Admin</span>"#));

        let req = test::TestRequest::post()
            .uri("/new-post")
            .cookie(cookie)
            .set_form(post_fields("Fresh post"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res).as_deref(), Some("/"));

        let db = ctx.db();
        let id = db.find_post_id_by_title("Fresh post").unwrap().unwrap();
        let post = db.get_post(id).unwrap().unwrap();
        assert_eq!(post.author_id, admin.id);
        assert_eq!(post.date, today());
    }

    #[actix_web::test]
    async fn test_create_post_rejects_duplicate_title() {
        let ctx = TestContext::new();
        let admin = ctx.create_user("Admin", "admin@x.com", "adminpass1");
        ctx.create_post(admin.id, "Taken");
        let app = crate::init_test_app!(ctx);
        let cookie = login_cookie(&app, "admin@x.com", "adminpass1").await;

        let req = test::TestRequest::post()
            .uri("/new-post")
            .cookie(cookie)
            .set_form(post_fields("Taken"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_string(res).await.contains(DUPLICATE_TITLE));
        assert_eq!(ctx.db().list_posts().unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn test_create_post_rejects_bad_url() {
        let ctx = TestContext::new();
        ctx.create_user("Admin", "admin@x.com", "adminpass1");
        let app = crate::init_test_app!(ctx);
        let cookie = login_cookie(&app, "admin@x.com", "adminpass1").await;

        let mut fields = post_fields("Broken image");
        fields[2].1 = "not a url".to_string();
        let req = test::TestRequest::post()
            .uri("/new-post")
            .cookie(cookie)
            .set_form(fields)
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_string(res).await.contains("Invalid URL."));
        assert!(ctx.db().list_posts().unwrap().is_empty());
    }

    async fn edit_as_admin(ctx: &TestContext, post_id: i64, title: &str) -> StatusCode {
        let app = crate::init_test_app!(ctx);
        let cookie = login_cookie(&app, "admin@x.com", "adminpass1").await;
        let req = test::TestRequest::post()
            .uri(&format!("/edit-post/{}", post_id))
            .cookie(cookie)
            .set_form(post_fields(title))
            .to_request();
        test::call_service(&app, req).await.status()
    }

    #[actix_web::test]
    async fn test_edit_post_authorship() {
        for policy in [EditAuthorship::Reassign, EditAuthorship::Preserve] {
            let mut ctx = TestContext::new();
            ctx.config.policy.edit_authorship = policy;
            let admin = ctx.create_user("Admin", "admin@x.com", "adminpass1");
            let writer = ctx.create_user("Writer", "writer@x.com", "writerpass1");
            let post = ctx.create_post(writer.id, "Draft");

            assert_eq!(edit_as_admin(&ctx, post.id, "Final").await, StatusCode::SEE_OTHER);

            let edited = ctx.db().get_post(post.id).unwrap().unwrap();
            assert_eq!(edited.title, "Final");
            assert_eq!(edited.date, post.date);
            let expected = match policy {
                EditAuthorship::Reassign => admin.id,
                EditAuthorship::Preserve => writer.id,
            };
            assert_eq!(edited.author_id, expected, "{:?}", policy);
        }
    }

    #[actix_web::test]
    async fn test_edit_post_title_collision() {
        let ctx = TestContext::new();
        let admin = ctx.create_user("Admin", "admin@x.com", "adminpass1");
        let first = ctx.create_post(admin.id, "First");
        let second = ctx.create_post(admin.id, "Second");

        assert_eq!(edit_as_admin(&ctx, second.id, "First").await, StatusCode::OK);
        assert_eq!(ctx.db().get_post(second.id).unwrap().unwrap().title, "Second");

        // keeping its own title is not a collision
        assert_eq!(edit_as_admin(&ctx, first.id, "First").await, StatusCode::SEE_OTHER);
    }

    #[actix_web::test]
    async fn test_edit_missing_post_is_not_found() {
        let ctx = TestContext::new();
        ctx.create_user("Admin", "admin@x.com", "adminpass1");
        assert_eq!(edit_as_admin(&ctx, 42, "Anything").await, StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_edit_page_is_prefilled() {
        let ctx = TestContext::new();
        let admin = ctx.create_user("Admin", "admin@x.com", "adminpass1");
        let post = ctx.create_post(admin.id, "Prefilled");
        let app = crate::init_test_app!(ctx);
        let cookie = login_cookie(&app, "admin@x.com", "adminpass1").await;

        let res = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&format!("/edit-post/{}", post.id))
                .cookie(cookie)
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_string(res).await;
        assert!(body.contains("value=\"Prefilled\""));
        assert!(body.contains("Edit Post"));
    }

    #[actix_web::test]
    async fn test_delete_post_removes_comments() {
        let ctx = TestContext::new();
        let admin = ctx.create_user("Admin", "admin@x.com", "adminpass1");
        let post = ctx.create_post(admin.id, "Doomed");
        ctx.db().add_comment(post.id, admin.id, "first!").unwrap();
        let app = crate::init_test_app!(ctx);
        let cookie = login_cookie(&app, "admin@x.com", "adminpass1").await;

        let res = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&format!("/delete/{}", post.id))
                .cookie(cookie.clone())
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res).as_deref(), Some("/"));

        let db = ctx.db();
        assert!(db.get_post(post.id).unwrap().is_none());
        assert_eq!(db.count_comments_for_post(post.id).unwrap(), 0);

        let res = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&format!("/delete/{}", post.id))
                .cookie(cookie)
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_comment_requires_login() {
        let ctx = TestContext::new();
        let admin = ctx.create_user("Admin", "admin@x.com", "adminpass1");
        let post = ctx.create_post(admin.id, "Hello");
        let app = crate::init_test_app!(ctx);

        let req = test::TestRequest::post()
            .uri(&format!("/post/{}", post.id))
            .set_form([("comment", "drive-by")])
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res).as_deref(), Some("/login"));
        assert_eq!(ctx.db().count_comments_for_post(post.id).unwrap(), 0);

        let cookie = session_cookie(&res).expect("flash cookie");
        let res = test::call_service(
            &app,
            test::TestRequest::get().uri("/login").cookie(cookie).to_request(),
        )
        .await;
        assert!(body_string(res).await.contains(LOGIN_TO_COMMENT_NOTICE));
    }

    #[actix_web::test]
    async fn test_comment_on_missing_post() {
        let ctx = TestContext::new();
        let app = crate::init_test_app!(ctx);

        let req = test::TestRequest::post()
            .uri("/post/77")
            .set_form([("comment", "hello?")])
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_logged_in_user_comments() {
        let ctx = TestContext::new();
        let admin = ctx.create_user("Admin", "admin@x.com", "adminpass1");
        let reader = ctx.create_user("Reader", "reader@x.com", "readerpass1");
        let post = ctx.create_post(admin.id, "Hello");
        let app = crate::init_test_app!(ctx);
        let cookie = login_cookie(&app, "reader@x.com", "readerpass1").await;

        let req = test::TestRequest::post()
            .uri(&format!("/post/{}", post.id))
            .cookie(cookie.clone())
            .set_form([("comment", "Great read")])
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), Some(format!("/post/{}", post.id)));

        let comments = ctx.db().get_comments_for_post(post.id).unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].commenter_id, reader.id);

        let cookie = session_cookie(&res).unwrap_or(cookie);
        let res = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&format!("/post/{}", post.id))
                .cookie(cookie)
                .to_request(),
        )
        .await;
        let body = body_string(res).await;
        assert!(body.contains("Great read"));
        assert!(body.contains(COMMENT_POSTED_NOTICE));
        assert!(body.contains("www.gravatar.com"));
    }

    #[actix_web::test]
    async fn test_empty_comment_is_rejected() {
        let ctx = TestContext::new();
        let admin = ctx.create_user("Admin", "admin@x.com", "adminpass1");
        let post = ctx.create_post(admin.id, "Hello");
        let app = crate::init_test_app!(ctx);
        let cookie = login_cookie(&app, "admin@x.com", "adminpass1").await;

        let req = test::TestRequest::post()
            .uri(&format!("/post/{}", post.id))
            .cookie(cookie)
            .set_form([("comment", "   ")])
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_string(res).await.contains("This field is required."));
        assert_eq!(ctx.db().count_comments_for_post(post.id).unwrap(), 0);
    }
}
