use crate::config::Config;
use crate::database::comments::Comment;
use crate::database::posts::BlogPost;
use crate::error::AppError;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tera::{Context, Tera, Value};

/// Per-request state every page shows in its navigation bar.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PageState {
    pub logged_in: bool,
    pub is_admin: bool,
    pub user_name: Option<String>,
    pub flashes: Vec<String>,
}

pub struct TemplateRenderer {
    tera: Tera,
    config: Config,
}

impl TemplateRenderer {
    /// Templates found in `paths.templates_dir` override the built-in ones
    /// by name; anything missing falls back to the built-ins.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let builtin = Self::create_builtin_templates()?;

        let mut tera = if config.paths.templates_dir.is_dir() {
            let pattern = format!("{}/**/*.html", config.paths.templates_dir.display());
            log::debug!("Looking for templates with pattern: {}", pattern);
            match Tera::new(&pattern) {
                Ok(mut t) => {
                    log::info!(
                        "Loaded {} template(s) from directory",
                        t.get_template_names().count()
                    );
                    t.extend(&builtin)?;
                    t
                }
                Err(e) => {
                    log::warn!("Failed to load templates: {}", e);
                    log::info!("Using built-in templates");
                    builtin
                }
            }
        } else {
            builtin
        };

        tera.register_filter("gravatar", gravatar_filter);

        Ok(Self {
            tera,
            config: config.clone(),
        })
    }

    fn create_builtin_templates() -> Result<Tera, AppError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("base.html", BASE_TEMPLATE),
            ("index.html", INDEX_TEMPLATE),
            ("post.html", POST_TEMPLATE),
            ("make-post.html", MAKE_POST_TEMPLATE),
            ("register.html", REGISTER_TEMPLATE),
            ("login.html", LOGIN_TEMPLATE),
            ("about.html", ABOUT_TEMPLATE),
            ("contact.html", CONTACT_TEMPLATE),
        ])?;
        Ok(tera)
    }

    fn base_context(&self, state: &PageState) -> Context {
        let mut context = Context::new();
        context.insert("site", &self.config.site);
        context.insert("logged_in", &state.logged_in);
        context.insert("is_admin", &state.is_admin);
        context.insert("user_name", &state.user_name);
        context.insert("flashes", &state.flashes);
        context
    }

    pub fn render_index(&self, state: &PageState, posts: &[BlogPost]) -> Result<String, AppError> {
        let mut context = self.base_context(state);
        context.insert("all_posts", posts);
        self.render_with_context("index.html", &context)
    }

    pub fn render_post<F, E>(
        &self,
        state: &PageState,
        post: &BlogPost,
        comments: &[Comment],
        form: &F,
        errors: &E,
    ) -> Result<String, AppError>
    where
        F: Serialize,
        E: Serialize,
    {
        let mut context = self.base_context(state);
        context.insert("post", post);
        context.insert("comments", comments);
        context.insert("form", form);
        context.insert("errors", errors);
        self.render_with_context("post.html", &context)
    }

    pub fn render_make_post<F, E>(
        &self,
        state: &PageState,
        form: &F,
        errors: &E,
        edit_post_id: Option<i64>,
    ) -> Result<String, AppError>
    where
        F: Serialize,
        E: Serialize,
    {
        let mut context = self.base_context(state);
        context.insert("form", form);
        context.insert("errors", errors);
        context.insert("is_edit", &edit_post_id.is_some());
        context.insert("post_id", &edit_post_id);
        self.render_with_context("make-post.html", &context)
    }

    pub fn render_form<F, E>(
        &self,
        template: &str,
        state: &PageState,
        form: &F,
        errors: &E,
    ) -> Result<String, AppError>
    where
        F: Serialize,
        E: Serialize,
    {
        let mut context = self.base_context(state);
        context.insert("form", form);
        context.insert("errors", errors);
        self.render_with_context(template, &context)
    }

    pub fn render_about(&self, state: &PageState) -> Result<String, AppError> {
        self.render_with_context("about.html", &self.base_context(state))
    }

    pub fn render_contact<F, E>(
        &self,
        state: &PageState,
        form: &F,
        errors: &E,
        msg_sent: bool,
    ) -> Result<String, AppError>
    where
        F: Serialize,
        E: Serialize,
    {
        let mut context = self.base_context(state);
        context.insert("form", form);
        context.insert("errors", errors);
        context.insert("msg_sent", &msg_sent);
        self.render_with_context("contact.html", &context)
    }

    pub fn render_with_context(&self, template: &str, context: &Context) -> Result<String, AppError> {
        Ok(self.tera.render(template, context)?)
    }
}

/// Gravatar URL for an email address.
pub fn gravatar_url(email: &str, size: u32) -> String {
    let digest = Sha256::digest(email.trim().to_lowercase().as_bytes());
    format!(
        "https://www.gravatar.com/avatar/{}?s={}&d=retro",
        hex::encode(digest),
        size
    )
}

fn gravatar_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let email = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("gravatar filter expects a string"))?;
    let size = args
        .get("size")
        .and_then(Value::as_u64)
        .and_then(|s| u32::try_from(s).ok())
        .unwrap_or(100);
    Ok(Value::String(gravatar_url(email, size)))
}

const BASE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{% block title %}{{ site.title }}{% endblock title %}</title>
    <meta name="description" content="{{ site.description }}">
    <link rel="stylesheet" href="/static/css/styles.css">
</head>
<body>
<nav>
    <a href="/">{{ site.title }}</a>
    <a href="/">Home</a>
    <a href="/about">About</a>
    <a href="/contact">Contact</a>
    {% if logged_in %}
    <span class="principal">{{ user_name }}</span>
    <a href="/logout">Log Out</a>
    {% else %}
    <a href="/login">Login</a>
    <a href="/register">Register</a>
    {% endif %}
</nav>
{% for message in flashes %}
<p class="flash">{{ message }}</p>
{% endfor %}
<main>
{% block content %}{% endblock content %}
</main>
<footer>
    <p>Copyright &copy; {{ site.author }}</p>
</footer>
</body>
</html>
"#;

const INDEX_TEMPLATE: &str = r#"{% extends "base.html" %}
{% block content %}
<header>
    <h1>{{ site.title }}</h1>
    <p>{{ site.description }}</p>
</header>
{% for post in all_posts %}
<article class="post-preview">
    <a href="/post/{{ post.id }}">
        <h2>{{ post.title }}</h2>
        <h3>{{ post.subtitle }}</h3>
    </a>
    <p class="post-meta">Posted by {{ post.author_name }} on {{ post.date }}
    {% if is_admin %}<a href="/delete/{{ post.id }}">&#10008;</a>{% endif %}
    </p>
</article>
{% else %}
<p>No posts yet.</p>
{% endfor %}
{% if is_admin %}
<a class="button" href="/new-post">Create New Post</a>
{% endif %}
{% endblock content %}
"#;

const POST_TEMPLATE: &str = r#"{% extends "base.html" %}
{% block title %}{{ post.title }} - {{ site.title }}{% endblock title %}
{% block content %}
<header style="background-image: url('{{ post.img_url }}')">
    <h1>{{ post.title }}</h1>
    <h2>{{ post.subtitle }}</h2>
    <p class="meta">Posted by {{ post.author_name }} on {{ post.date }}</p>
</header>
<article>
{{ post.body | safe }}
</article>
{% if is_admin %}
<a class="button" href="/edit-post/{{ post.id }}">Edit Post</a>
{% endif %}
<section class="comments">
    <form method="post" action="/post/{{ post.id }}">
        <label for="comment">What do you think?</label>
        <textarea id="comment" name="comment">{{ form.comment }}</textarea>
        {% if errors.comment %}<p class="error">{{ errors.comment }}</p>{% endif %}
        <button type="submit">Post Comment</button>
    </form>
    <ul class="comment-list">
    {% for comment in comments %}
        <li>
            <img src="{{ comment.commenter_email | gravatar(size=100) }}" alt="">
            <div class="comment-text">
                <p>{{ comment.content }}</p>
                <span class="sub-text">{{ comment.commenter_name }}</span>
            </div>
        </li>
    {% endfor %}
    </ul>
</section>
{% endblock content %}
"#;

const MAKE_POST_TEMPLATE: &str = r#"{% extends "base.html" %}
{% block content %}
<h1>{% if is_edit %}Edit Post{% else %}New Post{% endif %}</h1>
<form method="post" action="{% if is_edit %}/edit-post/{{ post_id }}{% else %}/new-post{% endif %}">
    <label for="title">Blog Post Title</label>
    <input id="title" name="title" value="{{ form.title }}">
    {% if errors.title %}<p class="error">{{ errors.title }}</p>{% endif %}
    <label for="subtitle">Subtitle</label>
    <input id="subtitle" name="subtitle" value="{{ form.subtitle }}">
    {% if errors.subtitle %}<p class="error">{{ errors.subtitle }}</p>{% endif %}
    <label for="img_url">Blog Image URL</label>
    <input id="img_url" name="img_url" value="{{ form.img_url }}">
    {% if errors.img_url %}<p class="error">{{ errors.img_url }}</p>{% endif %}
    <label for="body">Blog Content</label>
    <textarea id="body" name="body">{{ form.body }}</textarea>
    {% if errors.body %}<p class="error">{{ errors.body }}</p>{% endif %}
    <button type="submit">Submit Post</button>
</form>
{% endblock content %}
"#;

const REGISTER_TEMPLATE: &str = r#"{% extends "base.html" %}
{% block content %}
<h1>Register</h1>
<form method="post" action="/register">
    <label for="name">Name</label>
    <input id="name" name="name" value="{{ form.name }}">
    {% if errors.name %}<p class="error">{{ errors.name }}</p>{% endif %}
    <label for="email">Email</label>
    <input id="email" name="email" value="{{ form.email }}">
    {% if errors.email %}<p class="error">{{ errors.email }}</p>{% endif %}
    <label for="password">Password</label>
    <input id="password" name="password" type="password">
    {% if errors.password %}<p class="error">{{ errors.password }}</p>{% endif %}
    <button type="submit">Create Account</button>
</form>
{% endblock content %}
"#;

const LOGIN_TEMPLATE: &str = r#"{% extends "base.html" %}
{% block content %}
<h1>Log In</h1>
<form method="post" action="/login">
    <label for="email">Email</label>
    <input id="email" name="email" value="{{ form.email }}">
    {% if errors.email %}<p class="error">{{ errors.email }}</p>{% endif %}
    <label for="password">Password</label>
    <input id="password" name="password" type="password">
    {% if errors.password %}<p class="error">{{ errors.password }}</p>{% endif %}
    <button type="submit">Log in.</button>
</form>
{% endblock content %}
"#;

const ABOUT_TEMPLATE: &str = r#"{% extends "base.html" %}
{% block content %}
<h1>About Me</h1>
<p>{{ site.description }}</p>
{% endblock content %}
"#;

const CONTACT_TEMPLATE: &str = r#"{% extends "base.html" %}
{% block content %}
<h1>{% if msg_sent %}Successfully sent your message{% else %}Contact Me{% endif %}</h1>
<form method="post" action="/contact">
    <label for="name">Name</label>
    <input id="name" name="name" value="{{ form.name }}">
    {% if errors.name %}<p class="error">{{ errors.name }}</p>{% endif %}
    <label for="email">Email Address</label>
    <input id="email" name="email" value="{{ form.email }}">
    {% if errors.email %}<p class="error">{{ errors.email }}</p>{% endif %}
    <label for="phone">Phone Number</label>
    <input id="phone" name="phone" value="{{ form.phone }}">
    {% if errors.phone %}<p class="error">{{ errors.phone }}</p>{% endif %}
    <label for="message">Message</label>
    <textarea id="message" name="message">{{ form.message }}</textarea>
    {% if errors.message %}<p class="error">{{ errors.message }}</p>{% endif %}
    <button type="submit">Send</button>
</form>
{% endblock content %}
"#;
