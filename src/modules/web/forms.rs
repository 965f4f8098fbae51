//! Form inputs and their field checks.
//!
//! Every form deserializes with missing fields as empty strings so a
//! truncated submission re-renders with field messages instead of a 400.

use crate::database::posts::{BlogPost, PostContent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const LOGIN_PASSWORD_MIN_LEN: usize = 10;

/// Field name -> first failing message.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<&'static str, String>);

impl FormErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Record a message unless the field already failed an earlier check.
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| message.into());
    }

    fn required(&mut self, field: &'static str, value: &str) {
        if value.trim().is_empty() {
            self.add(field, "This field is required.");
        }
    }

    fn min_length(&mut self, field: &'static str, value: &str, min: usize) {
        if value.chars().count() < min {
            self.add(field, format!("Field must be at least {} characters long.", min));
        }
    }

    fn url(&mut self, field: &'static str, value: &str) {
        if !is_valid_url(value.trim()) {
            self.add(field, "Invalid URL.");
        }
    }

    fn into_result(self) -> Result<(), FormErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// Absolute http(s) URL with a host.
pub fn is_valid_url(value: &str) -> bool {
    match url::Url::parse(value) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https")
                && parsed.host_str().is_some_and(|host| !host.is_empty())
        }
        Err(_) => false,
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PostForm {
    pub title: String,
    pub subtitle: String,
    pub img_url: String,
    pub body: String,
}

impl PostForm {
    pub fn validate(&self) -> Result<PostContent, FormErrors> {
        let mut errors = FormErrors::default();
        errors.required("title", &self.title);
        errors.required("subtitle", &self.subtitle);
        errors.required("img_url", &self.img_url);
        errors.url("img_url", &self.img_url);
        errors.required("body", &self.body);
        errors.into_result()?;

        Ok(PostContent {
            title: self.title.trim().to_string(),
            subtitle: self.subtitle.trim().to_string(),
            body: self.body.clone(),
            img_url: self.img_url.trim().to_string(),
        })
    }
}

impl From<&BlogPost> for PostForm {
    fn from(post: &BlogPost) -> Self {
        Self {
            title: post.title.clone(),
            subtitle: post.subtitle.clone(),
            img_url: post.img_url.clone(),
            body: post.body.clone(),
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl RegisterForm {
    pub fn validate(&self) -> Result<(), FormErrors> {
        let mut errors = FormErrors::default();
        errors.required("name", &self.name);
        errors.required("email", &self.email);
        errors.required("password", &self.password);
        errors.into_result()
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> Result<(), FormErrors> {
        let mut errors = FormErrors::default();
        errors.required("email", &self.email);
        errors.required("password", &self.password);
        errors.min_length("password", &self.password, LOGIN_PASSWORD_MIN_LEN);
        errors.into_result()
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CommentForm {
    pub comment: String,
}

impl CommentForm {
    pub fn validate(&self) -> Result<(), FormErrors> {
        let mut errors = FormErrors::default();
        errors.required("comment", &self.comment);
        errors.into_result()
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub message: String,
}

impl ContactForm {
    pub fn validate(&self) -> Result<(), FormErrors> {
        let mut errors = FormErrors::default();
        errors.required("name", &self.name);
        errors.required("email", &self.email);
        errors.required("phone", &self.phone);
        errors.required("message", &self.message);
        errors.into_result()
    }
}
