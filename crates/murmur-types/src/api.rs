use std::borrow::Cow;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

// -- JWT Claims --

/// Session token claims. Shared by the auth gate (verify) and the auth
/// handlers (issue).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: usize,
    pub exp: usize,
}

// -- Normalization --

/// Applied to a request body after it parses and before it is validated.
/// The handler only ever sees the normalized value.
pub trait Normalize {
    fn normalize(self) -> Self;
}

fn normalize_email(email: String) -> String {
    email.trim().to_lowercase()
}

fn normalize_name(name: String) -> String {
    name.trim().to_string()
}

// -- Auth --

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[validate(length(min = 2, max = 70, message = "Name must be between 2 and 70 characters long"))]
    pub full_name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, max = 50, message = "Password must be between 6 and 50 characters long"))]
    pub password: String,
}

impl Normalize for SignupRequest {
    fn normalize(self) -> Self {
        Self {
            full_name: normalize_name(self.full_name),
            email: normalize_email(self.email),
            password: self.password,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    pub password: String,
}

impl Normalize for LoginRequest {
    fn normalize(self) -> Self {
        Self {
            email: normalize_email(self.email),
            password: self.password,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(min = 2, max = 70, message = "Name must be between 2 and 70 characters long"))]
    pub full_name: String,
    /// Base64 image payload, optionally as a `data:` URL. Omitted keeps the current avatar.
    #[serde(default)]
    #[validate(custom(function = "validate_base64"))]
    pub profile_pic: Option<String>,
}

impl Normalize for UpdateProfileRequest {
    fn normalize(self) -> Self {
        Self {
            full_name: normalize_name(self.full_name),
            profile_pic: self.profile_pic.map(|p| p.trim().to_string()),
        }
    }
}

// -- Channels --

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateChannelRequest {
    #[validate(length(min = 1, message = "Channel name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(
        length(max = 1000, message = "A channel can be created with at most 1000 members"),
        custom(function = "validate_ids")
    )]
    pub members: Vec<String>,
}

impl Normalize for CreateChannelRequest {
    fn normalize(self) -> Self {
        Self {
            name: normalize_name(self.name),
            members: self.members.into_iter().map(|m| m.trim().to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateChannelRequest {
    #[validate(length(min = 1, message = "Channel name is required"))]
    pub name: String,
}

impl Normalize for UpdateChannelRequest {
    fn normalize(self) -> Self {
        Self {
            name: normalize_name(self.name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AddMembersRequest {
    #[validate(
        length(min = 1, max = 1000, message = "Between 1 and 1000 members can be added at once"),
        custom(function = "validate_ids")
    )]
    pub members: Vec<String>,
}

impl Normalize for AddMembersRequest {
    fn normalize(self) -> Self {
        Self {
            members: self.members.into_iter().map(|m| m.trim().to_string()).collect(),
        }
    }
}

// -- Messages --

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, message = "Message cannot be empty"))]
    pub text: String,
    #[serde(default)]
    pub image: Option<String>,
}

impl Normalize for SendMessageRequest {
    fn normalize(self) -> Self {
        self
    }
}

// -- Responses --

/// `{ "message": ... }`: used for acknowledgements and every non-validation error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub message: String,
}

impl StatusResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One field-level violation in a `validationErrors` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub path: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationErrorBody {
    pub validation_errors: Vec<FieldError>,
}

/// Flatten `validator` output into field errors keyed by the JSON (camelCase)
/// field name, sorted by path.
pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out = Vec::new();
    for (field, kind) in errors.errors() {
        if let ValidationErrorsKind::Field(list) = kind {
            for e in list {
                out.push(FieldError {
                    path: camel_case(field),
                    code: e.code.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string()),
                });
            }
        }
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

// -- Custom rules --

fn validate_ids(ids: &[String]) -> Result<(), ValidationError> {
    if ids.iter().all(|id| Uuid::parse_str(id).is_ok()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_id").with_message(Cow::Borrowed("Invalid identifier")))
    }
}

fn validate_base64(value: &str) -> Result<(), ValidationError> {
    let payload = match value.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => value,
    };
    B64.decode(payload)
        .map(|_| ())
        .map_err(|_| ValidationError::new("invalid_base64").with_message(Cow::Borrowed("Invalid base64 string")))
}
