mod action;
mod models;

pub use action::HttpRequestAction;
pub use models::{AuthorizationConfig, AuthorizationType, ContentType, HttpBody, HttpRequestMethod};
