use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::commands::DocumentKey;
use crate::errors::ServiceError;
use crate::services::Page;

/// Header carrying the authenticated caller's id.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

/// Parses a path segment holding either a document id or its serial number.
pub fn document_key(raw: &str) -> Result<DocumentKey, ServiceError> {
    raw.parse()
}

/// The caller on whose behalf an operation runs.
#[derive(Debug, Clone, Copy)]
pub struct Actor(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ACTOR_HEADER)
            .ok_or_else(|| ServiceError::BadRequest(format!("missing {} header", ACTOR_HEADER)))?
            .to_str()
            .map_err(|_| ServiceError::BadRequest(format!("{} is not valid text", ACTOR_HEADER)))?;

        Uuid::parse_str(raw.trim())
            .map(Actor)
            .map_err(|_| ServiceError::BadRequest(format!("{} must be a UUID", ACTOR_HEADER)))
    }
}

/// Standard pagination response metadata
#[derive(Debug, Serialize)]
pub struct PaginationMeta {
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl PaginationMeta {
    pub fn new(page: u64, per_page: u64, total: u64) -> Self {
        let total_pages = if total == 0 || per_page == 0 {
            0
        } else {
            (total + per_page - 1) / per_page
        };
        Self {
            page,
            per_page,
            total,
            total_pages,
        }
    }
}

/// Standard paginated response wrapper
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> From<Page<T>> for PaginatedResponse<T> {
    fn from(page: Page<T>) -> Self {
        Self {
            data: page.items,
            pagination: PaginationMeta::new(page.page, page.per_page, page.total),
        }
    }
}
