use axum::{
    Json,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;
use validator::Validate;

use murmur_types::api::Normalize;

use crate::error::ApiError;

/// JSON body extractor that normalizes and validates before the handler runs.
///
/// Any failure (bad JSON, missing field, rule violation) rejects the request
/// with `ApiError::Validation`.
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Normalize + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        let value = value.normalize();
        value.validate()?;
        Ok(Self(value))
    }
}
