/*!
 * # Authentication and warehouse access
 *
 * Bearer tokens are HS256 JWTs issued by an external login service; the
 * subject claim carries the numeric user id. Authorization is resolved per
 * request from the set of warehouses the user manages:
 *
 * - purchase order transitions need the order's primary warehouse
 * - progress updates, transfers and the detail view need any warehouse the
 *   item touches (primary, item, or one holding progress for the item)
 */

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QuerySelect};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{db::DbPool, entities::warehouse, errors::ServiceError, AppState};

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Numeric user id
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn for_user(user_id: i64, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            name: None,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }
}

/// Verifies bearer tokens against the shared HS256 secret.
#[derive(Clone)]
pub struct TokenVerifier {
    secret: String,
}

impl TokenVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn verify(&self, token: &str) -> Result<AuthUser, ServiceError> {
        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                ServiceError::Unauthorized("token expired".to_string())
            }
            _ => ServiceError::Unauthorized("invalid token".to_string()),
        })?
        .claims;

        let user_id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| ServiceError::Unauthorized("invalid token subject".to_string()))?;

        Ok(AuthUser {
            user_id,
            name: claims.name,
        })
    }

    /// Signs claims with the shared secret. Used by tooling and tests; login lives elsewhere.
    pub fn sign(&self, claims: &Claims) -> Result<String, ServiceError> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| ServiceError::InternalError(format!("failed to sign token: {}", e)))
    }
}

/// Authenticated caller extracted from the `Authorization: Bearer` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: i64,
    pub name: Option<String>,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized("missing bearer token".to_string()))?;

        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ServiceError::Unauthorized("missing bearer token".to_string()))?;

        let user = TokenVerifier::new(state.config.jwt_secret.as_str()).verify(token)?;
        debug!(user_id = user.user_id, "authenticated request");
        Ok(user)
    }
}

/// Identity/access collaborator: which warehouses a user may act for.
#[async_trait]
pub trait WarehouseAccess: Send + Sync {
    async fn warehouse_ids_for_user(&self, user_id: i64) -> Result<HashSet<i64>, ServiceError>;
}

/// Reads warehouse membership from the managers recorded on warehouses.
#[derive(Clone)]
pub struct DbWarehouseAccess {
    db: Arc<DbPool>,
}

impl DbWarehouseAccess {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl WarehouseAccess for DbWarehouseAccess {
    async fn warehouse_ids_for_user(&self, user_id: i64) -> Result<HashSet<i64>, ServiceError> {
        let ids: Vec<i64> = warehouse::Entity::find()
            .select_only()
            .column(warehouse::Column::Id)
            .filter(warehouse::Column::ManagerId.eq(user_id))
            .filter(warehouse::Column::IsDeleted.eq(false))
            .into_tuple()
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(ids.into_iter().collect())
    }
}

/// Warehouses resolved for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarehouseScope {
    pub user_id: i64,
    pub warehouse_ids: HashSet<i64>,
}

impl WarehouseScope {
    pub async fn resolve(
        access: &dyn WarehouseAccess,
        user_id: i64,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            user_id,
            warehouse_ids: access.warehouse_ids_for_user(user_id).await?,
        })
    }

    pub fn contains(&self, warehouse_id: i64) -> bool {
        self.warehouse_ids.contains(&warehouse_id)
    }

    pub fn any_of<I>(&self, warehouse_ids: I) -> bool
    where
        I: IntoIterator<Item = i64>,
    {
        warehouse_ids.into_iter().any(|id| self.contains(id))
    }

    pub fn require(&self, warehouse_id: i64, what: &str) -> Result<(), ServiceError> {
        if self.contains(warehouse_id) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "user {} has no access to the warehouse of this {}",
                self.user_id, what
            )))
        }
    }

    pub fn require_any<I>(&self, warehouse_ids: I, what: &str) -> Result<(), ServiceError>
    where
        I: IntoIterator<Item = i64>,
    {
        if self.any_of(warehouse_ids) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "user {} has no access to any warehouse of this {}",
                self.user_id, what
            )))
        }
    }

    /// Sorted ids, for responses.
    pub fn sorted_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.warehouse_ids.iter().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SECRET: &str = "a-test-secret-that-is-long-enough-0123456789";

    #[test]
    fn signed_tokens_verify() {
        let verifier = TokenVerifier::new(SECRET);
        let token = verifier
            .sign(&Claims::for_user(42, Duration::hours(1)))
            .unwrap();
        assert_eq!(verifier.verify(&token).unwrap().user_id, 42);
    }

    #[test]
    fn wrong_secret_and_expired_tokens_are_rejected() {
        let token = TokenVerifier::new("another-secret-that-is-also-long-enough-xx")
            .sign(&Claims::for_user(1, Duration::hours(1)))
            .unwrap();
        assert_matches!(
            TokenVerifier::new(SECRET).verify(&token),
            Err(ServiceError::Unauthorized(_))
        );

        let verifier = TokenVerifier::new(SECRET);
        let expired = verifier
            .sign(&Claims::for_user(1, Duration::hours(-2)))
            .unwrap();
        assert_matches!(verifier.verify(&expired), Err(ServiceError::Unauthorized(_)));
    }

    #[test]
    fn non_numeric_subject_is_rejected() {
        let verifier = TokenVerifier::new(SECRET);
        let mut claims = Claims::for_user(1, Duration::hours(1));
        claims.sub = "alice".into();
        let token = verifier.sign(&claims).unwrap();
        assert_matches!(verifier.verify(&token), Err(ServiceError::Unauthorized(_)));
    }

    #[test]
    fn scope_checks() {
        let scope = WarehouseScope {
            user_id: 7,
            warehouse_ids: HashSet::from([1, 3]),
        };
        assert!(scope.require(1, "purchase order").is_ok());
        assert_matches!(
            scope.require(2, "purchase order"),
            Err(ServiceError::Forbidden(_))
        );
        assert!(scope.require_any([2, 3], "item").is_ok());
        assert!(scope.require_any([2, 4], "item").is_err());
        assert_eq!(scope.sorted_ids(), vec![1, 3]);
    }
}
