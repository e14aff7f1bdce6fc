use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::feature::{coerce, default_for, infer_type, Feature, ValueType};
use crate::models::token::{generate_secret, hash_secret, verifier_matches, ApiToken};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

/// Input for feature creation. The id is assigned here; a missing value
/// falls back to the type's zero-value.
#[derive(Debug)]
pub struct NewFeature {
    pub name: String,
    pub resource_id: String,
    pub value_type: ValueType,
    pub value: Option<Value>,
    pub active: bool,
}

/// Full replace of a feature's mutable fields. `resource_id` is immutable
/// after creation and deliberately absent.
#[derive(Debug)]
pub struct FeatureUpdate {
    pub name: String,
    pub value_type: ValueType,
    pub value: Option<Value>,
    pub active: bool,
}

#[derive(Debug, Default)]
pub struct FeatureFilter {
    pub resource_id: Option<String>,
    pub resource_id_prefix: Option<String>,
}

/// Result of a successful token verification.
#[derive(Debug)]
pub struct VerifiedToken {
    pub token_id: Uuid,
    pub created_by_uid: String,
}

#[derive(sqlx::FromRow)]
struct FeatureRow {
    id: Uuid,
    name: String,
    resource_id: String,
    value_type: String,
    value: Value,
    active: bool,
    created_at: DateTime<Utc>,
}

impl FeatureRow {
    fn into_feature(self) -> Feature {
        // Restate the type defensively when the stored tag is unreadable,
        // then force the value into agreement with it.
        let value_type =
            ValueType::parse(&self.value_type).unwrap_or_else(|| infer_type(&self.value));
        let value = coerce(&self.value, value_type);
        Feature {
            id: self.id,
            name: self.name,
            resource_id: self.resource_id,
            value_type,
            value,
            active: self.active,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    id: Uuid,
    name: String,
    created_by_uid: String,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
}

impl TokenRow {
    fn into_token(self) -> ApiToken {
        ApiToken {
            id: self.id,
            name: self.name,
            created_by_uid: self.created_by_uid,
            created_at: self.created_at,
            last_used_at: self.last_used_at,
        }
    }
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool. Lets tests use a lazy pool that never dials
    /// out until a query actually runs.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Readiness probe: one round-trip to the backend.
    pub async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // -- Feature Operations --

    pub async fn list_features(&self, filter: FeatureFilter) -> Result<Vec<Feature>, AppError> {
        let rows = if let Some(resource_id) = filter.resource_id {
            sqlx::query_as::<_, FeatureRow>(
                "SELECT id, name, resource_id, value_type, value, active, created_at \
                 FROM features WHERE resource_id = $1 ORDER BY created_at ASC",
            )
            .bind(resource_id)
            .fetch_all(&self.pool)
            .await?
        } else if let Some(prefix) = filter.resource_id_prefix {
            sqlx::query_as::<_, FeatureRow>(
                "SELECT id, name, resource_id, value_type, value, active, created_at \
                 FROM features WHERE starts_with(resource_id, $1) ORDER BY created_at ASC",
            )
            .bind(prefix)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, FeatureRow>(
                "SELECT id, name, resource_id, value_type, value, active, created_at \
                 FROM features ORDER BY created_at ASC",
            )
            .fetch_all(&self.pool)
            .await?
        };

        Ok(rows.into_iter().map(FeatureRow::into_feature).collect())
    }

    pub async fn get_feature(&self, id: Uuid) -> Result<Feature, AppError> {
        let row = sqlx::query_as::<_, FeatureRow>(
            "SELECT id, name, resource_id, value_type, value, active, created_at \
             FROM features WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound("feature"))?;

        Ok(row.into_feature())
    }

    pub async fn create_feature(&self, new: NewFeature) -> Result<Feature, AppError> {
        let value = match &new.value {
            Some(v) => coerce(v, new.value_type),
            None => default_for(new.value_type),
        };
        let id = Uuid::new_v4();

        let row = sqlx::query_as::<_, FeatureRow>(
            "INSERT INTO features (id, name, resource_id, value_type, value, active) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, name, resource_id, value_type, value, active, created_at",
        )
        .bind(id)
        .bind(&new.name)
        .bind(&new.resource_id)
        .bind(new.value_type.as_str())
        .bind(&value)
        .bind(new.active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, &new.name))?;

        Ok(row.into_feature())
    }

    pub async fn update_feature(&self, id: Uuid, update: FeatureUpdate) -> Result<Feature, AppError> {
        let value = match &update.value {
            Some(v) => coerce(v, update.value_type),
            None => default_for(update.value_type),
        };

        let row = sqlx::query_as::<_, FeatureRow>(
            "UPDATE features SET name = $2, value_type = $3, value = $4, active = $5 \
             WHERE id = $1 \
             RETURNING id, name, resource_id, value_type, value, active, created_at",
        )
        .bind(id)
        .bind(&update.name)
        .bind(update.value_type.as_str())
        .bind(&value)
        .bind(update.active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, &update.name))?
        .ok_or(AppError::NotFound("feature"))?;

        Ok(row.into_feature())
    }

    /// Toggle only the active flag; the value is untouched.
    pub async fn set_feature_active(&self, id: Uuid, active: bool) -> Result<Feature, AppError> {
        let row = sqlx::query_as::<_, FeatureRow>(
            "UPDATE features SET active = $2 WHERE id = $1 \
             RETURNING id, name, resource_id, value_type, value, active, created_at",
        )
        .bind(id)
        .bind(active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound("feature"))?;

        Ok(row.into_feature())
    }

    pub async fn delete_feature(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM features WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("feature"));
        }
        Ok(())
    }

    // -- Token Operations --

    /// Mint a token: persist the verifier first, then hand back the
    /// plaintext. A failed insert never leaks an unverifiable secret.
    pub async fn create_token(
        &self,
        name: &str,
        created_by_uid: &str,
    ) -> Result<(ApiToken, String), AppError> {
        let (plaintext, hash) = generate_secret();
        let id = Uuid::new_v4();

        let row = sqlx::query_as::<_, TokenRow>(
            "INSERT INTO api_tokens (id, name, token_hash, created_by_uid) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, name, created_by_uid, created_at, last_used_at",
        )
        .bind(id)
        .bind(name)
        .bind(&hash)
        .bind(created_by_uid)
        .fetch_one(&self.pool)
        .await?;

        Ok((row.into_token(), plaintext))
    }

    pub async fn list_tokens(&self) -> Result<Vec<ApiToken>, AppError> {
        let rows = sqlx::query_as::<_, TokenRow>(
            "SELECT id, name, created_by_uid, created_at, last_used_at \
             FROM api_tokens ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TokenRow::into_token).collect())
    }

    /// Resolve a presented secret to its token, touching `last_used_at`.
    /// Lookup is by hash; the final check is a constant-time compare so the
    /// match cost does not depend on how many characters agree.
    pub async fn verify_token(&self, raw_secret: &str) -> Result<VerifiedToken, AppError> {
        let candidate = hash_secret(raw_secret);

        let row = sqlx::query_as::<_, (Uuid, String, String)>(
            "SELECT id, token_hash, created_by_uid FROM api_tokens WHERE token_hash = $1",
        )
        .bind(&candidate)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::Unauthorized)?;

        let (token_id, stored_hash, created_by_uid) = row;
        if !verifier_matches(&candidate, &stored_hash) {
            return Err(AppError::Unauthorized);
        }

        // Last write wins under concurrent use of the same token.
        sqlx::query("UPDATE api_tokens SET last_used_at = NOW() WHERE id = $1")
            .bind(token_id)
            .execute(&self.pool)
            .await?;

        Ok(VerifiedToken {
            token_id,
            created_by_uid,
        })
    }

    pub async fn delete_token(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM api_tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("token"));
        }
        Ok(())
    }
}

fn conflict_on_unique(e: sqlx::Error, name: &str) -> AppError {
    match &e {
        sqlx::Error::Database(db)
            if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
        {
            AppError::Conflict(format!(
                "a feature named '{}' already exists for this resource",
                name
            ))
        }
        _ => AppError::from(e),
    }
}
