use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use sokoni_core::domain::geo::GeoPoint;
use sokoni_core::domain::user::{OnboardingStep, User, UserAction, UserId, UserRole};
use sokoni_core::ports::{ConversationStore, NearbyUser, StoreError};

use crate::DbPool;

/// SQLite-backed conversation state. Each mutation touches a single row;
/// callers serialize turns per user, so no cross-statement transaction is
/// needed here.
pub struct SqlConversationStore {
    pool: DbPool,
}

impl SqlConversationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn decode_user_row(row: &SqliteRow) -> Result<User, StoreError> {
    let id: String = row.try_get("id").map_err(db_error)?;
    let name: Option<String> = row.try_get("name").map_err(db_error)?;
    let lat: Option<f64> = row.try_get("lat").map_err(db_error)?;
    let lng: Option<f64> = row.try_get("lng").map_err(db_error)?;
    let role_raw: Option<String> = row.try_get("role").map_err(db_error)?;
    let action_raw: Option<String> = row.try_get("action").map_err(db_error)?;
    let requirements_raw: String = row.try_get("requirements").map_err(db_error)?;

    let location = match (lat, lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
        (None, None) => None,
        _ => {
            return Err(StoreError::Decode(format!(
                "user `{id}` has a partial location (lat/lng must be set together)"
            )))
        }
    };

    let role =
        role_raw.map(|value| value.parse::<UserRole>()).transpose().map_err(StoreError::Decode)?;
    let action = action_raw
        .map(|value| value.parse::<UserAction>())
        .transpose()
        .map_err(StoreError::Decode)?;
    let requirements: Vec<OnboardingStep> =
        serde_json::from_str(&requirements_raw).map_err(|err| {
            StoreError::Decode(format!("user `{id}` has malformed requirements: {err}"))
        })?;

    Ok(User { id: UserId(id), name, location, role, action, requirements })
}

#[async_trait]
impl ConversationStore for SqlConversationStore {
    async fn get_user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, lat, lng, role, action, requirements FROM users WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.as_ref().map(decode_user_row).transpose()
    }

    async fn create_user(&self, id: &UserId) -> Result<User, StoreError> {
        let user = User::onboarding(id.clone());
        let requirements = serde_json::to_string(&user.requirements)
            .map_err(|err| StoreError::Decode(err.to_string()))?;
        let action = user.action.map(|action| action.as_str());

        sqlx::query("INSERT INTO users (id, action, requirements) VALUES (?, ?, ?)")
            .bind(&user.id.0)
            .bind(action)
            .bind(requirements)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(user)
    }

    async fn set_name(&self, id: &UserId, name: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET name = ? WHERE id = ?")
            .bind(name)
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn set_location(&self, id: &UserId, point: GeoPoint) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET lat = ?, lng = ? WHERE id = ?")
            .bind(point.lat)
            .bind(point.lng)
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn set_role(&self, id: &UserId, role: UserRole) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn pop_front_requirement(&self, id: &UserId) -> Result<(), StoreError> {
        let Some(user) = self.get_user(id).await? else {
            return Err(StoreError::Backend(format!("user `{id}` not found")));
        };

        let remaining: Vec<OnboardingStep> = user.requirements.into_iter().skip(1).collect();
        let requirements = serde_json::to_string(&remaining)
            .map_err(|err| StoreError::Decode(err.to_string()))?;

        sqlx::query("UPDATE users SET requirements = ? WHERE id = ?")
            .bind(requirements)
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn clear_state(&self, id: &UserId) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET action = NULL, requirements = '[]' WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn find_near(
        &self,
        point: GeoPoint,
        radius_m: f64,
    ) -> Result<Vec<NearbyUser>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, lat, lng, role, action, requirements
             FROM users
             WHERE lat IS NOT NULL AND lng IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut nearby = Vec::new();
        for row in &rows {
            let user = decode_user_row(row)?;
            let Some(location) = user.location else { continue };

            let distance_m = point.distance_m(&location);
            if distance_m <= radius_m {
                nearby.push(NearbyUser { user, distance_m });
            }
        }

        nearby.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        Ok(nearby)
    }
}

pub(crate) fn db_error(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}
