use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::error::{InventoryError, InventoryResult};
use crate::constants::{
    DEFAULT_ADMIN_ID, DEFAULT_ADMIN_NAME, DEFAULT_ADMIN_PIN, MAX_PIN_LENGTH, MIN_PIN_LENGTH,
};
use crate::models::{new_id, NewUser, Role, User, UserUpdate};
use crate::store::{InventoryStore, StoreError};

/// PIN users and the default administrator
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn InventoryStore>,
    hash_cost: u32,
}

impl UserService {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self::with_hash_cost(store, bcrypt::DEFAULT_COST)
    }

    pub fn with_hash_cost(store: Arc<dyn InventoryStore>, hash_cost: u32) -> Self {
        Self { store, hash_cost }
    }

    pub async fn list_users(&self) -> InventoryResult<Vec<User>> {
        Ok(self.store.list_users().await?)
    }

    pub async fn get_user(&self, id: &str) -> InventoryResult<Option<User>> {
        Ok(self.store.get_user(id).await?)
    }

    #[instrument(skip(self, new_user), fields(name = %new_user.name, role = %new_user.role))]
    pub async fn create_user(&self, new_user: NewUser) -> InventoryResult<User> {
        let name = new_user.name.trim().to_string();
        if name.is_empty() {
            return Err(InventoryError::validation("User name is required"));
        }
        validate_pin_format(&new_user.pin)?;
        self.ensure_pin_unused(&new_user.pin, None).await?;

        let user = User {
            id: new_user
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(new_id),
            name,
            pin: self.hash_pin(&new_user.pin)?,
            role: new_user.role,
            active: true,
            created_at: Utc::now(),
        };
        self.store.insert_user(&user).await?;
        info!(user_id = %user.id, "👤 User created");
        Ok(user)
    }

    #[instrument(skip(self, update))]
    pub async fn update_user(&self, id: &str, update: UserUpdate) -> InventoryResult<User> {
        let mut user = self
            .store
            .get_user(id)
            .await?
            .ok_or_else(|| InventoryError::UserNotFound {
                user_id: id.to_string(),
            })?;

        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(InventoryError::validation("User name cannot be empty"));
            }
            user.name = name;
        }
        if let Some(pin) = update.pin {
            validate_pin_format(&pin)?;
            self.ensure_pin_unused(&pin, Some(id)).await?;
            user.pin = self.hash_pin(&pin)?;
        }
        if let Some(role) = update.role {
            user.role = role;
        }
        if let Some(active) = update.active {
            user.active = active;
        }

        self.store.update_user(&user).await?;
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn deactivate_user(&self, id: &str) -> InventoryResult<bool> {
        let Some(mut user) = self.store.get_user(id).await? else {
            return Ok(false);
        };
        user.active = false;
        let updated = self.store.update_user(&user).await?;
        if updated {
            warn!(user_id = %id, "🚫 User deactivated");
        }
        Ok(updated)
    }

    /// First active user whose PIN matches
    pub async fn validate_pin(&self, pin: &str) -> InventoryResult<Option<User>> {
        if pin.is_empty() {
            return Ok(None);
        }
        let users = self.store.list_users().await?;
        Ok(users
            .into_iter()
            .filter(|u| u.active)
            .find(|u| pin_matches(pin, u)))
    }

    /// Create the default administrator when the user table is empty
    pub async fn seed_default_user(&self) -> InventoryResult<Option<User>> {
        let users = match self.store.list_users().await {
            Ok(users) => users,
            Err(StoreError::NotConfigured) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if let Some(existing) = users.into_iter().next() {
            return Ok(Some(existing));
        }

        let admin = self.default_admin()?;
        match self.store.insert_user(&admin).await {
            Ok(()) => {
                info!("👤 Seeded default administrator '{}'", admin.id);
                Ok(Some(admin))
            }
            Err(StoreError::NotConfigured) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Wipe every table, leaving only the default administrator
    #[instrument(skip(self))]
    pub async fn reset_all_data(&self) -> InventoryResult<()> {
        let admin = self.default_admin()?;
        self.store.reset_all(&admin).await?;
        warn!("🧹 All inventory data has been reset");
        Ok(())
    }

    fn default_admin(&self) -> InventoryResult<User> {
        Ok(User {
            id: DEFAULT_ADMIN_ID.to_string(),
            name: DEFAULT_ADMIN_NAME.to_string(),
            pin: self.hash_pin(DEFAULT_ADMIN_PIN)?,
            role: Role::Admin,
            active: true,
            created_at: Utc::now(),
        })
    }

    fn hash_pin(&self, pin: &str) -> InventoryResult<String> {
        bcrypt::hash(pin, self.hash_cost)
            .map_err(|e| InventoryError::validation(format!("Failed to hash PIN: {e}")))
    }

    async fn ensure_pin_unused(&self, pin: &str, except_user: Option<&str>) -> InventoryResult<()> {
        let users = self.store.list_users().await?;
        let taken = users
            .iter()
            .filter(|u| u.active && Some(u.id.as_str()) != except_user)
            .any(|u| pin_matches(pin, u));
        if taken {
            return Err(InventoryError::validation("PIN is already in use"));
        }
        Ok(())
    }
}

fn validate_pin_format(pin: &str) -> InventoryResult<()> {
    let valid_length = (MIN_PIN_LENGTH..=MAX_PIN_LENGTH).contains(&pin.len());
    if !valid_length || !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(InventoryError::validation(format!(
            "PIN must be {MIN_PIN_LENGTH}-{MAX_PIN_LENGTH} digits"
        )));
    }
    Ok(())
}

fn pin_matches(pin: &str, user: &User) -> bool {
    if user.pin.starts_with("$2") {
        bcrypt::verify(pin, &user.pin).unwrap_or(false)
    } else {
        let valid = pin == user.pin;
        if valid {
            warn!(
                "User '{}' is using a legacy plain text PIN. Schedule migration to bcrypt.",
                user.id
            );
        }
        valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LocalStore, UnconfiguredStore};

    fn service() -> UserService {
        UserService::with_hash_cost(Arc::new(LocalStore::in_memory()), 4)
    }

    fn new_user(name: &str, pin: &str) -> NewUser {
        NewUser {
            id: None,
            name: name.to_string(),
            pin: pin.to_string(),
            role: Role::Counter,
        }
    }

    #[tokio::test]
    async fn test_seed_and_login_default_admin() {
        let users = service();
        let admin = users.seed_default_user().await.unwrap().unwrap();
        assert_eq!(admin.id, "admin");
        assert!(admin.pin.starts_with("$2"));

        let found = users.validate_pin("1234").await.unwrap().unwrap();
        assert_eq!(found.role, Role::Admin);
        assert!(users.validate_pin("9999").await.unwrap().is_none());

        // seeding twice keeps the existing user
        users.seed_default_user().await.unwrap();
        assert_eq!(users.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pin_rules() {
        let users = service();
        users.create_user(new_user("Marco", "5678")).await.unwrap();
        assert!(matches!(
            users.create_user(new_user("Jo", "12")).await,
            Err(InventoryError::Validation(_))
        ));
        assert!(matches!(
            users.create_user(new_user("Jo", "12ab")).await,
            Err(InventoryError::Validation(_))
        ));
        assert!(matches!(
            users.create_user(new_user("Jo", "5678")).await,
            Err(InventoryError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_deactivated_user_cannot_log_in() {
        let users = service();
        let user = users.create_user(new_user("Kim", "4321")).await.unwrap();
        assert!(users.validate_pin("4321").await.unwrap().is_some());
        assert!(users.deactivate_user(&user.id).await.unwrap());
        assert!(users.validate_pin("4321").await.unwrap().is_none());
        assert!(!users.deactivate_user("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn test_legacy_plaintext_pin_accepted() {
        let store = Arc::new(LocalStore::in_memory());
        store
            .insert_user(&User {
                id: "legacy".to_string(),
                name: "Legacy".to_string(),
                pin: "2468".to_string(),
                role: Role::User,
                active: true,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let users = UserService::with_hash_cost(store, 4);
        assert_eq!(users.validate_pin("2468").await.unwrap().unwrap().id, "legacy");
    }

    #[tokio::test]
    async fn test_update_rehashes_pin() {
        let users = service();
        let user = users.create_user(new_user("Lee", "1111")).await.unwrap();
        let updated = users
            .update_user(
                &user.id,
                UserUpdate {
                    pin: Some("2222".to_string()),
                    role: Some(Role::Admin),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.role, Role::Admin);
        assert!(users.validate_pin("1111").await.unwrap().is_none());
        assert_eq!(users.validate_pin("2222").await.unwrap().unwrap().id, user.id);
        assert!(matches!(
            users.update_user("ghost", UserUpdate::default()).await,
            Err(InventoryError::UserNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_seed_without_backend_is_noop() {
        let users = UserService::with_hash_cost(Arc::new(UnconfiguredStore), 4);
        assert!(users.seed_default_user().await.unwrap().is_none());
    }
}
