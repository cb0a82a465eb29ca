//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! `ProfileStore`, `ServiceTypeSource` and `MessageStore` ports from the core
//! crate. It handles all interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cleaning_core::domain::{Message, MessageStatus, Profile, ProfileUpdate, UserType};
use cleaning_core::ports::{
    MessageStore, PortError, PortResult, ProfileStore, ServiceTypeSource,
};
use cleaning_core::pricing::ServiceType;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the storage ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const PROFILE_COLUMNS: &str = "id, user_type, first_name, last_name, email, phone, address";

#[derive(FromRow)]
struct ProfileRecord {
    id: Uuid,
    user_type: String,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
}
impl ProfileRecord {
    /// The role column is free text in the database; it is parsed here.
    fn to_domain(self) -> PortResult<Profile> {
        let user_type = self
            .user_type
            .parse::<UserType>()
            .map_err(|e| PortError::InvalidData(e.to_string()))?;
        Ok(Profile {
            id: self.id,
            user_type,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            address: self.address,
        })
    }
}

#[derive(FromRow)]
struct ServiceTypeRecord {
    id: String,
    name: String,
    price_multiplier: Decimal,
    description: Option<String>,
}
impl ServiceTypeRecord {
    fn to_domain(self) -> ServiceType {
        ServiceType {
            id: self.id,
            name: self.name,
            price_multiplier: self.price_multiplier,
            description: self.description,
        }
    }
}

const MESSAGE_COLUMNS: &str = "id, content, sender_id, receiver_id, status, created_at";

#[derive(FromRow)]
struct MessageRecord {
    id: Uuid,
    content: String,
    sender_id: Uuid,
    receiver_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
}
impl MessageRecord {
    fn to_domain(self) -> PortResult<Message> {
        let status = self
            .status
            .parse::<MessageStatus>()
            .map_err(PortError::InvalidData)?;
        Ok(Message {
            id: self.id,
            content: self.content,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            created_at: self.created_at,
            status,
        })
    }
}

//=========================================================================================
// `ProfileStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ProfileStore for DbAdapter {
    async fn fetch_profile(&self, user_id: &str) -> PortResult<Option<Profile>> {
        // Profile ids are UUIDs; anything else cannot match a row.
        let Ok(id) = Uuid::parse_str(user_id) else {
            return Ok(None);
        };
        let record = sqlx::query_as::<_, ProfileRecord>(&format!(
            "SELECT {} FROM profiles WHERE id = $1",
            PROFILE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        record.map(ProfileRecord::to_domain).transpose()
    }

    async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> PortResult<Profile> {
        let record = sqlx::query_as::<_, ProfileRecord>(&format!(
            "UPDATE profiles SET \
                first_name = COALESCE($2, first_name), \
                last_name = COALESCE($3, last_name), \
                phone = COALESCE($4, phone), \
                address = COALESCE($5, address), \
                updated_at = now() \
             WHERE id = $1 RETURNING {}",
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .bind(update.first_name)
        .bind(update.last_name)
        .bind(update.phone)
        .bind(update.address)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Profile {} not found", user_id)),
            _ => unexpected(e),
        })?;

        record.to_domain()
    }

    async fn list_profiles(&self) -> PortResult<Vec<Profile>> {
        let records = sqlx::query_as::<_, ProfileRecord>(&format!(
            "SELECT {} FROM profiles ORDER BY first_name, last_name",
            PROFILE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        // Rows with an unrecognized role are left out of contact lists.
        Ok(records
            .into_iter()
            .filter_map(|r| r.to_domain().ok())
            .collect())
    }
}

//=========================================================================================
// `ServiceTypeSource` Trait Implementation
//=========================================================================================

#[async_trait]
impl ServiceTypeSource for DbAdapter {
    async fn list_service_types(&self) -> PortResult<Vec<ServiceType>> {
        let records = sqlx::query_as::<_, ServiceTypeRecord>(
            "SELECT id, name, price_multiplier, description FROM service_types ORDER BY price_multiplier ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}

//=========================================================================================
// `MessageStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl MessageStore for DbAdapter {
    async fn conversation(&self, a: Uuid, b: Uuid) -> PortResult<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {} FROM messages \
             WHERE (sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1) \
             ORDER BY created_at ASC",
            MESSAGE_COLUMNS
        ))
        .bind(a)
        .bind(b)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn get_message(&self, message_id: Uuid) -> PortResult<Message> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {} FROM messages WHERE id = $1",
            MESSAGE_COLUMNS
        ))
        .bind(message_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Message {} not found", message_id)),
            _ => unexpected(e),
        })?;

        record.to_domain()
    }

    async fn insert_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
    ) -> PortResult<Message> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            "INSERT INTO messages (id, content, sender_id, receiver_id, status) \
             VALUES ($1, $2, $3, $4, 'unread') RETURNING {}",
            MESSAGE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(content)
        .bind(sender_id)
        .bind(receiver_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        record.to_domain()
    }

    async fn set_status(&self, message_id: Uuid, status: MessageStatus) -> PortResult<()> {
        let result = sqlx::query("UPDATE messages SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(message_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Message {} not found", message_id)));
        }
        Ok(())
    }

    async fn mark_answered(&self, from: Uuid, to: Uuid) -> PortResult<()> {
        sqlx::query(
            "UPDATE messages SET status = 'answered' \
             WHERE sender_id = $1 AND receiver_id = $2 AND status <> 'answered'",
        )
        .bind(from)
        .bind(to)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user_type: &str) -> ProfileRecord {
        ProfileRecord {
            id: Uuid::new_v4(),
            user_type: user_type.to_string(),
            first_name: Some("Ana".to_string()),
            last_name: None,
            email: None,
            phone: None,
            address: None,
        }
    }

    #[test]
    fn profile_record_parses_role() {
        let profile = record("staff").to_domain().unwrap();
        assert_eq!(profile.user_type, UserType::Staff);
    }

    #[test]
    fn profile_record_rejects_unknown_role() {
        assert!(matches!(
            record("owner").to_domain(),
            Err(PortError::InvalidData(_))
        ));
    }

    #[test]
    fn message_record_rejects_unknown_status() {
        let record = MessageRecord {
            id: Uuid::new_v4(),
            content: "hi".to_string(),
            sender_id: Uuid::new_v4(),
            receiver_id: Uuid::new_v4(),
            status: "archived".to_string(),
            created_at: Utc::now(),
        };
        assert!(matches!(record.to_domain(), Err(PortError::InvalidData(_))));
    }
}
