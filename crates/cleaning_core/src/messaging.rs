//! crates/cleaning_core/src/messaging.rs
//!
//! Direct messaging between customers and employees.

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::domain::{Contact, Message, MessageStatus, Profile};
use crate::ports::{MessageStore, PortError};

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("Message content cannot be empty")]
    EmptyContent,
    #[error("You cannot message yourself")]
    SelfMessage,
    #[error("Only the recipient can change a message's status")]
    NotRecipient,
    #[error(transparent)]
    Port(#[from] PortError),
}

/// Contacts visible to one user, split by role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contacts {
    pub clients: Vec<Contact>,
    pub employees: Vec<Contact>,
}

impl From<&Profile> for Contact {
    fn from(profile: &Profile) -> Self {
        Contact {
            id: profile.id,
            name: profile.display_name(),
            email: profile.email.clone(),
            user_type: profile.user_type,
        }
    }
}

/// Splits profiles into clients and employees, leaving out the viewer.
/// Customers only ever see employees.
pub fn partition_contacts(profiles: &[Profile], viewer: &Profile) -> Contacts {
    let mut contacts = Contacts::default();
    for profile in profiles.iter().filter(|p| p.id != viewer.id) {
        if profile.user_type.is_employee() {
            contacts.employees.push(profile.into());
        } else if viewer.user_type.is_employee() {
            contacts.clients.push(profile.into());
        }
    }
    contacts.clients.sort_by(|a, b| a.name.cmp(&b.name));
    contacts.employees.sort_by(|a, b| a.name.cmp(&b.name));
    contacts
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UnreadSummary {
    pub unread: usize,
}

pub fn unread_for(messages: &[Message], reader: Uuid) -> UnreadSummary {
    UnreadSummary {
        unread: messages
            .iter()
            .filter(|m| m.receiver_id == reader && m.status == MessageStatus::Unread)
            .count(),
    }
}

/// Stores a message. Whatever the receiver had sent the sender before is now answered.
pub async fn send_message(
    store: &dyn MessageStore,
    sender_id: Uuid,
    receiver_id: Uuid,
    content: &str,
) -> Result<Message, MessagingError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(MessagingError::EmptyContent);
    }
    if sender_id == receiver_id {
        return Err(MessagingError::SelfMessage);
    }
    let message = store.insert_message(sender_id, receiver_id, content).await?;
    store.mark_answered(receiver_id, sender_id).await?;
    info!("Message {} sent from {} to {}", message.id, sender_id, receiver_id);
    Ok(message)
}

pub async fn mark_read(
    store: &dyn MessageStore,
    reader_id: Uuid,
    message_id: Uuid,
) -> Result<(), MessagingError> {
    let message = store.get_message(message_id).await?;
    if message.receiver_id != reader_id {
        return Err(MessagingError::NotRecipient);
    }
    // An answered message stays answered.
    if message.status == MessageStatus::Unread {
        store.set_status(message_id, MessageStatus::Read).await?;
    }
    Ok(())
}
