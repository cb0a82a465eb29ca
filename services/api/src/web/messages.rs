//! services/api/src/web/messages.rs
//!
//! Direct messaging endpoints. Customers can only reach employees; employees
//! can reach everyone.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use cleaning_core::domain::{Contact, Message};
use cleaning_core::messaging::{self, partition_contacts, unread_for, MessagingError};
use cleaning_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::state::{AppState, CurrentUser};

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct ContactResponse {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub user_type: String,
}

impl From<Contact> for ContactResponse {
    fn from(c: Contact) -> Self {
        Self {
            id: c.id,
            name: c.name,
            email: c.email,
            user_type: c.user_type.to_string(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ContactsResponse {
    pub clients: Vec<ContactResponse>,
    pub employees: Vec<ContactResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub id: Uuid,
    pub content: String,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            content: m.content,
            sender_id: m.sender_id,
            receiver_id: m.receiver_id,
            status: m.status.as_str().to_string(),
            created_at: m.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ConversationResponse {
    pub messages: Vec<MessageResponse>,
    /// Messages in this conversation the caller has not read yet.
    pub unread: usize,
}

#[derive(Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub receiver_id: Uuid,
    pub content: String,
}

fn messaging_error(e: MessagingError) -> (StatusCode, String) {
    match e {
        MessagingError::EmptyContent | MessagingError::SelfMessage => {
            (StatusCode::BAD_REQUEST, e.to_string())
        }
        MessagingError::NotRecipient => (StatusCode::FORBIDDEN, e.to_string()),
        MessagingError::Port(PortError::NotFound(msg)) => (StatusCode::NOT_FOUND, msg),
        MessagingError::Port(other) => {
            error!("Message store failed: {}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, "Messaging is unavailable".to_string())
        }
    }
}

/// Customers may only talk to employees.
async fn ensure_reachable(
    state: &AppState,
    user: &CurrentUser,
    other: Uuid,
) -> Result<(), (StatusCode, String)> {
    if user.user_type.is_employee() {
        return Ok(());
    }
    let profile = state
        .profiles
        .fetch_profile(&other.to_string())
        .await
        .map_err(|e| messaging_error(e.into()))?
        .ok_or((StatusCode::NOT_FOUND, "Contact not found".to_string()))?;
    if profile.user_type.is_employee() {
        Ok(())
    } else {
        Err((StatusCode::FORBIDDEN, "Customers can only message staff".to_string()))
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /contacts - Everyone the caller can message, split by role
#[utoipa::path(
    get,
    path = "/contacts",
    responses(
        (status = 200, description = "Contacts", body = ContactsResponse),
        (status = 401, description = "Not signed in")
    ),
    security(("bearer" = []))
)]
pub async fn contacts_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let profiles = state
        .profiles
        .list_profiles()
        .await
        .map_err(|e| messaging_error(e.into()))?;
    let viewer = profiles
        .iter()
        .find(|p| p.id == user.user_id)
        .ok_or((StatusCode::FORBIDDEN, "Profile not found".to_string()))?;

    let contacts = partition_contacts(&profiles, viewer);
    Ok(Json(ContactsResponse {
        clients: contacts.clients.into_iter().map(Into::into).collect(),
        employees: contacts.employees.into_iter().map(Into::into).collect(),
    }))
}

/// GET /messages/{id} - The conversation with one contact, oldest first
#[utoipa::path(
    get,
    path = "/messages/{id}",
    params(("id" = Uuid, Path, description = "Profile id of the other participant")),
    responses(
        (status = 200, description = "Conversation", body = ConversationResponse),
        (status = 403, description = "Contact not reachable")
    ),
    security(("bearer" = []))
)]
pub async fn conversation_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(contact_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    ensure_reachable(&state, &user, contact_id).await?;

    let messages = state
        .messages
        .conversation(user.user_id, contact_id)
        .await
        .map_err(|e| messaging_error(e.into()))?;
    let unread = unread_for(&messages, user.user_id).unread;

    Ok(Json(ConversationResponse {
        messages: messages.into_iter().map(Into::into).collect(),
        unread,
    }))
}

/// POST /messages - Send a message
#[utoipa::path(
    post,
    path = "/messages",
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message sent", body = MessageResponse),
        (status = 400, description = "Empty message or message to self"),
        (status = 403, description = "Recipient not reachable")
    ),
    security(("bearer" = []))
)]
pub async fn send_message_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    ensure_reachable(&state, &user, req.receiver_id).await?;

    let message = messaging::send_message(
        state.messages.as_ref(),
        user.user_id,
        req.receiver_id,
        &req.content,
    )
    .await
    .map_err(messaging_error)?;

    Ok((StatusCode::CREATED, Json(MessageResponse::from(message))))
}

/// POST /messages/{id}/read - Mark a received message as read
#[utoipa::path(
    post,
    path = "/messages/{id}/read",
    params(("id" = Uuid, Path, description = "Message id")),
    responses(
        (status = 204, description = "Marked as read"),
        (status = 403, description = "Caller is not the recipient"),
        (status = 404, description = "No such message")
    ),
    security(("bearer" = []))
)]
pub async fn mark_read_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(message_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    messaging::mark_read(state.messages.as_ref(), user.user_id, message_id)
        .await
        .map_err(messaging_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::test_support::{current_user, person, read_json, TestState};
    use cleaning_core::domain::UserType;

    #[tokio::test]
    async fn customer_contacts_contain_only_employees() {
        let me = person("Ana", UserType::Customer);
        let other_customer = person("Bea", UserType::Customer);
        let staff = person("Cy", UserType::Staff);
        let state = TestState::new()
            .with_profiles(vec![me.clone(), other_customer, staff.clone()])
            .build();

        let body = read_json(
            contacts_handler(State(state), Extension(current_user(&me)))
                .await
                .unwrap()
                .into_response(),
        )
        .await;
        assert!(body["clients"].as_array().unwrap().is_empty());
        assert_eq!(body["employees"][0]["id"], staff.id.to_string());
    }

    #[tokio::test]
    async fn customer_cannot_message_another_customer() {
        let me = person("Ana", UserType::Customer);
        let other = person("Bea", UserType::Customer);
        let state = TestState::new().with_profiles(vec![me.clone(), other.clone()]).build();

        let req = SendMessageRequest {
            receiver_id: other.id,
            content: "hello".to_string(),
        };
        let err = send_message_handler(State(state), Extension(current_user(&me)), Json(req))
            .await
            .err()
            .unwrap();
        assert_eq!(err.0, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn reply_marks_earlier_messages_answered() {
        let customer = person("Ana", UserType::Customer);
        let staff = person("Cy", UserType::Staff);
        let state = TestState::new()
            .with_profiles(vec![customer.clone(), staff.clone()])
            .build();

        let question = SendMessageRequest {
            receiver_id: staff.id,
            content: "Can you come Tuesday?".to_string(),
        };
        let sent = send_message_handler(State(state.clone()), Extension(current_user(&customer)), Json(question))
            .await
            .unwrap()
            .into_response();
        assert_eq!(sent.status(), StatusCode::CREATED);

        let reply = SendMessageRequest {
            receiver_id: customer.id,
            content: "Yes".to_string(),
        };
        send_message_handler(State(state.clone()), Extension(current_user(&staff)), Json(reply))
            .await
            .unwrap();

        let body = read_json(
            conversation_handler(State(state), Extension(current_user(&customer)), Path(staff.id))
                .await
                .unwrap()
                .into_response(),
        )
        .await;
        assert_eq!(body["messages"][0]["status"], "answered");
        assert_eq!(body["messages"][1]["status"], "unread");
        assert_eq!(body["unread"], 1);
    }

    #[tokio::test]
    async fn only_recipient_can_mark_read() {
        let customer = person("Ana", UserType::Customer);
        let staff = person("Cy", UserType::Staff);
        let state = TestState::new()
            .with_profiles(vec![customer.clone(), staff.clone()])
            .build();

        let message = messaging::send_message(state.messages.as_ref(), customer.id, staff.id, "hi")
            .await
            .unwrap();

        let err = mark_read_handler(State(state.clone()), Extension(current_user(&customer)), Path(message.id))
            .await
            .err()
            .unwrap();
        assert_eq!(err.0, StatusCode::FORBIDDEN);

        let ok = mark_read_handler(State(state), Extension(current_user(&staff)), Path(message.id))
            .await
            .unwrap()
            .into_response();
        assert_eq!(ok.status(), StatusCode::NO_CONTENT);
    }
}
