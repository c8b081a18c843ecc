//! Support chat: the public chatbot and the logged-in study assistant.

use chrono::{DateTime, Utc};
use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::{api_error, ApiClient, ApiError};
use crate::auth::SessionState;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Random characters in a generated session id
const SESSION_SUFFIX_LEN: usize = 9;

const UNKNOWN_FORMAT_REPLY: &str =
    "I received a response but couldn't understand the format. Please try rephrasing your question.";
const CONNECTION_REPLY: &str =
    "Sorry, I'm having trouble connecting to the AI service right now. Please try again later.";

/// Ask the public chatbot. Always returns something to show: failures
/// become an apology rather than an error.
pub async fn ask(client: &ApiClient, message: &str) -> String {
    match client.ask(message).await {
        Ok(response) => match (response.reply, response.error) {
            (Some(reply), _) if !reply.is_empty() => reply,
            (_, Some(error)) if !error.is_empty() => {
                format!("Sorry, I encountered an error: {}", error)
            }
            _ => UNKNOWN_FORMAT_REPLY.to_string(),
        },
        Err(e) => {
            warn!(error = %e, "Chatbot request failed");
            match api_error(&e) {
                Some(api) => format!(
                    "Sorry, I'm having trouble connecting to the AI service: {}. Please try again later.",
                    api.user_message().trim_end_matches('.')
                ),
                None => CONNECTION_REPLY.to_string(),
            }
        }
    }
}

/// `session_<millis>_<9 base36 chars>`
pub fn new_session_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SESSION_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("session_{}_{}", Utc::now().timestamp_millis(), suffix)
}

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("No authentication token found. Please log in again.")]
    NotLoggedIn,

    #[error("Authentication error: Your session has expired. Please log in again.")]
    SessionExpired,

    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub speaker: Speaker,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// One conversation with the study assistant. The session id is fixed for
/// the life of the conversation so the server keeps context.
pub struct ChatSession {
    session: SessionState,
    session_id: String,
    history: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(session: SessionState) -> Self {
        Self {
            session,
            session_id: new_session_id(),
            history: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Send a message. Refuses without a live token; nothing is sent and
    /// nothing is recorded in that case.
    pub async fn send(&mut self, message: &str) -> Result<String, AssistantError> {
        let was_authenticated = self.session.is_authenticated();
        let Some(client) = self.session.api() else {
            return Err(if was_authenticated {
                AssistantError::SessionExpired
            } else {
                AssistantError::NotLoggedIn
            });
        };

        self.push(Speaker::User, message);
        debug!(session_id = %self.session_id, "Sending message to assistant");

        match client.agent(message, &self.session_id).await {
            Ok(reply) => {
                self.push(Speaker::Assistant, &reply.reply);
                Ok(reply.reply)
            }
            Err(e) => {
                warn!(error = %e, "Assistant request failed");
                match api_error(&e) {
                    Some(ApiError::Unauthorized) => {
                        self.session.logout();
                        Err(AssistantError::SessionExpired)
                    }
                    Some(api) => Err(AssistantError::Failed(api.user_message())),
                    None => Err(AssistantError::Failed(format!("{:#}", e))),
                }
            }
        }
    }

    fn push(&mut self, speaker: Speaker, text: &str) {
        self.history.push(ChatMessage {
            speaker,
            text: text.to_string(),
            at: Utc::now(),
        });
    }
}
