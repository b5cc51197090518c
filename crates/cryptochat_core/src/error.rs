use thiserror::Error;

/// Domain errors raised by the chat room core.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("speaker pool is empty")]
    EmptyPool,

    #[error("no eligible speaker: the only pool member `{last}` just spoke")]
    NoEligibleSpeaker { last: String },

    #[error("unknown persona: {0}")]
    UnknownPersona(String),

    #[error("duplicate persona handle: {0}")]
    DuplicateHandle(String),

    #[error("topic must not be empty")]
    EmptyTopic,

    #[error("invalid discussion transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("failed to create transcript room `{room_id}`")]
    RoomSetup {
        room_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to parse persona `{origin}`: {message}")]
    PersonaParse { origin: String, message: String },
}
