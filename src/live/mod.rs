//! Gemini Live API クライアント
mod auth;
mod error;
mod protocol;
mod session;

pub use auth::{token_source_for, MetadataTokenSource, StaticToken, TokenSource, METADATA_TOKEN_URL};
pub use error::LiveError;
pub use protocol::{
    Blob, ClientMessage, FunctionCall, FunctionResponse, LiveEvent, Part, ServerMessage,
};
pub use session::{connect, LiveEndpoint, LiveReceiver, LiveSender};
