mod http;
mod traits;

pub use http::HttpTransport;
pub use traits::{
    AuthToken, CancelHandle, McpServerConfig, Session, SessionEvent, SessionRequest,
    TransportClient, TransportErrorKind,
};
