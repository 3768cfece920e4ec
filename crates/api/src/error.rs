//! Errors raised by the external service clients.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("GraphQL query failed: {0}")]
    GraphQl(String),

    #[error("response for {0} is missing")]
    MissingData(String),
}
