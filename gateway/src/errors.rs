use crate::config::ValidationError;

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ValidationError),

    /// A request parameter was present but unusable.
    #[error("incorrect value for {0}")]
    InvalidParameter(&'static str),
}
