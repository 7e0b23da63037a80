use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("gateway error: {0}")]
    Gateway(#[from] filament_gateway::GatewayError),

    #[error("rest error: {0}")]
    Rest(#[from] filament_rest::RestError),

    #[error("gateway info request failed with status {status}")]
    GatewayInfo { status: u16 },

    #[error("client is not started")]
    NotStarted,
}

pub type Result<T> = std::result::Result<T, ClientError>;
