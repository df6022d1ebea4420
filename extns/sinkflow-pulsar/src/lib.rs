use pulsar::{Authentication, Pulsar, TokioExecutor};
use tracing::info;

pub mod producer;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Pulsar Error - {0}")]
    Pulsar(pulsar::Error),

    #[error("Producer is closed. producer={0}")]
    ProducerClosed(String),

    #[error("Producer queue is full and blocking is disabled. producer={0}")]
    QueueFull(String),

    #[error("{0}")]
    Other(String),
}

impl From<pulsar::Error> for Error {
    fn from(value: pulsar::Error) -> Self {
        Error::Pulsar(value)
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Error::Other(value)
    }
}

#[derive(Clone, PartialEq)]
pub enum PulsarAuth {
    JWT(String),
    HTTPBasic { username: String, password: String },
}

impl std::fmt::Debug for PulsarAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PulsarAuth::JWT(token) if token.chars().count() > 12 => {
                let len = token.chars().count();
                let head: String = token.chars().take(6).collect();
                let tail: String = token.chars().skip(len - 6).collect();
                write!(f, "{head}****{tail}")
            }
            PulsarAuth::JWT(_) => write!(f, "****"),
            PulsarAuth::HTTPBasic { username, .. } => write!(f, "{username}:****"),
        }
    }
}

/// Connection details for the Pulsar cluster the sink publishes to.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Pulsar broker address
    pub addr: String,
    /// The authentication mechanism to use for all producers created from this client
    pub auth: Option<PulsarAuth>,
}

/// A connected Pulsar client. Cheap to clone, every clone shares the same connection pool.
#[derive(Clone)]
pub struct PulsarClient {
    pub(crate) pulsar: Pulsar<TokioExecutor>,
}

pub async fn new_client(config: ClientConfig) -> Result<PulsarClient> {
    let mut pulsar = Pulsar::builder(&config.addr, TokioExecutor);
    match config.auth {
        Some(PulsarAuth::JWT(token)) => {
            let auth_token = Authentication {
                name: "token".into(),
                data: token.into(),
            };
            pulsar = pulsar.with_auth(auth_token);
        }
        Some(PulsarAuth::HTTPBasic { username, password }) => {
            let auth_token = Authentication {
                name: "basic".into(),
                data: format!("{username}:{password}").into(),
            };
            pulsar = pulsar.with_auth(auth_token);
        }
        None => info!("No authentication mechanism specified for Pulsar"),
    }

    let pulsar = pulsar.build().await.map_err(Error::Pulsar)?;
    info!(addr = %config.addr, "Connected to Pulsar");
    Ok(PulsarClient { pulsar })
}
