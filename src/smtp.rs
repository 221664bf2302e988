use std::future::Future;

use lettre::{
    address::Envelope,
    transport::smtp::{
        authentication::{Credentials, Mechanism},
        extension::ClientId,
    },
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use tracing::{event, Level};

use crate::Endpoint;

/// An error crossing the transport seam.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The name this client greets the relay with.
pub const HELO_NAME: &str = "localhost";

/// How the client authenticates with the relay.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ConnectionClass {
    /// `AUTH PLAIN`
    #[default]
    Plain,
    /// `AUTH LOGIN`
    Login,
}

impl ConnectionClass {
    fn mechanism(self) -> Mechanism {
        match self {
            ConnectionClass::Plain => Mechanism::Plain,
            ConnectionClass::Login => Mechanism::Login,
        }
    }
}

/// Everything needed to build a client for the relay.
#[derive(Clone)]
pub struct SmtpOptions {
    pub name: String,
    pub endpoint: Endpoint,
    pub connection_class: ConnectionClass,
    pub username: String,
    pub password: String,
}

impl SmtpOptions {
    /// Options for the given endpoint
    /// with the fixed greeting name and `AUTH PLAIN`.
    pub fn new(
        endpoint: Endpoint,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        SmtpOptions {
            name: HELO_NAME.to_string(),
            endpoint,
            connection_class: ConnectionClass::Plain,
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for SmtpOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpOptions")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("connection_class", &self.connection_class)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A connected, or connectable, SMTP client.
pub trait SmtpClient: Send + Sync {
    /// Deliver an already serialized message.
    fn send(
        &self,
        envelope: &Envelope,
        message: &[u8],
    ) -> impl Future<Output = Result<(), BoxError>> + Send;
}

/// Builds [`SmtpClient`]s from [`SmtpOptions`].
pub trait TransportFactory: Send + Sync {
    type Client: SmtpClient;

    fn create(&self, options: SmtpOptions) -> Result<Self::Client, BoxError>;
}

/// Builds lettre clients.
///
/// The connection is plaintext,
/// the relay is never asked for TLS.
#[derive(Clone, Copy, Default, Debug)]
pub struct SmtpFactory;

impl TransportFactory for SmtpFactory {
    type Client = AsyncSmtpTransport<Tokio1Executor>;

    fn create(&self, options: SmtpOptions) -> Result<Self::Client, BoxError> {
        event!(
            Level::DEBUG,
            host = options.endpoint.host,
            port = options.endpoint.port,
            "building smtp client"
        );
        let client = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
            options.endpoint.host,
        )
        .port(options.endpoint.port)
        .hello_name(ClientId::Domain(options.name))
        .credentials(Credentials::new(options.username, options.password))
        .authentication(vec![options.connection_class.mechanism()])
        .build();
        Ok(client)
    }
}

impl SmtpClient for AsyncSmtpTransport<Tokio1Executor> {
    async fn send(
        &self,
        envelope: &Envelope,
        message: &[u8],
    ) -> Result<(), BoxError> {
        let response = self.send_raw(envelope, message).await?;
        event!(Level::TRACE, code = %response.code(), "message accepted");
        Ok(())
    }
}
