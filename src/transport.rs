use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{event, Level};

use crate::{
    config::{
        ReturnPathMode, Scope, ScopeConfig, XML_PATH_MAILTRAP_PASSWORD,
        XML_PATH_MAILTRAP_USERNAME, XML_PATH_SENDING_RETURN_PATH_EMAIL,
        XML_PATH_SENDING_SET_RETURN_PATH,
    },
    message::{EnvelopeError, MailMessage, ParseError, ParsedMessage},
    smtp::{BoxError, SmtpClient, SmtpFactory, SmtpOptions, TransportFactory},
    Decryptor, Endpoint,
};

/// Mail could not be sent.
///
/// This is the only error callers see,
/// the reason is kept as its [`source`](std::error::Error::source).
#[derive(thiserror::Error, Debug)]
#[error("unable to send mail, please try again later")]
pub struct SendError {
    #[source]
    cause: Cause,
}

impl SendError {
    /// Why the mail could not be sent.
    pub fn cause(&self) -> &Cause {
        &self.cause
    }
}

/// The reason behind a [`SendError`].
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Cause {
    #[error("mailtrap credentials are invalid")]
    InvalidCredentials,
    #[error("invalid message")]
    Parse(#[from] ParseError),
    #[error("invalid envelope")]
    Envelope(#[from] EnvelopeError),
    #[error("unable to build smtp client")]
    Connect(#[source] BoxError),
    #[error("smtp delivery failed")]
    Delivery(#[source] BoxError),
}

/// Sends one host platform message through the Mailtrap relay.
///
/// The SMTP client is built on the first send
/// and reused by every later send of this transport.
pub struct MailtrapTransport<M, F = SmtpFactory>
where
    F: TransportFactory,
{
    message: M,
    config: Arc<dyn ScopeConfig>,
    decryptor: Arc<dyn Decryptor>,
    factory: F,
    endpoint: Endpoint,
    client: OnceCell<F::Client>,
}

impl<M: MailMessage> MailtrapTransport<M> {
    pub fn new(
        message: M,
        config: Arc<dyn ScopeConfig>,
        decryptor: Arc<dyn Decryptor>,
    ) -> Self {
        Self::with_factory(message, config, decryptor, SmtpFactory)
    }
}

impl<M, F> MailtrapTransport<M, F>
where
    M: MailMessage,
    F: TransportFactory,
{
    pub fn with_factory(
        message: M,
        config: Arc<dyn ScopeConfig>,
        decryptor: Arc<dyn Decryptor>,
        factory: F,
    ) -> Self {
        MailtrapTransport {
            message,
            config,
            decryptor,
            factory,
            endpoint: Endpoint::default(),
            client: OnceCell::new(),
        }
    }

    /// Deliver to another relay than the Mailtrap sandbox.
    ///
    /// Has no effect once the client has been built.
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// The message this transport sends.
    pub fn message(&self) -> &M {
        &self.message
    }

    /// Send the message.
    ///
    /// Nothing is retried, every failure is logged
    /// and reported as a [`SendError`].
    pub async fn send_message(&self) -> Result<(), SendError> {
        self.try_send_message().await.map_err(|cause| {
            event!(Level::ERROR, error = ?cause, "{cause}");
            SendError { cause }
        })
    }

    async fn try_send_message(&self) -> Result<(), Cause> {
        let (username, password) = self.credentials()?;

        let mode = ReturnPathMode::from_config(
            self.config
                .value(XML_PATH_SENDING_SET_RETURN_PATH, Scope::Store)
                .as_deref(),
        );
        let return_path = self
            .config
            .value(XML_PATH_SENDING_RETURN_PATH_EMAIL, Scope::Store)
            .unwrap_or_default();

        let mut message = ParsedMessage::parse(&self.message.raw_message())?;
        match mode {
            ReturnPathMode::Custom if !return_path.trim().is_empty() => {
                message.set_sender(return_path.trim())?;
            }
            ReturnPathMode::FromHeader => {
                if let Some(from) = message.from()?.first() {
                    message.set_sender(from)?;
                }
            }
            _ => {}
        }

        let client = self.client(username, password).await?;
        let known = self
            .message
            .envelope()
            .map(|envelope| envelope.to().to_vec())
            .unwrap_or_default();
        let envelope = message.envelope_including(&known)?;
        client
            .send(&envelope, &message.to_bytes())
            .await
            .map_err(Cause::Delivery)
    }

    /// Decrypt the stored credentials, both must be present.
    fn credentials(&self) -> Result<(String, String), Cause> {
        let username = self.secret(XML_PATH_MAILTRAP_USERNAME);
        let password = self.secret(XML_PATH_MAILTRAP_PASSWORD);
        if username.is_empty() || password.is_empty() {
            return Err(Cause::InvalidCredentials);
        }
        Ok((username, password))
    }

    fn secret(&self, path: &str) -> String {
        self.config
            .value(path, Scope::Default)
            .map(|ciphertext| self.decryptor.decrypt(&ciphertext))
            .unwrap_or_default()
    }

    async fn client(
        &self,
        username: String,
        password: String,
    ) -> Result<&F::Client, Cause> {
        self.client
            .get_or_try_init(|| async move {
                let options =
                    SmtpOptions::new(self.endpoint.clone(), username, password);
                self.factory.create(options).map_err(Cause::Connect)
            })
            .await
    }
}
