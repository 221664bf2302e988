use std::net::SocketAddr;

use mailtrap_transport::Endpoint;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpListener,
};
use tracing::{event, Level};

/// An error during an SMTP exchange with the relay.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(
        "received unexpected data; expected {expected:?}, actual {actual:?}"
    )]
    UnexpectedData { expected: String, actual: String },
    #[error("connection closed by client")]
    Closed,
}

/// The authentication the relay requires.
#[derive(Clone, Debug)]
pub enum Auth {
    /// Require clients to login with the provided credentials.
    Login { username: String, password: String },
    /// Accept any client, recording whatever credentials it sends.
    AcceptAll,
}

/// One message as handed to the relay.
#[derive(Debug)]
pub struct Delivery {
    /// The name the client greeted with.
    pub hello: String,
    /// The credentials sent with `AUTH PLAIN`.
    pub credentials: Option<(String, String)>,
    /// The `MAIL FROM` address.
    pub mail_from: String,
    /// All `RCPT TO` addresses, in order.
    pub rcpt_to: Vec<String>,
    /// The message data, with dot stuffing removed.
    pub data: Vec<u8>,
}

impl Delivery {
    pub fn data(&self) -> String {
        String::from_utf8_lossy(&self.data).to_string()
    }
}

/// A local relay that accepts one SMTP session at a time.
pub struct Relay {
    auth: Auth,
    listener: TcpListener,
}

impl Relay {
    pub async fn start(auth: Auth) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Ok(Self { auth, listener })
    }

    pub fn address(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    pub fn endpoint(&self) -> Endpoint {
        let address = self.address().expect("relay address");
        Endpoint {
            host: address.ip().to_string(),
            port: address.port(),
        }
    }

    /// Accept a connection and run one session on it.
    ///
    /// Returns `None` when the client was turned away during
    /// authentication.
    pub async fn receive(&self) -> Result<Option<Delivery>, Error> {
        let (mut socket, _) = self.listener.accept().await?;
        let (read, mut write) = socket.split();
        let mut read = BufReader::new(read);
        session(&mut read, &mut write, &self.auth).await
    }
}

async fn read_line(
    mut socket: impl AsyncBufRead + Unpin,
) -> Result<String, Error> {
    let mut line = String::new();
    if socket.read_line(&mut line).await? == 0 {
        return Err(Error::Closed);
    }
    event!(Level::TRACE, recv = line);
    Ok(line)
}

async fn write(
    mut socket: impl AsyncWrite + Unpin,
    data: &str,
) -> Result<(), Error> {
    event!(Level::TRACE, send = data);
    socket.write_all(data.as_bytes()).await?;
    Ok(())
}

fn expect_argument(
    data: String,
    command: &'static str,
) -> Result<String, Error> {
    data.strip_prefix(command)
        .and_then(|rest| rest.strip_suffix("\r\n"))
        .map(str::to_string)
        .ok_or_else(|| Error::UnexpectedData {
            expected: format!("{command}...\r\n"),
            actual: data.clone(),
        })
}

fn expect_address(
    data: String,
    command: &'static str,
) -> Result<String, Error> {
    let argument = expect_argument(data, command)?;
    let address = argument
        .strip_prefix('<')
        .and_then(|rest| rest.split_once('>'))
        .map(|(address, _params)| address.to_string());
    address.ok_or(Error::UnexpectedData {
        expected: format!("{command}<...>\r\n"),
        actual: argument,
    })
}

fn decode_plain(encoded: &str) -> Option<(String, String)> {
    use base64ct::Encoding;
    let data = base64ct::Base64::decode_vec(encoded.trim()).ok()?;
    let mut parts = data.split(|byte| *byte == 0).skip(1);
    let username = String::from_utf8(parts.next()?.to_vec()).ok()?;
    let password = String::from_utf8(parts.next()?.to_vec()).ok()?;
    Some((username, password))
}

async fn session(
    mut read: impl AsyncBufRead + Unpin,
    mut write_half: impl AsyncWrite + Unpin,
    auth: &Auth,
) -> Result<Option<Delivery>, Error> {
    write(&mut write_half, "220 relay ESMTP\r\n").await?;
    let hello = expect_argument(read_line(&mut read).await?, "EHLO ")?;

    write(&mut write_half, "250-relay\r\n").await?;
    write(&mut write_half, "250 AUTH PLAIN\r\n").await?;

    let mut data = read_line(&mut read).await?;
    let mut credentials = None;
    if data.starts_with("AUTH PLAIN ") {
        let encoded = expect_argument(data, "AUTH PLAIN ")?;
        credentials = decode_plain(&encoded);
        let accepted = match auth {
            Auth::Login { username, password } => {
                credentials.as_ref()
                    == Some(&(username.clone(), password.clone()))
            }
            Auth::AcceptAll => true,
        };
        if !accepted {
            write(&mut write_half, "535 Authentication failed\r\n").await?;
            return Ok(None);
        }
        write(&mut write_half, "235 Authentication successful\r\n").await?;
        data = read_line(&mut read).await?;
    } else if let Auth::Login { .. } = auth {
        write(&mut write_half, "530 Authentication required\r\n").await?;
        return Ok(None);
    }

    let mail_from = expect_address(data, "MAIL FROM:")?;
    write(&mut write_half, "250 Ok\r\n").await?;

    let mut rcpt_to = Vec::new();
    loop {
        let data = read_line(&mut read).await?;
        if data == "DATA\r\n" {
            break;
        }
        rcpt_to.push(expect_address(data, "RCPT TO:")?);
        write(&mut write_half, "250 Ok\r\n").await?;
    }
    write(&mut write_half, "354 Go\r\n").await?;

    let mut email = Vec::with_capacity(16 * 1024);
    loop {
        let line = read_line(&mut read).await?;
        if line == ".\r\n" {
            break;
        }
        let line = line.strip_prefix('.').unwrap_or(&line);
        email.extend(line.as_bytes());
    }
    write(&mut write_half, "250 Ok\r\n").await?;

    // the client may hang up without saying goodbye
    if let Ok(line) = read_line(&mut read).await {
        if line == "QUIT\r\n" {
            let _ = write(&mut write_half, "221 Bye\r\n").await;
        }
    }

    Ok(Some(Delivery {
        hello,
        credentials,
        mail_from,
        rcpt_to,
        data: email,
    }))
}
