use std::borrow::Cow;

use lettre::address::{Address, AddressError, Envelope};
use mailparse::MailAddr;

/// A message handed over by the host platform for delivery.
pub trait MailMessage: Send + Sync {
    /// The complete message, headers and body, as it goes on the wire.
    fn raw_message(&self) -> Cow<'_, [u8]>;

    /// The envelope the message was built with, if it knows one.
    ///
    /// Its recipients are delivered to even when the raw message
    /// no longer names them, as with `Bcc`.
    fn envelope(&self) -> Option<Envelope> {
        None
    }
}

/// A message that is already serialized.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RawMessage(Vec<u8>);

impl RawMessage {
    pub fn new(raw: impl Into<Vec<u8>>) -> Self {
        RawMessage(raw.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl MailMessage for RawMessage {
    fn raw_message(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(&self.0)
    }
}

impl MailMessage for lettre::Message {
    fn raw_message(&self) -> Cow<'_, [u8]> {
        Cow::Owned(self.formatted())
    }

    fn envelope(&self) -> Option<Envelope> {
        Some(lettre::Message::envelope(self).clone())
    }
}

/// An error while parsing a message.
#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error(transparent)]
    Mail(#[from] mailparse::MailParseError),
    #[error("invalid header value {0:?}")]
    InvalidHeaderValue(String),
    #[error("invalid address {address:?}")]
    InvalidAddress {
        address: String,
        #[source]
        source: AddressError,
    },
}

/// An error while deriving the SMTP envelope of a message.
#[derive(thiserror::Error, Debug)]
pub enum EnvelopeError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("missing `Sender` or `From` address")]
    MissingSender,
    #[error("missing recipient address")]
    MissingRecipient,
}

#[derive(Clone, Debug)]
struct Header {
    name: String,
    /// The value as found in the message, including any folding.
    raw: Vec<u8>,
    /// The value with encoded words decoded.
    value: String,
}

impl Header {
    fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    fn line(&self) -> Vec<u8> {
        let mut line =
            Vec::with_capacity(self.name.len() + self.raw.len() + 4);
        line.extend(self.name.bytes());
        line.extend(b": ");
        line.extend(&self.raw);
        line.extend(b"\r\n");
        line
    }

    fn addresses(&self) -> Result<Vec<String>, ParseError> {
        let line = self.line();
        let (header, _) = mailparse::parse_header(&line)?;
        let list = mailparse::addrparse_header(&header)?;
        let mut addresses = Vec::new();
        for addr in list.iter() {
            match addr {
                MailAddr::Single(info) => addresses.push(info.addr.clone()),
                MailAddr::Group(group) => addresses
                    .extend(group.addrs.iter().map(|info| info.addr.clone())),
            }
        }
        Ok(addresses)
    }
}

/// A message split into its headers and body.
///
/// Headers are kept in order with their values untouched,
/// folding included. Writing the message back out
/// normalizes each header to `Name: value`.
#[derive(Clone, Debug)]
pub struct ParsedMessage {
    headers: Vec<Header>,
    body: Vec<u8>,
}

impl ParsedMessage {
    pub fn parse(raw: &[u8]) -> Result<Self, ParseError> {
        let (parsed, offset) = mailparse::parse_headers(raw)?;
        let headers = parsed
            .iter()
            .map(|header| Header {
                name: header.get_key(),
                raw: header.get_value_raw().to_vec(),
                value: header.get_value(),
            })
            .collect();
        let body = raw.get(offset..).unwrap_or_default().to_vec();
        Ok(ParsedMessage { headers, body })
    }

    /// The decoded value of the first header called `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|header| header.is(name))
            .map(|header| header.value.as_str())
    }

    fn addresses(&self, names: &[&str]) -> Result<Vec<String>, ParseError> {
        let mut addresses = Vec::new();
        for name in names {
            for header in self.headers.iter().filter(|h| h.is(name)) {
                addresses.extend(header.addresses()?);
            }
        }
        Ok(addresses)
    }

    /// All addresses of the `From` headers, in order.
    pub fn from(&self) -> Result<Vec<String>, ParseError> {
        self.addresses(&["From"])
    }

    /// The address of the `Sender` header, if any.
    pub fn sender(&self) -> Result<Option<String>, ParseError> {
        Ok(self.addresses(&["Sender"])?.into_iter().next())
    }

    /// All `To`, `Cc` and `Bcc` addresses, in that order.
    pub fn recipients(&self) -> Result<Vec<String>, ParseError> {
        self.addresses(&["To", "Cc", "Bcc"])
    }

    /// Set the `Sender` header, replacing an existing one in place.
    ///
    /// The address must be a bare, valid email address.
    pub fn set_sender(&mut self, address: &str) -> Result<(), ParseError> {
        if address.contains(['\r', '\n']) {
            return Err(ParseError::InvalidHeaderValue(address.to_string()));
        }
        let address = parse_address(address)?.to_string();
        let header = Header {
            name: "Sender".to_string(),
            raw: address.as_bytes().to_vec(),
            value: address,
        };
        match self.headers.iter().position(|h| h.is("Sender")) {
            Some(index) => {
                self.headers[index] = header;
                let mut seen = 0;
                self.headers.retain(|h| {
                    if h.is("Sender") {
                        seen += 1;
                    }
                    seen <= 1 || !h.is("Sender")
                });
            }
            None => match self.headers.iter().position(|h| h.is("From")) {
                Some(index) => self.headers.insert(index + 1, header),
                None => self.headers.push(header),
            },
        }
        Ok(())
    }

    /// The SMTP envelope for this message.
    ///
    /// The envelope sender is the `Sender` address
    /// or else the first `From` address.
    pub fn envelope(&self) -> Result<Envelope, EnvelopeError> {
        self.envelope_including(&[])
    }

    /// Like [`ParsedMessage::envelope`],
    /// also delivering to `extra` recipients the headers do not name.
    pub fn envelope_including(
        &self,
        extra: &[Address],
    ) -> Result<Envelope, EnvelopeError> {
        let from = match self.sender()? {
            Some(sender) => Some(sender),
            None => self.from()?.into_iter().next(),
        }
        .ok_or(EnvelopeError::MissingSender)?;
        let from = parse_address(&from)?;

        let mut to = self
            .recipients()?
            .iter()
            .map(|address| parse_address(address))
            .collect::<Result<Vec<_>, _>>()?;
        for address in extra {
            if !to.contains(address) {
                to.push(address.clone());
            }
        }
        if to.is_empty() {
            return Err(EnvelopeError::MissingRecipient);
        }

        Envelope::new(Some(from), to)
            .map_err(|_| EnvelopeError::MissingRecipient)
    }

    /// The message as transmitted, without any `Bcc` header.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.body.len() + 1024);
        for header in self.headers.iter().filter(|h| !h.is("Bcc")) {
            data.extend(header.line());
        }
        data.extend(b"\r\n");
        data.extend(&self.body);
        data
    }
}

fn parse_address(address: &str) -> Result<Address, ParseError> {
    address.parse().map_err(|source| ParseError::InvalidAddress {
        address: address.to_string(),
        source,
    })
}
