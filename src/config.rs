use std::collections::HashMap;
use std::str::FromStr;

/// Whether and how the return-path is set.
pub const XML_PATH_SENDING_SET_RETURN_PATH: &str =
    "system/smtp/set_return_path";

/// Custom return-path address, used with [`ReturnPathMode::Custom`].
pub const XML_PATH_SENDING_RETURN_PATH_EMAIL: &str =
    "system/smtp/return_path_email";

/// Encrypted Mailtrap username.
pub const XML_PATH_MAILTRAP_USERNAME: &str = "system/mailtrap/username";

/// Encrypted Mailtrap password.
pub const XML_PATH_MAILTRAP_PASSWORD: &str = "system/mailtrap/password";

pub const DEFAULT_HOST: &str = "sandbox.smtp.mailtrap.io";
pub const DEFAULT_PORT: u16 = 587;

/// The context a configuration value is resolved in.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Scope {
    Default,
    Website,
    Store,
}

impl Scope {
    /// The next, less specific scope.
    fn parent(self) -> Option<Scope> {
        match self {
            Scope::Store => Some(Scope::Website),
            Scope::Website => Some(Scope::Default),
            Scope::Default => None,
        }
    }
}

/// Read access to the host platform's configuration.
pub trait ScopeConfig: Send + Sync {
    /// Look up the value stored at `path` for `scope`.
    fn value(&self, path: &str, scope: Scope) -> Option<String>;
}

/// An in-memory configuration store.
///
/// Lookups fall back from the store scope
/// to the website scope and then to the default scope.
#[derive(Clone, Default, Debug)]
pub struct MemoryConfig {
    values: HashMap<(Scope, String), String>,
}

impl MemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value at `path` for `scope`.
    pub fn set(
        &mut self,
        path: impl Into<String>,
        scope: Scope,
        value: impl Into<String>,
    ) -> &mut Self {
        self.values.insert((scope, path.into()), value.into());
        self
    }

    /// Builder style variant of [`MemoryConfig::set`]
    /// for the default scope.
    pub fn with(
        mut self,
        path: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.set(path, Scope::Default, value);
        self
    }
}

impl ScopeConfig for MemoryConfig {
    fn value(&self, path: &str, scope: Scope) -> Option<String> {
        let mut current = Some(scope);
        while let Some(scope) = current {
            if let Some(value) = self.values.get(&(scope, path.to_string())) {
                return Some(value.clone());
            }
            current = scope.parent();
        }
        None
    }
}

/// Where the return-path of outgoing mail comes from.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ReturnPathMode {
    /// Leave the message untouched.
    #[default]
    Off,
    /// Use the first `From` address.
    FromHeader,
    /// Use the configured return-path address.
    Custom,
}

impl ReturnPathMode {
    /// Interpret a stored configuration value.
    ///
    /// Only the leading integer of the value counts, so `"2abc"` is 2.
    /// Missing, non-numeric and unknown values all read as off.
    pub fn from_config(value: Option<&str>) -> Self {
        match value.and_then(leading_integer) {
            Some(1) => ReturnPathMode::FromHeader,
            Some(2) => ReturnPathMode::Custom,
            _ => ReturnPathMode::Off,
        }
    }
}

fn leading_integer(value: &str) -> Option<i64> {
    let value = value.trim_start();
    let sign = usize::from(value.starts_with(['+', '-']));
    let digits = value[sign..]
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len() - sign);
    value[..sign + digits].parse().ok()
}

/// The host and port of a SMTP relay.
///
/// This type can be parsed from a `host[:port]` string.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl FromStr for Endpoint {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => {
                (host, port.parse().map_err(|_| "invalid port number")?)
            }
            None => (s, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err("missing host");
        }
        Ok(Endpoint {
            host: host.to_string(),
            port,
        })
    }
}
