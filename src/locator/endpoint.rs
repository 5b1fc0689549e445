//! Resolved backend location.

use std::fmt;

use url::Url;

use crate::config::AgentScheme;

/// Where a log stream is read from. Built per request and never cached:
/// the owning agent can change between two requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Name of the agent the endpoint belongs to.
    pub agent: String,
    pub scheme: AgentScheme,
    pub host: String,
    pub port: u16,
    /// Agent-specific path, unencoded.
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl Endpoint {
    /// Render as an absolute URL.
    pub fn url(&self) -> Result<Url, url::ParseError> {
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let mut url = Url::parse(&format!("{}://{}:{}", self.scheme.as_str(), host, self.port))?;
        url.set_path(&self.path);
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        Ok(url)
    }

    pub fn is_tls(&self) -> bool {
        self.scheme == AgentScheme::Https
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}{}", self.scheme.as_str(), self.host, self.port, self.path)
    }
}
