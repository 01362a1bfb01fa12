use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, Ipv6Addr};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetProtocol {
    /// Plain DNS: UDP first, TCP retry on truncation.
    TcpUdp,
    /// DNS-over-TLS (RFC 7858).
    TcpTls,
    /// DNS-over-HTTPS (RFC 8484).
    Https,
}

impl NetProtocol {
    pub fn default_port(&self) -> u16 {
        match self {
            NetProtocol::TcpUdp => 53,
            NetProtocol::TcpTls => 853,
            NetProtocol::Https => 443,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            NetProtocol::TcpUdp => "tcp+udp:",
            NetProtocol::TcpTls => "tcp-tls:",
            NetProtocol::Https => "https:",
        }
    }
}

impl fmt::Display for NetProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix().trim_end_matches(':'))
    }
}

/// Wire-level spec of one remote DNS endpoint.
///
/// Surface syntax: transport prefix (`tcp+udp:`, `tcp-tls:`, `https:`),
/// host, optional `:port`, optional `/path` for HTTPS, optional
/// `#commonName` suffix overriding the TLS SNI. A bare host defaults to
/// `tcp+udp`. IPv6 literals with a port use brackets: `[fd00::6cd4]:5321`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Upstream {
    pub net: NetProtocol,
    pub host: String,
    pub port: u16,
    /// HTTP path, only meaningful for `https:` upstreams.
    pub path: String,
    /// TLS SNI override (`#commonName` suffix).
    pub common_name: Option<String>,
}

impl Upstream {
    /// The host, parsed as a literal IP if it is one.
    pub fn host_ip(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }

    /// Server name presented during the TLS handshake.
    pub fn tls_server_name(&self) -> &str {
        self.common_name.as_deref().unwrap_or(&self.host)
    }

    /// Full URL for HTTPS upstreams.
    pub fn url(&self) -> String {
        if self.port == NetProtocol::Https.default_port() {
            format!("https://{}{}", self.display_host(), self.path)
        } else {
            format!("https://{}:{}{}", self.display_host(), self.port, self.path)
        }
    }

    fn display_host(&self) -> String {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }
}

impl FromStr for Upstream {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (s, common_name) = match s.rsplit_once('#') {
            Some((head, cn)) if !cn.is_empty() => (head, Some(cn.to_string())),
            _ => (s, None),
        };

        let (net, rest) = if let Some(rest) = s.strip_prefix("tcp+udp:") {
            (NetProtocol::TcpUdp, rest)
        } else if let Some(rest) = s.strip_prefix("tcp-tls:") {
            (NetProtocol::TcpTls, rest)
        } else if let Some(rest) = s.strip_prefix("https:") {
            (NetProtocol::Https, rest.strip_prefix("//").unwrap_or(rest))
        } else {
            (NetProtocol::TcpUdp, s)
        };

        let (authority, path) = match net {
            NetProtocol::Https => match rest.find('/') {
                Some(idx) => (&rest[..idx], rest[idx..].to_string()),
                None => (rest, "/dns-query".to_string()),
            },
            _ => (rest, String::new()),
        };

        let (host, port) = parse_authority(authority)
            .map_err(|e| format!("invalid upstream '{}': {}", s, e))?;

        if host.is_empty() {
            return Err(format!("invalid upstream '{}': empty host", s));
        }

        Ok(Upstream {
            net,
            host,
            port: port.unwrap_or_else(|| net.default_port()),
            path,
            common_name,
        })
    }
}

fn parse_authority(s: &str) -> Result<(String, Option<u16>), String> {
    if let Some(rest) = s.strip_prefix('[') {
        let end = rest.find(']').ok_or("unclosed '[' in IPv6 address")?;
        let host = rest[..end].to_string();
        let tail = &rest[end + 1..];

        let port = match tail.strip_prefix(':') {
            Some(p) => Some(p.parse::<u16>().map_err(|e| format!("bad port: {}", e))?),
            None if tail.is_empty() => None,
            None => return Err(format!("trailing garbage '{}'", tail)),
        };

        return Ok((host, port));
    }

    // Unbracketed IPv6 literal: colons are part of the address, not a port.
    if s.parse::<Ipv6Addr>().is_ok() {
        return Ok((s.to_string(), None));
    }

    match s.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|e| format!("bad port: {}", e))?;
            Ok((host.to_string(), Some(port)))
        }
        None => Ok((s.to_string(), None)),
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.net.prefix(), self.display_host())?;

        if self.port != self.net.default_port() {
            write!(f, ":{}", self.port)?;
        }

        if self.net == NetProtocol::Https {
            f.write_str(&self.path)?;
        }

        if let Some(cn) = &self.common_name {
            write!(f, "#{}", cn)?;
        }

        Ok(())
    }
}

impl<'de> Deserialize<'de> for Upstream {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

impl Serialize for Upstream {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}
