use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

/// An ip address with an optional port.
///
/// Text form is `ip:port` for v4 and `[ip]:port` for v6. The port may be
/// left off (`1.2.3.4`, `[::1]`); a bare unbracketed v6 address is also
/// accepted on input. Output always brackets v6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// address
    pub ip: IpAddr,
    /// port, if one was given
    pub port: Option<u16>,
}

/// Text that is not a valid [Endpoint].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid ip endpoint `{0}`")]
pub struct EndpointParseError(String);

impl Endpoint {
    /// An endpoint with a port.
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self {
            ip,
            port: Some(port),
        }
    }

    /// An endpoint without a port.
    pub fn without_port(ip: IpAddr) -> Self {
        Self { ip, port: None }
    }

    /// As a socket address, if a port is present.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.port.map(|port| SocketAddr::new(self.ip, port))
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.ip {
            IpAddr::V4(ip) => write!(f, "{}", ip)?,
            IpAddr::V6(ip) => write!(f, "[{}]", ip)?,
        }
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        Ok(())
    }
}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || EndpointParseError(s.to_string());

        if let Some(rest) = s.strip_prefix('[') {
            let (addr, tail) = rest.split_once(']').ok_or_else(err)?;
            let ip: Ipv6Addr = addr.parse().map_err(|_| err())?;
            let port = match tail {
                "" => None,
                tail => {
                    let port = tail.strip_prefix(':').ok_or_else(err)?;
                    Some(parse_port(port).ok_or_else(err)?)
                }
            };
            return Ok(Self {
                ip: IpAddr::V6(ip),
                port,
            });
        }

        if let Ok(ip) = s.parse::<IpAddr>() {
            return Ok(Self::without_port(ip));
        }

        // only v4 may carry a port without brackets
        let (addr, port) = s.rsplit_once(':').ok_or_else(err)?;
        let ip: Ipv4Addr = addr.parse().map_err(|_| err())?;
        let port = parse_port(port).ok_or_else(err)?;
        Ok(Self::new(IpAddr::V4(ip), port))
    }
}

fn parse_port(s: &str) -> Option<u16> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // no leading zeros
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    s.parse().ok()
}

impl serde::Serialize for Endpoint {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Endpoint {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
