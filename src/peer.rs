use crate::*;
use serde::{Deserialize, Serialize};

/// Opaque peer identifier.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of device a peer runs on.
///
/// Written as the variant name, read from either the name or the
/// numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u16)]
pub enum DeviceType {
    /// Unrecognized device.
    Unknown = 0,
    /// iPhone.
    AppleiPhone = 6,
    /// iPad.
    AppleiPad = 7,
    /// Any android device.
    AndroidDevice = 8,
    /// Windows desktop.
    Windows10Desktop = 9,
    /// Any linux machine.
    LinuxDevice = 12,
    /// Windows laptop.
    WindowsLaptop = 15,
}

impl DeviceType {
    /// Every device type.
    pub const ALL: [DeviceType; 7] = [
        DeviceType::Unknown,
        DeviceType::AppleiPhone,
        DeviceType::AppleiPad,
        DeviceType::AndroidDevice,
        DeviceType::Windows10Desktop,
        DeviceType::LinuxDevice,
        DeviceType::WindowsLaptop,
    ];

    /// Numeric code.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Wire name.
    pub fn name(self) -> &'static str {
        match self {
            DeviceType::Unknown => "Unknown",
            DeviceType::AppleiPhone => "AppleiPhone",
            DeviceType::AppleiPad => "AppleiPad",
            DeviceType::AndroidDevice => "AndroidDevice",
            DeviceType::Windows10Desktop => "Windows10Desktop",
            DeviceType::LinuxDevice => "LinuxDevice",
            DeviceType::WindowsLaptop => "WindowsLaptop",
        }
    }

    /// Look up by numeric code.
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }
}

impl std::str::FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| format!("unknown device type `{}`", s))
    }
}

impl<'de> Deserialize<'de> for DeviceType {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        struct V;

        impl<'de> serde::de::Visitor<'de> for V {
            type Value = DeviceType;

            fn expecting(
                &self,
                f: &mut std::fmt::Formatter<'_>,
            ) -> std::fmt::Result {
                f.write_str("a device type name or code")
            }

            fn visit_str<E: serde::de::Error>(
                self,
                v: &str,
            ) -> std::result::Result<DeviceType, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: serde::de::Error>(
                self,
                v: u64,
            ) -> std::result::Result<DeviceType, E> {
                u16::try_from(v)
                    .ok()
                    .and_then(DeviceType::from_code)
                    .ok_or_else(|| {
                        E::custom(format!("unknown device type code {}", v))
                    })
            }

            fn visit_i64<E: serde::de::Error>(
                self,
                v: i64,
            ) -> std::result::Result<DeviceType, E> {
                match u64::try_from(v) {
                    Ok(v) => self.visit_u64(v),
                    Err(_) => Err(E::custom(format!(
                        "unknown device type code {}",
                        v
                    ))),
                }
            }
        }

        deserializer.deserialize_any(V)
    }
}

/// Public metadata every peer advertises during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PeerMetadata {
    /// Display name.
    pub name: String,
    /// Stable identifier.
    pub id: PeerId,
    /// Device kind.
    #[serde(rename = "typ")]
    pub device_type: DeviceType,
    /// Where the peer was seen.
    #[serde(rename = "addr")]
    pub address: Endpoint,
}

/// Contents of a pairing qr code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QrPayload {
    /// One-time pairing secret.
    pub secret: String,
    /// The peer offering to pair.
    pub peer: PeerMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_field_overrides() {
        let meta = PeerMetadata {
            name: "phone".into(),
            id: "abc".into(),
            device_type: DeviceType::AndroidDevice,
            address: "[::1]:4000".parse().unwrap(),
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(
            r#"{"name":"phone","id":"abc","typ":"AndroidDevice","addr":"[::1]:4000"}"#,
            json,
        );
        assert_eq!(meta, serde_json::from_str(&json).unwrap());
    }

    #[test]
    fn device_type_by_name_or_code() {
        for t in DeviceType::ALL {
            let name = format!("\"{}\"", t.name());
            let by_name: DeviceType = serde_json::from_str(&name).unwrap();
            let by_code: DeviceType =
                serde_json::from_str(&t.code().to_string()).unwrap();
            assert_eq!(t, by_name);
            assert_eq!(t, by_code);
            assert_eq!(name, serde_json::to_string(&t).unwrap());
        }
        assert!(serde_json::from_str::<DeviceType>("\"Toaster\"").is_err());
        assert!(serde_json::from_str::<DeviceType>("3").is_err());
        assert!(serde_json::from_str::<DeviceType>("-1").is_err());
        assert!(serde_json::from_str::<DeviceType>("true").is_err());
    }
}
