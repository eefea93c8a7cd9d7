//! Connection parameters shared by a batch.

use std::{fmt, str::FromStr, time::Duration};

use zeroize::Zeroizing;

/// Command-line dialect spoken by a device.
///
/// Only Cisco IOS is modelled; the identifier mirrors the name operators
/// already use in inventory files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceFamily {
    /// Cisco IOS and IOS-XE.
    #[default]
    CiscoIos,
}

impl DeviceFamily {
    /// Inventory identifier, e.g. `cisco_ios`.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceFamily::CiscoIos => "cisco_ios",
        }
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cisco_ios" | "ios" => Ok(DeviceFamily::CiscoIos),
            other => Err(format!("unsupported device family: {other}")),
        }
    }
}

/// Credentials and session settings shared by every device of a batch.
///
/// A batch builds one template (no address) and every device receives its
/// own copy through [`ConnectionParameters::for_address`].
#[derive(Clone)]
pub struct ConnectionParameters {
    address: Option<String>,
    username: String,
    password: Zeroizing<String>,
    secret: Zeroizing<String>,
    device_family: DeviceFamily,
    keepalive: Duration,
}

impl ConnectionParameters {
    /// Keepalive used unless overridden.
    pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(10);

    /// Template parameters; the enable secret defaults to the password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        let password = Zeroizing::new(password.into());
        Self {
            address: None,
            username: username.into(),
            secret: password.clone(),
            password,
            device_family: DeviceFamily::default(),
            keepalive: Self::DEFAULT_KEEPALIVE,
        }
    }

    /// Privileged-mode secret when it differs from the password.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Zeroizing::new(secret.into());
        self
    }

    /// Overrides the device family.
    pub fn with_device_family(mut self, family: DeviceFamily) -> Self {
        self.device_family = family;
        self
    }

    /// Overrides the session keepalive interval.
    pub fn with_keepalive(mut self, keepalive: Duration) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Independent copy of these parameters bound to one device address.
    pub fn for_address(&self, address: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.address = Some(address.into());
        copy
    }

    /// Device address; `None` on the batch template.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Login user.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Login password.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Privileged-mode secret.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Command-line dialect of the device.
    pub fn device_family(&self) -> DeviceFamily {
        self.device_family
    }

    /// Session keepalive interval.
    pub fn keepalive(&self) -> Duration {
        self.keepalive
    }
}

impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("device_family", &self.device_family)
            .field("keepalive", &self.keepalive)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_defaults_to_password() {
        let params = ConnectionParameters::new("admin", "cisco123");
        assert_eq!(params.secret(), "cisco123");
        assert_eq!(params.device_family(), DeviceFamily::CiscoIos);
        assert_eq!(params.keepalive(), Duration::from_secs(10));
        assert!(params.address().is_none());
    }

    #[test]
    fn per_device_copies_are_independent() {
        let template = ConnectionParameters::new("admin", "cisco123");
        let first = template.for_address("10.0.0.1");
        let second = template.for_address("10.0.0.2").with_secret("enable");

        assert_eq!(first.address(), Some("10.0.0.1"));
        assert_eq!(second.address(), Some("10.0.0.2"));
        assert_eq!(first.secret(), "cisco123");
        assert_eq!(second.secret(), "enable");
        assert!(template.address().is_none());
    }

    #[test]
    fn debug_output_redacts_credentials() {
        let params = ConnectionParameters::new("admin", "hunter2");
        let rendered = format!("{params:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn parses_device_family_names() {
        assert_eq!("cisco_ios".parse::<DeviceFamily>(), Ok(DeviceFamily::CiscoIos));
        assert_eq!("IOS".parse::<DeviceFamily>(), Ok(DeviceFamily::CiscoIos));
        assert!("junos".parse::<DeviceFamily>().is_err());
    }
}
