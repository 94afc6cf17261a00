//! Proxy configuration with layered loading.
//!
//! Defaults are overlaid by an optional JSON config file, which in
//! turn is overlaid by CLI flags (handled by the daemon). Every value
//! has a documented default. `validate` runs once at startup; a
//! rejected configuration aborts the process before anything binds.

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ParleyError, Result};

/// One federated peer, keyed by domain in [`Configuration::federations`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationConfig {
    /// gRPC endpoint of the peer proxy, e.g. `https://chat.other.net:8080`.
    pub connection_string: String,
    /// Pre-shared key the peer presents as a bearer token, and which we
    /// present when calling it. Must be unique across the peer table.
    pub psk: String,
}

/// Global proxy configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Domain this deployment is authoritative for. Required.
    pub domain_name: String,

    /// Host/port the gRPC server binds.
    pub listen_addr: String,

    /// Redis connection URL.
    pub redis_addr: String,

    /// Soft cap on concurrently held tokens per user. Overflow appends;
    /// old tokens stay valid until explicitly deleted.
    pub max_tokens: usize,

    /// Cap on stored public keys per user; oldest keys drop on overflow.
    pub max_keys: usize,

    /// How often long-lived subscriptions re-check token validity,
    /// in milliseconds.
    pub revalidate_frequency_ms: u64,

    /// Federated peers, keyed by their domain.
    pub federations: HashMap<String, FederationConfig>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            domain_name: String::new(),
            listen_addr: "0.0.0.0:8080".into(),
            redis_addr: "redis://127.0.0.1:6379".into(),
            max_tokens: 5,
            max_keys: 10,
            revalidate_frequency_ms: 1_000,
            federations: HashMap::new(),
        }
    }
}

impl Configuration {
    /// Loads configuration from a JSON file.
    ///
    /// Absent fields take their defaults. The result is not validated;
    /// callers apply CLI overrides first and then call [`validate`].
    ///
    /// [`validate`]: Configuration::validate
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|_| ParleyError::Input)?;
        serde_json::from_str(&text).map_err(|_| ParleyError::Input)
    }

    /// Rejects configurations the proxy cannot safely run with.
    ///
    /// A duplicated PSK would make peer identification ambiguous: the
    /// admission pipeline resolves a peer by the PSK it presents.
    pub fn validate(&self) -> Result<()> {
        if self.domain_name.is_empty() {
            return Err(ParleyError::Input);
        }

        if self.max_keys == 0 {
            return Err(ParleyError::Input);
        }

        let mut seen = HashSet::new();
        for (domain, fed) in &self.federations {
            if domain.is_empty() || fed.connection_string.is_empty() || fed.psk.is_empty() {
                return Err(ParleyError::Input);
            }
            if !seen.insert(fed.psk.as_str()) {
                return Err(ParleyError::Input);
            }
        }

        Ok(())
    }

    /// Subscription revalidation interval as a `Duration`.
    pub fn revalidate_frequency(&self) -> Duration {
        Duration::from_millis(self.revalidate_frequency_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peered(domain: &str, psk: &str) -> (String, FederationConfig) {
        (
            domain.into(),
            FederationConfig {
                connection_string: format!("https://{domain}:8080"),
                psk: psk.into(),
            },
        )
    }

    fn valid() -> Configuration {
        Configuration {
            domain_name: "example.com".into(),
            federations: [peered("other.net", "psk-one"), peered("third.org", "psk-two")]
                .into_iter()
                .collect(),
            ..Configuration::default()
        }
    }

    #[test]
    fn defaults() {
        let c = Configuration::default();
        assert_eq!(c.listen_addr, "0.0.0.0:8080");
        assert_eq!(c.max_tokens, 5);
        assert_eq!(c.max_keys, 10);
        assert_eq!(c.revalidate_frequency(), Duration::from_secs(1));
    }

    #[test]
    fn valid_configuration_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn empty_domain_rejected() {
        let mut c = valid();
        c.domain_name.clear();
        assert_eq!(c.validate(), Err(ParleyError::Input));
    }

    #[test]
    fn duplicate_psks_rejected() {
        let mut c = valid();
        c.federations
            .insert("fourth.io".into(), peered("fourth.io", "psk-one").1);
        assert_eq!(c.validate(), Err(ParleyError::Input));
    }

    #[test]
    fn empty_peer_psk_rejected() {
        let mut c = valid();
        c.federations.get_mut("other.net").unwrap().psk.clear();
        assert_eq!(c.validate(), Err(ParleyError::Input));
    }

    #[test]
    fn json_roundtrip() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let c = valid();
        let json = serde_json::to_string(&c)?;
        let parsed: Configuration = serde_json::from_str(&json)?;
        assert_eq!(parsed.domain_name, c.domain_name);
        assert_eq!(parsed.federations, c.federations);
        Ok(())
    }

    #[test]
    fn partial_file_takes_defaults() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let parsed: Configuration =
            serde_json::from_str(r#"{"domain_name": "example.com"}"#)?;
        assert_eq!(parsed.max_tokens, 5);
        assert_eq!(parsed.redis_addr, "redis://127.0.0.1:6379");
        Ok(())
    }
}
