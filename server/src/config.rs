use poollib::SandboxConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// TLS configuration for node-to-node traffic.
///
/// When enabled every connection is mutually authenticated: both sides present a certificate
/// signed by the cluster CA and verify the other's.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Enable TLS. If false, all other TLS settings are ignored.
    pub enabled: bool,

    /// CA certificate (PEM) that peer certificates must chain to.
    pub ca_cert_path: Option<PathBuf>,

    /// This node's certificate (PEM).
    pub cert_path: Option<PathBuf>,

    /// This node's private key (PEM). Must match the certificate.
    pub key_path: Option<PathBuf>,

    /// Name checked against peer certificates. Nodes dial each other by IP, so every node
    /// certificate carries this shared name instead of its address.
    pub domain_name: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ca_cert_path: None,
            cert_path: None,
            key_path: None,
            domain_name: "workpool".to_string(),
        }
    }
}

impl TlsConfig {
    /// Check if TLS is properly configured with all required files.
    pub fn is_complete(&self) -> bool {
        self.enabled
            && self.ca_cert_path.is_some()
            && self.cert_path.is_some()
            && self.key_path.is_some()
    }

    /// Turn `host:port` into a dialable url. Urls with a scheme pass through untouched.
    pub fn url_for(&self, addr: &str) -> String {
        if addr.contains("://") {
            addr.to_string()
        } else if self.enabled {
            format!("https://{}", addr)
        } else {
            format!("http://{}", addr)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Where the registry listens for workers.
    pub listen_addr: SocketAddr,
    pub tls: TlsConfig,
    /// Upper bound on one dispatch round trip, job runtime included.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 9001)),
            tls: TlsConfig::default(),
            request_timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl ManagerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Where the worker serves job requests. Port 0 picks a free port.
    pub listen_addr: SocketAddr,
    /// Address the manager should dial, when it differs from the bound one.
    pub advertise_addr: Option<String>,
    /// The manager's registry, `host:port` or a full url.
    pub manager_addr: String,
    pub sandbox: SandboxConfig,
    pub tls: TlsConfig,
    pub connect_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            advertise_addr: None,
            manager_addr: "127.0.0.1:9001".to_string(),
            sandbox: SandboxConfig::default(),
            tls: TlsConfig::default(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl WorkerConfig {
    pub fn new(manager_addr: impl Into<String>) -> Self {
        Self {
            manager_addr: manager_addr.into(),
            ..Default::default()
        }
    }

    pub fn with_sandbox(mut self, sandbox: SandboxConfig) -> Self {
        self.sandbox = sandbox;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls_config_default() {
        let cfg = TlsConfig::default();
        assert!(!cfg.enabled);
        assert!(cfg.ca_cert_path.is_none());
        assert!(cfg.cert_path.is_none());
        assert!(cfg.key_path.is_none());
        assert_eq!(cfg.domain_name, "workpool");
    }

    #[test]
    fn tls_config_is_not_complete_when_path_missing() {
        let base = TlsConfig {
            enabled: true,
            ca_cert_path: Some(PathBuf::from("/ca.pem")),
            cert_path: Some(PathBuf::from("/cert.pem")),
            key_path: Some(PathBuf::from("/key.pem")),
            ..Default::default()
        };
        assert!(base.is_complete());

        let mut cfg = base.clone();
        cfg.key_path = None;
        assert!(!cfg.is_complete());

        let mut cfg = base;
        cfg.enabled = false;
        assert!(!cfg.is_complete());
    }

    #[test]
    fn url_scheme_follows_tls() {
        let mut cfg = TlsConfig::default();
        assert_eq!(cfg.url_for("10.0.0.1:9001"), "http://10.0.0.1:9001");
        cfg.enabled = true;
        assert_eq!(cfg.url_for("10.0.0.1:9001"), "https://10.0.0.1:9001");
        assert_eq!(cfg.url_for("http://host:1"), "http://host:1");
    }

    #[test]
    fn node_config_defaults() {
        let manager = ManagerConfig::default();
        assert_eq!(manager.listen_addr.to_string(), "127.0.0.1:9001");
        assert_eq!(manager.request_timeout, Duration::from_secs(600));

        let worker = WorkerConfig::new("10.0.0.1:9001");
        assert_eq!(worker.manager_addr, "10.0.0.1:9001");
        assert_eq!(worker.listen_addr.port(), 0);
        assert!(worker.advertise_addr.is_none());
    }
}
