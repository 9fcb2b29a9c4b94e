use clap::{Args, Parser, Subcommand};
use poollib::SandboxConfig;
use server::{ManagerConfig, TlsConfig, WorkerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Run shell-script jobs on a pool of remote workers
#[derive(Debug, Parser)]
#[clap(name = "workpool", version)]
pub struct ArgParser {
    /// The sub-command to use
    #[clap(subcommand)]
    pub sub_command: SubCommand,
}

#[derive(Debug, Subcommand)]
pub enum SubCommand {
    /// host the pool and read one job per line from stdin
    Manager {
        #[clap(flatten)]
        node: NodeArgs,

        #[clap(long, default_value = "600")]
        /// seconds to wait for a job's reply
        request_timeout: u64,

        #[clap(flatten)]
        tls: TlsArgs,
    },
    /// serve jobs for the manager at --host/--port
    Worker {
        #[clap(flatten)]
        node: NodeArgs,

        #[clap(long, default_value = "127.0.0.1:0")]
        /// address this worker listens on
        listen: SocketAddr,

        #[clap(long)]
        /// address the manager should dial, if not the listening one
        advertise: Option<String>,

        #[clap(long, env = "WORKPOOL_SCRATCH")]
        /// directory under which each job gets its scratch directory
        scratch_root: Option<PathBuf>,

        #[clap(long, default_value = "/bin/sh")]
        /// shell that runs the job scripts
        shell: PathBuf,

        #[clap(flatten)]
        tls: TlsArgs,
    },
}

#[derive(Debug, Args)]
pub struct NodeArgs {
    /// The manager's host
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,
    /// The manager's port
    #[clap(short, long, default_value = "9001")]
    pub port: u16,
    /// seconds to wait when connecting to a peer
    #[clap(long, default_value = "5")]
    pub connect_timeout: u64,
}

impl NodeArgs {
    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Args)]
pub struct TlsArgs {
    /// enable mutual TLS
    #[clap(long, requires_all = &["ca-cert", "cert", "key"])]
    pub tls: bool,
    /// CA certificate peers must chain to
    #[clap(long)]
    pub ca_cert: Option<PathBuf>,
    /// this node's certificate
    #[clap(long)]
    pub cert: Option<PathBuf>,
    /// this node's private key
    #[clap(long)]
    pub key: Option<PathBuf>,
    /// name every node certificate is issued for
    #[clap(long, default_value = "workpool")]
    pub tls_domain: String,
}

impl From<TlsArgs> for TlsConfig {
    fn from(args: TlsArgs) -> Self {
        Self {
            enabled: args.tls,
            ca_cert_path: args.ca_cert,
            cert_path: args.cert,
            key_path: args.key,
            domain_name: args.tls_domain,
        }
    }
}

/// Build a manager config; the manager listens where workers are told to find it.
pub fn manager_config(
    node: NodeArgs,
    request_timeout: u64,
    tls: TlsArgs,
) -> Result<ManagerConfig, std::net::AddrParseError> {
    Ok(ManagerConfig {
        listen_addr: node.addr().parse()?,
        tls: tls.into(),
        request_timeout: Duration::from_secs(request_timeout),
        connect_timeout: Duration::from_secs(node.connect_timeout),
    })
}

pub fn worker_config(
    node: NodeArgs,
    listen: SocketAddr,
    advertise: Option<String>,
    scratch_root: Option<PathBuf>,
    shell: PathBuf,
    tls: TlsArgs,
) -> WorkerConfig {
    let sandbox = match scratch_root {
        Some(root) => SandboxConfig::new(root),
        None => SandboxConfig::default(),
    };
    WorkerConfig {
        listen_addr: listen,
        advertise_addr: advertise,
        manager_addr: node.addr(),
        sandbox: sandbox.with_shell(shell),
        tls: tls.into(),
        connect_timeout: Duration::from_secs(node.connect_timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_defaults() {
        let args = ArgParser::try_parse_from(["workpool", "manager"]).unwrap();
        match args.sub_command {
            SubCommand::Manager {
                node,
                request_timeout,
                tls,
            } => {
                let config = manager_config(node, request_timeout, tls).unwrap();
                assert_eq!(config.listen_addr.to_string(), "127.0.0.1:9001");
                assert!(!config.tls.enabled);
                assert_eq!(config.request_timeout, Duration::from_secs(600));
            }
            other => panic!("parsed the wrong sub-command: {:?}", other),
        }
    }

    #[test]
    fn worker_flags() {
        let args = ArgParser::try_parse_from([
            "workpool",
            "worker",
            "-H",
            "10.0.0.1",
            "--port",
            "7000",
            "--scratch-root",
            "/var/tmp/jobs",
            "--shell",
            "/bin/bash",
        ])
        .unwrap();
        match args.sub_command {
            SubCommand::Worker {
                node,
                listen,
                advertise,
                scratch_root,
                shell,
                tls,
            } => {
                let config = worker_config(node, listen, advertise, scratch_root, shell, tls);
                assert_eq!(config.manager_addr, "10.0.0.1:7000");
                assert_eq!(config.sandbox.scratch_root, PathBuf::from("/var/tmp/jobs"));
                assert_eq!(config.sandbox.shell, PathBuf::from("/bin/bash"));
            }
            other => panic!("parsed the wrong sub-command: {:?}", other),
        }
    }

    #[test]
    fn tls_needs_its_files() {
        let parsed = ArgParser::try_parse_from(["workpool", "manager", "--tls"]);
        assert!(parsed.is_err());

        let args = ArgParser::try_parse_from([
            "workpool", "manager", "--tls", "--ca-cert", "ca.pem", "--cert", "node.pem", "--key",
            "node.key",
        ])
        .unwrap();
        match args.sub_command {
            SubCommand::Manager { tls, .. } => {
                let config = TlsConfig::from(tls);
                assert!(config.is_complete());
                assert_eq!(config.domain_name, "workpool");
            }
            other => panic!("parsed the wrong sub-command: {:?}", other),
        }
    }
}
