mod arg_parser;
mod driver;

use arg_parser::{ArgParser, SubCommand};
use driver::DriverExit;

use clap::Parser;
use std::error;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = ArgParser::parse();
    match args.sub_command {
        SubCommand::Manager {
            node,
            request_timeout,
            tls,
        } => {
            let config = arg_parser::manager_config(node, request_timeout, tls)?;
            let manager = server::start_manager(&config).await?;
            tracing::info!(addr = %manager.local_addr(), "manager ready, reading jobs from stdin");

            let stdin = BufReader::new(tokio::io::stdin());
            let (mut out, mut err) = (std::io::stdout(), std::io::stderr());
            let exit = driver::run(manager.pool(), stdin, &mut out, &mut err).await?;
            if exit == DriverExit::InputClosed {
                // keep serving the workers until told to stop
                tokio::signal::ctrl_c().await?;
                manager.pool().shutdown().await;
            }
        }
        SubCommand::Worker {
            node,
            listen,
            advertise,
            scratch_root,
            shell,
            tls,
        } => {
            let config = arg_parser::worker_config(node, listen, advertise, scratch_root, shell, tls);
            let worker = server::start_worker(&config).await?;
            let agent = worker.agent().clone();
            let stopped = worker.wait();
            tokio::pin!(stopped);

            tokio::select! {
                result = &mut stopped => result?,
                _ = tokio::signal::ctrl_c() => {
                    agent.exit().await;
                    stopped.await?;
                }
            }
        }
    }

    Ok(())
}
