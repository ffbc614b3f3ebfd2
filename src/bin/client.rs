use clap::Parser;
use pishare::client::driver::Client;
use pishare::client::join::discover_local_ip;
use pishare::client::types::{ClientError, TransferReport};
use pishare::config::{ClientArgs, ClientCommand};
use pishare::storage::directory::LocalFileDirectory;
use pishare::storage::types::ServerNode;
use pishare::telemetry::init_logging;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match ClientArgs::try_parse() {
        Ok(args) => args,
        Err(e) if !e.use_stderr() => {
            // --help / --version
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };
    init_logging(&args.log_level);

    let command = match args.command() {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!(
                "Usage: pishare-client <host:port> <GET|PUT|DELETE|LIST|ADD_SERVER> [remote] [local]"
            );
            return ExitCode::FAILURE;
        }
    };

    match run(&args, command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &ClientArgs, command: ClientCommand) -> anyhow::Result<()> {
    let client = Client::new(args.target.clone());

    match command {
        ClientCommand::Get { remote, local } => {
            let report = client.get(&remote, &local).await?;
            print_report("GET", &remote, &report);
        }
        ClientCommand::Put { remote, local } => {
            let report = client.put(&remote, &local).await?;
            print_report("PUT", &remote, &report);
        }
        ClientCommand::Delete { remote } => {
            client.delete(&remote).await?;
            println!("Deleted {}", remote);
        }
        ClientCommand::List => {
            let listing = client.list().await?;
            if !listing.body.is_empty() {
                println!("{}", listing.body);
            }
            if listing.extra > 0 {
                eprintln!("{}", ClientError::Overrun { extra: listing.extra });
            }
        }
        ClientCommand::AddServer { port } => {
            let files = LocalFileDirectory::open(&args.storage_dir).await?;
            let node = ServerNode::new(discover_local_ip().await?.to_string(), port);
            client.add_server(&node, &files.list_all()).await?;
            println!("Registered {} with {} file(s)", node, files.len());
        }
    }
    Ok(())
}

/// Size mismatches are diagnostics, not failures.
fn print_report(verb: &str, remote: &str, report: &TransferReport) {
    match report.check() {
        Ok(()) => println!("{} {}: {} bytes", verb, remote, report.transferred),
        Err(e) => eprintln!("{} {}: {}", verb, remote, e),
    }
}
