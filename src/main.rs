use anyhow::Context;
use clap::Parser;
use pishare::client::join::join_cluster;
use pishare::config::ServerArgs;
use pishare::server::context::ServerContext;
use pishare::server::listener::FileServer;
use pishare::telemetry::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    init_logging(&args.log_level);

    // 1. Storage:
    let ctx = ServerContext::open(&args.storage_dir, args.limits())
        .await
        .with_context(|| format!("failed to open storage at {}", args.storage_dir.display()))?;

    // 2. Listener:
    let server = FileServer::bind(args.listen_addr(), ctx.clone()).await?;
    let port = server.local_addr()?.port();

    // 3. Optional registration with a primary:
    if let Some(primary) = &args.join {
        let node = join_cluster(primary, args.advertise.as_deref(), port, &ctx.files).await?;
        tracing::info!("Joined {} as {}", primary, node);
    }

    // 4. Ctrl+C:
    let signal_ctx = ctx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl+C, shutting down");
                signal_ctx.shutdown();
            }
            Err(e) => tracing::warn!("Cannot listen for Ctrl+C: {}", e),
        }
    });

    tracing::info!("Press Ctrl+C to shutdown");
    server.run().await
}
