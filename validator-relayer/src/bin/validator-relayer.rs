use std::{
    backtrace::{Backtrace, BacktraceStatus},
    path::PathBuf,
};

use alloy::signers::local::PrivateKeySigner;
use anyhow::Result;
use clap::Parser;
use tokio::signal::{self, unix::SignalKind};
use tracing::info;
use tracing_subscriber::EnvFilter;
use validator_relayer::{cfg::RelayerConfig, launcher, shutdown};

#[derive(Parser, Debug)]
struct Args {
    /// Hex encoded private key of the authorized submitter.
    #[arg(value_parser = parse_signer)]
    private_key: PrivateKeySigner,
    #[clap(long, short, default_value = "config.toml")]
    config_file: PathBuf,
    /// Simulate submissions instead of broadcasting them, regardless of the config file.
    #[clap(long)]
    dry_run: bool,
    #[clap(long, default_value = "false")]
    log_json: bool,
}

fn parse_signer(s: &str) -> Result<PrivateKeySigner> {
    Ok(s.parse()?)
}

fn set_panic_hook() {
    // Record panics as `tracing` events at the `ERROR` verbosity level.
    std::panic::set_hook(Box::new(|panic| {
        let message = match panic.payload().downcast_ref::<&'static str>() {
            Some(s) => *s,
            None => match panic.payload().downcast_ref::<String>() {
                Some(s) => &s[..],
                None => "Box<dyn Any>",
            },
        };
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("<unnamed>");

        let backtrace = Backtrace::capture();
        let backtrace =
            (backtrace.status() == BacktraceStatus::Captured).then(|| backtrace.to_string());

        match (panic.location(), backtrace) {
            (None, None) => tracing::error!(thread_name, message),
            (None, Some(backtrace)) => tracing::error!(thread_name, message, %backtrace),
            (Some(location), backtrace) => tracing::error!(
                thread_name,
                message,
                panic.file = location.file(),
                panic.line = location.line(),
                backtrace = backtrace.as_deref().unwrap_or_default(),
            ),
        }
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_line_number(true);
    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
    set_panic_hook();

    let mut config = validator_relayer::read_config(&args.config_file)?;
    config.dry_run |= args.dry_run;
    let config = RelayerConfig::new(config, args.private_key)?;

    let (trigger, shutdown) = shutdown::channel();
    let mut terminate = signal::unix::signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = signal::ctrl_c() => info!("Received interrupt, shutting down"),
            _ = terminate.recv() => info!("Received terminate, shutting down"),
        }
        trigger.trigger();
    });

    // Connecting can hang on an unresponsive endpoint, so startup has to observe signals too.
    let mut startup = shutdown.clone();
    let Some(relayer) = startup.run_until(launcher::launch(config, shutdown)).await else {
        info!("Shutdown requested during startup");
        return Ok(());
    };
    relayer?.run().await
}
