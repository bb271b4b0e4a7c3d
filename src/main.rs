use std::process;

use log::error;
use nightly_fetch::checker::Checker;
use nightly_fetch::config::Config;
use nightly_fetch::poller::Poller;

/// Exit code for a wrong command line.
const USAGE_EXIT_CODE: i32 = 2;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let Some(download_dir) = download_dir(std::env::args().skip(1)) else {
        println!("Usage: nightly-fetch download/directory/");
        process::exit(USAGE_EXIT_CODE);
    };

    let config = Config::from_env(download_dir)?;
    let client = config.http_client()?;
    let poller = Poller::new(Checker::new(client, config));
    let poll = tokio::spawn(poller.run());

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            println!("Ctrl-C detected, stopping");
        }
        result = poll => {
            if let Err(err) = result? {
                error!("stopping after failed check: {}", err);
            }
        }
    }
    process::exit(1);
}

/// The download directory, when it is the only argument.
fn download_dir(mut args: impl Iterator<Item = String>) -> Option<String> {
    match (args.next(), args.next()) {
        (Some(download_dir), None) => Some(download_dir),
        _ => None,
    }
}
