use clap::Parser;
use deck_media::{Transcoder, compress_presentation};
use tokio_util::sync::CancellationToken;

use config::{Cli, Command, CompressArgs, SqueezeConfig};

mod api;
mod config;
mod handler;
mod page;
#[cfg(test)]
mod test_utils;
mod workspace;

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .filter_module("hyper", log::LevelFilter::Info)
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Command::Compress(args)) => compress_file(args, Transcoder::new(&cli.server.ffmpeg)).await,
        None => serve(SqueezeConfig::from(&cli.server)).await,
    };
    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn compress_file(args: CompressArgs, transcoder: Transcoder) -> anyhow::Result<()> {
    let output = args.output_path();
    let options = args.options();
    let input = args.input;
    let report = tokio::task::spawn_blocking({
        let output = output.clone();
        move || compress_presentation(&input, &output, &options, &transcoder)
    })
    .await??;
    println!("{}", report);
    println!("Saved to {}", output.display());
    Ok(())
}

async fn serve(config: SqueezeConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(config.work_dir())?;
    let state = api::AppState::new(config);
    let config = state.config.clone();

    let transcoder = state.transcoder.clone();
    if !tokio::task::spawn_blocking(move || transcoder.is_available()).await? {
        log::warn!(
            "{} not found, embedded videos will be left unchanged",
            state.transcoder.program().display()
        );
    }
    log::info!(
        "work dir {}, max upload {}",
        config.work_dir().display(),
        deck_media::format_size(config.max_file_size())
    );

    let cancel = CancellationToken::new();

    let server = api::start_api_server(state, cancel.clone());
    let sweeper = workspace::start_sweeper(
        cancel.clone(),
        config.work_dir().to_path_buf(),
        config.file_ttl(),
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            },
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
            },
        }
    }

    let (server, sweeper) = tokio::join!(server, sweeper);
    if let Err(e) = sweeper {
        log::error!("Sweeper task failed: {}", e);
    }
    server?
}
