use clap::Parser;
use dotenvy::dotenv;
use tokio::fs::File;
use tokio::io::{self, BufReader};

use chain_alerter::alerter::Alerter;
use chain_alerter::alerts::JsonLinesSink;
use chain_alerter::cli::Cli;
use chain_alerter::config::{load_alerts_config, Config, InputSource};
use chain_alerter::error::AppError;
use chain_alerter::logging::init_logging;
use chain_alerter::metrics::AppMetrics;
use chain_alerter::replay::run_replay;

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let config = Config::load(&cli)
        .map_err(AppError::Config)
        .unwrap_or_else(|err| {
            tracing::error!("{}", err);
            std::process::exit(1);
        });

    tracing::info!("Service started with config: {:?}", config);

    if let Err(err) = run(config).await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), AppError> {
    let alerts_config = load_alerts_config(&config.alerts_config_path)?;
    let metrics = AppMetrics::new()?;
    let mut alerter = Alerter::new(alerts_config);
    let sink = JsonLinesSink::new(io::stdout());

    match &config.input {
        InputSource::Stdin => {
            run_replay(BufReader::new(io::stdin()), &mut alerter, &sink, &metrics).await?;
        }
        InputSource::File(path) => {
            let file = File::open(path).await?;
            run_replay(BufReader::new(file), &mut alerter, &sink, &metrics).await?;
        }
    }

    if config.print_metrics {
        eprint!("{}", metrics.render()?);
    }
    Ok(())
}
