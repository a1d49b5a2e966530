use cdc_amqp_sink::{Config, Error, Replicator, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "cdc-amqp-sink")]
#[command(about = "Publishes change events to RabbitMQ with publisher confirms", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,

    #[arg(long, help = "Delete the checkpoint and replay the source from the start")]
    reset_checkpoint: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting cdc-amqp-sink");
    info!("Loading configuration from {:?}", args.config);

    let config = match Config::from_file(&args.config) {
        Ok(cfg) => {
            info!("Configuration loaded successfully");
            cfg
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    info!(
        amqp_host = %config.rabbitmq.connection.host,
        amqp_port = config.rabbitmq.connection.port,
        exchange = ?config.rabbitmq.exchange_override(),
        routing_key_source = %config.rabbitmq.routing_key_source,
        delivery_mode = config.rabbitmq.delivery_mode,
        ack_timeout_ms = config.rabbitmq.ack_timeout_ms,
        source = ?config.source.path,
        batch_size = config.source.batch_size,
        "Configuration summary"
    );

    let replicator = Replicator::new(config);

    if args.reset_checkpoint {
        replicator.reset_checkpoint().await?;
    }

    match replicator.run().await {
        Ok(_) | Err(Error::Shutdown) => {
            info!("cdc-amqp-sink stopped");
            Ok(())
        }
        Err(e) => {
            error!("Replication failed: {}", e);
            Err(e)
        }
    }
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("cdc_amqp_sink=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("cdc_amqp_sink=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
