use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info};
use weave::domain::config::{LoggingConfig, WeaveConfig};
use weave::features::current_view;
use weave::kernel::aspects::{Artifact, Provider};
use weave::kernel::config::load_config;
use weave::kernel::lifecycle::Status;
use weave::{Composition, compose_application, features, standard_aspects};
use weave_logger::{LevelFilter, Logger};

/// Composes the bundled features and drives them with `view.change` intents.
#[derive(Debug, Parser)]
#[command(name = "weave", version, about)]
struct Args {
    /// Configuration file; `weave.{toml,yaml,json}` in the working directory if omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// View to switch to; repeat to dispatch several changes in order.
    #[arg(long = "view", value_name = "NAME")]
    views: Vec<String>,

    /// Disable a feature by name; repeatable.
    #[arg(long = "disable", value_name = "FEATURE")]
    disabled: Vec<String>,

    /// Write JSON log files (requires a log directory).
    #[arg(long)]
    json_logs: bool,

    /// Directory for rolling log files.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[weave_runtime::main(cooperative)]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config: WeaveConfig =
        load_config(args.config.as_ref()).context("Critical: Configuration is malformed")?;
    for name in &args.disabled {
        config.compose.flags.insert(name.clone(), false);
    }

    let _logger = init_logger(&args, &config.logging)?;

    let (root_tx, root_rx) = tokio::sync::oneshot::channel::<Option<Artifact>>();
    let app = compose_application(
        Composition::builder()
            .features(features::all()?)
            .aspects(standard_aspects())
            .config(config)
            .on_status(|status: &Status<'_>| {
                debug!(
                    phase = %status.phase,
                    feature = status.feature.unwrap_or("-"),
                    failed = status.error.is_some(),
                    "{}",
                    status.message
                );
            })
            .on_render_ready(move |root| {
                // The receiver only goes away if main has already returned.
                let _ = root_tx.send(root);
            })
            .build(),
    )
    .await
    .context("Composition failed")?;

    for failure in app.hook_failures() {
        info!(feature = %failure.feature, error = %failure.error, "Feature started degraded");
    }

    for view in &args.views {
        app.dispatch(current_view::change(view))?;
    }

    let provider = root_rx.await.ok().flatten().and_then(|root| root.downcast::<Provider>().ok());
    if let Some(provider) = &provider {
        provider.store().settled().await;
        render(provider)?;
    }

    app.shutdown().await?;
    Ok(())
}

fn init_logger(args: &Args, config: &LoggingConfig) -> anyhow::Result<Logger> {
    let level = config.level.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);
    let builder = Logger::builder().name(env!("CARGO_PKG_NAME")).console(true).level(level);
    let builder = match &config.filter {
        Some(filter) => builder.env_filter(filter.clone()),
        None => builder,
    };

    let logger = match args.log_dir.clone().or_else(|| config.directory.clone()) {
        Some(dir) if args.json_logs || config.json => builder.path(dir).json().init()?,
        Some(dir) => builder.path(dir).init()?,
        None => builder.init()?,
    };
    Ok(logger)
}

#[allow(clippy::print_stdout)]
fn render(provider: &Provider) -> anyhow::Result<()> {
    let state = provider.store().state();
    println!("{}", serde_json::to_string_pretty(state.as_value())?);
    Ok(())
}
