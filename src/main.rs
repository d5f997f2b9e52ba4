use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shapdash::config::ProjectConfig;
use shapdash::data::{AttributionMatrix, Dataset};
use shapdash::plot::{DependencePlot, Figure, Interaction, SummaryPlot, SummaryPlotType};
use shapdash::{pipeline, server};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shapdash", version, about = "SHAP dependence-plot dashboard")]
struct Cli {
    /// Project configuration file. Defaults to conf/parameters.toml when present.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fit the model, report test accuracy and write the attribution matrix.
    Run,
    /// Serve the interactive dashboard.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Render a single plot to a PNG file.
    Plot {
        /// Feature to plot. Without it the feature importance plot is drawn.
        #[arg(long)]
        feature: Option<String>,
        /// Color points by this column's segments.
        #[arg(long, conflicts_with = "interaction")]
        segment: Option<String>,
        /// Color points by this column, or `auto`.
        #[arg(long)]
        interaction: Option<String>,
        /// Overlay the median contribution line.
        #[arg(long)]
        median: bool,
        #[arg(long, default_value_t = SummaryPlotType::Bar)]
        plot_type: SummaryPlotType,
        #[arg(short, long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = ProjectConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Command::Run => {
            let out = pipeline::run(&config)?;
            println!("Model accuracy on test set: {:.2}%", out.accuracy * 100.0);
        }
        Command::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.dashboard.host.clone());
            let port = port.unwrap_or(config.dashboard.port);
            let dashboard = server::Dashboard::load(config).context("loading dashboard data")?;
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::serve(Arc::new(dashboard), &host, port))?;
        }
        Command::Plot {
            feature,
            segment,
            interaction,
            median,
            plot_type,
            out,
        } => {
            let dataset = Dataset::from_csv_path(&config.paths.train_x)?;
            let attributions = AttributionMatrix::from_csv_path(&config.paths.shap_values)?;
            let mut figure = Figure::new(config.dashboard.figure_width, config.dashboard.figure_height);
            match feature {
                Some(feature) => DependencePlot::new(feature)
                    .interaction(Interaction::parse(interaction.as_deref()))
                    .segment(segment)
                    .numeric_cols(config.numeric_cols.clone())
                    .median(median)
                    .bins(config.dashboard.histogram_bins)
                    .target(config.target_var.clone())
                    .render(&mut figure, &dataset, &attributions)?,
                None => {
                    if segment.is_some() || interaction.is_some() {
                        bail!("--segment and --interaction need a --feature");
                    }
                    SummaryPlot::new(plot_type).render(&mut figure, &dataset, &attributions)?
                }
            }
            figure.save_png(&out)?;
            println!("Wrote {}", out.display());
        }
    }
    Ok(())
}
