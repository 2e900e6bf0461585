use clap::{Args, Parser, Subcommand};
use detector_cli::logger::init_logger;
use detector_cli::{render_runs, CompareApp, EvaluateApp, HistoryApp, PredictApp, TrainApp};
use detector_core::{DatasetSpec, Evaluation, ModelChoice};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "url-detector")]
#[command(about = "Train, evaluate and compare malicious URL detectors")]
#[command(version = "0.1.0")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model on a labelled CSV and save it
    Train {
        #[command(flatten)]
        data: DataArgs,

        /// simple_nn, big_conv_nn or boosted
        #[arg(short, long, default_value = "big_conv_nn")]
        model: ModelChoice,

        #[arg(long, default_value_t = 5)]
        epochs: usize,

        #[arg(long, default_value_t = 32)]
        batch_size: usize,

        #[arg(long, default_value_t = 200)]
        max_length: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Where to write the trained model
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Score a labelled CSV with a saved model
    Evaluate {
        #[arg(long)]
        model_path: PathBuf,

        #[command(flatten)]
        data: DataArgs,

        /// Write the ROC curve to this CSV
        #[arg(long)]
        roc: Option<PathBuf>,
    },
    /// Print the malicious probability of each URL
    Predict {
        #[arg(long)]
        model_path: PathBuf,

        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Run the experiment described by a TOML file
    Compare {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show stored experiment runs
    History {
        #[arg(long, default_value = "runs.db")]
        db: PathBuf,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Delete every stored run
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Args)]
struct DataArgs {
    /// Labelled CSV file
    #[arg(short, long)]
    data: PathBuf,

    #[arg(long, default_value = "url")]
    url_column: String,

    #[arg(long, default_value = "isMalicious")]
    label_column: String,

    /// Map string labels to 0/1 using --positive-label
    #[arg(long)]
    binarize: bool,

    #[arg(long, default_value = "bad")]
    positive_label: String,
}

impl DataArgs {
    fn into_spec(self) -> DatasetSpec {
        let name = self
            .data
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());
        DatasetSpec {
            name,
            path: self.data.to_string_lossy().into_owned(),
            url_column: self.url_column,
            label_column: self.label_column,
            binarize: self.binarize,
            positive_label: self.positive_label,
        }
    }
}

fn print_evaluation(evaluation: &Evaluation) {
    println!("{}", evaluation);
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Train {
            data,
            model,
            epochs,
            batch_size,
            max_length,
            seed,
            out,
        } => {
            let mut app = TrainApp::new(data.into_spec(), model, out);
            app.training.epochs = epochs;
            app.training.batch_size = batch_size;
            app.training.seed = seed;
            app.args.max_length = max_length;
            app.args.seed = seed;
            app.boosting.seed = seed;
            let evaluation = app.run()?;
            println!("Saved {} to {}", app.model, app.out.display());
            println!("Hold-out ({} samples):", evaluation.samples);
            print_evaluation(&evaluation);
        }
        Commands::Evaluate { model_path, data, roc } => {
            let mut app = EvaluateApp::new(model_path, data.into_spec());
            app.roc_path = roc;
            let evaluation = app.run()?;
            print_evaluation(&evaluation);
        }
        Commands::Predict { model_path, urls } => {
            let app = PredictApp::new(&model_path)?;
            for (url, score) in app.run(&urls)? {
                println!("{:.4}\t{}", score, url);
            }
        }
        Commands::Compare { config } => {
            let report = CompareApp::new(&config)?.run()?;
            print!("{}", report.render());
        }
        Commands::History { db, limit, clear } => {
            let app = HistoryApp::new(&db)?;
            if clear {
                let removed = app.clear()?;
                println!("Removed {} runs", removed);
                return Ok(());
            }
            print!("{}", render_runs(&app.recent(limit)?));
            let stats = app.stats()?;
            println!(
                "{} runs over {} datasets and {} models ({} bytes)",
                stats.total_runs, stats.datasets, stats.models, stats.db_size_bytes
            );
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose, cli.json);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
