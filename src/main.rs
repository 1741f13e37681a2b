//! CMU Universal Domain Adaptation CLI
//!
//! Entry point for training, evaluating, and analyzing universal domain
//! adaptation runs with the Burn framework.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use cmu_uda::model::{ModelConfig, TrainingConfig, UniversalConfig};
use cmu_uda::training::{run_analysis, run_test, run_training, RunConfig};
use cmu_uda::utils::logging::{init_logging, LogConfig};

/// Universal domain adaptation with calibrated multiple uncertainties
#[derive(Parser, Debug)]
#[command(name = "cmu_uda")]
#[command(version = cmu_uda::VERSION)]
#[command(about = "Universal domain adaptation with an uncertainty ensemble", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Task selection and hyperparameters shared by all subcommands.
#[derive(Args, Debug)]
struct TaskArgs {
    /// Dataset name (Office31, OfficeHome, VisDA2017, DomainNet, Synthetic)
    #[arg(short, long, default_value = "Office31")]
    dataset: String,

    /// Source domain
    #[arg(short, long, default_value = "A")]
    source: String,

    /// Target domain
    #[arg(short, long, default_value = "W")]
    target: String,

    /// Root directory holding <domain>/<class>/<image> trees
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Directory for checkpoints and artifacts
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// Backbone architecture
    #[arg(long, default_value = "cnn32")]
    arch: String,

    /// Input image size (square)
    #[arg(long, default_value = "64")]
    image_size: usize,

    /// Batch size
    #[arg(short, long, default_value = "32")]
    batch_size: usize,

    /// Rejection threshold: lower-scoring target samples become unknown
    #[arg(long, default_value = "0.7")]
    threshold: f32,

    /// Data loading worker count (recorded with the run; loading is
    /// synchronous)
    #[arg(short = 'j', long, default_value = "2")]
    workers: usize,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full three-stage training protocol
    Train {
        #[command(flatten)]
        task: TaskArgs,

        /// Adversarial epochs
        #[arg(short, long, default_value = "30")]
        epochs: usize,

        /// Pretraining epochs
        #[arg(long, default_value = "5")]
        epochs_pretrain: usize,

        /// Iterations per epoch
        #[arg(short, long, default_value = "200")]
        iters_per_epoch: usize,

        /// Initial learning rate
        #[arg(short, long, default_value = "0.001")]
        learning_rate: f64,

        /// Selection threshold for the source class weighter
        #[arg(long, default_value = "0.4")]
        src_threshold: f32,

        /// Binarization cut for the class weight vector
        #[arg(long, default_value = "0.1")]
        cut: f32,

        /// Trade-off on the domain-adversarial loss
        #[arg(long, default_value = "1.0")]
        trade_off: f64,

        /// Quick smoke mode with a tiny schedule
        #[arg(long, default_value = "false")]
        quick: bool,
    },

    /// Evaluate the best checkpoint on the target domain
    Test {
        #[command(flatten)]
        task: TaskArgs,
    },

    /// Dump per-sample ensemble scores for both domains to CSV
    Analyze {
        #[command(flatten)]
        task: TaskArgs,
    },

    /// List registered datasets and their universal class splits
    Datasets,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Train {
            task,
            epochs,
            epochs_pretrain,
            iters_per_epoch,
            learning_rate,
            src_threshold,
            cut,
            trade_off,
            quick,
        } => {
            let mut training = if quick {
                println!("{}", "Quick mode: tiny schedule for smoke runs".yellow());
                TrainingConfig::quick()
            } else {
                TrainingConfig {
                    epochs,
                    epochs_pretrain,
                    iters_per_epoch,
                    learning_rate,
                    batch_size: task.batch_size,
                    ..Default::default()
                }
            };
            if task.seed.is_some() {
                training.seed = task.seed;
            }

            let universal = UniversalConfig {
                threshold: task.threshold,
                src_threshold,
                cut,
                trade_off,
            };
            let config = build_run_config(task, training, universal);

            let metrics = run_training(&config)?;
            println!(
                "{}",
                format!(
                    "Best H-score {:.2} (known {:.2}, unknown {:.2})",
                    metrics.h_score, metrics.known_accuracy, metrics.unknown_accuracy
                )
                .green()
                .bold()
            );
        }

        Commands::Test { task } => {
            let universal = UniversalConfig {
                threshold: task.threshold,
                ..Default::default()
            };
            let training = TrainingConfig {
                batch_size: task.batch_size,
                seed: task.seed,
                ..Default::default()
            };
            let config = build_run_config(task, training, universal);

            let metrics = run_test(&config)?;
            println!(
                "{}",
                format!(
                    "H-score {:.2}  mean {:.2}  known {:.2}  unknown {:.2}",
                    metrics.h_score,
                    metrics.mean_accuracy,
                    metrics.known_accuracy,
                    metrics.unknown_accuracy
                )
                .green()
            );
        }

        Commands::Analyze { task } => {
            let universal = UniversalConfig {
                threshold: task.threshold,
                ..Default::default()
            };
            let training = TrainingConfig {
                batch_size: task.batch_size,
                seed: task.seed,
                ..Default::default()
            };
            let config = build_run_config(task, training, universal);

            let path = run_analysis(&config)?;
            println!("{}", format!("Scores written to {}", path.display()).green());
        }

        Commands::Datasets => {
            for name in cmu_uda::dataset_names() {
                let spec = cmu_uda::lookup_dataset(name)?;
                println!(
                    "{:<12} domains [{}]  common {}  source-private {}  total {}",
                    name.bold(),
                    spec.domains.join(", "),
                    spec.num_common_classes,
                    spec.num_source_private,
                    spec.num_total_classes,
                );
            }
        }
    }

    Ok(())
}

fn build_run_config(
    task: TaskArgs,
    mut training: TrainingConfig,
    universal: UniversalConfig,
) -> RunConfig {
    training.num_workers = task.workers;
    RunConfig {
        dataset: task.dataset,
        source: task.source,
        target: task.target,
        data_root: task.data_root,
        output_dir: task.output_dir,
        model: ModelConfig {
            arch: task.arch,
            input_size: task.image_size,
            ..Default::default()
        },
        training,
        universal,
    }
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════════════╗
 ║   CMU Universal Domain Adaptation                                ║
 ║   Calibrated Multiple Uncertainties with Burn + Rust             ║
 ╚══════════════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workers_flag_reaches_config() {
        let cli = Cli::parse_from(["cmu_uda", "train", "--workers", "7", "--quick"]);
        let Commands::Train { task, .. } = cli.command else {
            panic!("expected train subcommand");
        };
        assert_eq!(task.workers, 7);

        let config =
            build_run_config(task, TrainingConfig::default(), UniversalConfig::default());
        assert_eq!(config.training.num_workers, 7);
    }
}
