//! Wasserstein GANs for images, piano rolls and text
//!
//! Main entry point providing CLI interface for:
//! - Training a generator / critic pair
//! - Rendering sample grids from saved snapshots
//! - Writing a default configuration file

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use rust_wgan_sequences::{
    data::{BatchSource, DataType, MinibatchStream},
    model::{CriticArch, GeneratorArch, Network},
    training::{LossType, ScoreHistory, Trainer},
    utils::{find_latest_snapshot, save_sample_grid, Config, SnapshotMeta, TrialLayout},
};

/// Adversarial training for sequence and image data
#[derive(Parser)]
#[command(name = "wgan_sequences")]
#[command(version = "0.1.0")]
#[command(about = "Train Wasserstein GANs on MNIST, piano rolls and text")]
struct Cli {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a generator / critic pair
    Train(TrainArgs),

    /// Render a sample grid from a saved generator
    Sample {
        /// Trial folder written by `train`
        #[arg(short, long)]
        trial: PathBuf,

        /// Snapshot epoch (latest when omitted)
        #[arg(short, long)]
        epoch: Option<usize>,

        /// Grid side length
        #[arg(short, long, default_value = "12")]
        grid: i64,

        /// Seed for the noise
        #[arg(long, default_value = "1234")]
        seed: i64,

        /// Output image path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Initialize default configuration file
    Init {
        /// Output configuration file path
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
}

#[derive(Args)]
struct TrainArgs {
    /// Corpus kind: mnist, proll or text
    datatype: DataType,

    /// Critic architecture: dcgan (mnist) or crepe
    critic: CriticArch,

    /// Generator architecture: dcgan (mnist) or lstm
    generator: GeneratorArch,

    /// Number of epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Generator updates per epoch (0 = one pass over the data)
    #[arg(long)]
    epoch_size: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    critic_lr: Option<f64>,

    #[arg(long)]
    generator_lr: Option<f64>,

    /// Critic weight clip bound (0 disables clipping)
    #[arg(long)]
    clip: Option<f64>,

    #[arg(long)]
    noise_size: Option<i64>,

    /// Map piano-roll cells to {-1, 1}
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    boolean: Option<bool>,

    /// Condition both networks on the label
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    conditional: Option<bool>,

    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    critic_bn: Option<bool>,

    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    generator_bn: Option<bool>,

    /// Regular critic iterations per generator update
    #[arg(long)]
    c_iters: Option<usize>,

    /// Critic iterations during warm-up and boosts
    #[arg(long)]
    cl_iters: Option<usize>,

    /// Loss: vanilla, wgan, iwgan or lsgan
    #[arg(long)]
    loss: Option<LossType>,

    /// Boost the critic every N generator iterations (0 disables)
    #[arg(long)]
    cl_freq: Option<usize>,

    /// Generator iterations with the large critic schedule
    #[arg(long)]
    warmup: Option<usize>,

    /// Linear learning-rate decay over the second half
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    decay: Option<bool>,

    /// Snapshot every N epochs
    #[arg(long)]
    save_every: Option<usize>,

    /// Gradient penalty coefficient
    #[arg(long)]
    lambda: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// Device: cpu or cuda
    #[arg(long)]
    device: Option<String>,

    /// Path to the corpus
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Root folder for trial folders
    #[arg(short, long, default_value = "results")]
    output: PathBuf,

    /// Continue the latest snapshot of this trial folder
    #[arg(long)]
    resume: Option<PathBuf>,
}

impl TrainArgs {
    /// Apply command-line overrides on top of `config`
    fn apply(&self, config: &mut Config) {
        config.data.datatype = self.datatype;
        config.model.critic = self.critic;
        config.model.generator = self.generator;

        if let Some(v) = self.epochs {
            config.training.num_epochs = v;
        }
        if let Some(v) = self.epoch_size {
            config.training.epoch_size = v;
        }
        if let Some(v) = self.batch_size {
            config.data.batch_size = v;
        }
        if let Some(v) = self.critic_lr {
            config.training.critic_lr = v;
        }
        if let Some(v) = self.generator_lr {
            config.training.generator_lr = v;
        }
        if let Some(v) = self.clip {
            config.training.clip = v;
        }
        if let Some(v) = self.noise_size {
            config.model.noise_size = v;
        }
        if let Some(v) = self.boolean {
            config.data.boolean = v;
        }
        if let Some(v) = self.conditional {
            config.model.conditional = v;
        }
        if let Some(v) = self.critic_bn {
            config.model.critic_batch_norm = v;
        }
        if let Some(v) = self.generator_bn {
            config.model.generator_batch_norm = v;
        }
        if let Some(v) = self.c_iters {
            config.training.schedule.regular = v;
        }
        if let Some(v) = self.cl_iters {
            config.training.schedule.large = v;
        }
        if let Some(v) = self.loss {
            config.training.loss = v;
        }
        if let Some(v) = self.cl_freq {
            config.training.schedule.boost_every = v;
        }
        if let Some(v) = self.warmup {
            config.training.schedule.warmup = v;
        }
        if let Some(v) = self.decay {
            config.training.decay = v;
        }
        if let Some(v) = self.save_every {
            config.training.save_every = v;
        }
        if let Some(v) = self.lambda {
            config.training.lambda = v;
        }
        if let Some(v) = self.seed {
            config.training.seed = v;
        }
        if let Some(v) = &self.device {
            config.training.device = v.clone();
        }
        if let Some(v) = &self.data {
            config.data.path = v.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = match cli.verbosity.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Train(args) => {
            train_model(cli.config.as_deref(), args).await?;
        }
        Commands::Sample {
            trial,
            epoch,
            grid,
            seed,
            output,
        } => {
            sample_grid(&trial, epoch, grid, seed, output)?;
        }
        Commands::Init { output } => {
            init_config(&output)?;
        }
    }

    Ok(())
}

/// Train a generator / critic pair
async fn train_model(config_path: Option<&Path>, args: TrainArgs) -> Result<()> {
    // A resumed trial starts from its own resolved configuration
    let mut config = match (&args.resume, config_path) {
        (Some(trial), _) => {
            let layout = TrialLayout::open(trial)?;
            Config::from_json(layout.config_path())
                .with_context(|| format!("reading config of trial {}", trial.display()))?
        }
        (None, Some(path)) => Config::from_file(path)?,
        (None, None) => {
            info!("No config file given, using defaults");
            Config::default()
        }
    };
    args.apply(&mut config);
    config.validate()?;

    let device = config.get_device();
    info!("Using device: {:?}", device);
    tch::manual_seed(config.training.seed as i64);

    info!("Loading {} data from {}", config.data.datatype, config.data.path.display());
    let dataset = config.data.load_dataset()?;
    let stream = MinibatchStream::new(
        dataset,
        config.data.stream_options(config.training.seed),
        device,
    )?;
    info!(
        "Sample shape {:?}, {} classes, {} batches per pass",
        stream.sample_shape(),
        stream.num_classes(),
        stream.batches_per_pass()
    );

    let gan = config
        .model
        .build(stream.sample_shape(), stream.num_classes(), device)?;

    let layout = match &args.resume {
        Some(trial) => TrialLayout::open(trial)?,
        None => {
            let layout = TrialLayout::create(&args.output, config.data.datatype, config.training.loss)?;
            layout.write_args(std::env::args())?;
            layout
        }
    };
    config.save_json(layout.config_path())?;

    let mut trainer = Trainer::new(config.training.clone(), Some(layout));
    if args.resume.is_some() {
        trainer.resume(&gan)?;
    }

    let token = trainer.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current iteration");
            token.cancel();
        }
    });

    info!(
        "Starting {} training for {} epochs",
        config.training.loss, config.training.num_epochs
    );
    let history = tokio::task::spawn_blocking(move || -> Result<ScoreHistory> {
        let mut stream = stream;
        let history = trainer.train(&gan, &mut stream)?;
        Ok(history.clone())
    })
    .await??;

    match history.latest() {
        Some((critic, generator)) => info!(
            "Training complete after {} epochs. Critic: {:.4}, Generator: {:.4}",
            history.num_epochs(),
            critic.score,
            generator.score
        ),
        None => info!("Training stopped before the first epoch completed"),
    }

    Ok(())
}

/// Render a sample grid from a saved generator
fn sample_grid(
    trial: &Path,
    epoch: Option<usize>,
    grid: i64,
    seed: i64,
    output: Option<PathBuf>,
) -> Result<()> {
    if grid <= 0 {
        bail!("grid must be > 0");
    }

    let layout = TrialLayout::open(trial)?;
    let config = Config::from_json(layout.config_path())?;
    let device = config.get_device();

    let epoch = match epoch {
        Some(epoch) => epoch,
        None => find_latest_snapshot(layout.models_dir())
            .with_context(|| format!("no snapshot in {}", layout.models_dir().display()))?,
    };
    let meta = SnapshotMeta::load(layout.meta_path(epoch))?;

    let gan = config.model.build(meta.sample_shape, meta.num_classes, device)?;
    gan.load_network(Network::Generator, layout.generator_path(epoch))?;
    info!("Loaded generator of epoch {} from {}", epoch, trial.display());

    tch::manual_seed(seed);
    let n = grid * grid;
    let noise = gan.sample_noise(n);
    let condition = gan.fixed_condition(n);
    let samples = tch::no_grad(|| gan.generate(&noise, condition.as_ref(), false));

    let output = output.unwrap_or_else(|| {
        layout
            .root()
            .join("images")
            .join(format!("sampled_{}.png", epoch))
    });
    save_sample_grid(&samples, grid, &output)?;
    info!("Saved {}x{} sample grid to {}", grid, grid, output.display());

    Ok(())
}

/// Initialize default configuration file
fn init_config(output_path: &Path) -> Result<()> {
    if output_path.exists() {
        bail!("{} already exists", output_path.display());
    }
    Config::default().save_file(output_path)?;

    info!("Created default configuration at {}", output_path.display());
    Ok(())
}
