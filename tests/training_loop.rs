//! End-to-end runs of the adversarial training loop on small synthetic data

use approx::assert_relative_eq;
use ndarray::Array2;
use tch::Device;
use tempfile::tempdir;

use rust_wgan_sequences::{
    data::{BatchSource, DataType, Item, MinibatchStream, SequenceDataset, StreamOptions},
    model::{CriticArch, GanPair, GeneratorArch, Network},
    training::{CriticSchedule, LossType, Phase, ScoreHistory, Trainer, TrainingConfig},
    utils::{find_latest_snapshot, ModelConfig, SnapshotMeta, TrialLayout},
    GanError,
};

fn digits_dataset(n: usize) -> SequenceDataset {
    let items = (0..n)
        .map(|i| {
            let phase = i as f32 * 0.1;
            Item::Dense(Array2::from_shape_fn((28, 28), |(r, c)| {
                ((r + c) as f32 * 0.2 + phase).sin()
            }))
        })
        .collect();
    let names = (0..n)
        .map(|i| if i % 2 == 0 { "even" } else { "odd" }.to_string())
        .collect();
    SequenceDataset::from_named_labels(items, names).unwrap()
}

fn text_dataset(n: usize, len: usize) -> SequenceDataset {
    let items = (0..n)
        .map(|i| Item::Encoded {
            codes: (0..len).map(|j| (32 + (i + j) % 90) as u8).collect(),
            alphabet_size: 128,
        })
        .collect();
    let names = (0..n).map(|i| format!("author{}", i % 3)).collect();
    SequenceDataset::from_named_labels(items, names).unwrap()
}

fn stream(dataset: SequenceDataset, length: usize) -> MinibatchStream {
    let options = StreamOptions {
        batch_size: 8,
        length,
        seed: 7,
        ..Default::default()
    };
    MinibatchStream::new(dataset, options, Device::Cpu).unwrap()
}

fn small_model(critic: CriticArch, generator: GeneratorArch, conditional: bool) -> ModelConfig {
    ModelConfig {
        critic,
        generator,
        noise_size: 4,
        hidden: 8,
        filters: 2,
        conditional,
        ..Default::default()
    }
}

fn quick_config(num_epochs: usize) -> TrainingConfig {
    TrainingConfig {
        num_epochs,
        epoch_size: 2,
        loss: LossType::Wgan,
        clip: 0.1,
        schedule: CriticSchedule {
            regular: 1,
            large: 2,
            warmup: 0,
            boost_every: 0,
        },
        save_every: 1,
        grid: 2,
        seed: 1234,
        ..Default::default()
    }
}

fn digits_gan(source: &MinibatchStream, conditional: bool) -> GanPair {
    small_model(CriticArch::Dcgan, GeneratorArch::Dcgan, conditional)
        .build(source.sample_shape(), source.num_classes(), Device::Cpu)
        .unwrap()
}

#[test]
fn test_wgan_two_epochs_writes_artifacts() {
    let dir = tempdir().unwrap();
    let layout = TrialLayout::create(dir.path(), DataType::Mnist, LossType::Wgan).unwrap();

    let mut source = stream(digits_dataset(256), 0);
    let gan = digits_gan(&source, false);

    let mut trainer = Trainer::new(quick_config(2), Some(layout.clone()));
    let history = trainer.train(&gan, &mut source).unwrap();
    assert_eq!(history.num_epochs(), 2);
    assert!(history.critic.iter().all(|s| s.score.is_finite()));
    assert!(history.critic.iter().all(|s| s.penalty == 0.0));

    for epoch in [1, 2] {
        assert!(layout.generator_path(epoch).exists());
        assert!(layout.critic_path(epoch).exists());
        assert!(layout.meta_path(epoch).exists());
        assert!(layout.image_path(epoch).exists());
    }
    assert!(layout.root().join("critic_scores.npy").exists());
    assert!(layout.scores_csv_path().exists());
    assert_eq!(find_latest_snapshot(layout.models_dir()), Some(2));

    let meta = SnapshotMeta::load(layout.meta_path(2)).unwrap();
    assert_eq!(meta.epoch, 2);
    assert_eq!(meta.generator_iterations, 4);
    assert_eq!(meta.sample_shape, [1, 28, 28]);

    let saved = ScoreHistory::load_npy(layout.root()).unwrap();
    assert_eq!(saved.num_epochs(), 2);
    assert_eq!(trainer.state().phase, Phase::Terminal);
}

#[test]
fn test_clipping_bounds_critic_weights() {
    let mut source = stream(digits_dataset(64), 0);
    let gan = digits_gan(&source, false);

    let mut trainer = Trainer::new(quick_config(1), None);
    trainer.train(&gan, &mut source).unwrap();

    for weight in gan.critic.regularizable() {
        let max = weight.abs().max().double_value(&[]);
        assert!(max <= 0.1 + 1e-6, "weight exceeds clip bound: {}", max);
    }
}

#[test]
fn test_resume_continues_from_latest_snapshot() {
    let dir = tempdir().unwrap();
    let layout = TrialLayout::create(dir.path(), DataType::Mnist, LossType::Wgan).unwrap();

    let mut source = stream(digits_dataset(64), 0);
    let gan = digits_gan(&source, false);
    let mut trainer = Trainer::new(quick_config(2), Some(layout.clone()));
    trainer.train(&gan, &mut source).unwrap();

    let mut source = stream(digits_dataset(64), 0);
    let resumed_gan = digits_gan(&source, false);
    let mut resumed = Trainer::new(quick_config(3), Some(TrialLayout::open(layout.root()).unwrap()));
    assert_eq!(resumed.resume(&resumed_gan).unwrap(), 2);
    assert_eq!(resumed.state().generator_iterations, 4);
    assert_eq!(resumed.history().num_epochs(), 2);

    let history = resumed.train(&resumed_gan, &mut source).unwrap();
    assert_eq!(history.num_epochs(), 3);
    assert_eq!(find_latest_snapshot(layout.models_dir()), Some(3));
    assert_eq!(resumed.state().generator_iterations, 6);
}

#[test]
fn test_resume_without_snapshot_fails() {
    let dir = tempdir().unwrap();
    let layout = TrialLayout::create(dir.path(), DataType::Mnist, LossType::Wgan).unwrap();
    let source = stream(digits_dataset(16), 0);
    let gan = digits_gan(&source, false);

    let mut trainer = Trainer::new(quick_config(1), Some(layout));
    assert!(trainer.resume(&gan).is_err());
}

#[test]
fn test_cancelled_run_records_nothing() {
    let mut source = stream(digits_dataset(32), 0);
    let gan = digits_gan(&source, false);
    let before = gan.parameter_values(Network::Generator);

    let mut trainer = Trainer::new(quick_config(2), None);
    trainer.cancel_token().cancel();
    let history = trainer.train(&gan, &mut source).unwrap();
    assert!(history.is_empty());
    assert_eq!(trainer.state().generator_iterations, 0);

    let after = gan.parameter_values(Network::Generator);
    for (name, value) in &before {
        assert!(value.equal(&after[name]), "{} changed", name);
    }
}

#[test]
fn test_conditional_lsgan_run() {
    let mut source = stream(digits_dataset(32), 0);
    let gan = digits_gan(&source, true);
    assert_eq!(gan.generator.config().num_classes, 2);

    let config = TrainingConfig {
        loss: LossType::Lsgan,
        save_every: 0,
        ..quick_config(1)
    };
    let mut trainer = Trainer::new(config, None);
    let history = trainer.train(&gan, &mut source).unwrap();
    assert_eq!(history.num_epochs(), 1);
}

#[test]
fn test_iwgan_lstm_crepe_on_text() {
    let mut source = stream(text_dataset(16, 160), 128);
    assert_eq!(source.sample_shape(), [1, 128, 128]);

    let gan = small_model(CriticArch::Crepe, GeneratorArch::Lstm, false)
        .build(source.sample_shape(), source.num_classes(), Device::Cpu)
        .unwrap();

    let config = TrainingConfig {
        loss: LossType::Iwgan,
        epoch_size: 1,
        save_every: 0,
        ..quick_config(1)
    };
    let mut trainer = Trainer::new(config, None);
    let history = trainer.train(&gan, &mut source).unwrap();

    let (critic, _) = history.latest().unwrap();
    assert!(critic.score.is_finite());
    assert!(critic.penalty >= 0.0);
}

#[test]
fn test_nan_batch_stops_training() {
    let items = (0..16)
        .map(|_| Item::Dense(Array2::from_elem((28, 28), f32::NAN)))
        .collect();
    let names = vec!["nan".to_string(); 16];
    let dataset = SequenceDataset::from_named_labels(items, names).unwrap();
    let mut source = stream(dataset, 0);
    let gan = digits_gan(&source, false);
    let before = gan.parameter_values(Network::Critic);

    let mut trainer = Trainer::new(quick_config(1), None);
    let err = trainer.train(&gan, &mut source).unwrap_err();
    assert!(matches!(err, GanError::NumericalInstability { epoch: 1, iteration: 0, .. }));
    assert!(trainer.history().is_empty());

    // the failing step never reached the optimizer
    let after = gan.parameter_values(Network::Critic);
    for (name, value) in &before {
        assert!(value.equal(&after[name]), "{} changed", name);
    }
}

#[test]
fn test_learning_rates_decay_between_epochs() {
    let dir = tempdir().unwrap();
    let layout = TrialLayout::create(dir.path(), DataType::Mnist, LossType::Wgan).unwrap();

    let mut source = stream(digits_dataset(32), 0);
    let gan = digits_gan(&source, false);

    let config = TrainingConfig {
        epoch_size: 1,
        critic_lr: 2e-4,
        generator_lr: 1e-4,
        decay: true,
        ..quick_config(4)
    };
    let mut trainer = Trainer::new(config, Some(layout.clone()));
    trainer.train(&gan, &mut source).unwrap();

    // rate after epoch e: initial * 2 * (1 - e / 4) once e >= 2
    let expected = [(1, 2e-4, 1e-4), (2, 2e-4, 1e-4), (3, 1e-4, 5e-5), (4, 0.0, 0.0)];
    for (epoch, critic_rate, generator_rate) in expected {
        let meta = SnapshotMeta::load(layout.meta_path(epoch)).unwrap();
        assert_relative_eq!(meta.critic_rate, critic_rate, epsilon = 1e-12);
        assert_relative_eq!(meta.generator_rate, generator_rate, epsilon = 1e-12);
    }
    assert_eq!(trainer.state().critic_rate.current(), 0.0);
}
