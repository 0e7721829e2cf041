//! Integration tests for [`motion_forecast_train::model`] and
//! [`motion_forecast_train::trainer`].
//!
//! Gated behind `tch-backend`. Networks are kept tiny (hidden size 8, one
//! layer) and the synthetic corpus short so the whole file runs in seconds
//! on a CPU.

#[cfg(feature = "tch-backend")]
mod tch_tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use motion_forecast_train::config::{ModelKind, Representation, TrainingConfig};
    use motion_forecast_train::dataset::{
        MotionCorpus, MotionSource, SyntheticMotionConfig, SyntheticMotionSource,
    };
    use motion_forecast_train::error::{ConfigError, DatasetError, TrainError};
    use motion_forecast_train::model::{build_model, ExecutionMode};
    use motion_forecast_train::skeleton::Skeleton;
    use motion_forecast_train::trainer::Trainer;
    use tch::{Device, Kind, Tensor};

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn tiny_config(model: &str, dir: &Path) -> TrainingConfig {
        TrainingConfig {
            model: model.to_string(),
            input_window_size: 8,
            output_window_size: 4,
            window_stride: 16,
            hidden_size: 8,
            num_layers: 1,
            batch_size: 8,
            max_epoch: 1,
            eval_checkpoints: vec![1, 3],
            prediction_samples_per_action: 2,
            checkpoint_dir: dir.join("ckpt"),
            output_dir: dir.join("out"),
            ..TrainingConfig::default()
        }
    }

    fn synthetic(representation: Representation) -> SyntheticMotionSource {
        let cfg = SyntheticMotionConfig { frames_per_sequence: 48, ..SyntheticMotionConfig::default() };
        SyntheticMotionSource::new(cfg, representation)
    }

    /// Counts every corpus request made against the wrapped source.
    struct CountingSource {
        inner: SyntheticMotionSource,
        corpus_requests: AtomicUsize,
    }

    impl CountingSource {
        fn new() -> Self {
            CountingSource { inner: synthetic(Representation::Lie), corpus_requests: AtomicUsize::new(0) }
        }
    }

    impl MotionSource for CountingSource {
        fn train_corpus(&self) -> Result<MotionCorpus, DatasetError> {
            self.corpus_requests.fetch_add(1, Ordering::SeqCst);
            self.inner.train_corpus()
        }

        fn test_corpus(&self) -> Result<MotionCorpus, DatasetError> {
            self.corpus_requests.fetch_add(1, Ordering::SeqCst);
            self.inner.test_corpus()
        }

        fn skeleton(&self) -> Result<Skeleton, DatasetError> {
            self.inner.skeleton()
        }

        fn representation(&self) -> Representation {
            self.inner.representation()
        }

        fn name(&self) -> &str {
            "CountingSource"
        }
    }

    // -----------------------------------------------------------------------
    // Model adapter
    // -----------------------------------------------------------------------

    /// Every architecture maps `[B, h, F]` + `[B, H, F]` to `[B, H, F]` in
    /// both execution modes.
    #[test]
    fn forward_shape_for_every_model() {
        tch::manual_seed(0);
        let tmp = tempfile::tempdir().unwrap();
        for kind in ModelKind::ALL {
            for f in [39_i64, 36] {
                let cfg = tiny_config(kind.as_str(), tmp.path());
                let model = build_model(&cfg, f as usize, Device::Cpu).unwrap();
                assert_eq!(model.kind(), kind);

                let enc = Tensor::randn([3, 8, f], (Kind::Float, Device::Cpu));
                let dec = Tensor::randn([3, 4, f], (Kind::Float, Device::Cpu));
                for mode in [ExecutionMode::Train, ExecutionMode::Eval] {
                    let out = model.forward(&enc, &dec, mode);
                    assert_eq!(out.size(), vec![3, 4, f], "{kind} {mode:?} F={f}");
                }
            }
        }
    }

    /// Eval mode produces as many frames as the decoder input has, so the
    /// prediction horizon may exceed the training horizon.
    #[test]
    fn eval_horizon_follows_decoder_inputs() {
        let tmp = tempfile::tempdir().unwrap();
        let model = build_model(&tiny_config("HMR", tmp.path()), 39, Device::Cpu).unwrap();
        let enc = Tensor::zeros([2, 8, 39], (Kind::Float, Device::Cpu));
        let dec = Tensor::zeros([2, 20, 39], (Kind::Float, Device::Cpu));
        let out = model.forward(&enc, &dec, ExecutionMode::Eval);
        assert_eq!(out.size(), vec![2, 20, 39]);
        assert!(!out.requires_grad());
    }

    /// Encoder, decoder and shared parameters partition the full parameter
    /// set.
    #[test]
    fn parameter_counts_partition() {
        let tmp = tempfile::tempdir().unwrap();
        for kind in ModelKind::ALL {
            let model = build_model(&tiny_config(kind.as_str(), tmp.path()), 39, Device::Cpu).unwrap();
            assert!(model.encoder_parameter_count() + model.shared_parameter_count() > 0, "{kind}");
            assert!(model.decoder_parameter_count() > 0, "{kind}");
            assert_eq!(
                model.parameter_count(),
                model.encoder_parameter_count()
                    + model.decoder_parameter_count()
                    + model.shared_parameter_count(),
                "{kind}"
            );
        }
    }

    /// Layers that run on both sides are reported as shared, not as encoder.
    #[test]
    fn shared_layers_are_reported_separately() {
        let tmp = tempfile::tempdir().unwrap();
        let erd = build_model(&tiny_config("ERD", tmp.path()), 39, Device::Cpu).unwrap();
        assert_eq!(erd.encoder_parameter_count(), 0);
        assert!(erd.shared_parameter_count() > erd.decoder_parameter_count());

        let st_hmr = build_model(&tiny_config("ST_HMR", tmp.path()), 39, Device::Cpu).unwrap();
        assert!(st_hmr.shared_parameter_count() > 0);
        assert!(st_hmr.encoder_parameter_count() > 0);

        for kind in ["LSTM3lr", "GRU", "HMR"] {
            let model = build_model(&tiny_config(kind, tmp.path()), 39, Device::Cpu).unwrap();
            assert_eq!(model.shared_parameter_count(), 0, "{kind}");
        }
    }

    // -----------------------------------------------------------------------
    // Trainer
    // -----------------------------------------------------------------------

    /// An unsupported model fails before any batch (or corpus) is requested.
    #[test]
    fn unknown_model_rejected_before_any_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let source = CountingSource::new();
        let result = Trainer::new(tiny_config("Unknown", tmp.path()), &source);

        assert!(matches!(result, Err(TrainError::Config(ConfigError::UnsupportedModel { .. }))));
        assert_eq!(source.corpus_requests.load(Ordering::SeqCst), 0);
        assert!(!tmp.path().join("ckpt").exists());
    }

    /// One epoch in coordinate space writes one checkpoint and reports a
    /// finite joint-position error.
    #[test]
    fn one_epoch_in_coordinate_space() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = TrainingConfig { datatype: Representation::Xyz, ..tiny_config("ERD", tmp.path()) };
        let mut trainer = Trainer::new(cfg, &synthetic(Representation::Xyz)).unwrap();
        let outcome = trainer.run().unwrap();

        assert_eq!(outcome.epochs.len(), 1);
        assert!(outcome.epochs[0].train_loss.is_finite());
        assert!(outcome.epochs[0].validation_loss.is_some());
        assert_eq!(outcome.checkpoints.len(), 1);
        let name = outcome.checkpoints[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("ERD_epoch_1_error_"), "{name}");
        assert!(outcome.best.error.is_finite() && outcome.best.error >= 0.0);
    }

    /// The best error over several epochs never increases and one file is
    /// written per improvement.
    #[test]
    fn best_error_is_monotone_over_epochs() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = TrainingConfig { max_epoch: 3, ..tiny_config("LSTM3lr", tmp.path()) };
        let mut trainer = Trainer::new(cfg, &synthetic(Representation::Lie)).unwrap();
        let outcome = trainer.run().unwrap();

        let improvements = outcome.epochs.iter().filter(|e| e.improved).count();
        assert_eq!(improvements, outcome.checkpoints.len());
        let mut best = f32::INFINITY;
        for e in &outcome.epochs {
            let err = e.aggregate_error.unwrap();
            assert_eq!(e.improved, err < best);
            best = best.min(err);
        }
        assert!((outcome.best.error - best).abs() < 1e-9);
    }

    /// A checkpoint saved by one trainer reproduces its errors when loaded
    /// into a fresh one.
    #[test]
    fn checkpoint_round_trip_reproduces_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = tiny_config("ST_HMR", tmp.path());
        let mut trainer = Trainer::new(cfg.clone(), &synthetic(Representation::Lie)).unwrap();
        let outcome = trainer.run().unwrap();
        let expected = trainer.evaluate().unwrap();

        let mut fresh = Trainer::new(cfg, &synthetic(Representation::Lie)).unwrap();
        let loaded = fresh.predict_from_checkpoint(&outcome.checkpoints[0]).unwrap();
        for (action, m) in &expected {
            let diff = (&m.values - &loaded[action].values).mapv(f32::abs).fold(0.0_f32, |a, &v| a.max(v));
            assert!(diff < 1e-4, "{action}: max diff {diff}");
        }
    }
}
