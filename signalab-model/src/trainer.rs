//! Training loop.
//!
//! The whole network (encoder and head) trains end-to-end with Adam on
//! sparse categorical cross-entropy through burn's autodiff backend.
//!
//! Policy per epoch:
//! - mini-batches in chronological order (no shuffling)
//! - validation on the held-out split
//! - learning rate × `lr_factor` after `lr_patience` epochs without improvement
//! - stop after `early_stopping_patience` epochs without improvement and
//!   restore the best weights

use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::activation::softmax;
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Int, Tensor, TensorData};
use ndarray::s;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::{self, InferenceBackend, TrainBackend};
use crate::classifier::{argmax, probability_rows, ModelSpec, SequenceClassifier};
use crate::config::{ModelKind, TrainConfig};
use crate::network::SequenceNet;
use crate::tensor;
use crate::TrainError;
use signalab_core::{Label, SequenceDataset};

/// Counts indexed `[actual][predicted]` by class index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub counts: [[usize; Label::COUNT]; Label::COUNT],
}

impl ConfusionMatrix {
    pub fn record(&mut self, actual: Label, predicted: Label) {
        self.counts[actual.class_index()][predicted.class_index()] += 1;
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn correct(&self) -> usize {
        (0..Label::COUNT).map(|i| self.counts[i][i]).sum()
    }

    pub fn accuracy(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            n => self.correct() as f64 / n as f64,
        }
    }

    /// Recall of one class; `None` if the class never occurs.
    pub fn recall(&self, label: Label) -> Option<f64> {
        let row = &self.counts[label.class_index()];
        let total: usize = row.iter().sum();
        (total > 0).then(|| row[label.class_index()] as f64 / total as f64)
    }
}

/// Loss, accuracy and confusion over one split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub samples: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub confusion: ConfusionMatrix,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based.
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
    pub learning_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainReport {
    pub model: ModelKind,
    pub parameters: usize,
    pub train_samples: usize,
    pub test_samples: usize,
    pub history: Vec<EpochMetrics>,
    /// 1-based epoch whose head was kept.
    pub best_epoch: usize,
    pub stopped_early: bool,
    pub final_learning_rate: f64,
    /// `None` when the test split is empty.
    pub test: Option<Evaluation>,
}

pub struct Trainer {
    config: TrainConfig,
}

impl Trainer {
    pub fn new(config: TrainConfig) -> Result<Self, TrainError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Train on `train`, validate and evaluate on `test`.
    pub fn fit(
        &self,
        train: &SequenceDataset,
        test: &SequenceDataset,
    ) -> Result<(SequenceClassifier, TrainReport), TrainError> {
        if train.is_empty() {
            return Err(TrainError::EmptyDataset);
        }
        let (length, features) = (train.sequence_length(), train.feature_count());
        if !test.is_empty()
            && (test.sequence_length(), test.feature_count()) != (length, features)
        {
            return Err(TrainError::ShapeMismatch {
                expected: (length, features),
                actual: (test.sequence_length(), test.feature_count()),
            });
        }

        let device = backend::device();
        // Dropout masks come from the backend generator.
        TrainBackend::seed(self.config.seed);
        let spec = ModelSpec::from_config(&self.config, length, features);
        let mut model = SequenceNet::<TrainBackend>::seeded(&spec, &device)?;
        let parameters = model.tensors().iter().map(|t| t.len()).sum();
        info!(
            model = %self.config.model,
            parameters,
            train = train.len(),
            test = test.len(),
            "training sequence classifier"
        );

        let mut optimizer = AdamConfig::new().with_epsilon(1e-7).init();
        let mut learning_rate = self.config.learning_rate;
        let mut history = Vec::with_capacity(self.config.epochs);
        let mut best = (f64::INFINITY, model.valid(), 0usize);
        let mut since_best = 0usize;
        let mut since_lr_drop = 0usize;
        let mut stopped_early = false;

        for epoch in 1..=self.config.epochs {
            let (trained, train_loss, train_accuracy) =
                self.run_epoch(model, &mut optimizer, learning_rate, train);
            model = trained;
            let current = model.valid();
            let val = (!test.is_empty()).then(|| evaluate(&current, test, self.config.batch_size));

            let metrics = EpochMetrics {
                epoch,
                train_loss,
                train_accuracy,
                val_loss: val.as_ref().map(|v| v.loss),
                val_accuracy: val.as_ref().map(|v| v.accuracy),
                learning_rate,
            };
            info!(
                epoch,
                train_loss = %format!("{train_loss:.4}"),
                train_accuracy = %format!("{train_accuracy:.4}"),
                val_loss = ?metrics.val_loss,
                val_accuracy = ?metrics.val_accuracy,
                "epoch complete"
            );
            history.push(metrics);

            let monitored = val.as_ref().map_or(train_loss, |v| v.loss);
            if monitored < best.0 {
                best = (monitored, current, epoch);
                since_best = 0;
                since_lr_drop = 0;
                continue;
            }

            since_best += 1;
            since_lr_drop += 1;
            if since_lr_drop >= self.config.lr_patience {
                learning_rate =
                    (learning_rate * self.config.lr_factor).max(self.config.min_learning_rate);
                debug!(epoch, learning_rate, "reducing learning rate on plateau");
                since_lr_drop = 0;
            }
            if since_best >= self.config.early_stopping_patience {
                info!(epoch, best_epoch = best.2, "early stopping");
                stopped_early = true;
                break;
            }
        }

        let (_, best_net, best_epoch) = best;
        let classifier = SequenceClassifier::from_net(spec, best_net);
        let test_eval =
            (!test.is_empty()).then(|| evaluate(classifier.net(), test, self.config.batch_size));
        if let Some(eval) = &test_eval {
            info!(
                test_loss = %format!("{:.4}", eval.loss),
                test_accuracy = %format!("{:.4}", eval.accuracy),
                "evaluation"
            );
        }

        let report = TrainReport {
            model: self.config.model,
            parameters,
            train_samples: train.len(),
            test_samples: test.len(),
            history,
            best_epoch,
            stopped_early,
            final_learning_rate: learning_rate,
            test: test_eval,
        };
        Ok((classifier, report))
    }

    /// One pass over the training split. Returns the updated network with the
    /// epoch's mean loss and accuracy.
    fn run_epoch<O>(
        &self,
        mut model: SequenceNet<TrainBackend>,
        optimizer: &mut O,
        learning_rate: f64,
        train: &SequenceDataset,
    ) -> (SequenceNet<TrainBackend>, f64, f64)
    where
        O: Optimizer<SequenceNet<TrainBackend>, TrainBackend>,
    {
        let device = backend::device();
        let loss_fn = CrossEntropyLossConfig::new().init(&device);
        let n = train.len();
        let mut loss_sum = 0.0;
        let mut correct = 0usize;

        for start in (0..n).step_by(self.config.batch_size) {
            let end = (start + self.config.batch_size).min(n);
            let inputs = tensor::sequences_tensor::<TrainBackend>(
                train.sequences.slice(s![start..end, .., ..]),
                &device,
            );
            let targets = label_tensor::<TrainBackend>(&train.labels[start..end], &device);

            let logits = model.forward(inputs);
            let loss = loss_fn.forward(logits.clone(), targets);
            let batch_loss: f64 = loss.clone().into_scalar().elem();
            loss_sum += batch_loss * (end - start) as f64;
            correct += count_correct(
                &probability_rows(softmax(logits.inner(), 1)),
                &train.labels[start..end],
            );

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(learning_rate, model, grads);
        }

        (model, loss_sum / n as f64, correct as f64 / n as f64)
    }
}

fn label_tensor<B: Backend>(labels: &[Label], device: &B::Device) -> Tensor<B, 1, Int> {
    let ids: Vec<i64> = labels.iter().map(|l| l.class_index() as i64).collect();
    Tensor::from_data(TensorData::new(ids, [labels.len()]), device)
}

fn count_correct(probs: &[[f64; Label::COUNT]], labels: &[Label]) -> usize {
    probs
        .iter()
        .zip(labels)
        .filter(|(p, label)| argmax(&p[..]) == label.class_index())
        .count()
}

/// Mean cross-entropy, accuracy and confusion matrix of `net` on `data`.
pub fn evaluate(
    net: &SequenceNet<InferenceBackend>,
    data: &SequenceDataset,
    batch_size: usize,
) -> Evaluation {
    let device = backend::device();
    let mut confusion = ConfusionMatrix::default();
    let mut loss = 0.0;

    for start in (0..data.len()).step_by(batch_size.max(1)) {
        let end = (start + batch_size.max(1)).min(data.len());
        let inputs = tensor::sequences_tensor::<InferenceBackend>(
            data.sequences.slice(s![start..end, .., ..]),
            &device,
        );
        let probs = probability_rows(softmax(net.forward(inputs), 1));
        for (p, &actual) in probs.iter().zip(&data.labels[start..end]) {
            loss -= p[actual.class_index()].max(1e-7).ln();
            let predicted = Label::from_class_index(argmax(&p[..])).unwrap_or(Label::Hold);
            confusion.record(actual, predicted);
        }
    }

    let samples = data.len();
    Evaluation {
        samples,
        loss: if samples == 0 { 0.0 } else { loss / samples as f64 },
        accuracy: confusion.accuracy(),
        confusion,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confusion_matrix_accuracy_and_recall() {
        let mut cm = ConfusionMatrix::default();
        cm.record(Label::Buy, Label::Buy);
        cm.record(Label::Buy, Label::Hold);
        cm.record(Label::Sell, Label::Sell);
        assert_eq!(cm.total(), 3);
        assert!((cm.accuracy() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(cm.recall(Label::Buy), Some(0.5));
        assert_eq!(cm.recall(Label::Hold), None);
    }

    #[test]
    fn empty_confusion_has_zero_accuracy() {
        assert_eq!(ConfusionMatrix::default().accuracy(), 0.0);
    }
}
