//! The three-stage training protocol and its drivers.

pub mod adversarial;
pub mod class_weight;
pub mod evaluate;
pub mod pretrain;
pub mod refresh;
pub mod run;
pub mod scheduler;

pub use adversarial::{train_adversarial_epoch, EpochStats};
pub use class_weight::compute_source_class_weight;
pub use evaluate::{score_pass, validate, ScoredPass};
pub use pretrain::pretrain;
pub use refresh::refresh_ensemble;
pub use run::{run_analysis, run_test, run_training, RunConfig};
pub use scheduler::InverseDecaySchedule;
