//! Domain datasets, batching, augmentation, and iteration.

pub mod augmentation;
pub mod burn_dataset;
pub mod iterator;
pub mod loader;
pub mod registry;
pub mod synthetic;

pub use augmentation::{PerturbView, PerturbedDataset};
pub use burn_dataset::{DomainBatch, DomainBatcher, DomainItem};
pub use iterator::ForeverBatchIter;
pub use loader::ImageFolderDataset;
pub use registry::{dataset_names, lookup_dataset, DatasetSpec};
pub use synthetic::SyntheticDomainDataset;
