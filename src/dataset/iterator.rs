//! Endless batch iteration for the adversarial stage.
//!
//! Source and target loaders run at different lengths, so the training loop
//! pulls a fixed number of batches per epoch from iterators that reshuffle
//! and restart whenever they run out.

use std::sync::Arc;

use burn::data::dataset::Dataset;
use burn::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::burn_dataset::{DomainBatch, DomainBatcher, DomainItem};
use burn::data::dataloader::batcher::Batcher;

/// An iterator that yields full batches forever, reshuffling each pass.
///
/// Trailing items that do not fill a batch are dropped, matching the
/// drop-last convention of the adversarial loop.
pub struct ForeverBatchIter<B: Backend> {
    dataset: Arc<dyn Dataset<DomainItem>>,
    batcher: DomainBatcher<B>,
    batch_size: usize,
    order: Vec<usize>,
    cursor: usize,
    rng: ChaCha8Rng,
}

impl<B: Backend> ForeverBatchIter<B> {
    pub fn new(
        dataset: Arc<dyn Dataset<DomainItem>>,
        batcher: DomainBatcher<B>,
        batch_size: usize,
        seed: u64,
    ) -> Self {
        assert!(batch_size > 0, "batch size must be positive");
        let mut iter = Self {
            order: (0..dataset.len()).collect(),
            dataset,
            batcher,
            batch_size,
            cursor: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        };
        iter.reshuffle();
        iter
    }

    fn reshuffle(&mut self) {
        self.order.shuffle(&mut self.rng);
        self.cursor = 0;
    }

    /// Produce the next full batch.
    ///
    /// Panics if the dataset holds fewer items than one batch.
    pub fn next_batch(&mut self) -> DomainBatch<B> {
        assert!(
            self.dataset.len() >= self.batch_size,
            "dataset smaller than one batch ({} < {})",
            self.dataset.len(),
            self.batch_size
        );
        if self.cursor + self.batch_size > self.order.len() {
            self.reshuffle();
        }
        let items: Vec<DomainItem> = self.order[self.cursor..self.cursor + self.batch_size]
            .iter()
            .filter_map(|&i| self.dataset.get(i))
            .collect();
        self.cursor += self.batch_size;
        self.batcher.batch(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::data::dataset::InMemDataset;

    type TestBackend = NdArray<f32>;

    fn items(n: usize) -> Vec<DomainItem> {
        (0..n)
            .map(|i| DomainItem::new(vec![0.5; 3 * 4 * 4], i, format!("{i}")))
            .collect()
    }

    #[test]
    fn test_batches_are_full_and_endless() {
        let dataset: Arc<dyn Dataset<DomainItem>> = Arc::new(InMemDataset::new(items(10)));
        let batcher = DomainBatcher::<TestBackend>::new(Default::default(), 4);
        let mut iter = ForeverBatchIter::new(dataset, batcher, 4, 0);

        // 10 items at batch 4: two full batches per pass, then restart
        for _ in 0..7 {
            let batch = iter.next_batch();
            assert_eq!(batch.labels.len(), 4);
        }
    }

    #[test]
    fn test_pass_covers_distinct_items() {
        let dataset: Arc<dyn Dataset<DomainItem>> = Arc::new(InMemDataset::new(items(8)));
        let batcher = DomainBatcher::<TestBackend>::new(Default::default(), 4);
        let mut iter = ForeverBatchIter::new(dataset, batcher, 4, 0);

        let mut seen: Vec<usize> = Vec::new();
        seen.extend(iter.next_batch().labels);
        seen.extend(iter.next_batch().labels);
        seen.sort();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_same_seed_same_order() {
        let dataset: Arc<dyn Dataset<DomainItem>> = Arc::new(InMemDataset::new(items(8)));
        let batcher = DomainBatcher::<TestBackend>::new(Default::default(), 4);
        let mut a = ForeverBatchIter::new(dataset.clone(), batcher.clone(), 4, 42);
        let mut b = ForeverBatchIter::new(dataset, batcher, 4, 42);
        assert_eq!(a.next_batch().labels, b.next_batch().labels);
    }
}
