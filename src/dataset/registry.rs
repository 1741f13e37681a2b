//! Dataset registry.
//!
//! Datasets are dispatched by name through a lookup table. Each entry
//! carries the universal-DA class split: the first `num_common` class
//! indices are shared between domains, the next `num_source_private` exist
//! only in the source, and the rest are target-private (unseen in the
//! source, folded into the unknown bucket at evaluation). Dataset quirks,
//! like DomainNet's dedicated test split, are capability flags.

use crate::utils::error::{Result, UdaError};

/// Static description of a dataset family and its universal class split.
#[derive(Debug, Clone)]
pub struct DatasetSpec {
    /// Registry name
    pub name: &'static str,
    /// Domain identifiers accepted for --source / --target
    pub domains: &'static [&'static str],
    /// Total class count across both domains
    pub num_total_classes: usize,
    /// Classes shared by source and target
    pub num_common_classes: usize,
    /// Classes present only in the source
    pub num_source_private: usize,
    /// Whether the dataset ships a dedicated test split; when false the
    /// validation split doubles as the test set
    pub has_test_split: bool,
}

impl DatasetSpec {
    /// Number of classes present in the source domain (common + private).
    /// This is also the sentinel index of the unknown class at evaluation.
    pub fn num_source_classes(&self) -> usize {
        self.num_common_classes + self.num_source_private
    }

    /// Check a domain identifier against this dataset.
    pub fn validate_domain(&self, domain: &str) -> Result<()> {
        if self.domains.contains(&domain) {
            Ok(())
        } else {
            Err(UdaError::UnknownDomain(
                domain.to_string(),
                self.name.to_string(),
            ))
        }
    }
}

const REGISTRY: &[DatasetSpec] = &[
    DatasetSpec {
        name: "Office31",
        domains: &["A", "D", "W"],
        num_total_classes: 31,
        num_common_classes: 10,
        num_source_private: 10,
        has_test_split: false,
    },
    DatasetSpec {
        name: "OfficeHome",
        domains: &["Ar", "Cl", "Pr", "Rw"],
        num_total_classes: 65,
        num_common_classes: 10,
        num_source_private: 5,
        has_test_split: false,
    },
    DatasetSpec {
        name: "VisDA2017",
        domains: &["Synthetic", "Real"],
        num_total_classes: 12,
        num_common_classes: 6,
        num_source_private: 3,
        has_test_split: false,
    },
    DatasetSpec {
        name: "DomainNet",
        domains: &["c", "i", "p", "q", "r", "s"],
        num_total_classes: 345,
        num_common_classes: 150,
        num_source_private: 50,
        has_test_split: true,
    },
    // In-memory deterministic data for tests and smoke runs
    DatasetSpec {
        name: "Synthetic",
        domains: &["S", "T"],
        num_total_classes: 6,
        num_common_classes: 3,
        num_source_private: 1,
        has_test_split: false,
    },
];

/// Names of all registered datasets.
pub fn dataset_names() -> Vec<&'static str> {
    REGISTRY.iter().map(|spec| spec.name).collect()
}

/// Look up a dataset by name.
pub fn lookup_dataset(name: &str) -> Result<&'static DatasetSpec> {
    REGISTRY
        .iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| UdaError::UnknownDataset(name.to_string(), dataset_names().join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known() {
        let spec = lookup_dataset("Office31").unwrap();
        assert_eq!(spec.num_source_classes(), 20);
        assert_eq!(spec.num_common_classes, 10);
        assert!(!spec.has_test_split);
    }

    #[test]
    fn test_lookup_unknown() {
        assert!(lookup_dataset("Office99").is_err());
    }

    #[test]
    fn test_domain_validation() {
        let spec = lookup_dataset("Office31").unwrap();
        assert!(spec.validate_domain("A").is_ok());
        assert!(spec.validate_domain("X").is_err());
    }

    #[test]
    fn test_domainnet_test_split_flag() {
        let spec = lookup_dataset("DomainNet").unwrap();
        assert!(spec.has_test_split);
    }
}
