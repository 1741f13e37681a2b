//! Image-folder dataset loading.
//!
//! Expects the layout `root/<domain>/<class>/<image>`. Class indices come
//! from the sorted class directory names so both domains of a dataset agree
//! on the label mapping.

use std::fs;
use std::path::{Path, PathBuf};

use burn::data::dataset::Dataset;
use image::imageops::FilterType;
use tracing::{debug, info};

use super::burn_dataset::DomainItem;
use crate::utils::error::{Result, UdaError};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// An eagerly scanned image-folder dataset for one domain.
pub struct ImageFolderDataset {
    items: Vec<(PathBuf, usize)>,
    class_names: Vec<String>,
    image_size: usize,
}

impl ImageFolderDataset {
    /// Scan `root/domain` for class subdirectories and their images.
    pub fn from_folder(root: &Path, domain: &str, image_size: usize) -> Result<Self> {
        let domain_dir = root.join(domain);
        if !domain_dir.is_dir() {
            return Err(UdaError::Dataset(format!(
                "domain directory not found: {}",
                domain_dir.display()
            )));
        }

        let mut class_names = Vec::new();
        for entry in fs::read_dir(&domain_dir)? {
            let entry = entry?;
            if entry.path().is_dir() {
                class_names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        class_names.sort();
        if class_names.is_empty() {
            return Err(UdaError::Dataset(format!(
                "no class directories under {}",
                domain_dir.display()
            )));
        }

        let mut items = Vec::new();
        for (label, class_name) in class_names.iter().enumerate() {
            let class_dir = domain_dir.join(class_name);
            for entry in fs::read_dir(&class_dir)? {
                let path = entry?.path();
                let is_image = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                    .unwrap_or(false);
                if is_image {
                    items.push((path, label));
                }
            }
        }
        items.sort();

        info!(
            domain = domain,
            classes = class_names.len(),
            images = items.len(),
            "scanned image folder"
        );

        Ok(Self {
            items,
            class_names,
            image_size,
        })
    }

    /// Keep only samples whose label is below `num_source_classes`.
    ///
    /// The source label set is the first `|C_s|` indices of the shared
    /// alphabetical ordering; everything above is target-private.
    pub fn retain_source_classes(mut self, num_source_classes: usize) -> Self {
        self.items.retain(|(_, label)| *label < num_source_classes);
        debug!(
            remaining = self.items.len(),
            num_source_classes, "filtered to source label set"
        );
        self
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    fn load_item(&self, path: &Path, label: usize) -> Result<DomainItem> {
        let img = image::open(path)
            .map_err(|e| UdaError::ImageLoad(path.to_path_buf(), e.to_string()))?;
        let img = img
            .resize_exact(
                self.image_size as u32,
                self.image_size as u32,
                FilterType::Triangle,
            )
            .to_rgb8();

        let size = self.image_size;
        let mut chw = vec![0.0f32; 3 * size * size];
        for (x, y, pixel) in img.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                chw[c * size * size + y * size + x] = pixel[c] as f32 / 255.0;
            }
        }

        Ok(DomainItem::new(
            chw,
            label,
            path.to_string_lossy().into_owned(),
        ))
    }
}

impl Dataset<DomainItem> for ImageFolderDataset {
    fn get(&self, index: usize) -> Option<DomainItem> {
        let (path, label) = self.items.get(index)?;
        match self.load_item(path, *label) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!("failed to load {}: {e}", path.display());
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}
