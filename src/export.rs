//! Export orchestration and delivery
//!
//! The exporter owns the output document for the whole run. Pages are
//! captured one at a time by default and always composed in input order;
//! the first failing page aborts the run and nothing is delivered.

use crate::capture::PageCapture;
use crate::compose::ExportDocument;
use crate::session::SessionProvider;
use crate::style::StyleNormalizer;
use crate::{Error, ExportConfig, PageSpec, Result};
use futures::stream::{self, StreamExt};
use log::info;
use std::path::{Path, PathBuf};

/// Destination of the finished document
pub trait Delivery {
    /// Hand `bytes` to the user under `file_name`
    fn deliver(&mut self, file_name: &str, bytes: &[u8]) -> Result<()>;
}

/// Saves the document into a directory
#[derive(Debug, Clone)]
pub struct FileDelivery {
    dir: PathBuf,
    delivered: Option<PathBuf>,
}

impl FileDelivery {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            delivered: None,
        }
    }

    /// Path of the last delivered file, if any
    pub fn delivered(&self) -> Option<&Path> {
        self.delivered.as_deref()
    }
}

impl Delivery for FileDelivery {
    fn deliver(&mut self, file_name: &str, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file_name);
        std::fs::write(&path, bytes)?;
        info!("Saved {} ({} bytes)", path.display(), bytes.len());
        self.delivered = Some(path);
        Ok(())
    }
}

/// Drives page captures and composes the output document
pub struct Exporter<P: SessionProvider> {
    provider: P,
    config: ExportConfig,
    normalizer: StyleNormalizer,
}

impl<P: SessionProvider> Exporter<P> {
    pub fn new(provider: P, config: ExportConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            provider,
            config,
            normalizer: StyleNormalizer::default(),
        })
    }

    pub fn with_normalizer(mut self, normalizer: StyleNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Capture every page in order and compose them into one document.
    pub async fn run(&self, pages: &[PageSpec]) -> Result<ExportDocument> {
        if pages.is_empty() {
            return Err(Error::ConfigError("no pages to export".into()));
        }
        self.provider.probe().await?;

        let mut document = ExportDocument::new("InsightDash Dashboard")?;
        let capture =
            PageCapture::new(&self.provider, &self.config).with_normalizer(self.normalizer.clone());
        let width = self.config.max_concurrent_captures.max(1);

        // `buffered` yields in input order; with a width of 1 the next page
        // is not started until the previous one has been composed.
        let mut captures = stream::iter(pages)
            .map(|spec| capture.capture(spec))
            .buffered(width);

        let mut index = 0;
        while let Some(captured) = captures.next().await {
            index += 1;
            let captured = captured?;
            info!("[{}/{}] {}", index, pages.len(), captured.title);
            document.append(captured)?;
        }

        Ok(document)
    }

    /// Run the export, serialize the document, and deliver it. Nothing is
    /// delivered unless every page succeeded.
    pub async fn export<D: Delivery>(&self, pages: &[PageSpec], sink: &mut D) -> Result<()> {
        let document = self.run(pages).await?;
        let bytes = document.finish()?;
        sink.deliver(&self.config.file_name, &bytes)
    }
}
