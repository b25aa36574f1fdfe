//! In-process repositories.
//!
//! [`LocalRepository`] forwards every call to a driver while enforcing a
//! reader/writer discipline: [`RepositoryDriver::update`] holds the write
//! lock, every query holds a read lock. Streams are drained while the read
//! lock is held so a concurrent update can never interleave with a read.

use super::{EpochStream, RepositoryDriver};
use crate::models::{
    BuildContextDetail, Clause, DependencyProductInfos, PackageDetail, ProductInfo, TranslatorInfo,
};
use anyhow::Result;
use futures::TryStreamExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A driver called directly in this process.
pub struct LocalRepository {
    driver: Arc<dyn RepositoryDriver>,
    lock: RwLock<()>,
}

impl LocalRepository {
    /// Wraps `driver`.
    pub fn new(driver: Arc<dyn RepositoryDriver>) -> Self {
        Self {
            driver,
            lock: RwLock::new(()),
        }
    }
}

impl RepositoryDriver for LocalRepository {
    fn get_epoch(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let _read = self.lock.read().await;
            self.driver.get_epoch().await
        })
    }

    fn fetch_translator_data(&self) -> BoxFuture<'_, Result<EpochStream<'_, TranslatorInfo>>> {
        Box::pin(async move {
            let _read = self.lock.read().await;
            let stream = self.driver.fetch_translator_data().await?;
            let items: Vec<TranslatorInfo> = stream.items.try_collect().await?;
            Ok(EpochStream::from_vec(stream.epoch, items))
        })
    }

    fn translate_options(
        &self,
        options: serde_json::Value,
    ) -> BoxFuture<'_, Result<(String, serde_json::Value)>> {
        Box::pin(async move {
            let _read = self.lock.read().await;
            self.driver.translate_options(options).await
        })
    }

    fn get_formula<'a>(
        &'a self,
        translated_options: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<EpochStream<'a, Clause>>> {
        Box::pin(async move {
            let _read = self.lock.read().await;
            let stream = self.driver.get_formula(translated_options).await?;
            let items: Vec<Clause> = stream.items.try_collect().await?;
            Ok(EpochStream::from_vec(stream.epoch, items))
        })
    }

    fn get_package_detail<'a>(
        &'a self,
        translated_options: &'a serde_json::Value,
        package: &'a str,
    ) -> BoxFuture<'a, Result<Option<PackageDetail>>> {
        Box::pin(async move {
            let _read = self.lock.read().await;
            self.driver.get_package_detail(translated_options, package).await
        })
    }

    fn get_build_context<'a>(
        &'a self,
        translated_options: &'a serde_json::Value,
        package: &'a str,
        runtime_product_infos: &'a DependencyProductInfos,
    ) -> BoxFuture<'a, Result<BuildContextDetail>> {
        Box::pin(async move {
            let _read = self.lock.read().await;
            self.driver.get_build_context(translated_options, package, runtime_product_infos).await
        })
    }

    fn compute_product_info<'a>(
        &'a self,
        translated_options: &'a serde_json::Value,
        package: &'a str,
        runtime_product_infos: &'a DependencyProductInfos,
    ) -> BoxFuture<'a, Result<ProductInfo>> {
        Box::pin(async move {
            let _read = self.lock.read().await;
            self.driver
                .compute_product_info(translated_options, package, runtime_product_infos)
                .await
        })
    }

    fn update(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let _write = self.lock.write().await;
            tracing::info!(target: "repository", "Updating local repository");
            self.driver.update().await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockDriver;
    use std::time::Duration;

    #[tokio::test]
    async fn test_update_waits_for_readers() {
        let driver = Arc::new(MockDriver::new().with_stream_delay(Duration::from_millis(200)));
        let repository = Arc::new(LocalRepository::new(driver.clone()));

        let reader = {
            let repository = repository.clone();
            tokio::spawn(async move {
                let stream = repository.fetch_translator_data().await.unwrap();
                stream.epoch
            })
        };
        // Let the reader take the read lock first.
        tokio::time::sleep(Duration::from_millis(50)).await;

        repository.update().await.unwrap();
        let epoch_seen_by_reader = reader.await.unwrap();

        assert_eq!(epoch_seen_by_reader, "0");
        assert_eq!(driver.calls("update"), 1);
        assert_eq!(repository.get_epoch().await.unwrap(), "1");
        assert_eq!(driver.events(), vec!["fetch_translator_data:end", "update"]);
    }
}
