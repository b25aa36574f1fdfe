//! Test utilities for pppackage
//!
//! Available to unit tests and, through the `test-utils` feature, to the
//! integration tests:
//!
//! - [`init_test_logging`]: one-time tracing setup writing through the test harness
//! - [`MockDriver`]: a scripted in-memory [`RepositoryDriver`] that records its calls
//! - [`write_chain_index`]: an index repository with the packages `p1 <- p2 <- p3`

use crate::core::PpError;
use crate::models::{
    BuildContextDetail, Clause, DependencyProductInfos, PackageDetail, ProductDetail, ProductInfo,
    Requirement, TranslatorInfo,
};
use crate::repository::{EpochStream, RepositoryDriver};
use anyhow::Result;
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, Once};
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. With `level` unset, logging is enabled
/// only when `RUST_LOG` is set.
///
/// ```bash
/// RUST_LOG=pppackage=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}

#[derive(Debug, Clone)]
struct MockPackage {
    detail: PackageDetail,
    build_context: Option<BuildContextDetail>,
    product_info: ProductInfo,
}

#[derive(Debug, Default)]
struct MockState {
    scripted_epochs: VecDeque<String>,
    epoch: String,
    calls: HashMap<String, usize>,
    events: Vec<String>,
}

/// An in-memory repository driver.
///
/// The epoch starts at `"0"` and is bumped by [`RepositoryDriver::update`].
/// Epochs given to [`MockDriver::with_epochs`] are handed out one per
/// `get_epoch`/`translate_options` call and the last one sticks. Streams
/// report the current epoch without advancing it.
#[derive(Debug)]
pub struct MockDriver {
    translator_data: Vec<TranslatorInfo>,
    formula: Vec<Clause>,
    packages: BTreeMap<String, MockPackage>,
    stream_delay: Option<Duration>,
    state: Mutex<MockState>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// An empty repository at epoch `"0"`.
    pub fn new() -> Self {
        Self {
            translator_data: Vec::new(),
            formula: Vec::new(),
            packages: BTreeMap::new(),
            stream_delay: None,
            state: Mutex::new(MockState {
                epoch: "0".to_string(),
                ..MockState::default()
            }),
        }
    }

    /// Translator data records.
    pub fn with_translator_data(mut self, data: Vec<TranslatorInfo>) -> Self {
        self.translator_data = data;
        self
    }

    /// Formula clauses.
    pub fn with_formula(mut self, formula: Vec<Clause>) -> Self {
        self.formula = formula;
        self
    }

    /// Epochs returned by successive epoch reads.
    pub fn with_epochs<I, S>(self, epochs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().scripted_epochs = epochs.into_iter().map(Into::into).collect();
        self
    }

    /// Delay before a stream is handed out.
    pub fn with_stream_delay(mut self, delay: Duration) -> Self {
        self.stream_delay = Some(delay);
        self
    }

    /// Adds package `name`. The package also asserts `name -> dependencies`
    /// in the formula, the way an index repository does.
    pub fn with_package(mut self, name: &str, detail: PackageDetail) -> Self {
        if !detail.dependencies.is_empty() {
            let mut clause = vec![Requirement::noop(name).negate()];
            clause.push(Requirement::all(
                detail.dependencies.iter().map(|d| Requirement::noop(d.as_str())).collect(),
            ));
            self.formula.push(clause);
        }
        self.packages.insert(
            name.to_string(),
            MockPackage {
                detail,
                build_context: None,
                product_info: ProductInfo::new(),
            },
        );
        self
    }

    /// Overrides the build context of an added package.
    pub fn with_build_context(mut self, name: &str, context: BuildContextDetail) -> Self {
        if let Some(package) = self.packages.get_mut(name) {
            package.build_context = Some(context);
        }
        self
    }

    /// Declared product info of an added package.
    pub fn with_product_info(mut self, name: &str, info: ProductInfo) -> Self {
        if let Some(package) = self.packages.get_mut(name) {
            package.product_info = info;
        }
        self
    }

    /// Number of calls to the driver method `name`.
    pub fn calls(&self, name: &str) -> usize {
        self.lock().calls.get(name).copied().unwrap_or(0)
    }

    /// Ordered log of notable events.
    pub fn events(&self) -> Vec<String> {
        self.lock().events.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, name: &str) {
        *self.lock().calls.entry(name.to_string()).or_default() += 1;
    }

    fn next_epoch(&self) -> String {
        let mut state = self.lock();
        if let Some(epoch) = state.scripted_epochs.pop_front() {
            state.epoch = epoch;
        }
        state.epoch.clone()
    }

    fn current_epoch(&self) -> String {
        self.lock().epoch.clone()
    }

    fn package(&self, name: &str) -> Result<&MockPackage> {
        self.packages.get(name).ok_or_else(|| {
            PpError::InvariantViolation {
                message: format!("mock repository has no package '{name}'"),
            }
            .into()
        })
    }

    async fn stream<T: Clone + Send + 'static>(&self, items: &[T], name: &str) -> EpochStream<'_, T> {
        let epoch = self.current_epoch();
        if let Some(delay) = self.stream_delay {
            tokio::time::sleep(delay).await;
        }
        self.lock().events.push(format!("{name}:end"));
        EpochStream::from_vec(epoch, items.to_vec())
    }
}

impl RepositoryDriver for MockDriver {
    fn get_epoch(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.record("get_epoch");
            Ok(self.next_epoch())
        })
    }

    fn fetch_translator_data(&self) -> BoxFuture<'_, Result<EpochStream<'_, TranslatorInfo>>> {
        Box::pin(async move {
            self.record("fetch_translator_data");
            Ok(self.stream(&self.translator_data, "fetch_translator_data").await)
        })
    }

    fn translate_options(
        &self,
        options: serde_json::Value,
    ) -> BoxFuture<'_, Result<(String, serde_json::Value)>> {
        Box::pin(async move {
            self.record("translate_options");
            Ok((self.next_epoch(), options))
        })
    }

    fn get_formula<'a>(
        &'a self,
        _translated_options: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<EpochStream<'a, Clause>>> {
        Box::pin(async move {
            self.record("get_formula");
            Ok(self.stream(&self.formula, "get_formula").await)
        })
    }

    fn get_package_detail<'a>(
        &'a self,
        _translated_options: &'a serde_json::Value,
        package: &'a str,
    ) -> BoxFuture<'a, Result<Option<PackageDetail>>> {
        Box::pin(async move {
            self.record("get_package_detail");
            Ok(self.packages.get(package).map(|p| p.detail.clone()))
        })
    }

    fn get_build_context<'a>(
        &'a self,
        _translated_options: &'a serde_json::Value,
        package: &'a str,
        _runtime_product_infos: &'a DependencyProductInfos,
    ) -> BoxFuture<'a, Result<BuildContextDetail>> {
        Box::pin(async move {
            self.record("get_build_context");
            self.lock().events.push(format!("get_build_context:{package}"));
            let package = self.package(package)?;
            Ok(package
                .build_context
                .clone()
                .unwrap_or_else(|| BuildContextDetail::from(package.detail.product.clone())))
        })
    }

    fn compute_product_info<'a>(
        &'a self,
        _translated_options: &'a serde_json::Value,
        package: &'a str,
        runtime_product_infos: &'a DependencyProductInfos,
    ) -> BoxFuture<'a, Result<ProductInfo>> {
        Box::pin(async move {
            self.record("compute_product_info");
            let mut info = self.package(package)?.product_info.clone();
            if !runtime_product_infos.is_empty() {
                info.insert("dependencies".to_string(), serde_json::to_value(runtime_product_infos)?);
            }
            Ok(info)
        })
    }

    fn update(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.record("update");
            let mut state = self.lock();
            state.epoch = match state.epoch.parse::<u64>() {
                Ok(n) => (n + 1).to_string(),
                Err(_) => format!("{}+", state.epoch),
            };
            state.events.push("update".to_string());
            Ok(())
        })
    }
}

/// Detail of an archive package providing itself and requiring `dependencies`.
pub fn archive_detail(name: &str, dependencies: &[&str], location: &str, installer: &str) -> PackageDetail {
    PackageDetail {
        interfaces: [name.to_string()].into(),
        dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
        product: ProductDetail::Archive {
            location: location.to_string(),
            installer: installer.to_string(),
        },
    }
}

/// Writes an index repository with `p1`, `p2` (needs `p1`) and `p3` (needs
/// `p2`) into `dir` and returns the index path.
///
/// Each product is a directory holding `{name}.txt`, installed with the
/// installer tag `installer`.
pub fn write_chain_index(dir: &Path, installer: &str) -> Result<PathBuf> {
    let chain = [("p1", None), ("p2", Some("p1")), ("p3", Some("p2"))];
    let mut packages = Vec::new();
    for (name, dependency) in chain {
        let product = dir.join("products").join(name);
        std::fs::create_dir_all(&product)?;
        std::fs::write(product.join(format!("{name}.txt")), name)?;

        packages.push(serde_json::json!({
            "name": name,
            "version": "1.0.0",
            "interfaces": [name],
            "dependencies": dependency.into_iter().collect::<Vec<_>>(),
            "requirements": dependency
                .map(|d| vec![serde_json::json!({"translator": "noop", "value": d})])
                .unwrap_or_default(),
            "product": {"kind": "archive", "location": format!("products/{name}"), "installer": installer},
        }));
    }

    let index = dir.join("index.json");
    std::fs::write(&index, serde_json::to_vec_pretty(&serde_json::json!({"packages": packages}))?)?;
    Ok(index)
}
