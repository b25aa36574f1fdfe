//! Package details, build contexts and product metadata.

use super::requirement::Requirement;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Metadata a package publishes per provided capability.
///
/// Backed by a [`BTreeMap`] so serialization is canonical; the product cache
/// hashes the serialized form.
pub type ProductInfo = BTreeMap<String, serde_json::Value>;

/// Product metadata of dependencies, keyed by capability and then by package.
pub type DependencyProductInfos = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

/// Everything the graph builder needs to know about one selected package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDetail {
    /// Capabilities this package provides
    #[serde(default)]
    pub interfaces: BTreeSet<String>,
    /// Capabilities this package requires
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    /// How the product of this package is obtained
    pub product: ProductDetail,
}

/// Static description of how a package's product comes to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProductDetail {
    /// A prebuilt archive
    Archive {
        /// URL or filesystem path of the archive
        location: String,
        /// Installer tag for the product
        installer: String,
    },
    /// A sandboxed build on top of a resolved set of packages
    Meta {
        /// Requirements of the build environment
        requirements: Vec<Requirement>,
        /// Command run inside the build root
        command: Vec<String>,
        /// Whether the package's own dependencies are added to the build environment
        #[serde(default)]
        on_top: bool,
    },
}

/// Resolved build instructions returned by a repository for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildContextDetail {
    /// Download or copy a prebuilt archive
    Archive {
        /// URL or filesystem path of the archive
        location: String,
        /// Installer tag for the product
        installer: String,
    },
    /// Resolve `requirements`, install them into a build root and run `command`
    Meta {
        /// Requirements of the build environment
        requirements: Vec<Requirement>,
        /// Command run inside the build root
        command: Vec<String>,
        /// Whether the package's own dependencies are added to the build environment
        #[serde(default)]
        on_top: bool,
    },
}

impl From<ProductDetail> for BuildContextDetail {
    fn from(detail: ProductDetail) -> Self {
        match detail {
            ProductDetail::Archive {
                location,
                installer,
            } => Self::Archive {
                location,
                installer,
            },
            ProductDetail::Meta {
                requirements,
                command,
                on_top,
            } => Self::Meta {
                requirements,
                command,
                on_top,
            },
        }
    }
}

/// Canonical JSON of a [`ProductInfo`].
pub fn canonical_product_info(info: &ProductInfo) -> String {
    // BTreeMap keys serialize sorted; nested objects are serde_json::Map,
    // which is also ordered unless `preserve_order` is enabled.
    serde_json::to_string(info).unwrap_or_default()
}
