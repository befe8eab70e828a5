//! Product records and the catalog lookup collaborator

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A catalog product as returned by the search backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: String,
    #[serde(default)]
    pub shop_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub price: f64,
    /// Service flags such as `COD` or `freeShipping`
    #[serde(default)]
    pub service: Vec<String>,
    /// SKU variants keyed by SKU id; each variant maps option name to value
    #[serde(default)]
    pub sku_options: BTreeMap<String, BTreeMap<String, String>>,
    /// SPU attributes; each attribute may carry several values
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sold_count: u64,
}

impl Product {
    pub fn new(product_id: &str, shop_id: &str, title: &str, price: f64) -> Self {
        Self {
            product_id: product_id.to_string(),
            shop_id: shop_id.to_string(),
            title: title.to_string(),
            price,
            ..Default::default()
        }
    }

    pub fn with_service(mut self, flags: &[&str]) -> Self {
        self.service = flags.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_sku(mut self, sku_id: &str, options: &[(&str, &str)]) -> Self {
        self.sku_options.insert(
            sku_id.to_string(),
            options.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        );
        self
    }

    pub fn with_attribute(mut self, key: &str, values: &[&str]) -> Self {
        self.attributes.insert(key.to_string(), values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

/// Read-only product lookup
///
/// Implementations must be side-effect free from the evaluator's point of
/// view; a missing product is `None`, never an error.
pub trait ProductCatalog: Send + Sync {
    fn get_product(&self, product_id: &str) -> Option<Product>;
}

/// Catalog backed by a hash map
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    products: HashMap<String, Product>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, product: Product) {
        self.products.insert(product.product_id.clone(), product);
    }

    pub fn with_product(mut self, product: Product) -> Self {
        self.insert(product);
        self
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

impl FromIterator<Product> for InMemoryCatalog {
    fn from_iter<I: IntoIterator<Item = Product>>(iter: I) -> Self {
        let mut catalog = InMemoryCatalog::new();
        for product in iter {
            catalog.insert(product);
        }
        catalog
    }
}

impl ProductCatalog for InMemoryCatalog {
    fn get_product(&self, product_id: &str) -> Option<Product> {
        self.products.get(product_id).cloned()
    }
}
