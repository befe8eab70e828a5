//! Product constraint checks
//!
//! A constraint describes the product a query asks for: the target id plus
//! optional title, price, service and SKU/attribute requirements. A
//! recommended product is rated by the fraction of requirements it meets.

use serde::{Deserialize, Serialize};
use shopbench_core::{Product, TextSimilarity};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Similarity a title must reach to count as a hit
pub const DEFAULT_TITLE_THRESHOLD: f64 = 0.5;

/// Similarity a web-task title must reach to count as a hit
pub const DEFAULT_WEB_TITLE_THRESHOLD: f64 = 0.8;

/// How a price requirement compares against the product price
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PriceMode {
    #[serde(rename = "less than")]
    LessThan,
    #[serde(rename = "greater than")]
    GreaterThan,
    #[serde(rename = "between")]
    Between,
}

/// `[low, high]` bounds of a price requirement; unused bounds may be null
pub type PriceBounds = (Option<f64>, Option<f64>);

impl PriceMode {
    /// Whether `price` satisfies this mode under `bounds`
    ///
    /// A bound the mode needs but the record leaves null never matches.
    pub fn admits(self, price: f64, (low, high): PriceBounds) -> bool {
        match self {
            PriceMode::LessThan => high.is_some_and(|high| price <= high),
            PriceMode::GreaterThan => low.is_some_and(|low| price >= low),
            PriceMode::Between => match (low, high) {
                (Some(low), Some(high)) => low <= price && price <= high,
                _ => false,
            },
        }
    }
}

/// One price requirement, e.g. `{"between": [10, 20]}`
///
/// Every mode in the map counts as a separate check.
pub type PriceRange = BTreeMap<PriceMode, PriceBounds>;

/// Requirements synthesized for one target product
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// Ground-truth product id
    pub product_id: String,
    /// Acceptable titles, checked by semantic similarity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Vec<PriceRange>>,
    /// Service flags the product must offer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<Vec<String>>,
    /// Requested SKU option values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku_options: Option<Vec<BTreeMap<String, String>>>,
    /// Requested attribute values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Vec<BTreeMap<String, Vec<String>>>>,
}

impl Constraint {
    pub fn new(product_id: &str) -> Self {
        Self { product_id: product_id.to_string(), ..Default::default() }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title.get_or_insert_with(Vec::new).push(title.to_string());
        self
    }

    pub fn with_price(mut self, mode: PriceMode, low: Option<f64>, high: Option<f64>) -> Self {
        self.price.get_or_insert_with(Vec::new).push(BTreeMap::from([(mode, (low, high))]));
        self
    }

    pub fn with_service(mut self, flag: &str) -> Self {
        self.service.get_or_insert_with(Vec::new).push(flag.to_string());
        self
    }

    pub fn with_sku_option(mut self, key: &str, value: &str) -> Self {
        self.sku_options
            .get_or_insert_with(Vec::new)
            .push(BTreeMap::from([(key.to_string(), value.to_string())]));
        self
    }

    pub fn with_attribute(mut self, key: &str, values: &[&str]) -> Self {
        let values = values.iter().map(|v| v.to_string()).collect();
        self.attributes
            .get_or_insert_with(Vec::new)
            .push(BTreeMap::from([(key.to_string(), values)]));
        self
    }

    /// `(key, value)` pairs requested through SKU options and attributes
    fn requested_pairs(&self) -> Vec<(&str, &str)> {
        let sku = self
            .sku_options
            .iter()
            .flatten()
            .flat_map(|option| option.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        let attrs = self.attributes.iter().flatten().flat_map(|attr| {
            attr.iter().flat_map(|(k, vs)| vs.iter().map(move |v| (k.as_str(), v.as_str())))
        });
        sku.chain(attrs).collect()
    }
}

/// Requirement groups tracked separately in scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Field {
    #[serde(rename = "title")]
    Title,
    #[serde(rename = "price")]
    Price,
    #[serde(rename = "service")]
    Service,
    #[serde(rename = "sku & attrs")]
    SkuAttrs,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::Title, Field::Price, Field::Service, Field::SkuAttrs];

    /// Metric name used in scores and reports
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Price => "price",
            Field::Service => "service",
            Field::SkuAttrs => "sku & attrs",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of rating one product against one constraint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintOutcome {
    /// Overall hit rate; 1 when the product is the target or nothing was checkable
    pub rate: f64,
    /// Checks performed per field
    pub total: BTreeMap<Field, usize>,
    /// Checks passed per field
    pub hit: BTreeMap<Field, usize>,
}

impl ConstraintOutcome {
    fn exact() -> Self {
        Self { rate: 1.0, ..Default::default() }
    }

    /// Whether the product was the ground-truth target
    pub fn is_exact(&self) -> bool {
        self.rate >= 1.0 && self.total.is_empty()
    }

    /// Hit rate of one field; 1 when the field had nothing to check
    pub fn field_rate(&self, field: Field) -> f64 {
        let total = self.total.get(&field).copied().unwrap_or(0);
        if total == 0 {
            return 1.0;
        }
        self.hit.get(&field).copied().unwrap_or(0) as f64 / total as f64
    }

    fn record(&mut self, field: Field, passed: bool) {
        *self.total.entry(field).or_insert(0) += 1;
        if passed {
            *self.hit.entry(field).or_insert(0) += 1;
        }
    }
}

/// 1 when the product is the constraint's target, else 0
pub fn ground_truth(product: &Product, constraint: &Constraint) -> f64 {
    if product.product_id == constraint.product_id { 1.0 } else { 0.0 }
}

/// Rates products against constraints
#[derive(Clone)]
pub struct ConstraintEvaluator {
    similarity: Arc<dyn TextSimilarity>,
    title_threshold: f64,
    web_title_threshold: f64,
}

impl fmt::Debug for ConstraintEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstraintEvaluator")
            .field("title_threshold", &self.title_threshold)
            .field("web_title_threshold", &self.web_title_threshold)
            .finish_non_exhaustive()
    }
}

impl ConstraintEvaluator {
    /// Create an evaluator backed by a similarity oracle
    pub fn new(similarity: Arc<dyn TextSimilarity>) -> Self {
        Self {
            similarity,
            title_threshold: DEFAULT_TITLE_THRESHOLD,
            web_title_threshold: DEFAULT_WEB_TITLE_THRESHOLD,
        }
    }

    pub fn with_title_threshold(mut self, threshold: f64) -> Self {
        self.title_threshold = threshold;
        self
    }

    pub fn with_web_title_threshold(mut self, threshold: f64) -> Self {
        self.web_title_threshold = threshold;
        self
    }

    pub fn title_threshold(&self) -> f64 {
        self.title_threshold
    }

    /// Rate `product` against `constraint`
    ///
    /// The target product always rates 1, whatever the other fields say.
    pub fn evaluate(&self, product: &Product, constraint: &Constraint) -> ConstraintOutcome {
        if ground_truth(product, constraint) >= 1.0 {
            return ConstraintOutcome::exact();
        }

        let mut outcome = ConstraintOutcome::default();

        for title in constraint.title.iter().flatten() {
            let sim = self.similarity.similarity(&product.title, title);
            trace!(title, sim, "title similarity");
            outcome.record(Field::Title, sim >= self.title_threshold);
        }

        for range in constraint.price.iter().flatten() {
            for (&mode, &bounds) in range {
                outcome.record(Field::Price, mode.admits(product.price, bounds));
            }
        }

        for flag in constraint.service.iter().flatten() {
            outcome.record(Field::Service, product.service.contains(flag));
        }

        let (hit, total) = sku_and_attribute_hits(product, &constraint.requested_pairs());
        *outcome.total.entry(Field::SkuAttrs).or_insert(0) += total;
        *outcome.hit.entry(Field::SkuAttrs).or_insert(0) += hit;

        let total: usize = outcome.total.values().sum();
        let hit: usize = outcome.hit.values().sum();
        outcome.rate = if total == 0 { 1.0 } else { hit as f64 / total as f64 };
        outcome
    }

    /// Keyword and title scores of a web-task recommendation
    pub fn evaluate_web(&self, product: &Product, constraint: &WebConstraint) -> WebOutcome {
        if product.product_id == constraint.product_id {
            return WebOutcome { keyword: 1.0, title: 1.0 };
        }

        let keyword = constraint.key_attribute.to_lowercase();
        let in_title = product.title.to_lowercase().contains(&keyword);
        let in_description = product.description.to_lowercase().contains(&keyword);

        let title = match &constraint.title {
            Some(title) => {
                self.similarity.similarity(&product.title, title) >= self.web_title_threshold
            }
            None => in_title,
        };

        WebOutcome {
            keyword: if in_title || in_description { 1.0 } else { 0.0 },
            title: if title { 1.0 } else { 0.0 },
        }
    }
}

/// Best `(hit, total)` over the product's SKU variants
///
/// The baseline variant has no SKU options, so attributes alone can match.
/// Every variant is checked against the same requested pairs; the first
/// variant with the most hits wins.
fn sku_and_attribute_hits(product: &Product, requested: &[(&str, &str)]) -> (usize, usize) {
    let attributes: BTreeSet<(&str, &str)> = product
        .attributes
        .iter()
        .flat_map(|(k, vs)| vs.iter().map(move |v| (k.as_str(), v.as_str())))
        .collect();

    let baseline = BTreeSet::new();
    let variants: Vec<BTreeSet<(&str, &str)>> = std::iter::once(baseline)
        .chain(
            product
                .sku_options
                .values()
                .map(|option| option.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()),
        )
        .collect();

    let best_hit = variants
        .iter()
        .map(|variant| {
            requested
                .iter()
                .filter(|pair| variant.contains(*pair) || attributes.contains(*pair))
                .count()
        })
        .max()
        .unwrap_or(0);

    (best_hit, requested.len())
}

/// Ground truth of a web-search task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebConstraint {
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Knowledge attribute the agent had to look up on the web
    pub key_attribute: String,
}

impl WebConstraint {
    pub fn new(product_id: &str, key_attribute: &str) -> Self {
        Self {
            product_id: product_id.to_string(),
            title: None,
            key_attribute: key_attribute.to_string(),
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// 1 when `response` mentions the key attribute, case-insensitively
    pub fn response_score(&self, response: &str) -> f64 {
        if response.to_lowercase().contains(&self.key_attribute.to_lowercase()) { 1.0 } else { 0.0 }
    }
}

/// Web-task scores of one recommendation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WebOutcome {
    /// Key attribute found in title or description
    pub keyword: f64,
    /// Title matches the target
    pub title: f64,
}
