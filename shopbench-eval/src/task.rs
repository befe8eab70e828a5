//! Task scorers
//!
//! Each task kind turns a trajectory's final recommendation into named
//! scores. Product tasks rate the first recommended id; shop and voucher
//! tasks rate ids positionally against an ordered list of constraints and
//! add a basket-level gate; web tasks check a looked-up knowledge attribute.

use serde::{Deserialize, Serialize};
use shopbench_core::{Product, ProductCatalog, Trajectory};
use shopbench_telemetry::catalog_lookup_span;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::constraint::{Constraint, ConstraintEvaluator, Field, WebConstraint, ground_truth};
use crate::error::{EvalError, Result};
use crate::voucher::Voucher;

/// Metric names shared by scores and reports
pub mod metric {
    pub const LENGTH: &str = "length";
    pub const FORMAT: &str = "format";
    /// Recommended products that resolved in the catalog
    pub const PRODUCT: &str = "product";
    /// Recommendation is the ground-truth product
    pub const GT: &str = "gt";
    /// Constraint hit rate
    pub const RULE: &str = "rule";
    pub const SHOP: &str = "shop";
    pub const BUDGET: &str = "budget";
    pub const KEYWORD: &str = "kw";
    pub const TITLE: &str = "title";
    pub const RESPONSE: &str = "response";
    pub const HAVE_RECOMMEND: &str = "have_recommend";
}

/// Kind of shopping task a query belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// One product is recommended
    #[default]
    Product,
    /// Several products, all from one shop
    Shop,
    /// Several products fitting a voucher budget
    Voucher,
    /// One product whose details must be looked up on the web
    Web,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Product => "product",
            TaskKind::Shop => "shop",
            TaskKind::Voucher => "voucher",
            TaskKind::Web => "web",
        }
    }

    /// Basket-level gate metric, if the task has one
    pub fn gate_metric(self) -> Option<&'static str> {
        match self {
            TaskKind::Shop => Some(metric::SHOP),
            TaskKind::Voucher => Some(metric::BUDGET),
            TaskKind::Product | TaskKind::Web => None,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "product" => Ok(TaskKind::Product),
            "shop" => Ok(TaskKind::Shop),
            "voucher" => Ok(TaskKind::Voucher),
            "web" => Ok(TaskKind::Web),
            other => Err(EvalError::config(format!("invalid task `{}`", other))),
        }
    }
}

/// What a trajectory is scored against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    Web(WebConstraint),
    Single(Constraint),
    /// One constraint per recommended position
    Ordered(Vec<Constraint>),
}

impl Target {
    fn shape(&self) -> &'static str {
        match self {
            Target::Web(_) => "web constraint",
            Target::Single(_) => "single constraint",
            Target::Ordered(_) => "constraint list",
        }
    }
}

/// Named scores of one evaluated case
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score(BTreeMap<String, f64>);

impl Score {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of a metric; absent metrics read as 0
    pub fn get(&self, metric: &str) -> f64 {
        self.0.get(metric).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, metric: &str) -> bool {
        self.0.contains_key(metric)
    }

    pub fn set(&mut self, metric: &str, value: f64) {
        self.0.insert(metric.to_string(), value);
    }

    pub fn add(&mut self, metric: &str, value: f64) {
        *self.0.entry(metric.to_string()).or_insert(0.0) += value;
    }

    /// Divide the listed metrics by `divisor`
    fn divide(&mut self, metrics: &[&str], divisor: f64) {
        for metric in metrics {
            if let Some(value) = self.0.get_mut(*metric) {
                *value /= divisor;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Product-task metrics, all starting at 0
    fn for_products() -> Self {
        let mut score = Self::new();
        for metric in [metric::PRODUCT, metric::GT, metric::RULE] {
            score.set(metric, 0.0);
        }
        for field in Field::ALL {
            score.set(field.as_str(), 0.0);
        }
        score
    }
}

impl FromIterator<(String, f64)> for Score {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Products resolved for the required positions of a multi-item task
#[derive(Debug, Default)]
struct Basket {
    resolved: usize,
    total_price: f64,
    shop_ids: BTreeSet<String>,
}

/// Scores trajectories for every task kind
#[derive(Clone)]
pub struct TaskScorer {
    catalog: Arc<dyn ProductCatalog>,
    constraints: ConstraintEvaluator,
}

impl fmt::Debug for TaskScorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskScorer").field("constraints", &self.constraints).finish_non_exhaustive()
    }
}

impl TaskScorer {
    pub fn new(catalog: Arc<dyn ProductCatalog>, constraints: ConstraintEvaluator) -> Self {
        Self { catalog, constraints }
    }

    pub fn constraints(&self) -> &ConstraintEvaluator {
        &self.constraints
    }

    fn lookup(&self, product_id: &str) -> Option<Product> {
        let _span = catalog_lookup_span(product_id).entered();
        let product = self.catalog.get_product(product_id);
        if product.is_none() {
            debug!(product_id, "product not found");
        }
        product
    }

    /// Add one resolved product's scores
    fn add_product(&self, product: &Product, constraint: &Constraint, score: &mut Score) {
        score.add(metric::PRODUCT, 1.0);
        score.add(metric::GT, ground_truth(product, constraint));

        let outcome = self.constraints.evaluate(product, constraint);
        score.add(metric::RULE, outcome.rate);
        for field in Field::ALL {
            score.add(field.as_str(), outcome.field_rate(field));
        }
    }

    /// Score a trajectory for `kind`
    ///
    /// Unresolvable products only lower the score. A target whose shape does
    /// not fit the task, or an empty constraint list, is a configuration error.
    pub fn score(
        &self,
        kind: TaskKind,
        trajectory: &Trajectory,
        target: &Target,
        voucher: Option<&Voucher>,
    ) -> Result<Score> {
        match (kind, target) {
            (TaskKind::Product, Target::Single(constraint)) => {
                Ok(self.score_product(trajectory, constraint))
            }
            (TaskKind::Shop, Target::Ordered(constraints)) => {
                let (mut score, basket) = self.score_positions(trajectory, constraints)?;
                let same_shop = basket.resolved == constraints.len() && basket.shop_ids.len() == 1;
                score.set(metric::SHOP, if same_shop { 1.0 } else { 0.0 });
                Ok(score)
            }
            (TaskKind::Voucher, Target::Ordered(constraints)) => {
                let (mut score, basket) = self.score_positions(trajectory, constraints)?;
                let fits = match voucher {
                    Some(voucher) => {
                        basket.resolved == constraints.len()
                            && voucher.within_budget(basket.total_price, basket.shop_ids.len())
                    }
                    None => {
                        warn!(query = %trajectory.query, "voucher task without a voucher");
                        false
                    }
                };
                debug!(total_price = basket.total_price, fits, "budget check");
                score.set(metric::BUDGET, if fits { 1.0 } else { 0.0 });
                Ok(score)
            }
            (TaskKind::Web, Target::Web(constraint)) => Ok(self.score_web(trajectory, constraint)),
            (kind, target) => Err(EvalError::config(format!(
                "{} task cannot be scored against a {}",
                kind,
                target.shape()
            ))),
        }
    }

    fn score_product(&self, trajectory: &Trajectory, constraint: &Constraint) -> Score {
        let mut score = Score::for_products();
        let ids = trajectory.recommended_products();
        let first = ids.first().map(String::as_str).unwrap_or_default();
        if let Some(product) = self.lookup(first) {
            self.add_product(&product, constraint, &mut score);
        }
        score
    }

    /// Rate the i-th recommended id against the i-th constraint
    ///
    /// Sums are divided by the number of required positions, so missing or
    /// unresolvable recommendations count as 0.
    fn score_positions(
        &self,
        trajectory: &Trajectory,
        constraints: &[Constraint],
    ) -> Result<(Score, Basket)> {
        if constraints.is_empty() {
            return Err(EvalError::config("ordered target has no constraints"));
        }

        let ids = trajectory.recommended_products();
        let mut score = Score::for_products();
        let mut basket = Basket::default();

        for (constraint, product_id) in constraints.iter().zip(&ids) {
            let Some(product) = self.lookup(product_id) else {
                continue;
            };
            self.add_product(&product, constraint, &mut score);
            basket.resolved += 1;
            basket.total_price += product.price;
            basket.shop_ids.insert(product.shop_id);
        }

        let required = constraints.len() as f64;
        score.divide(&[metric::PRODUCT, metric::GT, metric::RULE], required);
        score.divide(&Field::ALL.map(Field::as_str), required);
        Ok((score, basket))
    }

    fn score_web(&self, trajectory: &Trajectory, constraint: &WebConstraint) -> Score {
        let ids = trajectory.recommended_products();
        let first = ids.first().map(String::as_str).unwrap_or_default();

        let mut score = Score::new();
        score.set(metric::HAVE_RECOMMEND, if first.is_empty() { 0.0 } else { 1.0 });
        let found = first.contains(constraint.product_id.as_str());
        score.set(metric::GT, if found { 1.0 } else { 0.0 });

        let outcome = self
            .lookup(first)
            .map(|product| self.constraints.evaluate_web(&product, constraint))
            .unwrap_or_default();
        score.set(metric::KEYWORD, outcome.keyword);
        score.set(metric::TITLE, outcome.title);
        score.set(
            metric::RESPONSE,
            outcome.keyword.max(constraint.response_score(&trajectory.responses())),
        );
        score.set(metric::RULE, (outcome.keyword + outcome.title) / 2.0);
        score
    }
}
