//! Chart recommendation from the shape of a result set.
//!
//! The structural choice (chartable, chart kind, axes, alternatives) is a
//! deterministic heuristic over column classes and cardinalities. Only the
//! free-text reasoning comes from the model, and losing it never loses the
//! structure.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use askdata_core::{
    ChartKind, ChartRecommendation, ChartSpec, ChartSuggestion, ColumnClass, ColumnProfile,
    FailureKind, GenerationClient, Result, ResultSet, ResultShape,
};

use crate::cancel::CancellationFlag;

/// Most categories for which a bar chart stays readable.
pub const BAR_MAX_CATEGORIES: usize = 25;

/// Most slices for a pie or doughnut chart.
pub const PIE_MAX_SLICES: usize = 6;

/// Integer columns with these names are treated as time.
const TEMPORAL_NAMES: &[&str] = &["year", "month", "quarter", "week", "day"];

/// Entity names that mark a bare `<entity>id` column as a key.
const ID_ENTITIES: &[&str] = &[
    "account", "branch", "category", "client", "customer", "employee", "item", "loan", "member",
    "order", "product", "region", "store", "transaction", "user", "vendor",
];

/// Classify a column from its values, falling back to the warehouse type
/// name when every value is null.
pub fn classify_values<'a>(
    values: impl Iterator<Item = &'a Value>,
    data_type: &str,
) -> ColumnClass {
    let mut seen = 0usize;
    let mut numbers = 0usize;
    let mut dates = 0usize;
    for value in values {
        match value {
            Value::Null => continue,
            Value::Number(_) => numbers += 1,
            Value::String(s) if time_key(s).is_some() => dates += 1,
            _ => {}
        }
        seen += 1;
    }

    if seen == 0 {
        return classify_type_name(data_type);
    }
    if numbers == seen {
        ColumnClass::Numeric
    } else if dates == seen {
        ColumnClass::Temporal
    } else {
        ColumnClass::Categorical
    }
}

fn classify_type_name(data_type: &str) -> ColumnClass {
    let t = data_type.to_ascii_uppercase();
    if t.starts_with("INT") || t.starts_with("FLOAT") || t == "NUMERIC" || t.starts_with("DOUBLE")
    {
        ColumnClass::Numeric
    } else if t.starts_with("DATE") || t.starts_with("TIMESTAMP") {
        ColumnClass::Temporal
    } else {
        ColumnClass::Categorical
    }
}

/// Sortable key for a date or timestamp string.
fn time_key(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn is_integer_column(result: &ResultSet, name: &str) -> bool {
    result
        .rows
        .iter()
        .filter_map(|row| row.get(name))
        .filter(|v| !v.is_null())
        .all(|v| v.is_i64() || v.is_u64())
}

fn looks_like_identifier(name: &str) -> bool {
    let n = name.to_ascii_lowercase();
    if n == "id" || n.ends_with("_id") {
        return true;
    }
    n.strip_suffix("id")
        .is_some_and(|stem| ID_ENTITIES.iter().any(|e| stem.ends_with(e)))
}

fn looks_like_period(name: &str) -> bool {
    let n = name.to_ascii_lowercase();
    TEMPORAL_NAMES
        .iter()
        .any(|p| n == *p || n.ends_with(&format!("_{}", p)))
}

/// Classify every column of a result and count its distinct values.
///
/// Integer identifier columns become categorical when another numeric
/// column is left to measure, and integer period columns (year, month)
/// become temporal.
pub fn profile_columns(result: &ResultSet) -> Vec<ColumnProfile> {
    let mut profiles: Vec<ColumnProfile> = result
        .columns
        .iter()
        .map(|col| {
            let values = result.rows.iter().filter_map(|row| row.get(&col.name));
            let class = classify_values(values, &col.data_type);
            let distinct: HashSet<String> = result
                .rows
                .iter()
                .filter_map(|row| row.get(&col.name))
                .filter(|v| !v.is_null())
                .map(|v| v.to_string())
                .collect();
            ColumnProfile {
                name: col.name.clone(),
                class,
                distinct: distinct.len(),
            }
        })
        .collect();

    for i in 0..profiles.len() {
        if profiles[i].class != ColumnClass::Numeric || !is_integer_column(result, &profiles[i].name)
        {
            continue;
        }
        let other_numeric = profiles
            .iter()
            .enumerate()
            .any(|(j, p)| j != i && p.class == ColumnClass::Numeric);
        if looks_like_period(&profiles[i].name) && other_numeric {
            profiles[i].class = ColumnClass::Temporal;
        } else if looks_like_identifier(&profiles[i].name) && other_numeric {
            profiles[i].class = ColumnClass::Categorical;
        }
    }
    profiles
}

/// Whether the axis values appear in sorted order (either direction).
fn is_ordered(result: &ResultSet, axis: &ColumnProfile) -> bool {
    let keys: Vec<f64> = result
        .rows
        .iter()
        .filter_map(|row| row.get(&axis.name))
        .filter_map(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => time_key(s).map(|t| t.and_utc().timestamp() as f64),
            _ => None,
        })
        .collect();
    if keys.len() < 2 {
        return true;
    }
    keys.windows(2).all(|w| w[0] <= w[1]) || keys.windows(2).all(|w| w[0] >= w[1])
}

fn all_non_negative(result: &ResultSet, name: &str) -> bool {
    result
        .rows
        .iter()
        .filter_map(|row| row.get(name))
        .filter_map(|v| v.as_f64())
        .all(|v| v >= 0.0)
}

fn of_class(profiles: &[ColumnProfile], class: ColumnClass) -> Vec<&ColumnProfile> {
    profiles.iter().filter(|p| p.class == class).collect()
}

fn chart(kind: ChartKind, x: Option<&ColumnProfile>, y: &ColumnProfile) -> ChartSpec {
    let (title, reason) = match (kind, x) {
        (_, None) => (y.name.clone(), format!("Shows the value of {}", y.name)),
        (ChartKind::Bar, Some(x)) => (
            format!("{} by {}", y.name, x.name),
            format!("Compares {} across {} {} values", y.name, x.distinct, x.name),
        ),
        (ChartKind::Line, Some(x)) => (
            format!("{} by {}", y.name, x.name),
            format!("Shows how {} changes over {}", y.name, x.name),
        ),
        (ChartKind::Area, Some(x)) => (
            format!("{} by {}", y.name, x.name),
            format!("Shows the volume of {} over {}", y.name, x.name),
        ),
        (ChartKind::Pie | ChartKind::Doughnut, Some(x)) => (
            format!("{} by {}", y.name, x.name),
            format!("Shows each {}'s share of {}", x.name, y.name),
        ),
        (ChartKind::Scatter, Some(x)) => (
            format!("{} vs {}", y.name, x.name),
            format!("Relates {} to {}", x.name, y.name),
        ),
    };
    ChartSpec {
        kind,
        title,
        x_axis: x.map(|c| c.name.clone()),
        y_axis: Some(y.name.clone()),
        reason,
    }
}

/// Structural recommendation, without model reasoning.
///
/// Returns the recommendation and, when chartable, the sentence the model
/// is asked to explain. Confidence values are heuristic fit scores, not
/// probabilities.
pub fn recommend_structure(result: &ResultSet) -> (ChartRecommendation, Option<String>) {
    if result.is_empty() {
        return (
            ChartRecommendation::not_chartable("The query returned no rows to chart."),
            None,
        );
    }

    let profiles = profile_columns(result);
    let numeric = of_class(&profiles, ColumnClass::Numeric);
    let temporal = of_class(&profiles, ColumnClass::Temporal);
    let categorical = of_class(&profiles, ColumnClass::Categorical);

    let Some(&y) = numeric.first() else {
        return (
            ChartRecommendation::not_chartable("The result has no numeric column to plot."),
            None,
        );
    };

    let mut candidates: Vec<(ChartSpec, f32)> = Vec::new();
    let primary = if let Some(&x) = temporal.first() {
        let ordered = is_ordered(result, x);
        let small = x.distinct <= BAR_MAX_CATEGORIES;
        candidates.push((chart(ChartKind::Line, Some(x), y), if ordered { 0.8 } else { 0.6 }));
        candidates.push((chart(ChartKind::Area, Some(x), y), 0.6));
        candidates.push((chart(ChartKind::Bar, Some(x), y), if small { 0.7 } else { 0.4 }));
        if ordered {
            chart(ChartKind::Line, Some(x), y)
        } else {
            chart(ChartKind::Bar, Some(x), y)
        }
    } else if let Some(&x) = categorical.first() {
        let small = x.distinct <= BAR_MAX_CATEGORIES;
        candidates.push((chart(ChartKind::Bar, Some(x), y), if small { 0.7 } else { 0.4 }));
        candidates.push((chart(ChartKind::Line, Some(x), y), 0.3));
        let pie = categorical.len() == 1
            && numeric.len() == 1
            && (2..=PIE_MAX_SLICES).contains(&x.distinct)
            && all_non_negative(result, &y.name);
        if pie {
            candidates.push((chart(ChartKind::Pie, Some(x), y), 0.75));
            candidates.push((chart(ChartKind::Doughnut, Some(x), y), 0.7));
        }
        chart(ChartKind::Bar, Some(x), y)
    } else if numeric.len() >= 2 {
        chart(ChartKind::Scatter, Some(numeric[0]), numeric[1])
    } else {
        chart(ChartKind::Bar, None, y)
    };

    if numeric.len() >= 2 {
        candidates.push((chart(ChartKind::Scatter, Some(numeric[0]), numeric[1]), 0.5));
    }

    let mut secondary: Vec<ChartSuggestion> = candidates
        .into_iter()
        .filter(|(c, _)| c.kind != primary.kind)
        .map(|(chart, confidence)| ChartSuggestion { chart, confidence })
        .collect();
    secondary.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then(a.chart.kind.cmp(&b.chart.kind))
    });

    let proposed = match &primary.x_axis {
        Some(x) => format!("{} chart of {} by {}", primary.kind, y.name, x),
        None => format!("{} chart of {}", primary.kind, y.name),
    };

    (
        ChartRecommendation {
            chartable: true,
            reasoning: String::new(),
            primary: Some(primary),
            secondary,
        },
        Some(proposed),
    )
}

/// Produces chart recommendations, asking the model only for reasoning.
pub struct ChartRecommender {
    client: Arc<dyn GenerationClient>,
    timeout: Duration,
    sample_rows: usize,
}

impl ChartRecommender {
    pub fn new(client: Arc<dyn GenerationClient>, timeout: Duration, sample_rows: usize) -> Self {
        Self {
            client,
            timeout,
            sample_rows,
        }
    }

    /// Recommend a chart for a successful result.
    ///
    /// A reasoning failure keeps the structural recommendation with empty
    /// reasoning and reports [`FailureKind::ChartDegraded`].
    #[instrument(
        skip(self, question, result, cancel),
        fields(subsystem = "pipeline", component = "chart", op = "recommend", row_count = result.row_count())
    )]
    pub async fn recommend(
        &self,
        question: &str,
        result: &ResultSet,
        cancel: &CancellationFlag,
    ) -> Result<(ChartRecommendation, Option<FailureKind>)> {
        let (mut recommendation, proposed) = recommend_structure(result);
        let Some(proposed) = proposed else {
            debug!(reason = %recommendation.reasoning, "Result is not chartable");
            return Ok((recommendation, None));
        };

        cancel.check("chart reasoning")?;
        let shape = ResultShape {
            question: question.to_string(),
            columns: profile_columns(result),
            row_count: result.row_count(),
            sample: result.rows.iter().take(self.sample_rows).cloned().collect(),
            proposed,
        };

        let outcome =
            tokio::time::timeout(self.timeout, self.client.generate_chart_reasoning(&shape)).await;
        let error = match outcome {
            Ok(Ok(text)) => {
                recommendation.reasoning = text;
                return Ok((recommendation, None));
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {}ms", self.timeout.as_millis()),
        };

        warn!(
            failure_kind = %FailureKind::ChartDegraded,
            error = %error,
            "Chart reasoning failed, keeping structural recommendation"
        );
        Ok((recommendation, Some(FailureKind::ChartDegraded)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askdata_core::{ColumnMeta, Row};
    use serde_json::json;

    fn result(columns: &[(&str, &str)], rows: Vec<Value>) -> ResultSet {
        let columns = columns
            .iter()
            .map(|(n, t)| ColumnMeta::new(*n, *t))
            .collect();
        let rows = rows
            .into_iter()
            .map(|v| match v {
                Value::Object(map) => map,
                _ => Row::new(),
            })
            .collect();
        ResultSet::new(columns, rows)
    }

    #[test]
    fn test_zero_rows_not_chartable() {
        let r = result(&[("a", "INT8")], vec![]);
        let (rec, proposed) = recommend_structure(&r);
        assert!(!rec.chartable);
        assert!(rec.primary.is_none());
        assert!(proposed.is_none());
    }

    #[test]
    fn test_no_numeric_not_chartable() {
        let r = result(
            &[("state", "TEXT")],
            vec![json!({"state": "CA"}), json!({"state": "NY"})],
        );
        let (rec, _) = recommend_structure(&r);
        assert!(!rec.chartable);
        assert!(rec.reasoning.contains("no numeric"));
    }

    #[test]
    fn test_identifier_axis_yields_bar() {
        let r = result(
            &[("loanproductid", "INT4"), ("total_funded", "NUMERIC")],
            vec![
                json!({"loanproductid": 1, "total_funded": 125000.5}),
                json!({"loanproductid": 2, "total_funded": 98000}),
            ],
        );
        let (rec, proposed) = recommend_structure(&r);
        assert!(rec.chartable);
        let primary = rec.primary.unwrap();
        assert_eq!(primary.kind, ChartKind::Bar);
        assert_eq!(primary.x_axis.as_deref(), Some("loanproductid"));
        assert_eq!(primary.y_axis.as_deref(), Some("total_funded"));
        assert_eq!(primary.title, "total_funded by loanproductid");
        assert_eq!(proposed.unwrap(), "bar chart of total_funded by loanproductid");
        assert!(rec.secondary.iter().all(|s| s.chart.kind != ChartKind::Bar));
    }

    #[test]
    fn test_identifier_names() {
        assert!(looks_like_identifier("id"));
        assert!(looks_like_identifier("branch_id"));
        assert!(looks_like_identifier("LoanProductId"));
        assert!(looks_like_identifier("customerid"));
        assert!(!looks_like_identifier("prepaid"));
        assert!(!looks_like_identifier("overpaid"));
        assert!(!looks_like_identifier("paid"));
    }

    #[test]
    fn test_measure_ending_in_id_stays_numeric() {
        let r = result(
            &[("overpaid", "INT8"), ("prepaid", "INT8")],
            vec![
                json!({"overpaid": 3, "prepaid": 10}),
                json!({"overpaid": 5, "prepaid": 12}),
            ],
        );
        let (rec, _) = recommend_structure(&r);
        assert_eq!(rec.primary.unwrap().kind, ChartKind::Scatter);
    }

    #[test]
    fn test_low_cardinality_single_category_suggests_pie() {
        let r = result(
            &[("state", "TEXT"), ("customers", "INT8")],
            vec![
                json!({"state": "CA", "customers": 10}),
                json!({"state": "NY", "customers": 7}),
                json!({"state": "TX", "customers": 3}),
            ],
        );
        let (rec, _) = recommend_structure(&r);
        assert_eq!(rec.primary.unwrap().kind, ChartKind::Bar);
        assert_eq!(rec.secondary[0].chart.kind, ChartKind::Pie);
        assert_eq!(rec.secondary[0].confidence, 0.75);
        assert_eq!(rec.secondary[1].chart.kind, ChartKind::Doughnut);
    }

    #[test]
    fn test_negative_values_exclude_pie() {
        let r = result(
            &[("state", "TEXT"), ("delta", "INT8")],
            vec![
                json!({"state": "CA", "delta": -1}),
                json!({"state": "NY", "delta": 4}),
            ],
        );
        let (rec, _) = recommend_structure(&r);
        assert!(rec.secondary.iter().all(|s| s.chart.kind != ChartKind::Pie));
    }

    #[test]
    fn test_ordered_dates_yield_line() {
        let r = result(
            &[("fundeddate", "DATE"), ("amount", "FLOAT8")],
            vec![
                json!({"fundeddate": "2025-01-01", "amount": 1.0}),
                json!({"fundeddate": "2025-02-01", "amount": 2.0}),
                json!({"fundeddate": "2025-03-01", "amount": 1.5}),
            ],
        );
        let (rec, _) = recommend_structure(&r);
        assert_eq!(rec.primary.unwrap().kind, ChartKind::Line);
        let kinds: Vec<_> = rec.secondary.iter().map(|s| s.chart.kind).collect();
        assert_eq!(kinds, vec![ChartKind::Bar, ChartKind::Area]);
    }

    #[test]
    fn test_unordered_dates_yield_bar() {
        let r = result(
            &[("d", "DATE"), ("v", "INT8")],
            vec![
                json!({"d": "2025-03-01", "v": 1}),
                json!({"d": "2025-01-01", "v": 2}),
                json!({"d": "2025-02-01", "v": 3}),
            ],
        );
        let (rec, _) = recommend_structure(&r);
        assert_eq!(rec.primary.unwrap().kind, ChartKind::Bar);
    }

    #[test]
    fn test_year_column_is_temporal() {
        let r = result(
            &[("year", "INT4"), ("total", "INT8")],
            vec![json!({"year": 2023, "total": 5}), json!({"year": 2024, "total": 9})],
        );
        let profiles = profile_columns(&r);
        assert_eq!(profiles[0].class, ColumnClass::Temporal);
        assert_eq!(recommend_structure(&r).0.primary.unwrap().kind, ChartKind::Line);
    }

    #[test]
    fn test_two_measures_yield_scatter() {
        let r = result(
            &[("balance", "FLOAT8"), ("rate", "FLOAT8")],
            vec![
                json!({"balance": 10.5, "rate": 0.1}),
                json!({"balance": 20.25, "rate": 0.2}),
            ],
        );
        let primary = recommend_structure(&r).0.primary.unwrap();
        assert_eq!(primary.kind, ChartKind::Scatter);
        assert_eq!(primary.title, "rate vs balance");
    }

    #[test]
    fn test_single_measure_yields_bar_without_axis() {
        let r = result(&[("total", "INT8")], vec![json!({"total": 42})]);
        let primary = recommend_structure(&r).0.primary.unwrap();
        assert_eq!(primary.kind, ChartKind::Bar);
        assert!(primary.x_axis.is_none());
    }

    #[test]
    fn test_all_null_column_uses_type_name() {
        let values = [Value::Null, Value::Null];
        assert_eq!(classify_values(values.iter(), "TIMESTAMPTZ"), ColumnClass::Temporal);
        assert_eq!(classify_values(values.iter(), "INT8"), ColumnClass::Numeric);
        assert_eq!(classify_values(values.iter(), "TEXT"), ColumnClass::Categorical);
    }

    #[test]
    fn test_recommendation_is_deterministic() {
        let r = result(
            &[("state", "TEXT"), ("n", "INT8"), ("m", "FLOAT8")],
            vec![json!({"state": "CA", "n": 1, "m": 2.5}), json!({"state": "NY", "n": 3, "m": 0.5})],
        );
        assert_eq!(recommend_structure(&r), recommend_structure(&r));
    }
}
