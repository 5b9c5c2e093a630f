//! Client-side half of cross-partition query execution.
//!
//! The gateway answers a query-plan request with the rewritten per-partition
//! query and the merge instructions (ORDER BY directions, TOP, or a hybrid
//! search plan). Everything here is pure: the HTTP fan-out lives in the parent
//! module and hands the drained partition results to these functions.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Query features this client can merge. Sent with every plan request so the
/// gateway refuses anything else up front.
pub(crate) const SUPPORTED_QUERY_FEATURES: &str =
    "MultipleOrderBy, OffsetAndLimit, OrderBy, Top, NonStreamingOrderBy, HybridSearch";

const ORDER_BY_FILTER: &str = "{documentdb-formattableorderbyquery-filter}";
const TOTAL_DOCUMENT_COUNT: &str = "{documentdb-formattablehybridsearchquery-totaldocumentcount}";
const RRF_CONSTANT: f64 = 60.0;

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub(crate) enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryPlan {
    #[serde(default)]
    pub query_info: Option<QueryInfo>,
    #[serde(default)]
    pub hybrid_search_query_info: Option<HybridSearchQueryInfo>,
    #[serde(default, deserialize_with = "nullable")]
    pub query_ranges: Vec<QueryRange>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryInfo {
    #[serde(default, deserialize_with = "nullable")]
    pub distinct_type: String,
    #[serde(default)]
    pub top: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default, deserialize_with = "nullable")]
    pub order_by: Vec<SortOrder>,
    #[serde(default, deserialize_with = "nullable")]
    pub aggregates: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub group_by_expressions: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub rewritten_query: String,
}

impl QueryInfo {
    /// Name of the first plan feature this client cannot merge, if any.
    pub fn unsupported_feature(&self) -> Option<&'static str> {
        if !self.distinct_type.is_empty() && self.distinct_type != "None" {
            Some("DISTINCT")
        } else if !self.aggregates.is_empty() {
            Some("aggregates")
        } else if !self.group_by_expressions.is_empty() {
            Some("GROUP BY")
        } else {
            None
        }
    }

    /// The query to send to each partition range.
    pub fn partition_query(&self, original: &str) -> String {
        let query = if self.rewritten_query.is_empty() {
            original
        } else {
            &self.rewritten_query
        };
        query.replace(ORDER_BY_FILTER, "true")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HybridSearchQueryInfo {
    #[serde(default, deserialize_with = "nullable")]
    pub global_statistics_query: String,
    #[serde(default, deserialize_with = "nullable")]
    pub component_query_infos: Vec<QueryInfo>,
    #[serde(default)]
    pub skip: Option<usize>,
    #[serde(default)]
    pub take: Option<usize>,
    #[serde(default)]
    pub requires_global_statistics: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub component_weights: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryRange {
    pub min: String,
    pub max: String,
    #[serde(default)]
    pub is_max_inclusive: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PartitionKeyRange {
    pub id: String,
    pub min_inclusive: String,
    pub max_exclusive: String,
}

impl PartitionKeyRange {
    fn overlaps(&self, range: &QueryRange) -> bool {
        let starts_before_end = if range.is_max_inclusive {
            self.min_inclusive.as_str() <= range.max.as_str()
        } else {
            self.min_inclusive.as_str() < range.max.as_str()
        };
        starts_before_end && range.min.as_str() < self.max_exclusive.as_str()
    }
}

/// Partition key ranges the plan's query ranges touch, in range order.
pub(crate) fn target_ranges(
    ranges: &[PartitionKeyRange],
    query_ranges: &[QueryRange],
) -> Vec<PartitionKeyRange> {
    if query_ranges.is_empty() {
        return ranges.to_vec();
    }
    ranges
        .iter()
        .filter(|range| query_ranges.iter().any(|query| range.overlaps(query)))
        .cloned()
        .collect()
}

/// Merges per-partition results of an ORDER BY and/or TOP query.
pub(crate) fn merge_partitions(partitions: Vec<Vec<Value>>, info: &QueryInfo) -> Vec<Value> {
    let mut rows: Vec<Value> = partitions.into_iter().flatten().collect();

    if !info.order_by.is_empty() {
        rows.sort_by(|left, right| compare_order_by_items(left, right, &info.order_by));
        rows = rows.into_iter().map(|row| take_field(row, "payload")).collect();
    }

    let skip = info.offset.unwrap_or(0);
    let take = match (info.top, info.limit) {
        (Some(top), Some(limit)) => top.min(limit),
        (Some(top), None) => top,
        (None, Some(limit)) => limit,
        (None, None) => usize::MAX,
    };
    rows.into_iter().skip(skip).take(take).collect()
}

fn compare_order_by_items(left: &Value, right: &Value, order_by: &[SortOrder]) -> Ordering {
    for (position, order) in order_by.iter().enumerate() {
        let ordering = compare_values(
            order_by_item(left, position),
            order_by_item(right, position),
        );
        let ordering = match order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn order_by_item(row: &Value, position: usize) -> Option<&Value> {
    row.get("orderByItems")
        .and_then(|items| items.get(position))
        .and_then(|item| item.get("item"))
}

/// Store ordering across JSON types: undefined < null < bool < number < string.
fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    fn type_rank(value: Option<&Value>) -> u8 {
        match value {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(Value::Array(_)) => 5,
            Some(Value::Object(_)) => 6,
        }
    }

    match (left, right) {
        (Some(Value::Bool(left)), Some(Value::Bool(right))) => left.cmp(right),
        (Some(Value::Number(left)), Some(Value::Number(right))) => {
            let left = left.as_f64().unwrap_or(f64::NAN);
            let right = right.as_f64().unwrap_or(f64::NAN);
            left.total_cmp(&right)
        }
        (Some(Value::String(left)), Some(Value::String(right))) => left.cmp(right),
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}

fn take_field(row: Value, field: &str) -> Value {
    match row {
        Value::Object(mut map) => map.remove(field).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GlobalStatistics {
    #[serde(default)]
    pub document_count: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub full_text_statistics: Vec<FullTextStatistics>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FullTextStatistics {
    #[serde(default)]
    pub total_word_count: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub hit_counts: Vec<u64>,
}

impl GlobalStatistics {
    pub fn absorb(&mut self, other: GlobalStatistics) {
        self.document_count += other.document_count;
        for (index, statistics) in other.full_text_statistics.into_iter().enumerate() {
            match self.full_text_statistics.get_mut(index) {
                Some(target) => {
                    target.total_word_count += statistics.total_word_count;
                    for (hit, count) in statistics.hit_counts.into_iter().enumerate() {
                        match target.hit_counts.get_mut(hit) {
                            Some(total) => *total += count,
                            None => target.hit_counts.push(count),
                        }
                    }
                }
                None => self.full_text_statistics.push(statistics),
            }
        }
    }

    /// Substitutes the corpus statistics into a hybrid component query.
    pub fn fill(&self, query: &str) -> String {
        let mut filled = query.replace(TOTAL_DOCUMENT_COUNT, &self.document_count.to_string());
        for (index, statistics) in self.full_text_statistics.iter().enumerate() {
            let hit_counts = statistics
                .hit_counts
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(",");
            filled = filled
                .replace(
                    &format!("{{documentdb-formattablehybridsearchquery-totalwordcount-{index}}}"),
                    &statistics.total_word_count.to_string(),
                )
                .replace(
                    &format!("{{documentdb-formattablehybridsearchquery-hitcountsarray-{index}}}"),
                    &format!("[{hit_counts}]"),
                );
        }
        filled
    }
}

/// Reciprocal-rank fusion of hybrid component results. Each hit carries
/// `payload.componentScores` (one score per component) and `payload.payload`
/// (the projected document).
pub(crate) fn fuse_components(hits: Vec<Value>, info: &HybridSearchQueryInfo) -> Vec<Value> {
    let mut seen = HashSet::new();
    let hits: Vec<Value> = hits
        .into_iter()
        .filter(|hit| match hit.get("_rid").and_then(Value::as_str) {
            Some(rid) => seen.insert(rid.to_string()),
            None => true,
        })
        .collect();

    let components = info.component_query_infos.len();
    let weights: Vec<f64> = if info.component_weights.len() == components {
        info.component_weights.clone()
    } else {
        vec![1.0; components]
    };

    let mut fused = vec![0.0f64; hits.len()];
    for (component, query_info) in info.component_query_infos.iter().enumerate() {
        let descending = query_info.order_by.first() != Some(&SortOrder::Ascending);
        let scores: Vec<f64> = hits
            .iter()
            .map(|hit| component_score(hit, component))
            .collect();

        for (index, rank) in ranks(&scores, descending).into_iter().enumerate() {
            fused[index] += weights[component] / (RRF_CONSTANT + rank as f64);
        }
    }

    let mut order: Vec<usize> = (0..hits.len()).collect();
    order.sort_by(|left, right| fused[*right].total_cmp(&fused[*left]));

    let mut hits: Vec<Option<Value>> = hits.into_iter().map(Some).collect();
    order
        .into_iter()
        .skip(info.skip.unwrap_or(0))
        .take(info.take.unwrap_or(usize::MAX))
        .filter_map(|index| hits[index].take())
        .map(|hit| take_field(take_field(hit, "payload"), "payload"))
        .collect()
}

fn component_score(hit: &Value, component: usize) -> f64 {
    hit.get("payload")
        .and_then(|payload| payload.get("componentScores"))
        .and_then(|scores| scores.get(component))
        .and_then(Value::as_f64)
        .unwrap_or(f64::NAN)
}

/// 1-based dense ranks; equal scores share a rank. Missing scores rank last.
fn ranks(scores: &[f64], descending: bool) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|left, right| {
        let (left, right) = (scores[*left], scores[*right]);
        match (left.is_nan(), right.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) if descending => right.total_cmp(&left),
            (false, false) => left.total_cmp(&right),
        }
    });

    let mut ranks = vec![0usize; scores.len()];
    let mut rank = 0usize;
    let mut previous: Option<f64> = None;
    for index in order {
        let score = scores[index];
        if previous.map_or(true, |previous| previous.total_cmp(&score) != Ordering::Equal) {
            rank += 1;
        }
        ranks[index] = rank;
        previous = Some(score);
    }
    ranks
}
