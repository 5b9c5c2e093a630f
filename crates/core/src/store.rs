use crate::error::StoreError;
use crate::models::IndexSelection;
use serde_json::Value;
use std::collections::HashMap;

pub const REQUEST_CHARGE_HEADER: &str = "x-ms-request-charge";

/// Materialised result of one query: all rows, plus the headers of the last
/// response page.
#[derive(Debug, Clone, Default)]
pub struct QueryResponse {
    pub rows: Vec<Value>,
    pub headers: HashMap<String, String>,
}

impl QueryResponse {
    pub fn request_charge(&self, container: &str) -> Result<f64, StoreError> {
        let raw = self
            .headers
            .get(REQUEST_CHARGE_HEADER)
            .ok_or_else(|| StoreError::BackendResponse {
                container: container.to_string(),
                details: format!("missing {REQUEST_CHARGE_HEADER} header"),
            })?;

        raw.trim()
            .parse::<f64>()
            .map_err(|error| StoreError::BackendResponse {
                container: container.to_string(),
                details: format!("unreadable {REQUEST_CHARGE_HEADER} {raw:?}: {error}"),
            })
    }
}

/// The three containers a session queries, one per indexing policy.
#[derive(Debug, Clone)]
pub struct ContainerSet<C> {
    pub no_index: C,
    pub qflat: C,
    pub diskann: C,
}

impl<C> ContainerSet<C> {
    pub fn resolve(&self, selection: IndexSelection) -> &C {
        match selection {
            IndexSelection::NoIndex => &self.no_index,
            IndexSelection::QuantizedFlat => &self.qflat,
            IndexSelection::DiskAnn => &self.diskann,
        }
    }

    pub fn into_vec(self) -> Vec<C> {
        vec![self.no_index, self.qflat, self.diskann]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn selections_resolve_to_distinct_containers() {
        let set = ContainerSet {
            no_index: "search",
            qflat: "search_qflat",
            diskann: "search_diskann",
        };

        let resolved: HashSet<_> = IndexSelection::ALL
            .into_iter()
            .map(|selection| *set.resolve(selection))
            .collect();

        assert_eq!(resolved.len(), 3);
        assert_eq!(*set.resolve(IndexSelection::DiskAnn), "search_diskann");
    }

    #[test]
    fn request_charge_is_parsed_from_headers() -> Result<(), StoreError> {
        let mut response = QueryResponse::default();
        response
            .headers
            .insert(REQUEST_CHARGE_HEADER.to_string(), "12.38".to_string());
        assert_eq!(response.request_charge("search")?, 12.38);

        response
            .headers
            .insert(REQUEST_CHARGE_HEADER.to_string(), "n/a".to_string());
        assert!(response.request_charge("search").is_err());
        Ok(())
    }
}
