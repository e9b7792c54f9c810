//! Result containers produced by terminal query operations

use serde::Serialize;
use serde_json::{Map, Value};

/// A fetched row: column name to value
pub type Row = Map<String, Value>;

/// Canonical comparison key for a column value.
///
/// Null never matches anything, so it has no key. Strings compare by their
/// contents and every other value by its JSON rendering, which lets `5` and
/// `"5"` refer to the same row.
pub fn match_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Ordered rows returned by a terminal query
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Collection {
    rows: Vec<Row>,
}

impl Collection {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Row] {
        &mut self.rows
    }

    /// Map every row into another value
    pub fn map<T, F>(&self, f: F) -> Vec<T>
    where
        F: FnMut(&Row) -> T,
    {
        self.rows.iter().map(f).collect()
    }

    /// Values of one column across all rows (missing columns yield null)
    pub fn pluck(&self, column: &str) -> Vec<Value> {
        self.map(|row| row.get(column).cloned().unwrap_or(Value::Null))
    }

    pub fn into_vec(self) -> Vec<Row> {
        self.rows
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.rows.iter().cloned().map(Value::Object).collect())
    }
}

impl IntoIterator for Collection {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl From<Vec<Row>> for Collection {
    fn from(rows: Vec<Row>) -> Self {
        Self::new(rows)
    }
}

/// Outcome of a fetch: a single row when the session was limited to one
/// result, otherwise a collection
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    One(Option<Row>),
    Many(Collection),
}

impl Fetched {
    /// Wrap executed rows, unwrapping the first one for single-row sessions
    pub(crate) fn from_rows(rows: Vec<Row>, single: bool) -> Self {
        if single {
            Fetched::One(rows.into_iter().next())
        } else {
            Fetched::Many(Collection::new(rows))
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Fetched::One(row) => usize::from(row.is_some()),
            Fetched::Many(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Row] {
        match self {
            Fetched::One(Some(row)) => std::slice::from_mut(row),
            Fetched::One(None) => &mut [],
            Fetched::Many(rows) => rows.rows_mut(),
        }
    }

    /// The single row, or the first row of a collection
    pub fn into_one(self) -> Option<Row> {
        match self {
            Fetched::One(row) => row,
            Fetched::Many(rows) => rows.into_iter().next(),
        }
    }

    pub fn into_collection(self) -> Collection {
        match self {
            Fetched::One(row) => Collection::new(row.into_iter().collect()),
            Fetched::Many(rows) => rows,
        }
    }
}

/// A page of results plus pagination metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated {
    pub total: u64,
    pub current_page: u64,
    pub per_page: u64,
    pub last_page: u64,
    pub data: Collection,
}

impl Paginated {
    pub fn new(total: u64, current_page: u64, per_page: u64, data: Collection) -> Self {
        Self {
            total,
            current_page,
            per_page,
            last_page: crate::query::pagination::last_page(total, per_page),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_match_key_treats_numbers_and_strings_alike() {
        assert_eq!(match_key(&json!(5)), match_key(&json!("5")));
        assert_eq!(match_key(&Value::Null), None);
    }

    #[test]
    fn test_single_fetch_unwraps_first_row() {
        let rows = vec![row(json!({"id": 1})), row(json!({"id": 2}))];
        let fetched = Fetched::from_rows(rows, true);
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched.into_one(), Some(row(json!({"id": 1}))));
    }

    #[test]
    fn test_pagination_metadata() {
        let page = Paginated::new(11, 2, 5, Collection::default());
        assert_eq!(page.last_page, 3);

        let empty = Paginated::new(0, 1, 5, Collection::default());
        assert_eq!(empty.last_page, 0);

        let serialized = serde_json::to_value(&page).unwrap();
        assert_eq!(serialized["currentPage"], json!(2));
        assert_eq!(serialized["data"], json!([]));
    }

    #[test]
    fn test_pluck_fills_missing_columns_with_null() {
        let rows = Collection::new(vec![row(json!({"id": 1})), row(json!({"name": "x"}))]);
        assert_eq!(rows.pluck("id"), vec![json!(1), Value::Null]);
    }
}
