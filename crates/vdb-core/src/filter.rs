/// A predicate over one integer scalar field, pushed into the vector
/// index's traversal rather than applied after search.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FilterExpr {
    pub field: String,
    pub op: FilterOp,
    pub value: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
}

impl FilterOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "=" | "EQUAL" => Some(Self::Equal),
            "!=" | "NOT_EQUAL" => Some(Self::NotEqual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub top_k: usize,
    pub ef_search: Option<usize>,
    pub filter: Option<FilterExpr>,
}
