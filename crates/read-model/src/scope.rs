//! Composable query scopes.
//!
//! Filters and sorts arrive from the HTTP boundary as free-form maps. This
//! module is where they are narrowed to typed options and folded into a
//! [`Query`]. Identifiers in the resulting query always come from an entity
//! [`Schema`]; caller-supplied strings only ever travel as bound parameters.
//!
//! A scope that receives input it cannot use is skipped, never failed:
//! an unknown sort key, a bad direction, a malformed date or an unknown
//! filter column silently disables that one scope.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::error::ScopeError;
use crate::model::Schema;

/// Filter key joined against the category title.
pub const CATEGORY_KEY: &str = "category";
/// Lower bound of the publish date range.
pub const START_DATE_KEY: &str = "start_date";
/// Upper bound of the publish date range.
pub const END_DATE_KEY: &str = "end_date";

/// A scalar equality filter value.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl FilterValue {
    /// Converts a JSON scalar. Arrays, objects and null have no equality meaning.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Float)),
            _ => None,
        }
    }

    /// Returns the value as text, if it is a string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Caller filters, split into the reserved keys and a plain equality bag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOptions {
    category: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    equals: BTreeMap<String, FilterValue>,
}

impl FilterOptions {
    /// Creates empty filter options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds options from a decoded JSON map, routing reserved keys.
    pub fn from_json_map<I, K>(map: I) -> Self
    where
        I: IntoIterator<Item = (K, serde_json::Value)>,
        K: Into<String>,
    {
        let mut options = Self::new();
        for (key, value) in map {
            let key = key.into();
            match FilterValue::from_json(&value) {
                Some(value) => options.insert(key, value),
                None => tracing::debug!(key = %key, "dropping non-scalar filter value"),
            }
        }
        options
    }

    /// Adds a filter. `category`, `start_date` and `end_date` only accept text
    /// and are kept out of the equality bag.
    pub fn insert(&mut self, key: impl Into<String>, value: FilterValue) {
        let key = key.into();
        if !matches!(key.as_str(), CATEGORY_KEY | START_DATE_KEY | END_DATE_KEY) {
            self.equals.insert(key, value);
            return;
        }
        let FilterValue::Text(text) = value else {
            tracing::debug!(key = %key, "reserved filter expects text, dropping");
            return;
        };
        match key.as_str() {
            CATEGORY_KEY => self.category = Some(text),
            START_DATE_KEY => self.start_date = Some(text),
            _ => self.end_date = Some(text),
        }
    }

    /// Adds an equality filter on a root column.
    pub fn with_eq(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.insert(key, value.into());
        self
    }

    /// Restricts results to posts in the category with this title.
    pub fn with_category(mut self, title: impl Into<String>) -> Self {
        self.category = Some(title.into());
        self
    }

    /// Sets the `MM/DD/YY` publish date bounds.
    pub fn with_dates(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start_date = Some(start.into());
        self.end_date = Some(end.into());
        self
    }

    /// Returns the category title filter, if set.
    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    /// Returns the raw start date, if set.
    pub fn start_date(&self) -> Option<&str> {
        self.start_date.as_deref()
    }

    /// Returns the raw end date, if set.
    pub fn end_date(&self) -> Option<&str> {
        self.end_date.as_deref()
    }

    /// Returns the equality filters keyed by column name.
    pub fn equals(&self) -> &BTreeMap<String, FilterValue> {
        &self.equals
    }

    /// Returns true when no filter of any kind is set.
    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.equals.is_empty()
    }
}

/// The only keys results may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKey {
    Views,
    PublishDate,
}

impl FromStr for SortKey {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "views" => Ok(Self::Views),
            "publishDate" => Ok(Self::PublishDate),
            other => Err(ScopeError::UnknownSortKey(other.to_string())),
        }
    }
}

/// Sort direction. `Default` is the empty direction and leaves the database default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Default,
    Asc,
    Desc,
}

impl Direction {
    pub(crate) fn as_sql(&self) -> &'static str {
        match self {
            Self::Default => "",
            Self::Asc => " ASC",
            Self::Desc => " DESC",
        }
    }
}

impl FromStr for Direction {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(Self::Default),
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(ScopeError::UnknownDirection(other.to_string())),
        }
    }
}

/// Ordered sort instructions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortOptions {
    keys: Vec<(SortKey, Direction)>,
}

impl SortOptions {
    /// Creates options with no sort keys.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `key -> direction` pairs, dropping each invalid pair on its own.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = Self::new();
        for (key, direction) in pairs {
            let parsed = key.as_ref().parse::<SortKey>().and_then(|key| {
                direction
                    .as_ref()
                    .parse::<Direction>()
                    .map(|direction| (key, direction))
            });
            match parsed {
                Ok((key, direction)) => options.keys.push((key, direction)),
                Err(reason) => tracing::debug!(%reason, "dropping sort option"),
            }
        }
        options
    }

    /// Appends a sort key after the existing ones.
    pub fn by(mut self, key: SortKey, direction: Direction) -> Self {
        self.keys.push((key, direction));
        self
    }

    /// Iterates sort keys in the order they were added.
    pub fn iter(&self) -> impl Iterator<Item = &(SortKey, Direction)> {
        self.keys.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Inclusive publish date bounds: start of the first day to 23:59:59 of the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub const FORMAT: &'static str = "%m/%d/%y";

    /// Parses both bounds. The end bound covers the whole of its day.
    pub fn parse(start: &str, end: &str) -> Result<Self, ScopeError> {
        let start_day = parse_day(start)?;
        let end_day = parse_day(end)?;
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59)
            .ok_or_else(|| ScopeError::MalformedDate(end.to_string()))?;

        Ok(Self {
            start: start_day.and_time(NaiveTime::MIN).and_utc(),
            end: end_day.and_time(end_of_day).and_utc(),
        })
    }
}

fn parse_day(raw: &str) -> Result<NaiveDate, ScopeError> {
    NaiveDate::parse_from_str(raw, DateRange::FORMAT)
        .map_err(|_| ScopeError::MalformedDate(raw.to_string()))
}

/// 1-based page window. A zero page means the first page, a zero limit means no cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: u32,
    limit: u32,
}

impl Pagination {
    /// Creates a window. Page 0 is treated as page 1.
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit,
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Returns the SQL row cap; a zero limit means no cap.
    pub fn row_limit(&self) -> Option<u64> {
        (self.limit > 0).then_some(u64::from(self.limit))
    }

    /// Returns the number of rows skipped before this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

/// A qualified column reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub table: &'static str,
    pub name: &'static str,
}

impl Column {
    pub const fn new(table: &'static str, name: &'static str) -> Self {
        Self { table, name }
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table, self.name)
    }
}

/// Title column matched by the category scope.
pub const CATEGORY_TITLE: Column = Column::new("categories", "title");

/// A WHERE condition. Values are always bound, never inlined.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq { column: Column, value: FilterValue },
    Between { column: Column, range: DateRange },
}

/// A join the root table can take part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Join {
    /// Root -> post_categories -> categories, keyed by the link column.
    Categories { link_column: &'static str },
}

/// Accumulated query state that scopes transform.
#[derive(Debug, Clone)]
pub struct Query {
    schema: Schema,
    joins: Vec<Join>,
    predicates: Vec<Predicate>,
    order: Vec<(Column, Direction)>,
    limit: Option<u64>,
    offset: u64,
}

/// A single query transformation.
pub type Scope = Box<dyn FnOnce(Query) -> Query + Send>;

impl Query {
    /// Creates an empty query over the given schema.
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            joins: Vec::new(),
            predicates: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    /// Applies scopes in order.
    pub fn scopes(self, scopes: impl IntoIterator<Item = Scope>) -> Self {
        scopes.into_iter().fold(self, |query, scope| scope(query))
    }

    /// Adds a join. Joining the same table twice is a no-op.
    pub fn join(mut self, join: Join) -> Self {
        if !self.joins.contains(&join) {
            self.joins.push(join);
        }
        self
    }

    /// Adds a predicate, combined with the others by AND.
    pub fn and_where(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Appends an ORDER BY term.
    pub fn order_by(mut self, column: Column, direction: Direction) -> Self {
        self.order.push((column, direction));
        self
    }

    /// Sets the row cap and offset.
    pub fn window(mut self, limit: Option<u64>, offset: u64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// Returns the root table schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn root(&self) -> &'static str {
        self.schema.table
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn order(&self) -> &[(Column, Direction)] {
        &self.order
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// Equality filters on allow-listed root columns.
pub fn filter(equals: BTreeMap<String, FilterValue>) -> Scope {
    Box::new(move |query| {
        equals.into_iter().fold(query, |query, (key, value)| {
            match query.schema().column(&key) {
                Some(name) => {
                    let column = Column::new(query.root(), name);
                    query.and_where(Predicate::Eq { column, value })
                }
                None => {
                    tracing::debug!(table = query.root(), key = %key, "dropping unknown filter column");
                    query
                }
            }
        })
    })
}

/// Restricts to rows linked to a category with exactly this title.
pub fn category(title: Option<String>) -> Scope {
    Box::new(move |query| {
        let Some(title) = title else {
            return query;
        };
        let Some(link_column) = query.schema().category_link else {
            tracing::debug!(table = query.root(), "category filter not supported, skipping");
            return query;
        };
        query
            .join(Join::Categories { link_column })
            .and_where(Predicate::Eq {
                column: CATEGORY_TITLE,
                value: FilterValue::Text(title),
            })
    })
}

/// Inclusive publish date range. Needs both bounds; bad dates skip the scope.
pub fn publish_date(start: Option<String>, end: Option<String>) -> Scope {
    Box::new(move |query| {
        let (Some(start), Some(end)) = (start, end) else {
            return query;
        };
        let Some(name) = query.schema().published_column else {
            return query;
        };
        match DateRange::parse(&start, &end) {
            Ok(range) => {
                let column = Column::new(query.root(), name);
                query.and_where(Predicate::Between { column, range })
            }
            Err(reason) => {
                tracing::debug!(%reason, "skipping publish date filter");
                query
            }
        }
    })
}

/// Limits the query to one page of results.
pub fn paginate(page: u32, limit: u32) -> Scope {
    Box::new(move |query| {
        let window = Pagination::new(page, limit);
        query.window(window.row_limit(), window.offset())
    })
}

/// Orders by the sort keys the root table has columns for.
pub fn sort(options: SortOptions) -> Scope {
    Box::new(move |query| {
        options
            .keys
            .into_iter()
            .fold(query, |query, (key, direction)| {
                match query.schema().sort_column(key) {
                    Some(name) => {
                        let column = Column::new(query.root(), name);
                        query.order_by(column, direction)
                    }
                    None => query,
                }
            })
    })
}

/// The full scope chain: filter, category, date range, paginate, sort.
pub fn pipeline(filters: &FilterOptions, page: u32, limit: u32, sorts: &SortOptions) -> Vec<Scope> {
    vec![
        filter(filters.equals.clone()),
        category(filters.category.clone()),
        publish_date(filters.start_date.clone(), filters.end_date.clone()),
        paginate(page, limit),
        sort(sorts.clone()),
    ]
}
