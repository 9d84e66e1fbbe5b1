//! Query filters and Relay-style pagination.
//!
//! Filters mirror the GraphQL `where` inputs: plain equality on columns plus
//! `has*With` predicates that follow an edge. Each edge becomes an `EXISTS`
//! subquery, so arbitrarily nested filters compile to one statement.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{DsseRow, StatementRow, SubjectRow};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// A row that can be addressed by a cursor.
pub trait Node {
    fn node_id(&self) -> &str;
}

impl Node for DsseRow {
    fn node_id(&self) -> &str {
        &self.id
    }
}

impl Node for SubjectRow {
    fn node_id(&self) -> &str {
        &self.id
    }
}

impl Node for StatementRow {
    fn node_id(&self) -> &str {
        &self.id
    }
}

/// Opaque cursor for a row id.
pub fn encode_cursor(id: &str) -> String {
    URL_SAFE_NO_PAD.encode(id.as_bytes())
}

/// Row id behind a cursor.
pub fn decode_cursor(cursor: &str) -> MetadataResult<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|e| MetadataError::InvalidCursor(e.to_string()))?;
    let id = String::from_utf8(bytes).map_err(|e| MetadataError::InvalidCursor(e.to_string()))?;
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
        return Err(MetadataError::InvalidCursor(cursor.to_string()));
    }
    Ok(id)
}

/// Pagination arguments. `first`/`after` page forward; `last`/`before` page
/// backward. With neither `first` nor `last`, every matching row is returned.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub first: Option<usize>,
    pub after: Option<String>,
    pub last: Option<usize>,
    pub before: Option<String>,
}

impl Page {
    pub fn first(n: usize) -> Self {
        Self {
            first: Some(n),
            ..Self::default()
        }
    }

    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.after = Some(cursor.into());
        self
    }

    pub(crate) fn is_backward(&self) -> bool {
        self.last.is_some() && self.first.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Edge<T> {
    pub cursor: String,
    pub node: T,
}

/// One page of results.
#[derive(Debug, Clone)]
pub struct Connection<T> {
    pub edges: Vec<Edge<T>>,
    pub page_info: PageInfo,
    pub total_count: i64,
}

impl<T: Node> Connection<T> {
    /// Build a page from rows fetched with one extra row of lookahead.
    pub(crate) fn from_rows(mut rows: Vec<T>, page: &Page, total_count: i64) -> Self {
        let mut page_info = PageInfo::default();
        if page.is_backward() {
            let limit = page.last.unwrap_or(usize::MAX);
            page_info.has_previous_page = rows.len() > limit;
            rows.truncate(limit);
            rows.reverse();
            page_info.has_next_page = page.before.is_some();
        } else {
            let limit = page.first.unwrap_or(usize::MAX);
            page_info.has_next_page = rows.len() > limit;
            rows.truncate(limit);
            page_info.has_previous_page = page.after.is_some();
        }

        let edges: Vec<Edge<T>> = rows
            .into_iter()
            .map(|node| Edge {
                cursor: encode_cursor(node.node_id()),
                node,
            })
            .collect();
        page_info.start_cursor = edges.first().map(|e| e.cursor.clone());
        page_info.end_cursor = edges.last().map(|e| e.cursor.clone());

        Self {
            edges,
            page_info,
            total_count,
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.edges.iter().map(|e| &e.node)
    }
}

/// Escape character for `LIKE` patterns. Backslash is a literal escape in
/// MySQL string literals, so a character all three dialects read the same
/// way is used instead.
const LIKE_ESCAPE: char = '!';

/// Make `%` and `_` in user input match literally.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

/// Conditions and their bound values, in placeholder order.
#[derive(Debug, Default)]
pub(crate) struct SqlFilter {
    clauses: Vec<String>,
    pub(crate) binds: Vec<String>,
    aliases: usize,
}

impl SqlFilter {
    fn alias(&mut self, prefix: &str) -> String {
        self.aliases += 1;
        format!("{prefix}{}", self.aliases)
    }

    fn eq(&mut self, column: String, value: &str) {
        self.clauses.push(format!("{column} = ?"));
        self.binds.push(value.to_string());
    }

    fn contains(&mut self, column: String, value: &str) {
        self.clauses.push(format!("{column} LIKE ? ESCAPE '{LIKE_ESCAPE}'"));
        self.binds.push(format!("%{}%", escape_like(value)));
    }

    /// Render `EXISTS (SELECT 1 FROM {table} {alias} WHERE {join} AND ...)`
    /// with the conditions `build` adds for the new alias.
    fn exists(
        &mut self,
        table: &str,
        prefix: &str,
        join: impl FnOnce(&str) -> String,
        build: impl FnOnce(&str, &mut Self),
    ) {
        let alias = self.alias(prefix);
        let outer = std::mem::take(&mut self.clauses);
        build(&alias, self);
        let inner = std::mem::replace(&mut self.clauses, outer);

        let mut sql = format!("EXISTS (SELECT 1 FROM {table} {alias} WHERE {}", join(&alias));
        for clause in inner {
            sql.push_str(" AND ");
            sql.push_str(&clause);
        }
        sql.push(')');
        self.clauses.push(sql);
    }

    pub(crate) fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            "1 = 1".to_string()
        } else {
            self.clauses.join(" AND ")
        }
    }
}

/// Filter on DSSE rows.
#[derive(Debug, Clone, Default)]
pub struct DsseFilter {
    pub id: Option<String>,
    pub gitoid_sha256: Option<String>,
    pub payload_type: Option<String>,
    pub has_statement_with: Option<Box<StatementFilter>>,
    pub has_signatures_with: Option<Box<SignatureFilter>>,
    pub has_payload_digests_with: Option<Box<DigestFilter>>,
}

/// Filter on statements.
#[derive(Debug, Clone, Default)]
pub struct StatementFilter {
    pub id: Option<String>,
    pub predicate: Option<String>,
    pub has_subjects_with: Option<Box<SubjectFilter>>,
    pub has_attestation_collections_with: Option<Box<CollectionFilter>>,
    pub has_policy_with: Option<Box<PolicyFilter>>,
    pub has_dsse_with: Option<Box<DsseFilter>>,
}

/// Filter on subjects.
#[derive(Debug, Clone, Default)]
pub struct SubjectFilter {
    pub id: Option<String>,
    pub name: Option<String>,
    pub name_contains: Option<String>,
    pub has_subject_digests_with: Option<Box<DigestFilter>>,
    pub has_statement_with: Option<Box<StatementFilter>>,
}

/// Filter on subject or payload digests.
#[derive(Debug, Clone, Default)]
pub struct DigestFilter {
    pub algorithm: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SignatureFilter {
    pub key_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CollectionFilter {
    pub name: Option<String>,
    pub has_attestations_with: Option<Box<AttestationFilter>>,
}

#[derive(Debug, Clone, Default)]
pub struct AttestationFilter {
    pub attestation_type: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PolicyFilter {
    pub name: Option<String>,
}

impl DsseFilter {
    pub(crate) fn apply(&self, alias: &str, f: &mut SqlFilter) {
        if let Some(v) = &self.id {
            f.eq(format!("{alias}.id"), v);
        }
        if let Some(v) = &self.gitoid_sha256 {
            f.eq(format!("{alias}.gitoid_sha256"), v);
        }
        if let Some(v) = &self.payload_type {
            f.eq(format!("{alias}.payload_type"), v);
        }
        if let Some(st) = &self.has_statement_with {
            f.exists(
                "statements",
                "st",
                |a| format!("{a}.id = {alias}.statement_id"),
                |a, f| st.apply(a, f),
            );
        }
        if let Some(sig) = &self.has_signatures_with {
            f.exists(
                "signatures",
                "sig",
                |a| format!("{a}.dsse_id = {alias}.id"),
                |a, f| sig.apply(a, f),
            );
        }
        if let Some(pd) = &self.has_payload_digests_with {
            f.exists(
                "payload_digests",
                "pd",
                |a| format!("{a}.dsse_id = {alias}.id"),
                |a, f| pd.apply(a, f),
            );
        }
    }

    pub(crate) fn to_sql(&self, alias: &str) -> SqlFilter {
        let mut f = SqlFilter::default();
        self.apply(alias, &mut f);
        f
    }
}

impl StatementFilter {
    pub(crate) fn apply(&self, alias: &str, f: &mut SqlFilter) {
        if let Some(v) = &self.id {
            f.eq(format!("{alias}.id"), v);
        }
        if let Some(v) = &self.predicate {
            f.eq(format!("{alias}.predicate"), v);
        }
        if let Some(sub) = &self.has_subjects_with {
            f.exists(
                "subjects",
                "sub",
                |a| format!("{a}.statement_id = {alias}.id"),
                |a, f| sub.apply(a, f),
            );
        }
        if let Some(col) = &self.has_attestation_collections_with {
            f.exists(
                "attestation_collections",
                "col",
                |a| format!("{a}.statement_id = {alias}.id"),
                |a, f| col.apply(a, f),
            );
        }
        if let Some(pol) = &self.has_policy_with {
            f.exists(
                "attestation_policies",
                "pol",
                |a| format!("{a}.statement_id = {alias}.id"),
                |a, f| pol.apply(a, f),
            );
        }
        if let Some(dsse) = &self.has_dsse_with {
            f.exists(
                "dsses",
                "ds",
                |a| format!("{a}.statement_id = {alias}.id"),
                |a, f| dsse.apply(a, f),
            );
        }
    }

    pub(crate) fn to_sql(&self, alias: &str) -> SqlFilter {
        let mut f = SqlFilter::default();
        self.apply(alias, &mut f);
        f
    }
}

impl SubjectFilter {
    pub(crate) fn apply(&self, alias: &str, f: &mut SqlFilter) {
        if let Some(v) = &self.id {
            f.eq(format!("{alias}.id"), v);
        }
        if let Some(v) = &self.name {
            f.eq(format!("{alias}.name"), v);
        }
        if let Some(v) = &self.name_contains {
            f.contains(format!("{alias}.name"), v);
        }
        if let Some(sd) = &self.has_subject_digests_with {
            f.exists(
                "subject_digests",
                "sd",
                |a| format!("{a}.subject_id = {alias}.id"),
                |a, f| sd.apply(a, f),
            );
        }
        if let Some(st) = &self.has_statement_with {
            f.exists(
                "statements",
                "st",
                |a| format!("{a}.id = {alias}.statement_id"),
                |a, f| st.apply(a, f),
            );
        }
    }

    pub(crate) fn to_sql(&self, alias: &str) -> SqlFilter {
        let mut f = SqlFilter::default();
        self.apply(alias, &mut f);
        f
    }
}

impl DigestFilter {
    fn apply(&self, alias: &str, f: &mut SqlFilter) {
        if let Some(v) = &self.algorithm {
            f.eq(format!("{alias}.algorithm"), v);
        }
        if let Some(v) = &self.value {
            f.eq(format!("{alias}.value"), v);
        }
    }
}

impl SignatureFilter {
    fn apply(&self, alias: &str, f: &mut SqlFilter) {
        if let Some(v) = &self.key_id {
            f.eq(format!("{alias}.key_id"), v);
        }
    }
}

impl CollectionFilter {
    fn apply(&self, alias: &str, f: &mut SqlFilter) {
        if let Some(v) = &self.name {
            f.eq(format!("{alias}.name"), v);
        }
        if let Some(att) = &self.has_attestations_with {
            f.exists(
                "attestations",
                "att",
                |a| format!("{a}.attestation_collection_id = {alias}.id"),
                |a, f| att.apply(a, f),
            );
        }
    }
}

impl AttestationFilter {
    fn apply(&self, alias: &str, f: &mut SqlFilter) {
        if let Some(v) = &self.attestation_type {
            f.eq(format!("{alias}.type"), v);
        }
    }
}

impl PolicyFilter {
    fn apply(&self, alias: &str, f: &mut SqlFilter) {
        if let Some(v) = &self.name {
            f.eq(format!("{alias}.name"), v);
        }
    }
}
