//! GraphQL read API over the metadata store.
//!
//! Root connections (`dsses`, `subjects`, `statements`) use Relay
//! cursor pagination and accept a nested `where` filter.

pub mod inputs;
pub mod types;

use archivista_metadata::query::{DsseFilter, StatementFilter, SubjectFilter};
use archivista_metadata::{MetadataStore, Page};
use async_graphql::{Context, EmptyMutation, EmptySubscription, Error, Object, Result, Schema};
use inputs::{DsseWhereInput, StatementWhereInput, SubjectWhereInput};
use std::sync::Arc;
use types::{DsseConnection, StatementConnection, SubjectConnection};

pub type ArchivistaSchema = Schema<QueryRoot, EmptyMutation, EmptySubscription>;

pub fn build_schema(store: Arc<dyn MetadataStore>) -> ArchivistaSchema {
    Schema::build(QueryRoot, EmptyMutation, EmptySubscription)
        .data(store)
        .finish()
}

pub(crate) fn store<'a>(ctx: &Context<'a>) -> Result<&'a Arc<dyn MetadataStore>> {
    ctx.data::<Arc<dyn MetadataStore>>()
}

/// Build a page from Relay arguments. Negative counts are rejected.
pub(crate) fn page(
    after: Option<String>,
    first: Option<i32>,
    before: Option<String>,
    last: Option<i32>,
) -> Result<Page> {
    let count = |name: &str, value: Option<i32>| -> Result<Option<usize>> {
        value
            .map(|n| {
                usize::try_from(n)
                    .map_err(|_| Error::new(format!("`{name}` must not be negative")))
            })
            .transpose()
    };
    Ok(Page {
        first: count("first", first)?,
        after,
        last: count("last", last)?,
        before,
    })
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn dsses(
        &self,
        ctx: &Context<'_>,
        after: Option<String>,
        first: Option<i32>,
        before: Option<String>,
        last: Option<i32>,
        #[graphql(name = "where")] filter: Option<DsseWhereInput>,
    ) -> Result<DsseConnection> {
        let page = page(after, first, before, last)?;
        let filter: DsseFilter = filter.map(Into::into).unwrap_or_default();
        Ok(store(ctx)?.list_dsses(&filter, &page).await?.into())
    }

    async fn subjects(
        &self,
        ctx: &Context<'_>,
        after: Option<String>,
        first: Option<i32>,
        before: Option<String>,
        last: Option<i32>,
        #[graphql(name = "where")] filter: Option<SubjectWhereInput>,
    ) -> Result<SubjectConnection> {
        let page = page(after, first, before, last)?;
        let filter: SubjectFilter = filter.map(Into::into).unwrap_or_default();
        Ok(store(ctx)?.list_subjects(&filter, &page).await?.into())
    }

    async fn statements(
        &self,
        ctx: &Context<'_>,
        after: Option<String>,
        first: Option<i32>,
        before: Option<String>,
        last: Option<i32>,
        #[graphql(name = "where")] filter: Option<StatementWhereInput>,
    ) -> Result<StatementConnection> {
        let page = page(after, first, before, last)?;
        let filter: StatementFilter = filter.map(Into::into).unwrap_or_default();
        Ok(store(ctx)?.list_statements(&filter, &page).await?.into())
    }
}
