//! Account and campaign listing with cursor pagination.

use reqwest::Url;
use serde::de::DeserializeOwned;

use crate::error::PlatformError;
use crate::types::{AdAccount, Campaign, CampaignRow, ListEnvelope};

use super::{account_segment, GraphClient, MAX_PAGES};

impl GraphClient {
    /// Lists every ad account visible to the token, following `paging.next`.
    ///
    /// # Errors
    ///
    /// Propagates request failures; returns [`PlatformError::PaginationLimit`]
    /// if the platform keeps handing out cursors past [`MAX_PAGES`].
    pub async fn list_ad_accounts(&self) -> Result<Vec<AdAccount>, PlatformError> {
        let mut url = self.endpoint("me/adaccounts")?;
        url.query_pairs_mut()
            .append_pair("fields", "name,id")
            .append_pair("limit", "100");
        self.fetch_all_pages(url, "list ad accounts").await
    }

    /// Lists the account's campaigns with `effective_status = ACTIVE`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::list_ad_accounts`].
    pub async fn list_campaigns(&self, account_id: &str) -> Result<Vec<Campaign>, PlatformError> {
        let mut url = self.endpoint(&format!("{}/campaigns", account_segment(account_id)?))?;
        url.query_pairs_mut()
            .append_pair("fields", "name,promoted_object")
            .append_pair("effective_status", "[\"ACTIVE\"]")
            .append_pair("limit", "100");
        let rows: Vec<CampaignRow> = self.fetch_all_pages(url, "list campaigns").await?;
        Ok(rows.into_iter().map(Campaign::from).collect())
    }

    async fn fetch_all_pages<T: DeserializeOwned>(
        &self,
        first: Url,
        operation: &str,
    ) -> Result<Vec<T>, PlatformError> {
        let mut items = Vec::new();
        let mut next = Some(first);
        let mut pages = 0usize;

        while let Some(url) = next.take() {
            pages += 1;
            if pages > MAX_PAGES {
                return Err(PlatformError::PaginationLimit {
                    operation: operation.to_owned(),
                    max_pages: MAX_PAGES,
                });
            }

            let page: ListEnvelope<T> = Self::send_json(self.get(url), operation).await?;
            let page_len = page.data.len();
            items.extend(page.data);

            // An empty page with a cursor would loop forever on some endpoints.
            next = match page.paging.and_then(|p| p.next) {
                Some(raw) if page_len > 0 => Some(Url::parse(&raw).map_err(|e| {
                    PlatformError::UnexpectedResponse {
                        operation: operation.to_owned(),
                        reason: format!("invalid paging.next '{raw}': {e}"),
                    }
                })?),
                _ => None,
            };
        }

        tracing::debug!(operation, pages, items = items.len(), "pagination complete");
        Ok(items)
    }
}
