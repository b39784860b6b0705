//! Lazy, page-by-page enumeration of a bucket prefix.

use std::collections::VecDeque;
use std::sync::Arc;

use crazys3_storage::{ObjectStore, ObjectSummary};
use crazys3_worker::WorkItem;
use tracing::debug;

use crate::error::Result;

/// Yields [`WorkItem`]s in listing order, fetching one page at a time.
///
/// Sequence ids start at 1 and increase by one per listed object.
pub struct WorkItemStream {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
    token: Option<String>,
    page: VecDeque<ObjectSummary>,
    next_sequence: u64,
    pages: u64,
    exhausted: bool,
}

impl WorkItemStream {
    /// Starts an enumeration pass over `bucket/prefix`.
    pub fn new(store: Arc<dyn ObjectStore>, bucket: &str, prefix: &str) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            token: None,
            page: VecDeque::new(),
            next_sequence: 1,
            pages: 0,
            exhausted: false,
        }
    }

    /// The next item, or `None` when the listing is done.
    pub async fn next(&mut self) -> Result<Option<WorkItem>> {
        while self.page.is_empty() {
            if self.exhausted {
                return Ok(None);
            }
            let page = self
                .store
                .list_page(&self.bucket, &self.prefix, self.token.as_deref())
                .await?;
            self.pages += 1;
            debug!(bucket = %self.bucket, page = self.pages, objects = page.objects.len(), "listing page fetched");
            self.exhausted = page.next_token.is_none();
            self.token = page.next_token;
            self.page.extend(page.objects);
        }

        let Some(object) = self.page.pop_front() else {
            return Ok(None);
        };
        let sequence_id = self.next_sequence;
        self.next_sequence += 1;
        Ok(Some(WorkItem {
            sequence_id,
            bucket: self.bucket.clone(),
            key: object.key,
            size: object.size,
            storage_class: object.storage_class,
        }))
    }

    /// Pages fetched so far.
    pub fn pages(&self) -> u64 {
        self.pages
    }
}
