//! Generic metadata mirror: list the source, get-or-create on the
//! destination.
//!
//! One engine, instantiated per resource kind with a `prepare` function
//! that rewrites the record for the destination (the per-kind "fields not
//! carried over" lists live in [`kinds`]). Resources already present at the
//! destination are never touched; per-item failures are captured so one bad
//! record does not stop the kind.

pub mod kinds;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::{resource_pager, NamedResource, ResourceOperations};
use crate::error::{ReplicateError, Result};

/// A captured per-item failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemFailure {
    pub kind: String,
    pub name: String,
    pub message: String,
}

/// Counts for one mirrored resource kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorOutcome {
    pub kind: String,
    pub created: usize,
    pub already_present: usize,
    pub failed: Vec<ItemFailure>,
}

impl MirrorOutcome {
    fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            created: 0,
            already_present: 0,
            failed: Vec::new(),
        }
    }
}

/// Behavior switches for one mirror pass.
#[derive(Debug, Clone, Default)]
pub struct MirrorOptions {
    /// List and diff, but skip creates.
    pub dry_run: bool,

    /// Compare names case-insensitively against a prefetched destination
    /// listing instead of issuing per-name gets. Used by kinds whose names
    /// the service treats as case-insensitive.
    pub case_insensitive_names: bool,
}

/// Mirror every resource of one kind from `source` to `destination`.
///
/// Listing failures abort the pass (nothing sensible can continue without
/// the source sequence); per-item get/create failures are recorded in the
/// outcome and the pass moves on. Cancellation is checked between items.
pub async fn mirror_resources<S, D, P>(
    source: &S,
    destination: &D,
    prepare: P,
    options: &MirrorOptions,
    cancel: &CancellationToken,
) -> Result<MirrorOutcome>
where
    S: ResourceOperations,
    D: ResourceOperations<Resource = S::Resource>,
    P: Fn(&S::Resource) -> Result<S::Resource>,
{
    let kind = destination.kind();
    let mut outcome = MirrorOutcome::new(kind);

    let existing_lowercase: Option<HashSet<String>> = if options.case_insensitive_names {
        let names = resource_pager(destination)
            .collect()
            .await?
            .into_iter()
            .map(|resource| resource.name().to_lowercase())
            .collect();
        Some(names)
    } else {
        None
    };

    let mut pager = resource_pager(source);
    let mut seen_any = false;

    while let Some(resource) = pager.try_next().await? {
        if cancel.is_cancelled() {
            return Err(ReplicateError::Cancelled);
        }
        seen_any = true;
        let name = resource.name().to_string();
        info!("Copying {} '{}'...", kind, name);

        let result = mirror_one(
            destination,
            &prepare,
            &resource,
            &name,
            existing_lowercase.as_ref(),
            options,
        )
        .await;

        match result {
            Ok(true) => {
                outcome.created += 1;
                debug!(kind, name, "created");
            }
            Ok(false) => {
                outcome.already_present += 1;
                info!("Already exists");
            }
            Err(err) => {
                warn!(kind, name, "mirror failed: {}", err);
                outcome.failed.push(ItemFailure {
                    kind: kind.to_string(),
                    name,
                    message: err.to_string(),
                });
            }
        }
    }

    if !seen_any {
        info!("No {}s to copy", kind);
    }

    Ok(outcome)
}

/// Returns `Ok(true)` if the resource was created (or would be, in a dry
/// run), `Ok(false)` if it already exists.
async fn mirror_one<D, P>(
    destination: &D,
    prepare: &P,
    resource: &D::Resource,
    name: &str,
    existing_lowercase: Option<&HashSet<String>>,
    options: &MirrorOptions,
) -> Result<bool>
where
    D: ResourceOperations,
    P: Fn(&D::Resource) -> Result<D::Resource>,
{
    let exists = match existing_lowercase {
        Some(set) => set.contains(&name.to_lowercase()),
        None => destination.get(name).await?.is_some(),
    };

    if exists {
        return Ok(false);
    }

    let record = prepare(resource)?;
    if options.dry_run {
        info!("Would create {} '{}'", destination.kind(), name);
        return Ok(true);
    }

    destination.create(name, &record).await?;
    Ok(true)
}

#[cfg(test)]
pub(crate) mod fake_ops {
    //! In-memory [`ResourceOperations`] used by mirror and orchestrator
    //! tests.

    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::core::{NamedResource, Page, ResourceOperations};
    use crate::error::{ReplicateError, Result};

    pub(crate) struct FakeOps<T> {
        kind: &'static str,
        /// Insertion-ordered listing.
        pub items: Mutex<Vec<T>>,
        /// Names for which create() must fail.
        pub fail_creates: Mutex<Vec<String>>,
        /// Number of create() calls observed.
        pub creates: Mutex<Vec<String>>,
        /// Listing page size (0 = single page).
        pub page_size: usize,
    }

    impl<T: Clone + NamedResource> FakeOps<T> {
        pub fn new(kind: &'static str, items: Vec<T>) -> Self {
            Self {
                kind,
                items: Mutex::new(items),
                fail_creates: Mutex::new(Vec::new()),
                creates: Mutex::new(Vec::new()),
                page_size: 0,
            }
        }

        pub fn names(&self) -> Vec<String> {
            self.items
                .lock()
                .unwrap()
                .iter()
                .map(|i| i.name().to_string())
                .collect()
        }

        pub fn get_by_name(&self, name: &str) -> Option<T> {
            self.items
                .lock()
                .unwrap()
                .iter()
                .find(|i| i.name() == name)
                .cloned()
        }

        pub fn create_count(&self) -> usize {
            self.creates.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl<T> ResourceOperations for FakeOps<T>
    where
        T: Clone + NamedResource + Send + Sync,
    {
        type Resource = T;

        fn kind(&self) -> &'static str {
            self.kind
        }

        async fn list_page(&self, cursor: Option<&str>) -> Result<Page<T>> {
            let items = self.items.lock().unwrap();
            if self.page_size == 0 {
                return Ok(Page::last(items.clone()));
            }
            let offset: usize = cursor.map(|c| c.parse().unwrap_or(0)).unwrap_or(0);
            let page: Vec<T> = items.iter().skip(offset).take(self.page_size).cloned().collect();
            let next_offset = offset + page.len();
            let next = (next_offset < items.len()).then(|| next_offset.to_string());
            Ok(Page { items: page, next })
        }

        async fn get(&self, name: &str) -> Result<Option<T>> {
            Ok(self.get_by_name(name))
        }

        async fn create(&self, name: &str, resource: &T) -> Result<T> {
            if self.fail_creates.lock().unwrap().iter().any(|n| n == name) {
                return Err(ReplicateError::Api {
                    status: 500,
                    code: "InternalError".into(),
                    message: format!("injected failure for {}", name),
                });
            }
            self.creates.lock().unwrap().push(name.to_string());
            self.items.lock().unwrap().push(resource.clone());
            Ok(resource.clone())
        }
    }
}
