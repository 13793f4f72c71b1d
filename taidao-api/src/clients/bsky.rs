/// Bluesky profile lookups for the member listing
///
/// [`ProfileSource`] fetches profiles by DID; [`AppViewClient`] implements it
/// with `app.bsky.actor.getProfiles` on the public AppView.
/// [`ProfileDirectory`] keeps every profile it has seen, so each request
/// only fetches members that enrolled since the last one.

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Most actors `getProfiles` accepts per call
pub const PROFILE_BATCH_SIZE: usize = 25;

/// Most `getProfiles` calls in flight at once
pub const MAX_CONCURRENT_BATCHES: usize = 10;

/// Profile lookup failure
#[derive(Debug, Error)]
pub enum BskyError {
    #[error("AppView request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AppView returned status {0}")]
    Status(u16),
}

/// Public profile of a feed member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub did: String,

    #[serde(default)]
    pub handle: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl Profile {
    /// Profile with nothing but the DID, used when the AppView has no record
    pub fn bare(did: &str) -> Self {
        Self {
            did: did.to_string(),
            handle: String::new(),
            display_name: None,
            avatar: None,
        }
    }
}

/// Fetches profiles by DID
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Fetches up to [`PROFILE_BATCH_SIZE`] profiles
    ///
    /// Unknown DIDs are simply absent from the result.
    async fn get_profiles(&self, dids: &[String]) -> Result<Vec<Profile>, BskyError>;
}

#[derive(Debug, Deserialize)]
struct GetProfilesResponse {
    #[serde(default)]
    profiles: Vec<Profile>,
}

/// Public AppView client
#[derive(Clone)]
pub struct AppViewClient {
    client: reqwest::Client,
    base_url: String,
}

impl AppViewClient {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ProfileSource for AppViewClient {
    async fn get_profiles(&self, dids: &[String]) -> Result<Vec<Profile>, BskyError> {
        let actors: Vec<(&str, &str)> = dids.iter().map(|did| ("actors", did.as_str())).collect();

        let response = self
            .client
            .get(format!("{}/xrpc/app.bsky.actor.getProfiles", self.base_url))
            .query(&actors)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BskyError::Status(response.status().as_u16()));
        }

        Ok(response.json::<GetProfilesResponse>().await?.profiles)
    }
}

/// Cache of member profiles in front of a [`ProfileSource`]
pub struct ProfileDirectory {
    source: Arc<dyn ProfileSource>,
    cache: Mutex<HashMap<String, Profile>>,
}

impl ProfileDirectory {
    pub fn new(source: Arc<dyn ProfileSource>) -> Self {
        Self {
            source,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, did: &str) -> Option<Profile> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(did)
            .cloned()
    }

    /// Resolves `dids` to profiles, preserving their order
    ///
    /// Missing profiles are fetched in batches of [`PROFILE_BATCH_SIZE`] with
    /// at most [`MAX_CONCURRENT_BATCHES`] requests in flight. DIDs the AppView
    /// does not know come back as [`Profile::bare`] and are retried on the
    /// next call.
    ///
    /// # Errors
    ///
    /// Fails if any batch fails; profiles from batches that did succeed stay
    /// cached
    pub async fn resolve(&self, dids: &[String]) -> Result<Vec<Profile>, BskyError> {
        let missing: Vec<String> = dids
            .iter()
            .filter(|did| self.cached(did).is_none())
            .cloned()
            .collect();

        if !missing.is_empty() {
            tracing::debug!(count = missing.len(), "Fetching uncached profiles");

            let source = &self.source;
            stream::iter(missing.chunks(PROFILE_BATCH_SIZE).map(<[String]>::to_vec))
                .map(|batch| async move { source.get_profiles(&batch).await })
                .buffer_unordered(MAX_CONCURRENT_BATCHES)
                .try_for_each(|profiles| async move {
                    let mut cache = self
                        .cache
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    for profile in profiles {
                        cache.insert(profile.did.clone(), profile);
                    }
                    Ok(())
                })
                .await?;
        }

        Ok(dids
            .iter()
            .map(|did| self.cached(did).unwrap_or_else(|| Profile::bare(did)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        largest_batch: AtomicUsize,
        fail: bool,
    }

    impl CountingSource {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                largest_batch: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl ProfileSource for CountingSource {
        async fn get_profiles(&self, dids: &[String]) -> Result<Vec<Profile>, BskyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.largest_batch.fetch_max(dids.len(), Ordering::SeqCst);
            if self.fail {
                return Err(BskyError::Status(502));
            }
            Ok(dids
                .iter()
                .filter(|did| !did.ends_with("unknown"))
                .map(|did| Profile {
                    did: did.clone(),
                    handle: format!("{}.bsky.social", did.trim_start_matches("did:plc:")),
                    display_name: None,
                    avatar: None,
                })
                .collect())
        }
    }

    fn dids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("did:plc:user{}", i)).collect()
    }

    #[tokio::test]
    async fn test_resolve_batches_and_caches() {
        let source = Arc::new(CountingSource::new(false));
        let directory = ProfileDirectory::new(source.clone());
        let members = dids(60);

        let profiles = directory.resolve(&members).await.unwrap();
        assert_eq!(profiles.len(), 60);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(source.largest_batch.load(Ordering::SeqCst), PROFILE_BATCH_SIZE);

        // Order follows the input
        let returned: Vec<String> = profiles.iter().map(|p| p.did.clone()).collect();
        assert_eq!(returned, members);

        // Second call is served from the cache
        directory.resolve(&members).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unknown_dids_come_back_bare() {
        let source = Arc::new(CountingSource::new(false));
        let directory = ProfileDirectory::new(source);

        let profiles = directory
            .resolve(&["did:plc:unknown".to_string()])
            .await
            .unwrap();
        assert_eq!(profiles, vec![Profile::bare("did:plc:unknown")]);
    }

    #[tokio::test]
    async fn test_batch_failure_is_an_error() {
        let directory = ProfileDirectory::new(Arc::new(CountingSource::new(true)));
        assert!(directory.resolve(&dids(3)).await.is_err());
    }

    #[test]
    fn test_profile_json_shape() {
        let json = r#"{"did":"did:plc:a","handle":"a.bsky.social","displayName":"A","avatar":"https://cdn/a.jpg","followersCount":3}"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("A"));
        assert_eq!(profile.avatar.as_deref(), Some("https://cdn/a.jpg"));
    }
}
