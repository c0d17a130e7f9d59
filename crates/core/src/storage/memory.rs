//! In-memory storage with a call journal.
//!
//! Used by tests and dry runs. Capabilities are configurable so the service's
//! branching on the descriptor can be exercised without a real backend, and
//! every call is journaled so tests can assert exactly what reached storage.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use super::adapter::{
    ObjectHead, PresignedUrl, StorageAdapter, StorageCapabilities, StorageDescriptor,
    join_public_url,
};
use super::error::StorageError;
use crate::storage_key::{StorageRef, validate_ref};

/// Provider name recorded for in-memory objects.
pub const MEMORY_PROVIDER: &str = "memory";

/// One journaled storage call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageCall {
    /// `write_object`
    Write(StorageRef),
    /// `read_object_range`
    ReadRange(StorageRef),
    /// `head_object`
    Head(StorageRef),
    /// `delete_object`
    Delete(StorageRef),
    /// `copy_object`
    Copy {
        /// Source.
        from: StorageRef,
        /// Destination.
        to: StorageRef,
    },
    /// `presign_put`
    PresignPut(StorageRef),
    /// `presign_get`
    PresignGet(StorageRef),
}

#[derive(Debug, Clone)]
struct StoredObject {
    body: Bytes,
    content_type: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<StorageRef, StoredObject>,
    calls: Vec<StorageCall>,
    fail_writes: bool,
    fail_deletes: bool,
}

/// Storage kept in a map.
#[derive(Debug)]
pub struct MemoryStorage {
    capabilities: StorageCapabilities,
    public_base_url: Option<String>,
    state: Mutex<State>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(StorageCapabilities {
            public_url: false,
            ..StorageCapabilities::all()
        })
    }
}

impl MemoryStorage {
    /// Creates storage with the given capabilities.
    #[must_use]
    pub fn new(capabilities: StorageCapabilities) -> Self {
        Self {
            capabilities,
            public_base_url: capabilities
                .public_url
                .then(|| "https://public.memory.test".to_string()),
            state: Mutex::new(State::default()),
        }
    }

    /// Makes every write store half of the body and then fail.
    #[must_use]
    pub fn with_failing_writes(self) -> Self {
        self.lock().fail_writes = true;
        self
    }

    /// Makes every delete fail without removing anything.
    #[must_use]
    pub fn with_failing_deletes(self) -> Self {
        self.lock().fail_deletes = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds an object without journaling the call.
    pub fn insert(&self, target: StorageRef, body: impl Into<Bytes>, content_type: Option<&str>) {
        self.lock().objects.insert(
            target,
            StoredObject {
                body: body.into(),
                content_type: content_type.map(String::from),
            },
        );
    }

    /// Current body of an object.
    #[must_use]
    pub fn object(&self, target: &StorageRef) -> Option<Bytes> {
        self.lock().objects.get(target).map(|o| o.body.clone())
    }

    /// Number of stored objects.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<StorageCall> {
        self.lock().calls.clone()
    }

    /// Clears the call journal.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn record(
        &self,
        enabled: bool,
        name: &'static str,
        refs: &[&StorageRef],
        call: StorageCall,
    ) -> Result<MutexGuard<'_, State>, StorageError> {
        if !enabled {
            return Err(StorageError::Unsupported(name));
        }
        for target in refs {
            validate_ref(target)?;
        }
        let mut state = self.lock();
        state.calls.push(call);
        Ok(state)
    }

    fn presign(target: &StorageRef, method: &str, ttl: Duration) -> PresignedUrl {
        let expires = Utc::now().timestamp().saturating_add_unsigned(ttl.as_secs());
        PresignedUrl::new(
            format!("memory://{target}?method={method}&expires={expires}"),
            method,
            ttl,
        )
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    fn descriptor(&self) -> StorageDescriptor {
        StorageDescriptor {
            provider: MEMORY_PROVIDER,
            capabilities: self.capabilities,
        }
    }

    async fn write_object(
        &self,
        target: &StorageRef,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut state = self.record(
            self.capabilities.write_object,
            "write_object",
            &[target],
            StorageCall::Write(target.clone()),
        )?;
        let failing = state.fail_writes;
        let body = if failing { body.slice(..body.len() / 2) } else { body };
        state.objects.insert(
            target.clone(),
            StoredObject {
                body,
                content_type: content_type.map(String::from),
            },
        );
        if failing {
            return Err(StorageError::operation("simulated write failure"));
        }
        Ok(())
    }

    async fn read_object_range(
        &self,
        target: &StorageRef,
        start: u64,
        end: u64,
    ) -> Result<Bytes, StorageError> {
        let state = self.record(
            self.capabilities.read_object_range,
            "read_object_range",
            &[target],
            StorageCall::ReadRange(target.clone()),
        )?;
        let object = state
            .objects
            .get(target)
            .ok_or_else(|| StorageError::not_found(target.to_string()))?;
        let len = object.body.len();
        let start = usize::try_from(start).unwrap_or(usize::MAX).min(len);
        let end = usize::try_from(end).unwrap_or(usize::MAX).min(len);
        if end <= start {
            return Ok(Bytes::new());
        }
        Ok(object.body.slice(start..end))
    }

    async fn head_object(&self, target: &StorageRef) -> Result<ObjectHead, StorageError> {
        let state = self.record(
            self.capabilities.head_object,
            "head_object",
            &[target],
            StorageCall::Head(target.clone()),
        )?;
        Ok(state
            .objects
            .get(target)
            .map_or_else(ObjectHead::missing, |object| ObjectHead {
                exists: true,
                size_bytes: Some(object.body.len() as u64),
                content_type: object.content_type.clone(),
                etag: None,
                last_modified: None,
            }))
    }

    async fn delete_object(&self, target: &StorageRef) -> Result<(), StorageError> {
        let mut state = self.record(
            self.capabilities.delete_object,
            "delete_object",
            &[target],
            StorageCall::Delete(target.clone()),
        )?;
        if state.fail_deletes {
            return Err(StorageError::operation("simulated delete failure"));
        }
        state.objects.remove(target);
        Ok(())
    }

    async fn copy_object(&self, from: &StorageRef, to: &StorageRef) -> Result<(), StorageError> {
        let mut state = self.record(
            self.capabilities.copy_object,
            "copy_object",
            &[from, to],
            StorageCall::Copy {
                from: from.clone(),
                to: to.clone(),
            },
        )?;
        let object = state
            .objects
            .get(from)
            .cloned()
            .ok_or_else(|| StorageError::not_found(from.to_string()))?;
        state.objects.insert(to.clone(), object);
        Ok(())
    }

    async fn presign_put(
        &self,
        target: &StorageRef,
        content_type: &str,
        ttl: Duration,
    ) -> Result<PresignedUrl, StorageError> {
        drop(self.record(
            self.capabilities.presign_put,
            "presign_put",
            &[target],
            StorageCall::PresignPut(target.clone()),
        )?);
        Ok(Self::presign(target, "PUT", ttl).with_header("Content-Type", content_type))
    }

    async fn presign_get(
        &self,
        target: &StorageRef,
        ttl: Duration,
    ) -> Result<PresignedUrl, StorageError> {
        drop(self.record(
            self.capabilities.presign_get,
            "presign_get",
            &[target],
            StorageCall::PresignGet(target.clone()),
        )?);
        Ok(Self::presign(target, "GET", ttl))
    }

    fn public_url(&self, target: &StorageRef) -> Option<String> {
        let base = self.public_base_url.as_deref()?;
        validate_ref(target).ok()?;
        Some(join_public_url(base, target))
    }
}
