//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::error::{JobError, Result};
use crate::traits::store::{JobStore, QuotaGuard};
use crate::types::{
    job::{Job, JobId, OwnerId},
    quota::{Admission, Caller, QuotaRecord},
};

/// In-memory job storage.
///
/// Useful for testing and development. Not suitable for production
/// as data is lost on restart.
pub struct MemoryStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Get the number of stored jobs.
    pub fn job_count(&self) -> usize {
        self.jobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        self.jobs.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if jobs.contains_key(&job.id) {
            return Err(JobError::storage(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("job {} already exists", job.id),
            )));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn save_job(&self, job: &Job) -> Result<()> {
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>> {
        Ok(self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned())
    }

    async fn list_jobs(&self, owner: &OwnerId, limit: usize, offset: usize) -> Result<Vec<Job>> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        let mut owned: Vec<&Job> = jobs.values().filter(|j| &j.owner_id == owner).collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(owned
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// In-memory quota guard.
///
/// A single mutex around the counters makes check-and-increment atomic.
pub struct MemoryQuotaGuard {
    records: Mutex<HashMap<OwnerId, QuotaRecord>>,
    clock: Clock,
}

impl Default for MemoryQuotaGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQuotaGuard {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }

    /// Use a custom time source (for exercising daily rollover).
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Force the usage counter for an owner, creating the record if needed.
    pub fn set_used(&self, caller: &Caller, used: u32) {
        let now = (self.clock)();
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let record = records
            .entry(caller.owner_id.clone())
            .or_insert_with(|| QuotaRecord::new(caller.entitlements.limit(), now));
        record.used = used;
    }

    fn with_record<T>(&self, caller: &Caller, f: impl FnOnce(&mut QuotaRecord, DateTime<Utc>) -> T) -> T {
        let now = (self.clock)();
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let record = records
            .entry(caller.owner_id.clone())
            .or_insert_with(|| QuotaRecord::new(caller.entitlements.limit(), now));
        // Entitlements may change between calls
        record.limit = caller.entitlements.limit();
        record.roll_over(now);
        f(record, now)
    }
}

#[async_trait]
impl QuotaGuard for MemoryQuotaGuard {
    async fn admit(&self, caller: &Caller, requested: u32) -> Result<Admission> {
        Ok(self.with_record(caller, |record, now| record.try_admit(requested, now)))
    }

    async fn status(&self, caller: &Caller) -> Result<QuotaRecord> {
        Ok(self.with_record(caller, |record, _| record.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::quota::{DenialReason, Entitlements};
    use chrono::TimeZone;

    fn caller(limit: u32) -> Caller {
        Caller::new(
            "owner-1",
            Entitlements {
                daily_extraction_limit: limit,
                can_use_csv_upload: false,
                is_unlimited: false,
            },
        )
    }

    #[tokio::test]
    async fn test_job_crud() {
        let store = MemoryStore::new();
        let mut job = Job::new(OwnerId::new("a"), vec!["https://example.com".into()]);

        store.create_job(&job).await.unwrap();
        assert!(store.create_job(&job).await.is_err());

        job.mark_processing();
        store.save_job(&job).await.unwrap();

        let loaded = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(loaded, job);
        assert!(store.get_job(JobId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first_scoped_to_owner() {
        let store = MemoryStore::new();
        let owner = OwnerId::new("a");
        let mut ids = Vec::new();
        for i in 0..5 {
            let mut job = Job::new(owner.clone(), vec![format!("https://site{i}.com")]);
            job.created_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, i, 0).unwrap();
            ids.push(job.id);
            store.create_job(&job).await.unwrap();
        }
        store
            .create_job(&Job::new(OwnerId::new("b"), vec!["https://other.com".into()]))
            .await
            .unwrap();

        let page = store.list_jobs(&owner, 2, 1).await.unwrap();
        assert_eq!(page.iter().map(|j| j.id).collect::<Vec<_>>(), vec![ids[3], ids[2]]);

        let all = store.list_jobs(&owner, 100, 0).await.unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn test_quota_admission_is_all_or_nothing() {
        let guard = MemoryQuotaGuard::new();
        let caller = caller(3);

        assert!(guard.admit(&caller, 2).await.unwrap().is_allowed());
        assert_eq!(
            guard.admit(&caller, 2).await.unwrap(),
            Admission::Denied(DenialReason::BatchTooLarge {
                requested: 2,
                remaining: 1
            })
        );
        assert_eq!(guard.status(&caller).await.unwrap().used, 2);
    }

    #[tokio::test]
    async fn test_quota_rolls_over_at_midnight() {
        let now = Arc::new(Mutex::new(Utc.with_ymd_and_hms(2026, 5, 1, 22, 0, 0).unwrap()));
        let clock_now = now.clone();
        let guard = MemoryQuotaGuard::with_clock(Arc::new(move || *clock_now.lock().unwrap()));
        let caller = caller(1);

        assert!(guard.admit(&caller, 1).await.unwrap().is_allowed());
        assert!(!guard.admit(&caller, 1).await.unwrap().is_allowed());

        *now.lock().unwrap() = Utc.with_ymd_and_hms(2026, 5, 2, 0, 0, 1).unwrap();
        assert!(guard.admit(&caller, 1).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_concurrent_admits_never_exceed_limit() {
        let guard = Arc::new(MemoryQuotaGuard::new());
        let caller = caller(10);

        let mut handles = Vec::new();
        for _ in 0..50 {
            let guard = guard.clone();
            let caller = caller.clone();
            handles.push(tokio::spawn(async move { guard.admit(&caller, 1).await.unwrap() }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap().is_allowed() {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 10);
        assert_eq!(guard.status(&caller).await.unwrap().used, 10);
    }
}
