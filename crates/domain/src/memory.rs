use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{CustomerId, SubscriptionId};
use tokio::sync::RwLock;

use crate::customer::{CreateOutcome, Customer};
use crate::email::Email;
use crate::repository::{CustomerRepository, SubscriptionRepository};
use crate::subscription::{Subscription, SubscriptionStatus};
use crate::{DomainError, Result};

/// In-memory subscription store for testing.
///
/// Keeps insertion order so listings match the Postgres implementation's
/// `ORDER BY id`.
#[derive(Clone, Default)]
pub struct InMemorySubscriptionRepository {
    rows: Arc<RwLock<Vec<Subscription>>>,
    next_id: Arc<AtomicI64>,
    fail_on_create: Arc<AtomicBool>,
    fail_on_read: Arc<AtomicBool>,
}

impl InMemorySubscriptionRepository {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `create` calls fail with [`DomainError::Unavailable`].
    pub fn set_fail_on_create(&self, fail: bool) {
        self.fail_on_create.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent reads fail with [`DomainError::Unavailable`].
    pub fn set_fail_on_read(&self, fail: bool) {
        self.fail_on_read.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of rows in any status.
    pub async fn count(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Inserts a row directly in the given status.
    pub async fn insert_with_status(
        &self,
        email: &Email,
        status: SubscriptionStatus,
    ) -> Result<SubscriptionId> {
        let id = self.create(email).await?;
        if status == SubscriptionStatus::Confirmed {
            self.confirm(email.as_str()).await?;
        }
        Ok(id)
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_on_read.load(Ordering::SeqCst) {
            return Err(DomainError::Unavailable("subscription store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn create(&self, email: &Email) -> Result<SubscriptionId> {
        if self.fail_on_create.load(Ordering::SeqCst) {
            return Err(DomainError::Unavailable("subscription store offline".into()));
        }

        let mut rows = self.rows.write().await;
        if rows.iter().any(|row| row.email == email.as_str()) {
            return Err(DomainError::DuplicateEmail(email.to_string()));
        }

        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        rows.push(Subscription {
            id,
            email: email.to_string(),
            status: SubscriptionStatus::Pending,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn get_all(&self) -> Result<Vec<String>> {
        self.check_read()?;
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|row| row.is_confirmed())
            .map(|row| row.email.clone())
            .collect())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Subscription>> {
        self.check_read()?;
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .find(|row| row.email == email)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Subscription>> {
        self.check_read()?;
        Ok(self.rows.read().await.clone())
    }

    async fn confirm(&self, email: &str) -> Result<bool> {
        let mut rows = self.rows.write().await;
        match rows
            .iter_mut()
            .find(|row| row.email == email && row.status.can_confirm())
        {
            Some(row) => {
                row.status = SubscriptionStatus::Confirmed;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_pending_by_email(&self, email: &str) -> Result<bool> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|row| !(row.email == email && row.status.can_compensate()));
        Ok(rows.len() < before)
    }

    async fn delete_by_email(&self, email: &str) -> Result<()> {
        self.rows.write().await.retain(|row| row.email != email);
        Ok(())
    }

    async fn delete_by_id(&self, id: SubscriptionId) -> Result<()> {
        self.rows.write().await.retain(|row| row.id != id);
        Ok(())
    }
}

/// In-memory customer store for testing.
#[derive(Clone, Default)]
pub struct InMemoryCustomerRepository {
    rows: Arc<RwLock<Vec<Customer>>>,
    next_id: Arc<AtomicI64>,
    fail_on_create: Arc<AtomicBool>,
}

impl InMemoryCustomerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent creates fail with [`DomainError::Unavailable`].
    pub fn set_fail_on_create(&self, fail: bool) {
        self.fail_on_create.store(fail, Ordering::SeqCst);
    }

    pub async fn count(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl CustomerRepository for InMemoryCustomerRepository {
    async fn create_if_absent(&self, email: &Email) -> Result<CreateOutcome> {
        if self.fail_on_create.load(Ordering::SeqCst) {
            return Err(DomainError::Unavailable("customer store offline".into()));
        }

        let mut rows = self.rows.write().await;
        if rows.iter().any(|row| row.email == email.as_str()) {
            return Ok(CreateOutcome::AlreadyExists);
        }

        let id = CustomerId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        rows.push(Customer {
            id,
            email: email.to_string(),
            created_at: Utc::now(),
        });
        Ok(CreateOutcome::Created(id))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .find(|row| row.email == email)
            .cloned())
    }
}
