use async_trait::async_trait;
use common::{CustomerId, SubscriptionId};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::customer::{CreateOutcome, Customer};
use crate::email::Email;
use crate::repository::{CustomerRepository, SubscriptionRepository};
use crate::subscription::{Subscription, SubscriptionStatus};
use crate::{DomainError, Result};

/// PostgreSQL-backed subscription store.
#[derive(Clone)]
pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the web service's migrations.
    ///
    /// Versions applied by the customers service in a shared database are
    /// left alone.
    pub async fn run_migrations(&self) -> Result<()> {
        let mut migrator = sqlx::migrate!("../../migrations/web");
        migrator.set_ignore_missing(true);
        migrator.run(&self.pool).await?;
        Ok(())
    }

    fn row_to_subscription(row: PgRow) -> Result<Subscription> {
        let status: String = row.try_get("status")?;
        Ok(Subscription {
            id: SubscriptionId::new(row.try_get("id")?),
            email: row.try_get("email")?,
            status: SubscriptionStatus::parse(&status)
                .ok_or_else(|| DomainError::Corrupt(format!("unknown status {status:?}")))?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn create(&self, email: &Email) -> Result<SubscriptionId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO subscriptions (email, status)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(email.as_str())
        .bind(SubscriptionStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return DomainError::DuplicateEmail(email.to_string());
            }
            DomainError::Database(e)
        })?;

        Ok(SubscriptionId::new(id))
    }

    async fn get_all(&self) -> Result<Vec<String>> {
        let emails: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT email FROM subscriptions
            WHERE status = $1
            ORDER BY id ASC
            "#,
        )
        .bind(SubscriptionStatus::Confirmed.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(emails)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Subscription>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, status, created_at FROM subscriptions
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_subscription).transpose()
    }

    async fn list(&self) -> Result<Vec<Subscription>> {
        let rows = sqlx::query(
            r#"
            SELECT id, email, status, created_at FROM subscriptions
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_subscription).collect()
    }

    async fn confirm(&self, email: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET status = $2
            WHERE email = $1 AND status = $3
            "#,
        )
        .bind(email)
        .bind(SubscriptionStatus::Confirmed.as_str())
        .bind(SubscriptionStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_pending_by_email(&self, email: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE email = $1 AND status = $2")
            .bind(email)
            .bind(SubscriptionStatus::Pending.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_email(&self, email: &str) -> Result<()> {
        sqlx::query("DELETE FROM subscriptions WHERE email = $1")
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_by_id(&self, id: SubscriptionId) -> Result<()> {
        sqlx::query("DELETE FROM subscriptions WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// PostgreSQL-backed customer store.
#[derive(Clone)]
pub struct PostgresCustomerRepository {
    pool: PgPool,
}

impl PostgresCustomerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the customers service's migrations.
    ///
    /// Versions applied by the web service in a shared database are left alone.
    pub async fn run_migrations(&self) -> Result<()> {
        let mut migrator = sqlx::migrate!("../../migrations/customers");
        migrator.set_ignore_missing(true);
        migrator.run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl CustomerRepository for PostgresCustomerRepository {
    async fn create_if_absent(&self, email: &Email) -> Result<CreateOutcome> {
        let id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO customers (email)
            VALUES ($1)
            ON CONFLICT (email) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(match id {
            Some(id) => CreateOutcome::Created(CustomerId::new(id)),
            None => CreateOutcome::AlreadyExists,
        })
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>> {
        let row = sqlx::query("SELECT id, email, created_at FROM customers WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> Result<Customer> {
            Ok(Customer {
                id: CustomerId::new(row.try_get("id")?),
                email: row.try_get("email")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }
}
