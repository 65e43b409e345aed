//! Credit ledger
//!
//! Persistence of per-user credit counters and the payment log. Every balance
//! mutation is a single conditional statement or runs inside one database
//! transaction, so concurrent requests cannot overdraw a balance and a
//! redelivered payment is credited at most once.

use async_trait::async_trait;
use nerbixa_shared::{
    NewAccount, NewPaymentTransaction, PaymentTransaction, UserAccount, UserBalance,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// A verified payment to be applied to a user's balance
#[derive(Debug, Clone)]
pub struct PaymentCredit {
    /// Processor name, part of the dedupe key
    pub processor: String,
    /// Processor-side unique reference of this delivery
    pub event_ref: String,
    /// External identity of the user being credited
    pub clerk_id: String,
    /// Credits bought
    pub quantity: i32,
    pub transaction: NewPaymentTransaction,
}

/// Result of applying a payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditOutcome {
    /// Balance rolled over and transaction recorded
    Credited { balance: UserBalance, email: String },
    /// Event already processed; nothing changed
    Duplicate,
    /// No account for the tracking id; nothing written
    UserNotFound,
}

/// Storage of credit balances and payments
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Current counters, `None` when the user has no account
    async fn balance(&self, clerk_id: &str) -> BillingResult<Option<UserBalance>>;

    /// Atomically consume `price` credits if the headroom allows it.
    ///
    /// Returns the updated balance, or `None` when the user is unknown or the
    /// headroom is insufficient.
    async fn reserve(&self, clerk_id: &str, price: u32) -> BillingResult<Option<UserBalance>>;

    /// Give back credits taken by [`CreditLedger::reserve`]
    async fn release(&self, clerk_id: &str, price: u32) -> BillingResult<()>;

    /// Claim the event, roll the balance over and record the transaction
    async fn apply_payment(&self, credit: PaymentCredit) -> BillingResult<CreditOutcome>;

    /// Create the account if missing, refresh profile fields otherwise
    async fn provision(&self, clerk_id: &str, account: NewAccount) -> BillingResult<UserAccount>;

    async fn account(&self, clerk_id: &str) -> BillingResult<Option<UserAccount>>;

    /// Remove the account and its payment log. Returns false if absent.
    async fn delete_account(&self, clerk_id: &str) -> BillingResult<bool>;

    /// Payment log of a user, newest first
    async fn transactions(&self, clerk_id: &str) -> BillingResult<Vec<PaymentTransaction>>;
}

fn price_param(price: u32) -> BillingResult<i32> {
    i32::try_from(price).map_err(|_| BillingError::InvalidInput(format!("price {price} too large")))
}

fn map_unique_violation(err: sqlx::Error, what: &str) -> BillingError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some("23505") {
            return BillingError::AlreadyExists(what.to_string());
        }
    }
    BillingError::from(err)
}

// =============================================================================
// Postgres
// =============================================================================

/// Postgres-backed ledger
#[derive(Clone)]
pub struct PgCreditLedger {
    pool: PgPool,
}

impl PgCreditLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CreditLedger for PgCreditLedger {
    async fn balance(&self, clerk_id: &str) -> BillingResult<Option<UserBalance>> {
        let balance: Option<UserBalance> = sqlx::query_as(
            "SELECT used_generations, available_generations FROM users WHERE clerk_id = $1",
        )
        .bind(clerk_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(balance)
    }

    async fn reserve(&self, clerk_id: &str, price: u32) -> BillingResult<Option<UserBalance>> {
        let price = price_param(price)?;

        let balance: Option<UserBalance> = sqlx::query_as(
            r#"
            UPDATE users
            SET used_generations = used_generations + $2
            WHERE clerk_id = $1
              AND used_generations < available_generations
              AND available_generations - used_generations >= $2
            RETURNING used_generations, available_generations
            "#,
        )
        .bind(clerk_id)
        .bind(price)
        .fetch_optional(&self.pool)
        .await?;

        Ok(balance)
    }

    async fn release(&self, clerk_id: &str, price: u32) -> BillingResult<()> {
        let price = price_param(price)?;

        sqlx::query(
            "UPDATE users SET used_generations = GREATEST(used_generations - $2, 0) WHERE clerk_id = $1",
        )
        .bind(clerk_id)
        .bind(price)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn apply_payment(&self, credit: PaymentCredit) -> BillingResult<CreditOutcome> {
        let mut tx = self.pool.begin().await?;

        // Claim first; a concurrent duplicate blocks here until we commit
        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO payment_webhook_events (processor, event_ref)
            VALUES ($1, $2)
            ON CONFLICT (processor, event_ref) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&credit.processor)
        .bind(&credit.event_ref)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((event_id,)) = claimed else {
            tx.rollback().await?;
            return Ok(CreditOutcome::Duplicate);
        };

        // SET expressions see the pre-update row, so this is available - used + quantity
        let updated: Option<(i32, i32, String)> = sqlx::query_as(
            r#"
            UPDATE users
            SET available_generations = available_generations - used_generations + $2,
                used_generations = 0
            WHERE clerk_id = $1
            RETURNING used_generations, available_generations, email
            "#,
        )
        .bind(&credit.clerk_id)
        .bind(credit.quantity)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((used, available, email)) = updated else {
            tx.rollback().await?;
            return Ok(CreditOutcome::UserNotFound);
        };

        let t = &credit.transaction;
        sqlx::query(
            r#"
            INSERT INTO transactions (
                tracking_id, processor_uid, user_id, status, amount, currency,
                description, type, payment_method_type, message, paid_at, receipt_url
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&t.tracking_id)
        .bind(&t.processor_uid)
        .bind(&t.user_id)
        .bind(&t.status)
        .bind(t.amount)
        .bind(&t.currency)
        .bind(&t.description)
        .bind(&t.kind)
        .bind(&t.payment_method_type)
        .bind(&t.message)
        .bind(&t.paid_at)
        .bind(&t.receipt_url)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, &t.processor_uid))?;

        sqlx::query("UPDATE payment_webhook_events SET processing_result = 'credited' WHERE id = $1")
            .bind(event_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(CreditOutcome::Credited {
            balance: UserBalance::new(used, available),
            email,
        })
    }

    async fn provision(&self, clerk_id: &str, account: NewAccount) -> BillingResult<UserAccount> {
        let user: UserAccount = sqlx::query_as(
            r#"
            INSERT INTO users (clerk_id, email, first_name, last_name, photo)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (clerk_id) DO UPDATE SET
                email = EXCLUDED.email,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                photo = EXCLUDED.photo
            RETURNING id, clerk_id, email, first_name, last_name, photo,
                      used_generations, available_generations, created_at
            "#,
        )
        .bind(clerk_id)
        .bind(&account.email)
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(&account.photo)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, &account.email))?;

        Ok(user)
    }

    async fn account(&self, clerk_id: &str) -> BillingResult<Option<UserAccount>> {
        let user: Option<UserAccount> = sqlx::query_as(
            r#"
            SELECT id, clerk_id, email, first_name, last_name, photo,
                   used_generations, available_generations, created_at
            FROM users
            WHERE clerk_id = $1
            "#,
        )
        .bind(clerk_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn delete_account(&self, clerk_id: &str) -> BillingResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE clerk_id = $1")
            .bind(clerk_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn transactions(&self, clerk_id: &str) -> BillingResult<Vec<PaymentTransaction>> {
        let rows: Vec<PaymentTransaction> = sqlx::query_as(
            r#"
            SELECT id, tracking_id, processor_uid, user_id, status, amount, currency,
                   description, type, payment_method_type, message, paid_at,
                   receipt_url, created_at
            FROM transactions
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(clerk_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

// =============================================================================
// In-memory
// =============================================================================

#[cfg(any(test, feature = "testing"))]
pub use memory::InMemoryCreditLedger;

#[cfg(any(test, feature = "testing"))]
mod memory {
    use std::collections::{HashMap, HashSet};

    use time::OffsetDateTime;
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct State {
        users: HashMap<String, UserAccount>,
        transactions: Vec<PaymentTransaction>,
        claimed: HashSet<(String, String)>,
    }

    /// Ledger kept in process memory, with the same semantics as the
    /// Postgres one
    #[derive(Default)]
    pub struct InMemoryCreditLedger {
        state: Mutex<State>,
    }

    impl InMemoryCreditLedger {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed an account with the given counters
        pub async fn insert_user(&self, clerk_id: &str, email: &str, used: i32, available: i32) {
            let mut state = self.state.lock().await;
            state.users.insert(
                clerk_id.to_string(),
                UserAccount {
                    id: Uuid::new_v4(),
                    clerk_id: clerk_id.to_string(),
                    email: email.to_string(),
                    first_name: None,
                    last_name: None,
                    photo: None,
                    used_generations: used,
                    available_generations: available,
                    created_at: OffsetDateTime::now_utc(),
                },
            );
        }

        pub async fn transaction_count(&self) -> usize {
            self.state.lock().await.transactions.len()
        }
    }

    #[async_trait]
    impl CreditLedger for InMemoryCreditLedger {
        async fn balance(&self, clerk_id: &str) -> BillingResult<Option<UserBalance>> {
            let state = self.state.lock().await;
            Ok(state.users.get(clerk_id).map(UserAccount::balance))
        }

        async fn reserve(&self, clerk_id: &str, price: u32) -> BillingResult<Option<UserBalance>> {
            let price = price_param(price)?;
            let mut state = self.state.lock().await;
            let Some(user) = state.users.get_mut(clerk_id) else {
                return Ok(None);
            };
            let used = user.used_generations;
            let available = user.available_generations;
            if used < available && available - used >= price {
                user.used_generations += price;
                Ok(Some(user.balance()))
            } else {
                Ok(None)
            }
        }

        async fn release(&self, clerk_id: &str, price: u32) -> BillingResult<()> {
            let price = price_param(price)?;
            let mut state = self.state.lock().await;
            if let Some(user) = state.users.get_mut(clerk_id) {
                user.used_generations = (user.used_generations - price).max(0);
            }
            Ok(())
        }

        async fn apply_payment(&self, credit: PaymentCredit) -> BillingResult<CreditOutcome> {
            let mut state = self.state.lock().await;
            let key = (credit.processor.clone(), credit.event_ref.clone());
            if state.claimed.contains(&key) {
                return Ok(CreditOutcome::Duplicate);
            }
            let Some(user) = state.users.get_mut(&credit.clerk_id) else {
                return Ok(CreditOutcome::UserNotFound);
            };
            // Postgres rejects an int4 overflow the same way
            let available = user
                .available_generations
                .checked_sub(user.used_generations)
                .and_then(|headroom| headroom.checked_add(credit.quantity))
                .ok_or_else(|| BillingError::Database("integer out of range".to_string()))?;
            user.available_generations = available;
            user.used_generations = 0;
            let balance = user.balance();
            let email = user.email.clone();

            let t = credit.transaction;
            state.transactions.push(PaymentTransaction {
                id: Uuid::new_v4(),
                tracking_id: t.tracking_id,
                processor_uid: t.processor_uid,
                user_id: t.user_id,
                status: t.status,
                amount: t.amount,
                currency: t.currency,
                description: t.description,
                kind: t.kind,
                payment_method_type: t.payment_method_type,
                message: t.message,
                paid_at: t.paid_at,
                receipt_url: t.receipt_url,
                created_at: OffsetDateTime::now_utc(),
            });
            state.claimed.insert(key);

            Ok(CreditOutcome::Credited { balance, email })
        }

        async fn provision(
            &self,
            clerk_id: &str,
            account: NewAccount,
        ) -> BillingResult<UserAccount> {
            let mut state = self.state.lock().await;
            if state
                .users
                .values()
                .any(|u| u.email == account.email && u.clerk_id != clerk_id)
            {
                return Err(BillingError::AlreadyExists(account.email));
            }
            let user = state
                .users
                .entry(clerk_id.to_string())
                .or_insert_with(|| UserAccount {
                    id: Uuid::new_v4(),
                    clerk_id: clerk_id.to_string(),
                    email: String::new(),
                    first_name: None,
                    last_name: None,
                    photo: None,
                    used_generations: 0,
                    available_generations: nerbixa_shared::DEFAULT_AVAILABLE_GENERATIONS,
                    created_at: OffsetDateTime::now_utc(),
                });
            user.email = account.email;
            user.first_name = account.first_name;
            user.last_name = account.last_name;
            user.photo = account.photo;
            Ok(user.clone())
        }

        async fn account(&self, clerk_id: &str) -> BillingResult<Option<UserAccount>> {
            Ok(self.state.lock().await.users.get(clerk_id).cloned())
        }

        async fn delete_account(&self, clerk_id: &str) -> BillingResult<bool> {
            let mut state = self.state.lock().await;
            let removed = state.users.remove(clerk_id).is_some();
            state.transactions.retain(|t| t.user_id != clerk_id);
            Ok(removed)
        }

        async fn transactions(&self, clerk_id: &str) -> BillingResult<Vec<PaymentTransaction>> {
            let state = self.state.lock().await;
            Ok(state
                .transactions
                .iter()
                .rev()
                .filter(|t| t.user_id == clerk_id)
                .cloned()
                .collect())
        }
    }
}
