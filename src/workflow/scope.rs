//! Transaction scope for the two terminal run modes.
//!
//! In transactional mode every store step borrows the run's single transaction. In
//! non-transactional mode each store step begins its own transaction and commits it as
//! soon as the step succeeds, so work done by earlier steps survives a later failure.

use dioxus_logger::tracing;
use sea_orm::{DatabaseTransaction, TransactionTrait};

use crate::{error::Error, workflow::report::Phase};

pub(crate) enum Scope<'a, D> {
    /// Every step runs inside one caller-owned transaction
    Shared(&'a DatabaseTransaction),
    /// Every step begins and commits its own transaction
    PerStep(&'a D),
}

impl<'a, D> Scope<'a, D>
where
    D: TransactionTrait<Transaction = DatabaseTransaction>,
{
    /// Transaction for the next store step
    pub(crate) async fn begin(&self, phase: Phase, step: &str) -> Result<StepTxn<'a>, Error> {
        match *self {
            Scope::Shared(txn) => Ok(StepTxn::Borrowed(txn)),
            Scope::PerStep(db) => db
                .begin()
                .await
                .map(StepTxn::Owned)
                .map_err(|e| Error::execution_failed(phase, step, e)),
        }
    }
}

pub(crate) enum StepTxn<'a> {
    Borrowed(&'a DatabaseTransaction),
    Owned(DatabaseTransaction),
}

impl StepTxn<'_> {
    pub(crate) fn as_ref(&self) -> &DatabaseTransaction {
        match self {
            StepTxn::Borrowed(txn) => txn,
            StepTxn::Owned(txn) => txn,
        }
    }

    /// Settle the transaction according to the step's result.
    ///
    /// An owned transaction is committed on success and rolled back on failure; a
    /// borrowed one is left to its owner. A failed rollback is logged and the step's own
    /// error is returned.
    pub(crate) async fn finish<R>(
        self,
        result: Result<R, Error>,
        phase: Phase,
        step: &str,
    ) -> Result<R, Error> {
        let StepTxn::Owned(txn) = self else {
            return result;
        };

        match result {
            Ok(value) => {
                txn.commit()
                    .await
                    .map_err(|e| Error::execution_failed(phase, step, e))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    tracing::warn!(
                        "Failed to roll back transaction for {} ({}): {}",
                        phase,
                        step,
                        rollback_err
                    );
                }
                Err(err)
            }
        }
    }
}
