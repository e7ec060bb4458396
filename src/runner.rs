//! Batch reconciliation run
//!
//! This module wires the stores, the accrual client and the engine into the
//! pipeline the binary executes:
//!
//! ```text
//! snapshot ──load──→ InMemoryOrderStore ──┐
//!     │                                   ├─→ ReconciliationEngine ─→ HttpAccrualClient
//!     └──rebuild──→ InMemoryBalanceLedger ┘          ↑
//!                                             recover() + submissions
//!
//! drain or interrupt → shutdown → snapshot rewritten → balance report
//! ```
//!
//! Only failing to load the snapshot or open the submissions file aborts a
//! run. Everything that goes wrong for a single order is logged and left for
//! the engine or the next run to deal with.

use crate::cli::CliArgs;
use crate::engine::{EngineConfig, ReconciliationEngine, WorkerPool};
use crate::io::{load_snapshot, save_snapshot, write_balances_csv, AsyncReader};
use crate::oracle::HttpAccrualClient;
use crate::store::{
    BalanceLedger, InMemoryBalanceLedger, InMemoryOrderStore, OrderPredicate, OrderStore,
};
use crate::types::{LedgerError, Order, OrderStatus};
use futures::io::AsyncRead;
use rust_decimal::Decimal;
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::compat::TokioAsyncReadCompatExt;
use tracing::{info, warn};

/// Settings of one run
#[derive(Debug, Clone)]
pub struct Runner {
    pub engine: EngineConfig,
    pub accrual_address: String,
    pub request_timeout: Duration,

    /// Order snapshot; without one the run starts empty and saves nothing
    pub state_file: Option<PathBuf>,

    /// Submissions to accept after startup recovery
    pub input_file: Option<PathBuf>,

    /// Submissions read per batch
    pub batch_size: usize,
}

impl Runner {
    pub fn from_args(args: &CliArgs) -> Self {
        Self {
            engine: args.to_engine_config(),
            accrual_address: args.accrual_address.clone(),
            request_timeout: args.request_timeout(),
            state_file: args.state_file.clone(),
            input_file: args.input_file.clone(),
            batch_size: args.batch_size.max(1),
        }
    }

    /// Run until every order is reconciled or Ctrl-C is pressed
    ///
    /// Creates a multi-threaded tokio runtime and blocks on it.
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the run completed and the report was written
    /// * `Err(String)` if a fatal error occurred
    pub fn run(&self, output: &mut dyn Write) -> Result<(), String> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        runtime.block_on(self.run_until(output, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        }))
    }

    /// Run until every order is reconciled or `interrupt` resolves
    ///
    /// On interrupt, unfinished orders are abandoned and remain non-terminal
    /// in the saved snapshot, so the next run resumes them.
    pub async fn run_until<F>(&self, output: &mut dyn Write, interrupt: F) -> Result<(), String>
    where
        F: Future<Output = ()>,
    {
        let restored = match &self.state_file {
            Some(path) => load_snapshot(path)
                .await
                .map_err(|e| format!("Failed to load snapshot '{}': {}", path.display(), e))?
                .unwrap_or_default(),
            None => Vec::new(),
        };
        info!(orders = restored.len(), "order snapshot loaded");

        let submissions = match &self.input_file {
            Some(path) => {
                let file = tokio::fs::File::open(path).await.map_err(|e| {
                    format!("Failed to open file '{}': {}", path.display(), e)
                })?;
                Some(AsyncReader::new(file.compat()))
            }
            None => None,
        };

        let ledger = Arc::new(InMemoryBalanceLedger::new());
        rebuild_ledger(ledger.as_ref(), &restored)
            .await
            .map_err(|e| format!("Failed to rebuild balances: {}", e))?;
        let orders = Arc::new(
            InMemoryOrderStore::with_orders(restored)
                .map_err(|e| format!("Invalid snapshot: {}", e))?,
        );
        let oracle = Arc::new(
            HttpAccrualClient::new(&self.accrual_address, self.request_timeout)
                .map_err(|e| format!("Failed to create accrual client: {}", e))?,
        );

        let engine = ReconciliationEngine::new(
            orders.clone(),
            ledger.clone(),
            oracle,
            WorkerPool::start(self.engine.workers),
            self.engine.clone(),
        );

        let outcome = self
            .reconcile(&engine, ledger.as_ref(), submissions, interrupt)
            .await;
        engine.shutdown().await;
        outcome?;

        let final_orders = orders
            .read_orders(&OrderPredicate::all())
            .await
            .map_err(|e| format!("Failed to read orders: {}", e))?;
        if let Some(path) = &self.state_file {
            save_snapshot(path, &final_orders)
                .map_err(|e| format!("Failed to save snapshot '{}': {}", path.display(), e))?;
            info!(orders = final_orders.len(), path = %path.display(), "order snapshot saved");
        }

        let balances = ledger
            .balances()
            .await
            .map_err(|e| format!("Failed to read balances: {}", e))?;
        write_balances_csv(&balances, output)
    }

    async fn reconcile<R, F>(
        &self,
        engine: &ReconciliationEngine,
        ledger: &dyn BalanceLedger,
        submissions: Option<AsyncReader<R>>,
        interrupt: F,
    ) -> Result<(), String>
    where
        R: AsyncRead + Unpin + Send + 'static,
        F: Future<Output = ()>,
    {
        // Listening starts before intake so an early interrupt still saves
        tokio::pin!(interrupt);

        let intake = async {
            engine
                .recover()
                .await
                .map_err(|e| format!("Startup recovery failed: {}", e))?;

            if let Some(reader) = submissions {
                let accepted = self.submit_all(engine, ledger, reader).await;
                info!(accepted, "submissions accepted");
            }
            Ok::<(), String>(())
        };

        tokio::select! {
            result = intake => result?,
            _ = &mut interrupt => {
                warn!("interrupted during intake, remaining submissions skipped");
                return Ok(());
            }
        }

        tokio::select! {
            _ = engine.drain() => info!("all orders reconciled"),
            _ = &mut interrupt => warn!(
                pending = engine.pool().pending(),
                "interrupted, unfinished orders resume on the next run"
            ),
        }
        Ok(())
    }

    async fn submit_all<R>(
        &self,
        engine: &ReconciliationEngine,
        ledger: &dyn BalanceLedger,
        mut reader: AsyncReader<R>,
    ) -> usize
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let mut accepted = 0;
        loop {
            let batch = reader.read_batch(self.batch_size).await;
            if batch.is_empty() {
                break;
            }

            for submission in batch {
                if let Err(e) = ledger.open_account(&submission.user_id).await {
                    warn!(user = %submission.user_id, error = %e, "cannot open balance");
                    continue;
                }
                match engine.submit(&submission.order_id, &submission.user_id).await {
                    Ok(_) => accepted += 1,
                    Err(e) => warn!(
                        order = %submission.order_id,
                        user = %submission.user_id,
                        error = %e,
                        "submission rejected"
                    ),
                }
            }
        }
        accepted
    }
}

/// Recreate balances from restored orders
///
/// Every owner gets a balance row and every `PROCESSED` order is credited
/// once, through the same idempotent path the engine uses.
pub async fn rebuild_ledger(
    ledger: &dyn BalanceLedger,
    orders: &[Order],
) -> Result<(), LedgerError> {
    for order in orders {
        ledger.open_account(&order.user_id).await?;
        if order.status == OrderStatus::Processed && order.accrual > Decimal::ZERO {
            ledger
                .credit_accrual(&order.user_id, &order.id, order.accrual)
                .await?;
        }
    }
    Ok(())
}
