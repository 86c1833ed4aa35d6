//! Integrity sweep: reconcile every product's stored quantity with its
//! transaction log. Pass `--repair` to reset drifted quantities to the ledger sum.

use anyhow::Context;

use stockledger_infra::{SqliteLedgerStore, load_config};
use stockledger_inventory::{LedgerStore, StockLedger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let repair = std::env::args().skip(1).any(|arg| arg == "--repair");

    let config = load_config().context("failed to load configuration")?;
    stockledger_observability::init(&config.log);
    tracing::info!(database_url = %config.database_url, repair, "configuration loaded");

    let store = SqliteLedgerStore::connect(&config.database_url)
        .await
        .with_context(|| format!("failed to open {}", config.database_url))?;
    let ledger = StockLedger::with_config(store, config.ledger);

    let outcome = sweep(&ledger, repair).await?;
    tracing::info!(
        products = outcome.products,
        drifted = outcome.drifted,
        repaired = repair,
        "audit finished"
    );

    if outcome.drifted > 0 && !repair {
        anyhow::bail!(
            "{} product(s) disagree with their ledger; rerun with --repair",
            outcome.drifted
        );
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
struct Outcome {
    products: usize,
    drifted: usize,
}

async fn sweep<S: LedgerStore>(ledger: &StockLedger<S>, repair: bool) -> anyhow::Result<Outcome> {
    let products = ledger.list_products().await.context("failed to list products")?;
    let mut drifted = 0usize;

    for product in &products {
        let sku = product.sku();
        let check = if repair {
            ledger.repair(sku).await
        } else {
            ledger.reconciliation(sku).await
        }
        .with_context(|| format!("failed to reconcile {sku}"))?;

        if !check.is_consistent() {
            drifted += 1;
            tracing::warn!(
                sku = %sku,
                stored = check.stored,
                ledger_sum = check.ledger_sum,
                repaired = repair,
                "quantity drift"
            );
        }
    }

    Ok(Outcome {
        products: products.len(),
        drifted,
    })
}
