//! Integration tests for the ledger over real stores.
//!
//! Tests: StockLedger → LedgerStore (in-memory and SQLite) → reporting
//!
//! Verifies:
//! - Stored quantity always reconciles with the transaction log
//! - Rejected movements leave no trace
//! - Version conflicts are retried and never oversell
//! - Catalog edits never touch quantity or recorded history

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

    use stockledger_auth::{Principal, Role, UserAccount, UserError, UserManagement};
    use stockledger_core::{Actor, AggregateRoot, ExpectedVersion, Money, Sku};
    use stockledger_inventory::{
        AdjustToActual, ImportRow, LedgerConfig, LedgerError, LedgerStore, MovementKind,
        NewProduct, NewTransaction, Product, ProductDetails, RecordMovement, StockLedger,
        StockPosition, StoreError, Transaction, TransactionQuery,
    };
    use stockledger_parties::{ContactInfo, PartyDirectory, RegisterParty};
    use stockledger_reporting::{
        CompanyProfile, DashboardStats, ReportPeriod, dashboard, profit_report, receipt_for,
    };

    use crate::memory::{InMemoryLedgerStore, InMemoryPartyDirectory, InMemoryUserDirectory};
    use crate::sqlite::SqliteLedgerStore;

    fn sku(s: &str) -> Sku {
        Sku::new(s).unwrap()
    }

    fn actor(s: &str) -> Actor {
        Actor::new(s).unwrap()
    }

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn movement(s: &str, kind: MovementKind, quantity: i64, who: &str, party: &str, minute: i64) -> RecordMovement {
        RecordMovement {
            sku: sku(s),
            kind,
            quantity,
            actor: actor(who),
            counterparty: Some(party.to_string()),
            occurred_at: at(minute),
        }
    }

    fn adjust(s: &str, actual_quantity: i64, minute: i64) -> AdjustToActual {
        AdjustToActual {
            sku: sku(s),
            actual_quantity,
            actor: actor("admin"),
            reason: None,
            occurred_at: at(minute),
        }
    }

    async fn with_widget<S: LedgerStore>(store: S) -> StockLedger<S> {
        let ledger = StockLedger::new(store);
        let details = ProductDetails::named("Widget")
            .with_prices(Money::from_minor(600), Money::from_minor(1000));
        ledger
            .create_product(NewProduct::new(sku("WIDGET"), details))
            .await
            .unwrap();
        ledger
    }

    async fn sqlite() -> SqliteLedgerStore {
        SqliteLedgerStore::connect("sqlite::memory:").await.unwrap()
    }

    async fn widget_scenario<S: LedgerStore>(ledger: StockLedger<S>) {
        let received = ledger
            .apply_movement(movement("WIDGET", MovementKind::In, 20, "admin", "SupplierA", 0))
            .await
            .unwrap();
        assert_eq!(received.delta, 20);
        assert_eq!(ledger.product(&sku("WIDGET")).await.unwrap().quantity(), 20);

        let sold = ledger
            .apply_movement(movement("WIDGET", MovementKind::Out, 5, "staff", "Customer1", 1))
            .await
            .unwrap();
        assert_eq!(sold.delta, -5);
        assert_eq!(sold.counterparty, "Customer1");

        let err = ledger
            .apply_movement(movement("WIDGET", MovementKind::Out, 100, "staff", "Customer1", 2))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientStock { on_hand: 15, requested: 100, .. }
        ));
        assert!(err.is_recoverable());

        assert_eq!(ledger.product(&sku("WIDGET")).await.unwrap().quantity(), 15);
        assert!(ledger.reconcile(&sku("WIDGET")).await.unwrap());

        let history = ledger.history_for(&sku("WIDGET")).await.unwrap();
        let ids: Vec<_> = history.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![sold.id, received.id]);
        // Restartable: a second pass sees the same entries.
        assert_eq!(history.iter().count(), 2);
    }

    #[tokio::test]
    async fn widget_scenario_in_memory() {
        widget_scenario(with_widget(InMemoryLedgerStore::new()).await).await;
    }

    #[tokio::test]
    async fn widget_scenario_sqlite() {
        widget_scenario(with_widget(sqlite().await).await).await;
    }

    async fn adjustments<S: LedgerStore>(ledger: StockLedger<S>) {
        ledger
            .apply_movement(movement("WIDGET", MovementKind::In, 10, "admin", "SupplierA", 0))
            .await
            .unwrap();

        assert_eq!(ledger.adjust_to_actual(adjust("WIDGET", 10, 1)).await.unwrap(), None);
        assert_eq!(ledger.history_for(&sku("WIDGET")).await.unwrap().len(), 1);

        let tx = ledger
            .adjust_to_actual(adjust("WIDGET", 7, 2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.kind, MovementKind::Adjust);
        assert_eq!(tx.delta, -3);
        assert_eq!(tx.counterparty, "Audit");
        assert_eq!(ledger.product(&sku("WIDGET")).await.unwrap().quantity(), 7);
        assert!(ledger.reconcile(&sku("WIDGET")).await.unwrap());

        let err = ledger.adjust_to_actual(adjust("WIDGET", -1, 3)).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidQuantity(_)));
    }

    #[tokio::test]
    async fn adjustments_in_memory() {
        adjustments(with_widget(InMemoryLedgerStore::new()).await).await;
    }

    #[tokio::test]
    async fn adjustments_sqlite() {
        adjustments(with_widget(sqlite().await).await).await;
    }

    async fn delete_cascade<S: LedgerStore>(ledger: StockLedger<S>) {
        ledger
            .apply_movement(movement("WIDGET", MovementKind::In, 3, "admin", "SupplierA", 0))
            .await
            .unwrap();

        assert_eq!(ledger.delete_product(&sku("WIDGET")).await.unwrap(), 1);
        assert!(ledger.history_for(&sku("WIDGET")).await.unwrap().is_empty());
        assert!(matches!(
            ledger.product(&sku("WIDGET")).await,
            Err(LedgerError::ProductNotFound(_))
        ));
        assert!(matches!(
            ledger.delete_product(&sku("WIDGET")).await,
            Err(LedgerError::ProductNotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_cascade_in_memory() {
        delete_cascade(with_widget(InMemoryLedgerStore::new()).await).await;
    }

    #[tokio::test]
    async fn delete_cascade_sqlite() {
        delete_cascade(with_widget(sqlite().await).await).await;
    }

    async fn import_then_export<S: LedgerStore>(ledger: StockLedger<S>) {
        let row = |sku: &str, qty: i64| ImportRow {
            sku: sku.to_string(),
            name: format!("{sku} name"),
            category: Some("Tools".to_string()),
            cost: Money::from_minor(100),
            price: Money::from_minor(150),
            quantity: qty,
        };
        let rows = vec![row("WIDGET", 99), row("BOLT", 40), row("NUT", 0), row(" ", 1)];

        let summary = ledger
            .import_catalog(rows, &actor("admin"), at(0))
            .await
            .unwrap();

        assert_eq!(summary.created, vec![sku("BOLT"), sku("NUT")]);
        assert_eq!(summary.skipped, vec![sku("WIDGET")]);
        assert_eq!(summary.rejected.len(), 1);
        assert_eq!(summary.opening_transactions, 1);

        // The existing product keeps its stock; imported stock is on the ledger.
        assert_eq!(ledger.product(&sku("WIDGET")).await.unwrap().quantity(), 0);
        assert_eq!(ledger.product(&sku("BOLT")).await.unwrap().quantity(), 40);
        for s in ["BOLT", "NUT", "WIDGET"] {
            assert!(ledger.reconcile(&sku(s)).await.unwrap());
        }
        let bolt = ledger.history_for(&sku("BOLT")).await.unwrap();
        assert_eq!(bolt.latest().map(|t| t.kind), Some(MovementKind::Import));

        let exported = ledger.export_catalog().await.unwrap();
        let skus: Vec<_> = exported.iter().map(|r| r.sku.as_str()).collect();
        assert_eq!(skus, vec!["BOLT", "NUT", "WIDGET"]);
    }

    #[tokio::test]
    async fn import_then_export_in_memory() {
        import_then_export(with_widget(InMemoryLedgerStore::new()).await).await;
    }

    #[tokio::test]
    async fn import_then_export_sqlite() {
        import_then_export(with_widget(sqlite().await).await).await;
    }

    async fn catalog_edits<S: LedgerStore>(ledger: StockLedger<S>) {
        ledger
            .apply_movement(movement("WIDGET", MovementKind::In, 3, "admin", "SupplierA", 0))
            .await
            .unwrap();
        let before = ledger.product(&sku("WIDGET")).await.unwrap();

        let renamed = ledger
            .update_product(
                &sku("WIDGET"),
                ProductDetails::named("Gadget").with_category("Gizmos"),
            )
            .await
            .unwrap();
        assert_eq!(renamed.name(), "Gadget");
        assert_eq!(renamed.category(), "Gizmos");
        assert_eq!(renamed.quantity(), 3);
        assert!(renamed.version() > before.version());

        // History keeps the name the product had when each entry was recorded.
        let history = ledger.history_for(&sku("WIDGET")).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().map(|t| t.product_name.as_str()), Some("Widget"));
        assert!(ledger.reconcile(&sku("WIDGET")).await.unwrap());

        let blank = ledger
            .update_product(&sku("WIDGET"), ProductDetails::named(" "))
            .await
            .unwrap_err();
        assert!(matches!(blank, LedgerError::Validation(_)));
        assert_eq!(ledger.product(&sku("WIDGET")).await.unwrap().name(), "Gadget");

        let missing = ledger
            .update_product(&sku("NOPE"), ProductDetails::named("Nope"))
            .await
            .unwrap_err();
        assert!(matches!(missing, LedgerError::ProductNotFound(_)));

        let duplicate = ledger
            .create_product(NewProduct::new(sku("WIDGET"), ProductDetails::named("Again")))
            .await
            .unwrap_err();
        assert!(matches!(duplicate, LedgerError::DuplicateSku(ref s) if *s == sku("WIDGET")));
        assert_eq!(ledger.product(&sku("WIDGET")).await.unwrap().quantity(), 3);

        let unnamed = ledger
            .create_product(NewProduct::new(sku("BLANK"), ProductDetails::named("")))
            .await
            .unwrap_err();
        assert!(matches!(unnamed, LedgerError::Validation(_)));
        assert!(matches!(
            ledger.product(&sku("BLANK")).await,
            Err(LedgerError::ProductNotFound(_))
        ));
    }

    #[tokio::test]
    async fn catalog_edits_in_memory() {
        catalog_edits(with_widget(InMemoryLedgerStore::new()).await).await;
    }

    #[tokio::test]
    async fn catalog_edits_sqlite() {
        catalog_edits(with_widget(sqlite().await).await).await;
    }

    async fn search_and_recent<S: LedgerStore>(ledger: StockLedger<S>) {
        for (s, name) in [("BOLT-8", "Hex Bolt"), ("NUT-8", "Wing Nut")] {
            ledger
                .create_product(NewProduct::new(sku(s), ProductDetails::named(name)))
                .await
                .unwrap();
        }

        let skus = |products: Vec<Product>| -> Vec<String> {
            products.iter().map(|p| p.sku().as_str().to_string()).collect()
        };
        assert_eq!(skus(ledger.search_products("bolt").await.unwrap()), vec!["BOLT-8"]);
        assert_eq!(skus(ledger.search_products("WIDG").await.unwrap()), vec!["WIDGET"]);
        assert_eq!(
            skus(ledger.search_products("-8").await.unwrap()),
            vec!["BOLT-8", "NUT-8"]
        );
        assert_eq!(ledger.search_products("").await.unwrap().len(), 3);
        assert!(ledger.search_products("washer").await.unwrap().is_empty());

        let first = ledger
            .apply_movement(movement("WIDGET", MovementKind::In, 5, "admin", "SupplierA", 0))
            .await
            .unwrap();
        let second = ledger
            .apply_movement(movement("BOLT-8", MovementKind::In, 9, "admin", "SupplierA", 1))
            .await
            .unwrap();
        let third = ledger
            .apply_movement(movement("WIDGET", MovementKind::Out, 2, "staff", "Customer1", 2))
            .await
            .unwrap();

        let recent = ledger.recent_history(2).await.unwrap();
        let ids: Vec<_> = recent.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![third.id, second.id]);

        let all = ledger.recent_history(10).await.unwrap();
        let ids: Vec<_> = all.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);
    }

    #[tokio::test]
    async fn search_and_recent_in_memory() {
        search_and_recent(with_widget(InMemoryLedgerStore::new()).await).await;
    }

    #[tokio::test]
    async fn search_and_recent_sqlite() {
        search_and_recent(with_widget(sqlite().await).await).await;
    }

    #[tokio::test]
    async fn user_management_guards_accounts() {
        let admin = Principal::admin(actor("admin"));
        let users = UserManagement::new(InMemoryUserDirectory::with_accounts([
            UserAccount::new(actor("admin"), Role::ADMIN),
        ]));

        let created = users.create_user(&admin, actor("somchai"), None).await.unwrap();
        assert_eq!(created.role, Role::STAFF);
        assert_eq!(
            users.create_user(&admin, actor("somchai"), Some(Role::ADMIN)).await,
            Err(UserError::Duplicate(actor("somchai")))
        );
        assert!(matches!(
            users.create_user(&admin, actor("guest"), Some(Role::new("guest"))).await,
            Err(UserError::UnknownRole(_))
        ));

        let listed: Vec<_> = users
            .list_users(&admin)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.username.to_string())
            .collect();
        assert_eq!(listed, vec!["admin", "somchai"]);

        // Staff may not manage anyone, including themselves.
        let staff = created.principal();
        assert!(matches!(
            users.create_user(&staff, actor("mallory"), Some(Role::ADMIN)).await,
            Err(UserError::Forbidden(_))
        ));
        assert!(matches!(
            users.change_role(&staff, &actor("somchai"), Role::ADMIN).await,
            Err(UserError::Forbidden(_))
        ));
        assert!(matches!(users.list_users(&staff).await, Err(UserError::Forbidden(_))));

        assert_eq!(
            users.delete_user(&admin, &actor("admin")).await,
            Err(UserError::SelfTarget("delete"))
        );
        assert!(matches!(
            users.change_role(&admin, &actor("admin"), Role::STAFF).await,
            Err(UserError::SelfTarget(_))
        ));

        let promoted = users
            .change_role(&admin, &actor("somchai"), Role::ADMIN)
            .await
            .unwrap();
        assert!(promoted.role.is_admin());

        users.delete_user(&admin, &actor("somchai")).await.unwrap();
        assert_eq!(
            users.delete_user(&admin, &actor("somchai")).await,
            Err(UserError::NotFound(actor("somchai")))
        );
        assert_eq!(users.list_users(&admin).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn repair_resets_quantity_without_touching_history() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let ledger = with_widget(store.clone()).await;
        ledger
            .apply_movement(movement("WIDGET", MovementKind::In, 8, "admin", "SupplierA", 0))
            .await
            .unwrap();

        // Simulate drift from an out-of-band write.
        store
            .overwrite_quantity(&sku("WIDGET"), ExpectedVersion::Any, 50)
            .await
            .unwrap();
        assert!(!ledger.reconcile(&sku("WIDGET")).await.unwrap());

        let before = ledger.repair(&sku("WIDGET")).await.unwrap();
        assert_eq!(before.stored, 50);
        assert_eq!(before.ledger_sum, 8);
        assert_eq!(before.discrepancy(), 42);

        assert!(ledger.reconcile(&sku("WIDGET")).await.unwrap());
        assert_eq!(ledger.product(&sku("WIDGET")).await.unwrap().quantity(), 8);
        assert_eq!(ledger.history_for(&sku("WIDGET")).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_dispatches_never_oversell() {
        let ledger = Arc::new(StockLedger::with_config(
            InMemoryLedgerStore::new(),
            LedgerConfig {
                max_conflict_retries: 64,
            },
        ));
        ledger
            .create_product(NewProduct::new(sku("WIDGET"), ProductDetails::named("Widget")))
            .await
            .unwrap();
        ledger
            .apply_movement(movement("WIDGET", MovementKind::In, 10, "admin", "SupplierA", 0))
            .await
            .unwrap();

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    ledger
                        .apply_movement(movement("WIDGET", MovementKind::Out, 1, "staff", "Customer1", i + 1))
                        .await
                })
            })
            .collect();

        let mut sold = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => sold += 1,
                Err(LedgerError::InsufficientStock { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(sold, 10);
        assert_eq!(ledger.product(&sku("WIDGET")).await.unwrap().quantity(), 0);
        assert!(ledger.reconcile(&sku("WIDGET")).await.unwrap());
        assert_eq!(ledger.history_for(&sku("WIDGET")).await.unwrap().len(), 11);
    }

    /// Store that loses the first `conflicts` commit races.
    struct ContendedStore {
        inner: InMemoryLedgerStore,
        conflicts: AtomicU32,
    }

    impl ContendedStore {
        fn new(conflicts: u32) -> Self {
            Self {
                inner: InMemoryLedgerStore::new(),
                conflicts: AtomicU32::new(conflicts),
            }
        }
    }

    #[async_trait::async_trait]
    impl LedgerStore for ContendedStore {
        async fn product(&self, sku: &Sku) -> Result<Option<Product>, StoreError> {
            self.inner.product(sku).await
        }

        async fn products(&self) -> Result<Vec<Product>, StoreError> {
            self.inner.products().await
        }

        async fn insert_product(
            &self,
            product: NewProduct,
            opening: Option<NewTransaction>,
        ) -> Result<(Product, Option<Transaction>), StoreError> {
            self.inner.insert_product(product, opening).await
        }

        async fn update_product(
            &self,
            sku: &Sku,
            expected_version: ExpectedVersion,
            details: ProductDetails,
        ) -> Result<Product, StoreError> {
            self.inner.update_product(sku, expected_version, details).await
        }

        async fn commit(
            &self,
            sku: &Sku,
            expected_version: ExpectedVersion,
            new_quantity: i64,
            entry: NewTransaction,
        ) -> Result<(Product, Transaction), StoreError> {
            let lost_race = self
                .conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if lost_race {
                return Err(StoreError::Concurrency("simulated race".to_string()));
            }
            self.inner.commit(sku, expected_version, new_quantity, entry).await
        }

        async fn overwrite_quantity(
            &self,
            sku: &Sku,
            expected_version: ExpectedVersion,
            new_quantity: i64,
        ) -> Result<Product, StoreError> {
            self.inner.overwrite_quantity(sku, expected_version, new_quantity).await
        }

        async fn delete_product(&self, sku: &Sku) -> Result<Option<u64>, StoreError> {
            self.inner.delete_product(sku).await
        }

        async fn transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>, StoreError> {
            self.inner.transactions(query).await
        }

        async fn stock_position(&self, sku: &Sku) -> Result<Option<StockPosition>, StoreError> {
            self.inner.stock_position(sku).await
        }
    }

    /// Store where another writer receives 5 units right after each read,
    /// until `pending` runs out.
    struct InterleavingStore {
        inner: InMemoryLedgerStore,
        pending: AtomicU32,
    }

    impl InterleavingStore {
        fn new() -> Self {
            Self {
                inner: InMemoryLedgerStore::new(),
                pending: AtomicU32::new(0),
            }
        }

        fn arm(&self, writes: u32) {
            self.pending.store(writes, Ordering::SeqCst);
        }

        async fn interleave(&self, sku: &Sku) -> Result<(), StoreError> {
            let due = self
                .pending
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if !due {
                return Ok(());
            }
            let Some(current) = self.inner.product(sku).await? else {
                return Ok(());
            };
            let entry = NewTransaction {
                occurred_at: at(30),
                sku: sku.clone(),
                product_name: current.name().to_string(),
                kind: MovementKind::In,
                delta: 5,
                actor: actor("admin"),
                counterparty: "SupplierA".to_string(),
            };
            self.inner
                .commit(sku, ExpectedVersion::Exact(current.version()), current.quantity() + 5, entry)
                .await?;
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl LedgerStore for InterleavingStore {
        async fn product(&self, sku: &Sku) -> Result<Option<Product>, StoreError> {
            let product = self.inner.product(sku).await?;
            self.interleave(sku).await?;
            Ok(product)
        }

        async fn products(&self) -> Result<Vec<Product>, StoreError> {
            self.inner.products().await
        }

        async fn insert_product(
            &self,
            product: NewProduct,
            opening: Option<NewTransaction>,
        ) -> Result<(Product, Option<Transaction>), StoreError> {
            self.inner.insert_product(product, opening).await
        }

        async fn update_product(
            &self,
            sku: &Sku,
            expected_version: ExpectedVersion,
            details: ProductDetails,
        ) -> Result<Product, StoreError> {
            self.inner.update_product(sku, expected_version, details).await
        }

        async fn commit(
            &self,
            sku: &Sku,
            expected_version: ExpectedVersion,
            new_quantity: i64,
            entry: NewTransaction,
        ) -> Result<(Product, Transaction), StoreError> {
            self.inner.commit(sku, expected_version, new_quantity, entry).await
        }

        async fn overwrite_quantity(
            &self,
            sku: &Sku,
            expected_version: ExpectedVersion,
            new_quantity: i64,
        ) -> Result<Product, StoreError> {
            self.inner.overwrite_quantity(sku, expected_version, new_quantity).await
        }

        async fn delete_product(&self, sku: &Sku) -> Result<Option<u64>, StoreError> {
            self.inner.delete_product(sku).await
        }

        async fn transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>, StoreError> {
            let entries = self.inner.transactions(query).await?;
            if let Some(sku) = &query.sku {
                self.interleave(sku).await?;
            }
            Ok(entries)
        }

        async fn stock_position(&self, sku: &Sku) -> Result<Option<StockPosition>, StoreError> {
            let position = self.inner.stock_position(sku).await?;
            self.interleave(sku).await?;
            Ok(position)
        }
    }

    #[tokio::test]
    async fn reconcile_ignores_movements_landing_mid_check() {
        let ledger = with_widget(InterleavingStore::new()).await;

        ledger.store().arm(1);
        assert!(ledger.reconcile(&sku("WIDGET")).await.unwrap());
        assert_eq!(ledger.store().pending.load(Ordering::SeqCst), 0);

        let settled = ledger.reconciliation(&sku("WIDGET")).await.unwrap();
        assert_eq!(settled.stored, 5);
        assert_eq!(settled.ledger_sum, 5);

        ledger.store().arm(1);
        let before = ledger.repair(&sku("WIDGET")).await.unwrap();
        assert!(before.is_consistent());
        assert!(ledger.reconcile(&sku("WIDGET")).await.unwrap());
        assert_eq!(ledger.product(&sku("WIDGET")).await.unwrap().quantity(), 10);
        assert_eq!(ledger.history_for(&sku("WIDGET")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stock_position_reads_quantity_and_ledger_together() {
        for position in [
            position_after_movements(InMemoryLedgerStore::new()).await,
            position_after_movements(sqlite().await).await,
        ] {
            assert_eq!(position.product.quantity(), 12);
            assert_eq!(position.ledger_sum, 12);
        }
    }

    async fn position_after_movements<S: LedgerStore>(store: S) -> StockPosition {
        let ledger = with_widget(store).await;
        ledger
            .apply_movement(movement("WIDGET", MovementKind::In, 15, "admin", "SupplierA", 0))
            .await
            .unwrap();
        ledger
            .apply_movement(movement("WIDGET", MovementKind::Out, 3, "staff", "Customer1", 1))
            .await
            .unwrap();
        assert!(ledger.store().stock_position(&sku("NOPE")).await.unwrap().is_none());
        ledger.store().stock_position(&sku("WIDGET")).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn conflicts_are_retried_until_the_commit_lands() {
        let ledger = with_widget(ContendedStore::new(3)).await;
        ledger
            .apply_movement(movement("WIDGET", MovementKind::In, 4, "admin", "SupplierA", 0))
            .await
            .unwrap();

        assert_eq!(ledger.product(&sku("WIDGET")).await.unwrap().quantity(), 4);
        assert_eq!(ledger.history_for(&sku("WIDGET")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_as_storage_failure() {
        let store = ContendedStore::new(10);
        let ledger = StockLedger::with_config(store, LedgerConfig { max_conflict_retries: 2 });
        ledger
            .create_product(NewProduct::new(sku("WIDGET"), ProductDetails::named("Widget")))
            .await
            .unwrap();

        let err = ledger
            .apply_movement(movement("WIDGET", MovementKind::In, 4, "admin", "SupplierA", 0))
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::Storage(StoreError::Concurrency(_))));
        assert!(!err.is_recoverable());
        assert_eq!(ledger.product(&sku("WIDGET")).await.unwrap().quantity(), 0);
        assert!(ledger.history_for(&sku("WIDGET")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reports_read_through_the_ledger() {
        let ledger = with_widget(sqlite().await).await;
        let directory = InMemoryPartyDirectory::new();
        directory
            .register(RegisterParty::customer("Customer1", ContactInfo::default(), at(0)))
            .await
            .unwrap();

        ledger
            .apply_movement(movement("WIDGET", MovementKind::In, 20, "admin", "SupplierA", 0))
            .await
            .unwrap();
        let sale = ledger
            .apply_movement(movement("WIDGET", MovementKind::Out, 5, "staff", "Customer1", 1))
            .await
            .unwrap();

        let today = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let report = profit_report(&ledger, ReportPeriod::Today, today).await.unwrap();
        assert_eq!(report.lines.len(), 1);
        assert_eq!(report.total_sales, Money::from_minor(5000));
        assert_eq!(report.total_profit, Money::from_minor(2000));

        let tomorrow = today.succ_opt().unwrap();
        let empty = profit_report(&ledger, ReportPeriod::Today, tomorrow).await.unwrap();
        assert!(empty.lines.is_empty());

        let stats: DashboardStats = dashboard(&ledger).await.unwrap();
        assert_eq!(stats.total_quantity, 15);
        assert_eq!(stats.top_sellers[0].units_sold, 5);

        let receipt = receipt_for(&ledger, &directory, sale, CompanyProfile::default())
            .await
            .unwrap();
        assert_eq!(receipt.customer.map(|c| c.name().to_string()), Some("Customer1".to_string()));
        assert_eq!(receipt.grand_total, Money::from_minor(5350));
    }
}
