use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use stockledger_auth::{Role, UserAccount, UserDirectory, UserError};
use stockledger_core::{Actor, AggregateRoot, ExpectedVersion, Sku, TransactionId};
use stockledger_inventory::{
    LedgerStore, NewProduct, NewTransaction, Product, ProductDetails, StockPosition, StoreError,
    Transaction, TransactionQuery, newest_first,
};
use stockledger_parties::{Party, PartyDirectory, PartyError, PartyId, PartyKind, RegisterParty};

#[derive(Debug, Default)]
struct LedgerState {
    products: HashMap<Sku, Product>,
    log: Vec<Transaction>,
    last_id: u64,
}

impl LedgerState {
    fn append(&mut self, entry: NewTransaction) -> Transaction {
        self.last_id += 1;
        let tx = entry.commit(TransactionId::new(self.last_id));
        self.log.push(tx.clone());
        tx
    }

    /// Current product, provided its version matches `expected`.
    fn checked(&self, sku: &Sku, expected: ExpectedVersion) -> Result<&Product, StoreError> {
        let product = self
            .products
            .get(sku)
            .ok_or_else(|| StoreError::NotFound(format!("product {sku}")))?;
        expected
            .check(product.version())
            .map_err(|e| StoreError::Concurrency(format!("product {sku}: {e}")))?;
        Ok(product)
    }
}

/// In-memory product table and transaction log.
///
/// Intended for tests/dev. One lock guards both halves so every write is atomic.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn product(&self, sku: &Sku) -> Result<Option<Product>, StoreError> {
        Ok(self.read()?.products.get(sku).cloned())
    }

    async fn products(&self) -> Result<Vec<Product>, StoreError> {
        let mut products: Vec<Product> = self.read()?.products.values().cloned().collect();
        products.sort_by(|a, b| a.sku().cmp(b.sku()));
        Ok(products)
    }

    async fn insert_product(
        &self,
        product: NewProduct,
        opening: Option<NewTransaction>,
    ) -> Result<(Product, Option<Transaction>), StoreError> {
        let mut state = self.write()?;
        if state.products.contains_key(&product.sku) {
            return Err(StoreError::Duplicate(format!("product {}", product.sku)));
        }

        let opening_quantity = opening.as_ref().map_or(0, |entry| entry.delta);
        let product = Product::created(product, opening_quantity);
        state.products.insert(product.sku().clone(), product.clone());
        let opening = opening.map(|entry| state.append(entry));
        Ok((product, opening))
    }

    async fn update_product(
        &self,
        sku: &Sku,
        expected_version: ExpectedVersion,
        details: ProductDetails,
    ) -> Result<Product, StoreError> {
        let mut state = self.write()?;
        let updated = state.checked(sku, expected_version)?.clone().with_details(details);
        state.products.insert(sku.clone(), updated.clone());
        Ok(updated)
    }

    async fn commit(
        &self,
        sku: &Sku,
        expected_version: ExpectedVersion,
        new_quantity: i64,
        entry: NewTransaction,
    ) -> Result<(Product, Transaction), StoreError> {
        if &entry.sku != sku {
            return Err(StoreError::Backend(format!(
                "transaction for {} committed against {sku}",
                entry.sku
            )));
        }

        let mut state = self.write()?;
        let updated = state
            .checked(sku, expected_version)?
            .clone()
            .with_quantity(new_quantity);
        state.products.insert(sku.clone(), updated.clone());
        let tx = state.append(entry);
        Ok((updated, tx))
    }

    async fn overwrite_quantity(
        &self,
        sku: &Sku,
        expected_version: ExpectedVersion,
        new_quantity: i64,
    ) -> Result<Product, StoreError> {
        let mut state = self.write()?;
        let updated = state
            .checked(sku, expected_version)?
            .clone()
            .with_quantity(new_quantity);
        state.products.insert(sku.clone(), updated.clone());
        Ok(updated)
    }

    async fn delete_product(&self, sku: &Sku) -> Result<Option<u64>, StoreError> {
        let mut state = self.write()?;
        if state.products.remove(sku).is_none() {
            return Ok(None);
        }
        let before = state.log.len();
        state.log.retain(|tx| &tx.sku != sku);
        Ok(Some((before - state.log.len()) as u64))
    }

    async fn transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>, StoreError> {
        let mut matching: Vec<Transaction> = self
            .read()?
            .log
            .iter()
            .filter(|tx| query.matches(tx))
            .cloned()
            .collect();
        matching.sort_by(newest_first);
        if let Some(limit) = query.limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }

    async fn stock_position(&self, sku: &Sku) -> Result<Option<StockPosition>, StoreError> {
        let state = self.read()?;
        Ok(state.products.get(sku).map(|product| StockPosition {
            product: product.clone(),
            ledger_sum: state
                .log
                .iter()
                .filter(|tx| &tx.sku == sku)
                .map(|tx| tx.delta)
                .sum(),
        }))
    }
}

/// In-memory customer/supplier directory.
#[derive(Debug, Default)]
pub struct InMemoryPartyDirectory {
    parties: RwLock<Vec<Party>>,
}

impl InMemoryPartyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Result<Vec<Party>, PartyError> {
        self.parties
            .read()
            .map(|parties| parties.clone())
            .map_err(|_| PartyError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl PartyDirectory for InMemoryPartyDirectory {
    async fn register(&self, cmd: RegisterParty) -> Result<Party, PartyError> {
        let party = Party::register(PartyId::new(), cmd)?;
        self.parties
            .write()
            .map_err(|_| PartyError::Backend("lock poisoned".to_string()))?
            .push(party.clone());
        Ok(party)
    }

    async fn get(&self, id: PartyId) -> Result<Party, PartyError> {
        self.snapshot()?
            .into_iter()
            .find(|p| p.id() == id)
            .ok_or(PartyError::NotFound(id))
    }

    async fn list(&self, kind: PartyKind) -> Result<Vec<Party>, PartyError> {
        let mut parties = self.snapshot()?;
        parties.retain(|p| p.kind() == kind);
        Ok(parties)
    }

    async fn find_by_name(&self, kind: PartyKind, name: &str) -> Result<Option<Party>, PartyError> {
        Ok(self
            .snapshot()?
            .into_iter()
            .find(|p| p.kind() == kind && p.name() == name))
    }
}

/// In-memory user accounts keyed by username.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<BTreeMap<Actor, UserAccount>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory holding the given accounts (e.g. a bootstrap admin).
    pub fn with_accounts(accounts: impl IntoIterator<Item = UserAccount>) -> Self {
        let users = accounts
            .into_iter()
            .map(|account| (account.username.clone(), account))
            .collect();
        Self {
            users: RwLock::new(users),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<Actor, UserAccount>>, UserError> {
        self.users
            .read()
            .map_err(|_| UserError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<Actor, UserAccount>>, UserError> {
        self.users
            .write()
            .map_err(|_| UserError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn create(&self, account: UserAccount) -> Result<UserAccount, UserError> {
        let mut users = self.write()?;
        if users.contains_key(&account.username) {
            return Err(UserError::Duplicate(account.username));
        }
        users.insert(account.username.clone(), account.clone());
        Ok(account)
    }

    async fn get(&self, username: &Actor) -> Result<Option<UserAccount>, UserError> {
        Ok(self.read()?.get(username).cloned())
    }

    async fn list(&self) -> Result<Vec<UserAccount>, UserError> {
        Ok(self.read()?.values().cloned().collect())
    }

    async fn delete(&self, username: &Actor) -> Result<(), UserError> {
        self.write()?
            .remove(username)
            .map(|_| ())
            .ok_or_else(|| UserError::NotFound(username.clone()))
    }

    async fn set_role(&self, username: &Actor, role: Role) -> Result<UserAccount, UserError> {
        let mut users = self.write()?;
        let account = users
            .get_mut(username)
            .ok_or_else(|| UserError::NotFound(username.clone()))?;
        account.role = role;
        Ok(account.clone())
    }
}
