//! Scriptable in-memory wallet provider and contracts

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;

use surety_sync::client::FlightSuretyContract::OperationalStatusChanged;
use surety_sync::{
    Account, ContractClient, ContractName, LogFilter, LogStream, RemoteCallError, SyncError,
    SyncResult, TransactionLogEntry, WalletProvider,
};

pub const CHAIN_ID: u64 = 31337;

pub fn app_address() -> Address {
    Address::repeat_byte(0xaa)
}

pub fn data_address() -> Address {
    Address::repeat_byte(0xdd)
}

pub fn account(byte: u8) -> Account {
    Account::new(Address::repeat_byte(byte))
}

/// What `isOperational()` answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Yes,
    No,
    Fail,
}

pub struct FakeContract {
    address: Address,
    deployed: bool,
    reply: Mutex<Reply>,
    read_delay: Mutex<Duration>,
    write_delay: Mutex<Duration>,
    reject_writes: Mutex<Option<String>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl FakeContract {
    pub fn new(address: Address, reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            address,
            deployed: true,
            reply: Mutex::new(reply),
            read_delay: Mutex::new(Duration::ZERO),
            write_delay: Mutex::new(Duration::ZERO),
            reject_writes: Mutex::new(None),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        })
    }

    pub fn undeployed(address: Address) -> Arc<Self> {
        Arc::new(Self {
            address,
            deployed: false,
            reply: Mutex::new(Reply::Fail),
            read_delay: Mutex::new(Duration::ZERO),
            write_delay: Mutex::new(Duration::ZERO),
            reject_writes: Mutex::new(None),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        })
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = delay;
    }

    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock().unwrap() = delay;
    }

    pub fn reject_writes(&self, reason: &str) {
        *self.reject_writes.lock().unwrap() = Some(reason.to_string());
    }

    /// Number of `isOperational()` calls made so far
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `setOperationalStatus` calls made so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContractClient for FakeContract {
    fn address(&self) -> Address {
        self.address
    }

    async fn is_deployed(&self) -> SyncResult<bool> {
        Ok(self.deployed)
    }

    async fn is_operational(&self) -> SyncResult<bool> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.read_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match *self.reply.lock().unwrap() {
            Reply::Yes => Ok(true),
            Reply::No => Ok(false),
            Reply::Fail => Err(RemoteCallError::Transport("contract unreachable".into()).into()),
        }
    }

    async fn set_operational_status(&self, operational: bool, _from: &Account) -> SyncResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let delay = *self.write_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = self.reject_writes.lock().unwrap().clone() {
            return Err(RemoteCallError::Reverted { reason }.into());
        }
        self.set_reply(if operational { Reply::Yes } else { Reply::No });
        Ok(())
    }
}

type LogSender = mpsc::UnboundedSender<SyncResult<TransactionLogEntry>>;

pub struct FakeWallet {
    unlocked: Mutex<bool>,
    /// Successive `eth_accounts` answers; the last one repeats
    accounts: Mutex<VecDeque<Vec<Account>>>,
    granted: Mutex<Option<Vec<Account>>>,
    contracts: HashMap<Address, Arc<FakeContract>>,
    log_tx: Mutex<Option<LogSender>>,
    subscriptions: AtomicUsize,
}

impl FakeWallet {
    pub fn new(contracts: &[Arc<FakeContract>]) -> Self {
        Self {
            unlocked: Mutex::new(true),
            accounts: Mutex::new(VecDeque::from([Vec::new()])),
            granted: Mutex::new(None),
            contracts: contracts
                .iter()
                .map(|c| (c.address(), Arc::clone(c)))
                .collect(),
            log_tx: Mutex::new(None),
            subscriptions: AtomicUsize::new(0),
        }
    }

    /// Wallet with one account and both contracts answering `reply`
    pub fn operational(owner: Account, app: Reply, data: Reply) -> (Arc<Self>, Arc<FakeContract>, Arc<FakeContract>) {
        let app = FakeContract::new(app_address(), app);
        let data = FakeContract::new(data_address(), data);
        let wallet = Self::new(&[Arc::clone(&app), Arc::clone(&data)]);
        wallet.set_accounts(vec![owner]);
        (Arc::new(wallet), app, data)
    }

    pub fn set_accounts(&self, accounts: Vec<Account>) {
        *self.accounts.lock().unwrap() = VecDeque::from([accounts]);
    }

    /// Queue one `eth_accounts` answer per sample
    pub fn script_accounts(&self, script: Vec<Vec<Account>>) {
        *self.accounts.lock().unwrap() = script.into();
    }

    pub fn set_unlocked(&self, unlocked: bool) {
        *self.unlocked.lock().unwrap() = unlocked;
    }

    pub fn grant_on_request(&self, accounts: Vec<Account>) {
        *self.granted.lock().unwrap() = Some(accounts);
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    /// Wait until the log pipeline has subscribed `count` times
    pub async fn wait_subscribed(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(30), async {
            while self.subscriptions() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("log subscription never opened");
    }

    pub fn emit_log(&self, entry: TransactionLogEntry) {
        if let Some(tx) = self.log_tx.lock().unwrap().as_ref() {
            let _ = tx.send(Ok(entry));
        }
    }

    /// Break the current log subscription
    pub fn fail_logs(&self) {
        if let Some(tx) = self.log_tx.lock().unwrap().take() {
            let _ = tx.send(Err(SyncError::Subscription("provider disconnected".into())));
        }
    }
}

#[async_trait]
impl WalletProvider for FakeWallet {
    async fn chain_id(&self) -> SyncResult<u64> {
        Ok(CHAIN_ID)
    }

    async fn get_accounts(&self) -> SyncResult<Vec<Account>> {
        let mut script = self.accounts.lock().unwrap();
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        Ok(next.unwrap_or_default())
    }

    async fn is_unlocked(&self) -> SyncResult<bool> {
        Ok(*self.unlocked.lock().unwrap())
    }

    async fn request_access(&self) -> SyncResult<Vec<Account>> {
        self.granted
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| RemoteCallError::UserRejected.into())
    }

    async fn get_balance(&self, _account: &Account) -> SyncResult<U256> {
        Ok(U256::from(5_000_000_000_000_000_000u128))
    }

    async fn subscribe_logs(&self, _filter: LogFilter) -> SyncResult<LogStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.log_tx.lock().unwrap() = Some(tx);
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed())
    }

    async fn bind_contract(
        &self,
        _name: ContractName,
        address: Address,
    ) -> SyncResult<Arc<dyn ContractClient>> {
        let contract: Arc<dyn ContractClient> = self
            .contracts
            .get(&address)
            .cloned()
            .unwrap_or_else(|| FakeContract::undeployed(address));
        Ok(contract)
    }
}

/// Generic log entry from an arbitrary contract
pub fn log_entry(address: Address, block: u64) -> TransactionLogEntry {
    TransactionLogEntry {
        address,
        topics: vec![alloy_primitives::B256::repeat_byte(block as u8)],
        data: Bytes::new(),
        block_number: Some(block),
        block_hash: None,
        transaction_hash: Some(alloy_primitives::B256::repeat_byte(0x42)),
        log_index: Some(0),
    }
}

/// `OperationalStatusChanged(mode)` emitted by `address`
pub fn status_changed(address: Address, mode: bool, block: u64) -> TransactionLogEntry {
    let event = OperationalStatusChanged { mode };
    TransactionLogEntry {
        address,
        topics: vec![OperationalStatusChanged::SIGNATURE_HASH],
        data: Bytes::from(event.encode_data()),
        block_number: Some(block),
        block_hash: None,
        transaction_hash: Some(alloy_primitives::B256::repeat_byte(0x43)),
        log_index: Some(0),
    }
}
