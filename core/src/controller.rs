//! Holder-facing state: connection, balance, pending amount and the purchase
//! in progress. Every mutation publishes a fresh [`ViewState`] snapshot.

use ethers::types::Address;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use utoipa::ToSchema;

use crate::amount::Amount;
use crate::balance;
use crate::errors::{FlowError, NoticeKind};
use crate::network;
use crate::purchase::{CancelFlag, PurchaseFlow, PurchaseReceipt, PurchaseState};
use crate::wallet::{Connector, Session};

// ── View ──────────────────────────────────────────────────────────────────────

/// A failure the holder has to acknowledge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Notice {
    pub kind: NoticeKind,
    pub code: String,
    pub message: String,
}

impl From<&FlowError> for Notice {
    fn from(error: &FlowError) -> Self {
        Self {
            kind: error.notice_kind(),
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Snapshot rendered by whatever front end subscribes to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ViewState {
    pub connected: bool,
    /// Backend the session was opened on.
    pub backend: Option<String>,
    #[schema(value_type = Option<String>)]
    pub account: Option<Address>,
    pub loading: bool,
    /// Token balance in base units, as of the last refresh.
    #[schema(value_type = String)]
    pub balance: Amount,
    pub balance_display: String,
    #[schema(value_type = String)]
    pub total_supply: Amount,
    /// Pending purchase amount in base units.
    #[schema(value_type = String)]
    pub amount: Amount,
    pub purchase: PurchaseState,
    pub can_purchase: bool,
    /// Last non-blocking status line.
    pub status: Option<String>,
    pub notice: Option<Notice>,
    pub swap_widget: bool,
}

impl ViewState {
    fn initial(swap_widget: bool) -> Self {
        Self {
            connected: false,
            backend: None,
            account: None,
            loading: false,
            balance: Amount::zero(),
            balance_display: "0".to_string(),
            total_supply: Amount::zero(),
            amount: Amount::zero(),
            purchase: PurchaseState::Idle,
            can_purchase: false,
            status: None,
            notice: None,
            swap_widget,
        }
    }
}

/// Result of asking the controller to purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseTrigger {
    Completed(PurchaseReceipt),
    Failed(FlowError),
    /// A purchase was already in flight; nothing was submitted.
    Ignored,
    /// No session or a zero amount.
    Disabled,
}

/// Exclusive right to run one purchase. Dropping it re-arms the trigger.
pub struct PurchaseTicket {
    session: Session,
    amount: Amount,
    in_flight: Arc<AtomicBool>,
}

impl PurchaseTicket {
    pub fn amount(&self) -> Amount {
        self.amount
    }
}

impl Drop for PurchaseTicket {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

// ── Controller ────────────────────────────────────────────────────────────────

pub struct Controller {
    connector: Connector,
    flow: PurchaseFlow,
    token_decimals: u8,
    session: RwLock<Option<Session>>,
    view: watch::Sender<ViewState>,
    in_flight: Arc<AtomicBool>,
    cancel: CancelFlag,
}

impl Controller {
    pub fn new(connector: Connector, flow: PurchaseFlow, token_decimals: u8, swap_widget: bool) -> Self {
        let (view, _) = watch::channel(ViewState::initial(swap_widget));
        Self {
            connector,
            flow,
            token_decimals,
            session: RwLock::new(None),
            view,
            in_flight: Arc::new(AtomicBool::new(false)),
            cancel: CancelFlag::default(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.view.subscribe()
    }

    pub fn view(&self) -> ViewState {
        self.view.borrow().clone()
    }

    pub fn can_purchase(&self) -> bool {
        self.view.borrow().can_purchase
    }

    // `send_modify` publishes even without subscribers.
    fn update(&self, mutate: impl FnOnce(&mut ViewState)) {
        self.view.send_modify(|view| {
            mutate(view);
            view.can_purchase = view.connected
                && !view.amount.is_zero()
                && !view.loading
                && !view.purchase.in_flight();
        });
    }

    fn report(&self, error: &FlowError) {
        match error.notice_kind() {
            NoticeKind::Blocking => {
                tracing::warn!(code = error.code(), "{error}");
                self.update(|v| v.notice = Some(Notice::from(error)));
            }
            NoticeKind::Status => {
                tracing::info!(code = error.code(), "{error}");
                self.update(|v| v.status = Some(error.to_string()));
            }
            NoticeKind::Silent => tracing::debug!(code = error.code(), "{error}"),
        }
    }

    async fn current_session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    // ── Connection ────────────────────────────────────────────────────────

    /// Open a session, replacing any previous one, then check the network
    /// and load balances.
    ///
    /// A network mismatch does not fail the connect: the session stays and a
    /// blocking notice is shown. Every later read or purchase re-checks.
    pub async fn connect(&self) -> Result<(), FlowError> {
        let session = match self.connector.connect().await {
            Ok(session) => session,
            Err(e) => {
                self.report(&e);
                return Err(e);
            }
        };

        let backend = session.backend_name().to_string();
        let account = session.account();
        *self.session.write().await = Some(session.clone());
        self.update(|v| {
            v.connected = true;
            v.backend = Some(backend);
            v.account = Some(account);
            v.notice = None;
            v.status = None;
        });

        if let Err(e) = self.load_holdings(&session).await {
            self.report(&e);
        }
        Ok(())
    }

    /// Connect in a background task. Failures end up in the view as a notice.
    pub fn spawn_connect(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = controller.connect().await {
                tracing::warn!("Auto-connect failed: {}", e);
            }
        })
    }

    pub async fn disconnect(&self) {
        if self.in_flight.load(Ordering::SeqCst) {
            self.cancel.cancel();
        }
        if let Some(session) = self.session.write().await.take() {
            tracing::info!(backend = %session.backend_name(), "Wallet disconnected");
        }
        self.update(|v| {
            let swap_widget = v.swap_widget;
            *v = ViewState::initial(swap_widget);
        });
    }

    // ── Amount & balance ──────────────────────────────────────────────────

    /// Set the pending amount from holder input. Unparseable input sets it
    /// to zero and shows a status line.
    pub fn set_amount(&self, input: &str) -> Result<Amount, FlowError> {
        match Amount::parse(input) {
            Ok(amount) => {
                self.update(|v| {
                    v.amount = amount;
                    v.status = None;
                });
                Ok(amount)
            }
            Err(e) => {
                self.update(|v| v.amount = Amount::zero());
                self.report(&e);
                Err(e)
            }
        }
    }

    /// Re-read the holder's token balance and the total supply. Failed reads
    /// display as zero.
    pub async fn refresh_balance(&self) -> Amount {
        let Some(session) = self.current_session().await else {
            return Amount::zero();
        };
        if let Err(e) = self.load_holdings(&session).await {
            tracing::warn!(error = %e, "Balance refresh skipped, displaying zero");
        }
        self.view.borrow().balance
    }

    /// Guard the network once, then read balance and supply into the view.
    /// Only a guard failure is returned; read failures display as zero.
    async fn load_holdings(&self, session: &Session) -> Result<(), FlowError> {
        let settings = self.flow.settings();

        let guard = network::assert_network(session, settings.chain_id).await;
        let (balance, total_supply) = if guard.is_ok() {
            let balance = balance::balance_or_zero(
                balance::balance_of(session, settings.token_address, session.account()).await,
            );
            let total_supply = balance::balance_or_zero(
                balance::total_supply_of(session, settings.token_address).await,
            );
            (balance, total_supply)
        } else {
            (Amount::zero(), Amount::zero())
        };
        let display = balance.format(self.token_decimals);
        tracing::debug!(balance = %balance, total_supply = %total_supply, "Balances refreshed");
        self.update(|v| {
            v.balance = balance;
            v.balance_display = display;
            v.total_supply = total_supply;
        });
        guard
    }

    // ── Purchase ──────────────────────────────────────────────────────────

    /// Claim the purchase trigger. Fails with `Ignored` while another
    /// purchase holds it and with `Disabled` when there is nothing to buy.
    pub async fn begin_purchase(&self) -> Result<PurchaseTicket, PurchaseTrigger> {
        let amount = self.view.borrow().amount;
        let Some(session) = self.current_session().await else {
            return Err(PurchaseTrigger::Disabled);
        };
        if amount.is_zero() {
            return Err(PurchaseTrigger::Disabled);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Purchase already in flight, trigger ignored");
            return Err(PurchaseTrigger::Ignored);
        }

        self.cancel.reset();
        Ok(PurchaseTicket {
            session,
            amount,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Drive a claimed purchase to its end and settle the view.
    pub async fn run_purchase(&self, ticket: PurchaseTicket) -> PurchaseTrigger {
        self.update(|v| {
            v.loading = true;
            v.status = None;
            v.notice = None;
        });
        let result = self
            .flow
            .run(&ticket.session, ticket.amount, &self.cancel, |state| {
                self.update(|v| {
                    v.purchase = state;
                    if matches!(state, PurchaseState::Complete | PurchaseState::Failed) {
                        v.loading = false;
                    }
                });
            })
            .await;

        let trigger = match result {
            Ok(receipt) => {
                self.update(|v| {
                    v.status = Some(format!("Purchased {} tokens", receipt.amount));
                });
                self.refresh_balance().await;
                self.update(|v| v.purchase = PurchaseState::Idle);
                PurchaseTrigger::Completed(receipt)
            }
            Err(e) => {
                self.update(|v| {
                    v.loading = false;
                    v.purchase = PurchaseState::Failed;
                });
                self.report(&e);
                PurchaseTrigger::Failed(e)
            }
        };
        drop(ticket);
        trigger
    }

    pub async fn purchase(&self) -> PurchaseTrigger {
        match self.begin_purchase().await {
            Ok(ticket) => self.run_purchase(ticket).await,
            Err(trigger) => trigger,
        }
    }

    /// Abort the receipt wait of the purchase in flight, if any.
    pub fn cancel_purchase(&self) -> bool {
        if self.in_flight.load(Ordering::SeqCst) {
            tracing::info!("Purchase cancellation requested");
            self.cancel.cancel();
            true
        } else {
            false
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
