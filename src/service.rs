//! Cart Service
//!
//! The reconciliation layer. A [`CartService`] owns the in-memory line collection, decides per
//! operation whether the guest store or the remote store is authoritative, collapses duplicate
//! adds through the [`MutationGuard`], and publishes a fresh [`CartView`] to subscribers after
//! every change.
//!
//! Every read of the authoritative store is issued a ticket. A result is only committed if no
//! mode switch happened since and no later read has committed first, and a view is only
//! published if its ticket is still the latest. Slow, overlapping operations therefore cannot
//! roll the cart back to an older state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{Span, debug, info, warn};

use crate::{
    bundles::{BundleKind, BundleOption, BundleRuleSource},
    config::{CartConfig, ConfigError},
    guard::{GuardKey, MutationGuard},
    guest::GuestCartStore,
    items::{LineItem, LineItemUuid, normalize_add_quantity, normalize_update_quantity},
    products::{ProductLookup, ProductUuid},
    projection::{CartMode, CartProjection, CartView, ProjectionError},
    remote::{RemoteCartError, RemoteCartStore},
    storage::LocalStorage,
};

/// Errors surfaced by cart operations.
#[derive(Debug, thiserror::Error)]
pub enum CartError {
    /// Authentication has not resolved, so no store is authoritative yet.
    #[error("cart is not ready: authentication state has not resolved")]
    Uninitialized,

    /// The operation only makes sense for a signed-in shopper.
    #[error("operation requires an authenticated shopper")]
    NotAuthenticated,

    /// The remote cart failed; local state has been reloaded.
    #[error(transparent)]
    Remote(#[from] RemoteCartError),

    /// The cart could not be priced.
    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

/// Authentication signal supplied by the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Anonymous shopper.
    Unauthenticated,

    /// Signed-in shopper.
    Authenticated,
}

impl AuthState {
    /// Cart mode this state selects.
    #[must_use]
    pub fn mode(self) -> CartMode {
        match self {
            AuthState::Unauthenticated => CartMode::Guest,
            AuthState::Authenticated => CartMode::Authenticated,
        }
    }
}

/// Result of an add.
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    /// The add was applied; carries the resulting line.
    Applied(LineItem),

    /// An add for the same product and tier was already running, nothing was changed.
    Collapsed,
}

/// How guest lines combine with remote lines for the same product and tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Add the guest quantity onto the remote line.
    #[default]
    SumQuantities,

    /// Keep the remote line as it is and drop the guest line.
    KeepRemote,
}

/// Counts from a guest-to-remote merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeSummary {
    /// Guest lines created as new remote lines
    pub added: usize,

    /// Guest lines summed into existing remote lines
    pub combined: usize,

    /// Guest lines dropped in favour of existing remote lines
    pub skipped: usize,
}

/// Mode and epoch an operation started under.
#[derive(Debug, Clone, Copy)]
struct Session {
    mode: CartMode,
    epoch: u64,
}

#[derive(Debug, Clone, Copy)]
struct Ticket {
    mode: CartMode,
    epoch: u64,
    seq: u64,
}

#[derive(Debug, Default)]
struct CartState {
    mode: CartMode,

    /// Bumped on every mode switch.
    epoch: u64,

    /// Last ticket handed out.
    issued: u64,

    /// Ticket whose items are currently held.
    committed: u64,

    items: Vec<LineItem>,
}

/// Cart reconciliation layer.
pub struct CartService {
    guest: GuestCartStore,
    remote: Arc<dyn RemoteCartStore>,
    projection: CartProjection,
    guard: MutationGuard,
    state: Mutex<CartState>,
    view: watch::Sender<CartView>,
}

impl std::fmt::Debug for CartService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartService")
            .field("guest", &self.guest)
            .field("projection", &self.projection)
            .field("guard", &self.guard)
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}

impl CartService {
    /// Create a service in the uninitialised mode.
    pub fn new(
        guest: GuestCartStore,
        remote: Arc<dyn RemoteCartStore>,
        projection: CartProjection,
    ) -> Self {
        let (view, _) = watch::channel(CartView::empty(
            CartMode::Uninitialized,
            projection.currency(),
        ));

        Self {
            guest,
            remote,
            projection,
            guard: MutationGuard::new(),
            state: Mutex::new(CartState::default()),
            view,
        }
    }

    /// Wire a service from configuration and its collaborators.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configured currency is unknown.
    pub fn from_config(
        config: &CartConfig,
        storage: Arc<dyn LocalStorage>,
        remote: Arc<dyn RemoteCartStore>,
        products: Arc<dyn ProductLookup>,
        rules: Arc<dyn BundleRuleSource>,
    ) -> Result<Self, ConfigError> {
        let projection =
            CartProjection::new(products, rules, config.currency()?, config.presets_enabled());

        Ok(Self::new(
            GuestCartStore::new(storage, config.storage_key.clone()),
            remote,
            projection,
        ))
    }

    /// Current mode.
    pub fn mode(&self) -> CartMode {
        self.state().mode
    }

    /// Lines currently held in memory.
    pub fn items(&self) -> Vec<LineItem> {
        self.state().items.clone()
    }

    /// Latest published view.
    pub fn view(&self) -> CartView {
        self.view.borrow().clone()
    }

    /// Receive every view published from now on.
    pub fn subscribe(&self) -> watch::Receiver<CartView> {
        self.view.subscribe()
    }

    /// Guest store backing anonymous carts.
    pub fn guest(&self) -> &GuestCartStore {
        &self.guest
    }

    /// Whether an add for the product and tier is running.
    pub fn is_add_in_flight(&self, product: ProductUuid, kind: Option<BundleKind>) -> bool {
        self.guard.is_in_flight(GuardKey::new(product, kind))
    }

    /// React to an authentication change.
    ///
    /// Switching mode discards the in-memory lines and reloads from the newly authoritative
    /// store; repeating the current state is a no-op. Guest lines are never merged implicitly,
    /// see [`CartService::merge_guest_cart`].
    ///
    /// # Errors
    ///
    /// Returns a [`CartError`] if the reload fails.
    #[tracing::instrument(name = "cart.service.set_auth_state", skip(self), err)]
    pub async fn set_auth_state(&self, auth: AuthState) -> Result<CartView, CartError> {
        let mode = auth.mode();

        {
            let mut state = self.state();

            if state.mode == mode {
                return Ok(self.view());
            }

            info!(from = ?state.mode, to = ?mode, "cart mode switch");

            state.mode = mode;
            state.epoch += 1;
        }

        self.reload_cart().await
    }

    /// Follow an authentication channel until its sender is dropped.
    pub async fn follow_auth(&self, mut auth: watch::Receiver<AuthState>) {
        loop {
            let current = *auth.borrow_and_update();

            if let Err(error) = self.set_auth_state(current).await {
                warn!(%error, "cart reload after authentication change failed");
            }

            if auth.changed().await.is_err() {
                break;
            }
        }
    }

    /// Clear the in-memory cart, then repopulate it from the authoritative store.
    ///
    /// # Errors
    ///
    /// Returns a [`CartError`] if the authoritative store or the projection fails.
    #[tracing::instrument(
        name = "cart.service.reload",
        skip(self),
        fields(mode = tracing::field::Empty),
        err
    )]
    pub async fn reload_cart(&self) -> Result<CartView, CartError> {
        let ticket = {
            let mut state = self.state();
            state.issued += 1;

            let ticket = Ticket {
                mode: state.mode,
                epoch: state.epoch,
                seq: state.issued,
            };

            state.items.clear();
            state.committed = ticket.seq;

            ticket
        };

        Span::current().record("mode", tracing::field::debug(ticket.mode));

        self.view
            .send_replace(CartView::empty(ticket.mode, self.projection.currency()));

        self.refresh(ticket).await
    }

    /// Add units of a product.
    ///
    /// Quantities below one are treated as one. An existing line for the same product and tier
    /// is incremented; signed in, that line is looked up in a fresh read of the remote cart. If
    /// an add for the same product and tier is already running, this call changes nothing and
    /// returns [`AddOutcome::Collapsed`].
    ///
    /// # Errors
    ///
    /// - [`CartError::Uninitialized`]: authentication has not resolved.
    /// - [`CartError::Remote`]: the remote cart failed; the cart has been reloaded.
    #[tracing::instrument(
        name = "cart.service.add",
        skip(self, product, bundle),
        fields(
            product_uuid = %product,
            bundle_kind = tracing::field::Empty,
            mode = tracing::field::Empty
        ),
        err
    )]
    pub async fn add(
        &self,
        product: ProductUuid,
        quantity: i64,
        bundle: Option<BundleOption>,
    ) -> Result<AddOutcome, CartError> {
        let session = self.active_session()?;
        let quantity = normalize_add_quantity(quantity);
        let kind = bundle.as_ref().map(BundleOption::kind);

        let span = Span::current();

        span.record("mode", tracing::field::debug(session.mode));

        if let Some(kind) = kind {
            span.record("bundle_kind", tracing::field::display(kind));
        }

        let Some(_in_flight) = self.guard.try_acquire(GuardKey::new(product, kind)) else {
            debug!("collapsed duplicate add");
            return Ok(AddOutcome::Collapsed);
        };

        let item = match session.mode {
            CartMode::Authenticated => {
                let remote_items = {
                    let result = self.remote.list().await;
                    self.settle(session, result).await?
                };

                let existing = remote_items
                    .into_iter()
                    .find(|item| item.matches(product, kind));

                let result = match existing {
                    Some(line) => {
                        match self
                            .remote
                            .update_quantity(line.uuid, line.quantity.saturating_add(quantity))
                            .await
                        {
                            Err(RemoteCartError::NotFound) => {
                                self.remote.add(product, quantity, bundle).await
                            }
                            other => other,
                        }
                    }
                    None => self.remote.add(product, quantity, bundle).await,
                };

                let item = self.settle(session, result).await?;
                self.refresh_applied(self.ticket(session)).await;

                item
            }
            CartMode::Guest => {
                let ticket = self.ticket(session);
                let item = self.guest.add(product, i64::from(quantity), bundle);

                self.commit_guest(ticket).await;

                item
            }
            CartMode::Uninitialized => return Err(CartError::Uninitialized),
        };

        Ok(AddOutcome::Applied(item))
    }

    /// Set a line's quantity; zero or less removes the line and returns `None`.
    ///
    /// Updates are not deduplicated: the last one processed wins.
    ///
    /// # Errors
    ///
    /// - [`CartError::Uninitialized`]: authentication has not resolved.
    /// - [`CartError::Remote`]: the remote cart failed; the cart has been reloaded.
    #[tracing::instrument(
        name = "cart.service.update_quantity",
        skip(self, line),
        fields(line_uuid = %line),
        err
    )]
    pub async fn update_quantity(
        &self,
        line: LineItemUuid,
        quantity: i64,
    ) -> Result<Option<LineItem>, CartError> {
        let session = self.active_session()?;

        match session.mode {
            CartMode::Authenticated => {
                let updated = match normalize_update_quantity(quantity) {
                    Some(quantity) => {
                        let result = self.remote.update_quantity(line, quantity).await;
                        Some(self.settle(session, result).await?)
                    }
                    None => {
                        let result = ignore_missing(self.remote.remove(line).await);
                        self.settle(session, result).await?;
                        None
                    }
                };

                self.refresh_applied(self.ticket(session)).await;

                Ok(updated)
            }
            CartMode::Guest => {
                let ticket = self.ticket(session);
                let updated = self.guest.update_quantity(line, quantity);

                self.commit_guest(ticket).await;

                Ok(updated)
            }
            CartMode::Uninitialized => Err(CartError::Uninitialized),
        }
    }

    /// Remove a line; removing a line that does not exist succeeds.
    ///
    /// # Errors
    ///
    /// - [`CartError::Uninitialized`]: authentication has not resolved.
    /// - [`CartError::Remote`]: the remote cart failed; the cart has been reloaded.
    #[tracing::instrument(
        name = "cart.service.remove",
        skip(self, line),
        fields(line_uuid = %line),
        err
    )]
    pub async fn remove(&self, line: LineItemUuid) -> Result<(), CartError> {
        let session = self.active_session()?;

        match session.mode {
            CartMode::Authenticated => {
                let result = ignore_missing(self.remote.remove(line).await);

                self.settle(session, result).await?;
                self.refresh_applied(self.ticket(session)).await;
            }
            CartMode::Guest => {
                let ticket = self.ticket(session);

                self.guest.remove(line);
                self.commit_guest(ticket).await;
            }
            CartMode::Uninitialized => return Err(CartError::Uninitialized),
        }

        Ok(())
    }

    /// Remove every line.
    ///
    /// # Errors
    ///
    /// - [`CartError::Uninitialized`]: authentication has not resolved.
    /// - [`CartError::Remote`]: the remote cart failed; the cart has been reloaded.
    #[tracing::instrument(name = "cart.service.clear", skip(self), err)]
    pub async fn clear(&self) -> Result<(), CartError> {
        let session = self.active_session()?;

        match session.mode {
            CartMode::Authenticated => {
                let result = self.remote.clear().await;

                self.settle(session, result).await?;
                self.refresh_applied(self.ticket(session)).await;
            }
            CartMode::Guest => {
                let ticket = self.ticket(session);

                self.guest.clear();
                self.commit_guest(ticket).await;
            }
            CartMode::Uninitialized => return Err(CartError::Uninitialized),
        }

        Ok(())
    }

    /// Move the guest cart into the remote cart of a signed-in shopper.
    ///
    /// Each guest line is removed from the guest store as soon as it has been merged, so a
    /// merge interrupted by a remote failure can be retried without counting lines twice.
    ///
    /// # Errors
    ///
    /// - [`CartError::NotAuthenticated`]: the service is not in authenticated mode.
    /// - [`CartError::Remote`]: the remote cart failed; the cart has been reloaded.
    #[tracing::instrument(name = "cart.service.merge_guest_cart", skip(self), err)]
    pub async fn merge_guest_cart(&self, policy: MergePolicy) -> Result<MergeSummary, CartError> {
        let session = self.session();

        if session.mode != CartMode::Authenticated {
            return Err(CartError::NotAuthenticated);
        }

        let guest_items = self.guest.list();
        let mut summary = MergeSummary::default();

        if guest_items.is_empty() {
            return Ok(summary);
        }

        let remote_items = {
            let result = self.remote.list().await;
            self.settle(session, result).await?
        };

        for guest_item in guest_items {
            let existing = remote_items
                .iter()
                .find(|item| item.matches(guest_item.product, guest_item.bundle_kind()));

            match (existing, policy) {
                (Some(remote_item), MergePolicy::SumQuantities) => {
                    let result = self
                        .remote
                        .update_quantity(
                            remote_item.uuid,
                            remote_item.quantity.saturating_add(guest_item.quantity),
                        )
                        .await;

                    self.settle(session, result).await?;
                    summary.combined += 1;
                }
                (Some(_), MergePolicy::KeepRemote) => {
                    summary.skipped += 1;
                }
                (None, _) => {
                    let result = self
                        .remote
                        .add(guest_item.product, guest_item.quantity, guest_item.bundle)
                        .await;

                    self.settle(session, result).await?;
                    summary.added += 1;
                }
            }

            self.guest.remove(guest_item.uuid);
        }

        self.refresh_applied(self.ticket(session)).await;

        info!(
            added = summary.added,
            combined = summary.combined,
            skipped = summary.skipped,
            "merged guest cart"
        );

        Ok(summary)
    }

    fn state(&self) -> MutexGuard<'_, CartState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session(&self) -> Session {
        let state = self.state();

        Session {
            mode: state.mode,
            epoch: state.epoch,
        }
    }

    fn active_session(&self) -> Result<Session, CartError> {
        let session = self.session();

        match session.mode {
            CartMode::Uninitialized => Err(CartError::Uninitialized),
            _ => Ok(session),
        }
    }

    /// Issue a ticket bound to the session's epoch; it goes stale if the mode has since switched.
    fn ticket(&self, session: Session) -> Ticket {
        let mut state = self.state();
        state.issued += 1;

        Ticket {
            mode: session.mode,
            epoch: session.epoch,
            seq: state.issued,
        }
    }

    /// Pass a remote result through, reloading from the remote store first when it failed.
    async fn settle<T>(
        &self,
        session: Session,
        result: Result<T, RemoteCartError>,
    ) -> Result<T, CartError> {
        match result {
            Ok(value) => Ok(value),
            Err(error) => {
                warn!(%error, "remote cart mutation failed, reloading");

                if let Err(reload_error) = self.refresh(self.ticket(session)).await {
                    warn!(error = %reload_error, "reload after failed mutation also failed");
                }

                Err(error.into())
            }
        }
    }

    /// Commit the guest store's current lines and publish the projection.
    ///
    /// The guest mutation has already been applied, so a pricing failure is only logged.
    async fn commit_guest(&self, ticket: Ticket) {
        let items = self.guest.list();

        if let Err(error) = self.publish(ticket, items).await {
            warn!(%error, "failed to project guest cart after mutation");
        }
    }

    /// Re-read after a remote mutation that succeeded.
    ///
    /// A failed re-read is logged rather than returned: the mutation is applied and callers
    /// must not retry it.
    async fn refresh_applied(&self, ticket: Ticket) {
        if let Err(error) = self.refresh(ticket).await {
            warn!(%error, "cart refresh after applied mutation failed");
        }
    }

    /// Read the authoritative store for the ticket's mode and publish the projection.
    async fn refresh(&self, ticket: Ticket) -> Result<CartView, CartError> {
        let items = match ticket.mode {
            CartMode::Authenticated => self.remote.list().await?,
            CartMode::Guest => self.guest.hydrate(self.projection.products()).await,
            CartMode::Uninitialized => Vec::new(),
        };

        self.publish(ticket, items).await
    }

    async fn publish(&self, ticket: Ticket, items: Vec<LineItem>) -> Result<CartView, CartError> {
        {
            let mut state = self.state();

            if ticket.epoch != state.epoch || ticket.seq < state.committed {
                debug!(seq = ticket.seq, "discarding stale cart read");
                return Ok(self.view());
            }

            state.items.clone_from(&items);
            state.committed = ticket.seq;
        }

        let view = self.projection.project(ticket.mode, &items).await?;

        let latest = {
            let state = self.state();
            state.epoch == ticket.epoch && state.committed == ticket.seq
        };

        if latest {
            self.view.send_replace(view.clone());
        }

        Ok(view)
    }
}

fn ignore_missing(result: Result<(), RemoteCartError>) -> Result<(), RemoteCartError> {
    match result {
        Err(RemoteCartError::NotFound) => Ok(()),
        other => other,
    }
}
