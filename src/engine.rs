//! The highlight engine.
//!
//! [`Highlighter`] owns every piece of mutable state: the trigger
//! index, the grace trackers, the per-owner settings, and the
//! notification queue. [`Engine`] runs it as a single task multiplexing
//! a command channel, the dispatch interval, and the shutdown signal
//! with `tokio::select!`; [`EngineHandle`] is the cloneable surface the
//! host application talks to.
//!
//! # Concurrency model
//!
//! All state mutation happens on the engine task, so no locks are
//! taken anywhere. The two places work leaves that task are safe by
//! construction:
//!
//! - each matched candidate's eligibility pipeline is spawned as its
//!   own task with snapshots of the owner's settings, and its verdict
//!   re-enters the loop as an internal enqueue command, so one slow
//!   membership lookup never stalls ingestion;
//! - each tick's drained snapshot is handed to a spawned dispatch
//!   task, with the swap itself done on the engine task, so messages
//!   arriving mid-dispatch land in the next window.
//!
//! # Example
//!
//! ```rust,ignore
//! use earshot::{Engine, EngineConfig};
//! use std::sync::Arc;
//!
//! let config = EngineConfig::load()?;
//! let delivery = config.build_delivery();
//! let (engine, handle) = Engine::new(&config, store, gateway, delivery);
//! let shutdown = engine.shutdown_signal();
//! tokio::spawn(engine.run());
//!
//! // from the host's message listener:
//! handle.handle_message(message).await?;
//!
//! // at teardown:
//! shutdown.trigger();
//! ```

use crate::config::EngineConfig;
use crate::delivery::Delivery;
use crate::dispatch::Dispatcher;
use crate::filter::EligibilityFilter;
use crate::gateway::ChatGateway;
use crate::grace::GracePeriodTracker;
use crate::message::{ChatMessage, UserId};
use crate::queue::{NotificationQueue, PendingNotification};
use crate::settings::UserSettings;
use crate::shutdown::ShutdownSignal;
use crate::store::{StoreError, TriggerStore};
use crate::trigger::{RemoveSelector, Trigger, TriggerError, TriggerIndex};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Errors surfaced by the [`EngineHandle`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine task has stopped; commands can no longer be served
    #[error("highlight engine is not running")]
    Stopped,

    /// A trigger lifecycle operation failed
    #[error(transparent)]
    Trigger(#[from] TriggerError),
}

/// The engine's state core: owns all mutable state, no locks.
///
/// Kept separate from the [`Engine`] run loop so the state transitions
/// are directly testable without spawning tasks.
pub struct Highlighter {
    triggers: TriggerIndex,
    grace: GracePeriodTracker,
    settings: HashMap<UserId, UserSettings>,
    queue: NotificationQueue,
    store: Arc<dyn TriggerStore>,
    default_grace: Duration,
}

impl Highlighter {
    /// Create an empty highlighter over the given store.
    pub fn new(store: Arc<dyn TriggerStore>, default_grace: Duration) -> Self {
        Self {
            triggers: TriggerIndex::new(),
            grace: GracePeriodTracker::new(),
            settings: HashMap::new(),
            queue: NotificationQueue::new(),
            store,
            default_grace,
        }
    }

    /// Load persisted triggers at startup.
    ///
    /// Records that no longer validate (length or quota drift, or
    /// duplicates) are logged and skipped; the store is host-owned and
    /// may contain rows written under older rules.
    pub async fn load(&mut self) -> Result<(), StoreError> {
        let records = self.store.load_all().await?;
        let total = records.len();

        for record in records {
            let validated = self
                .triggers
                .validate_add(record.owner_id, &record.phrase)
                .and_then(|()| Trigger::new(record.owner_id, record.phrase.clone()));
            match validated {
                Ok(trigger) => {
                    let decay = self.grace_for(record.owner_id);
                    self.grace.ensure(record.owner_id, decay);
                    self.triggers.insert(trigger);
                }
                Err(e) => {
                    warn!(owner = %record.owner_id, error = %e, "Skipping invalid persisted trigger");
                }
            }
        }

        info!(
            loaded = self.triggers.len(),
            total = total,
            "Trigger index loaded from store"
        );
        Ok(())
    }

    fn grace_for(&self, owner: UserId) -> Duration {
        self.settings
            .get(&owner)
            .map_or(self.default_grace, |s| Duration::from_secs(s.timeout_secs()))
    }

    /// Add a trigger for `owner`, persisting before any state change.
    pub async fn add_trigger(
        &mut self,
        owner: UserId,
        phrase: &str,
    ) -> Result<Arc<Trigger>, TriggerError> {
        let trigger = Trigger::new(owner, phrase)?;
        self.triggers.validate_add(owner, phrase)?;

        self.store.insert(owner, phrase).await?;

        let decay = self.grace_for(owner);
        self.grace.ensure(owner, decay);
        Ok(self.triggers.insert(trigger))
    }

    /// Remove triggers by selector, persisting deletions first.
    pub async fn remove_triggers(
        &mut self,
        owner: UserId,
        selector: &RemoveSelector,
    ) -> Result<Vec<Arc<Trigger>>, TriggerError> {
        let plan = self.triggers.plan_removal(owner, selector)?;
        self.store.delete(owner, &plan.phrases).await?;
        Ok(self.triggers.apply_removal(plan))
    }

    /// An owner's triggers in display order.
    pub fn list_triggers(&self, owner: UserId) -> Vec<Arc<Trigger>> {
        self.triggers.triggers(owner).to_vec()
    }

    /// Apply a settings change.
    ///
    /// The grace tracker is recreated only when the timeout actually
    /// changed; pending windows survive unrelated settings edits.
    pub fn update_settings(&mut self, owner: UserId, settings: UserSettings) {
        let new_decay = Duration::from_secs(settings.timeout_secs());
        match self.grace.decay_of(owner) {
            Some(current) if current == new_decay => {}
            _ => {
                debug!(owner = %owner, decay_secs = new_decay.as_secs(), "Grace tracker recreated");
                self.grace.reset(owner, new_decay);
            }
        }
        self.settings.insert(owner, settings);
    }

    /// Remove every trace of an owner (profile deletion).
    pub fn delete_profile(&mut self, owner: UserId) {
        self.triggers.remove_owner(owner);
        self.grace.remove(owner);
        self.settings.remove(&owner);
        info!(owner = %owner, "Profile removed from highlight engine");
    }

    /// Scan one inbound message against the flattened trigger list.
    ///
    /// Marks the author active in their own grace tracker, then
    /// returns the matched candidates that are not grace-suppressed,
    /// each with a snapshot of the owner's settings for the
    /// eligibility pipeline.
    pub fn scan(&mut self, message: &ChatMessage) -> Vec<(Arc<Trigger>, UserSettings)> {
        if self.triggers.owns_any(message.author_id) {
            self.grace.mark_active(message.author_id, message.channel_id);
        }

        let grace = &self.grace;
        let settings = &self.settings;
        let channel = message.channel_id;
        self.triggers
            .flattened()
            .iter()
            .filter(|t| t.matches(&message.content))
            .filter(|t| !grace.in_grace(t.owner_id, channel))
            .map(|t| {
                let snapshot = settings.get(&t.owner_id).cloned().unwrap_or_default();
                (t.clone(), snapshot)
            })
            .collect()
    }

    /// Merge a surviving match into the queue.
    pub fn enqueue(&mut self, trigger: Arc<Trigger>, message: ChatMessage) {
        self.queue.upsert(trigger, message);
    }

    /// Take the queued notifications for this tick, and use the
    /// occasion to purge expired grace entries.
    pub fn drain(&mut self) -> Vec<PendingNotification> {
        self.grace.purge_expired();
        self.queue.drain()
    }
}

/// Commands flowing into the engine task.
enum Command {
    Message(ChatMessage),
    AddTrigger {
        owner: UserId,
        phrase: String,
        reply: oneshot::Sender<Result<Arc<Trigger>, TriggerError>>,
    },
    RemoveTriggers {
        owner: UserId,
        selector: RemoveSelector,
        reply: oneshot::Sender<Result<Vec<Arc<Trigger>>, TriggerError>>,
    },
    ListTriggers {
        owner: UserId,
        reply: oneshot::Sender<Vec<Arc<Trigger>>>,
    },
    UpdateSettings {
        owner: UserId,
        settings: UserSettings,
    },
    DeleteProfile {
        owner: UserId,
    },
    /// Internal: a spawned eligibility pipeline voted yes
    Enqueue {
        trigger: Arc<Trigger>,
        message: ChatMessage,
    },
}

/// The engine task: one `select!` loop over commands, ticks, and
/// shutdown.
pub struct Engine {
    highlighter: Highlighter,
    filter: Arc<EligibilityFilter>,
    dispatcher: Arc<Dispatcher>,
    shutdown: ShutdownSignal,
    interval: Duration,
    tx: mpsc::Sender<Command>,
    rx: mpsc::Receiver<Command>,
}

impl Engine {
    /// Wire up an engine and its handle from the configuration and the
    /// three external collaborators.
    pub fn new(
        config: &EngineConfig,
        store: Arc<dyn TriggerStore>,
        gateway: Arc<dyn ChatGateway>,
        delivery: Arc<dyn Delivery>,
    ) -> (Self, EngineHandle) {
        let (tx, rx) = mpsc::channel(config.engine.command_buffer);

        let engine = Self {
            highlighter: Highlighter::new(store, config.default_grace()),
            filter: Arc::new(EligibilityFilter::new(gateway.clone())),
            dispatcher: Arc::new(Dispatcher::with_limits(
                gateway,
                delivery,
                config.context.window,
                config.context.budget,
            )),
            shutdown: ShutdownSignal::new(),
            interval: config.dispatch_interval(),
            tx: tx.clone(),
            rx,
        };

        (engine, EngineHandle { tx })
    }

    /// The signal that stops this engine.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Load persisted triggers and run until shutdown.
    ///
    /// Queued-but-undelivered notifications are discarded at shutdown;
    /// delivery is at-most-once.
    pub async fn run(mut self) -> Result<(), StoreError> {
        self.highlighter.load().await?;

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // Skip the first immediate tick
        ticker.tick().await;

        info!(
            interval_secs = self.interval.as_secs(),
            "Highlight engine running"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    let discarded = self.highlighter.drain().len();
                    info!(discarded = discarded, "Highlight engine stopped");
                    break;
                }
                Some(command) = self.rx.recv() => {
                    self.handle_command(command).await;
                }
                _ = ticker.tick() => {
                    self.dispatch_tick();
                }
            }
        }

        Ok(())
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Message(message) => self.on_message(message),
            Command::AddTrigger { owner, phrase, reply } => {
                let result = self.highlighter.add_trigger(owner, &phrase).await;
                let _ = reply.send(result);
            }
            Command::RemoveTriggers { owner, selector, reply } => {
                let result = self.highlighter.remove_triggers(owner, &selector).await;
                let _ = reply.send(result);
            }
            Command::ListTriggers { owner, reply } => {
                let _ = reply.send(self.highlighter.list_triggers(owner));
            }
            Command::UpdateSettings { owner, settings } => {
                self.highlighter.update_settings(owner, settings);
            }
            Command::DeleteProfile { owner } => {
                self.highlighter.delete_profile(owner);
            }
            Command::Enqueue { trigger, message } => {
                self.highlighter.enqueue(trigger, message);
            }
        }
    }

    /// Scan a message and spawn one eligibility pipeline per surviving
    /// candidate. Verdicts re-enter the loop as enqueue commands.
    fn on_message(&mut self, message: ChatMessage) {
        let candidates = self.highlighter.scan(&message);
        if candidates.is_empty() {
            return;
        }

        debug!(
            message_id = %message.id,
            candidates = candidates.len(),
            "Trigger matches found, checking eligibility"
        );

        for (trigger, settings) in candidates {
            let filter = self.filter.clone();
            let tx = self.tx.clone();
            let message = message.clone();
            tokio::spawn(async move {
                if filter.check(trigger.owner_id, &message, &settings).await {
                    // Send fails only at shutdown; the verdict is moot then
                    let _ = tx.send(Command::Enqueue { trigger, message }).await;
                }
            });
        }
    }

    /// Swap the queue on the engine task, deliver off it.
    fn dispatch_tick(&mut self) {
        let batch = self.highlighter.drain();
        if batch.is_empty() {
            return;
        }
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            dispatcher.dispatch(batch).await;
        });
    }
}

/// Cloneable command surface for the engine.
///
/// All methods go through the engine's command channel; they fail with
/// [`EngineError::Stopped`] once the engine task has exited.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
}

impl EngineHandle {
    /// Feed one inbound message into the engine.
    pub async fn handle_message(&self, message: ChatMessage) -> Result<(), EngineError> {
        self.tx
            .send(Command::Message(message))
            .await
            .map_err(|_| EngineError::Stopped)
    }

    /// Subscribe `owner` to a new trigger phrase.
    pub async fn add_trigger(
        &self,
        owner: UserId,
        phrase: impl Into<String>,
    ) -> Result<Arc<Trigger>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::AddTrigger {
                owner,
                phrase: phrase.into(),
                reply,
            })
            .await
            .map_err(|_| EngineError::Stopped)?;
        Ok(rx.await.map_err(|_| EngineError::Stopped)??)
    }

    /// Remove triggers by selector; returns the removed triggers.
    pub async fn remove_triggers(
        &self,
        owner: UserId,
        selector: RemoveSelector,
    ) -> Result<Vec<Arc<Trigger>>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::RemoveTriggers {
                owner,
                selector,
                reply,
            })
            .await
            .map_err(|_| EngineError::Stopped)?;
        Ok(rx.await.map_err(|_| EngineError::Stopped)??)
    }

    /// An owner's triggers in display order.
    pub async fn list_triggers(&self, owner: UserId) -> Result<Vec<Arc<Trigger>>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::ListTriggers { owner, reply })
            .await
            .map_err(|_| EngineError::Stopped)?;
        rx.await.map_err(|_| EngineError::Stopped)
    }

    /// Push a settings change into the engine.
    pub async fn update_settings(
        &self,
        owner: UserId,
        settings: UserSettings,
    ) -> Result<(), EngineError> {
        self.tx
            .send(Command::UpdateSettings { owner, settings })
            .await
            .map_err(|_| EngineError::Stopped)
    }

    /// Remove an owner entirely (profile deletion).
    pub async fn delete_profile(&self, owner: UserId) -> Result<(), EngineError> {
        self.tx
            .send(Command::DeleteProfile { owner })
            .await
            .map_err(|_| EngineError::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::mock::RecordingDelivery;
    use crate::gateway::mock::MockGateway;
    use crate::store::mock::FlakyTriggerStore;
    use crate::store::{MemoryTriggerStore, TriggerRecord};
    use crate::trigger::MAX_TRIGGERS;
    use std::sync::atomic::Ordering;

    const OWNER: UserId = 1;
    const POSTER: UserId = 42;
    const GUILD: u64 = 3;
    const CHANNEL: u64 = 7;

    fn highlighter() -> Highlighter {
        Highlighter::new(Arc::new(MemoryTriggerStore::new()), Duration::from_secs(300))
    }

    fn chat(id: u64, author: UserId, content: &str) -> ChatMessage {
        ChatMessage::new(id, author, "poster", CHANNEL, content)
            .with_guild(GUILD, "rustaceans")
            .with_channel_name("general")
    }

    fn visible_gateway() -> Arc<MockGateway> {
        let gateway = Arc::new(MockGateway::new());
        gateway.add_guild_member(GUILD, OWNER);
        gateway.add_channel_member(CHANNEL, OWNER);
        gateway
    }

    // Highlighter state transitions

    #[tokio::test]
    async fn test_eleventh_add_fails_and_leaves_state_unchanged() {
        let mut hl = highlighter();
        for i in 0..MAX_TRIGGERS {
            hl.add_trigger(OWNER, &format!("phrase{i}")).await.unwrap();
        }

        let result = hl.add_trigger(OWNER, "one too many").await;
        assert!(matches!(result, Err(TriggerError::QuotaExceeded)));
        assert_eq!(hl.list_triggers(OWNER).len(), MAX_TRIGGERS);

        // The rejected phrase was never persisted either
        let stored = hl.store.load_all().await.unwrap();
        assert_eq!(stored.len(), MAX_TRIGGERS);
    }

    #[tokio::test]
    async fn test_duplicate_add_fails_but_other_owner_succeeds() {
        let mut hl = highlighter();
        hl.add_trigger(OWNER, "rust").await.unwrap();

        assert!(matches!(
            hl.add_trigger(OWNER, "rust").await,
            Err(TriggerError::Duplicate)
        ));
        assert!(hl.add_trigger(2, "rust").await.is_ok());
    }

    #[tokio::test]
    async fn test_store_failure_leaves_index_unchanged() {
        let store = Arc::new(FlakyTriggerStore::new());
        let mut hl = Highlighter::new(store.clone(), Duration::from_secs(300));
        hl.add_trigger(OWNER, "rust").await.unwrap();

        store.fail.store(true, Ordering::Relaxed);
        assert!(matches!(
            hl.add_trigger(OWNER, "tokio").await,
            Err(TriggerError::Store(_))
        ));
        assert_eq!(hl.list_triggers(OWNER).len(), 1);

        assert!(hl
            .remove_triggers(OWNER, &RemoveSelector::All)
            .await
            .is_err());
        assert_eq!(hl.list_triggers(OWNER).len(), 1);
    }

    #[tokio::test]
    async fn test_removal_by_indices_keeps_original_order() {
        let mut hl = highlighter();
        for phrase in ["one", "two", "three", "four", "five"] {
            hl.add_trigger(OWNER, phrase).await.unwrap();
        }

        hl.remove_triggers(OWNER, &RemoveSelector::Indices(vec![2, 4]))
            .await
            .unwrap();

        let remaining: Vec<String> = hl
            .list_triggers(OWNER)
            .iter()
            .map(|t| t.phrase.clone())
            .collect();
        assert_eq!(remaining, vec!["one", "three", "five"]);

        // Deletions reached the store too
        let stored = hl.store.load_all().await.unwrap();
        assert_eq!(stored.len(), 3);
    }

    #[tokio::test]
    async fn test_remove_all_is_idempotent() {
        let mut hl = highlighter();
        hl.add_trigger(OWNER, "rust").await.unwrap();

        assert_eq!(
            hl.remove_triggers(OWNER, &RemoveSelector::All).await.unwrap().len(),
            1
        );
        assert!(hl
            .remove_triggers(OWNER, &RemoveSelector::All)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_scan_matches_and_snapshots_settings() {
        let mut hl = highlighter();
        hl.add_trigger(OWNER, "rust").await.unwrap();
        hl.update_settings(
            OWNER,
            UserSettings {
                timeout_minutes: 1,
                ..Default::default()
            },
        );

        let candidates = hl.scan(&chat(100, POSTER, "rust is nice"));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].0.owner_id, OWNER);
        assert_eq!(candidates[0].1.timeout_minutes, 1);

        assert!(hl.scan(&chat(101, POSTER, "nothing here")).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_period_suppresses_and_expires() {
        let mut hl = highlighter();
        hl.add_trigger(OWNER, "rust").await.unwrap();
        hl.update_settings(
            OWNER,
            UserSettings {
                timeout_minutes: 1,
                ..Default::default()
            },
        );

        // The owner posts in the channel: grace window opens
        assert!(hl.scan(&chat(100, OWNER, "hello all")).is_empty());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(hl.scan(&chat(101, POSTER, "rust!")).is_empty());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(hl.scan(&chat(102, POSTER, "rust again")).len(), 1);
    }

    #[tokio::test]
    async fn test_settings_update_keeps_tracker_when_timeout_unchanged() {
        let mut hl = highlighter();
        hl.add_trigger(OWNER, "rust").await.unwrap();
        hl.update_settings(OWNER, UserSettings::default());

        // Grace window opens for the owner
        hl.scan(&chat(100, OWNER, "hi"));
        assert!(hl.scan(&chat(101, POSTER, "rust")).is_empty());

        // Unrelated settings change: window survives
        hl.update_settings(
            OWNER,
            UserSettings {
                blocklist: [99u64].into(),
                ..Default::default()
            },
        );
        assert!(hl.scan(&chat(102, POSTER, "rust")).is_empty());

        // Timeout change: tracker recreated, window gone
        hl.update_settings(
            OWNER,
            UserSettings {
                timeout_minutes: 10,
                ..Default::default()
            },
        );
        assert_eq!(hl.scan(&chat(103, POSTER, "rust")).len(), 1);
    }

    #[tokio::test]
    async fn test_profile_deletion_silences_owner() {
        let mut hl = highlighter();
        hl.add_trigger(OWNER, "rust").await.unwrap();
        assert_eq!(hl.scan(&chat(100, POSTER, "rust")).len(), 1);

        hl.delete_profile(OWNER);
        assert!(hl.scan(&chat(101, POSTER, "rust")).is_empty());
        assert!(hl.list_triggers(OWNER).is_empty());
    }

    #[tokio::test]
    async fn test_load_skips_invalid_records() {
        let store = Arc::new(MemoryTriggerStore::with_records(vec![
            TriggerRecord { owner_id: OWNER, phrase: "rust".into() },
            TriggerRecord { owner_id: OWNER, phrase: "x".into() }, // too short
            TriggerRecord { owner_id: OWNER, phrase: "rust".into() }, // duplicate
            TriggerRecord { owner_id: 2, phrase: "tokio".into() },
        ]));
        let mut hl = Highlighter::new(store, Duration::from_secs(300));
        hl.load().await.unwrap();

        assert_eq!(hl.list_triggers(OWNER).len(), 1);
        assert_eq!(hl.list_triggers(2).len(), 1);
    }

    // Engine end-to-end, under paused time

    struct Rig {
        handle: EngineHandle,
        delivery: Arc<RecordingDelivery>,
        shutdown: ShutdownSignal,
    }

    async fn start_engine(gateway: Arc<MockGateway>) -> Rig {
        let delivery = Arc::new(RecordingDelivery::new());
        let (engine, handle) = Engine::new(
            &EngineConfig::default(),
            Arc::new(MemoryTriggerStore::new()),
            gateway,
            delivery.clone(),
        );
        let shutdown = engine.shutdown_signal();
        tokio::spawn(engine.run());
        Rig {
            handle,
            delivery,
            shutdown,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_delivers_matched_highlight() {
        let rig = start_engine(visible_gateway()).await;
        rig.handle.add_trigger(OWNER, "rust").await.unwrap();

        rig.handle
            .handle_message(chat(100, POSTER, "rust is everywhere"))
            .await
            .unwrap();

        // Past one dispatch tick
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(rig.delivery.sent_count(), 1);
        let sent = rig.delivery.sent.lock().unwrap();
        assert_eq!(sent[0].recipient, OWNER);
        assert!(sent[0].lead_line.contains("rust is everywhere"));
        drop(sent);

        rig.shutdown.trigger();
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_aggregates_same_window_matches() {
        let gateway = visible_gateway();
        let rig = start_engine(gateway.clone()).await;
        rig.handle.add_trigger(OWNER, "rust").await.unwrap();
        gateway.push_history(CHANNEL, chat(100, POSTER, "rust once"));
        gateway.push_history(CHANNEL, chat(101, POSTER, "rust twice"));

        rig.handle
            .handle_message(chat(100, POSTER, "rust once"))
            .await
            .unwrap();
        rig.handle
            .handle_message(chat(101, POSTER, "rust twice"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;

        // One notification, with the second match folded in
        assert_eq!(rig.delivery.sent_count(), 1);
        let sent = rig.delivery.sent.lock().unwrap();
        assert!(sent[0].body.contains("rust once"));
        assert!(sent[0].body.contains("rust twice"));
        drop(sent);

        rig.shutdown.trigger();
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_never_notifies_self_or_bots() {
        let rig = start_engine(visible_gateway()).await;
        rig.handle.add_trigger(OWNER, "rust").await.unwrap();

        rig.handle
            .handle_message(chat(100, OWNER, "rust by myself"))
            .await
            .unwrap();
        rig.handle
            .handle_message(chat(101, POSTER, "rust by a bot").with_bot())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(rig.delivery.sent_count(), 0);

        rig.shutdown.trigger();
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_profile_deletion_stops_notifications() {
        let rig = start_engine(visible_gateway()).await;
        rig.handle.add_trigger(OWNER, "rust").await.unwrap();
        rig.handle.delete_profile(OWNER).await.unwrap();

        rig.handle
            .handle_message(chat(100, POSTER, "rust after deletion"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(rig.delivery.sent_count(), 0);

        rig.shutdown.trigger();
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_shutdown_discards_queue_and_stops_handle() {
        let rig = start_engine(visible_gateway()).await;
        rig.handle.add_trigger(OWNER, "rust").await.unwrap();

        rig.handle
            .handle_message(chat(100, POSTER, "rust enqueued"))
            .await
            .unwrap();
        // Let the eligibility verdict land, but stop before the tick
        tokio::time::sleep(Duration::from_secs(1)).await;

        rig.shutdown.trigger();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(rig.delivery.sent_count(), 0);
        assert!(matches!(
            rig.handle.add_trigger(OWNER, "tokio").await,
            Err(EngineError::Stopped)
        ));
    }
}
