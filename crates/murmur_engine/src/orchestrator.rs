//! Orchestrator: sequences memory, policy, delay, generation, imperfection
//! and transport per inbound event.
//!
//! Each event is handled as an independent task so multiple channels can be
//! "thinking" at once; per-channel state lives behind one lock per channel
//! key. An in-flight delayed response is not aborted by newer events in the
//! same channel; that tradeoff is deliberate.

use crate::context::build_entries;
use crate::generation::{complete_with_fallback, GenBackend};
use crate::typo::ImperfectionInjector;
use anyhow::Result;
use murmur_core::{ChatEvent, ChatTransport, MurmurConfig, Presence};
use murmur_memory::{ConversationWindow, MemoryStore, RecordKind, Role, Turn};
use murmur_policy::trigger::{ChannelSnapshot, Decision, EvalContext, IgnoreReason};
use murmur_policy::{AdminCommand, CooldownLedger, PermissionRegistry, Schedule, TriggerEvaluator};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// How many of our own sent message ids to remember per channel, for the
/// reply-to-agent rule.
const SENT_ID_CAP: usize = 64;

/// Idle statuses cycled occasionally while awake.
const AMBIENT_ACTIVITIES: &[&str] = &["music", "scrolling", "a video"];

/// All mutable per-channel state, owned by one lock per channel key.
struct ChannelSlot {
    window: ConversationWindow,
    /// Response-time ledger entry, read by the passive-continuation rule.
    last_response_at: Option<i64>,
    conversation_mode: bool,
    last_assistant_at: Option<i64>,
    sent_ids: VecDeque<String>,
}

impl ChannelSlot {
    fn new(max_history: usize) -> Self {
        Self {
            window: ConversationWindow::new(max_history),
            last_response_at: None,
            conversation_mode: false,
            last_assistant_at: None,
            sent_ids: VecDeque::new(),
        }
    }

    fn remember_sent(&mut self, id: String) {
        self.sent_ids.push_back(id);
        while self.sent_ids.len() > SENT_ID_CAP {
            self.sent_ids.pop_front();
        }
    }
}

pub struct Orchestrator {
    cfg: MurmurConfig,
    transport: Arc<dyn ChatTransport>,
    backend: Arc<dyn GenBackend>,
    evaluator: TriggerEvaluator,
    schedule: Schedule,
    injector: ImperfectionInjector,
    memory: Mutex<MemoryStore>,
    registry: Mutex<PermissionRegistry>,
    cooldowns: Mutex<CooldownLedger>,
    channels: Mutex<HashMap<String, Arc<Mutex<ChannelSlot>>>>,
    rng: Mutex<StdRng>,
}

impl Orchestrator {
    /// Build with state loaded from the configured durable files.
    pub fn from_config(
        cfg: MurmurConfig,
        transport: Arc<dyn ChatTransport>,
        backend: Arc<dyn GenBackend>,
    ) -> Arc<Self> {
        let memory = MemoryStore::load_or_empty(&cfg.memory.file, cfg.memory.max_items);
        let registry =
            PermissionRegistry::load_or_default(&cfg.policy.permissions_file, &cfg.policy.owner_id);
        let cooldowns =
            CooldownLedger::load_or_default(&cfg.policy.cooldowns_file, cfg.policy.cooldown_secs);
        Self::with_state(cfg, transport, backend, memory, registry, cooldowns)
    }

    /// Build with explicit state, used by tests and dry runs.
    pub fn with_state(
        cfg: MurmurConfig,
        transport: Arc<dyn ChatTransport>,
        backend: Arc<dyn GenBackend>,
        memory: MemoryStore,
        registry: PermissionRegistry,
        cooldowns: CooldownLedger,
    ) -> Arc<Self> {
        let rng = match cfg.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let schedule = Schedule::new(cfg.schedule.utc_offset_hours);
        let injector = ImperfectionInjector::new(cfg.typo.probability);
        Arc::new(Self {
            cfg,
            transport,
            backend,
            evaluator: TriggerEvaluator::with_defaults(),
            schedule,
            injector,
            memory: Mutex::new(memory),
            registry: Mutex::new(registry),
            cooldowns: Mutex::new(cooldowns),
            channels: Mutex::new(HashMap::new()),
            rng: Mutex::new(rng),
        })
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Main loop: spawn one task per inbound event so the source is never
    /// blocked by a delayed response.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<ChatEvent>) {
        self.spawn_ambient_loop();
        while let Some(event) = events.recv().await {
            let me = self.clone();
            tokio::spawn(async move {
                if let Err(e) = me.handle_event(event).await {
                    tracing::error!("event handling failed: {:#}", e);
                }
            });
        }
        tracing::info!("event source closed, orchestrator stopping");
    }

    /// Handle one inbound event to completion.
    pub async fn handle_event(&self, event: ChatEvent) -> Result<()> {
        let slot = self.slot(&event.channel_id).await;

        let decision = {
            let slot_guard = slot.lock().await;
            let snapshot = ChannelSnapshot {
                last_response_at: slot_guard.last_response_at,
                conversation_mode: slot_guard.conversation_mode,
                last_assistant_at: slot_guard.last_assistant_at,
                replies_to_agent: event
                    .reply_to_id
                    .as_ref()
                    .map_or(false, |id| slot_guard.sent_ids.contains(id)),
            };
            drop(slot_guard);
            let registry = self.registry.lock().await;
            let ctx = EvalContext {
                identity: &self.cfg.identity,
                policy: &self.cfg.policy,
                permissions: &registry,
                asleep: self.schedule.is_asleep(),
                strict_sleep: self.cfg.schedule.strict_sleep,
                now: murmur_core::unix_now(),
                channel: snapshot,
            };
            let mut rng = self.rng.lock().await;
            self.evaluator.decide(&event, &ctx, &mut *rng)
        };

        // Our own and other automated senders leave no trace at all.
        if decision == Decision::Ignore(IgnoreReason::SelfOrAutomated) {
            return Ok(());
        }

        // Observe the message before acting on it.
        {
            let mut memory = self.memory.lock().await;
            memory.append(
                &event.text,
                &event.author_name,
                &event.channel_id,
                RecordKind::User,
                Some(event.timestamp),
            );
        }
        {
            let mut slot_guard = slot.lock().await;
            slot_guard
                .window
                .append_turn(Role::User, &event.text, &event.author_name);
        }

        match decision {
            Decision::Ignore(reason) => {
                tracing::debug!(?reason, channel = %event.channel_id, "event ignored");
                Ok(())
            }
            Decision::Refuse(text) => {
                if let Err(e) = self.transport.reply(&event.id, &text).await {
                    tracing::warn!("failed to send refusal: {:#}", e);
                }
                Ok(())
            }
            Decision::Command(cmd) => self.execute_command(cmd, &event).await,
            Decision::MentionFallback => {
                let text = self.cfg.identity.mention_fallback_reply.clone();
                match self.transport.reply(&event.id, &text).await {
                    Ok(_) => {
                        let mut memory = self.memory.lock().await;
                        memory.append(
                            &text,
                            &self.cfg.identity.name,
                            &event.channel_id,
                            RecordKind::Assistant,
                            None,
                        );
                    }
                    Err(e) => tracing::warn!("failed to send mention fallback: {:#}", e),
                }
                Ok(())
            }
            Decision::Respond { reason, content } => {
                self.respond(&event, reason.code(), &content, slot).await
            }
        }
    }

    async fn respond(
        &self,
        event: &ChatEvent,
        reason: &str,
        content: &str,
        slot: Arc<Mutex<ChannelSlot>>,
    ) -> Result<()> {
        let delay = {
            let mut rng = self.rng.lock().await;
            self.schedule.response_delay(&mut *rng)
        };
        tracing::info!(
            reason,
            channel = %event.channel_id,
            delay_s = delay.as_secs_f64(),
            "responding"
        );
        tokio::time::sleep(delay).await;

        if let Err(e) = self.transport.typing(&event.channel_id).await {
            tracing::debug!("typing indicator failed: {:#}", e);
        }

        let memory_block = {
            let memory = self.memory.lock().await;
            memory.context_block(
                self.cfg.memory.context_limit,
                self.cfg.memory.context_horizon_hours,
            )
        };
        let turns: Vec<Turn> = {
            let slot_guard = slot.lock().await;
            slot_guard
                .window
                .window(self.cfg.llm.history_turns)
                .into_iter()
                .cloned()
                .collect()
        };
        let entries = build_entries(
            self.cfg.persona.prompt.as_deref(),
            &self.cfg.identity.name,
            &event.author_name,
            &memory_block,
            &turns,
            content,
        );

        let models = {
            let mut rng = self.rng.lock().await;
            let mut models = self.cfg.llm.models.clone();
            models.shuffle(&mut *rng);
            models
        };
        let text = match complete_with_fallback(self.backend.as_ref(), &models, &entries).await {
            Some((text, model)) => {
                tracing::info!(model, reason, "completion served");
                text
            }
            None => self.cfg.llm.fallback_reply.clone(),
        };

        let outcome = {
            let mut rng = self.rng.lock().await;
            self.injector.apply(&text, &mut *rng)
        };

        let threaded = self.should_thread_reply(event).await;
        let sent = if threaded {
            self.transport.reply(&event.id, &outcome.text).await
        } else {
            self.transport.send(&event.channel_id, &outcome.text).await
        };
        let sent_id = match sent {
            Ok(id) => id,
            Err(e) => {
                // Terminally handled; no re-delivery.
                tracing::error!("failed to send response: {:#}", e);
                return Ok(());
            }
        };

        if outcome.has_typo {
            let pause = {
                let mut rng = self.rng.lock().await;
                let lo = self.cfg.typo.correction_delay_min_ms;
                let hi = self.cfg.typo.correction_delay_max_ms.max(lo + 1);
                Duration::from_millis(rng.gen_range(lo..hi))
            };
            tokio::time::sleep(pause).await;
            if let Err(e) = self.transport.edit(&sent_id, &text).await {
                // Best-effort correction; a failed edit just leaves the typo.
                tracing::debug!("typo self-correction failed: {:#}", e);
            }
        }

        let now = murmur_core::unix_now();
        {
            let mut memory = self.memory.lock().await;
            memory.append(
                &text,
                &self.cfg.identity.name,
                &event.channel_id,
                RecordKind::Assistant,
                Some(now),
            );
        }
        {
            let mut slot_guard = slot.lock().await;
            slot_guard
                .window
                .append_turn(Role::Assistant, &text, &self.cfg.identity.name);
            slot_guard.last_response_at = Some(now);
            slot_guard.last_assistant_at = Some(now);
            slot_guard.remember_sent(sent_id);
        }
        Ok(())
    }

    /// Reply-suppression check: when too many other messages landed after the
    /// triggering event, send fresh instead of threading; the conversation
    /// has moved on. History failures fall back to threading.
    async fn should_thread_reply(&self, event: &ChatEvent) -> bool {
        match self
            .transport
            .history(&event.channel_id, &event.id, 10)
            .await
        {
            Ok(later) => {
                let interposed = later
                    .iter()
                    .filter(|e| e.author_id != self.cfg.identity.user_id)
                    .count();
                interposed <= self.cfg.policy.reply_suppression_threshold
            }
            Err(e) => {
                tracing::debug!("history fetch failed, defaulting to reply: {:#}", e);
                true
            }
        }
    }

    // ------------------------------------------------------------------
    // Administrative commands
    // ------------------------------------------------------------------

    async fn execute_command(&self, cmd: AdminCommand, event: &ChatEvent) -> Result<()> {
        // Non-owners (whitelisted users running wake) are cooldown-gated.
        let is_owner = {
            let registry = self.registry.lock().await;
            registry.is_owner(&event.author_id)
        };
        if !is_owner {
            let mut cooldowns = self.cooldowns.lock().await;
            if cooldowns.is_on_cooldown(&event.author_id) {
                let minutes = cooldowns.remaining_minutes(&event.author_id);
                drop(cooldowns);
                let text = self.ack(format!("cooldown active, try again in {} min", minutes));
                self.send_ack(event, text).await;
                return Ok(());
            }
            cooldowns.set_cooldown(&event.author_id);
        }

        let ack = match cmd {
            AdminCommand::WhitelistAdd(id) => {
                self.registry.lock().await.whitelist_add(&id);
                self.ack(format!("whitelisted {}", id))
            }
            AdminCommand::WhitelistRemove(id) => {
                self.registry.lock().await.whitelist_remove(&id);
                self.ack(format!("removed {} from whitelist", id))
            }
            AdminCommand::ChannelAllow(id) => {
                self.registry.lock().await.channel_allow(&id);
                self.ack(format!("channel {} allowed", id))
            }
            AdminCommand::ChannelDeny(id) => {
                self.registry.lock().await.channel_deny(&id);
                self.ack(format!("channel {} removed from allow-list", id))
            }
            AdminCommand::RoleGateSet { guild_id, role_id } => {
                self.registry.lock().await.set_role_gate(&guild_id, &role_id);
                self.ack(format!("role gate for {} set to {}", guild_id, role_id))
            }
            AdminCommand::RoleGateClear(guild_id) => {
                self.registry.lock().await.clear_role_gate(&guild_id);
                self.ack(format!("role gate for {} cleared", guild_id))
            }
            AdminCommand::Sleep => {
                self.schedule.set_force_awake(false);
                self.schedule.refresh();
                self.ack("back to the normal schedule".to_string())
            }
            AdminCommand::Wake => {
                self.schedule.set_force_awake(true);
                self.schedule.refresh();
                if let Err(e) = self.transport.set_presence(Presence::Online, None).await {
                    tracing::warn!("presence update failed: {:#}", e);
                }
                self.ack("awake".to_string())
            }
            AdminCommand::ConvoOn => {
                let slot = self.slot(&event.channel_id).await;
                slot.lock().await.conversation_mode = true;
                self.ack("conversation mode on for this channel".to_string())
            }
            AdminCommand::ConvoOff => {
                let slot = self.slot(&event.channel_id).await;
                slot.lock().await.conversation_mode = false;
                self.ack("conversation mode off".to_string())
            }
            AdminCommand::MemoryStats => {
                let len = self.memory.lock().await.len();
                // Stats are informative even in stealth.
                format!("{} messages remembered", len)
            }
            AdminCommand::MemoryClear => {
                self.memory.lock().await.clear();
                self.ack("memory cleared".to_string())
            }
        };
        self.send_ack(event, ack).await;
        Ok(())
    }

    fn ack(&self, verbose: String) -> String {
        if self.cfg.identity.stealth {
            "ok".to_string()
        } else {
            verbose
        }
    }

    async fn send_ack(&self, event: &ChatEvent, text: String) {
        if let Err(e) = self.transport.reply(&event.id, &text).await {
            tracing::warn!("failed to send command acknowledgment: {:#}", e);
        }
    }

    // ------------------------------------------------------------------
    // Ambient background loop
    // ------------------------------------------------------------------

    /// Fixed-period loop re-evaluating the sleep schedule and cycling
    /// presence, independent of event traffic.
    pub fn spawn_ambient_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let me = self.clone();
        tokio::spawn(async move {
            let period = Duration::from_secs(me.cfg.schedule.ambient_interval_secs.max(1));
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Some(asleep) = me.schedule.refresh() {
                    tracing::info!(asleep, "sleep state transition");
                    let status = if asleep { Presence::Idle } else { Presence::Online };
                    if let Err(e) = me.transport.set_presence(status, None).await {
                        tracing::warn!("presence update failed: {:#}", e);
                    }
                } else if !me.schedule.is_asleep() {
                    let activity = {
                        let mut rng = me.rng.lock().await;
                        rng.gen_bool(0.2)
                            .then(|| AMBIENT_ACTIVITIES[rng.gen_range(0..AMBIENT_ACTIVITIES.len())])
                    };
                    if let Some(activity) = activity {
                        if let Err(e) = me
                            .transport
                            .set_presence(Presence::Online, Some(activity))
                            .await
                        {
                            tracing::debug!("ambient presence update failed: {:#}", e);
                        }
                    }
                }
            }
        })
    }

    async fn slot(&self, channel_id: &str) -> Arc<Mutex<ChannelSlot>> {
        let mut channels = self.channels.lock().await;
        channels
            .entry(channel_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(ChannelSlot::new(
                    self.cfg.conversation.max_history_length,
                )))
            })
            .clone()
    }
}
