//! Lifecycle-managed application context.
//!
//! Every shared handle (store, cache, lock, producer, engine, identity
//! services) is built once at startup and passed explicitly; no module-level
//! mutable state exists anywhere in the crate.

use crate::cache::{keys, Cache, InMemoryCache};
use crate::config::Config;
use crate::events::{EventProducer, InMemoryProducer};
use crate::identity::{AuthGate, SmsService, StaticSmsVendor, TokenKeeper};
use crate::lock::{InMemoryLockNode, LockNode, Redlock};
use crate::result::GameResultIngestor;
use crate::room::{LayoutOverrides, RoomEngine};
use crate::store::{GatewayStore, InMemoryStore};
use crate::timeouts::DelayTaskScheduler;
use anyhow::Result;
use std::sync::Arc;

pub struct AppContext {
    pub config: Arc<Config>,
    pub store: Arc<dyn GatewayStore>,
    pub cache: Arc<dyn Cache>,
    pub producer: Arc<dyn EventProducer>,
    pub engine: Arc<RoomEngine>,
    pub auth: Arc<AuthGate>,
    pub tokens: Arc<TokenKeeper>,
    pub sms: Arc<SmsService>,
    pub ingestor: Arc<GameResultIngestor>,
    pub scheduler: DelayTaskScheduler,
}

impl AppContext {
    /// Wire the in-memory infrastructure stack.
    pub async fn build_in_memory(
        config: Arc<Config>,
        layout_overrides: LayoutOverrides,
    ) -> Result<Arc<Self>> {
        let store: Arc<dyn GatewayStore> = Arc::new(InMemoryStore::new());
        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
        let producer: Arc<dyn EventProducer> = Arc::new(InMemoryProducer::new(
            config.events.result_topic.clone(),
            config.events.room_event_topic.clone(),
        ));
        let nodes: Vec<Arc<dyn LockNode>> = vec![Arc::new(InMemoryLockNode::new())];
        let lock = Arc::new(Redlock::with_retries(
            nodes,
            config.room.lock.retry_count,
            std::time::Duration::from_millis(config.room.lock.retry_delay_ms),
        ));

        Self::assemble(config, store, cache, producer, lock, layout_overrides)
    }

    /// Assemble the context from pre-built infrastructure handles.
    pub fn assemble(
        config: Arc<Config>,
        store: Arc<dyn GatewayStore>,
        cache: Arc<dyn Cache>,
        producer: Arc<dyn EventProducer>,
        lock: Arc<Redlock>,
        layout_overrides: LayoutOverrides,
    ) -> Result<Arc<Self>> {
        let deploy_env = config.server.deploy_env.clone();

        let tokens = Arc::new(TokenKeeper::new(
            config.identity.signing_key_seed.as_deref(),
            config.identity.token_valid_duration_days,
        )?);
        let auth = Arc::new(AuthGate::new(
            cache.clone(),
            tokens.clone(),
            deploy_env.clone(),
        ));
        let sms = Arc::new(SmsService::new(
            cache.clone(),
            Arc::new(StaticSmsVendor::new()),
            deploy_env.clone(),
            config.identity.sms_code_validity_secs,
            config.identity.sms_daily_quota,
        ));
        let engine = Arc::new(RoomEngine::new(
            store.clone(),
            lock,
            producer.clone(),
            deploy_env,
            config.room.lock.ttl_ms,
            layout_overrides,
        ));
        let ingestor = Arc::new(GameResultIngestor::new(store.clone(), producer.clone()));

        Ok(Arc::new(Self {
            config,
            store,
            cache,
            producer,
            engine,
            auth,
            tokens,
            sms,
            ingestor,
            scheduler: DelayTaskScheduler::new(),
        }))
    }

    /// Seed cache counters that mirror store truth (total user count).
    pub async fn seed_cache(&self) -> Result<()> {
        let total = self.store.user_cnt().await?;
        self.cache
            .set_integer(
                &keys::total_user_cnt(&self.config.server.deploy_env),
                total as i64,
                None,
            )
            .await
    }
}
