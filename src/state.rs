use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::filters::load_rules_default;
use crate::config::Config;
use crate::filter::FilterRules;
use crate::notify::telegram::DisabledSender;
use crate::notify::{Dispatcher, MessageSender, TelegramSender};
use crate::providers::ProviderChain;
use crate::store::{EventStore, RedisBackend};

/// Handles shared by every request and by the in-process ticker.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: EventStore,
    pub providers: Arc<ProviderChain>,
    pub sender: Arc<dyn MessageSender>,
    pub rules: Arc<FilterRules>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: EventStore,
        providers: ProviderChain,
        sender: Arc<dyn MessageSender>,
        rules: FilterRules,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            providers: Arc::new(providers),
            sender,
            rules: Arc::new(rules),
        }
    }

    /// Wire the production collaborators: Redis when `REDIS_URL` is set
    /// (in-memory otherwise), configured providers, Telegram when a token is
    /// present.
    pub async fn from_config(config: Config) -> Result<Self> {
        let store = match &config.redis_url {
            Some(url) => {
                let backend = RedisBackend::connect(url).await.context("connecting to redis")?;
                EventStore::new(Arc::new(backend))
            }
            None => {
                tracing::warn!("REDIS_URL not set, using in-memory store (state is lost on restart)");
                EventStore::in_memory().0
            }
        };

        let providers = ProviderChain::from_config(&config)?;
        if providers.is_empty() {
            tracing::warn!(target: "providers", "no calendar provider configured, manual events only");
        }

        let sender: Arc<dyn MessageSender> = match &config.telegram_token {
            Some(token) => Arc::new(TelegramSender::new(
                token,
                &config.telegram_api_base,
                config.telegram_timeout,
            )?),
            None => {
                tracing::warn!(target: "notify", "TELEGRAM_BOT_TOKEN not set, outbound messages disabled");
                Arc::new(DisabledSender)
            }
        };

        let rules = load_rules_default().context("loading filter rules")?;
        tracing::info!(
            store = store.backend_name(),
            providers = ?providers.names(),
            countries = rules.countries.len(),
            keywords = rules.keywords().len(),
            "app state ready"
        );

        Ok(Self::new(config, store, providers, sender, rules))
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.store.clone(),
            self.sender.clone(),
            self.config.dedupe_scope,
            self.config.dedupe_ttl,
        )
    }
}
