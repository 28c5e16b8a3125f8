use crate::{
    config::Config, context::Context, event::Event, gate::CallGate, lead_store::LeadStore,
    pipeline::PipelineEvent, volatile_state::VolatileState,
};
use serenity::all::{Message, Ready};
use std::sync::Arc;
use tokio::sync::{mpsc::UnboundedSender, RwLock};

/// Discord event handler
pub struct Handler {
    cfg: Arc<Config>,
    store: Arc<RwLock<LeadStore>>,
    vstate: Arc<RwLock<VolatileState>>,
    gate: Arc<CallGate>,
    pipeline_tx: UnboundedSender<PipelineEvent>,
}

impl<'a> Handler {
    pub fn new(
        cfg: Arc<Config>,
        store: Arc<RwLock<LeadStore>>,
        vstate: Arc<RwLock<VolatileState>>,
        gate: Arc<CallGate>,
        pipeline_tx: UnboundedSender<PipelineEvent>,
    ) -> Self {
        Self {
            cfg,
            store,
            vstate,
            gate,
            pipeline_tx,
        }
    }

    fn ctx(&'a self, discord_ctx: &'a serenity::all::Context) -> Context<'a> {
        Context {
            cfg: &self.cfg,
            store: &self.store,
            vstate: &self.vstate,
            gate: &self.gate,
            pipeline_tx: &self.pipeline_tx,
            cache: &discord_ctx.cache,
            http: &discord_ctx.http,
            cache_http: discord_ctx,
        }
    }
}

#[serenity::async_trait]
impl serenity::all::EventHandler for Handler {
    async fn ready(&self, discord_ctx: serenity::all::Context, ready: Ready) {
        Event::Ready(ready).handle(self.ctx(&discord_ctx)).await;
    }

    async fn message(&self, discord_ctx: serenity::all::Context, msg: Message) {
        Event::Message(msg).handle(self.ctx(&discord_ctx)).await;
    }
}
