//! The email crew: per lead, a researcher then a copywriter, one LLM call each.
//!
//! A run works on a snapshot of the pending queue inside its own task.  It never touches the
//! queue or the staging set; progress goes back over a channel and [`apply`] performs the
//! resulting queue changes on the dispatcher side.

use crate::{
    config::{AgentPrompt, Config, Product},
    error::LeadError,
    gate::CallGate,
    helper::say_long,
    lead_store::{Lead, LeadDir, LeadStore},
    llm::{ChatEndpoint, ChatMessage, LanguageModel},
    log_error, log_internal,
    logging::{LeadFile, PrintColor},
    search::WebSearch,
    volatile_state::VolatileState,
};
use anyhow::Result;
use regex::Regex;
use serenity::all::{ChannelId, Http};
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, LazyLock,
    },
};
use tokio::{
    sync::{
        mpsc::{UnboundedReceiver, UnboundedSender},
        RwLock,
    },
    task::{JoinError, JoinHandle},
};

const OUTPUT_SUFFIX: &str = "_personalized_email.json";
const FALLBACK_OUTPUT: &str = "sme_personalized_email.json";

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("valid filename regex"));
static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s-]+").expect("valid separator regex"));

/// The copywriter's structured output.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PersonalizedEmail {
    pub subject_line: String,
    pub email_body: String,
    pub follow_up_notes: String,
}

/// Contents of a pipeline output file: the lead plus its draft.
#[derive(serde::Serialize)]
struct EmailDraft<'a> {
    #[serde(flatten)]
    lead: &'a Lead,
    #[serde(flatten)]
    email: &'a PersonalizedEmail,
}

/// Progress report from a running pipeline.
pub struct PipelineEvent {
    /// Channel the run was started from.  None when run from the terminal.
    pub origin: Option<ChannelId>,
    pub update: PipelineUpdate,
}

pub enum PipelineUpdate {
    /// The draft for `lead` has been written to `file`
    LeadDrafted { lead: Lead, file: String },
    Finished { drafted: usize },
    Failed { drafted: usize, error: String },
}

pub struct Pipeline {
    model: Box<dyn LanguageModel>,
    search: Option<WebSearch>,
    gate: Arc<CallGate>,
    files: LeadDir,
    product: Product,
    researcher: AgentPrompt,
    copywriter: AgentPrompt,
}

impl Pipeline {
    pub fn new(
        model: Box<dyn LanguageModel>,
        gate: Arc<CallGate>,
        files: LeadDir,
        cfg: &Config,
    ) -> Self {
        Self {
            model,
            search: None,
            gate,
            files,
            product: cfg.product.clone(),
            researcher: cfg.researcher.clone(),
            copywriter: cfg.copywriter.clone(),
        }
    }

    /// Pipeline talking to the configured chat endpoint, with web search if a key is set.
    pub fn from_config(cfg: &Config, gate: Arc<CallGate>, files: LeadDir) -> Self {
        let model = Box::new(ChatEndpoint::new(cfg.llm.clone()));
        let mut pipeline = Self::new(model, gate, files, cfg);
        pipeline.search = WebSearch::new(&cfg.search);
        pipeline
    }

    fn inputs(&self, lead: &Lead) -> BTreeMap<String, String> {
        let mut inputs = lead.fields().clone();
        inputs.insert("our_product".to_owned(), self.product.our_product.clone());
        inputs.insert("product".to_owned(), self.product.product.clone());
        inputs
    }

    // Every model call goes through the gate first.
    async fn ask(&self, system: &str, prompt: String, json: bool) -> Result<String> {
        self.gate.admit().await;
        let messages = vec![ChatMessage::system(system), ChatMessage::user(prompt)];
        self.model.chat(messages, json).await
    }

    async fn research(&self, lead: &Lead, inputs: &BTreeMap<String, String>) -> Result<String> {
        let mut prompt = fill_template(&self.researcher.task, inputs);

        if let Some(search) = &self.search {
            let query = [lead.company(), lead.get("location").unwrap_or_default()].join(" ");
            match search.search(&query).await {
                Ok(results) if !results.is_empty() => {
                    prompt.push_str("\n\nWeb search results:\n");
                    prompt.push_str(&results);
                }
                Ok(_) => {}
                // Research can still go ahead without the web.
                Err(e) => log_error!("Web search for {} failed: {}", lead.color(), e),
            }
        }

        self.ask(&self.researcher.system, prompt, false).await
    }

    /// Research a lead, write its email, and save the draft.  Returns the output file name.
    pub async fn draft(&self, lead: &Lead) -> Result<String> {
        let mut inputs = self.inputs(lead);

        log_internal!("Researching {}...", lead.color());
        let research = self.research(lead, &inputs).await?;
        inputs.insert("research".to_owned(), research);

        log_internal!("Writing email for {}...", lead.color());
        let prompt = fill_template(&self.copywriter.task, &inputs);
        let reply = self.ask(&self.copywriter.system, prompt, true).await?;
        let email = parse_email(&reply)?;

        let file = output_file_name(lead.company());
        self.files
            .write_lead_file(&file, &EmailDraft { lead, email: &email })
            .await?;
        log_internal!("Saved email for {} to {}", lead.color(), LeadFile(&file).color());

        Ok(file)
    }

    /// Draft every lead in order, stopping at the first failure.
    pub async fn run(
        self,
        leads: Vec<Lead>,
        origin: Option<ChannelId>,
        tx: UnboundedSender<PipelineEvent>,
    ) {
        self.drive(leads, origin, tx, Arc::new(AtomicUsize::new(0)))
            .await
    }

    /// Run on its own task.  A panicking run is still reported as `Failed`.
    pub fn spawn(
        self,
        leads: Vec<Lead>,
        origin: Option<ChannelId>,
        tx: UnboundedSender<PipelineEvent>,
    ) -> JoinHandle<()> {
        let drafted = Arc::new(AtomicUsize::new(0));
        let worker = tokio::spawn(self.drive(leads, origin, tx.clone(), Arc::clone(&drafted)));

        tokio::spawn(async move {
            let Err(e) = worker.await else {
                return;
            };
            let error = join_failure(e);
            log_error!("Email pipeline died: {}", error);
            let update = PipelineUpdate::Failed {
                drafted: drafted.load(Ordering::SeqCst),
                error,
            };
            if tx.send(PipelineEvent { origin, update }).is_err() {
                log_error!("Pipeline event dropped, nobody is listening");
            }
        })
    }

    async fn drive(
        self,
        leads: Vec<Lead>,
        origin: Option<ChannelId>,
        tx: UnboundedSender<PipelineEvent>,
        drafted: Arc<AtomicUsize>,
    ) {
        let send = |update| {
            if tx.send(PipelineEvent { origin, update }).is_err() {
                log_error!("Pipeline event dropped, nobody is listening");
            }
        };

        for lead in leads {
            match self.draft(&lead).await {
                Ok(file) => {
                    drafted.fetch_add(1, Ordering::SeqCst);
                    send(PipelineUpdate::LeadDrafted { lead, file });
                }
                Err(e) => {
                    send(PipelineUpdate::Failed {
                        drafted: drafted.load(Ordering::SeqCst),
                        error: format!("{:#}", e),
                    });
                    return;
                }
            }
        }
        send(PipelineUpdate::Finished {
            drafted: drafted.load(Ordering::SeqCst),
        });
    }
}

fn join_failure(e: JoinError) -> String {
    if !e.is_panic() {
        return "the email task was cancelled".to_owned();
    }
    let panic = e.into_panic();
    let reason = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_owned());
    format!("the email task panicked: {}", reason)
}

/// Apply a pipeline update to shared state.  Returns the message for whoever started the run.
pub async fn apply(
    update: &PipelineUpdate,
    store: &RwLock<LeadStore>,
    vstate: &RwLock<VolatileState>,
) -> Option<String> {
    match update {
        PipelineUpdate::LeadDrafted { lead, file } => {
            let removed = store.write().await.queue.complete_lead(lead).await;
            match removed {
                Ok(true) => {}
                Ok(false) => log_internal!(
                    "{} was already gone from the pending queue",
                    lead.color()
                ),
                Err(e) => {
                    log_error!(
                        "Could not remove {} from the pending queue: {}",
                        lead.color(),
                        e
                    );
                    vstate
                        .write()
                        .await
                        .stuck_leads
                        .push(lead.company().to_owned());
                }
            }
            log_internal!("Drafted {} into {}", lead.color(), LeadFile(file).color());
            None
        }
        PipelineUpdate::Finished { drafted } => {
            let stuck = finish_run(vstate).await;
            Some(format!(
                "Email automation completed successfully!  Drafted {} email(s).{}",
                drafted, stuck
            ))
        }
        PipelineUpdate::Failed { drafted, error } => {
            let stuck = finish_run(vstate).await;
            Some(format!(
                "Error during email automation: {}\n{} email(s) were drafted before the failure.{}",
                error, drafted, stuck
            ))
        }
    }
}

// Clear the single-run guard.  Returns a note on drafted leads still in the queue.
async fn finish_run(vstate: &RwLock<VolatileState>) -> String {
    let mut vstate = vstate.write().await;
    vstate.pipeline_running = false;
    let stuck = std::mem::take(&mut vstate.stuck_leads);
    if stuck.is_empty() {
        return String::new();
    }
    format!(
        "\nCould not remove these drafted leads from the pending queue, they will be drafted \
         again next run: {}",
        stuck.join(", ")
    )
}

/// Drain pipeline events for the lifetime of the bot, posting results where runs started.
pub async fn relay(
    mut rx: UnboundedReceiver<PipelineEvent>,
    http: Arc<Http>,
    store: Arc<RwLock<LeadStore>>,
    vstate: Arc<RwLock<VolatileState>>,
) {
    while let Some(event) = rx.recv().await {
        let Some(text) = apply(&event.update, &store, &vstate).await else {
            continue;
        };

        match event.origin {
            Some(channel_id) => {
                if let Err(e) = say_long(&http, channel_id, &text).await {
                    log_error!("Could not report pipeline result: {}", e);
                }
            }
            None => log_internal!("{}", text),
        }
    }
}

fn fill_template(template: &str, inputs: &BTreeMap<String, String>) -> String {
    inputs
        .iter()
        .fold(template.to_owned(), |text, (key, value)| {
            text.replace(&format!("{{{{{}}}}}", key), value)
        })
}

fn parse_email(reply: &str) -> Result<PersonalizedEmail, LeadError> {
    // Models like to wrap JSON in a fenced block.
    let body = match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => reply.trim(),
    };

    serde_json::from_str(body)
        .map_err(|e| LeadError::Pipeline(format!("Model returned an unusable email draft: {}", e)))
}

/// `Al Afaq Insurance-Brokers!` becomes `al_afaq_insurance_brokers_personalized_email.json`.
pub fn output_file_name(company: &str) -> String {
    let cleaned = UNSAFE_CHARS.replace_all(company, "");
    let cleaned = cleaned.trim().to_lowercase();
    let safe = SEPARATORS.replace_all(&cleaned, "_");

    if safe.is_empty() {
        FALLBACK_OUTPUT.to_owned()
    } else {
        format!("{}{}", safe, OUTPUT_SUFFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::{collections::VecDeque, sync::Mutex, time::Duration};
    use tokio::sync::mpsc;

    /// Replays canned replies and records the prompts it was given.
    struct ScriptedModel {
        replies: Mutex<VecDeque<String>>,
        prompts: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
    }

    impl ScriptedModel {
        fn new(replies: &[&str]) -> (Self, Arc<Mutex<Vec<Vec<ChatMessage>>>>) {
            let prompts = Arc::new(Mutex::new(Vec::new()));
            let model = Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                prompts: Arc::clone(&prompts),
            };
            (model, prompts)
        }
    }

    #[serenity::async_trait]
    impl LanguageModel for ScriptedModel {
        async fn chat(&self, messages: Vec<ChatMessage>, _json: bool) -> Result<String> {
            self.prompts.lock().unwrap().push(messages);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("model is out of replies"))
        }
    }

    const EMAIL: &str = r#"```json
{"subject_line": "Hi", "email_body": "Body", "follow_up_notes": "Call Tuesday"}
```"#;

    async fn seeded_store(dir: &tempfile::TempDir, companies: &[&str]) -> LeadStore {
        let mut store = LeadStore::new(
            dir.path().join("businesses.json"),
            dir.path().join("coldleads"),
        );
        store.init().await.unwrap();
        for company in companies {
            let fields = [
                ("company", *company),
                ("industry", "Restaurant"),
                ("business_type", "Cafe"),
                ("location", "Doha, Qatar"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
            store.queue.append_lead(fields).await.unwrap();
        }
        store
    }

    fn gate() -> Arc<CallGate> {
        Arc::new(CallGate::new(15, Duration::from_secs(60)))
    }

    #[test]
    fn output_names_are_sanitized() {
        assert_eq!(
            output_file_name("Al Afaq Insurance-Brokers!"),
            "al_afaq_insurance_brokers_personalized_email.json"
        );
        assert_eq!(
            output_file_name("  Tea  World  "),
            "tea_world_personalized_email.json"
        );
        assert_eq!(output_file_name("!!!"), FALLBACK_OUTPUT);
    }

    #[test]
    fn templates_are_filled_from_inputs() {
        let inputs = BTreeMap::from([
            ("company".to_owned(), "Tea World".to_owned()),
            ("location".to_owned(), "Doha".to_owned()),
        ]);
        assert_eq!(
            fill_template("{{company}} in {{location}} {{unknown}}", &inputs),
            "Tea World in Doha {{unknown}}"
        );
    }

    #[test]
    fn fenced_json_is_accepted() {
        let email = parse_email(EMAIL).unwrap();
        assert_eq!(email.subject_line, "Hi");
        assert_eq!(email.follow_up_notes, "Call Tuesday");

        assert!(matches!(
            parse_email("I cannot help with that"),
            Err(LeadError::Pipeline(_))
        ));
    }

    #[tokio::test]
    async fn run_drafts_each_lead_and_relay_empties_queue() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir, &["Tea World", "Al Maha"]).await;
        let leads = store.queue.list_pending().await.unwrap().into_vec();

        let (model, prompts) =
            ScriptedModel::new(&["research one", EMAIL, "research two", EMAIL]);
        let pipeline = Pipeline::new(
            Box::new(model),
            gate(),
            store.files.clone(),
            &Config::default(),
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        pipeline.run(leads, None, tx).await;

        let store = RwLock::new(store);
        let vstate = RwLock::new(VolatileState::new());
        vstate.write().await.pipeline_running = true;

        let mut messages = Vec::new();
        while let Some(event) = rx.recv().await {
            if let Some(text) = apply(&event.update, &store, &vstate).await {
                messages.push(text);
            }
        }

        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("Drafted 2 email(s)"));
        assert!(!vstate.read().await.pipeline_running);

        let store = store.read().await;
        assert!(store.queue.list_pending().await.unwrap().is_empty());
        assert_eq!(
            store.files.list().await.unwrap(),
            vec![
                "al_maha_personalized_email.json",
                "tea_world_personalized_email.json"
            ]
        );

        let draft = store
            .files
            .read("tea_world_personalized_email.json")
            .await
            .unwrap();
        assert_eq!(draft["company"], json!("Tea World"));
        assert_eq!(draft["subject_line"], json!("Hi"));
        assert_eq!(draft["email_body"], json!("Body"));

        // Researcher prompt is filled from the lead, copywriter sees the research.
        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 4);
        assert!(prompts[0][1].content.contains("Tea World"));
        assert!(prompts[0][1].content.contains("websites"));
        assert!(prompts[1][1].content.contains("research one"));
    }

    #[tokio::test]
    async fn failure_stops_run_and_keeps_remaining_leads() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir, &["Tea World", "Al Maha"]).await;
        let leads = store.queue.list_pending().await.unwrap().into_vec();

        let (model, _) = ScriptedModel::new(&["research", "not an email"]);
        let pipeline = Pipeline::new(
            Box::new(model),
            gate(),
            store.files.clone(),
            &Config::default(),
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        pipeline.run(leads, None, tx).await;

        let store = RwLock::new(store);
        let vstate = RwLock::new(VolatileState::new());
        vstate.write().await.pipeline_running = true;
        let messages = drain(&mut rx, &store, &vstate).await;

        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Error during email automation"));
        assert!(!vstate.read().await.pipeline_running);

        let store = store.read().await;
        assert_eq!(store.queue.list_pending().await.unwrap().len(), 2);
        assert!(store.files.list().await.unwrap().is_empty());
    }

    /// Answers the first call, then panics.
    struct PanickingModel {
        calls: AtomicUsize,
    }

    #[serenity::async_trait]
    impl LanguageModel for PanickingModel {
        async fn chat(&self, _messages: Vec<ChatMessage>, _json: bool) -> Result<String> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok("research".to_owned());
            }
            panic!("model client blew up");
        }
    }

    async fn drain(
        rx: &mut mpsc::UnboundedReceiver<PipelineEvent>,
        store: &RwLock<LeadStore>,
        vstate: &RwLock<VolatileState>,
    ) -> Vec<String> {
        let mut messages = Vec::new();
        while let Some(event) = rx.recv().await {
            if let Some(text) = apply(&event.update, store, vstate).await {
                messages.push(text);
            }
        }
        messages
    }

    #[tokio::test]
    async fn panicking_run_is_reported_and_frees_the_guard() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir, &["Tea World"]).await;
        let leads = store.queue.list_pending().await.unwrap().into_vec();

        let model = PanickingModel {
            calls: AtomicUsize::new(0),
        };
        let pipeline = Pipeline::new(
            Box::new(model),
            gate(),
            store.files.clone(),
            &Config::default(),
        );

        let store = RwLock::new(store);
        let vstate = RwLock::new(VolatileState::new());
        vstate.write().await.pipeline_running = true;

        let (tx, mut rx) = mpsc::unbounded_channel();
        pipeline.spawn(leads, None, tx).await.unwrap();
        let messages = drain(&mut rx, &store, &vstate).await;

        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Error during email automation"));
        assert!(messages[0].contains("model client blew up"));
        assert!(!vstate.read().await.pipeline_running);
        assert_eq!(store.read().await.queue.list_pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn leads_left_in_a_broken_queue_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir, &["Tea World"]).await;
        let lead = store.queue.list_pending().await.unwrap().into_vec().remove(0);
        tokio::fs::write(dir.path().join("businesses.json"), "not json")
            .await
            .unwrap();

        let store = RwLock::new(store);
        let vstate = RwLock::new(VolatileState::new());
        vstate.write().await.pipeline_running = true;

        let drafted = PipelineUpdate::LeadDrafted {
            lead,
            file: "tea_world_personalized_email.json".to_owned(),
        };
        assert_eq!(apply(&drafted, &store, &vstate).await, None);

        let text = apply(&PipelineUpdate::Finished { drafted: 1 }, &store, &vstate)
            .await
            .unwrap();
        assert!(text.starts_with("Email automation completed successfully!"));
        assert!(text.contains("Could not remove these drafted leads"));
        assert!(text.contains("Tea World"));

        let vstate = vstate.read().await;
        assert!(!vstate.pipeline_running);
        assert!(vstate.stuck_leads.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn model_calls_go_through_the_gate() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir, &["One", "Two"]).await;
        let leads = store.queue.list_pending().await.unwrap().into_vec();

        let (model, _) = ScriptedModel::new(&["r", EMAIL, "r", EMAIL]);
        let period = Duration::from_secs(60);
        let gate = Arc::new(CallGate::new(2, period));
        let pipeline = Pipeline::new(Box::new(model), gate, store.files.clone(), &Config::default());

        let start = tokio::time::Instant::now();
        let (tx, _rx) = mpsc::unbounded_channel();
        pipeline.run(leads, None, tx).await;

        // Four calls with a budget of two per minute.
        assert!(start.elapsed() >= period);
    }
}
