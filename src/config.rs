use anyhow::{anyhow, Result};
use std::{io::ErrorKind, path::PathBuf, time::Duration};

const CONFIG_PATH_REL_HOME: &str = ".config/leadbot/config.toml";
const DEFAULT_MODEL: &str = "llama3.1";

/// Bot configuration
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: General,
    pub storage: Storage,
    pub llm: Llm,
    pub rate_limit: RateLimit,
    pub product: Product,
    pub researcher: AgentPrompt,
    pub copywriter: AgentPrompt,
    pub search: Search,
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct General {
    pub discord_token: String,
    pub command_prefix: String,
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Storage {
    /// JSON array of leads waiting for an email draft
    pub pending_leads: PathBuf,
    /// Directory with one JSON file per processed lead
    pub lead_dir: PathBuf,
}

#[derive(Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Llm {
    /// Ollama-style `/api/chat` endpoint
    pub chat_url: String,
    /// Sent as a bearer token when set, for endpoints behind an authenticating proxy.  A local
    /// Ollama needs none.
    pub api_key: String,
    /// Model the endpoint serves, e.g. one pulled with `ollama pull`
    pub model_name: String,
    pub context_size: usize,
    pub temperature: f32,
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RateLimit {
    pub max_calls: usize,
    pub time_period_seconds: u64,
}

/// What we are selling.  Added to every lead before it is handed to the pipeline.
#[derive(Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Product {
    pub our_product: String,
    pub product: String,
}

/// Prompts for one pipeline agent.  `{{field}}` placeholders are filled from the lead.
#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct AgentPrompt {
    pub system: String,
    pub task: String,
}

#[derive(Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Search {
    /// Serper search endpoint.  Research runs without web results when the key is empty.
    pub url: String,
    pub api_key: String,
}

/// Values supplied on the command line or through the environment.  They win over the file.
#[derive(Default)]
pub struct Overrides {
    pub discord_token: Option<String>,
    pub llm_api_key: Option<String>,
    pub search_api_key: Option<String>,
}

impl Default for General {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            command_prefix: "DuDe ".to_owned(),
        }
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            pending_leads: PathBuf::from("businesses.json"),
            lead_dir: PathBuf::from("coldleads"),
        }
    }
}

impl Default for Llm {
    fn default() -> Self {
        Self {
            chat_url: "http://localhost:11434/api/chat".to_owned(),
            api_key: String::new(),
            model_name: DEFAULT_MODEL.to_owned(),
            context_size: 8192,
            temperature: 0.7,
        }
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            max_calls: 15,
            time_period_seconds: 60,
        }
    }
}

impl Default for Product {
    fn default() -> Self {
        let pitch = "beautiful, brand-aligned websites built to impress and convert";
        Self {
            our_product: pitch.to_owned(),
            product: pitch.to_owned(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: General::default(),
            storage: Storage::default(),
            llm: Llm::default(),
            rate_limit: RateLimit::default(),
            product: Product::default(),
            researcher: AgentPrompt::researcher(),
            copywriter: AgentPrompt::copywriter(),
            search: Search::default(),
        }
    }
}

impl AgentPrompt {
    pub fn researcher() -> Self {
        Self {
            system: "You are an SME market researcher.  You dig into small and medium \
                     businesses and find what matters to their owners: their customers, their \
                     online presence, and where they are losing business."
                .to_owned(),
            task: "Research {{company}}, a {{business_type}} in the {{industry}} industry \
                   located in {{location}}.  Summarize what they do, who their customers are, \
                   the state of their website and online presence, and concrete pain points \
                   that {{our_product}} could solve.  Keep it to a short list of findings."
                .to_owned(),
        }
    }

    pub fn copywriter() -> Self {
        Self {
            system: "You are a sales copywriter who writes short, warm, personalized cold \
                     emails for small business owners.  You never sound like a template."
                .to_owned(),
            task: "Using the research below, write a personalized cold email to {{company}} \
                   in {{location}} offering {{product}}.  Reference at least one specific \
                   finding.  Respond with only a JSON object with the string fields \
                   `subject_line`, `email_body` and `follow_up_notes`.\n\nResearch:\n{{research}}"
                .to_owned(),
        }
    }
}

impl Default for Search {
    fn default() -> Self {
        Self {
            url: "https://google.serper.dev/search".to_owned(),
            api_key: String::new(),
        }
    }
}

impl Config {
    fn default_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|p| p.join(CONFIG_PATH_REL_HOME))
            .ok_or(anyhow!("Could not find home directory"))
    }

    /// Load the configuration file.  Without an explicit path a missing file means defaults.
    pub async fn load(path: Option<PathBuf>) -> Result<Self> {
        let explicit = path.is_some();
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound && !explicit => return Ok(Self::default()),
            Err(e) => {
                return Err(anyhow!(
                    "Could not read configuration at `{}`: {}",
                    path.to_string_lossy(),
                    e
                ))
            }
        };

        Self::parse(&contents).map_err(|e| {
            anyhow!(
                "Could not parse configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(token) = overrides.discord_token {
            self.general.discord_token = token;
        }
        if let Some(key) = overrides.llm_api_key {
            self.llm.api_key = key;
        }
        if let Some(key) = overrides.search_api_key {
            self.search.api_key = key;
        }
    }

    pub fn discord_token(&self) -> Result<&str> {
        match self.general.discord_token.trim() {
            "" => Err(anyhow!(
                "No Discord bot token found.  Set the DISCORD_BOT_TOKEN environment variable or \
                 `general.discord_token` in the configuration file."
            )),
            token => Ok(token),
        }
    }

    pub fn rate_limit_period(&self) -> Duration {
        Duration::from_secs(self.rate_limit.time_period_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = Config::parse("").unwrap();
        assert_eq!(cfg.general.command_prefix, "DuDe ");
        assert_eq!(cfg.storage.lead_dir, PathBuf::from("coldleads"));
        assert_eq!(cfg.rate_limit.max_calls, 15);
        assert_eq!(cfg.rate_limit_period(), Duration::from_secs(60));
        assert!(cfg.copywriter.task.contains("{{research}}"));
        assert!(cfg.discord_token().is_err());
    }

    #[test]
    fn default_llm_targets_local_ollama() {
        let llm = Llm::default();
        assert_eq!(llm.chat_url, "http://localhost:11434/api/chat");
        assert_eq!(llm.model_name, DEFAULT_MODEL);
        assert!(!llm.model_name.contains("gemini"));
        assert!(llm.api_key.is_empty());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let cfg = Config::parse(
            r#"
            [general]
            command_prefix = "!"

            [rate_limit]
            max_calls = 4

            [researcher]
            system = "s"
            task = "t {{company}}"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.general.command_prefix, "!");
        assert_eq!(cfg.rate_limit.max_calls, 4);
        assert_eq!(cfg.rate_limit.time_period_seconds, 60);
        assert_eq!(cfg.researcher.task, "t {{company}}");
        assert_eq!(cfg.llm.chat_url, "http://localhost:11434/api/chat");
    }

    #[test]
    fn overrides_win_over_file() {
        let mut cfg = Config::parse(
            r#"
            [general]
            discord_token = "from-file"
            "#,
        )
        .unwrap();

        cfg.apply(Overrides {
            discord_token: Some("from-env".to_owned()),
            llm_api_key: Some("key".to_owned()),
            search_api_key: None,
        });

        assert_eq!(cfg.discord_token().unwrap(), "from-env");
        assert_eq!(cfg.llm.api_key, "key");
        assert!(cfg.search.api_key.is_empty());
    }

    #[tokio::test]
    async fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Config::load(Some(missing)).await.is_err());
    }
}
